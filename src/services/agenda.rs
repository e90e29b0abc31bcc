use chrono::{Datelike, Duration, NaiveDate};

use crate::models::{AgendaDay, AppointmentTable, WeekAgenda};

const WEEKDAYS: [&str; 7] = ["Domingo", "Segunda", "Terça", "Quarta", "Quinta", "Sexta", "Sábado"];

/// Sunday on or before `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_sunday()))
}

/// The Sunday-to-Saturday week containing `date`, one entry per day.
/// Appointments within a day are ordered by their time text.
pub fn week_agenda(table: &AppointmentTable, date: NaiveDate) -> WeekAgenda {
    let start = week_start(date);
    let days = WEEKDAYS
        .iter()
        .enumerate()
        .map(|(offset, weekday)| {
            let day = start + Duration::days(offset as i64);
            let mut appointments: Vec<_> = table
                .rows
                .iter()
                .filter(|a| a.date == Some(day))
                .cloned()
                .collect();
            appointments.sort_by(|a, b| a.time.cmp(&b.time));
            AgendaDay {
                date: day,
                weekday: weekday.to_string(),
                appointments,
            }
        })
        .collect();

    WeekAgenda {
        start,
        end: start + Duration::days(6),
        days,
    }
}
