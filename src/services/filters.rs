use chrono::{Datelike, Duration, NaiveDate};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::models::{Appointment, AppointmentTable, EnrichedAppointments, KpiDelta};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Today,
    ThisMonth,
    LastMonth,
    ThisYear,
    #[value(name = "last-7-days")]
    Last7Days,
    #[value(name = "last-30-days")]
    Last30Days,
    Custom,
}

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Length used to size the comparison window, never below one day.
    pub fn duration_days(&self) -> i64 {
        (self.end - self.start).num_days().max(1)
    }

    /// The window of equal length ending the day before `start`.
    pub fn previous(&self) -> DateRange {
        let duration = Duration::days(self.duration_days());
        DateRange {
            start: self.start - duration,
            end: self.start - Duration::days(1),
        }
    }
}

impl Period {
    /// Resolves a preset against `today`. Custom bounds that are not given
    /// fall back to the earliest and latest appointment dates, then to today.
    pub fn resolve(
        self,
        today: NaiveDate,
        custom_start: Option<NaiveDate>,
        custom_end: Option<NaiveDate>,
        bounds: Option<(NaiveDate, NaiveDate)>,
    ) -> DateRange {
        let first_of_month = today.with_day(1).unwrap_or(today);
        match self {
            Period::Today => DateRange::new(today, today),
            Period::ThisMonth => DateRange::new(first_of_month, today),
            Period::LastMonth => {
                let end = first_of_month - Duration::days(1);
                DateRange::new(end.with_day(1).unwrap_or(end), end)
            }
            Period::ThisYear => {
                DateRange::new(NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today), today)
            }
            Period::Last7Days => DateRange::new(today - Duration::days(6), today),
            Period::Last30Days => DateRange::new(today - Duration::days(29), today),
            Period::Custom => {
                let (min, max) = bounds.unwrap_or((today, today));
                let start = custom_start.unwrap_or(min);
                let end = custom_end.unwrap_or(max).max(start);
                DateRange::new(start, end)
            }
        }
    }
}

/// Earliest and latest parsed appointment dates.
pub fn date_bounds(table: &AppointmentTable) -> Option<(NaiveDate, NaiveDate)> {
    let mut dates = table.rows.iter().filter_map(|a| a.date);
    let first = dates.next()?;
    Some(dates.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d))))
}

/// Date range plus optional professional and procedure selections. `None`
/// selects everything.
#[derive(Debug, Clone, PartialEq)]
pub struct AppointmentFilter {
    pub range: DateRange,
    pub professionals: Option<BTreeSet<String>>,
    pub procedures: Option<BTreeSet<String>>,
}

impl AppointmentFilter {
    pub fn for_range(range: DateRange) -> Self {
        AppointmentFilter {
            range,
            professionals: None,
            procedures: None,
        }
    }

    pub fn matches(&self, appointment: &Appointment) -> bool {
        let Some(date) = appointment.date else {
            return false;
        };
        self.range.contains(date)
            && self
                .professionals
                .as_ref()
                .map_or(true, |set| set.contains(&appointment.professional))
            && self
                .procedures
                .as_ref()
                .map_or(true, |set| set.contains(&appointment.procedure))
    }

    pub fn apply(&self, table: &AppointmentTable) -> AppointmentTable {
        table.with_rows(table.rows.iter().filter(|a| self.matches(a)).cloned().collect())
    }
}

pub fn delta_ratio(current: f64, previous: f64) -> f64 {
    if previous > 0.0 {
        (current - previous) / previous
    } else if current > 0.0 {
        1.0
    } else {
        0.0
    }
}

pub fn kpi(current: f64, previous: f64) -> KpiDelta {
    KpiDelta {
        current,
        previous,
        delta: delta_ratio(current, previous),
    }
}

pub fn goal_progress(revenue: f64, goal: f64) -> f64 {
    if goal > 0.0 {
        (revenue / goal).min(1.0)
    } else {
        0.0
    }
}

/// Revenue and profit per `YYYY-MM`, in month order. Undated rows are left
/// out.
pub fn monthly_series(enriched: &EnrichedAppointments) -> (Vec<String>, Vec<f64>, Vec<f64>) {
    let mut months: BTreeMap<String, (f64, f64)> = BTreeMap::new();
    for row in &enriched.rows {
        let Some(date) = row.appointment.date else {
            continue;
        };
        let entry = months
            .entry(format!("{}-{:02}", date.year(), date.month()))
            .or_insert((0.0, 0.0));
        entry.0 += row.sale_price;
        entry.1 += row.profit;
    }

    let mut labels = Vec::with_capacity(months.len());
    let mut revenue = Vec::with_capacity(months.len());
    let mut profit = Vec::with_capacity(months.len());
    for (month, (rev, prof)) in months {
        labels.push(month);
        revenue.push(rev);
        profit.push(prof);
    }
    (labels, revenue, profit)
}

pub fn distinct_professionals(table: &AppointmentTable) -> Vec<String> {
    distinct(table.rows.iter().map(|a| a.professional.as_str()))
}

pub fn distinct_procedures(table: &AppointmentTable) -> Vec<String> {
    distinct(table.rows.iter().map(|a| a.procedure.as_str()))
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    values
        .filter(|v| !v.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DerivedAppointment;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn appt(date: Option<NaiveDate>, professional: &str, procedure: &str) -> Appointment {
        Appointment {
            client: "Ana".to_string(),
            professional: professional.to_string(),
            procedure: procedure.to_string(),
            date,
            ..Appointment::default()
        }
    }

    #[test]
    fn presets_resolve_against_today() {
        let today = d(2024, 3, 15);
        let r = |p: Period| p.resolve(today, None, None, None);
        assert_eq!(r(Period::Today), DateRange::new(today, today));
        assert_eq!(r(Period::ThisMonth), DateRange::new(d(2024, 3, 1), today));
        assert_eq!(r(Period::LastMonth), DateRange::new(d(2024, 2, 1), d(2024, 2, 29)));
        assert_eq!(r(Period::ThisYear), DateRange::new(d(2024, 1, 1), today));
        assert_eq!(r(Period::Last7Days), DateRange::new(d(2024, 3, 9), today));
        assert_eq!(r(Period::Last30Days), DateRange::new(d(2024, 2, 15), today));
    }

    #[test]
    fn last_month_in_january_is_december() {
        let range = Period::LastMonth.resolve(d(2024, 1, 10), None, None, None);
        assert_eq!(range, DateRange::new(d(2023, 12, 1), d(2023, 12, 31)));
    }

    #[test]
    fn custom_defaults_to_data_bounds() {
        let bounds = Some((d(2023, 5, 1), d(2024, 2, 2)));
        let today = d(2024, 3, 15);
        assert_eq!(
            Period::Custom.resolve(today, None, None, bounds),
            DateRange::new(d(2023, 5, 1), d(2024, 2, 2))
        );
        assert_eq!(
            Period::Custom.resolve(today, Some(d(2024, 1, 1)), None, bounds),
            DateRange::new(d(2024, 1, 1), d(2024, 2, 2))
        );
        assert_eq!(Period::Custom.resolve(today, None, None, None), DateRange::new(today, today));
    }

    #[test]
    fn previous_window_has_same_length() {
        let range = DateRange::new(d(2024, 3, 1), d(2024, 3, 15));
        assert_eq!(range.previous(), DateRange::new(d(2024, 2, 16), d(2024, 2, 29)));

        let single_day = DateRange::new(d(2024, 3, 15), d(2024, 3, 15));
        assert_eq!(single_day.previous(), DateRange::new(d(2024, 3, 14), d(2024, 3, 14)));
    }

    #[test]
    fn filter_excludes_undated_and_unselected_rows() {
        let table = AppointmentTable {
            columns: Vec::new(),
            rows: vec![
                appt(Some(d(2024, 3, 1)), "Dra. Lima", "Peel"),
                appt(Some(d(2024, 3, 2)), "Dr. Souza", "Peel"),
                appt(None, "Dra. Lima", "Peel"),
                appt(Some(d(2024, 4, 1)), "Dra. Lima", "Peel"),
                appt(Some(d(2024, 3, 31)), "Dra. Lima", "Botox"),
            ],
        };
        let mut filter = AppointmentFilter::for_range(DateRange::new(d(2024, 3, 1), d(2024, 3, 31)));
        assert_eq!(filter.apply(&table).rows.len(), 3);

        filter.professionals = Some(BTreeSet::from(["Dra. Lima".to_string()]));
        filter.procedures = Some(BTreeSet::from(["Peel".to_string()]));
        let kept = filter.apply(&table);
        assert_eq!(kept.rows.len(), 1);
        assert_eq!(kept.rows[0].date, Some(d(2024, 3, 1)));
    }

    #[test]
    fn delta_and_goal_rules() {
        assert_eq!(delta_ratio(150.0, 100.0), 0.5);
        assert_eq!(delta_ratio(50.0, 0.0), 1.0);
        assert_eq!(delta_ratio(0.0, 0.0), 0.0);
        assert_eq!(goal_progress(5000.0, 10000.0), 0.5);
        assert_eq!(goal_progress(20000.0, 10000.0), 1.0);
        assert_eq!(goal_progress(20000.0, 0.0), 0.0);
    }

    #[test]
    fn monthly_series_sums_per_month() {
        let row = |date, price, profit| DerivedAppointment {
            appointment: appt(date, "Dra. Lima", "Peel"),
            cost: price - profit,
            sale_price: price,
            profit,
        };
        let enriched = EnrichedAppointments {
            columns: Vec::new(),
            rows: vec![
                row(Some(d(2024, 2, 3)), 100.0, 60.0),
                row(Some(d(2024, 1, 9)), 50.0, 20.0),
                row(Some(d(2024, 2, 20)), 10.0, 5.0),
                row(None, 999.0, 999.0),
            ],
        };
        let (months, revenue, profit) = monthly_series(&enriched);
        assert_eq!(months, vec!["2024-01", "2024-02"]);
        assert_eq!(revenue, vec![50.0, 110.0]);
        assert_eq!(profit, vec![20.0, 65.0]);
    }

    #[test]
    fn distinct_names_are_sorted_without_blanks() {
        let table = AppointmentTable {
            columns: Vec::new(),
            rows: vec![
                appt(None, "Dr. Souza", "Peel"),
                appt(None, "", "Botox"),
                appt(None, "Dra. Lima", "Peel"),
            ],
        };
        assert_eq!(distinct_professionals(&table), vec!["Dr. Souza", "Dra. Lima"]);
        assert_eq!(distinct_procedures(&table), vec!["Botox", "Peel"]);
        assert_eq!(date_bounds(&table), None);
    }
}
