use crate::models::{ClinicData, DashboardStats, DerivedAppointment};
use crate::services::filters::{
    distinct_procedures, distinct_professionals, goal_progress, kpi, monthly_series,
    AppointmentFilter,
};
use crate::services::finance::calculate_financials;

/// Period KPIs against the preceding window of equal length. The previous
/// window ignores the professional and procedure selections.
pub fn dashboard_stats(data: &ClinicData, filter: &AppointmentFilter, revenue_goal: f64) -> DashboardStats {
    let current = filter.apply(&data.appointments);
    let previous = AppointmentFilter::for_range(filter.range.previous()).apply(&data.appointments);

    let current_report = calculate_financials(&current, &data.materials, &data.recipes);
    let previous_report = calculate_financials(&previous, &data.materials, &data.recipes);

    let totals = |rows: &[DerivedAppointment]| {
        rows.iter()
            .fold((0.0, 0.0), |(rev, prof), r| (rev + r.sale_price, prof + r.profit))
    };
    let (revenue, profit) = totals(&current_report.appointments.rows);
    let (prev_revenue, prev_profit) = totals(&previous_report.appointments.rows);

    let (chart_months, chart_revenue, chart_profit) = monthly_series(&current_report.appointments);

    DashboardStats {
        period_start: filter.range.start,
        period_end: filter.range.end,
        revenue: kpi(revenue, prev_revenue),
        profit: kpi(profit, prev_profit),
        appointments: kpi(current.rows.len() as f64, previous.rows.len() as f64),
        revenue_goal,
        goal_progress: goal_progress(revenue, revenue_goal),
        professionals: distinct_professionals(&data.appointments),
        procedures: distinct_procedures(&data.appointments),
        chart_months,
        chart_revenue,
        chart_profit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Appointment, AppointmentTable, Material, MaterialTable, ProcedureRecipe, RecipeTable,
    };
    use crate::services::filters::DateRange;
    use chrono::NaiveDate;
    use std::collections::BTreeSet;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    fn appt(date: NaiveDate, professional: &str) -> Appointment {
        Appointment {
            client: "Ana".to_string(),
            professional: professional.to_string(),
            procedure: "Peel".to_string(),
            date: Some(date),
            ..Appointment::default()
        }
    }

    fn data() -> ClinicData {
        ClinicData {
            appointments: AppointmentTable {
                columns: Vec::new(),
                rows: vec![
                    appt(d(3, 2), "Dra. Lima"),
                    appt(d(3, 9), "Dr. Souza"),
                    appt(d(2, 25), "Dr. Souza"),
                ],
            },
            materials: MaterialTable {
                rows: vec![Material {
                    name: "Acid".to_string(),
                    unit_cost: 40.0,
                    stock_quantity: 10.0,
                    minimum_stock: 1.0,
                }],
                stock_columns: true,
            },
            recipes: RecipeTable {
                columns: Vec::new(),
                rows: vec![ProcedureRecipe {
                    procedure: "Peel".to_string(),
                    material: "Acid".to_string(),
                    quantity_used: 1.0,
                    sale_price: 200.0,
                    extra: Default::default(),
                }],
            },
        }
    }

    #[test]
    fn current_period_against_previous_window() {
        let filter = AppointmentFilter::for_range(DateRange::new(d(3, 1), d(3, 14)));
        let stats = dashboard_stats(&data(), &filter, 1000.0);

        assert_eq!(stats.revenue.current, 400.0);
        assert_eq!(stats.revenue.previous, 200.0);
        assert_eq!(stats.revenue.delta, 1.0);
        assert_eq!(stats.profit.current, 320.0);
        assert_eq!(stats.appointments.current, 2.0);
        assert_eq!(stats.goal_progress, 0.4);
        assert_eq!(stats.chart_months, vec!["2024-03"]);
        assert_eq!(stats.professionals, vec!["Dr. Souza", "Dra. Lima"]);
    }

    #[test]
    fn previous_window_ignores_professional_selection() {
        let mut filter = AppointmentFilter::for_range(DateRange::new(d(3, 1), d(3, 14)));
        filter.professionals = Some(BTreeSet::from(["Dra. Lima".to_string()]));
        let stats = dashboard_stats(&data(), &filter, 0.0);

        assert_eq!(stats.appointments.current, 1.0);
        assert_eq!(stats.appointments.previous, 1.0);
        assert_eq!(stats.appointments.delta, 0.0);
        assert_eq!(stats.goal_progress, 0.0);
    }
}
