use chrono::NaiveDate;
use clap::Args;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;

use crate::models::{ClientAnalysis, ClinicData, DashboardStats, FinancialReport, WeekAgenda};
use crate::services::agenda::week_agenda;
use crate::services::crm::client_analysis;
use crate::services::dashboard::dashboard_stats;
use crate::services::filters::{date_bounds, AppointmentFilter, Period};
use crate::services::finance::calculate_financials;
use crate::services::report::export_procedure_report;
use crate::services::state::AppState;
use crate::utils::parse_day_first_date;

pub fn parse_date(value: &str) -> Result<NaiveDate, String> {
    parse_day_first_date(value).ok_or_else(|| format!("Invalid date '{}'", value))
}

/// Period and selections shared by the dashboard, finance, clients and
/// export commands.
#[derive(Debug, Clone, Args)]
pub struct DashboardQuery {
    #[arg(value_enum, default_value = "this-month")]
    pub period: Period,
    #[arg(long, value_parser = parse_date)]
    pub start: Option<NaiveDate>,
    #[arg(long, value_parser = parse_date)]
    pub end: Option<NaiveDate>,
    #[arg(long = "professional")]
    pub professionals: Vec<String>,
    #[arg(long = "procedure")]
    pub procedures: Vec<String>,
}

impl DashboardQuery {
    fn filter(&self, today: NaiveDate, data: &ClinicData) -> AppointmentFilter {
        let range = self
            .period
            .resolve(today, self.start, self.end, date_bounds(&data.appointments));
        AppointmentFilter {
            range,
            professionals: selection(&self.professionals),
            procedures: selection(&self.procedures),
        }
    }
}

/// Command output plus the load failure, if the tables are empty because of
/// one.
#[derive(Debug, Serialize)]
pub struct Loaded<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub value: T,
}

fn selection(values: &[String]) -> Option<BTreeSet<String>> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().cloned().collect())
    }
}

async fn filtered_financials(
    query: &DashboardQuery,
    today: NaiveDate,
    state: &AppState,
) -> Result<FinancialReport, String> {
    let data = state.data().await.map_err(|e| e.to_string())?;
    let appointments = query.filter(today, &data).apply(&data.appointments);
    Ok(calculate_financials(&appointments, &data.materials, &data.recipes))
}

pub async fn get_dashboard_stats(
    query: &DashboardQuery,
    today: NaiveDate,
    state: &AppState,
) -> Result<Loaded<DashboardStats>, String> {
    let data = state.data().await.map_err(|e| e.to_string())?;
    let goal = state.settings().map_err(|e| e.to_string())?.revenue_goal;
    let filter = query.filter(today, &data);

    Ok(Loaded {
        error: state.last_error(),
        value: dashboard_stats(&data, &filter, goal),
    })
}

pub async fn get_financials(
    query: &DashboardQuery,
    today: NaiveDate,
    state: &AppState,
) -> Result<Loaded<FinancialReport>, String> {
    let value = filtered_financials(query, today, state).await?;
    Ok(Loaded {
        error: state.last_error(),
        value,
    })
}

pub async fn get_client_analysis(
    query: &DashboardQuery,
    today: NaiveDate,
    state: &AppState,
) -> Result<Loaded<ClientAnalysis>, String> {
    let report = filtered_financials(query, today, state).await?;
    Ok(Loaded {
        error: state.last_error(),
        value: client_analysis(&report.appointments),
    })
}

pub async fn get_week_agenda(date: NaiveDate, state: &AppState) -> Result<Loaded<WeekAgenda>, String> {
    let data = state.data().await.map_err(|e| e.to_string())?;
    Ok(Loaded {
        error: state.last_error(),
        value: week_agenda(&data.appointments, date),
    })
}

/// Writes the per-procedure summary of the selected appointments as CSV.
pub async fn export_report(
    path: &Path,
    query: &DashboardQuery,
    today: NaiveDate,
    state: &AppState,
) -> Result<usize, String> {
    let report = filtered_financials(query, today, state).await?;
    export_procedure_report(path, &report.procedures).map_err(|e| e.to_string())?;
    Ok(report.procedures.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::settings::load_settings;
    use crate::db::Database;

    fn seeded_state(dir: &Path) -> AppState {
        let workbook = dir.join("workbook");
        std::fs::create_dir_all(&workbook).unwrap();
        std::fs::write(
            workbook.join("Respostas ao formulário 1.csv"),
            "Nome do Cliente,Profissional Responsável,Procedimento Realizado,Data do Atendimento,Horário do Atendimento,Idade,Genero\n\
             Ana,Dra. Lima,Limpeza,05/01/2024,09:00,30,f\n\
             Bia,Dr. Souza,Peeling,06/01/2024,10:00,,\n",
        )
        .unwrap();
        std::fs::write(
            workbook.join("Materiais.csv"),
            "Material,Preco Unitario (R$)\nGelX,5\n",
        )
        .unwrap();
        std::fs::write(
            workbook.join("Ficha Técnica.csv"),
            "Procedimento,Material,Quantidade Usada,Preco de Venda (R$)\nLimpeza,GelX,2,100\n",
        )
        .unwrap();

        let db = Database::open_in_memory().unwrap();
        let settings = load_settings(&db, dir);
        AppState::new(db, settings)
    }

    /// Custom period without bounds: every dated appointment.
    fn all_dates() -> DashboardQuery {
        DashboardQuery {
            period: Period::Custom,
            start: None,
            end: None,
            professionals: Vec::new(),
            procedures: Vec::new(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[tokio::test]
    async fn financials_and_clients_from_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let state = seeded_state(dir.path());

        let finance = get_financials(&all_dates(), today(), &state).await.unwrap();
        assert!(finance.error.is_none());
        let cleaning = &finance.value.procedures[0];
        assert_eq!(cleaning.procedure, "Limpeza");
        assert_eq!((cleaning.revenue, cleaning.cost, cleaning.profit), (100.0, 10.0, 90.0));

        let clients = get_client_analysis(&all_dates(), today(), &state).await.unwrap().value;
        assert_eq!(clients.report.clients[0].client, "Ana");
        assert_eq!(clients.report.clients[0].average_ticket, 100.0);
        assert_eq!(clients.genders[0].gender, "F");
    }

    #[tokio::test]
    async fn custom_period_defaults_to_data_range() {
        let dir = tempfile::tempdir().unwrap();
        let state = seeded_state(dir.path());
        let query = DashboardQuery {
            professionals: vec!["Dra. Lima".to_string()],
            ..all_dates()
        };
        let stats = get_dashboard_stats(&query, today(), &state).await.unwrap().value;
        assert_eq!(stats.period_start, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert_eq!(stats.period_end, NaiveDate::from_ymd_opt(2024, 1, 6).unwrap());
        assert_eq!(stats.appointments.current, 1.0);
        assert_eq!(stats.revenue.current, 100.0);
    }

    #[tokio::test]
    async fn report_is_exported() {
        let dir = tempfile::tempdir().unwrap();
        let state = seeded_state(dir.path());
        let path = dir.path().join("relatorio.csv");
        assert_eq!(export_report(&path, &all_dates(), today(), &state).await.unwrap(), 2);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("Limpeza,1,100.00,10.00,90.00"));
        assert!(text.contains("Peeling,1,0.00,0.00,0.00"));
    }

    #[tokio::test]
    async fn selections_narrow_export_finance_and_clients() {
        let dir = tempfile::tempdir().unwrap();
        let state = seeded_state(dir.path());
        let souza = DashboardQuery {
            professionals: vec!["Dr. Souza".to_string()],
            ..all_dates()
        };

        let path = dir.path().join("souza.csv");
        assert_eq!(export_report(&path, &souza, today(), &state).await.unwrap(), 1);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("Peeling,1,0.00,0.00,0.00"));
        assert!(!text.contains("Limpeza"));

        let clients = get_client_analysis(&souza, today(), &state).await.unwrap().value;
        let names: Vec<&str> = clients.report.clients.iter().map(|c| c.client.as_str()).collect();
        assert_eq!(names, vec!["Bia"]);
        assert!(clients.genders.is_empty());

        let cleaning = DashboardQuery {
            procedures: vec!["Limpeza".to_string()],
            ..all_dates()
        };
        let finance = get_financials(&cleaning, today(), &state).await.unwrap().value;
        assert_eq!(finance.procedures.len(), 1);
        assert_eq!(finance.consumption[0].quantity_used, 2.0);
    }

    #[tokio::test]
    async fn period_outside_the_data_gives_empty_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let state = seeded_state(dir.path());
        let this_month = DashboardQuery {
            period: Period::ThisMonth,
            ..all_dates()
        };

        let finance = get_financials(&this_month, today(), &state).await.unwrap().value;
        assert!(finance.procedures.is_empty());
        let clients = get_client_analysis(&this_month, today(), &state).await.unwrap().value;
        assert!(clients.report.clients.is_empty());
        let path = dir.path().join("vazio.csv");
        assert_eq!(export_report(&path, &this_month, today(), &state).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn load_failure_is_reported_with_empty_output() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let settings = load_settings(&db, dir.path());
        let state = AppState::new(db, settings);

        let finance = get_financials(&all_dates(), today(), &state).await.unwrap();
        assert!(finance.error.is_some());
        assert!(finance.value.procedures.is_empty());
    }
}
