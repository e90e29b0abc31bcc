mod commands;
mod db;
mod models;
mod services;
mod sheets;
mod utils;

use anyhow::{anyhow, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::commands::dashboard::{parse_date, DashboardQuery};
use crate::commands::inventory::TableKind;
use crate::services::edits::TableEdit;
use crate::services::state::AppState;

#[derive(Parser)]
#[command(name = "clinic-dashboard", version, about = "Clinic management dashboard over spreadsheet tables")]
struct Cli {
    /// Reference date for periods and pending deductions (defaults to today)
    #[arg(long, global = true, value_parser = parse_date)]
    today: Option<NaiveDate>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Period KPIs, goal progress and the monthly chart series
    Dashboard {
        #[command(flatten)]
        query: DashboardQuery,
    },
    /// Per-procedure and per-material totals over the selected appointments
    Finance {
        #[command(flatten)]
        query: DashboardQuery,
    },
    /// Client ranking with gender and age breakdowns
    Clients {
        #[command(flatten)]
        query: DashboardQuery,
    },
    /// Appointments of the week containing a date
    Agenda {
        #[arg(value_parser = parse_date)]
        date: Option<NaiveDate>,
    },
    /// Stock level of every material
    Stock,
    /// Past appointments whose materials were not yet deducted
    Pending,
    /// Deducts pending consumption from stock and marks the appointments
    Deduct,
    /// Writes the procedure report of the selected appointments as CSV
    Export {
        path: PathBuf,
        #[command(flatten)]
        query: DashboardQuery,
    },
    /// Sets one cell and writes the table back
    Edit {
        #[arg(value_enum)]
        table: TableKind,
        row: usize,
        column: String,
        value: String,
    },
    /// Removes one row and writes the table back
    DeleteRow {
        #[arg(value_enum)]
        table: TableKind,
        row: usize,
    },
    AddMaterial {
        name: String,
        unit_cost: f64,
        #[arg(default_value_t = 0.0)]
        stock_quantity: f64,
        #[arg(default_value_t = 0.0)]
        minimum_stock: f64,
    },
    AddRecipe {
        procedure: String,
        material: String,
        quantity_used: f64,
        sale_price: f64,
    },
    /// Shows the settings, or stores one (an empty value restores its default)
    Settings { key: Option<String>, value: Option<String> },
    /// Recent sheet writes
    WriteLog {
        #[arg(default_value_t = 20)]
        limit: usize,
    },
    /// Drops cached tables and reads every sheet again
    Reload,
    /// Reports workbook changes until interrupted
    Watch,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("CLINIC_DASHBOARD_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::data_dir()
        .map(|dir| dir.join("clinic-dashboard"))
        .ok_or_else(|| anyhow!("No data directory for this platform"))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("clinic_dashboard=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(Cli::parse()).await {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let data_dir = data_dir()?;
    std::fs::create_dir_all(&data_dir)?;

    let db = db::Database::new(data_dir.join("clinic.sqlite"))?;
    let settings = commands::settings::load_settings(&db, &data_dir);
    let state = AppState::new(db, settings);
    let today = cli.today.unwrap_or_else(|| Local::now().date_naive());

    match cli.command {
        Command::Dashboard { query } => {
            print_json(&commands::dashboard::get_dashboard_stats(&query, today, &state).await.map_err(|e| anyhow!(e))?)
        }
        Command::Finance { query } => {
            print_json(&commands::dashboard::get_financials(&query, today, &state).await.map_err(|e| anyhow!(e))?)
        }
        Command::Clients { query } => {
            print_json(&commands::dashboard::get_client_analysis(&query, today, &state).await.map_err(|e| anyhow!(e))?)
        }
        Command::Agenda { date } => {
            let date = date.unwrap_or(today);
            print_json(&commands::dashboard::get_week_agenda(date, &state).await.map_err(|e| anyhow!(e))?)
        }
        Command::Stock => print_json(&commands::inventory::get_stock_status(&state).await.map_err(|e| anyhow!(e))?),
        Command::Pending => print_json(&commands::inventory::get_pending_deduction(today, &state).await.map_err(|e| anyhow!(e))?),
        Command::Deduct => print_json(&commands::inventory::confirm_deduction(today, &state).await.map_err(|e| anyhow!(e))?),
        Command::Export { path, query } => {
            let count = commands::dashboard::export_report(&path, &query, today, &state)
                .await
                .map_err(|e| anyhow!(e))?;
            println!("Exported {} procedures to {}", count, path.display());
            Ok(())
        }
        Command::Edit {
            table,
            row,
            column,
            value,
        } => {
            let edit = TableEdit::SetCell { row, column, value };
            print_json(&commands::inventory::edit_table(table, &[edit], &state).await.map_err(|e| anyhow!(e))?)
        }
        Command::DeleteRow { table, row } => {
            let edit = TableEdit::DeleteRow(row);
            print_json(&commands::inventory::edit_table(table, &[edit], &state).await.map_err(|e| anyhow!(e))?)
        }
        Command::AddMaterial {
            name,
            unit_cost,
            stock_quantity,
            minimum_stock,
        } => print_json(
            &commands::inventory::add_material(&name, unit_cost, stock_quantity, minimum_stock, &state)
                .await
                .map_err(|e| anyhow!(e))?,
        ),
        Command::AddRecipe {
            procedure,
            material,
            quantity_used,
            sale_price,
        } => print_json(
            &commands::inventory::add_recipe(&procedure, &material, quantity_used, sale_price, &state)
                .await
                .map_err(|e| anyhow!(e))?,
        ),
        Command::Settings { key, value } => match key {
            Some(key) => {
                let value = value.unwrap_or_default();
                let settings = commands::settings::save_setting(&key, &value, &data_dir, &state)
                    .await
                    .map_err(|e| anyhow!(e))?;
                print_json(&settings)
            }
            None => print_json(&commands::settings::get_settings(&state).await.map_err(|e| anyhow!(e))?),
        },
        Command::WriteLog { limit } => {
            print_json(&commands::settings::get_write_log(limit, &state).await.map_err(|e| anyhow!(e))?)
        }
        Command::Reload => {
            let outcome = state.reload().await?;
            if let Some(error) = outcome.error {
                return Err(anyhow!(error));
            }
            println!(
                "Loaded {} appointments, {} materials, {} recipe lines",
                outcome.data.appointments.rows.len(),
                outcome.data.materials.rows.len(),
                outcome.data.recipes.rows.len()
            );
            Ok(())
        }
        Command::Watch => {
            state.restart_watcher()?;
            tracing::info!("Watching for workbook changes");
            let mut seen = state.change_count();
            loop {
                tokio::time::sleep(Duration::from_secs(1)).await;
                let current = state.change_count();
                if current != seen {
                    seen = current;
                    let outcome = state.load().await?;
                    println!(
                        "Reloaded after change: {} appointments, {} materials, {} recipe lines",
                        outcome.data.appointments.rows.len(),
                        outcome.data.materials.rows.len(),
                        outcome.data.recipes.rows.len()
                    );
                }
            }
        }
    }
}
