use chrono::NaiveDate;
use clap::ValueEnum;
use serde::Serialize;

use crate::models::{DeductionOutcome, PendingDeduction, StockLine};
use crate::services::edits::{material_row, recipe_row, TableEdit};
use crate::services::inventory::{pending_deduction, stock_status};
use crate::services::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TableKind {
    Appointments,
    Materials,
    Recipes,
}

/// Row counts after a save and reload.
#[derive(Debug, Serialize)]
pub struct SaveSummary {
    pub appointments: usize,
    pub materials: usize,
    pub recipes: usize,
}

pub async fn get_stock_status(state: &AppState) -> Result<Vec<StockLine>, String> {
    let data = state.data().await.map_err(|e| e.to_string())?;
    Ok(stock_status(&data.materials))
}

pub async fn get_pending_deduction(today: NaiveDate, state: &AppState) -> Result<PendingDeduction, String> {
    let data = state.data().await.map_err(|e| e.to_string())?;
    Ok(pending_deduction(&data, today).1)
}

pub async fn confirm_deduction(today: NaiveDate, state: &AppState) -> Result<DeductionOutcome, String> {
    state.confirm_deduction(today).await.map_err(|e| e.to_string())
}

pub async fn edit_table(table: TableKind, edits: &[TableEdit], state: &AppState) -> Result<SaveSummary, String> {
    let outcome = match table {
        TableKind::Appointments => state.save_appointments(edits).await,
        TableKind::Materials => state.save_materials(edits).await,
        TableKind::Recipes => state.save_recipes(edits).await,
    }
    .map_err(|e| e.to_string())?;

    if let Some(error) = outcome.error {
        return Err(format!("Saved, but reload failed: {}", error));
    }
    Ok(SaveSummary {
        appointments: outcome.data.appointments.rows.len(),
        materials: outcome.data.materials.rows.len(),
        recipes: outcome.data.recipes.rows.len(),
    })
}

pub async fn add_material(
    name: &str,
    unit_cost: f64,
    stock_quantity: f64,
    minimum_stock: f64,
    state: &AppState,
) -> Result<SaveSummary, String> {
    let edit = material_row(name, unit_cost, stock_quantity, minimum_stock);
    edit_table(TableKind::Materials, &[edit], state).await
}

pub async fn add_recipe(
    procedure: &str,
    material: &str,
    quantity_used: f64,
    sale_price: f64,
    state: &AppState,
) -> Result<SaveSummary, String> {
    let edit = recipe_row(procedure, material, quantity_used, sale_price);
    edit_table(TableKind::Recipes, &[edit], state).await
}
