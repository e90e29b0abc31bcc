use std::sync::Mutex;

use crate::db::Database;
use crate::models::*;
use crate::sheets::{sanitize_grid, Grid, SheetError, SheetStore};
use crate::utils::{format_number, format_sheet_date, sha256_grid};

const DEFAULT_APPOINTMENT_COLUMNS: [&str; 6] = [
    COL_CLIENT,
    COL_PROFESSIONAL,
    COL_PROCEDURE,
    COL_DATE,
    COL_TIME,
    COL_STOCK_DEDUCTED,
];

const DEFAULT_RECIPE_COLUMNS: [&str; 4] = [
    COL_RECIPE_PROCEDURE,
    COL_MATERIAL,
    COL_QUANTITY_USED,
    COL_SALE_PRICE,
];

/// Header row followed by one text row per record.
pub trait ToGrid {
    fn to_grid(&self) -> Grid;
}

fn header_or_default(columns: &[String], default: &[&str]) -> Vec<String> {
    if columns.is_empty() {
        default.iter().map(|c| c.to_string()).collect()
    } else {
        columns.to_vec()
    }
}

fn optional_number(value: Option<f64>) -> String {
    value.map(format_number).unwrap_or_default()
}

impl ToGrid for AppointmentTable {
    fn to_grid(&self) -> Grid {
        let header = header_or_default(&self.columns, &DEFAULT_APPOINTMENT_COLUMNS);
        let mut grid = Vec::with_capacity(self.rows.len() + 1);
        for a in &self.rows {
            let row = header
                .iter()
                .map(|column| match column.as_str() {
                    COL_CLIENT => a.client.clone(),
                    COL_PROFESSIONAL => a.professional.clone(),
                    COL_PROCEDURE => a.procedure.clone(),
                    COL_DATE => a.date.map(format_sheet_date).unwrap_or_default(),
                    COL_TIME => a.time.clone(),
                    COL_AGE => optional_number(a.age),
                    COL_GENDER => a.gender.clone().unwrap_or_default(),
                    COL_STOCK_DEDUCTED => a.stock_deducted.clone(),
                    other => a.extra.get(other).cloned().unwrap_or_default(),
                })
                .collect();
            grid.push(row);
        }
        grid.insert(0, header);
        grid
    }
}

/// Stock columns are written only for sheets that track stock.
impl ToGrid for MaterialTable {
    fn to_grid(&self) -> Grid {
        let width = if self.stock_columns { MATERIAL_COLUMNS.len() } else { 2 };
        let mut grid = vec![MATERIAL_COLUMNS[..width].iter().map(|c| c.to_string()).collect()];
        grid.extend(self.rows.iter().map(|m| {
            let mut row = vec![m.name.clone(), format_number(m.unit_cost)];
            if self.stock_columns {
                row.push(format_number(m.stock_quantity));
                row.push(format_number(m.minimum_stock));
            }
            row
        }));
        grid
    }
}

impl ToGrid for RecipeTable {
    fn to_grid(&self) -> Grid {
        let header = header_or_default(&self.columns, &DEFAULT_RECIPE_COLUMNS);
        let mut grid = Vec::with_capacity(self.rows.len() + 1);
        for r in &self.rows {
            let row = header
                .iter()
                .map(|column| match column.as_str() {
                    COL_RECIPE_PROCEDURE => r.procedure.clone(),
                    COL_MATERIAL => r.material.clone(),
                    COL_QUANTITY_USED => format_number(r.quantity_used),
                    COL_SALE_PRICE => format_number(r.sale_price),
                    other => r.extra.get(other).cloned().unwrap_or_default(),
                })
                .collect();
            grid.push(row);
        }
        grid.insert(0, header);
        grid
    }
}

/// Replaces `sheet` with `grid` after clearing missing-value tokens. Every
/// attempt is recorded in the write log, successful or not.
pub async fn save_grid<S: SheetStore>(
    store: &S,
    db: &Mutex<Database>,
    sheet: &str,
    grid: Grid,
) -> Result<(), SheetError> {
    let grid = sanitize_grid(grid);
    let row_count = grid.len().saturating_sub(1);
    let grid_hash = sha256_grid(&grid);

    let result = store.write_grid(sheet, &grid).await;
    let (status, message) = match &result {
        Ok(()) => {
            tracing::info!(sheet, rows = row_count, source = store.source_id(), "Sheet written");
            ("success", None)
        }
        Err(err) => {
            tracing::error!(sheet, rows = row_count, error = %err, "Sheet write failed");
            ("failed", Some(err.to_string()))
        }
    };

    match db.lock() {
        Ok(db) => {
            if let Err(err) = db.log_write(sheet, row_count, &grid_hash, status, message.as_deref()) {
                tracing::warn!(sheet, error = %err, "Could not record write attempt");
            }
        }
        Err(_) => tracing::warn!(sheet, "DB lock poisoned; write attempt not recorded"),
    }

    result
}

pub async fn save_table<S: SheetStore, T: ToGrid>(
    store: &S,
    db: &Mutex<Database>,
    sheet: &str,
    table: &T,
) -> Result<(), SheetError> {
    save_grid(store, db, sheet, table.to_grid()).await
}
