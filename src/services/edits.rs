//! Table edits as values.
//!
//! An edit list is applied to a copy of a table; the input table is never
//! touched. Cells are coerced with the same rules the loader uses.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::models::*;
use crate::services::loader::{clean_deducted_flag, clean_gender};
use crate::utils::{coerce_number, coerce_number_or_zero, parse_day_first_date};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableEdit {
    SetCell {
        row: usize,
        column: String,
        value: String,
    },
    AppendRow(BTreeMap<String, String>),
    DeleteRow(usize),
}

#[derive(Debug, Error, PartialEq)]
pub enum EditError {
    #[error("Row {row} out of range (table has {len} rows)")]
    RowOutOfRange { row: usize, len: usize },
    #[error("Unknown column '{0}'")]
    UnknownColumn(String),
    #[error("Material name must not be empty")]
    EmptyMaterialName,
}

pub trait EditableTable: Clone {
    type Row;

    fn rows_mut(&mut self) -> &mut Vec<Self::Row>;
    fn blank_row(&self) -> Self::Row;
    fn set_field(&mut self, row: usize, column: &str, value: &str) -> Result<(), EditError>;

    fn validate_row(&self, _row: usize) -> Result<(), EditError> {
        Ok(())
    }
}

pub fn apply_edits<T: EditableTable>(table: &T, edits: &[TableEdit]) -> Result<T, EditError> {
    let mut next = table.clone();
    for edit in edits {
        match edit {
            TableEdit::SetCell { row, column, value } => {
                check_row(next.rows_mut().len(), *row)?;
                next.set_field(*row, column, value)?;
                next.validate_row(*row)?;
            }
            TableEdit::AppendRow(cells) => {
                let blank = next.blank_row();
                next.rows_mut().push(blank);
                let row = next.rows_mut().len() - 1;
                for (column, value) in cells {
                    next.set_field(row, column, value)?;
                }
                next.validate_row(row)?;
            }
            TableEdit::DeleteRow(row) => {
                check_row(next.rows_mut().len(), *row)?;
                next.rows_mut().remove(*row);
            }
        }
    }
    Ok(next)
}

fn check_row(len: usize, row: usize) -> Result<(), EditError> {
    if row < len {
        Ok(())
    } else {
        Err(EditError::RowOutOfRange { row, len })
    }
}

fn register_column(columns: &mut Vec<String>, column: &str) {
    if !columns.iter().any(|c| c == column) {
        columns.push(column.to_string());
    }
}

impl EditableTable for AppointmentTable {
    type Row = Appointment;

    fn rows_mut(&mut self) -> &mut Vec<Appointment> {
        &mut self.rows
    }

    fn blank_row(&self) -> Appointment {
        Appointment::default()
    }

    fn set_field(&mut self, row: usize, column: &str, value: &str) -> Result<(), EditError> {
        let len = self.rows.len();
        let appointment = self
            .rows
            .get_mut(row)
            .ok_or(EditError::RowOutOfRange { row, len })?;
        match column {
            COL_CLIENT => appointment.client = value.to_string(),
            COL_PROFESSIONAL => appointment.professional = value.to_string(),
            COL_PROCEDURE => appointment.procedure = value.to_string(),
            COL_DATE => appointment.date = parse_day_first_date(value),
            COL_TIME => appointment.time = value.to_string(),
            COL_AGE => appointment.age = coerce_number(value),
            COL_GENDER => appointment.gender = clean_gender(value),
            COL_STOCK_DEDUCTED => appointment.stock_deducted = clean_deducted_flag(value),
            _ => {
                appointment.extra.insert(column.to_string(), value.to_string());
            }
        }
        register_column(&mut self.columns, column);
        Ok(())
    }
}

impl EditableTable for MaterialTable {
    type Row = Material;

    fn rows_mut(&mut self) -> &mut Vec<Material> {
        &mut self.rows
    }

    fn blank_row(&self) -> Material {
        Material {
            name: String::new(),
            unit_cost: 0.0,
            stock_quantity: 0.0,
            minimum_stock: 0.0,
        }
    }

    fn set_field(&mut self, row: usize, column: &str, value: &str) -> Result<(), EditError> {
        let len = self.rows.len();
        let material = self
            .rows
            .get_mut(row)
            .ok_or(EditError::RowOutOfRange { row, len })?;
        match column {
            COL_MATERIAL => material.name = value.trim().to_string(),
            COL_UNIT_COST => material.unit_cost = coerce_number_or_zero(value),
            COL_STOCK_QUANTITY => material.stock_quantity = coerce_number_or_zero(value),
            COL_MINIMUM_STOCK => material.minimum_stock = coerce_number_or_zero(value),
            other => return Err(EditError::UnknownColumn(other.to_string())),
        }
        Ok(())
    }

    fn validate_row(&self, row: usize) -> Result<(), EditError> {
        match self.rows.get(row) {
            Some(material) if material.name.is_empty() => Err(EditError::EmptyMaterialName),
            _ => Ok(()),
        }
    }
}

impl EditableTable for RecipeTable {
    type Row = ProcedureRecipe;

    fn rows_mut(&mut self) -> &mut Vec<ProcedureRecipe> {
        &mut self.rows
    }

    fn blank_row(&self) -> ProcedureRecipe {
        ProcedureRecipe {
            procedure: String::new(),
            material: String::new(),
            quantity_used: 0.0,
            sale_price: 0.0,
            extra: BTreeMap::new(),
        }
    }

    fn set_field(&mut self, row: usize, column: &str, value: &str) -> Result<(), EditError> {
        let len = self.rows.len();
        let recipe = self
            .rows
            .get_mut(row)
            .ok_or(EditError::RowOutOfRange { row, len })?;
        match column {
            COL_RECIPE_PROCEDURE => recipe.procedure = value.to_string(),
            COL_MATERIAL => recipe.material = value.to_string(),
            COL_QUANTITY_USED => recipe.quantity_used = coerce_number_or_zero(value),
            COL_SALE_PRICE => recipe.sale_price = coerce_number_or_zero(value),
            _ => {
                recipe.extra.insert(column.to_string(), value.to_string());
            }
        }
        register_column(&mut self.columns, column);
        Ok(())
    }
}

/// Cells for a new material row.
pub fn material_row(name: &str, unit_cost: f64, stock_quantity: f64, minimum_stock: f64) -> TableEdit {
    TableEdit::AppendRow(BTreeMap::from([
        (COL_MATERIAL.to_string(), name.to_string()),
        (COL_UNIT_COST.to_string(), unit_cost.to_string()),
        (COL_STOCK_QUANTITY.to_string(), stock_quantity.to_string()),
        (COL_MINIMUM_STOCK.to_string(), minimum_stock.to_string()),
    ]))
}

/// Cells for a new recipe line.
pub fn recipe_row(procedure: &str, material: &str, quantity_used: f64, sale_price: f64) -> TableEdit {
    TableEdit::AppendRow(BTreeMap::from([
        (COL_RECIPE_PROCEDURE.to_string(), procedure.to_string()),
        (COL_MATERIAL.to_string(), material.to_string()),
        (COL_QUANTITY_USED.to_string(), quantity_used.to_string()),
        (COL_SALE_PRICE.to_string(), sale_price.to_string()),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn set(row: usize, column: &str, value: &str) -> TableEdit {
        TableEdit::SetCell {
            row,
            column: column.to_string(),
            value: value.to_string(),
        }
    }

    fn appointments() -> AppointmentTable {
        AppointmentTable {
            columns: vec![COL_CLIENT.to_string(), COL_DATE.to_string()],
            rows: vec![
                Appointment {
                    client: "Ana".to_string(),
                    ..Appointment::default()
                },
                Appointment {
                    client: "Bia".to_string(),
                    ..Appointment::default()
                },
            ],
        }
    }

    #[test]
    fn set_cell_coerces_known_columns() {
        let table = appointments();
        let edited = apply_edits(
            &table,
            &[
                set(0, COL_DATE, "05/01/2024"),
                set(0, COL_AGE, "abc"),
                set(1, COL_AGE, "41,5"),
                set(1, COL_GENDER, " f "),
                set(1, COL_STOCK_DEDUCTED, "sim"),
            ],
        )
        .unwrap();

        assert_eq!(edited.rows[0].date, NaiveDate::from_ymd_opt(2024, 1, 5));
        assert_eq!(edited.rows[0].age, None);
        assert_eq!(edited.rows[1].age, Some(41.5));
        assert_eq!(edited.rows[1].gender.as_deref(), Some("F"));
        assert_eq!(edited.rows[1].stock_deducted, DEDUCTED_YES);
        assert!(edited.has_column(COL_AGE));

        assert_eq!(table.rows[0].date, None);
        assert!(!table.has_column(COL_AGE));
    }

    #[test]
    fn unknown_columns_become_extra_cells() {
        let edited = apply_edits(&appointments(), &[set(0, "Observações", "retorno")]).unwrap();
        assert_eq!(edited.rows[0].extra.get("Observações").map(String::as_str), Some("retorno"));
        assert!(edited.has_column("Observações"));
    }

    #[test]
    fn out_of_range_row_rejects_the_whole_batch() {
        let table = appointments();
        let result = apply_edits(&table, &[set(0, COL_CLIENT, "Carla"), TableEdit::DeleteRow(5)]);
        assert_eq!(result, Err(EditError::RowOutOfRange { row: 5, len: 2 }));
        assert_eq!(table.rows[0].client, "Ana");
    }

    #[test]
    fn edits_apply_in_order() {
        let edited = apply_edits(
            &appointments(),
            &[
                TableEdit::DeleteRow(0),
                set(0, COL_CLIENT, "Bianca"),
                TableEdit::AppendRow(BTreeMap::from([(COL_CLIENT.to_string(), "Caio".to_string())])),
            ],
        )
        .unwrap();
        let names: Vec<&str> = edited.rows.iter().map(|a| a.client.as_str()).collect();
        assert_eq!(names, vec!["Bianca", "Caio"]);
        assert_eq!(edited.rows[1].stock_deducted, DEDUCTED_NO);
    }

    #[test]
    fn material_without_name_is_rejected() {
        let table = MaterialTable::default();
        assert_eq!(
            apply_edits(&table, &[material_row("  ", 1.0, 2.0, 3.0)]),
            Err(EditError::EmptyMaterialName)
        );

        let added = apply_edits(&table, &[material_row("Gaze", 1.5, 10.0, 2.0)]).unwrap();
        assert_eq!(added.rows[0].name, "Gaze");
        assert_eq!(added.rows[0].unit_cost, 1.5);

        assert_eq!(
            apply_edits(&added, &[set(0, COL_MATERIAL, "")]),
            Err(EditError::EmptyMaterialName)
        );
        assert_eq!(
            apply_edits(&added, &[set(0, "Fornecedor", "X")]),
            Err(EditError::UnknownColumn("Fornecedor".to_string()))
        );
    }

    #[test]
    fn recipe_rows_are_appended_with_numbers() {
        let table = RecipeTable::default();
        let edited = apply_edits(&table, &[recipe_row("Peel", "Acid", 0.25, 180.0)]).unwrap();
        assert_eq!(edited.rows[0].quantity_used, 0.25);
        assert_eq!(edited.rows[0].sale_price, 180.0);
        assert!(edited.columns.iter().any(|c| c == COL_SALE_PRICE));
    }
}
