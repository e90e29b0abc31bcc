use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;

use crate::models::*;
use crate::services::cache::{CacheKey, SharedTableCache};
use crate::services::inventory::consolidate_materials;
use crate::sheets::{is_blank_row, Grid, SheetError, SheetStore};
use crate::utils::{coerce_number, coerce_number_or_zero, parse_day_first_date};

#[derive(Debug, Clone, PartialEq)]
pub struct SheetNames {
    pub appointments: String,
    pub materials: String,
    pub recipes: String,
}

impl Default for SheetNames {
    fn default() -> Self {
        SheetNames {
            appointments: "Respostas ao formulário 1".to_string(),
            materials: "Materiais".to_string(),
            recipes: "Ficha Técnica".to_string(),
        }
    }
}

impl SheetNames {
    pub fn all(&self) -> [&str; 3] {
        [
            self.appointments.as_str(),
            self.materials.as_str(),
            self.recipes.as_str(),
        ]
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Sheet(#[from] SheetError),
    #[error("Sheet '{sheet}' is missing required column '{column}'")]
    MissingColumn { sheet: String, column: String },
}

/// Result of a load: the tables, or empty tables plus the reason.
#[derive(Debug, Clone, Default)]
pub struct LoadOutcome {
    pub data: ClinicData,
    pub error: Option<String>,
}

/// Fetches and cleans the three tables. Never fails: any error yields three
/// empty tables and a message.
pub async fn load_tables<S: SheetStore>(
    store: &S,
    names: &SheetNames,
    cache: &SharedTableCache<Grid>,
    ttl: Duration,
) -> LoadOutcome {
    match try_load(store, names, cache, ttl).await {
        Ok(data) => {
            tracing::info!(
                source = store.source_id(),
                appointments = data.appointments.rows.len(),
                materials = data.materials.rows.len(),
                recipes = data.recipes.rows.len(),
                "Loaded clinic tables"
            );
            LoadOutcome { data, error: None }
        }
        Err(err) => {
            tracing::error!(source = store.source_id(), "Failed to load clinic tables: {err}");
            LoadOutcome {
                data: ClinicData::default(),
                error: Some(err.to_string()),
            }
        }
    }
}

async fn try_load<S: SheetStore>(
    store: &S,
    names: &SheetNames,
    cache: &SharedTableCache<Grid>,
    ttl: Duration,
) -> Result<ClinicData, LoadError> {
    let appointments = fetch_grid(store, &names.appointments, cache, ttl).await?;
    let materials = fetch_grid(store, &names.materials, cache, ttl).await?;
    let recipes = fetch_grid(store, &names.recipes, cache, ttl).await?;
    clean_tables(names, &appointments, &materials, &recipes)
}

async fn fetch_grid<S: SheetStore>(
    store: &S,
    table: &str,
    cache: &SharedTableCache<Grid>,
    ttl: Duration,
) -> Result<Grid, SheetError> {
    let key = CacheKey::new(store.source_id(), table);
    let cached = cache
        .lock()
        .ok()
        .and_then(|guard| guard.get(&key, ttl));
    if let Some(grid) = cached {
        tracing::debug!(table, "Sheet cache hit");
        return Ok(grid);
    }

    tracing::debug!(table, "Sheet cache miss");
    let grid = store.read_grid(table).await?;
    if let Ok(mut guard) = cache.lock() {
        guard.insert(key, grid.clone());
    }
    Ok(grid)
}

pub fn clean_tables(
    names: &SheetNames,
    appointments: &Grid,
    materials: &Grid,
    recipes: &Grid,
) -> Result<ClinicData, LoadError> {
    Ok(ClinicData {
        appointments: clean_appointments(&names.appointments, appointments)?,
        materials: clean_materials(&names.materials, materials)?,
        recipes: clean_recipes(&names.recipes, recipes)?,
    })
}

/// Header plus non-blank rows, headers trimmed and rows padded to header width.
struct RawSheet<'a> {
    name: &'a str,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl<'a> RawSheet<'a> {
    fn from_grid(name: &'a str, grid: &Grid) -> Self {
        let mut iter = grid.iter();
        let headers: Vec<String> = iter
            .next()
            .map(|header| {
                header
                    .iter()
                    .enumerate()
                    .map(|(i, h)| {
                        let trimmed = h.trim();
                        if trimmed.is_empty() {
                            format!("Unnamed: {}", i)
                        } else {
                            trimmed.to_string()
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        let width = headers.len();
        let rows = iter
            .filter(|row| !is_blank_row(row))
            .map(|row| {
                let mut cells: Vec<String> = row.iter().take(width).cloned().collect();
                cells.resize(width, String::new());
                cells
            })
            .filter(|row| !is_blank_row(row))
            .collect();

        RawSheet {
            name,
            headers,
            rows,
        }
    }

    /// An empty grid has no schema at all and loads as an empty table.
    fn has_schema(&self) -> bool {
        !self.headers.is_empty()
    }

    fn index(&self, column: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == column)
    }

    fn require(&self, column: &str) -> Result<usize, LoadError> {
        self.index(column).ok_or_else(|| LoadError::MissingColumn {
            sheet: self.name.to_string(),
            column: column.to_string(),
        })
    }

    fn extras(&self, row: &[String], known: &[&str]) -> BTreeMap<String, String> {
        self.headers
            .iter()
            .zip(row.iter())
            .filter(|(h, v)| !known.contains(&h.as_str()) && !v.is_empty())
            .map(|(h, v)| (h.clone(), v.clone()))
            .collect()
    }
}

const APPOINTMENT_COLUMNS: [&str; 8] = [
    COL_CLIENT,
    COL_PROFESSIONAL,
    COL_PROCEDURE,
    COL_DATE,
    COL_TIME,
    COL_AGE,
    COL_GENDER,
    COL_STOCK_DEDUCTED,
];

const RECIPE_COLUMNS: [&str; 4] = [
    COL_RECIPE_PROCEDURE,
    COL_MATERIAL,
    COL_QUANTITY_USED,
    COL_SALE_PRICE,
];

pub fn clean_gender(raw: &str) -> Option<String> {
    let value = raw.trim().to_uppercase();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

pub fn clean_deducted_flag(raw: &str) -> String {
    let value = raw.trim().to_uppercase();
    if value.is_empty() {
        DEDUCTED_NO.to_string()
    } else {
        value
    }
}

pub fn clean_appointments(sheet: &str, grid: &Grid) -> Result<AppointmentTable, LoadError> {
    let raw = RawSheet::from_grid(sheet, grid);
    if !raw.has_schema() {
        return Ok(AppointmentTable::default());
    }

    let client = raw.require(COL_CLIENT)?;
    let professional = raw.require(COL_PROFESSIONAL)?;
    let procedure = raw.require(COL_PROCEDURE)?;
    let date = raw.require(COL_DATE)?;
    let time = raw.require(COL_TIME)?;
    let age = raw.index(COL_AGE);
    let gender = raw.index(COL_GENDER);
    let deducted = raw.index(COL_STOCK_DEDUCTED);

    let mut columns = raw.headers.clone();
    if deducted.is_none() {
        columns.push(COL_STOCK_DEDUCTED.to_string());
    }

    let mut unparsed_dates = 0usize;
    let rows = raw
        .rows
        .iter()
        .map(|row| {
            let parsed_date = parse_day_first_date(&row[date]);
            if parsed_date.is_none() {
                unparsed_dates += 1;
            }
            Appointment {
                client: row[client].clone(),
                professional: row[professional].clone(),
                procedure: row[procedure].clone(),
                date: parsed_date,
                time: row[time].clone(),
                age: age.and_then(|i| coerce_number(&row[i])),
                gender: gender.and_then(|i| clean_gender(&row[i])),
                stock_deducted: deducted
                    .map(|i| clean_deducted_flag(&row[i]))
                    .unwrap_or_else(|| DEDUCTED_NO.to_string()),
                extra: raw.extras(row, &APPOINTMENT_COLUMNS),
            }
        })
        .collect::<Vec<_>>();

    if unparsed_dates > 0 {
        tracing::warn!(sheet, unparsed_dates, "Appointments with unparseable dates kept without a date");
    }

    Ok(AppointmentTable { columns, rows })
}

pub fn clean_materials(sheet: &str, grid: &Grid) -> Result<MaterialTable, LoadError> {
    let raw = RawSheet::from_grid(sheet, grid);
    if !raw.has_schema() {
        // An empty sheet is written back with every column.
        return Ok(MaterialTable {
            rows: Vec::new(),
            stock_columns: true,
        });
    }

    let name = raw.require(COL_MATERIAL)?;
    let unit_cost = raw.require(COL_UNIT_COST)?;
    let stock = raw.index(COL_STOCK_QUANTITY);
    let minimum = raw.index(COL_MINIMUM_STOCK);
    if stock.is_none() || minimum.is_none() {
        tracing::warn!(sheet, "Materials sheet has no stock columns; stock defaults to 0");
    }

    let rows = raw
        .rows
        .iter()
        .map(|row| Material {
            name: row[name].clone(),
            unit_cost: coerce_number_or_zero(&row[unit_cost]),
            stock_quantity: stock.map(|i| coerce_number_or_zero(&row[i])).unwrap_or(0.0),
            minimum_stock: minimum.map(|i| coerce_number_or_zero(&row[i])).unwrap_or(0.0),
        })
        .collect::<Vec<_>>();

    Ok(MaterialTable {
        rows: consolidate_materials(rows),
        stock_columns: stock.is_some() && minimum.is_some(),
    })
}

pub fn clean_recipes(sheet: &str, grid: &Grid) -> Result<RecipeTable, LoadError> {
    let raw = RawSheet::from_grid(sheet, grid);
    if !raw.has_schema() {
        return Ok(RecipeTable::default());
    }

    let procedure = raw.require(COL_RECIPE_PROCEDURE)?;
    let material = raw.require(COL_MATERIAL)?;
    let quantity = raw.require(COL_QUANTITY_USED)?;
    let price = raw.require(COL_SALE_PRICE)?;

    let rows = raw
        .rows
        .iter()
        .map(|row| ProcedureRecipe {
            procedure: row[procedure].clone(),
            material: row[material].clone(),
            quantity_used: coerce_number_or_zero(&row[quantity]),
            sale_price: coerce_number_or_zero(&row[price]),
            extra: raw.extras(row, &RECIPE_COLUMNS),
        })
        .collect();

    Ok(RecipeTable {
        columns: raw.headers.clone(),
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cache::TableCache;
    use crate::sheets::CsvWorkbook;
    use chrono::NaiveDate;

    fn grid(rows: &[&[&str]]) -> Grid {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    fn appointments_grid() -> Grid {
        grid(&[
            &[
                " Nome do Cliente ",
                "Profissional Responsável",
                "Procedimento Realizado",
                "Data do Atendimento",
                "Horário do Atendimento",
                "Idade",
                "Genero",
                "Carimbo de data/hora",
            ],
            &["Ana", "Dra. Lima", "Limpeza", "05/01/2024", "09:00", "30", " f ", "04/01/2024 10:00:00"],
            &["", "", "", "", "", "", "", ""],
            &["Bruno", "Dra. Lima", "Peeling", "ontem", "10:00", "trinta", "", ""],
        ])
    }

    #[test]
    fn appointments_are_cleaned() {
        let table = clean_appointments("Agenda", &appointments_grid()).unwrap();
        assert_eq!(table.rows.len(), 2, "blank row dropped");
        assert!(table.has_column(COL_CLIENT), "headers trimmed");
        assert!(table.has_column(COL_STOCK_DEDUCTED), "flag column added");

        let ana = &table.rows[0];
        assert_eq!(ana.date, NaiveDate::from_ymd_opt(2024, 1, 5));
        assert_eq!(ana.age, Some(30.0));
        assert_eq!(ana.gender.as_deref(), Some("F"));
        assert_eq!(ana.stock_deducted, DEDUCTED_NO);
        assert_eq!(
            ana.extra.get("Carimbo de data/hora").map(String::as_str),
            Some("04/01/2024 10:00:00")
        );

        let bruno = &table.rows[1];
        assert_eq!(bruno.date, None, "unparseable date kept as missing");
        assert_eq!(bruno.age, None, "invalid age is missing, not zero");
        assert_eq!(bruno.gender, None);
    }

    #[test]
    fn deducted_flag_is_normalized() {
        let g = grid(&[
            &[COL_CLIENT, COL_PROFESSIONAL, COL_PROCEDURE, COL_DATE, COL_TIME, COL_STOCK_DEDUCTED],
            &["Ana", "P", "X", "01/01/2024", "09:00", " sim "],
            &["Bia", "P", "X", "01/01/2024", "09:00", ""],
        ]);
        let table = clean_appointments("Agenda", &g).unwrap();
        assert_eq!(table.rows[0].stock_deducted, DEDUCTED_YES);
        assert_eq!(table.rows[1].stock_deducted, DEDUCTED_NO);
        assert_eq!(table.columns.len(), 6);
    }

    #[test]
    fn missing_required_column_is_an_error() {
        let g = grid(&[&[COL_CLIENT, COL_PROCEDURE], &["Ana", "X"]]);
        let err = clean_appointments("Agenda", &g).unwrap_err();
        assert!(matches!(err, LoadError::MissingColumn { ref column, .. } if column == COL_PROFESSIONAL));
    }

    #[test]
    fn empty_grid_is_an_empty_table() {
        assert!(clean_appointments("Agenda", &Vec::new()).unwrap().is_empty());
        let materials = clean_materials("Materiais", &Vec::new()).unwrap();
        assert!(materials.rows.is_empty());
        assert!(materials.stock_columns);
        assert!(clean_recipes("Ficha", &Vec::new()).unwrap().rows.is_empty());
    }

    #[test]
    fn materials_are_coerced_and_consolidated() {
        let g = grid(&[
            &["Material ", "Preco Unitario (R$)", "Quantidade em Estoque", "Estoque Mínimo"],
            &["Gaze", "1,50", "10", "4"],
            &["Luva", "abc", "", ""],
            &["Gaze", "9", "5", "8"],
        ]);
        let table = clean_materials("Materiais", &g).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert!(table.stock_columns);

        let gauze = table.find("Gaze").unwrap();
        assert_eq!(gauze.stock_quantity, 15.0);
        assert_eq!(gauze.unit_cost, 1.5);
        assert_eq!(gauze.minimum_stock, 4.0);

        let glove = table.find("Luva").unwrap();
        assert_eq!(glove.unit_cost, 0.0);
        assert_eq!(glove.stock_quantity, 0.0);
    }

    #[test]
    fn materials_without_stock_columns_default_to_zero() {
        let g = grid(&[&["Material", "Preco Unitario (R$)"], &["Gaze", "2"]]);
        let table = clean_materials("Materiais", &g).unwrap();
        assert_eq!(table.rows[0].stock_quantity, 0.0);
        assert_eq!(table.rows[0].minimum_stock, 0.0);
        assert!(!table.stock_columns);
    }

    #[test]
    fn recipes_are_coerced() {
        let g = grid(&[
            &["Procedimento", "Material", "Quantidade Usada", "Preco de Venda (R$)", "Obs"],
            &["Limpeza", "Gaze", "2", "100", "padrão"],
            &["Limpeza", "Luva", "", "x"],
        ]);
        let table = clean_recipes("Ficha Técnica", &g).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].quantity_used, 2.0);
        assert_eq!(table.rows[0].sale_price, 100.0);
        assert_eq!(table.rows[0].extra.get("Obs").map(String::as_str), Some("padrão"));
        assert_eq!(table.rows[1].quantity_used, 0.0);
        assert_eq!(table.rows[1].sale_price, 0.0);
    }

    #[tokio::test]
    async fn load_failure_yields_empty_tables_and_message() {
        let dir = tempfile::tempdir().unwrap();
        let workbook = CsvWorkbook::new(dir.path().to_path_buf());
        let cache = TableCache::shared();

        let outcome = load_tables(&workbook, &SheetNames::default(), &cache, Duration::from_secs(60)).await;
        assert!(outcome.data.is_empty());
        assert!(outcome.error.unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn load_reads_through_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let workbook = CsvWorkbook::new(dir.path().to_path_buf());
        let names = SheetNames::default();
        workbook.write_grid(&names.appointments, &appointments_grid()).await.unwrap();
        workbook
            .write_grid(&names.materials, &grid(&[&["Material", "Preco Unitario (R$)"], &["Gaze", "5"]]))
            .await
            .unwrap();
        workbook
            .write_grid(
                &names.recipes,
                &grid(&[&["Procedimento", "Material", "Quantidade Usada", "Preco de Venda (R$)"]]),
            )
            .await
            .unwrap();

        let cache = TableCache::shared();
        let ttl = Duration::from_secs(60);
        let first = load_tables(&workbook, &names, &cache, ttl).await;
        assert_eq!(first.error, None);
        assert_eq!(first.data.appointments.rows.len(), 2);

        // Removing the file does not matter while the cache is fresh.
        std::fs::remove_file(workbook.table_path(&names.materials)).unwrap();
        let second = load_tables(&workbook, &names, &cache, ttl).await;
        assert_eq!(second.error, None);
        assert_eq!(second.data, first.data);

        cache.lock().unwrap().clear();
        let third = load_tables(&workbook, &names, &cache, ttl).await;
        assert!(third.error.is_some());
    }
}
