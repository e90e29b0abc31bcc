//! The external table boundary.
//!
//! A sheet is read and written as a grid of text cells whose first row is the
//! header. Writes replace the whole sheet; there is no append or patch.

pub mod google;
pub mod workbook;

use thiserror::Error;

pub use google::GoogleSheetsStore;
pub use workbook::CsvWorkbook;

pub type Grid = Vec<Vec<String>>;

/// Text that dataframe-style tooling writes for a missing value.
pub const NULL_TOKENS: [&str; 4] = ["nan", "NaT", "<NA>", "None"];

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("Sheet '{0}' not found")]
    SheetNotFound(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Unexpected response: {0}")]
    Decode(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Sheet backend unavailable: {0}")]
    Unavailable(String),
}

#[allow(async_fn_in_trait)]
pub trait SheetStore {
    /// Identifies the backing collection, used as part of cache keys.
    fn source_id(&self) -> &str;

    async fn read_grid(&self, table: &str) -> Result<Grid, SheetError>;

    /// Replaces the whole sheet with `grid`.
    async fn write_grid(&self, table: &str, grid: &Grid) -> Result<(), SheetError>;
}

pub enum SheetBackend {
    Google(GoogleSheetsStore),
    Workbook(CsvWorkbook),
    /// Settings that could not produce a backend. Every read and write
    /// fails with the reason.
    Unavailable(String),
}

impl SheetStore for SheetBackend {
    fn source_id(&self) -> &str {
        match self {
            SheetBackend::Google(store) => store.source_id(),
            SheetBackend::Workbook(store) => store.source_id(),
            SheetBackend::Unavailable(_) => "unavailable",
        }
    }

    async fn read_grid(&self, table: &str) -> Result<Grid, SheetError> {
        match self {
            SheetBackend::Google(store) => store.read_grid(table).await,
            SheetBackend::Workbook(store) => store.read_grid(table).await,
            SheetBackend::Unavailable(reason) => Err(SheetError::Unavailable(reason.clone())),
        }
    }

    async fn write_grid(&self, table: &str, grid: &Grid) -> Result<(), SheetError> {
        match self {
            SheetBackend::Google(store) => store.write_grid(table, grid).await,
            SheetBackend::Workbook(store) => store.write_grid(table, grid).await,
            SheetBackend::Unavailable(reason) => Err(SheetError::Unavailable(reason.clone())),
        }
    }
}

pub fn is_null_token(cell: &str) -> bool {
    NULL_TOKENS.contains(&cell)
}

pub fn is_blank_row(row: &[String]) -> bool {
    row.iter().all(|cell| cell.trim().is_empty())
}

/// Replaces missing-value tokens with empty cells.
pub fn sanitize_grid(grid: Grid) -> Grid {
    grid.into_iter()
        .map(|row| {
            row.into_iter()
                .map(|cell| if is_null_token(&cell) { String::new() } else { cell })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn sanitize_clears_only_exact_null_tokens() {
        let grid = vec![
            row(&["Material", "Preco Unitario (R$)"]),
            row(&["nan", "NaT"]),
            row(&["<NA>", "None"]),
            row(&["banana", "Nonentity"]),
        ];
        let clean = sanitize_grid(grid);
        assert_eq!(clean[1], row(&["", ""]));
        assert_eq!(clean[2], row(&["", ""]));
        assert_eq!(clean[3], row(&["banana", "Nonentity"]));
    }

    #[test]
    fn blank_rows_ignore_whitespace() {
        assert!(is_blank_row(&row(&["", "  ", "\t"])));
        assert!(is_blank_row(&[]));
        assert!(!is_blank_row(&row(&["", "x"])));
    }
}
