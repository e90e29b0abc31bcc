use std::fs;
use std::path::{Path, PathBuf};

use super::{Grid, SheetError, SheetStore};

/// A folder of `<sheet>.csv` files standing in for the cloud spreadsheet.
pub struct CsvWorkbook {
    dir: PathBuf,
    source_id: String,
}

impl CsvWorkbook {
    pub fn new(dir: PathBuf) -> Self {
        let source_id = format!("workbook:{}", dir.display());
        CsvWorkbook { dir, source_id }
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", table))
    }

    /// Sheet names present in the folder, sorted.
    pub fn table_names(&self) -> Vec<String> {
        let mut names = walkdir::WalkDir::new(&self.dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .filter_map(|e| table_name_of(e.path()))
            .collect::<Vec<_>>();
        names.sort();
        names
    }
}

/// Sheet name for a workbook file, `None` for anything that is not a visible CSV.
pub fn table_name_of(path: &Path) -> Option<String> {
    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);
    if !is_csv {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    if stem.starts_with('.') {
        return None;
    }
    Some(stem.to_string())
}

impl SheetStore for CsvWorkbook {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn read_grid(&self, table: &str) -> Result<Grid, SheetError> {
        let path = self.table_path(table);
        if !path.exists() {
            tracing::warn!(table, available = ?self.table_names(), "Sheet not in workbook");
            return Err(SheetError::SheetNotFound(table.to_string()));
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&path)?;

        let mut grid = Vec::new();
        for record in reader.records() {
            let record = record?;
            grid.push(record.iter().map(|cell| cell.to_string()).collect());
        }
        Ok(grid)
    }

    async fn write_grid(&self, table: &str, grid: &Grid) -> Result<(), SheetError> {
        fs::create_dir_all(&self.dir)?;
        let target = self.table_path(table);
        let staging = self.dir.join(format!(".{}.csv.tmp", table));

        {
            let mut writer = csv::WriterBuilder::new()
                .flexible(true)
                .from_path(&staging)?;
            for row in grid {
                writer.write_record(row)?;
            }
            writer.flush()?;
        }

        fs::rename(&staging, &target)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[&str]]) -> Grid {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[tokio::test]
    async fn write_then_read_returns_same_cells() {
        let dir = tempfile::tempdir().unwrap();
        let workbook = CsvWorkbook::new(dir.path().to_path_buf());
        let data = grid(&[
            &["Material", "Preco Unitario (R$)"],
            &["Gaze, estéril", "2.5"],
            &["Luva \"P\"", ""],
        ]);

        workbook.write_grid("Materiais", &data).await.unwrap();
        let back = workbook.read_grid("Materiais").await.unwrap();
        assert_eq!(back, data);
    }

    #[tokio::test]
    async fn write_replaces_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let workbook = CsvWorkbook::new(dir.path().to_path_buf());
        workbook
            .write_grid("Materiais", &grid(&[&["Material"], &["A"], &["B"]]))
            .await
            .unwrap();
        workbook
            .write_grid("Materiais", &grid(&[&["Material"], &["C"]]))
            .await
            .unwrap();

        let back = workbook.read_grid("Materiais").await.unwrap();
        assert_eq!(back, grid(&[&["Material"], &["C"]]));
        assert_eq!(workbook.table_names(), vec!["Materiais".to_string()]);
    }

    #[tokio::test]
    async fn missing_sheet_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let workbook = CsvWorkbook::new(dir.path().to_path_buf());
        let err = workbook.read_grid("Ficha Técnica").await.unwrap_err();
        assert!(matches!(err, SheetError::SheetNotFound(name) if name == "Ficha Técnica"));
    }

    #[test]
    fn staging_files_are_not_tables() {
        assert_eq!(table_name_of(Path::new("/w/Materiais.csv")).as_deref(), Some("Materiais"));
        assert_eq!(table_name_of(Path::new("/w/.Materiais.csv.tmp")), None);
        assert_eq!(table_name_of(Path::new("/w/notes.txt")), None);
    }
}
