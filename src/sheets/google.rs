use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Grid, SheetError, SheetStore};
use crate::services::credentials::{ServiceAccountAuth, ServiceAccountKey};
use crate::utils::format_number;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const LAST_COLUMN: &str = "ZZZ";

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Serialize)]
struct ValueRangeBody<'a> {
    range: &'a str,
    #[serde(rename = "majorDimension")]
    major_dimension: &'a str,
    values: &'a Grid,
}

/// Google Sheets values API, one worksheet per table.
pub struct GoogleSheetsStore {
    client: reqwest::Client,
    spreadsheet_id: String,
    source_id: String,
    auth: ServiceAccountAuth,
}

impl GoogleSheetsStore {
    pub fn new(spreadsheet_id: String, key: ServiceAccountKey) -> Self {
        GoogleSheetsStore {
            client: reqwest::Client::new(),
            source_id: format!("gsheets:{}", spreadsheet_id),
            spreadsheet_id,
            auth: ServiceAccountAuth::new(key),
        }
    }

    fn values_url(&self, range: &str, suffix: &str) -> Result<Url, SheetError> {
        let mut url = Url::parse(SHEETS_API).map_err(|e| SheetError::Decode(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| SheetError::Decode("Invalid API base URL".to_string()))?
            .push(&self.spreadsheet_id)
            .push("values")
            .push(&format!("{}{}", range, suffix));
        Ok(url)
    }

    fn batch_clear_url(&self) -> Result<Url, SheetError> {
        let mut url = Url::parse(SHEETS_API).map_err(|e| SheetError::Decode(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| SheetError::Decode("Invalid API base URL".to_string()))?
            .push(&self.spreadsheet_id)
            .push("values:batchClear");
        Ok(url)
    }

    async fn check(response: reqwest::Response, table: &str) -> Result<reqwest::Response, SheetError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        if status == 400 && body.contains("Unable to parse range") {
            return Err(SheetError::SheetNotFound(table.to_string()));
        }
        Err(SheetError::Http { status, body })
    }
}

impl SheetStore for GoogleSheetsStore {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn read_grid(&self, table: &str) -> Result<Grid, SheetError> {
        let token = self.auth.access_token(&self.client).await?;
        let url = self.values_url(&sheet_range(table), "")?;
        let response = self
            .client
            .get(url)
            .query(&[
                ("majorDimension", "ROWS"),
                ("valueRenderOption", "UNFORMATTED_VALUE"),
                ("dateTimeRenderOption", "FORMATTED_STRING"),
            ])
            .bearer_auth(token)
            .send()
            .await?;
        let response = Self::check(response, table).await?;

        let body: ValueRange = response
            .json()
            .await
            .map_err(|e| SheetError::Decode(e.to_string()))?;
        Ok(values_to_grid(body.values))
    }

    /// Writes every cell from `A1` first, then clears what lies beyond the
    /// new grid. A failure part way leaves stale trailing cells at worst,
    /// never an emptied sheet.
    async fn write_grid(&self, table: &str, grid: &Grid) -> Result<(), SheetError> {
        let token = self.auth.access_token(&self.client).await?;
        let range = sheet_range(table);
        let (values, width) = padded(grid);

        if !values.is_empty() {
            let anchor = format!("{}!A1", range);
            let update_url = self.values_url(&anchor, "")?;
            let response = self
                .client
                .put(update_url)
                .query(&[("valueInputOption", "USER_ENTERED")])
                .bearer_auth(&token)
                .json(&ValueRangeBody {
                    range: &anchor,
                    major_dimension: "ROWS",
                    values: &values,
                })
                .send()
                .await?;
            Self::check(response, table).await?;
        }

        let clear_url = self.batch_clear_url()?;
        let response = self
            .client
            .post(clear_url)
            .bearer_auth(&token)
            .json(&serde_json::json!({ "ranges": leftover_ranges(&range, values.len(), width) }))
            .send()
            .await?;
        Self::check(response, table).await?;
        Ok(())
    }
}

/// Rows padded to the widest row, so short rows overwrite old trailing cells.
fn padded(grid: &Grid) -> (Grid, usize) {
    let width = grid.iter().map(|row| row.len()).max().unwrap_or(0);
    let values = grid
        .iter()
        .map(|row| {
            let mut row = row.clone();
            row.resize(width, String::new());
            row
        })
        .collect();
    (values, width)
}

/// Column letters for a 1-based column number.
fn column_letter(mut column: usize) -> String {
    let mut letters = Vec::new();
    while column > 0 {
        letters.push((b'A' + ((column - 1) % 26) as u8) as char);
        column = (column - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Ranges outside a `rows` by `width` block anchored at `A1`.
fn leftover_ranges(range: &str, rows: usize, width: usize) -> Vec<String> {
    if rows == 0 || width == 0 {
        return vec![range.to_string()];
    }
    vec![
        format!("{}!A{}:{}", range, rows + 1, LAST_COLUMN),
        format!("{}!{}1:{}", range, column_letter(width + 1), LAST_COLUMN),
    ]
}

/// A1 range naming a whole worksheet; quotes are doubled inside the name.
fn sheet_range(table: &str) -> String {
    format!("'{}'", table.replace('\'', "''"))
}

fn values_to_grid(values: Vec<Vec<Value>>) -> Grid {
    values
        .into_iter()
        .map(|row| row.into_iter().map(|cell| cell_to_string(&cell)).collect())
        .collect()
}

fn cell_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => if *b { "TRUE".to_string() } else { "FALSE".to_string() },
        Value::Number(n) => n.as_f64().map(format_number).unwrap_or_else(|| n.to_string()),
        other => other.to_string(),
    }
}
