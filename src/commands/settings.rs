use std::path::Path;

use crate::db::Database;
use crate::models::{Backend, Settings, WriteLogEntry};
use crate::services::loader::SheetNames;
use crate::services::state::{build_backend, AppState};
use crate::utils::coerce_number;

pub const SETTING_KEYS: [&str; 9] = [
    "backend",
    "spreadsheet_id",
    "credentials_path",
    "workbook_dir",
    "appointments_sheet",
    "materials_sheet",
    "recipes_sheet",
    "cache_ttl_secs",
    "revenue_goal",
];

const DEFAULT_CREDENTIALS_PATH: &str = ".streamlit/credentials.json";
const DEFAULT_CACHE_TTL_SECS: u64 = 60;
const DEFAULT_REVENUE_GOAL: f64 = 10000.0;

fn parse_backend(value: &str) -> Option<Backend> {
    match value.trim().to_lowercase().as_str() {
        "google" => Some(Backend::Google),
        "workbook" => Some(Backend::Workbook),
        _ => None,
    }
}

/// Settings from the local store, with defaults for anything unset or
/// unreadable.
pub fn load_settings(db: &Database, data_dir: &Path) -> Settings {
    let get = |key: &str| db.get_setting(key).ok().flatten().filter(|v| !v.trim().is_empty());
    let sheets = SheetNames::default();

    Settings {
        backend: get("backend")
            .and_then(|v| parse_backend(&v))
            .unwrap_or(Backend::Workbook),
        spreadsheet_id: get("spreadsheet_id"),
        credentials_path: get("credentials_path").unwrap_or_else(|| DEFAULT_CREDENTIALS_PATH.to_string()),
        workbook_dir: get("workbook_dir")
            .unwrap_or_else(|| data_dir.join("workbook").to_string_lossy().to_string()),
        appointments_sheet: get("appointments_sheet").unwrap_or(sheets.appointments),
        materials_sheet: get("materials_sheet").unwrap_or(sheets.materials),
        recipes_sheet: get("recipes_sheet").unwrap_or(sheets.recipes),
        cache_ttl_secs: get("cache_ttl_secs")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_CACHE_TTL_SECS),
        revenue_goal: get("revenue_goal")
            .and_then(|v| coerce_number(&v))
            .unwrap_or(DEFAULT_REVENUE_GOAL),
    }
}

fn validate_setting(key: &str, value: &str) -> Result<(), String> {
    if !SETTING_KEYS.contains(&key) {
        return Err(format!("Unknown setting '{}'", key));
    }
    let valid = match key {
        "backend" => parse_backend(value).is_some(),
        "cache_ttl_secs" => value.trim().parse::<u64>().is_ok(),
        "revenue_goal" => coerce_number(value).is_some(),
        _ => true,
    };
    if valid {
        Ok(())
    } else {
        Err(format!("Invalid value '{}' for '{}'", value, key))
    }
}

pub async fn get_settings(state: &AppState) -> Result<Settings, String> {
    state.settings().map_err(|e| e.to_string())
}

/// Stores one setting and re-applies all settings. An empty value restores
/// the default.
pub async fn save_setting(
    key: &str,
    value: &str,
    data_dir: &Path,
    state: &AppState,
) -> Result<Settings, String> {
    let settings = {
        let db = state.db.lock().map_err(|_| "DB lock".to_string())?;
        let previous = db.get_setting(key).map_err(|e| e.to_string())?;
        if value.trim().is_empty() {
            if !SETTING_KEYS.contains(&key) {
                return Err(format!("Unknown setting '{}'", key));
            }
            db.clear_setting(key).map_err(|e| e.to_string())?;
        } else {
            validate_setting(key, value)?;
            db.set_setting(key, value.trim()).map_err(|e| e.to_string())?;
        }
        let settings = load_settings(&db, data_dir);

        // A stored value must leave the sheet backend buildable.
        if let Err(err) = build_backend(&settings) {
            match previous {
                Some(previous) => db.set_setting(key, &previous),
                None => db.clear_setting(key),
            }
            .map_err(|e| e.to_string())?;
            return Err(format!("Setting '{}' not saved: {:#}", key, err));
        }
        settings
    };

    state.update_settings(settings.clone()).map_err(|e| e.to_string())?;
    tracing::info!(key, "Setting saved");
    Ok(settings)
}

pub async fn get_write_log(limit: usize, state: &AppState) -> Result<Vec<WriteLogEntry>, String> {
    let db = state.db.lock().map_err(|_| "DB lock".to_string())?;
    db.recent_writes(limit).map_err(|e| e.to_string())
}
