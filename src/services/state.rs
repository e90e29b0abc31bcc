use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use crate::db::Database;
use crate::models::{Backend, ClinicData, DeductionOutcome, Settings};
use crate::services::cache::{CacheKey, SharedTableCache, TableCache};
use crate::services::credentials::ServiceAccountKey;
use crate::services::edits::{apply_edits, TableEdit};
use crate::services::inventory::{deduct_stock, mark_deducted, pending_deduction};
use crate::services::loader::{load_tables, LoadOutcome, SheetNames};
use crate::services::watcher::{TableChange, TableChangeKind, WatcherService};
use crate::services::writer::{save_table, ToGrid};
use crate::sheets::{CsvWorkbook, GoogleSheetsStore, Grid, SheetBackend, SheetStore};

/// Owns everything one session works with: the local store, the current
/// settings, the sheet backend, the read cache and the last loaded tables.
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub settings: Arc<Mutex<Settings>>,
    store: Mutex<Arc<SheetBackend>>,
    cache: SharedTableCache<Grid>,
    snapshot: Arc<Mutex<Option<ClinicData>>>,
    last_error: Mutex<Option<String>>,
    changes: Arc<AtomicU64>,
    watcher: Mutex<Option<WatcherService>>,
}

pub fn build_backend(settings: &Settings) -> Result<SheetBackend> {
    match settings.backend {
        Backend::Google => {
            let spreadsheet_id = settings
                .spreadsheet_id
                .clone()
                .filter(|id| !id.trim().is_empty())
                .ok_or_else(|| anyhow!("spreadsheet_id is required for the google backend"))?;
            let key = ServiceAccountKey::from_file(Path::new(&settings.credentials_path))?;
            Ok(SheetBackend::Google(GoogleSheetsStore::new(spreadsheet_id, key)))
        }
        Backend::Workbook => Ok(SheetBackend::Workbook(CsvWorkbook::new(PathBuf::from(
            &settings.workbook_dir,
        )))),
    }
}

/// The configured backend, or an unavailable one carrying the reason, so a
/// bad setting surfaces as a load error instead of stopping the session.
pub fn backend_or_unavailable(settings: &Settings) -> SheetBackend {
    build_backend(settings).unwrap_or_else(|err| {
        tracing::warn!("Sheet backend unavailable: {err:#}");
        SheetBackend::Unavailable(format!("{err:#}"))
    })
}

pub fn sheet_names(settings: &Settings) -> SheetNames {
    SheetNames {
        appointments: settings.appointments_sheet.clone(),
        materials: settings.materials_sheet.clone(),
        recipes: settings.recipes_sheet.clone(),
    }
}

impl AppState {
    pub fn new(db: Database, settings: Settings) -> Self {
        let store = backend_or_unavailable(&settings);
        Self::with_backend(db, settings, store)
    }

    pub fn with_backend(db: Database, settings: Settings, store: SheetBackend) -> Self {
        AppState {
            db: Arc::new(Mutex::new(db)),
            settings: Arc::new(Mutex::new(settings)),
            store: Mutex::new(Arc::new(store)),
            cache: TableCache::shared(),
            snapshot: Arc::new(Mutex::new(None)),
            last_error: Mutex::new(None),
            changes: Arc::new(AtomicU64::new(0)),
            watcher: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> Result<Settings> {
        Ok(self.settings.lock().map_err(|_| anyhow!("Settings lock"))?.clone())
    }

    fn store(&self) -> Result<Arc<SheetBackend>> {
        Ok(self.store.lock().map_err(|_| anyhow!("Store lock"))?.clone())
    }

    fn set_snapshot(&self, data: Option<ClinicData>) -> Result<()> {
        *self.snapshot.lock().map_err(|_| anyhow!("Snapshot lock"))? = data;
        Ok(())
    }

    fn update_snapshot(&self, update: impl FnOnce(&mut ClinicData)) -> Result<()> {
        let mut guard = self.snapshot.lock().map_err(|_| anyhow!("Snapshot lock"))?;
        if let Some(data) = guard.as_mut() {
            update(data);
        }
        Ok(())
    }

    /// Message of the last failed load, if the current tables are empty
    /// because of one.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|guard| guard.clone())
    }

    /// Counts workbook changes seen by the watcher.
    pub fn change_count(&self) -> u64 {
        self.changes.load(Ordering::SeqCst)
    }

    pub async fn load(&self) -> Result<LoadOutcome> {
        let settings = self.settings()?;
        let store = self.store()?;
        let outcome = load_tables(
            store.as_ref(),
            &sheet_names(&settings),
            &self.cache,
            Duration::from_secs(settings.cache_ttl_secs),
        )
        .await;

        self.set_snapshot(Some(outcome.data.clone()))?;
        *self.last_error.lock().map_err(|_| anyhow!("Error lock"))? = outcome.error.clone();
        Ok(outcome)
    }

    /// The current tables, loading them on first use.
    pub async fn data(&self) -> Result<ClinicData> {
        let cached = self
            .snapshot
            .lock()
            .map_err(|_| anyhow!("Snapshot lock"))?
            .clone();
        match cached {
            Some(data) => Ok(data),
            None => Ok(self.load().await?.data),
        }
    }

    pub async fn reload(&self) -> Result<LoadOutcome> {
        self.cache.lock().map_err(|_| anyhow!("Cache lock"))?.clear();
        self.set_snapshot(None)?;
        self.load().await
    }

    async fn persist<T: ToGrid>(&self, sheet: &str, table: &T) -> Result<()> {
        let store = self.store()?;
        save_table(store.as_ref(), &self.db, sheet, table)
            .await
            .with_context(|| format!("Write sheet '{}'", sheet))?;
        let key = CacheKey::new(store.source_id(), sheet);
        if let Ok(mut cache) = self.cache.lock() {
            cache.invalidate(&key);
        }
        Ok(())
    }

    /// Applies edits to the appointments, writes the sheet and reloads.
    /// Nothing changes locally if the write fails.
    pub async fn save_appointments(&self, edits: &[TableEdit]) -> Result<LoadOutcome> {
        let data = self.data().await?;
        let next = apply_edits(&data.appointments, edits)?;
        self.persist(&self.settings()?.appointments_sheet, &next).await?;
        self.reload().await
    }

    pub async fn save_materials(&self, edits: &[TableEdit]) -> Result<LoadOutcome> {
        let data = self.data().await?;
        let next = apply_edits(&data.materials, edits)?;
        self.persist(&self.settings()?.materials_sheet, &next).await?;
        self.reload().await
    }

    pub async fn save_recipes(&self, edits: &[TableEdit]) -> Result<LoadOutcome> {
        let data = self.data().await?;
        let next = apply_edits(&data.recipes, edits)?;
        self.persist(&self.settings()?.recipes_sheet, &next).await?;
        self.reload().await
    }

    /// Deducts the materials of every pending appointment and marks those
    /// appointments as deducted. Materials are written first; the snapshot
    /// only follows writes that succeeded.
    pub async fn confirm_deduction(&self, today: NaiveDate) -> Result<DeductionOutcome> {
        let settings = self.settings()?;
        let data = self.data().await?;
        let (rows, pending) = pending_deduction(&data, today);
        if rows.is_empty() {
            tracing::info!("No appointments pending stock deduction");
            return Ok(DeductionOutcome {
                appointments_marked: 0,
                materials_updated: 0,
            });
        }

        let (materials, unknown) = deduct_stock(&data.materials, &pending.consumption);
        for name in &unknown {
            tracing::warn!(material = %name, "Consumed material not in the materials sheet; skipped");
        }
        self.persist(&settings.materials_sheet, &materials).await?;
        self.update_snapshot(|snapshot| snapshot.materials = materials)?;

        let appointments = mark_deducted(&data.appointments, &rows);
        self.persist(&settings.appointments_sheet, &appointments).await?;
        self.update_snapshot(|snapshot| snapshot.appointments = appointments)?;

        let outcome = DeductionOutcome {
            appointments_marked: rows.len(),
            materials_updated: pending.consumption.len() - unknown.len(),
        };
        tracing::info!(
            appointments = outcome.appointments_marked,
            materials = outcome.materials_updated,
            "Stock deducted"
        );
        Ok(outcome)
    }

    /// Replaces the settings, rebuilds the backend and drops everything
    /// loaded through the old one.
    pub fn update_settings(&self, settings: Settings) -> Result<()> {
        let store = backend_or_unavailable(&settings);
        *self.settings.lock().map_err(|_| anyhow!("Settings lock"))? = settings;
        *self.store.lock().map_err(|_| anyhow!("Store lock"))? = Arc::new(store);
        self.cache.lock().map_err(|_| anyhow!("Cache lock"))?.clear();
        self.set_snapshot(None)?;
        self.restart_watcher()
    }

    /// Watches the workbook folder when the workbook backend is active. A
    /// change drops the cached grid of that sheet and the loaded tables.
    pub fn restart_watcher(&self) -> Result<()> {
        let mut guard = self.watcher.lock().map_err(|_| anyhow!("Watcher lock"))?;
        *guard = None;

        let settings = self.settings()?;
        if settings.backend != Backend::Workbook {
            return Ok(());
        }

        let (tx, rx) = mpsc::channel();
        *guard = Some(WatcherService::start(PathBuf::from(&settings.workbook_dir), tx)?);

        let cache = self.cache.clone();
        let snapshot = self.snapshot.clone();
        let changes = self.changes.clone();
        std::thread::spawn(move || {
            for change in rx {
                handle_change(change, &cache, &snapshot, &changes);
            }
        });
        Ok(())
    }
}

fn handle_change(
    change: TableChange,
    cache: &SharedTableCache<Grid>,
    snapshot: &Mutex<Option<ClinicData>>,
    changes: &AtomicU64,
) {
    let dropped = cache
        .lock()
        .map(|mut cache| cache.invalidate_table(&change.table))
        .unwrap_or(0);
    if let Ok(mut snapshot) = snapshot.lock() {
        *snapshot = None;
    }
    changes.fetch_add(1, Ordering::SeqCst);
    match change.kind {
        TableChangeKind::Written => tracing::info!(table = %change.table, dropped, "Workbook sheet changed"),
        TableChangeKind::Removed => tracing::warn!(table = %change.table, dropped, "Workbook sheet removed"),
    }
}
