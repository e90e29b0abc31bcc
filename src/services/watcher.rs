use anyhow::Result;
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::mpsc;

use crate::sheets::workbook::table_name_of;

#[derive(Debug, Clone, PartialEq)]
pub enum TableChangeKind {
    Written,
    Removed,
}

/// A workbook file changed on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct TableChange {
    pub table: String,
    pub kind: TableChangeKind,
}

pub struct WatcherService {
    _watcher: Option<RecommendedWatcher>,
}

impl WatcherService {
    /// Watches the workbook folder and reports changes to visible CSV files.
    /// A folder that does not exist yet is not watched.
    pub fn start(workbook_dir: PathBuf, tx: mpsc::Sender<TableChange>) -> Result<Self> {
        if !workbook_dir.exists() {
            tracing::warn!(dir = %workbook_dir.display(), "Workbook folder missing; not watching");
            return Ok(WatcherService { _watcher: None });
        }

        let mut watcher = recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(err) => {
                    tracing::warn!(error = %err, "Workbook watch error");
                    return;
                }
            };
            for change in changes_of(&event) {
                let _ = tx.send(change);
            }
        })?;
        watcher.watch(&workbook_dir, RecursiveMode::NonRecursive)?;
        tracing::info!(dir = %workbook_dir.display(), "Watching workbook folder");

        Ok(WatcherService {
            _watcher: Some(watcher),
        })
    }
}

fn changes_of(event: &Event) -> Vec<TableChange> {
    let kind = match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) => TableChangeKind::Written,
        EventKind::Remove(_) => TableChangeKind::Removed,
        _ => return Vec::new(),
    };
    event
        .paths
        .iter()
        .filter_map(|path| table_name_of(path))
        .map(|table| TableChange {
            table,
            kind: kind.clone(),
        })
        .collect()
}
