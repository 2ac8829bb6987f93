use std::path::Path;

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::debug;

use super::loader::is_warehouse_file;

/// Events emitted when the warehouse files change on disk.
#[derive(Debug)]
pub enum CatalogEvent {
    /// One or more warehouse files were created, modified or removed.
    Changed,
    /// The watcher itself failed.
    Error(anyhow::Error),
}

/// Keeps the filesystem watcher alive for the duration of the app.
pub struct CatalogWatcher {
    _watcher: RecommendedWatcher,
}

/// Watch `data_dir` for warehouse file changes, sending events to `sender`.
///
/// The notify callback runs on its own thread, so events are pushed into the
/// tokio channel with a blocking send. Dropping the returned handle stops
/// the watch.
pub fn watch_data_dir(
    data_dir: &Path,
    sender: mpsc::Sender<CatalogEvent>,
) -> Result<CatalogWatcher> {
    let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
        match result {
            Ok(event) => {
                if !is_catalog_change(&event) {
                    return;
                }
                debug!(?event.kind, "warehouse change detected");
                let _ = sender.blocking_send(CatalogEvent::Changed);
            }
            Err(err) => {
                let _ = sender.blocking_send(CatalogEvent::Error(err.into()));
            }
        }
    })
    .context("failed to create filesystem watcher")?;

    watcher
        .watch(data_dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("failed to watch {}", data_dir.display()))?;

    Ok(CatalogWatcher { _watcher: watcher })
}

fn is_catalog_change(event: &Event) -> bool {
    let relevant_kind = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    );
    relevant_kind && event.paths.iter().any(|path| is_warehouse_file(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind};
    use std::path::PathBuf;

    fn event(kind: EventKind, path: &str) -> Event {
        Event {
            kind,
            paths: vec![PathBuf::from(path)],
            attrs: Default::default(),
        }
    }

    #[test]
    fn only_warehouse_changes_count() {
        assert!(is_catalog_change(&event(
            EventKind::Create(CreateKind::File),
            "data/warehouse.txt"
        )));
        assert!(is_catalog_change(&event(
            EventKind::Modify(ModifyKind::Any),
            "data/warehouse_2.txt"
        )));
        assert!(!is_catalog_change(&event(
            EventKind::Create(CreateKind::File),
            "data/accounts.txt"
        )));
        assert!(!is_catalog_change(&event(
            EventKind::Access(notify::event::AccessKind::Any),
            "data/warehouse.txt"
        )));
    }
}
