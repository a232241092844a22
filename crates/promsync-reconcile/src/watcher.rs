//! Inventory file watcher.
//!
//! Any change to the inventory file raises a reconciliation request on the
//! asynchronous coordinator; debouncing happens there.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{EventKind, RecursiveMode, Watcher};
use tracing::{debug, error, info};

use crate::async_coordinator::AsyncCoordinator;

pub struct CatalogWatcher {
    path: PathBuf,
    _watcher: notify::RecommendedWatcher,
}

impl CatalogWatcher {
    /// Start watching `path`, requesting an update on every change.
    pub fn start(path: PathBuf, coordinator: Arc<AsyncCoordinator>) -> anyhow::Result<Self> {
        let file_name = path.file_name().map(|n| n.to_os_string());

        let mut watcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    if is_relevant(&event, file_name.as_deref()) {
                        debug!(kind = ?event.kind, "Inventory changed");
                        coordinator.request_update();
                    }
                }
                Err(e) => {
                    error!(%e, "Inventory watch error");
                }
            })?;

        // Watch the parent directory to catch editors that replace the file.
        let watch_path = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        watcher.watch(&watch_path, RecursiveMode::NonRecursive)?;
        info!(path = %path.display(), "Inventory watcher started");

        Ok(Self {
            path,
            _watcher: watcher,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Content changes, creation or removal of the watched file name.
fn is_relevant(event: &notify::Event, file_name: Option<&OsStr>) -> bool {
    matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    ) && event
        .paths
        .iter()
        .any(|p| p.file_name().is_some() && p.file_name() == file_name)
}
