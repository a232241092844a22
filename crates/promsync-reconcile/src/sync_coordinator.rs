//! "Do it now" reconciliation: one pass at a time, errors returned to the caller.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use promsync_core::document::Document;
use promsync_core::error::ReconcileError;

use crate::pass::{PassReport, Reconciler};

pub struct SyncCoordinator {
    reconciler: Arc<Reconciler>,
    lock: Mutex<()>,
}

impl SyncCoordinator {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self {
            reconciler,
            lock: Mutex::new(()),
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Validate, write and reload a caller-supplied document.
    pub async fn apply_and_reload(&self, document: Document) -> Result<PassReport, ReconcileError> {
        let _guard = self.lock.lock().await;
        self.reconciler.apply_document(&document).await
    }

    /// Rebuild the document from the catalog and apply it.
    pub async fn update(&self) -> Result<PassReport, ReconcileError> {
        let _guard = self.lock.lock().await;
        self.reconciler.run_pass().await
    }

    /// Probe the engine and the checker, then run a full pass.
    pub async fn check(&self) -> Result<PassReport, ReconcileError> {
        let _guard = self.lock.lock().await;

        self.reconciler
            .reloader()
            .is_ready()
            .await
            .map_err(|e| ReconcileError::Infrastructure(format!("engine is not ready: {e}")))?;
        let version = self.reconciler.checker().version().await?;
        info!(%version, "Engine and checker are ready");

        self.reconciler.run_pass().await
    }
}
