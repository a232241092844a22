//! "Batch it up" reconciliation: debounced, coalescing background worker.
//!
//! Requests only raise a [`PendingSignal`]. A single worker waits for it,
//! sleeps the debounce window, clears the flag and runs one pass, so any
//! number of requests arriving before the pass starts collapse into it.
//! A failed pass re-raises the signal and is retried after another debounce.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::pass::PassReport;
use crate::signal::PendingSignal;
use crate::sync_coordinator::SyncCoordinator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Idle,
    Debouncing,
    Running,
    Stopped,
}

/// Observable worker status.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub state: WorkerState,
    /// Passes started, successful or not.
    pub passes: u64,
    pub failures: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_report: Option<PassReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Default for WorkerStatus {
    fn default() -> Self {
        Self {
            state: WorkerState::Idle,
            passes: 0,
            failures: 0,
            last_report: None,
            last_error: None,
        }
    }
}

pub struct AsyncCoordinator {
    sync: Arc<SyncCoordinator>,
    signal: PendingSignal,
    debounce: Duration,
    status: watch::Sender<WorkerStatus>,
}

impl AsyncCoordinator {
    /// Passes go through `sync`, so they never overlap with direct calls on it.
    pub fn new(sync: Arc<SyncCoordinator>, debounce: Duration) -> Self {
        let (status, _) = watch::channel(WorkerStatus::default());
        Self {
            sync,
            signal: PendingSignal::new(),
            debounce,
            status,
        }
    }

    /// Ask for a reconciliation. Never blocks; repeated requests coalesce.
    pub fn request_update(&self) {
        debug!("Reconciliation requested");
        self.signal.raise();
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkerStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> WorkerStatus {
        self.status.borrow().clone()
    }

    fn set_state(&self, state: WorkerState) {
        self.status.send_modify(|s| s.state = state);
    }

    /// Start the worker loop on a background task.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    /// Worker loop. Returns once `cancel` fires while idle or debouncing; a
    /// pass that already started runs to completion first.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(debounce_ms = self.debounce.as_millis() as u64, "Reconciliation worker started");
        loop {
            self.set_state(WorkerState::Idle);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.signal.wait() => {}
            }

            self.set_state(WorkerState::Debouncing);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.debounce) => {}
            }

            self.signal.take();
            self.set_state(WorkerState::Running);
            let result = self.sync.update().await;

            match result {
                Ok(report) => {
                    self.status.send_modify(|s| {
                        s.passes += 1;
                        s.last_report = Some(report);
                        s.last_error = None;
                    });
                }
                Err(e) => {
                    error!(%e, "Reconciliation pass failed, will retry");
                    self.status.send_modify(|s| {
                        s.passes += 1;
                        s.failures += 1;
                        s.last_error = Some(e.to_string());
                    });
                    self.signal.raise();
                }
            }
        }
        self.set_state(WorkerState::Stopped);
        info!("Reconciliation worker stopped");
    }
}
