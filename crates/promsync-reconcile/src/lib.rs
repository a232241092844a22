//! Safe replacement of the engine's scrape configuration.
//!
//! A pass builds a candidate document, has the external checker validate
//! it, swaps it in atomically and asks the engine to reload. If the write or
//! the reload fails the previous file is put back and reloaded, so the live
//! file is always either the validated new state or the unchanged old one.

pub mod async_coordinator;
pub mod checker;
pub mod pass;
pub mod reload;
pub mod signal;
pub mod sync_coordinator;
pub mod watcher;
pub mod writer;

pub use async_coordinator::{AsyncCoordinator, WorkerState, WorkerStatus};
pub use checker::{ConfigCheck, PromtoolChecker};
pub use pass::{PassReport, Reconciler, Settings};
pub use reload::{HttpReloader, Reload};
pub use sync_coordinator::SyncCoordinator;
pub use watcher::CatalogWatcher;

#[cfg(test)]
pub(crate) mod test_support;
