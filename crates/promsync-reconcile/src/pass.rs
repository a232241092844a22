//! One reconciliation pass: catalog → document → check → write → reload.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use promsync_core::catalog::Catalog;
use promsync_core::config::{Config, ServerJobConfig};
use promsync_core::document::Document;
use promsync_core::error::ReconcileError;
use promsync_scrape::ProducerRegistry;
use promsync_scrape::assembler::{self, CandidateBytes};
use promsync_scrape::base::load_base_config;
use promsync_scrape::builder::build_jobs;

use crate::checker::ConfigCheck;
use crate::reload::Reload;
use crate::writer;

/// Passes slower than this are logged as warnings.
const SLOW_PASS: Duration = Duration::from_secs(1);

/// Where the document goes and what it is built from.
#[derive(Debug, Clone)]
pub struct Settings {
    pub scrape_config_path: PathBuf,
    pub base_config_path: PathBuf,
    pub component: String,
    pub server_jobs: Vec<ServerJobConfig>,
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            scrape_config_path: config.scrape_config_path(),
            base_config_path: config.base_config_path(),
            component: config.component(),
            server_jobs: config.server_jobs(),
        }
    }
}

/// Outcome of a successful pass.
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub jobs: usize,
    pub bytes: usize,
}

/// Owns everything a pass needs. Not synchronized; callers serialize passes.
pub struct Reconciler {
    catalog: Arc<dyn Catalog>,
    registry: ProducerRegistry,
    checker: Arc<dyn ConfigCheck>,
    reloader: Arc<dyn Reload>,
    settings: Settings,
}

impl Reconciler {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        checker: Arc<dyn ConfigCheck>,
        reloader: Arc<dyn Reload>,
        settings: Settings,
    ) -> Self {
        Self {
            catalog,
            registry: ProducerRegistry::with_defaults(),
            checker,
            reloader,
            settings,
        }
    }

    pub fn with_registry(mut self, registry: ProducerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn checker(&self) -> &dyn ConfigCheck {
        self.checker.as_ref()
    }

    pub fn reloader(&self) -> &dyn Reload {
        self.reloader.as_ref()
    }

    /// Build the document for the current catalog state without writing it.
    pub async fn render(&self) -> Result<Document, ReconcileError> {
        let snapshot = self
            .catalog
            .snapshot()
            .await
            .map_err(ReconcileError::Catalog)?;
        let base = load_base_config(&self.settings.base_config_path).await;
        let generated = build_jobs(&snapshot, &self.registry)?;
        let document = assembler::assemble(
            base,
            &self.settings.server_jobs,
            generated,
            &snapshot.resolutions,
        )?;
        Ok(document)
    }

    pub fn serialize(&self, document: &Document) -> Result<CandidateBytes, ReconcileError> {
        Ok(assembler::to_candidate_bytes(
            document,
            &self.settings.component,
        )?)
    }

    /// Full pass from the catalog.
    pub async fn run_pass(&self) -> Result<PassReport, ReconcileError> {
        let started_at = Utc::now();
        let start = Instant::now();
        let document = self.render().await?;
        self.apply(&document, started_at, start).await
    }

    /// Validate, write and reload a caller-supplied document.
    pub async fn apply_document(&self, document: &Document) -> Result<PassReport, ReconcileError> {
        self.apply(document, Utc::now(), Instant::now()).await
    }

    async fn apply(
        &self,
        document: &Document,
        started_at: DateTime<Utc>,
        start: Instant,
    ) -> Result<PassReport, ReconcileError> {
        let candidate = self.serialize(document)?;
        debug!(bytes = candidate.len(), "Checking candidate configuration");
        self.checker.check(&candidate).await?;

        writer::commit(
            &self.settings.scrape_config_path,
            candidate.as_bytes(),
            self.reloader.as_ref(),
        )
        .await?;

        let elapsed = start.elapsed();
        let report = PassReport {
            started_at,
            duration_ms: elapsed.as_millis() as u64,
            jobs: document.scrape_configs.len(),
            bytes: candidate.len(),
        };
        if elapsed > SLOW_PASS {
            warn!(duration_ms = report.duration_ms, jobs = report.jobs, "Slow reconciliation pass");
        } else {
            info!(duration_ms = report.duration_ms, jobs = report.jobs, "Reconciliation pass done");
        }
        Ok(report)
    }
}
