//! Merge server and generated jobs into the base document and serialize it.

use std::collections::{BTreeMap, BTreeSet};

use promsync_core::catalog::MetricsResolutions;
use promsync_core::config::ServerJobConfig;
use promsync_core::document::{Document, ScrapeJob, TargetGroup};
use promsync_core::error::ConfigError;

use crate::builder::scrape_timeout;

/// Header written above the YAML body.
pub fn banner(component: &str) -> String {
    format!("# Managed by {component}. DO NOT EDIT.\n---\n")
}

/// Serialized document produced once per pass. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateBytes(Vec<u8>);

impl CandidateBytes {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CandidateBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Scrape job for one of the server's own components.
pub fn server_job(config: &ServerJobConfig, resolutions: &MetricsResolutions) -> ScrapeJob {
    let interval = resolutions.interval(config.tier);
    ScrapeJob {
        job_name: config.job_name.clone(),
        scrape_interval: Some(interval),
        scrape_timeout: Some(scrape_timeout(interval)),
        metrics_path: Some(config.metrics_path.clone()),
        static_configs: vec![TargetGroup {
            targets: config.targets.clone(),
            labels: BTreeMap::from([("instance".to_string(), config.instance().to_string())]),
        }],
        ..Default::default()
    }
}

/// Build the final document: base jobs first, then server jobs, then
/// generated jobs. Global interval and timeout default to the low
/// resolution when the base leaves them unset.
pub fn assemble(
    mut base: Document,
    server_jobs: &[ServerJobConfig],
    generated: Vec<ScrapeJob>,
    resolutions: &MetricsResolutions,
) -> Result<Document, ConfigError> {
    if base.global.scrape_interval.is_none() {
        base.global.scrape_interval = Some(resolutions.lr);
    }
    if base.global.scrape_timeout.is_none() {
        base.global.scrape_timeout = Some(scrape_timeout(resolutions.lr));
    }

    base.scrape_configs
        .extend(server_jobs.iter().map(|j| server_job(j, resolutions)));
    base.scrape_configs.extend(generated);

    let mut seen = BTreeSet::new();
    for job in &base.scrape_configs {
        if !seen.insert(job.job_name.as_str()) {
            return Err(ConfigError::DuplicateJob(job.job_name.clone()));
        }
        job.validate()?;
    }

    Ok(base)
}

/// Serialize a document with the managed-file banner.
pub fn to_candidate_bytes(
    document: &Document,
    component: &str,
) -> Result<CandidateBytes, serde_yaml::Error> {
    let body = serde_yaml::to_string(document)?;
    let mut bytes = banner(component).into_bytes();
    bytes.extend_from_slice(body.as_bytes());
    Ok(CandidateBytes(bytes))
}
