use std::collections::BTreeSet;

use promsync_core::catalog::{AgentType, MetricsResolutions, Tier};
use promsync_core::document::{ScrapeJob, TargetGroup};
use promsync_core::duration::format_job_interval;
use promsync_core::error::ConfigError;

use super::{ScrapeParams, sanitize};
use crate::ScrapeJobProducer;
use crate::builder::scrape_timeout;

/// rds_exporter serves every RDS instance behind one endpoint, so agents are
/// collapsed by distinct `host:port`. Each endpoint gets an enhanced-metrics
/// job at the medium resolution and a basic-metrics job at the low one.
/// Labels come from the exporter itself.
pub struct RdsExporter;

impl ScrapeJobProducer for RdsExporter {
    fn agent_type(&self) -> AgentType {
        AgentType::RdsExporter
    }

    fn produce(
        &self,
        agents: &[ScrapeParams<'_>],
        resolutions: &MetricsResolutions,
    ) -> Result<Vec<ScrapeJob>, ConfigError> {
        let endpoints: BTreeSet<String> = agents.iter().map(ScrapeParams::target).collect();

        let mut jobs = Vec::with_capacity(endpoints.len() * 2);
        for hostport in &endpoints {
            jobs.push(endpoint_job(hostport, Tier::Mr, resolutions, "/enhanced"));
            jobs.push(endpoint_job(hostport, Tier::Lr, resolutions, "/basic"));
        }
        Ok(jobs)
    }
}

fn endpoint_job(
    hostport: &str,
    tier: Tier,
    resolutions: &MetricsResolutions,
    metrics_path: &str,
) -> ScrapeJob {
    let interval = resolutions.interval(tier);
    ScrapeJob {
        job_name: format!(
            "rds_exporter_{}_{}-{}",
            sanitize(hostport),
            tier.as_str(),
            format_job_interval(interval)
        ),
        honor_labels: true,
        scrape_interval: Some(interval),
        scrape_timeout: Some(scrape_timeout(interval)),
        metrics_path: Some(metrics_path.to_string()),
        static_configs: vec![TargetGroup {
            targets: vec![hostport.to_string()],
            labels: Default::default(),
        }],
        ..Default::default()
    }
}
