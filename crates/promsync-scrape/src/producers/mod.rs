//! Per-kind scrape job producers.

pub mod external;
pub mod rds;
pub mod standard;

use std::collections::BTreeMap;
use std::time::Duration;

use promsync_core::catalog::{Agent, MetricsResolutions, Node, Service, Tier};
use promsync_core::document::{BasicAuth, ScrapeJob, TargetGroup, join_host_port};
use promsync_core::duration::format_job_interval;
use promsync_core::error::ConfigError;

use crate::builder::scrape_timeout;
use crate::labels::merge_labels;

/// An agent with its catalog context and resolved scrape address.
#[derive(Debug, Clone)]
pub struct ScrapeParams<'a> {
    /// Address of the node the exporter runs on.
    pub host: String,
    pub port: u16,
    /// Node the agent monitors, directly or through its service.
    pub node: Option<&'a Node>,
    pub service: Option<&'a Service>,
    pub agent: &'a Agent,
}

impl ScrapeParams<'_> {
    pub fn target(&self) -> String {
        join_host_port(&self.host, self.port)
    }
}

/// Replace characters that cannot appear in a job name.
pub fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| match c {
            '/' | ':' | '.' => '_',
            c => c,
        })
        .collect()
}

/// `<agent_type><agent_id>_<tier>-<interval>`, e.g. `node_exporter_agent_id_1_hr-5s`.
pub fn job_name(agent: &Agent, tier: Tier, interval: Duration) -> String {
    format!(
        "{}{}_{}-{}",
        agent.agent_type,
        sanitize(&agent.agent_id),
        tier.as_str(),
        format_job_interval(interval)
    )
}

/// Basic auth for agents with a non-empty username.
pub fn basic_auth(agent: &Agent) -> Option<BasicAuth> {
    agent
        .username
        .as_deref()
        .filter(|u| !u.is_empty())
        .map(|username| BasicAuth {
            username: username.to_string(),
            password: agent.password.clone().unwrap_or_default(),
        })
}

/// A single-target job for an agent at one resolution tier.
pub fn agent_job(
    params: &ScrapeParams<'_>,
    tier: Tier,
    resolutions: &MetricsResolutions,
) -> Result<ScrapeJob, ConfigError> {
    let interval = resolutions.interval(tier);
    let labels = merge_labels(params.node, params.service, params.agent)?;
    Ok(ScrapeJob {
        job_name: job_name(params.agent, tier, interval),
        scrape_interval: Some(interval),
        scrape_timeout: Some(scrape_timeout(interval)),
        metrics_path: Some("/metrics".to_string()),
        basic_auth: basic_auth(params.agent),
        static_configs: vec![TargetGroup {
            targets: vec![params.target()],
            labels,
        }],
        ..Default::default()
    })
}

/// Set the `collect[]` parameter, sorted.
pub fn with_collectors(mut job: ScrapeJob, collect: &[&str]) -> ScrapeJob {
    if !collect.is_empty() {
        let mut collect: Vec<String> = collect.iter().map(|c| c.to_string()).collect();
        collect.sort();
        job.params = BTreeMap::from([("collect[]".to_string(), collect)]);
    }
    job
}
