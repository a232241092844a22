use promsync_core::catalog::{AgentType, MetricsResolutions, Tier};
use promsync_core::document::ScrapeJob;
use promsync_core::error::ConfigError;

use super::{ScrapeParams, agent_job};
use crate::ScrapeJobProducer;

/// User-registered exporters: one job at the medium resolution, with the
/// agent's own scheme and metrics path.
pub struct ExternalExporter;

impl ScrapeJobProducer for ExternalExporter {
    fn agent_type(&self) -> AgentType {
        AgentType::ExternalExporter
    }

    fn produce(
        &self,
        agents: &[ScrapeParams<'_>],
        resolutions: &MetricsResolutions,
    ) -> Result<Vec<ScrapeJob>, ConfigError> {
        agents
            .iter()
            .map(|params| {
                let mut job = agent_job(params, Tier::Mr, resolutions)?;
                job.scheme = non_empty(params.agent.metrics_scheme.as_deref());
                job.metrics_path = non_empty(params.agent.metrics_path.as_deref());
                Ok(job)
            })
            .collect()
    }
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.filter(|s| !s.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use promsync_core::catalog::{Agent, Node};
    use std::time::Duration;

    #[test]
    fn test_external_exporter_job() {
        let node = Node {
            node_id: "/node_id/ext".into(),
            address: "192.168.1.20".into(),
            ..Default::default()
        };
        let mut agent = Agent::new("/agent_id/ext1", AgentType::ExternalExporter);
        agent.metrics_scheme = Some("https".into());
        agent.metrics_path = Some("/custom/metrics".into());
        agent.username = Some("scraper".into());
        agent.password = Some("pw".into());

        let params = ScrapeParams {
            host: node.address.clone(),
            port: 9999,
            node: Some(&node),
            service: None,
            agent: &agent,
        };
        let jobs = ExternalExporter
            .produce(&[params], &MetricsResolutions::default())
            .unwrap();

        assert_eq!(jobs.len(), 1);
        let job = &jobs[0];
        assert_eq!(job.job_name, "external-exporter_agent_id_ext1_mr-10s");
        assert_eq!(job.scrape_interval, Some(Duration::from_secs(10)));
        assert_eq!(job.scrape_timeout, Some(Duration::from_secs(9)));
        assert_eq!(job.scheme.as_deref(), Some("https"));
        assert_eq!(job.metrics_path.as_deref(), Some("/custom/metrics"));
        assert_eq!(job.basic_auth.as_ref().map(|a| a.username.as_str()), Some("scraper"));
        assert!(job.params.is_empty());
        assert_eq!(job.static_configs[0].targets, ["192.168.1.20:9999"]);
    }

    #[test]
    fn test_external_exporter_defaults() {
        let agent = Agent::new("/agent_id/ext2", AgentType::ExternalExporter);
        let params = ScrapeParams {
            host: "10.1.1.1".into(),
            port: 8080,
            node: None,
            service: None,
            agent: &agent,
        };
        let jobs = ExternalExporter
            .produce(&[params], &MetricsResolutions::default())
            .unwrap();
        assert!(jobs[0].scheme.is_none());
        assert!(jobs[0].metrics_path.is_none());
        assert!(jobs[0].basic_auth.is_none());
    }
}
