//! Catalog snapshot → ordered, validated scrape jobs.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{debug, warn};

use promsync_core::catalog::{Agent, AgentType, CatalogSnapshot, Node, Service};
use promsync_core::document::ScrapeJob;
use promsync_core::error::ConfigError;

use crate::{ProducerRegistry, ScrapeParams};

/// Scrape timeout for a given interval: at most 10s, and always shorter than
/// the interval except for intervals of 1s or less.
pub fn scrape_timeout(interval: Duration) -> Duration {
    if interval <= Duration::from_secs(2) {
        Duration::from_secs(1)
    } else if interval <= Duration::from_secs(10) {
        interval - Duration::from_secs(1)
    } else {
        Duration::from_secs(10)
    }
}

/// Build the scrape jobs for every enabled agent in the snapshot.
///
/// Output is sorted by (instance label, job name) so identical catalog state
/// always yields identical jobs.
pub fn build_jobs(
    snapshot: &CatalogSnapshot,
    registry: &ProducerRegistry,
) -> Result<Vec<ScrapeJob>, ConfigError> {
    let mut by_kind: BTreeMap<AgentType, Vec<ScrapeParams<'_>>> = BTreeMap::new();

    for agent in &snapshot.agents {
        if agent.disabled {
            continue;
        }
        if registry.get(agent.agent_type).is_none() {
            continue;
        }
        if let Some(params) = resolve(snapshot, agent)? {
            by_kind.entry(agent.agent_type).or_default().push(params);
        }
    }

    let mut jobs = Vec::new();
    for (kind, agents) in &by_kind {
        if let Some(producer) = registry.get(*kind) {
            jobs.extend(producer.produce(agents, &snapshot.resolutions)?);
        }
    }

    for job in &mut jobs {
        job.static_configs.sort_by(|a, b| {
            (a.labels.get("instance"), &a.targets).cmp(&(b.labels.get("instance"), &b.targets))
        });
    }
    jobs.sort_by(|a, b| (a.instance(), &a.job_name).cmp(&(b.instance(), &b.job_name)));

    for job in &jobs {
        job.validate()?;
    }

    debug!(
        agents = snapshot.agents.len(),
        jobs = jobs.len(),
        "Built scrape jobs"
    );
    Ok(jobs)
}

/// Resolve the catalog context and scrape address for one agent.
///
/// `Ok(None)` means the agent has no reachable host and is skipped.
fn resolve<'a>(
    snapshot: &'a CatalogSnapshot,
    agent: &'a Agent,
) -> Result<Option<ScrapeParams<'a>>, ConfigError> {
    let port = agent.listen_port.ok_or_else(|| ConfigError::MissingPort {
        agent_id: agent.agent_id.clone(),
    })?;

    let service = agent
        .service_id
        .as_deref()
        .map(|id| find_service(snapshot, id, &agent.agent_id))
        .transpose()?;

    let owner_node_id = agent
        .node_id
        .as_deref()
        .or(service.map(|s| s.node_id.as_str()));
    let node = owner_node_id
        .map(|id| find_node(snapshot, id, &agent.agent_id))
        .transpose()?;

    let Some(host) = resolve_host(snapshot, agent, service, node) else {
        warn!(
            agent_id = %agent.agent_id,
            agent_type = %agent.agent_type,
            "Cannot resolve host, skipping scrape config"
        );
        return Ok(None);
    };

    Ok(Some(ScrapeParams {
        host,
        port,
        node,
        service,
        agent,
    }))
}

/// Host precedence: the node the agent's pmm-agent runs on, the node the
/// agent itself runs on, the service address, the owning node's address.
fn resolve_host(
    snapshot: &CatalogSnapshot,
    agent: &Agent,
    service: Option<&Service>,
    node: Option<&Node>,
) -> Option<String> {
    let runs_on = |node_id: Option<&str>| {
        node_id
            .and_then(|id| snapshot.node(id))
            .map(|n| n.address.clone())
            .filter(|a| !a.is_empty())
    };

    if let Some(pmm_agent_id) = agent.pmm_agent_id.as_deref() {
        match snapshot.agent(pmm_agent_id) {
            Some(pmm_agent) => {
                if let Some(host) = runs_on(pmm_agent.runs_on_node_id.as_deref()) {
                    return Some(host);
                }
            }
            None => debug!(
                agent_id = %agent.agent_id,
                pmm_agent_id,
                "pmm-agent not found in catalog"
            ),
        }
    }

    runs_on(agent.runs_on_node_id.as_deref())
        .or_else(|| {
            service
                .and_then(|s| s.address.clone())
                .filter(|a| !a.is_empty())
        })
        .or_else(|| node.map(|n| n.address.clone()).filter(|a| !a.is_empty()))
}

fn find_node<'a>(
    snapshot: &'a CatalogSnapshot,
    node_id: &str,
    referrer: &str,
) -> Result<&'a Node, ConfigError> {
    snapshot.node(node_id).ok_or_else(|| ConfigError::MissingNode {
        node_id: node_id.to_string(),
        referrer: referrer.to_string(),
    })
}

fn find_service<'a>(
    snapshot: &'a CatalogSnapshot,
    service_id: &str,
    referrer: &str,
) -> Result<&'a Service, ConfigError> {
    snapshot
        .service(service_id)
        .ok_or_else(|| ConfigError::MissingService {
            service_id: service_id.to_string(),
            referrer: referrer.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use promsync_core::catalog::MetricsResolutions;

    fn fleet() -> CatalogSnapshot {
        let mut pmm_agent = Agent::new("/agent_id/pmm1", AgentType::PmmAgent);
        pmm_agent.runs_on_node_id = Some("/node_id/1".into());

        let mut mysqld = Agent::new("/agent_id/m1", AgentType::MysqldExporter);
        mysqld.pmm_agent_id = Some("/agent_id/pmm1".into());
        mysqld.service_id = Some("/service_id/1".into());
        mysqld.listen_port = Some(9104);
        mysqld.custom_labels = Some(r#"{"instance": "db1"}"#.into());

        let mut node_exporter = Agent::new("/agent_id/n1", AgentType::NodeExporter);
        node_exporter.pmm_agent_id = Some("/agent_id/pmm1".into());
        node_exporter.node_id = Some("/node_id/1".into());
        node_exporter.listen_port = Some(9100);

        CatalogSnapshot {
            nodes: vec![Node {
                node_id: "/node_id/1".into(),
                node_name: "db1-host".into(),
                address: "10.0.0.5".into(),
                ..Default::default()
            }],
            services: vec![Service {
                service_id: "/service_id/1".into(),
                service_name: "mysql-db1".into(),
                node_id: "/node_id/1".into(),
                address: Some("127.0.0.1".into()),
                port: Some(3306),
                ..Default::default()
            }],
            agents: vec![pmm_agent, mysqld, node_exporter],
            resolutions: MetricsResolutions::default(),
        }
    }

    #[test]
    fn test_scrape_timeout() {
        let s = Duration::from_secs;
        assert_eq!(scrape_timeout(Duration::from_millis(500)), s(1));
        assert_eq!(scrape_timeout(s(1)), s(1));
        assert_eq!(scrape_timeout(s(2)), s(1));
        assert_eq!(scrape_timeout(s(3)), s(2));
        assert_eq!(scrape_timeout(s(10)), s(9));
        assert_eq!(scrape_timeout(s(11)), s(10));
        assert_eq!(scrape_timeout(s(60)), s(10));
    }

    #[test]
    fn test_well_formed_agent() {
        let jobs = build_jobs(&fleet(), &ProducerRegistry::with_defaults()).unwrap();
        let mysqld: Vec<_> = jobs
            .iter()
            .filter(|j| j.job_name.starts_with("mysqld_exporter"))
            .collect();
        assert_eq!(mysqld.len(), 3);
        let job = mysqld[0];
        assert_eq!(job.job_name, "mysqld_exporter_agent_id_m1_hr-5s");
        assert_eq!(job.static_configs[0].targets, ["10.0.0.5:9104"]);
        assert_eq!(job.static_configs[0].labels["instance"], "db1");
        assert_eq!(job.static_configs[0].labels["service_name"], "mysql-db1");
        assert_eq!(job.static_configs[0].labels["node_name"], "db1-host");
    }

    #[test]
    fn test_build_is_idempotent_and_sorted() {
        let registry = ProducerRegistry::with_defaults();
        let first = build_jobs(&fleet(), &registry).unwrap();
        let second = build_jobs(&fleet(), &registry).unwrap();
        assert_eq!(first, second);

        let keys: Vec<_> = first.iter().map(|j| (j.instance(), &j.job_name)).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        // node_exporter (instance=/agent_id/n1) before mysqld (instance=db1)
        assert!(first[0].job_name.starts_with("node_exporter"));
    }

    #[test]
    fn test_missing_port_fails() {
        let mut snapshot = fleet();
        snapshot.agents[1].listen_port = None;
        let err = build_jobs(&snapshot, &ProducerRegistry::with_defaults()).unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingPort {
                agent_id: "/agent_id/m1".into()
            }
        );
    }

    #[test]
    fn test_disabled_and_unproduced_agents_skipped() {
        let mut snapshot = fleet();
        snapshot.agents[1].disabled = true;
        let mut qan = Agent::new("/agent_id/qan", AgentType::QanMysqlSlowlog);
        qan.service_id = Some("/service_id/1".into());
        snapshot.agents.push(qan);

        let jobs = build_jobs(&snapshot, &ProducerRegistry::with_defaults()).unwrap();
        assert_eq!(jobs.len(), 3);
        assert!(jobs.iter().all(|j| j.job_name.starts_with("node_exporter")));
    }

    #[test]
    fn test_unresolvable_host_skipped() {
        let mut snapshot = fleet();
        snapshot.nodes[0].address.clear();
        snapshot.services[0].address = None;
        let jobs = build_jobs(&snapshot, &ProducerRegistry::with_defaults()).unwrap();
        assert!(jobs.is_empty());
    }

    #[test]
    fn test_host_falls_back_to_service_address() {
        let mut snapshot = fleet();
        snapshot.agents[1].pmm_agent_id = None;
        let jobs = build_jobs(&snapshot, &ProducerRegistry::with_defaults()).unwrap();
        let job = jobs
            .iter()
            .find(|j| j.job_name.starts_with("mysqld_exporter"))
            .unwrap();
        assert_eq!(job.static_configs[0].targets, ["127.0.0.1:9104"]);
    }

    #[test]
    fn test_invalid_labels_fail_pass() {
        let mut snapshot = fleet();
        snapshot.services[0].custom_labels = Some("{broken".into());
        let err = build_jobs(&snapshot, &ProducerRegistry::with_defaults()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLabels { entity, .. } if entity == "/service_id/1"));
    }

    #[test]
    fn test_dangling_service_reference() {
        let mut snapshot = fleet();
        snapshot.agents[1].service_id = Some("/service_id/gone".into());
        let err = build_jobs(&snapshot, &ProducerRegistry::with_defaults()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingService { .. }));
    }
}
