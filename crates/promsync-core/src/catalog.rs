//! Inventory rows read from the catalog, and the read-only [`Catalog`] trait.
//!
//! The relational store itself lives elsewhere; promsync only ever takes a
//! consistent snapshot of nodes, services, agents and the metrics
//! resolutions setting at the start of a reconciliation pass.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{PromsyncError, Result};

/// Kinds of agents known to the inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgentType {
    #[serde(rename = "pmm-agent")]
    PmmAgent,
    #[serde(rename = "node_exporter")]
    NodeExporter,
    #[serde(rename = "mysqld_exporter")]
    MysqldExporter,
    #[serde(rename = "mongodb_exporter")]
    MongodbExporter,
    #[serde(rename = "postgres_exporter")]
    PostgresExporter,
    #[serde(rename = "proxysql_exporter")]
    ProxysqlExporter,
    #[serde(rename = "rds_exporter")]
    RdsExporter,
    #[serde(rename = "external-exporter")]
    ExternalExporter,
    #[serde(rename = "qan-mysql-perfschema-agent")]
    QanMysqlPerfschema,
    #[serde(rename = "qan-mysql-slowlog-agent")]
    QanMysqlSlowlog,
    #[serde(rename = "qan-mongodb-profiler-agent")]
    QanMongodbProfiler,
    #[serde(rename = "qan-postgresql-pgstatements-agent")]
    QanPostgresqlPgstatements,
}

impl AgentType {
    /// The wire name, also used as the job name prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PmmAgent => "pmm-agent",
            Self::NodeExporter => "node_exporter",
            Self::MysqldExporter => "mysqld_exporter",
            Self::MongodbExporter => "mongodb_exporter",
            Self::PostgresExporter => "postgres_exporter",
            Self::ProxysqlExporter => "proxysql_exporter",
            Self::RdsExporter => "rds_exporter",
            Self::ExternalExporter => "external-exporter",
            Self::QanMysqlPerfschema => "qan-mysql-perfschema-agent",
            Self::QanMysqlSlowlog => "qan-mysql-slowlog-agent",
            Self::QanMongodbProfiler => "qan-mongodb-profiler-agent",
            Self::QanPostgresqlPgstatements => "qan-postgresql-pgstatements-agent",
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub node_id: String,
    #[serde(default)]
    pub node_name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distro: Option<String>,
    /// Raw JSON object of custom labels, as stored in the catalog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_labels: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub service_id: String,
    #[serde(default)]
    pub service_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_labels: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: String,
    pub agent_type: AgentType,
    /// The pmm-agent that runs this exporter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pmm_agent_id: Option<String>,
    /// Node a pmm-agent or external exporter runs on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runs_on_node_id: Option<String>,
    /// Node this agent monitors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    /// Service this agent monitors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_scheme: Option<String>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub tablestats_group_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_labels: Option<String>,
}

impl Agent {
    /// A bare agent of the given type; tests and embedding callers fill in the rest.
    pub fn new(agent_id: impl Into<String>, agent_type: AgentType) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_type,
            pmm_agent_id: None,
            runs_on_node_id: None,
            node_id: None,
            service_id: None,
            listen_port: None,
            username: None,
            password: None,
            metrics_path: None,
            metrics_scheme: None,
            disabled: false,
            tablestats_group_enabled: false,
            custom_labels: None,
        }
    }
}

/// Scrape resolution tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    Hr,
    Mr,
    Lr,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hr => "hr",
            Self::Mr => "mr",
            Self::Lr => "lr",
        }
    }
}

/// High, medium and low scrape resolutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsResolutions {
    #[serde(with = "crate::duration::required")]
    pub hr: Duration,
    #[serde(with = "crate::duration::required")]
    pub mr: Duration,
    #[serde(with = "crate::duration::required")]
    pub lr: Duration,
}

impl Default for MetricsResolutions {
    fn default() -> Self {
        Self {
            hr: Duration::from_secs(5),
            mr: Duration::from_secs(10),
            lr: Duration::from_secs(60),
        }
    }
}

impl MetricsResolutions {
    pub fn interval(&self, tier: Tier) -> Duration {
        match tier {
            Tier::Hr => self.hr,
            Tier::Mr => self.mr,
            Tier::Lr => self.lr,
        }
    }
}

/// A consistent read of everything a pass needs from the catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub agents: Vec<Agent>,
    #[serde(default)]
    pub resolutions: MetricsResolutions,
}

impl CatalogSnapshot {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.node_id == id)
    }

    pub fn service(&self, id: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.service_id == id)
    }

    pub fn agent(&self, id: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.agent_id == id)
    }
}

/// Read-only access to the inventory.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn snapshot(&self) -> anyhow::Result<CatalogSnapshot>;
}

/// In-memory catalog, replaced wholesale by its owner.
#[derive(Default)]
pub struct StaticCatalog {
    snapshot: RwLock<CatalogSnapshot>,
}

impl StaticCatalog {
    pub fn new(snapshot: CatalogSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(snapshot),
        }
    }

    pub async fn replace(&self, snapshot: CatalogSnapshot) {
        *self.snapshot.write().await = snapshot;
    }
}

#[async_trait]
impl Catalog for StaticCatalog {
    async fn snapshot(&self) -> anyhow::Result<CatalogSnapshot> {
        Ok(self.snapshot.read().await.clone())
    }
}

/// Inventory exported to a JSON5 or YAML file, re-read on every snapshot.
pub struct FileCatalog {
    path: PathBuf,
}

impl FileCatalog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse an inventory file. The format is picked from the extension.
    pub fn load(path: &Path) -> Result<CatalogSnapshot> {
        let raw = std::fs::read_to_string(path)?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yml" | "yaml")
        );
        let snapshot = if is_yaml {
            serde_yaml::from_str(&raw)?
        } else {
            json5::from_str(&raw).map_err(|e| PromsyncError::Catalog(e.to_string()))?
        };
        Ok(snapshot)
    }
}

#[async_trait]
impl Catalog for FileCatalog {
    async fn snapshot(&self) -> anyhow::Result<CatalogSnapshot> {
        let path = self.path.clone();
        let snapshot = tokio::task::spawn_blocking(move || FileCatalog::load(&path)).await??;
        debug!(
            path = %self.path.display(),
            nodes = snapshot.nodes.len(),
            services = snapshot.services.len(),
            agents = snapshot.agents.len(),
            "Loaded catalog snapshot"
        );
        Ok(snapshot)
    }
}
