//! Scrape job generation from catalog state.
//!
//! Each agent kind that exposes metrics has a [`ScrapeJobProducer`]. The
//! [`builder`] resolves hosts and ports for every enabled agent, hands each
//! producer the agents of its kind, then sorts and validates the result.

pub mod assembler;
pub mod base;
pub mod builder;
pub mod labels;
pub mod producers;

use promsync_core::catalog::{AgentType, MetricsResolutions};
use promsync_core::document::ScrapeJob;
use promsync_core::error::ConfigError;

pub use producers::ScrapeParams;

/// Turns the agents of one kind into scrape jobs.
pub trait ScrapeJobProducer: Send + Sync {
    /// The agent kind this producer handles.
    fn agent_type(&self) -> AgentType;

    /// Build jobs for all enabled agents of this kind.
    ///
    /// Producers see every agent at once so they can aggregate (RDS scrapes one
    /// endpoint per distinct `host:port`).
    fn produce(
        &self,
        agents: &[ScrapeParams<'_>],
        resolutions: &MetricsResolutions,
    ) -> Result<Vec<ScrapeJob>, ConfigError>;
}

/// Registry of producers, keyed by agent kind.
#[derive(Default)]
pub struct ProducerRegistry {
    producers: Vec<Box<dyn ScrapeJobProducer>>,
}

impl ProducerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in producer.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(producers::standard::node_exporter()));
        registry.register(Box::new(producers::standard::mysqld_exporter()));
        registry.register(Box::new(producers::standard::postgres_exporter()));
        registry.register(Box::new(producers::standard::mongodb_exporter()));
        registry.register(Box::new(producers::standard::proxysql_exporter()));
        registry.register(Box::new(producers::external::ExternalExporter));
        registry.register(Box::new(producers::rds::RdsExporter));
        registry
    }

    /// Register a producer, replacing any existing one for the same kind.
    pub fn register(&mut self, producer: Box<dyn ScrapeJobProducer>) {
        self.producers
            .retain(|p| p.agent_type() != producer.agent_type());
        self.producers.push(producer);
    }

    pub fn get(&self, agent_type: AgentType) -> Option<&dyn ScrapeJobProducer> {
        self.producers
            .iter()
            .find(|p| p.agent_type() == agent_type)
            .map(|p| p.as_ref())
    }

    pub fn list(&self) -> Vec<AgentType> {
        self.producers.iter().map(|p| p.agent_type()).collect()
    }
}
