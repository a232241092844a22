use thiserror::Error;

/// Errors loading or validating promsync's own configuration.
#[derive(Debug, Error)]
pub enum PromsyncError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PromsyncError>;

/// Bad catalog data. Raised while building a document, before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("listen port is not set for agent {agent_id}")]
    MissingPort { agent_id: String },

    #[error("invalid custom labels for {entity}: {reason}")]
    InvalidLabels { entity: String, reason: String },

    #[error("invalid target {target:?} in job {job}")]
    InvalidTarget { job: String, target: String },

    #[error("empty label name in job {job}")]
    InvalidLabelName { job: String },

    #[error("scrape timeout exceeds scrape interval in job {job}")]
    TimeoutExceedsInterval { job: String },

    #[error("duplicate job name {0:?}")]
    DuplicateJob(String),

    #[error("node {node_id} not found (referenced by {referrer})")]
    MissingNode { node_id: String, referrer: String },

    #[error("service {service_id} not found (referenced by {referrer})")]
    MissingService { service_id: String, referrer: String },
}

/// The external checker rejected a candidate document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Reason extracted verbatim from the checker output.
    #[error("{0}")]
    Rejected(String),

    #[error("configuration is empty: zero jobs found")]
    Empty,
}

/// The metrics engine refused or failed a reload request.
#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("{status}: {body}")]
    Status { status: u16, body: String },

    #[error("reload request failed: {0}")]
    Transport(String),
}

/// Terminal outcome of a failed reconciliation pass.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Content(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to write configuration: {0}")]
    Write(#[source] std::io::Error),

    #[error(transparent)]
    Reload(#[from] ReloadError),

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] serde_yaml::Error),

    #[error("catalog error: {0}")]
    Catalog(#[source] anyhow::Error),

    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl ReconcileError {
    /// Whether the failure happened after the candidate was accepted and
    /// therefore requires the previous file to be restored.
    pub fn needs_rollback(&self) -> bool {
        matches!(self, Self::Write(_) | Self::Reload(_))
    }

    /// Operational faults, as opposed to problems with the document content.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Infrastructure(_) | Self::Catalog(_))
    }
}
