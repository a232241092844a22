//! Configuration loading and validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::Tier;
use crate::error::{PromsyncError, Result};

/// Top-level promsync configuration.
///
/// Every section is optional; accessors supply the defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<EngineConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<FilesConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub checker: Option<CheckerConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinator: Option<CoordinatorConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog: Option<CatalogConfig>,

    /// Jobs scraping the server's own components. Defaults to the engine itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_jobs: Option<Vec<ServerJobConfig>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// The metrics engine being reconfigured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_engine_url")]
    pub base_url: String,

    #[serde(default = "default_reload_path")]
    pub reload_path: String,

    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// HTTP request timeout in ms (default: 10000).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_engine_url() -> String {
    "http://127.0.0.1:8428".into()
}

fn default_reload_path() -> String {
    "/-/reload".into()
}

fn default_health_path() -> String {
    "/health".into()
}

fn default_request_timeout() -> u64 {
    10_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: default_engine_url(),
            reload_path: default_reload_path(),
            health_path: default_health_path(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilesConfig {
    /// Live scrape configuration read by the engine.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scrape_config: Option<String>,

    /// Hand-edited base document merged under the generated jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_config: Option<String>,

    /// Component name written into the header banner.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
}

/// External syntax checker (`promtool`-compatible CLI).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckerConfig {
    #[serde(default = "default_checker_path")]
    pub path: String,

    /// Timeout in ms for a single checker invocation (default: 3000).
    #[serde(default = "default_checker_timeout")]
    pub timeout_ms: u64,
}

fn default_checker_path() -> String {
    "promtool".into()
}

fn default_checker_timeout() -> u64 {
    3_000
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Debounce window in ms between a request and the pass (default: 3000).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// JSON5 or YAML inventory file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inventory: Option<String>,

    /// Watch the inventory file and reconcile on change (default: true).
    #[serde(default = "default_true")]
    pub watch: bool,
}

fn default_true() -> bool {
    true
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            inventory: None,
            watch: true,
        }
    }
}

/// A static job scraping one of the server's own components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerJobConfig {
    pub job_name: String,
    pub targets: Vec<String>,

    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,

    #[serde(default)]
    pub tier: Tier,

    /// Value of the `instance` label (default: "pmm-server").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

fn default_metrics_path() -> String {
    "/metrics".into()
}

impl ServerJobConfig {
    /// Self-scrape of the engine.
    pub fn engine_self_scrape() -> Self {
        Self {
            job_name: "victoriametrics".into(),
            targets: vec!["127.0.0.1:8428".into()],
            metrics_path: default_metrics_path(),
            tier: Tier::Hr,
            instance: None,
        }
    }

    pub fn instance(&self) -> &str {
        self.instance.as_deref().unwrap_or("pmm-server")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "promsync_reconcile=debug").
    #[serde(default)]
    pub filters: Vec<String>,
}

fn default_log_format() -> String {
    "plain".into()
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| PromsyncError::Config(e.to_string()))?;
    Ok(re
        .replace_all(input, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned())
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let substituted = substitute_env_vars(&raw)?;

        json5::from_str(&substituted).map_err(|e| PromsyncError::Config(e.to_string()))
    }

    /// Default config file location.
    pub fn default_path() -> PathBuf {
        data_dir().join("config.json")
    }

    pub fn engine(&self) -> EngineConfig {
        self.engine.clone().unwrap_or_default()
    }

    pub fn reload_url(&self) -> String {
        let engine = self.engine();
        format!("{}{}", engine.base_url.trim_end_matches('/'), engine.reload_path)
    }

    pub fn health_url(&self) -> String {
        let engine = self.engine();
        format!("{}{}", engine.base_url.trim_end_matches('/'), engine.health_path)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(
            self.engine
                .as_ref()
                .map(|e| e.request_timeout_ms)
                .unwrap_or_else(default_request_timeout),
        )
    }

    /// Live scrape configuration path.
    pub fn scrape_config_path(&self) -> PathBuf {
        self.files
            .as_ref()
            .and_then(|f| f.scrape_config.as_deref())
            .map(expand_path)
            .unwrap_or_else(|| data_dir().join("promscrape.yml"))
    }

    /// Base document path.
    pub fn base_config_path(&self) -> PathBuf {
        self.files
            .as_ref()
            .and_then(|f| f.base_config.as_deref())
            .map(expand_path)
            .unwrap_or_else(|| data_dir().join("promscrape.base.yml"))
    }

    /// Component named in the "Managed by" banner.
    pub fn component(&self) -> String {
        self.files
            .as_ref()
            .and_then(|f| f.component.clone())
            .unwrap_or_else(|| "promsync".to_string())
    }

    pub fn checker_path(&self) -> PathBuf {
        self.checker
            .as_ref()
            .map(|c| expand_path(&c.path))
            .unwrap_or_else(|| PathBuf::from(default_checker_path()))
    }

    pub fn checker_timeout(&self) -> Duration {
        Duration::from_millis(
            self.checker
                .as_ref()
                .map(|c| c.timeout_ms)
                .unwrap_or_else(default_checker_timeout),
        )
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(
            self.coordinator
                .as_ref()
                .and_then(|c| c.debounce_ms)
                .unwrap_or(3_000),
        )
    }

    pub fn inventory_path(&self) -> Option<PathBuf> {
        self.catalog
            .as_ref()
            .and_then(|c| c.inventory.as_deref())
            .map(expand_path)
    }

    pub fn watch_inventory(&self) -> bool {
        self.catalog.as_ref().map(|c| c.watch).unwrap_or(true)
    }

    pub fn server_jobs(&self) -> Vec<ServerJobConfig> {
        self.server_jobs
            .clone()
            .unwrap_or_else(|| vec![ServerJobConfig::engine_self_scrape()])
    }

    pub fn log_format(&self) -> &str {
        self.logging
            .as_ref()
            .map(|l| l.format.as_str())
            .unwrap_or("plain")
    }

    /// Get a config value by dotted path (e.g. "engine.base_url").
    pub fn get_path(&self, path: &str) -> Option<serde_json::Value> {
        let json = serde_json::to_value(self).ok()?;
        let mut current = &json;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        let engine = self.engine();
        if !engine.base_url.starts_with("http://") && !engine.base_url.starts_with("https://") {
            errors.push(format!(
                "Engine base_url must be an http(s) URL: {}",
                engine.base_url
            ));
        }
        if engine.request_timeout_ms == 0 {
            errors.push("Engine request timeout cannot be 0".to_string());
        }

        if self.checker_timeout().is_zero() {
            errors.push("Checker timeout cannot be 0".to_string());
        }

        if let Some(parent) = self.scrape_config_path().parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                warnings.push(format!(
                    "Scrape config directory does not exist: {}",
                    parent.display()
                ));
            }
        }

        if let Some(inventory) = self.inventory_path() {
            if !inventory.exists() {
                errors.push(format!(
                    "Inventory file not found: {}",
                    inventory.display()
                ));
            }
        } else {
            warnings.push("No catalog inventory configured; only server jobs will be written".to_string());
        }

        let mut seen = std::collections::BTreeSet::new();
        for job in self.server_jobs() {
            if !seen.insert(job.job_name.clone()) {
                errors.push(format!("Duplicate server job '{}'", job.job_name));
            }
            if job.targets.is_empty() {
                warnings.push(format!("Server job '{}' has no targets", job.job_name));
            }
        }

        if !matches!(self.log_format(), "plain" | "json") {
            warnings.push(format!(
                "Unknown log format '{}', falling back to plain",
                self.log_format()
            ));
        }

        (warnings, errors)
    }
}

/// Base directory for promsync data: `~/.promsync/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".promsync")
}
