//! Scrape document model: the YAML shape read by the metrics engine.
//!
//! Keys promsync does not manage (relabel rules, remote write, alerting, ...)
//! are carried through `extra` untouched so a hand-edited base file survives
//! a rewrite.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A full scrape configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "GlobalConfig::is_empty")]
    pub global: GlobalConfig,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rule_files: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scrape_configs: Vec<ScrapeJob>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl Document {
    /// Look up a job by name.
    pub fn job(&self, name: &str) -> Option<&ScrapeJob> {
        self.scrape_configs.iter().find(|j| j.job_name == name)
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.scrape_configs
            .iter()
            .map(|j| j.job_name.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(
        default,
        with = "crate::duration::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub scrape_interval: Option<Duration>,

    #[serde(
        default,
        with = "crate::duration::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub scrape_timeout: Option<Duration>,

    #[serde(
        default,
        with = "crate::duration::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub evaluation_interval: Option<Duration>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub external_labels: BTreeMap<String, String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl GlobalConfig {
    pub fn is_empty(&self) -> bool {
        self.scrape_interval.is_none()
            && self.scrape_timeout.is_none()
            && self.evaluation_interval.is_none()
            && self.external_labels.is_empty()
            && self.extra.is_empty()
    }
}

/// One scrape job: what to poll, how often, and under which labels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrapeJob {
    pub job_name: String,

    #[serde(default, skip_serializing_if = "is_false")]
    pub honor_labels: bool,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Vec<String>>,

    #[serde(
        default,
        with = "crate::duration::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub scrape_interval: Option<Duration>,

    #[serde(
        default,
        with = "crate::duration::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub scrape_timeout: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_auth: Option<BasicAuth>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub static_configs: Vec<TargetGroup>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl ScrapeJob {
    /// The `instance` label of the first target group, used as the primary sort key.
    pub fn instance(&self) -> Option<&str> {
        self.static_configs
            .iter()
            .find_map(|g| g.labels.get("instance"))
            .map(String::as_str)
    }

    /// Check the job invariants: `timeout <= interval`, well-formed targets,
    /// non-empty label names.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let (Some(interval), Some(timeout)) = (self.scrape_interval, self.scrape_timeout) {
            if timeout > interval {
                return Err(ConfigError::TimeoutExceedsInterval {
                    job: self.job_name.clone(),
                });
            }
        }
        for group in &self.static_configs {
            group.validate(&self.job_name)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicAuth {
    pub username: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
}

/// Endpoints sharing one label set.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetGroup {
    #[serde(default)]
    pub targets: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl TargetGroup {
    pub fn validate(&self, job: &str) -> Result<(), ConfigError> {
        if let Some(bad) = self.targets.iter().find(|t| !is_valid_host_port(t)) {
            return Err(ConfigError::InvalidTarget {
                job: job.to_string(),
                target: bad.clone(),
            });
        }
        if self.labels.keys().any(|k| k.is_empty()) {
            return Err(ConfigError::InvalidLabelName {
                job: job.to_string(),
            });
        }
        Ok(())
    }
}

/// Join host and port, bracketing IPv6 literals.
pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// Whether `s` is a syntactically valid `host:port` pair.
pub fn is_valid_host_port(s: &str) -> bool {
    let (host, port) = if let Some(rest) = s.strip_prefix('[') {
        match rest.split_once("]:") {
            Some((host, port)) => (host, port),
            None => return false,
        }
    } else {
        match s.rsplit_once(':') {
            Some((host, _)) if host.contains(':') => return false,
            Some(pair) => pair,
            None => return false,
        }
    };
    !host.is_empty()
        && !host.chars().any(char::is_whitespace)
        && !port.is_empty()
        && port.chars().all(|c| c.is_ascii_digit())
        && port.parse::<u16>().is_ok()
}
