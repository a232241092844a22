//! Target labels: standard identity labels plus decoded custom labels.

use std::collections::BTreeMap;

use promsync_core::catalog::{Agent, Node, Service};
use promsync_core::error::ConfigError;

/// Decode a stored custom-label blob (a JSON object of strings).
///
/// A missing or blank blob is an empty set. Anything else that is not a flat
/// object of non-empty string keys and string values is rejected.
pub fn decode_custom_labels(
    raw: Option<&str>,
    entity: &str,
) -> Result<BTreeMap<String, String>, ConfigError> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(BTreeMap::new()),
        Some(raw) => raw,
    };

    let invalid = |reason: String| ConfigError::InvalidLabels {
        entity: entity.to_string(),
        reason,
    };

    let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| invalid(e.to_string()))?;
    let object = match value {
        serde_json::Value::Object(object) => object,
        serde_json::Value::Null => return Ok(BTreeMap::new()),
        other => return Err(invalid(format!("expected an object, got {other}"))),
    };

    let mut labels = BTreeMap::new();
    for (key, value) in object {
        if key.is_empty() {
            return Err(invalid("empty label name".into()));
        }
        match value {
            serde_json::Value::String(s) => {
                labels.insert(key, s);
            }
            other => {
                return Err(invalid(format!("label {key:?} is not a string: {other}")));
            }
        }
    }
    Ok(labels)
}

/// Labels for a target: standard labels, then node, service and agent custom
/// labels, each layer overriding the previous one.
pub fn merge_labels(
    node: Option<&Node>,
    service: Option<&Service>,
    agent: &Agent,
) -> Result<BTreeMap<String, String>, ConfigError> {
    let mut labels = BTreeMap::new();
    let mut put = |key: &str, value: &str| {
        if !value.is_empty() {
            labels.insert(key.to_string(), value.to_string());
        }
    };

    put("agent_id", &agent.agent_id);
    put("agent_type", agent.agent_type.as_str());
    put("instance", &agent.agent_id);
    if let Some(node) = node {
        put("node_id", &node.node_id);
        put("node_name", &node.node_name);
    }
    if let Some(service) = service {
        put("service_id", &service.service_id);
        put("service_name", &service.service_name);
    }

    if let Some(node) = node {
        labels.extend(decode_custom_labels(
            node.custom_labels.as_deref(),
            &node.node_id,
        )?);
    }
    if let Some(service) = service {
        labels.extend(decode_custom_labels(
            service.custom_labels.as_deref(),
            &service.service_id,
        )?);
    }
    labels.extend(decode_custom_labels(
        agent.custom_labels.as_deref(),
        &agent.agent_id,
    )?);

    Ok(labels)
}
