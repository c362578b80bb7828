//! Collector configuration

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Configuration for the controller's collectors
#[derive(Debug, Clone, Default)]
pub struct MetricsConfig {
    /// Enable metrics collection; disabled collectors are no-ops
    pub enabled: bool,

    /// Constant labels attached to every series (deployment identifiers)
    pub const_labels: HashMap<String, String>,
}

/// Parse `key=value` entries into a constant label map.
///
/// Later duplicates win. The value may itself contain `=`.
pub fn parse_const_labels(entries: &[String]) -> Result<HashMap<String, String>> {
    let mut labels = HashMap::with_capacity(entries.len());

    for entry in entries {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| Error::Config(format!("Constant label '{}' is not key=value", entry)))?;

        let key = key.trim();
        if key.is_empty() {
            return Err(Error::Config(format!(
                "Constant label '{}' has an empty name",
                entry
            )));
        }

        labels.insert(key.to_string(), value.trim().to_string());
    }

    Ok(labels)
}
