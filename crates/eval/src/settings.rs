//! Run settings: installed connectors and display limits.
//!
//! Settings are plain serde data. The CLI reads them from `scl.toml`;
//! embedders build them directly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One installed connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorSettings {
    pub version: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SclSettings {
    /// Connector name to its settings, checked by step requirements.
    pub connectors: BTreeMap<String, ConnectorSettings>,
    /// Arrays longer than this are truncated by `Print`.
    pub max_array_display: usize,
}

impl Default for SclSettings {
    fn default() -> Self {
        SclSettings {
            connectors: BTreeMap::new(),
            max_array_display: 20,
        }
    }
}

impl SclSettings {
    pub fn with_connector(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.connectors.insert(
            name.into(),
            ConnectorSettings {
                version: version.into(),
                enabled: true,
            },
        );
        self
    }

    /// Settings for `name`, case-insensitively.
    pub fn connector(&self, name: &str) -> Option<&ConnectorSettings> {
        self.connectors
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_fields() {
        let settings: SclSettings =
            serde_json::from_str(r#"{"connectors": {"FileSystem": {"version": "1.2.0"}}}"#).unwrap();
        assert_eq!(settings.max_array_display, 20);
        let fs = settings.connector("filesystem").unwrap();
        assert_eq!(fs.version, "1.2.0");
        assert!(fs.enabled);
    }
}
