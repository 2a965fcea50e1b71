//! Loading `scl.toml`.
//!
//! ```toml
//! max_array_display = 10
//!
//! [connectors.FileSystem]
//! version = "1.2.0"
//! ```
//!
//! A missing file means default settings.

use std::path::{Path, PathBuf};

use scl_eval::SclSettings;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("error reading settings '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("error parsing settings '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

pub fn load(path: &Path) -> Result<SclSettings, SettingsError> {
    if !path.exists() {
        debug!(path = %path.display(), "no settings file; using defaults");
        return Ok(SclSettings::default());
    }
    let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&text).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn parse(text: &str) -> Result<SclSettings, toml::de::Error> {
    toml::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connectors_table() {
        let settings = parse(
            r#"
max_array_display = 5

[connectors.FileSystem]
version = "1.2.0"

[connectors.Sql]
version = "0.3.1"
enabled = false
"#,
        )
        .unwrap();
        assert_eq!(settings.max_array_display, 5);
        assert_eq!(settings.connector("filesystem").unwrap().version, "1.2.0");
        assert!(!settings.connector("Sql").unwrap().enabled);
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load(&dir.path().join("scl.toml")).unwrap();
        assert_eq!(settings, SclSettings::default());
    }

    #[test]
    fn bad_toml_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scl.toml");
        std::fs::write(&path, "max_array_display = 'lots'").unwrap();
        let err = load(&path).unwrap_err();
        assert!(err.to_string().contains("scl.toml"));
    }
}
