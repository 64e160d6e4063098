//! Configuration file discovery and loading.
//!
//! Configuration is written in RON. A file is located using the following
//! precedence:
//! 1. the path named by an environment variable (e.g. `MAILROOM_CONFIG`)
//! 2. each default path, in order

use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
};

use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors that can occur while locating or reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The environment override points at a file that does not exist.
    #[error("Configuration override points to non-existent file: {}", .0.display())]
    MissingOverride(PathBuf),

    /// None of the default locations hold a configuration file.
    #[error("No configuration file found. Tried:\n{0}")]
    NotFound(String),

    /// The file exists but could not be read.
    #[error("Failed to read config from {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file is not valid RON for the expected structure.
    #[error("Failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
}

/// Find the configuration file.
///
/// `env_override` is the value of the override variable, if set. It is
/// passed in rather than read here so callers decide which variable applies.
///
/// # Errors
///
/// Returns [`ConfigError::MissingOverride`] if the override does not exist,
/// or [`ConfigError::NotFound`] if none of the defaults exist.
pub fn find_config_file(
    env_override: Option<OsString>,
    defaults: &[PathBuf],
) -> Result<PathBuf, ConfigError> {
    if let Some(env_path) = env_override {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::MissingOverride(path));
    }

    if let Some(path) = defaults.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let paths_tried = defaults
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::NotFound(paths_tried))
}

/// Read and deserialize a RON configuration file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or does not parse.
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    ron::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::io::Write;

    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq, Eq)]
    struct Sample {
        name: String,
        #[serde(default)]
        enabled: bool,
    }

    #[test]
    fn test_override_wins_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let override_path = dir.path().join("override.ron");
        let default_path = dir.path().join("default.ron");
        std::fs::write(&override_path, "()").unwrap();
        std::fs::write(&default_path, "()").unwrap();

        let found = find_config_file(
            Some(override_path.clone().into_os_string()),
            std::slice::from_ref(&default_path),
        )
        .unwrap();
        assert_eq!(found, override_path);
    }

    #[test]
    fn test_missing_override_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.ron");

        let err = find_config_file(Some(missing.into_os_string()), &[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingOverride(_)));
    }

    #[test]
    fn test_first_existing_default_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.ron");
        let second = dir.path().join("second.ron");
        std::fs::write(&second, "()").unwrap();

        let found = find_config_file(None, &[first.clone(), second.clone()]).unwrap();
        assert_eq!(found, second);

        std::fs::remove_file(&second).unwrap();
        let err = find_config_file(None, &[first, second]).unwrap_err();
        assert!(err.to_string().contains("first.ron"));
    }

    #[test]
    fn test_load_parses_ron() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "(name: \"directory\", enabled: true)").unwrap();

        let sample: Sample = load(file.path()).unwrap();
        assert_eq!(
            sample,
            Sample {
                name: "directory".to_string(),
                enabled: true
            }
        );
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "(name: 42)").unwrap();

        let err = load::<Sample>(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
