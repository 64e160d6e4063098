use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use mailroom_common::config::{self, ConfigError};
use mailroom_directory::DirectoryConfig;
use serde::Deserialize;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "MAILROOM_CONFIG";

const CONFIG_NAME: &str = "mailroom.config.ron";

#[derive(Debug, Default, Deserialize)]
pub struct Mailroom {
    #[serde(default)]
    pub directory: DirectoryConfig,
}

impl Mailroom {
    /// Locations searched when neither `--config` nor [`CONFIG_ENV`] is given.
    #[must_use]
    pub fn default_paths() -> Vec<PathBuf> {
        vec![
            PathBuf::from(".").join(CONFIG_NAME),
            PathBuf::from("/etc/mailroom").join(CONFIG_NAME),
        ]
    }

    /// Work out which configuration file to read.
    ///
    /// An explicit path wins over `env_override`, which wins over the defaults.
    ///
    /// # Errors
    ///
    /// Fails if the chosen file does not exist, or nothing was chosen and none
    /// of the defaults exist.
    pub fn locate(
        explicit: Option<&Path>,
        env_override: Option<OsString>,
    ) -> Result<PathBuf, ConfigError> {
        match explicit {
            Some(path) if path.exists() => Ok(path.to_path_buf()),
            Some(path) => Err(ConfigError::MissingOverride(path.to_path_buf())),
            None => config::find_config_file(env_override, &Self::default_paths()),
        }
    }

    /// # Errors
    ///
    /// Fails if the file cannot be read or is not a valid configuration.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        config::load(path)
    }
}
