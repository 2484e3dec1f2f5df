//! Loading the configuration file.

use crate::config::{validate_config, Config};
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Why a configuration file could not be turned into a usable [`Config`].
///
/// Every variant names the offending file, so startup failures point
/// somewhere actionable.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not valid YAML: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration in {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },
}

/// Open `path`, deserialize it, and check the result against the
/// validation rules.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();

    let file = File::open(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let config: Config = serde_yaml::from_reader(file).map_err(|source| ConfigError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;

    validate_config(&config).map_err(|reason| ConfigError::Invalid {
        path: path.to_path_buf(),
        reason,
    })?;

    Ok(config)
}
