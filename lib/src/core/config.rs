// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot access configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("configuration is invalid: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Loading, saving and validation of YAML configuration files.
pub trait Config: Serialize + DeserializeOwned {
    /// Returns every problem with the configuration, or an empty list when it is usable.
    fn validation_errors(&self) -> Vec<String>;

    fn is_valid(&self) -> bool {
        let errors = self.validation_errors();
        for e in &errors {
            error!("{}", e);
        }
        errors.is_empty()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let errors = self.validation_errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    /// Writes the configuration, refusing to write an invalid one.
    fn save(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        let s = serde_yaml::to_string(self)?;
        fs::write(path, s).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn load(path: &Path) -> Result<Self, ConfigError> {
        let s = fs::read_to_string(path).map_err(|source| {
            error!("Cannot read configuration file {}", path.display());
            ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let config: Self = serde_yaml::from_str(&s).map_err(|err| {
            error!(
                "Cannot deserialize configuration from {}, error reason: {}",
                path.display(),
                err
            );
            err
        })?;
        config.validate()?;
        Ok(config)
    }
}
