use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use log::debug;
use serde::Deserialize;
use thiserror::Error;

pub type SettingsReference = Arc<RwLock<Settings>>;

#[derive(Debug)]
pub enum Error {
    /// Could not deserialise the Yaml.
    DeserialisationError(serde_yaml::Error),

    /// Could not determine from where to load the settings.
    DirectoryError,

    /// IO error with the settings.
    IOError(std::io::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialsError {
    #[error("no GitHub token is configured")]
    MissingToken,
    #[error("no repository owner is configured")]
    MissingOwner,
    #[error("no repository name is configured")]
    MissingRepository,
}

/// Trimmed, non-empty credential triple. Holding one means a remote call is
/// allowed to happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    pub owner: String,
    pub repo: String,
}

/// Persisted key-value settings. Every key may be absent; missing
/// credentials make the configuration invalid rather than unloadable.
/// `lastSyncTimestamp` is written by the external settings UI only.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub token: String,

    #[serde(default)]
    pub owner_login: String,

    #[serde(default)]
    pub repo_name: String,

    #[serde(default)]
    pub last_sync_timestamp: Option<u64>,

    #[serde(default)]
    pub secret: Option<String>,
}

impl Settings {
    pub fn get_path() -> Result<PathBuf, Error> {
        let Some(project_directory) = directories::ProjectDirs::from(
            shared::CONFIG_QUALIFIER,
            shared::CONFIG_ORGANIZATION,
            shared::CONFIG_APPLICATION,
        ) else {
            return Err(Error::DirectoryError);
        };
        let mut settings_path = PathBuf::new();
        settings_path.push(project_directory.config_dir());
        settings_path.push("settings.yaml");
        return Ok(settings_path);
    }

    pub fn load(settings_path: &Path) -> Result<Self, Error> {
        debug!("Loading settings from {}", settings_path.display());
        let fp = File::open(&settings_path).map_err(Error::IOError)?;
        let settings: Settings =
            serde_yaml::from_reader(fp).map_err(Error::DeserialisationError)?;
        return Ok(settings);
    }

    /// Validated credential triple, or the first missing field. No remote
    /// call may be attempted without one.
    pub fn credentials(&self) -> Result<Credentials, CredentialsError> {
        let token = self.token.trim();
        if token.is_empty() {
            return Err(CredentialsError::MissingToken);
        }
        let owner = self.owner_login.trim();
        if owner.is_empty() {
            return Err(CredentialsError::MissingOwner);
        }
        let repo = self.repo_name.trim();
        if repo.is_empty() {
            return Err(CredentialsError::MissingRepository);
        }
        Ok(Credentials {
            token: token.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }
}
