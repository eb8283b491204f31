use std::path::PathBuf;

use thiserror::Error;

/// Raison pour laquelle un fichier de profil est ignoré au chargement.
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Cannot read profile file {0}: {1}")]
    Io(PathBuf, std::io::Error),
    #[error("Invalid {key} pattern \"{pattern}\" in profile {profile}: {reason}")]
    InvalidPattern {
        profile: String,
        key: String,
        pattern: String,
        reason: String,
    },
    #[error("Profile file {0} switched between renderer and device file, restart to apply")]
    KindChanged(PathBuf),
    #[error("Invalid {key} value \"{value}\" in profile {profile}")]
    InvalidValue {
        profile: String,
        key: String,
        value: String,
    },
}

impl ProfileError {
    pub fn invalid_pattern(profile: &str, key: &str, pattern: &str, err: &regex::Error) -> Self {
        ProfileError::InvalidPattern {
            profile: profile.to_string(),
            key: key.to_string(),
            pattern: pattern.to_string(),
            reason: err.to_string(),
        }
    }

    pub fn invalid_value(profile: &str, key: &str, value: &str) -> Self {
        ProfileError::InvalidValue {
            profile: profile.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum RendererError {
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error("No enabled profile matches \"{0}\"")]
    UnknownProfile(String),
    #[error("No association for {0}")]
    UnknownDevice(String),
    #[error("Profile file {0} already exists")]
    ProfileExists(PathBuf),
    #[error("Cannot write profile file {0}: {1}")]
    Write(PathBuf, std::io::Error),
    #[error("Cannot start thread {0}: {1}")]
    Thread(String, std::io::Error),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RendererError {
    pub fn config(err: anyhow::Error) -> Self {
        RendererError::Config(format!("{err:#}"))
    }
}
