//! Refresh token persistence.
//!
//! This module provides disk-backed storage for the refresh token obtained by
//! an authorization-code exchange, so the one-time browser step does not have
//! to be repeated on every start.
//!
//! # Storage Location
//!
//! The token is stored at `~/.local/share/tickertape/credentials.json` on
//! Linux, under `~/Library/Application Support` on macOS and `%APPDATA%` on
//! Windows. The file is written with owner-only permissions on Unix.
//!
//! # Example
//!
//! ```rust,ignore
//! use tickertape_core::CredentialStore;
//!
//! let store = CredentialStore::load()?;
//! store.save_refresh_token("client-id", "refresh-token")?;
//! let token = store.refresh_token()?;
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::token::Secret;

/// Error type for credential store operations.
#[derive(Debug, Error)]
pub enum CredentialStoreError {
    /// I/O error reading or writing the store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Data directory not available.
    #[error("data directory not available")]
    DataDirUnavailable,
}

/// On-disk format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCredentials {
    /// Version of the store format.
    pub version: u32,

    /// Client id the refresh token was issued to.
    pub client_id: String,

    pub refresh_token: Secret,

    /// When the token was saved.
    pub saved_at: DateTime<Utc>,
}

/// Disk-backed refresh token store.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Platform-specific path of `credentials.json`.
    pub fn default_path() -> Result<PathBuf, CredentialStoreError> {
        let dirs = directories::ProjectDirs::from("com", "raibid-labs", "tickertape")
            .ok_or(CredentialStoreError::DataDirUnavailable)?;
        Ok(dirs.data_dir().join("credentials.json"))
    }

    /// Open the store at the default location.
    pub fn load() -> Result<Self, CredentialStoreError> {
        Ok(Self::at(Self::default_path()?))
    }

    /// Open the store at a specific path. Nothing is read until asked.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored credentials, `Ok(None)` if nothing was saved yet.
    pub fn read(&self) -> Result<Option<StoredCredentials>, CredentialStoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    /// The stored refresh token, if any.
    pub fn refresh_token(&self) -> Result<Option<Secret>, CredentialStoreError> {
        Ok(self
            .read()?
            .map(|stored| stored.refresh_token)
            .filter(|token| !token.is_empty()))
    }

    /// Save a refresh token, replacing any previous one.
    ///
    /// Creates parent directories as needed.
    pub fn save_refresh_token(
        &self,
        client_id: &str,
        refresh_token: &str,
    ) -> Result<StoredCredentials, CredentialStoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let stored = StoredCredentials {
            version: 1,
            client_id: client_id.to_string(),
            refresh_token: Secret::new(refresh_token),
            saved_at: Utc::now(),
        };

        let contents = serde_json::to_string_pretty(&stored)?;
        fs::write(&self.path, contents)?;
        restrict_permissions(&self.path)?;

        tracing::debug!("Saved refresh token to {:?}", self.path);
        Ok(stored)
    }

    /// Delete the stored credentials. Succeeds if there were none.
    pub fn clear(&self) -> Result<(), CredentialStoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
