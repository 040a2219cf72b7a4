//! The `backup.json` descriptor of a backup.

use crate::error::{ExtractError, ManifestError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Well-known name of the manifest inside the outer archive.
pub const MANIFEST_FILE: &str = "backup.json";

/// Manifest versions this tool can read.
pub const SUPPORTED_VERSIONS: &[i64] = &[2];

/// Crypto tag of AES-128-CBC protected backups.
pub const CRYPTO_AES128: &str = "aes128";

/// Backup descriptor.
///
/// Only `version`, `crypto`, `protected` and `compressed` drive extraction;
/// the remaining fields are carried along for reporting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupManifest {
    pub slug: String,
    pub version: i64,
    pub name: String,
    pub date: Option<String>,
    #[serde(rename = "type")]
    pub backup_type: String,
    pub supervisor_version: Option<String>,
    pub crypto: Option<String>,
    /// Inner archives are encrypted
    pub protected: bool,
    /// Inner archives are gzip compressed tar files
    pub compressed: bool,
    pub homeassistant: Option<HomeAssistantInfo>,
    pub extra: Option<serde_json::Value>,
    pub repositories: Vec<String>,
}

/// Core installation details recorded in the manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HomeAssistantInfo {
    pub version: String,
    pub exclude_database: bool,
    pub size: f64,
}

impl BackupManifest {
    /// Reads and parses a manifest file.
    pub fn from_file(path: &Path) -> Result<Self, ExtractError> {
        let contents = fs::read(path)?;
        serde_json::from_slice(&contents).map_err(|source| ExtractError::ManifestUnmarshal {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Manifest assumed for backups that carry no `backup.json`.
    pub fn synthetic(compressed: bool, protected: bool) -> Self {
        Self {
            compressed,
            protected,
            ..Self::default()
        }
    }

    /// Checks crypto tag and version against what this tool supports.
    ///
    /// # Examples
    ///
    /// ```
    /// use habackup::manifest::BackupManifest;
    ///
    /// let manifest: BackupManifest =
    ///     serde_json::from_str(r#"{"version": 2, "crypto": "aes128"}"#).unwrap();
    /// assert!(manifest.validate().is_ok());
    /// ```
    pub fn validate(&self) -> Result<(), ManifestError> {
        let crypto = self.crypto.as_deref().unwrap_or_default();
        if !crypto.is_empty() && !crypto.eq_ignore_ascii_case(CRYPTO_AES128) {
            return Err(ManifestError::UnsupportedCrypto(crypto.to_string()));
        }

        if !SUPPORTED_VERSIONS.contains(&self.version) {
            return Err(ManifestError::UnsupportedVersion(self.version));
        }

        Ok(())
    }
}
