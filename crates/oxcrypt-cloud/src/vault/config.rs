//! Vault provider configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{CloudOpContext, CloudProviderError};
use crate::vault::format::VaultFormat;
use crate::vault::path::CloudPath;

/// Where a vault lives and how it is laid out.
///
/// # JSON
///
/// ```
/// use oxcrypt_cloud::{CloudPath, VaultFormat, VaultProviderConfig};
///
/// let config = VaultProviderConfig::from_json(
///     r#"{ "vaultPath": "/Vaults/personal", "format": 7, "shorteningThreshold": 180 }"#,
/// ).unwrap();
/// assert_eq!(config.vault_path, CloudPath::new("/Vaults/personal"));
/// assert_eq!(config.format, VaultFormat::Format7);
/// assert_eq!(config.shortening_threshold(), 180);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultProviderConfig {
    /// Vault root folder on the backend.
    pub vault_path: CloudPath,
    pub format: VaultFormat,
    /// Overrides the format's default threshold (the vault's
    /// `shorteningThreshold` claim).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortening_threshold: Option<usize>,
    /// Parent of the decorators' private temp directories. Defaults to the
    /// system temp directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,
}

impl VaultProviderConfig {
    pub fn new(vault_path: CloudPath, format: VaultFormat) -> Self {
        Self {
            vault_path,
            format,
            shortening_threshold: None,
            temp_dir: None,
        }
    }

    #[must_use]
    pub fn with_shortening_threshold(mut self, threshold: usize) -> Self {
        self.shortening_threshold = Some(threshold);
        self
    }

    #[must_use]
    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(temp_dir.into());
        self
    }

    pub fn from_json(json: &str) -> Result<Self, CloudProviderError> {
        serde_json::from_str(json).map_err(|e| {
            CloudProviderError::generic(format!("Invalid vault provider config: {e}"), CloudOpContext::new())
        })
    }

    /// The effective shortening threshold.
    pub fn shortening_threshold(&self) -> usize {
        self.shortening_threshold
            .unwrap_or_else(|| self.format.default_shortening_threshold())
    }

    /// Create a private temp directory under the configured parent.
    pub(crate) fn create_temp_dir(&self) -> Result<tempfile::TempDir, CloudProviderError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("oxcrypt-cloud-");
        let result = match &self.temp_dir {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        };
        result.map_err(|e| CloudProviderError::from_io(&e, None))
    }
}
