//! Vault layout, directory IDs and the cleartext provider.

pub mod cache;
pub mod config;
pub mod decorator;
pub mod format;
pub mod path;

use std::sync::Arc;

pub use cache::DirectoryIdCache;
pub use config::VaultProviderConfig;
pub use decorator::VaultProviderDecorator;
pub use format::VaultFormat;
pub use path::{CloudPath, DirId};

use crate::crypto::Cryptor;
use crate::error::CloudProviderError;
use crate::provider::CloudProvider;
use crate::shortening::ShorteningProviderDecorator;

/// Build the decorator chain for the vault described by `config`.
///
/// ```text
/// VaultProviderDecorator ──► ShorteningProviderDecorator ──► backend
/// ```
///
/// The cryptor's masterkey format is checked before anything else is built.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use oxcrypt_cloud::testing::{MemoryBackend, TestCryptor};
/// use oxcrypt_cloud::{open_vault, CloudPath, VaultFormat, VaultProviderConfig};
///
/// let config = VaultProviderConfig::new(CloudPath::new("/vault"), VaultFormat::Format7);
/// let vault = open_vault(&config, Arc::new(MemoryBackend::new()), Arc::new(TestCryptor::new(7)));
/// assert!(vault.is_ok());
///
/// let wrong_key = open_vault(&config, Arc::new(MemoryBackend::new()), Arc::new(TestCryptor::new(6)));
/// assert!(wrong_key.is_err());
/// ```
pub fn open_vault(
    config: &VaultProviderConfig,
    backend: Arc<dyn CloudProvider>,
    cryptor: Arc<dyn Cryptor>,
) -> Result<VaultProviderDecorator, CloudProviderError> {
    format::ensure_compatible(config.format, cryptor.as_ref())?;
    let shortening = ShorteningProviderDecorator::new(backend, config)?;
    VaultProviderDecorator::new(Arc::new(shortening), cryptor, config)
}
