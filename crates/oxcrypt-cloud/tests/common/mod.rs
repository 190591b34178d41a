//! Common test utilities for vault provider integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use oxcrypt_cloud::testing::{MemoryBackend, TestCryptor};
use oxcrypt_cloud::{
    fetch_all_items, open_vault, CloudItemMetadata, CloudPath, CloudProvider, CloudProviderError, VaultFormat,
    VaultProviderConfig, VaultProviderDecorator,
};
use tempfile::NamedTempFile;
use tracing_subscriber::EnvFilter;

/// Install a test-friendly subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A vault over an in-memory backend, initialized and ready for use.
pub struct TestVault {
    pub backend: Arc<MemoryBackend>,
    pub config: VaultProviderConfig,
    pub vault: VaultProviderDecorator,
}

impl TestVault {
    pub async fn new(format: VaultFormat) -> Self {
        Self::with_backend(format, Arc::new(MemoryBackend::new())).await
    }

    pub async fn with_backend(format: VaultFormat, backend: Arc<MemoryBackend>) -> Self {
        init_tracing();
        let config = VaultProviderConfig::new(CloudPath::new("/vault"), format);
        let vault = open_vault(&config, backend.clone(), Arc::new(TestCryptor::new(format.version())))
            .expect("Failed to open vault");
        vault.initialize_root().await.expect("Failed to initialize vault root");
        Self {
            backend,
            config,
            vault,
        }
    }

    /// A second decorator chain over the same backend, with empty caches.
    pub fn reopen(&self) -> VaultProviderDecorator {
        open_vault(
            &self.config,
            self.backend.clone(),
            Arc::new(TestCryptor::new(self.config.format.version())),
        )
        .expect("Failed to reopen vault")
    }

    pub async fn write_file(&self, path: &str, content: &[u8]) -> Result<CloudItemMetadata, CloudProviderError> {
        upload(&self.vault, path, content).await
    }

    pub async fn read_file(&self, path: &str) -> Result<Vec<u8>, CloudProviderError> {
        download(&self.vault, path).await
    }

    pub async fn mkdir(&self, path: &str) {
        self.vault
            .create_folder(&CloudPath::new(path))
            .await
            .unwrap_or_else(|e| panic!("Failed to create {path}: {e}"));
    }

    /// Sorted cleartext names in `folder`.
    pub async fn names(&self, folder: &str) -> Vec<String> {
        list_names(&self.vault, folder).await
    }
}

pub async fn upload(
    provider: &dyn CloudProvider,
    path: &str,
    content: &[u8],
) -> Result<CloudItemMetadata, CloudProviderError> {
    let local = NamedTempFile::new().expect("Failed to create temp file");
    std::fs::write(local.path(), content).expect("Failed to write temp file");
    provider.upload_file(local.path(), &CloudPath::new(path), false).await
}

pub async fn download(provider: &dyn CloudProvider, path: &str) -> Result<Vec<u8>, CloudProviderError> {
    let local = NamedTempFile::new().expect("Failed to create temp file");
    provider.download_file(&CloudPath::new(path), local.path()).await?;
    Ok(std::fs::read(local.path()).expect("Failed to read temp file"))
}

pub async fn list_names(provider: &dyn CloudProvider, folder: &str) -> Vec<String> {
    let mut names: Vec<String> = fetch_all_items(provider, &CloudPath::new(folder))
        .await
        .unwrap_or_else(|e| panic!("Failed to list {folder}: {e}"))
        .into_iter()
        .map(|item| item.name)
        .collect();
    names.sort();
    names
}
