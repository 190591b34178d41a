//! Local filesystem backend.
//!
//! Maps cloud paths onto a directory tree using `tokio::fs`. Useful for vaults
//! kept in folders synced by a desktop client, and as a reference backend.

use std::fs::Metadata;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{CloudOpContext, CloudProviderError};
use crate::provider::{paginate, CloudItemList, CloudItemMetadata, CloudItemType, CloudProvider};
use crate::vault::path::CloudPath;

/// Default number of items per listing page.
pub const DEFAULT_PAGE_SIZE: usize = 500;

/// [`CloudProvider`] over a local directory.
///
/// # Examples
///
/// ```no_run
/// use oxcrypt_cloud::{CloudPath, CloudProvider, LocalBackend};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("/home/me/Dropbox")?;
/// backend.create_folder(&CloudPath::new("/Vaults")).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
    page_size: usize,
}

impl LocalBackend {
    /// Create a backend rooted at the existing directory `root`.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, CloudProviderError> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(CloudProviderError::generic(
                format!("Local backend root {} is not a directory", root.display()),
                CloudOpContext::new(),
            ));
        }
        Ok(Self {
            root,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn local_path(&self, path: &CloudPath) -> PathBuf {
        path.as_relative_path().to_path(&self.root)
    }

    fn describe(path: &CloudPath, metadata: &Metadata) -> CloudItemMetadata {
        let item_type = if metadata.is_dir() {
            CloudItemType::Folder
        } else if metadata.is_file() {
            CloudItemType::File
        } else if metadata.is_symlink() {
            CloudItemType::Symlink
        } else {
            CloudItemType::Unknown
        };
        let size = match item_type {
            CloudItemType::Folder => None,
            _ => Some(metadata.len()),
        };
        CloudItemMetadata::new(path.clone(), item_type, metadata.modified().ok(), size)
    }

    /// Type of the item at `path`, or `None` if nothing is there.
    async fn kind(&self, path: &CloudPath) -> Result<Option<CloudItemType>, CloudProviderError> {
        match tokio::fs::metadata(self.local_path(path)).await {
            Ok(metadata) => Ok(Some(Self::describe(path, &metadata).item_type)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CloudProviderError::from_io(&e, Some(path))),
        }
    }

    async fn require_parent(&self, path: &CloudPath) -> Result<(), CloudProviderError> {
        let Some(parent) = path.parent() else {
            return Err(CloudProviderError::already_exists(path));
        };
        match self.kind(&parent).await? {
            Some(CloudItemType::Folder) => Ok(()),
            Some(_) => Err(CloudProviderError::type_mismatch(&parent)),
            None => Err(CloudProviderError::parent_missing(path)),
        }
    }

    async fn require_kind(&self, path: &CloudPath, expected: CloudItemType) -> Result<(), CloudProviderError> {
        match self.kind(path).await? {
            Some(kind) if kind == expected => Ok(()),
            Some(_) => Err(CloudProviderError::type_mismatch(path)),
            None => Err(CloudProviderError::not_found(path)),
        }
    }

    async fn require_vacant(&self, target: &CloudPath) -> Result<(), CloudProviderError> {
        if self.kind(target).await?.is_some() {
            return Err(CloudProviderError::already_exists(target));
        }
        self.require_parent(target).await
    }
}

#[async_trait]
impl CloudProvider for LocalBackend {
    async fn fetch_item_metadata(&self, path: &CloudPath) -> Result<CloudItemMetadata, CloudProviderError> {
        let metadata = tokio::fs::metadata(self.local_path(path))
            .await
            .map_err(|e| CloudProviderError::from_io(&e, Some(path)))?;
        Ok(Self::describe(path, &metadata))
    }

    async fn fetch_item_list(
        &self,
        folder: &CloudPath,
        page_token: Option<&str>,
    ) -> Result<CloudItemList, CloudProviderError> {
        self.require_kind(folder, CloudItemType::Folder).await?;

        let mut entries = tokio::fs::read_dir(self.local_path(folder))
            .await
            .map_err(|e| CloudProviderError::from_io(&e, Some(folder)))?;
        let mut items = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CloudProviderError::from_io(&e, Some(folder)))?
        {
            let Ok(name) = entry.file_name().into_string() else {
                debug!(folder = %folder, "Skipping entry with non-UTF-8 name");
                continue;
            };
            let path = folder.join(&name);
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| CloudProviderError::from_io(&e, Some(&path)))?;
            items.push(Self::describe(&path, &metadata));
        }
        items.sort_by(|a, b| a.name.cmp(&b.name));

        paginate(items, page_token, self.page_size)
    }

    async fn download_file(&self, path: &CloudPath, local_destination: &Path) -> Result<(), CloudProviderError> {
        self.require_kind(path, CloudItemType::File).await?;
        tokio::fs::copy(self.local_path(path), local_destination)
            .await
            .map_err(|e| CloudProviderError::from_io(&e, Some(path)))?;
        Ok(())
    }

    async fn upload_file(
        &self,
        local_source: &Path,
        path: &CloudPath,
        replace_existing: bool,
    ) -> Result<CloudItemMetadata, CloudProviderError> {
        self.require_parent(path).await?;
        match self.kind(path).await? {
            Some(CloudItemType::Folder) => return Err(CloudProviderError::type_mismatch(path)),
            Some(_) if !replace_existing => return Err(CloudProviderError::already_exists(path)),
            _ => {}
        }
        tokio::fs::copy(local_source, self.local_path(path))
            .await
            .map_err(|e| CloudProviderError::from_io(&e, Some(path)))?;
        self.fetch_item_metadata(path).await
    }

    async fn create_folder(&self, path: &CloudPath) -> Result<(), CloudProviderError> {
        self.require_parent(path).await?;
        tokio::fs::create_dir(self.local_path(path))
            .await
            .map_err(|e| CloudProviderError::from_io(&e, Some(path)))?;
        debug!(path = %path, "Created folder");
        Ok(())
    }

    async fn delete_file(&self, path: &CloudPath) -> Result<(), CloudProviderError> {
        self.require_kind(path, CloudItemType::File).await?;
        tokio::fs::remove_file(self.local_path(path))
            .await
            .map_err(|e| CloudProviderError::from_io(&e, Some(path)))
    }

    async fn delete_folder(&self, path: &CloudPath) -> Result<(), CloudProviderError> {
        if path.is_root() {
            return Err(CloudProviderError::generic(
                "Refusing to delete the backend root",
                CloudOpContext::from(path),
            ));
        }
        self.require_kind(path, CloudItemType::Folder).await?;
        tokio::fs::remove_dir_all(self.local_path(path))
            .await
            .map_err(|e| CloudProviderError::from_io(&e, Some(path)))
    }

    async fn move_file(&self, source: &CloudPath, target: &CloudPath) -> Result<(), CloudProviderError> {
        self.require_kind(source, CloudItemType::File).await?;
        self.require_vacant(target).await?;
        tokio::fs::rename(self.local_path(source), self.local_path(target))
            .await
            .map_err(|e| CloudProviderError::from_io(&e, Some(source)))
    }

    async fn move_folder(&self, source: &CloudPath, target: &CloudPath) -> Result<(), CloudProviderError> {
        self.require_kind(source, CloudItemType::Folder).await?;
        if source.is_root() || target.starts_with(source) {
            return Err(CloudProviderError::generic(
                "Cannot move a folder into itself",
                CloudOpContext::from(target),
            ));
        }
        self.require_vacant(target).await?;
        tokio::fs::rename(self.local_path(source), self.local_path(target))
            .await
            .map_err(|e| CloudProviderError::from_io(&e, Some(source)))
    }
}
