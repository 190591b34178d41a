//! The cloud provider interface and its metadata types.
//!
//! [`CloudProvider`] is both the interface the decorators consume and the one
//! they expose, which is what lets them stack:
//!
//! ```text
//! VaultProviderDecorator ──► ShorteningProviderDecorator ──► LocalBackend / any backend
//! ```

mod local;

pub use local::{LocalBackend, DEFAULT_PAGE_SIZE};

use std::path::Path;
use std::time::SystemTime;

use async_trait::async_trait;

use crate::error::CloudProviderError;
use crate::vault::path::CloudPath;

/// Kind of a cloud item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloudItemType {
    File,
    Folder,
    Symlink,
    Unknown,
}

/// Metadata of one fetched or listed item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudItemMetadata {
    /// Final segment of `cloud_path` (`""` for the root).
    pub name: String,
    pub cloud_path: CloudPath,
    pub item_type: CloudItemType,
    pub last_modified: Option<SystemTime>,
    /// Size in bytes. Above the vault decorator, file and symlink sizes are
    /// cleartext sizes.
    pub size: Option<u64>,
}

impl CloudItemMetadata {
    pub fn new(
        cloud_path: CloudPath,
        item_type: CloudItemType,
        last_modified: Option<SystemTime>,
        size: Option<u64>,
    ) -> Self {
        Self {
            name: cloud_path.file_name().unwrap_or_default().to_string(),
            cloud_path,
            item_type,
            last_modified,
            size,
        }
    }

    /// The same item reported under a different path.
    pub fn relocated(self, cloud_path: CloudPath) -> Self {
        Self {
            name: cloud_path.file_name().unwrap_or_default().to_string(),
            cloud_path,
            ..self
        }
    }

    #[inline]
    pub fn is_folder(&self) -> bool {
        self.item_type == CloudItemType::Folder
    }
}

/// One page of a folder listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloudItemList {
    pub items: Vec<CloudItemMetadata>,
    /// Token for the next page; `None` on the last page.
    pub next_page_token: Option<String>,
}

/// Unified asynchronous interface of a hierarchical cloud storage.
///
/// Every method fails with exactly one [`CloudProviderError`]. Implementations
/// translate their native errors before returning.
///
/// # Examples
///
/// ```no_run
/// use oxcrypt_cloud::{CloudPath, CloudProvider, CloudProviderError};
///
/// async fn total_size(provider: &dyn CloudProvider) -> Result<u64, CloudProviderError> {
///     let items = oxcrypt_cloud::fetch_all_items(provider, &CloudPath::new("/docs")).await?;
///     Ok(items.iter().filter_map(|item| item.size).sum())
/// }
/// ```
#[async_trait]
pub trait CloudProvider: Send + Sync {
    async fn fetch_item_metadata(&self, path: &CloudPath) -> Result<CloudItemMetadata, CloudProviderError>;

    /// List one page of `folder`. Pass the previous page's
    /// `next_page_token` to continue.
    async fn fetch_item_list(
        &self,
        folder: &CloudPath,
        page_token: Option<&str>,
    ) -> Result<CloudItemList, CloudProviderError>;

    /// Download the file at `path` into the local file `local_destination`,
    /// replacing its content.
    async fn download_file(&self, path: &CloudPath, local_destination: &Path) -> Result<(), CloudProviderError>;

    /// Upload the local file `local_source` to `path`.
    ///
    /// Fails with `AlreadyExists` if a file exists at `path` and
    /// `replace_existing` is false, and with `TypeMismatch` if a folder does.
    async fn upload_file(
        &self,
        local_source: &Path,
        path: &CloudPath,
        replace_existing: bool,
    ) -> Result<CloudItemMetadata, CloudProviderError>;

    async fn create_folder(&self, path: &CloudPath) -> Result<(), CloudProviderError>;

    async fn delete_file(&self, path: &CloudPath) -> Result<(), CloudProviderError>;

    /// Delete a folder together with everything beneath it.
    async fn delete_folder(&self, path: &CloudPath) -> Result<(), CloudProviderError>;

    async fn move_file(&self, source: &CloudPath, target: &CloudPath) -> Result<(), CloudProviderError>;

    async fn move_folder(&self, source: &CloudPath, target: &CloudPath) -> Result<(), CloudProviderError>;
}

/// List every item of `folder`, following page tokens until the last page.
pub async fn fetch_all_items(
    provider: &dyn CloudProvider,
    folder: &CloudPath,
) -> Result<Vec<CloudItemMetadata>, CloudProviderError> {
    let mut items = Vec::new();
    let mut page_token: Option<String> = None;
    loop {
        let page = provider.fetch_item_list(folder, page_token.as_deref()).await?;
        items.extend(page.items);
        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => return Ok(items),
        }
    }
}

/// Cut one page out of a sorted listing. Page tokens are item offsets.
pub(crate) fn paginate(
    items: Vec<CloudItemMetadata>,
    page_token: Option<&str>,
    page_size: usize,
) -> Result<CloudItemList, CloudProviderError> {
    let offset = match page_token {
        None => 0,
        Some(token) => token
            .parse::<usize>()
            .ok()
            .filter(|offset| *offset <= items.len())
            .ok_or_else(|| CloudProviderError::InvalidPageToken {
                token: token.to_string(),
            })?,
    };
    let total = items.len();
    let end = offset.saturating_add(page_size.max(1)).min(total);
    Ok(CloudItemList {
        items: items.into_iter().skip(offset).take(end - offset).collect(),
        next_page_token: (end < total).then(|| end.to_string()),
    })
}

/// Create `path`, treating an existing folder as success.
pub(crate) async fn create_folder_if_missing(
    provider: &dyn CloudProvider,
    path: &CloudPath,
) -> Result<(), CloudProviderError> {
    match provider.create_folder(path).await {
        Err(e) if e.is_already_exists() => Ok(()),
        other => other,
    }
}
