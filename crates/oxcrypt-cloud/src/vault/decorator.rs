//! Cleartext view of a Cryptomator vault stored on a [`CloudProvider`].
//!
//! Every cleartext path is translated into a ciphertext path before it reaches
//! the delegate:
//!
//! ```text
//! /docs/report.txt
//!   parent "/docs" ──dir id──► <vault>/d/XX/YYYY
//!   "report.txt"   ──encrypt─► <vault>/d/XX/YYYY/<name>.c9r      (format 7)
//!                              <vault>/d/XX/YYYY/<name>          (format 6)
//! ```
//!
//! Folder entries hold the folder's directory ID: `<name>.c9r/dir.c9r` in
//! format 7, the flat file `0<name>` in format 6. Directory IDs are memoized
//! in a [`DirectoryIdCache`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, info, instrument, trace, warn};

use crate::crypto::Cryptor;
use crate::error::{CloudOpContext, CloudProviderError};
use crate::provider::{
    create_folder_if_missing, fetch_all_items, CloudItemList, CloudItemMetadata, CloudItemType, CloudProvider,
};
use crate::vault::cache::DirectoryIdCache;
use crate::vault::config::VaultProviderConfig;
use crate::vault::format::{
    ensure_compatible, VaultFormat, CIPHERTEXT_SUFFIX, DATA_DIR, DIR_MARKER, FOLDER_PREFIX, METADATA_DIR,
    SYMLINK_PREFIX,
};
use crate::vault::path::{CloudPath, DirId};

/// Where a cleartext item lives in its parent's ciphertext directory.
struct CiphertextEntry {
    /// Ciphertext directory of the parent.
    dir: CloudPath,
    /// Encrypted name without type prefix or suffix.
    encrypted_name: String,
}

#[derive(Debug, Clone, Copy)]
enum Transform {
    Encrypt,
    Decrypt,
}

/// [`CloudProvider`] presenting the cleartext content of a vault.
pub struct VaultProviderDecorator {
    delegate: Arc<dyn CloudProvider>,
    cryptor: Arc<dyn Cryptor>,
    vault_path: CloudPath,
    format: VaultFormat,
    dir_id_cache: DirectoryIdCache,
    temp_dir: TempDir,
}

impl VaultProviderDecorator {
    /// Wrap `delegate`, which must already handle name shortening.
    ///
    /// # Errors
    ///
    /// `VersionMismatch` if `cryptor` was unlocked for a different format than
    /// `config.format`.
    pub fn new(
        delegate: Arc<dyn CloudProvider>,
        cryptor: Arc<dyn Cryptor>,
        config: &VaultProviderConfig,
    ) -> Result<Self, CloudProviderError> {
        ensure_compatible(config.format, cryptor.as_ref())?;
        let temp_dir = config.create_temp_dir()?;
        info!(vault = %config.vault_path, format = %config.format, "Opened vault provider");
        Ok(Self {
            delegate,
            cryptor,
            vault_path: config.vault_path.clone(),
            format: config.format,
            dir_id_cache: DirectoryIdCache::new(),
            temp_dir,
        })
    }

    #[inline]
    pub fn format(&self) -> VaultFormat {
        self.format
    }

    #[inline]
    pub fn vault_path(&self) -> &CloudPath {
        &self.vault_path
    }

    pub fn dir_id_cache(&self) -> &DirectoryIdCache {
        &self.dir_id_cache
    }

    /// Create the ciphertext directory of the vault root.
    ///
    /// Existing folders are left alone, so this is safe on an initialized vault.
    #[instrument(level = "info", skip(self), fields(vault = %self.vault_path))]
    pub async fn initialize_root(&self) -> Result<(), CloudProviderError> {
        let root_dir = self.dir_path(&DirId::root())?;
        let mut folders: Vec<CloudPath> = (self.vault_path.depth()..=root_dir.depth())
            .filter(|len| *len > 0)
            .map(|len| root_dir.truncated(len))
            .collect();
        if self.format == VaultFormat::Format6 {
            folders.push(self.vault_path.join(METADATA_DIR));
        }
        for folder in &folders {
            create_folder_if_missing(self.delegate.as_ref(), folder).await?;
        }
        Ok(())
    }

    /// Directory ID of the cleartext folder `path`.
    pub async fn resolve_dir_id(&self, path: &CloudPath) -> Result<DirId, CloudProviderError> {
        self.dir_id_cache
            .get(path, |folder, parent_id| self.load_dir_id(folder, parent_id))
            .await
    }

    /// Ciphertext directory holding the children of the cleartext folder `path`.
    pub async fn resolve_ciphertext_dir(&self, path: &CloudPath) -> Result<CloudPath, CloudProviderError> {
        let dir_id = self.resolve_dir_id(path).await?;
        self.dir_path(&dir_id)
    }

    /// `<vault>/d/<digest[..2]>/<digest[2..]>`
    fn dir_path(&self, dir_id: &DirId) -> Result<CloudPath, CloudProviderError> {
        let digest = self.cryptor.encrypt_dir_id(dir_id).map_err(|e| {
            CloudProviderError::generic(
                format!("Cannot hash directory ID: {e}"),
                CloudOpContext::new().with_dir_id(dir_id),
            )
        })?;
        match (digest.get(..2), digest.get(2..)) {
            (Some(head), Some(tail)) if !tail.is_empty() => {
                Ok(self.vault_path.join(DATA_DIR).join(head).join(tail))
            }
            _ => Err(CloudProviderError::generic(
                format!("Directory ID digest '{digest}' is too short"),
                CloudOpContext::new().with_dir_id(dir_id),
            )),
        }
    }

    fn encrypt_name(&self, name: &str, parent_id: &DirId, path: &CloudPath) -> Result<String, CloudProviderError> {
        self.cryptor
            .encrypt_file_name(name, parent_id, self.format.name_encoding())
            .map_err(|e| {
                CloudProviderError::generic(
                    format!("Cannot encrypt name: {e}"),
                    CloudOpContext::new().with_path(path).with_dir_id(parent_id),
                )
            })
    }

    /// Backend name of an entry of the given type.
    fn entry_name(&self, encrypted_name: &str, item_type: CloudItemType) -> String {
        match (self.format, item_type) {
            (VaultFormat::Format7, _) => format!("{encrypted_name}{CIPHERTEXT_SUFFIX}"),
            (VaultFormat::Format6, CloudItemType::Folder) => format!("{FOLDER_PREFIX}{encrypted_name}"),
            (VaultFormat::Format6, CloudItemType::Symlink) => format!("{SYMLINK_PREFIX}{encrypted_name}"),
            (VaultFormat::Format6, _) => encrypted_name.to_string(),
        }
    }

    /// Path of the id-marker file of a folder entry.
    fn marker_path(&self, entry: &CiphertextEntry) -> CloudPath {
        let entry_path = entry
            .dir
            .join(self.entry_name(&entry.encrypted_name, CloudItemType::Folder));
        match self.format {
            VaultFormat::Format6 => entry_path,
            VaultFormat::Format7 => entry_path.join(DIR_MARKER),
        }
    }

    /// Locate the entry of the cleartext item `path` (not the root).
    async fn locate(&self, path: &CloudPath) -> Result<CiphertextEntry, CloudProviderError> {
        let Some((parent, name)) = path.split() else {
            return Err(CloudProviderError::type_mismatch(path));
        };
        let parent_id = self.resolve_dir_id(&parent).await?;
        Ok(CiphertextEntry {
            dir: self.dir_path(&parent_id)?,
            encrypted_name: self.encrypt_name(name, &parent_id, path)?,
        })
    }

    /// Like [`locate`](Self::locate), for the target of a mutating operation.
    async fn locate_target(&self, path: &CloudPath) -> Result<CiphertextEntry, CloudProviderError> {
        self.locate(path).await.map_err(CloudProviderError::into_parent_missing)
    }

    async fn load_dir_id(&self, path: CloudPath, parent_id: DirId) -> Result<DirId, CloudProviderError> {
        let Some(name) = path.file_name() else {
            return Ok(DirId::root());
        };
        let entry = CiphertextEntry {
            dir: self.dir_path(&parent_id)?,
            encrypted_name: self.encrypt_name(name, &parent_id, &path)?,
        };
        let marker = self.marker_path(&entry);
        let bytes = self.download_bytes(&marker).await.map_err(|e| {
            if e.is_not_found() {
                CloudProviderError::not_found(&path)
            } else {
                e
            }
        })?;
        if bytes.is_empty() {
            return Err(CloudProviderError::InconsistentCache {
                reason: "empty directory ID marker".to_string(),
                context: CloudOpContext::new().with_path(&path),
            });
        }
        trace!(path = %path, "Loaded directory ID");
        Ok(DirId::from_raw(bytes))
    }

    fn temp_file(&self) -> Result<NamedTempFile, CloudProviderError> {
        NamedTempFile::new_in(self.temp_dir.path()).map_err(|e| CloudProviderError::from_io(&e, None))
    }

    async fn download_bytes(&self, path: &CloudPath) -> Result<Vec<u8>, CloudProviderError> {
        let temp = self.temp_file()?;
        self.delegate.download_file(path, temp.path()).await?;
        tokio::fs::read(temp.path())
            .await
            .map_err(|e| CloudProviderError::from_io(&e, None))
    }

    async fn upload_bytes(&self, bytes: &[u8], path: &CloudPath) -> Result<CloudItemMetadata, CloudProviderError> {
        let temp = self.temp_file()?;
        tokio::fs::write(temp.path(), bytes)
            .await
            .map_err(|e| CloudProviderError::from_io(&e, None))?;
        self.delegate.upload_file(temp.path(), path, false).await
    }

    /// Run a content transformation off the async runtime.
    async fn transform_content(
        &self,
        source: PathBuf,
        destination: PathBuf,
        transform: Transform,
    ) -> Result<(), CloudProviderError> {
        let cryptor = Arc::clone(&self.cryptor);
        tokio::task::spawn_blocking(move || match transform {
            Transform::Encrypt => cryptor.encrypt_content(&source, &destination),
            Transform::Decrypt => cryptor.decrypt_content(&source, &destination),
        })
        .await
        .map_err(|e| CloudProviderError::generic(format!("Content task failed: {e}"), CloudOpContext::new()))?
        .map_err(CloudProviderError::from)
    }

    /// Turn backend metadata of a ciphertext entry into cleartext metadata.
    fn cleartext_metadata(
        &self,
        path: CloudPath,
        item_type: CloudItemType,
        ciphertext: &CloudItemMetadata,
    ) -> Result<CloudItemMetadata, CloudProviderError> {
        let size = match (item_type, ciphertext.size) {
            (CloudItemType::File | CloudItemType::Symlink, Some(size)) => {
                Some(self.cryptor.calculate_cleartext_size(size).map_err(|e| {
                    CloudProviderError::generic(format!("Invalid ciphertext size: {e}"), CloudOpContext::from(&path))
                })?)
            }
            (_, size) => size,
        };
        Ok(CloudItemMetadata::new(path, item_type, ciphertext.last_modified, size))
    }

    /// Translate one listed ciphertext entry; `None` means it is not part of the vault.
    fn translate_child(
        &self,
        folder: &CloudPath,
        folder_id: &DirId,
        item: &CloudItemMetadata,
    ) -> Option<Result<CloudItemMetadata, CloudProviderError>> {
        let (encrypted_name, item_type) = match self.format {
            VaultFormat::Format6 => {
                if item.item_type == CloudItemType::Folder {
                    return None;
                }
                if let Some(rest) = item.name.strip_prefix(FOLDER_PREFIX) {
                    (rest, CloudItemType::Folder)
                } else if let Some(rest) = item.name.strip_prefix(SYMLINK_PREFIX) {
                    (rest, CloudItemType::Symlink)
                } else {
                    (item.name.as_str(), CloudItemType::File)
                }
            }
            VaultFormat::Format7 => {
                let rest = item.name.strip_suffix(CIPHERTEXT_SUFFIX)?;
                (rest, item.item_type)
            }
        };

        match self
            .cryptor
            .decrypt_file_name(encrypted_name, folder_id, self.format.name_encoding())
        {
            Ok(name) => Some(self.cleartext_metadata(folder.join(&name), item_type, item)),
            Err(e) => {
                debug!(item = %item.cloud_path, error = %e, "Skipping undecryptable entry");
                None
            }
        }
    }

    /// Directory ID of the folder entry `child`, if it is one.
    async fn child_dir_id(&self, child: &CloudItemMetadata) -> Result<Option<DirId>, CloudProviderError> {
        let marker = match self.format {
            VaultFormat::Format6 if child.item_type == CloudItemType::File && child.name.starts_with(FOLDER_PREFIX) => {
                child.cloud_path.clone()
            }
            VaultFormat::Format7 if child.is_folder() && child.name.ends_with(CIPHERTEXT_SUFFIX) => {
                child.cloud_path.join(DIR_MARKER)
            }
            _ => return Ok(None),
        };
        match self.download_bytes(&marker).await {
            Ok(bytes) if bytes.is_empty() => Err(CloudProviderError::InconsistentCache {
                reason: "empty directory ID marker".to_string(),
                context: CloudOpContext::from(&marker),
            }),
            Ok(bytes) => Ok(Some(DirId::from_raw(bytes))),
            // A format 7 entry without dir.c9r is a symlink
            Err(e) if e.is_not_found() && self.format == VaultFormat::Format7 => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Delete the ciphertext directory of `dir_id` and everything it references.
    ///
    /// Subdirectories are deleted concurrently. Their failures are logged and
    /// do not stop the deletion of `dir_id` itself, which happens once every
    /// subdirectory attempt has settled.
    fn delete_ciphertext_dir(&self, dir_id: DirId) -> BoxFuture<'_, Result<(), CloudProviderError>> {
        async move {
            let dir = self.dir_path(&dir_id)?;
            let children = fetch_all_items(self.delegate.as_ref(), &dir).await?;

            let subtrees = children.iter().map(|child| async move {
                let result = match self.child_dir_id(child).await {
                    Ok(Some(child_id)) => self.delete_ciphertext_dir(child_id).await,
                    Ok(None) => Ok(()),
                    Err(e) => Err(e),
                };
                (child, result)
            });
            for (child, result) in join_all(subtrees).await {
                if let Err(e) = result {
                    warn!(entry = %child.cloud_path, error = %e, "Failed to delete subdirectory, continuing");
                }
            }

            self.delegate.delete_folder(&dir).await?;
            trace!(dir = %dir, "Deleted ciphertext directory");
            Ok::<(), CloudProviderError>(())
        }
        .boxed()
    }
}

#[async_trait]
impl CloudProvider for VaultProviderDecorator {
    #[instrument(level = "debug", skip(self), fields(path = %path))]
    async fn fetch_item_metadata(&self, path: &CloudPath) -> Result<CloudItemMetadata, CloudProviderError> {
        if path.is_root() {
            let root_dir = self.dir_path(&DirId::root())?;
            let ciphertext = self.delegate.fetch_item_metadata(&root_dir).await?;
            return Ok(CloudItemMetadata::new(
                CloudPath::root(),
                CloudItemType::Folder,
                ciphertext.last_modified,
                ciphertext.size,
            ));
        }

        let entry = self.locate(path).await?;
        match self.format {
            VaultFormat::Format7 => {
                let ciphertext_path = entry
                    .dir
                    .join(self.entry_name(&entry.encrypted_name, CloudItemType::File));
                let ciphertext = self.delegate.fetch_item_metadata(&ciphertext_path).await?;
                self.cleartext_metadata(path.clone(), ciphertext.item_type, &ciphertext)
            }
            VaultFormat::Format6 => {
                let file_path = entry
                    .dir
                    .join(self.entry_name(&entry.encrypted_name, CloudItemType::File));
                match self.delegate.fetch_item_metadata(&file_path).await {
                    Ok(ciphertext) => self.cleartext_metadata(path.clone(), CloudItemType::File, &ciphertext),
                    Err(e) if e.is_not_found() => {
                        let folder_path = entry
                            .dir
                            .join(self.entry_name(&entry.encrypted_name, CloudItemType::Folder));
                        let ciphertext = self.delegate.fetch_item_metadata(&folder_path).await?;
                        self.cleartext_metadata(path.clone(), CloudItemType::Folder, &ciphertext)
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    #[instrument(level = "debug", skip(self), fields(folder = %folder))]
    async fn fetch_item_list(
        &self,
        folder: &CloudPath,
        page_token: Option<&str>,
    ) -> Result<CloudItemList, CloudProviderError> {
        let folder_id = self.resolve_dir_id(folder).await?;
        let dir = self.dir_path(&folder_id)?;
        let page = self.delegate.fetch_item_list(&dir, page_token).await?;
        let items = page
            .items
            .iter()
            .filter_map(|item| self.translate_child(folder, &folder_id, item))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CloudItemList {
            items,
            next_page_token: page.next_page_token,
        })
    }

    #[instrument(level = "debug", skip(self, local_destination), fields(path = %path))]
    async fn download_file(&self, path: &CloudPath, local_destination: &Path) -> Result<(), CloudProviderError> {
        let entry = self.locate(path).await?;
        let ciphertext_path = entry
            .dir
            .join(self.entry_name(&entry.encrypted_name, CloudItemType::File));

        let encrypted = self.temp_file()?;
        self.delegate.download_file(&ciphertext_path, encrypted.path()).await?;
        self.transform_content(encrypted.path().to_path_buf(), local_destination.to_path_buf(), Transform::Decrypt)
            .await
    }

    #[instrument(level = "debug", skip(self, local_source), fields(path = %path))]
    async fn upload_file(
        &self,
        local_source: &Path,
        path: &CloudPath,
        replace_existing: bool,
    ) -> Result<CloudItemMetadata, CloudProviderError> {
        let entry = self.locate_target(path).await?;
        let ciphertext_path = entry
            .dir
            .join(self.entry_name(&entry.encrypted_name, CloudItemType::File));

        let encrypted = self.temp_file()?;
        self.transform_content(local_source.to_path_buf(), encrypted.path().to_path_buf(), Transform::Encrypt)
            .await?;
        let uploaded = self
            .delegate
            .upload_file(encrypted.path(), &ciphertext_path, replace_existing)
            .await?;
        self.cleartext_metadata(path.clone(), CloudItemType::File, &uploaded)
    }

    #[instrument(level = "debug", skip(self), fields(path = %path))]
    async fn create_folder(&self, path: &CloudPath) -> Result<(), CloudProviderError> {
        if path.is_root() {
            return Err(CloudProviderError::already_exists(path));
        }
        let entry = self.locate_target(path).await?;
        let dir_id = DirId::generate();

        if self.format == VaultFormat::Format7 {
            let entry_path = entry
                .dir
                .join(self.entry_name(&entry.encrypted_name, CloudItemType::Folder));
            self.delegate.create_folder(&entry_path).await?;
        }
        self.upload_bytes(dir_id.as_bytes(), &self.marker_path(&entry))
            .await?;

        let dir = self.dir_path(&dir_id)?;
        if let Some(parent) = dir.parent() {
            create_folder_if_missing(self.delegate.as_ref(), &parent).await?;
        }
        self.delegate.create_folder(&dir).await?;

        self.dir_id_cache.insert(path.clone(), dir_id);
        debug!(path = %path, dir = %dir, "Created folder");
        Ok(())
    }

    #[instrument(level = "debug", skip(self), fields(path = %path))]
    async fn delete_file(&self, path: &CloudPath) -> Result<(), CloudProviderError> {
        let entry = self.locate(path).await?;
        let ciphertext_path = entry
            .dir
            .join(self.entry_name(&entry.encrypted_name, CloudItemType::File));
        self.delegate.delete_file(&ciphertext_path).await
    }

    #[instrument(level = "debug", skip(self), fields(path = %path))]
    async fn delete_folder(&self, path: &CloudPath) -> Result<(), CloudProviderError> {
        if path.is_root() {
            return Err(CloudProviderError::generic(
                "Refusing to delete the vault root",
                CloudOpContext::from(path),
            ));
        }
        let entry = self.locate(path).await?;
        // TODO: format 6 entries without a readable marker are probably symlinks
        // and should still be deleted through their `1S` entry.
        let dir_id = self.resolve_dir_id(path).await?;

        self.delete_ciphertext_dir(dir_id).await?;

        let entry_path = entry
            .dir
            .join(self.entry_name(&entry.encrypted_name, CloudItemType::Folder));
        match self.format {
            VaultFormat::Format6 => self.delegate.delete_file(&entry_path).await?,
            VaultFormat::Format7 => self.delegate.delete_folder(&entry_path).await?,
        }

        self.dir_id_cache.invalidate(path);
        debug!(path = %path, "Deleted folder");
        Ok(())
    }

    #[instrument(level = "debug", skip(self), fields(source = %source, target = %target))]
    async fn move_file(&self, source: &CloudPath, target: &CloudPath) -> Result<(), CloudProviderError> {
        let (from, to) = futures::try_join!(self.locate(source), self.locate_target(target))?;
        self.delegate
            .move_file(
                &from.dir.join(self.entry_name(&from.encrypted_name, CloudItemType::File)),
                &to.dir.join(self.entry_name(&to.encrypted_name, CloudItemType::File)),
            )
            .await
    }

    #[instrument(level = "debug", skip(self), fields(source = %source, target = %target))]
    async fn move_folder(&self, source: &CloudPath, target: &CloudPath) -> Result<(), CloudProviderError> {
        if source.is_root() || target.starts_with(source) {
            return Err(CloudProviderError::generic(
                "Cannot move a folder into itself",
                CloudOpContext::from(target),
            ));
        }
        let (from, to) = futures::try_join!(self.locate(source), self.locate_target(target))?;
        let from_path = from
            .dir
            .join(self.entry_name(&from.encrypted_name, CloudItemType::Folder));
        let to_path = to.dir.join(self.entry_name(&to.encrypted_name, CloudItemType::Folder));

        match self.format {
            // Format 6 folder entries are marker files
            VaultFormat::Format6 => self.delegate.move_file(&from_path, &to_path).await?,
            VaultFormat::Format7 => self.delegate.move_folder(&from_path, &to_path).await?,
        }
        self.dir_id_cache.invalidate(source);
        Ok(())
    }
}
