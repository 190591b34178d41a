//! Provider decorator that keeps item names below the backend's limit.
//!
//! Sits directly above the raw backend. Callers address items by their full
//! ciphertext names; this layer deflates the item segment on the way down and
//! inflates shortened names found in listings on the way up.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, info, instrument, warn};

use crate::error::CloudProviderError;
use crate::provider::{
    create_folder_if_missing, fetch_all_items, CloudItemList, CloudItemMetadata, CloudItemType, CloudProvider,
};
use crate::shortening::cache::{NameShorteningCache, ShortenedEntry, ShortenedPath};
use crate::vault::config::VaultProviderConfig;
use crate::vault::format::{VaultFormat, CONTENTS_FILE, DIR_MARKER, NAME_FILE, SYMLINK_MARKER};
use crate::vault::path::CloudPath;

/// [`CloudProvider`] that shortens over-long item names.
///
/// # Layout
///
/// - Format 6: a shortened item is a flat `<hash>.lng` file; its original name
///   is stored at `<vault>/m/<2>/<2>/<hash>.lng`.
/// - Format 7: a shortened item is a `<hash>.c9s` folder holding `name.c9s`
///   plus the payload (`contents.c9r`, `dir.c9r` or `symlink.c9r`).
pub struct ShorteningProviderDecorator {
    delegate: Arc<dyn CloudProvider>,
    cache: NameShorteningCache,
    temp_dir: TempDir,
}

impl ShorteningProviderDecorator {
    pub fn new(delegate: Arc<dyn CloudProvider>, config: &VaultProviderConfig) -> Result<Self, CloudProviderError> {
        let cache = NameShorteningCache::new(
            config.vault_path.clone(),
            config.format,
            config.shortening_threshold(),
        );
        let temp_dir = config.create_temp_dir()?;
        info!(
            vault = %config.vault_path,
            format = %config.format,
            threshold = cache.threshold(),
            "Name shortening layer ready"
        );
        Ok(Self {
            delegate,
            cache,
            temp_dir,
        })
    }

    pub fn cache(&self) -> &NameShorteningCache {
        &self.cache
    }

    #[inline]
    fn format(&self) -> VaultFormat {
        self.cache.format()
    }

    fn temp_file(&self) -> Result<NamedTempFile, CloudProviderError> {
        NamedTempFile::new_in(self.temp_dir.path()).map_err(|e| CloudProviderError::from_io(&e, None))
    }

    async fn load_mapping(&self, mapping_path: CloudPath) -> Result<Vec<u8>, CloudProviderError> {
        let temp = self.temp_file()?;
        self.delegate.download_file(&mapping_path, temp.path()).await?;
        tokio::fs::read(temp.path())
            .await
            .map_err(|e| CloudProviderError::from_io(&e, None))
    }

    async fn unshorten(&self, path: &CloudPath) -> Result<CloudPath, CloudProviderError> {
        self.cache
            .unshorten(path, |mapping_path| self.load_mapping(mapping_path))
            .await
    }

    /// Persist the mapping of `entry`, creating the format 6 `m/XX/YY` folders.
    async fn write_mapping(&self, entry: &ShortenedEntry) -> Result<(), CloudProviderError> {
        if self.format() == VaultFormat::Format6 {
            if let Some(parent) = entry.mapping_path.parent() {
                let metadata_depth = self.cache.vault_path().depth() + 1;
                for len in metadata_depth..=parent.depth() {
                    create_folder_if_missing(self.delegate.as_ref(), &parent.truncated(len)).await?;
                }
            }
        }

        let temp = self.temp_file()?;
        tokio::fs::write(temp.path(), entry.original_name.as_bytes())
            .await
            .map_err(|e| CloudProviderError::from_io(&e, None))?;
        self.delegate
            .upload_file(temp.path(), &entry.mapping_path, true)
            .await?;
        debug!(mapping = %entry.mapping_path, "Wrote name mapping");
        Ok(())
    }

    /// Create the format 7 wrapper of `entry`, accepting an existing one.
    async fn ensure_wrapper(&self, entry: &ShortenedEntry) -> Result<(), CloudProviderError> {
        create_folder_if_missing(self.delegate.as_ref(), &entry.entry_path).await
    }

    /// Make sure everything a format 7 operation beneath a wrapper needs
    /// exists: the wrapper and its mapping.
    async fn prepare_nested(&self, shortened: &ShortenedPath) -> Result<(), CloudProviderError> {
        if let Some(entry) = &shortened.entry {
            if self.format() == VaultFormat::Format7 {
                self.ensure_wrapper(entry).await?;
            }
            self.write_mapping(entry).await?;
        }
        Ok(())
    }

    /// Backend path of a file-level operation.
    ///
    /// A format 7 shortened file keeps its bytes in `<wrapper>/contents.c9r`.
    fn payload_path(&self, shortened: &ShortenedPath) -> CloudPath {
        match &shortened.entry {
            Some(entry) if self.format() == VaultFormat::Format7 && shortened.points_to_entry() => {
                entry.entry_path.join(CONTENTS_FILE)
            }
            _ => shortened.path.clone(),
        }
    }

    fn wraps_entry(&self, shortened: &ShortenedPath) -> bool {
        self.format() == VaultFormat::Format7 && shortened.points_to_entry()
    }

    /// Payload child of a format 7 wrapper and the item type it stands for.
    ///
    /// `None` means the wrapper holds no payload, e.g. one left behind by an
    /// interrupted operation.
    async fn wrapper_payload(
        &self,
        wrapper: &CloudPath,
    ) -> Result<Option<(CloudItemType, CloudItemMetadata)>, CloudProviderError> {
        let children = fetch_all_items(self.delegate.as_ref(), wrapper).await?;
        let payloads = [
            (CONTENTS_FILE, CloudItemType::File),
            (DIR_MARKER, CloudItemType::Folder),
            (SYMLINK_MARKER, CloudItemType::Symlink),
        ];
        Ok(payloads.into_iter().find_map(|(payload, item_type)| {
            children
                .iter()
                .find(|child| child.name == payload)
                .map(|child| (item_type, child.clone()))
        }))
    }

    /// Describe a format 7 wrapper by its payload.
    async fn describe_wrapper(
        &self,
        wrapper: &CloudPath,
        reported: &CloudPath,
    ) -> Result<CloudItemMetadata, CloudProviderError> {
        let Some((item_type, payload)) = self.wrapper_payload(wrapper).await? else {
            return Err(CloudProviderError::foreign_item(wrapper));
        };
        let size = match item_type {
            CloudItemType::Folder => None,
            _ => payload.size,
        };
        Ok(CloudItemMetadata::new(
            reported.clone(),
            item_type,
            payload.last_modified,
            size,
        ))
    }

    /// Create the format 7 wrapper of `entry` and its mapping before a
    /// payload is placed in it.
    ///
    /// A wrapper without payload counts as absent and is reused. Returns true
    /// if the wrapper holds no payload, so a failed operation can remove it
    /// again.
    async fn claim_wrapper(&self, entry: &ShortenedEntry, claim: Claim) -> Result<bool, CloudProviderError> {
        let fresh = match self.delegate.create_folder(&entry.entry_path).await {
            Ok(()) => true,
            Err(e) if e.is_already_exists() => match (self.wrapper_payload(&entry.entry_path).await?, claim) {
                (None, _) => {
                    debug!(wrapper = %entry.entry_path, "Reusing wrapper without payload");
                    true
                }
                (Some((CloudItemType::File, _)), Claim::Upload { replace_existing: true }) => false,
                (Some((CloudItemType::File, _)), Claim::Upload { .. }) | (Some(_), Claim::Create) => {
                    return Err(CloudProviderError::already_exists(&entry.entry_path));
                }
                (Some(_), Claim::Upload { .. }) => {
                    return Err(CloudProviderError::type_mismatch(&entry.entry_path));
                }
            },
            Err(e) => return Err(e),
        };
        if let Err(e) = self.write_mapping(entry).await {
            if fresh {
                self.discard_wrapper(entry).await;
            }
            return Err(e);
        }
        Ok(fresh)
    }

    /// Remove a wrapper claimed by an operation that then failed.
    async fn discard_wrapper(&self, entry: &ShortenedEntry) {
        if let Err(e) = self.delegate.delete_folder(&entry.entry_path).await {
            warn!(wrapper = %entry.entry_path, error = %e, "Failed to remove unused wrapper");
        }
    }

    /// Run `operation` against a claimed wrapper, removing the wrapper again
    /// if the operation fails and the wrapper was fresh.
    async fn fill_wrapper<T, Fut>(
        &self,
        entry: &ShortenedEntry,
        fresh: bool,
        operation: Fut,
    ) -> Result<T, CloudProviderError>
    where
        Fut: Future<Output = Result<T, CloudProviderError>>,
    {
        let result = operation.await;
        if result.is_err() && fresh {
            self.discard_wrapper(entry).await;
        }
        result
    }

    /// Translate one listed backend item; `None` drops it from the listing.
    async fn inflate(
        &self,
        folder: &CloudPath,
        item: CloudItemMetadata,
    ) -> Result<Option<CloudItemMetadata>, CloudProviderError> {
        if !self.cache.is_shortened(&item.cloud_path) {
            let reported = folder.join(&item.name);
            return Ok(Some(item.relocated(reported)));
        }

        let original = match self.unshorten(&item.cloud_path).await {
            Ok(original) => original,
            Err(e) if e.is_not_found() => {
                warn!(item = %item.cloud_path, "Dropping shortened item without name mapping");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let reported = folder.join(original.file_name().unwrap_or_default());

        if self.format() == VaultFormat::Format7 && item.is_folder() {
            match self.describe_wrapper(&item.cloud_path, &reported).await {
                Ok(described) => Ok(Some(described)),
                Err(CloudProviderError::UnrelatedForeignItem { .. }) => {
                    warn!(item = %item.cloud_path, "Dropping shortened item without payload");
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        } else {
            Ok(Some(item.relocated(reported)))
        }
    }

    /// Move a format 7 folder whose source or target is a wrapper.
    ///
    /// A wrapper's mapping belongs to its own name, so the children are
    /// transferred one by one instead of renaming the folder. The payload
    /// goes first and the source is deleted last.
    async fn transfer_folder(&self, source: &ShortenedPath, target: &ShortenedPath) -> Result<(), CloudProviderError> {
        let mut children: Vec<CloudItemMetadata> = fetch_all_items(self.delegate.as_ref(), &source.path)
            .await?
            .into_iter()
            .filter(|child| !(source.points_to_entry() && child.name == NAME_FILE))
            .collect();
        children.sort_by_key(|child| !matches!(child.name.as_str(), DIR_MARKER | SYMLINK_MARKER));

        let claimed = match &target.entry {
            Some(entry) if target.points_to_entry() => Some((entry, self.claim_wrapper(entry, Claim::Create).await?)),
            Some(_) => {
                self.prepare_nested(target).await?;
                self.delegate.create_folder(&target.path).await?;
                None
            }
            None => {
                self.delegate.create_folder(&target.path).await?;
                None
            }
        };

        let mut children = children.into_iter();
        if let Some(payload) = children.next() {
            let moved = self.transfer_child(&payload, &target.path);
            match claimed {
                Some((entry, fresh)) => self.fill_wrapper(entry, fresh, moved).await?,
                None => moved.await?,
            }
        }
        for child in children {
            self.transfer_child(&child, &target.path).await?;
        }

        self.delegate.delete_folder(&source.path).await
    }

    async fn transfer_child(&self, child: &CloudItemMetadata, target: &CloudPath) -> Result<(), CloudProviderError> {
        let destination = target.join(&child.name);
        if child.is_folder() {
            self.delegate.move_folder(&child.cloud_path, &destination).await
        } else {
            self.delegate.move_file(&child.cloud_path, &destination).await
        }
    }
}

/// What an operation is about to place in a wrapper.
#[derive(Debug, Clone, Copy)]
enum Claim {
    /// A new item; any existing payload is a conflict.
    Create,
    Upload { replace_existing: bool },
}

#[async_trait]
impl CloudProvider for ShorteningProviderDecorator {
    #[instrument(level = "debug", skip(self), fields(path = %path))]
    async fn fetch_item_metadata(&self, path: &CloudPath) -> Result<CloudItemMetadata, CloudProviderError> {
        let shortened = self.cache.shorten(path);
        match &shortened.entry {
            None => self.delegate.fetch_item_metadata(path).await,
            Some(entry) if self.wraps_entry(&shortened) => {
                match self.describe_wrapper(&entry.entry_path, path).await {
                    Err(CloudProviderError::UnrelatedForeignItem { .. }) => Err(CloudProviderError::not_found(path)),
                    other => other,
                }
            }
            Some(_) => Ok(self
                .delegate
                .fetch_item_metadata(&shortened.path)
                .await?
                .relocated(path.clone())),
        }
    }

    #[instrument(level = "debug", skip(self), fields(folder = %folder))]
    async fn fetch_item_list(
        &self,
        folder: &CloudPath,
        page_token: Option<&str>,
    ) -> Result<CloudItemList, CloudProviderError> {
        let shortened = self.cache.shorten(folder);
        let page = self.delegate.fetch_item_list(&shortened.path, page_token).await?;
        let inflated = try_join_all(page.items.into_iter().map(|item| self.inflate(folder, item))).await?;
        Ok(CloudItemList {
            items: inflated.into_iter().flatten().collect(),
            next_page_token: page.next_page_token,
        })
    }

    #[instrument(level = "debug", skip(self, local_destination), fields(path = %path))]
    async fn download_file(&self, path: &CloudPath, local_destination: &Path) -> Result<(), CloudProviderError> {
        let shortened = self.cache.shorten(path);
        let result = self
            .delegate
            .download_file(&self.payload_path(&shortened), local_destination)
            .await;
        match (result, &shortened.entry) {
            (Err(e), Some(entry)) if e.is_not_found() && self.wraps_entry(&shortened) => {
                match self.wrapper_payload(&entry.entry_path).await {
                    Ok(Some((item_type, _))) if item_type != CloudItemType::File => {
                        Err(CloudProviderError::type_mismatch(path))
                    }
                    _ => Err(CloudProviderError::not_found(path)),
                }
            }
            (result, _) => result,
        }
    }

    #[instrument(level = "debug", skip(self, local_source), fields(path = %path))]
    async fn upload_file(
        &self,
        local_source: &Path,
        path: &CloudPath,
        replace_existing: bool,
    ) -> Result<CloudItemMetadata, CloudProviderError> {
        let shortened = self.cache.shorten(path);
        let Some(entry) = &shortened.entry else {
            return self.delegate.upload_file(local_source, path, replace_existing).await;
        };

        let upload = async {
            let uploaded = self
                .delegate
                .upload_file(local_source, &self.payload_path(&shortened), replace_existing)
                .await?;
            Ok::<_, CloudProviderError>(uploaded.relocated(path.clone()))
        };
        if self.wraps_entry(&shortened) {
            let fresh = self
                .claim_wrapper(entry, Claim::Upload { replace_existing })
                .await?;
            self.fill_wrapper(entry, fresh, upload).await
        } else {
            self.prepare_nested(&shortened).await?;
            upload.await
        }
    }

    #[instrument(level = "debug", skip(self), fields(path = %path))]
    async fn create_folder(&self, path: &CloudPath) -> Result<(), CloudProviderError> {
        let shortened = self.cache.shorten(path);
        let Some(entry) = &shortened.entry else {
            return self.delegate.create_folder(path).await;
        };

        if self.wraps_entry(&shortened) {
            // The wrapper is the folder; the caller fills in dir.c9r
            self.claim_wrapper(entry, Claim::Create).await.map(|_| ())
        } else {
            self.prepare_nested(&shortened).await?;
            self.delegate.create_folder(&shortened.path).await
        }
    }

    #[instrument(level = "debug", skip(self), fields(path = %path))]
    async fn delete_file(&self, path: &CloudPath) -> Result<(), CloudProviderError> {
        let shortened = self.cache.shorten(path);
        if !self.wraps_entry(&shortened) {
            return self.delegate.delete_file(&shortened.path).await;
        }
        match self.wrapper_payload(&shortened.path).await? {
            Some((CloudItemType::File, _)) => self.delegate.delete_folder(&shortened.path).await,
            Some(_) => Err(CloudProviderError::type_mismatch(path)),
            None => Err(CloudProviderError::not_found(path)),
        }
    }

    #[instrument(level = "debug", skip(self), fields(path = %path))]
    async fn delete_folder(&self, path: &CloudPath) -> Result<(), CloudProviderError> {
        let shortened = self.cache.shorten(path);
        self.delegate.delete_folder(&shortened.path).await
    }

    #[instrument(level = "debug", skip(self), fields(source = %source, target = %target))]
    async fn move_file(&self, source: &CloudPath, target: &CloudPath) -> Result<(), CloudProviderError> {
        let from = self.cache.shorten(source);
        let to = self.cache.shorten(target);
        if from.entry.is_none() && to.entry.is_none() {
            return self.delegate.move_file(source, target).await;
        }

        let source_item = self.fetch_item_metadata(source).await?;
        if source_item.item_type != CloudItemType::File {
            return Err(CloudProviderError::type_mismatch(source));
        }

        let (from_payload, to_payload) = (self.payload_path(&from), self.payload_path(&to));
        let moved = self.delegate.move_file(&from_payload, &to_payload);
        match &to.entry {
            Some(entry) if self.wraps_entry(&to) => {
                let fresh = self.claim_wrapper(entry, Claim::Create).await?;
                self.fill_wrapper(entry, fresh, moved).await?;
            }
            Some(_) => {
                self.prepare_nested(&to).await?;
                moved.await?;
            }
            None => moved.await?,
        }

        if self.wraps_entry(&from) {
            self.delegate.delete_folder(&from.path).await?;
        }
        Ok(())
    }

    #[instrument(level = "debug", skip(self), fields(source = %source, target = %target))]
    async fn move_folder(&self, source: &CloudPath, target: &CloudPath) -> Result<(), CloudProviderError> {
        let from = self.cache.shorten(source);
        let to = self.cache.shorten(target);
        if from.entry.is_none() && to.entry.is_none() {
            return self.delegate.move_folder(source, target).await;
        }

        if self.wraps_entry(&from) || self.wraps_entry(&to) {
            return self.transfer_folder(&from, &to).await;
        }

        self.prepare_nested(&to).await?;
        self.delegate.move_folder(&from.path, &to.path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryBackend;

    fn layer(format: VaultFormat) -> (Arc<MemoryBackend>, ShorteningProviderDecorator) {
        let backend = Arc::new(MemoryBackend::new());
        let config = VaultProviderConfig::new(CloudPath::new("/vault"), format);
        let decorator = ShorteningProviderDecorator::new(backend.clone(), &config).unwrap();
        (backend, decorator)
    }

    async fn seed_dir(backend: &MemoryBackend) -> CloudPath {
        let dir = CloudPath::new("/vault/d/AB/CDEF");
        for len in 1..=dir.depth() {
            create_folder_if_missing(backend, &dir.truncated(len)).await.unwrap();
        }
        dir
    }

    async fn upload_bytes(
        provider: &dyn CloudProvider,
        bytes: &[u8],
        path: &CloudPath,
    ) -> Result<CloudItemMetadata, CloudProviderError> {
        let temp = NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), bytes).unwrap();
        provider.upload_file(temp.path(), path, false).await
    }

    #[tokio::test]
    async fn test_format7_upload_creates_wrapper() {
        let (backend, decorator) = layer(VaultFormat::Format7);
        let dir = seed_dir(&backend).await;
        let long = format!("{}.c9r", "n".repeat(240));
        let path = dir.join(&long);

        let meta = upload_bytes(&decorator, b"payload", &path).await.unwrap();
        assert_eq!(meta.cloud_path, path);
        assert_eq!(meta.item_type, CloudItemType::File);

        let shortened = decorator.cache().shorten(&path);
        let entry = shortened.entry.unwrap();
        assert_eq!(
            backend.read_file(&entry.entry_path.join(NAME_FILE)).unwrap(),
            long.as_bytes()
        );
        assert_eq!(
            backend.read_file(&entry.entry_path.join(CONTENTS_FILE)).unwrap(),
            b"payload"
        );

        let err = upload_bytes(&decorator, b"again", &path).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    /// A wrapped folder: `<wrapper>/dir.c9r` plus the mapping.
    async fn wrapped_folder(decorator: &ShorteningProviderDecorator, path: &CloudPath) {
        decorator.create_folder(path).await.unwrap();
        upload_bytes(decorator, b"id", &path.join(DIR_MARKER)).await.unwrap();
    }

    #[tokio::test]
    async fn test_format7_delete_file_refuses_wrapped_folder() {
        let (backend, decorator) = layer(VaultFormat::Format7);
        let dir = seed_dir(&backend).await;
        let folder = dir.join(format!("{}.c9r", "F".repeat(240)));
        wrapped_folder(&decorator, &folder).await;
        let wrapper = decorator.cache().shorten(&folder).path;

        let err = decorator.delete_file(&folder).await.unwrap_err();
        assert!(matches!(err, CloudProviderError::TypeMismatch { .. }), "got {err:?}");
        assert!(backend.contains(&wrapper.join(DIR_MARKER)));

        let file = dir.join(format!("{}.c9r", "G".repeat(240)));
        upload_bytes(&decorator, b"x", &file).await.unwrap();
        decorator.delete_file(&file).await.unwrap();
        assert!(!backend.contains(&decorator.cache().shorten(&file).path));
    }

    #[tokio::test]
    async fn test_format7_download_of_wrapped_folder_is_type_mismatch() {
        let (backend, decorator) = layer(VaultFormat::Format7);
        let dir = seed_dir(&backend).await;
        let folder = dir.join(format!("{}.c9r", "F".repeat(240)));
        wrapped_folder(&decorator, &folder).await;
        let temp = NamedTempFile::new().unwrap();

        let err = decorator.download_file(&folder, temp.path()).await.unwrap_err();
        assert!(matches!(err, CloudProviderError::TypeMismatch { .. }), "got {err:?}");

        let missing = dir.join(format!("{}.c9r", "M".repeat(240)));
        let err = decorator.download_file(&missing, temp.path()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_format7_move_from_missing_source_leaves_no_wrapper() {
        let (backend, decorator) = layer(VaultFormat::Format7);
        let dir = seed_dir(&backend).await;
        let target = dir.join(format!("{}.c9r", "T".repeat(240)));

        let err = decorator
            .move_file(&dir.join("missing.c9r"), &target)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(!backend.contains(&decorator.cache().shorten(&target).path));
        assert!(decorator.fetch_item_metadata(&target).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_format7_wrapper_without_payload_counts_as_absent() {
        let (backend, decorator) = layer(VaultFormat::Format7);
        let dir = seed_dir(&backend).await;
        let file = dir.join(format!("{}.c9r", "S".repeat(240)));
        let folder = dir.join(format!("{}.c9r", "D".repeat(240)));
        for path in [&file, &folder] {
            let entry = decorator.cache().shorten(path).entry.unwrap();
            backend.create_folder(&entry.entry_path).await.unwrap();
            backend.insert_file(entry.mapping_path, entry.original_name.into_bytes());
        }

        assert!(decorator.fetch_item_metadata(&file).await.unwrap_err().is_not_found());
        assert!(fetch_all_items(&decorator, &dir).await.unwrap().is_empty());

        upload_bytes(&decorator, b"fresh", &file).await.unwrap();
        assert_eq!(
            decorator.fetch_item_metadata(&file).await.unwrap().item_type,
            CloudItemType::File
        );
        wrapped_folder(&decorator, &folder).await;
        assert_eq!(
            decorator.fetch_item_metadata(&folder).await.unwrap().item_type,
            CloudItemType::Folder
        );
    }

    #[tokio::test]
    async fn test_format7_failed_folder_transfer_keeps_source() {
        let (backend, decorator) = layer(VaultFormat::Format7);
        let dir = seed_dir(&backend).await;
        let short = dir.join("folder.c9r");
        let long = dir.join(format!("{}.c9r", "f".repeat(240)));
        decorator.create_folder(&short).await.unwrap();
        upload_bytes(&decorator, b"id", &short.join(DIR_MARKER)).await.unwrap();
        backend.fail_move(short.join(DIR_MARKER));

        assert!(decorator.move_folder(&short, &long).await.is_err());

        assert_eq!(backend.read_file(&short.join(DIR_MARKER)).unwrap(), b"id");
        assert!(!backend.contains(&decorator.cache().shorten(&long).path));
    }

    #[tokio::test]
    async fn test_format7_listing_inflates_names() {
        let (backend, decorator) = layer(VaultFormat::Format7);
        let dir = seed_dir(&backend).await;
        let long = format!("{}.c9r", "m".repeat(240));
        upload_bytes(&decorator, b"12345", &dir.join(&long)).await.unwrap();
        upload_bytes(&decorator, b"1", &dir.join("short.c9r")).await.unwrap();

        // Fresh layer so the mapping has to come from the backend
        let config = VaultProviderConfig::new(CloudPath::new("/vault"), VaultFormat::Format7);
        let fresh = ShorteningProviderDecorator::new(backend.clone(), &config).unwrap();
        let mut items = fetch_all_items(&fresh, &dir).await.unwrap();
        items.sort_by(|a, b| a.name.cmp(&b.name));

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, long);
        assert_eq!(items[0].item_type, CloudItemType::File);
        assert_eq!(items[0].size, Some(5));
        assert_eq!(items[1].name, "short.c9r");
    }

    #[tokio::test]
    async fn test_listing_drops_shortened_item_without_mapping() {
        let (backend, decorator) = layer(VaultFormat::Format6);
        let dir = seed_dir(&backend).await;
        backend.insert_file(dir.join("ORPHANED.lng"), b"x".to_vec());
        backend.insert_file(dir.join("PLAIN"), b"x".to_vec());

        let items = fetch_all_items(&decorator, &dir).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "PLAIN");
    }

    #[tokio::test]
    async fn test_format6_mapping_under_metadata_dir() {
        let (backend, decorator) = layer(VaultFormat::Format6);
        let dir = seed_dir(&backend).await;
        let long = format!("0{}", "A".repeat(150));
        let path = dir.join(&long);

        upload_bytes(&decorator, b"dir-id", &path).await.unwrap();

        let entry = decorator.cache().shorten(&path).entry.unwrap();
        assert!(entry.mapping_path.starts_with(&CloudPath::new("/vault/m")));
        assert_eq!(backend.read_file(&entry.mapping_path).unwrap(), long.as_bytes());
        assert_eq!(backend.read_file(&entry.entry_path).unwrap(), b"dir-id");

        let meta = decorator.fetch_item_metadata(&path).await.unwrap();
        assert_eq!(meta.name, long);
    }

    #[tokio::test]
    async fn test_format7_move_out_of_wrapper() {
        let (backend, decorator) = layer(VaultFormat::Format7);
        let dir = seed_dir(&backend).await;
        let long = dir.join(format!("{}.c9r", "k".repeat(240)));
        let short = dir.join("short.c9r");
        upload_bytes(&decorator, b"bytes", &long).await.unwrap();
        let wrapper = decorator.cache().shorten(&long).path;

        decorator.move_file(&long, &short).await.unwrap();

        assert_eq!(backend.read_file(&short).unwrap(), b"bytes");
        assert!(!backend.contains(&wrapper));
    }

    #[tokio::test]
    async fn test_format7_folder_into_wrapper() {
        let (backend, decorator) = layer(VaultFormat::Format7);
        let dir = seed_dir(&backend).await;
        let short = dir.join("folder.c9r");
        let long = dir.join(format!("{}.c9r", "f".repeat(240)));
        decorator.create_folder(&short).await.unwrap();
        upload_bytes(&decorator, b"id", &short.join(DIR_MARKER)).await.unwrap();

        decorator.move_folder(&short, &long).await.unwrap();

        assert!(!backend.contains(&short));
        let meta = decorator.fetch_item_metadata(&long).await.unwrap();
        assert_eq!(meta.item_type, CloudItemType::Folder);
        let temp = NamedTempFile::new().unwrap();
        decorator
            .download_file(&long.join(DIR_MARKER), temp.path())
            .await
            .unwrap();
        assert_eq!(std::fs::read(temp.path()).unwrap(), b"id");
    }
}
