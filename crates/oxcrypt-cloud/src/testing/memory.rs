//! In-memory [`CloudProvider`] with paging and fault injection.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::SystemTime;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{CloudOpContext, CloudProviderError};
use crate::provider::{
    paginate, CloudItemList, CloudItemMetadata, CloudItemType, CloudProvider, DEFAULT_PAGE_SIZE,
};
use crate::vault::path::CloudPath;

#[derive(Debug, Clone)]
enum MemoryNode {
    Folder { modified: SystemTime },
    File { data: Vec<u8>, modified: SystemTime },
}

impl MemoryNode {
    fn metadata(&self, path: &CloudPath) -> CloudItemMetadata {
        match self {
            MemoryNode::Folder { modified } => {
                CloudItemMetadata::new(path.clone(), CloudItemType::Folder, Some(*modified), None)
            }
            MemoryNode::File { data, modified } => CloudItemMetadata::new(
                path.clone(),
                CloudItemType::File,
                Some(*modified),
                Some(data.len() as u64),
            ),
        }
    }
}

/// A backend that keeps the whole tree in a map.
///
/// The root folder always exists. Listings are sorted by name and split into
/// pages of `page_size` items.
#[derive(Debug)]
pub struct MemoryBackend {
    nodes: Mutex<BTreeMap<CloudPath, MemoryNode>>,
    page_size: usize,
    failing_folder_deletions: Mutex<HashSet<CloudPath>>,
    failing_moves: Mutex<HashSet<CloudPath>>,
    downloads: AtomicUsize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            CloudPath::root(),
            MemoryNode::Folder {
                modified: SystemTime::now(),
            },
        );
        Self {
            nodes: Mutex::new(nodes),
            page_size: page_size.max(1),
            failing_folder_deletions: Mutex::new(HashSet::new()),
            failing_moves: Mutex::new(HashSet::new()),
            downloads: AtomicUsize::new(0),
        }
    }

    /// Make every `delete_folder` of exactly `path` fail.
    pub fn fail_folder_deletion(&self, path: CloudPath) {
        self.failing_folder_deletions.lock().insert(path);
    }

    /// Make every move whose source is exactly `path` fail.
    pub fn fail_move(&self, path: CloudPath) {
        self.failing_moves.lock().insert(path);
    }

    fn check_move(&self, source: &CloudPath) -> Result<(), CloudProviderError> {
        if self.failing_moves.lock().contains(source) {
            return Err(CloudProviderError::generic(
                "Injected move failure",
                CloudOpContext::from(source),
            ));
        }
        Ok(())
    }

    /// Number of completed downloads so far.
    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn contains(&self, path: &CloudPath) -> bool {
        self.nodes.lock().contains_key(path)
    }

    pub fn is_folder(&self, path: &CloudPath) -> bool {
        matches!(self.nodes.lock().get(path), Some(MemoryNode::Folder { .. }))
    }

    pub fn read_file(&self, path: &CloudPath) -> Option<Vec<u8>> {
        match self.nodes.lock().get(path) {
            Some(MemoryNode::File { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }

    /// Place a file without any checks, e.g. to plant a foreign item.
    pub fn insert_file(&self, path: CloudPath, data: Vec<u8>) {
        self.nodes.lock().insert(
            path,
            MemoryNode::File {
                data,
                modified: SystemTime::now(),
            },
        );
    }

    /// Every stored path, sorted.
    pub fn paths(&self) -> Vec<CloudPath> {
        self.nodes.lock().keys().cloned().collect()
    }

    /// Paths strictly beneath `folder`.
    pub fn descendants(&self, folder: &CloudPath) -> Vec<CloudPath> {
        self.nodes
            .lock()
            .keys()
            .filter(|path| *path != folder && path.starts_with(folder))
            .cloned()
            .collect()
    }

    fn check_parent(nodes: &BTreeMap<CloudPath, MemoryNode>, path: &CloudPath) -> Result<(), CloudProviderError> {
        let Some(parent) = path.parent() else {
            return Err(CloudProviderError::already_exists(path));
        };
        match nodes.get(&parent) {
            Some(MemoryNode::Folder { .. }) => Ok(()),
            Some(MemoryNode::File { .. }) => Err(CloudProviderError::type_mismatch(&parent)),
            None => Err(CloudProviderError::parent_missing(path)),
        }
    }

    fn check_target(nodes: &BTreeMap<CloudPath, MemoryNode>, target: &CloudPath) -> Result<(), CloudProviderError> {
        if nodes.contains_key(target) {
            return Err(CloudProviderError::already_exists(target));
        }
        Self::check_parent(nodes, target)
    }
}

#[async_trait]
impl CloudProvider for MemoryBackend {
    async fn fetch_item_metadata(&self, path: &CloudPath) -> Result<CloudItemMetadata, CloudProviderError> {
        self.nodes
            .lock()
            .get(path)
            .map(|node| node.metadata(path))
            .ok_or_else(|| CloudProviderError::not_found(path))
    }

    async fn fetch_item_list(
        &self,
        folder: &CloudPath,
        page_token: Option<&str>,
    ) -> Result<CloudItemList, CloudProviderError> {
        let nodes = self.nodes.lock();
        match nodes.get(folder) {
            Some(MemoryNode::Folder { .. }) => {}
            Some(MemoryNode::File { .. }) => return Err(CloudProviderError::type_mismatch(folder)),
            None => return Err(CloudProviderError::not_found(folder)),
        }

        let children: Vec<CloudItemMetadata> = nodes
            .iter()
            .filter(|(path, _)| path.parent().as_ref() == Some(folder))
            .map(|(path, node)| node.metadata(path))
            .collect();

        paginate(children, page_token, self.page_size)
    }

    async fn download_file(&self, path: &CloudPath, local_destination: &Path) -> Result<(), CloudProviderError> {
        let data = match self.nodes.lock().get(path) {
            Some(MemoryNode::File { data, .. }) => data.clone(),
            Some(MemoryNode::Folder { .. }) => return Err(CloudProviderError::type_mismatch(path)),
            None => return Err(CloudProviderError::not_found(path)),
        };
        tokio::fs::write(local_destination, data)
            .await
            .map_err(|e| CloudProviderError::from_io(&e, None))?;
        self.downloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn upload_file(
        &self,
        local_source: &Path,
        path: &CloudPath,
        replace_existing: bool,
    ) -> Result<CloudItemMetadata, CloudProviderError> {
        let data = tokio::fs::read(local_source)
            .await
            .map_err(|e| CloudProviderError::from_io(&e, None))?;

        let mut nodes = self.nodes.lock();
        Self::check_parent(&nodes, path)?;
        match nodes.get(path) {
            Some(MemoryNode::Folder { .. }) => return Err(CloudProviderError::type_mismatch(path)),
            Some(MemoryNode::File { .. }) if !replace_existing => {
                return Err(CloudProviderError::already_exists(path));
            }
            _ => {}
        }
        let node = MemoryNode::File {
            data,
            modified: SystemTime::now(),
        };
        let metadata = node.metadata(path);
        nodes.insert(path.clone(), node);
        Ok(metadata)
    }

    async fn create_folder(&self, path: &CloudPath) -> Result<(), CloudProviderError> {
        let mut nodes = self.nodes.lock();
        Self::check_target(&nodes, path)?;
        nodes.insert(
            path.clone(),
            MemoryNode::Folder {
                modified: SystemTime::now(),
            },
        );
        Ok(())
    }

    async fn delete_file(&self, path: &CloudPath) -> Result<(), CloudProviderError> {
        let mut nodes = self.nodes.lock();
        match nodes.get(path) {
            Some(MemoryNode::File { .. }) => {
                nodes.remove(path);
                Ok(())
            }
            Some(MemoryNode::Folder { .. }) => Err(CloudProviderError::type_mismatch(path)),
            None => Err(CloudProviderError::not_found(path)),
        }
    }

    async fn delete_folder(&self, path: &CloudPath) -> Result<(), CloudProviderError> {
        if self.failing_folder_deletions.lock().contains(path) {
            return Err(CloudProviderError::generic(
                "Injected folder deletion failure",
                CloudOpContext::from(path),
            ));
        }
        let mut nodes = self.nodes.lock();
        match nodes.get(path) {
            Some(MemoryNode::Folder { .. }) if !path.is_root() => {
                nodes.retain(|candidate, _| !candidate.starts_with(path));
                Ok(())
            }
            Some(MemoryNode::Folder { .. }) => Err(CloudProviderError::generic(
                "Refusing to delete the root folder",
                CloudOpContext::from(path),
            )),
            Some(MemoryNode::File { .. }) => Err(CloudProviderError::type_mismatch(path)),
            None => Err(CloudProviderError::not_found(path)),
        }
    }

    async fn move_file(&self, source: &CloudPath, target: &CloudPath) -> Result<(), CloudProviderError> {
        self.check_move(source)?;
        let mut nodes = self.nodes.lock();
        match nodes.get(source) {
            Some(MemoryNode::File { .. }) => {}
            Some(MemoryNode::Folder { .. }) => return Err(CloudProviderError::type_mismatch(source)),
            None => return Err(CloudProviderError::not_found(source)),
        }
        Self::check_target(&nodes, target)?;
        if let Some(node) = nodes.remove(source) {
            nodes.insert(target.clone(), node);
        }
        Ok(())
    }

    async fn move_folder(&self, source: &CloudPath, target: &CloudPath) -> Result<(), CloudProviderError> {
        self.check_move(source)?;
        let mut nodes = self.nodes.lock();
        match nodes.get(source) {
            Some(MemoryNode::Folder { .. }) if !source.is_root() => {}
            Some(_) => return Err(CloudProviderError::type_mismatch(source)),
            None => return Err(CloudProviderError::not_found(source)),
        }
        if target.starts_with(source) {
            return Err(CloudProviderError::generic(
                "Cannot move a folder into itself",
                CloudOpContext::from(target),
            ));
        }
        Self::check_target(&nodes, target)?;

        let moved: Vec<CloudPath> = nodes
            .keys()
            .filter(|path| path.starts_with(source))
            .cloned()
            .collect();
        for path in moved {
            if let (Some(node), Some(rebased)) = (nodes.remove(&path), path.rebase(source, target)) {
                nodes.insert(rebased, node);
            }
        }
        Ok(())
    }
}
