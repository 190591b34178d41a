//! Directory ID cache with per-path single-flight loading.
//!
//! Resolving the ID of `/a/b/c` needs the IDs of `/a` and `/a/b` first, each
//! costing one backend download. The cache memoizes every resolved level and
//! coalesces concurrent misses for the same path into one load: the first
//! caller ("leader") runs the loader, later callers ("waiters") subscribe to a
//! broadcast of the leader's result.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::trace;

use crate::error::CloudProviderError;
use crate::vault::path::{CloudPath, DirId};

type LoadResult = Result<DirId, CloudProviderError>;

/// Result of trying to attach to an in-flight load.
enum AttachResult {
    Leader(broadcast::Sender<LoadResult>),
    Waiter(broadcast::Receiver<LoadResult>),
}

/// Removes the in-flight entry when the leader finishes or is dropped.
///
/// Dropping the entry (and with it the last sender) wakes every waiter of an
/// abandoned leader with `RecvError::Closed`.
struct InFlightGuard<'a> {
    in_flight: &'a DashMap<CloudPath, broadcast::Sender<LoadResult>>,
    path: &'a CloudPath,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(self.path);
    }
}

/// Cache of cleartext folder path → directory ID.
///
/// Thread-safe; share it through the decorator that owns it. Only successful
/// loads are cached, and a load that overlaps an [`invalidate`] is handed to
/// its callers without being cached.
///
/// [`invalidate`]: DirectoryIdCache::invalidate
#[derive(Debug, Default)]
pub struct DirectoryIdCache {
    entries: DashMap<CloudPath, DirId>,
    in_flight: DashMap<CloudPath, broadcast::Sender<LoadResult>>,
    /// Bumped by every invalidation.
    generation: AtomicU64,
}

impl DirectoryIdCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the directory ID of the cleartext folder `path`.
    ///
    /// The root resolves to [`DirId::root`] without calling `loader`. For any
    /// other path, uncached ancestors are resolved top-down, calling
    /// `loader(folder_path, parent_id)` once per missing level.
    pub async fn get<F, Fut>(&self, path: &CloudPath, loader: F) -> LoadResult
    where
        F: Fn(CloudPath, DirId) -> Fut,
        Fut: Future<Output = LoadResult>,
    {
        if path.is_root() {
            return Ok(DirId::root());
        }
        if let Some(id) = self.entries.get(path) {
            return Ok(id.clone());
        }

        let depth = path.depth();
        let mut resolved_depth = 0;
        let mut current = DirId::root();
        for len in (1..depth).rev() {
            if let Some(id) = self.entries.get(&path.truncated(len)) {
                current = id.clone();
                resolved_depth = len;
                break;
            }
        }

        for len in (resolved_depth + 1)..=depth {
            current = self.load_single_flight(path.truncated(len), current, &loader).await?;
        }
        Ok(current)
    }

    async fn load_single_flight<F, Fut>(&self, path: CloudPath, parent_id: DirId, loader: &F) -> LoadResult
    where
        F: Fn(CloudPath, DirId) -> Fut,
        Fut: Future<Output = LoadResult>,
    {
        loop {
            if let Some(id) = self.entries.get(&path) {
                return Ok(id.clone());
            }

            let attach = match self.in_flight.entry(path.clone()) {
                Entry::Occupied(occupied) => AttachResult::Waiter(occupied.get().subscribe()),
                Entry::Vacant(vacant) => {
                    let (sender, _) = broadcast::channel(1);
                    vacant.insert(sender.clone());
                    AttachResult::Leader(sender)
                }
            };

            match attach {
                AttachResult::Leader(sender) => {
                    let guard = InFlightGuard {
                        in_flight: &self.in_flight,
                        path: &path,
                    };
                    // A previous leader may have finished between the lookup
                    // above and the attach.
                    let cached = self.entries.get(&path).map(|id| id.clone());
                    let result = match cached {
                        Some(id) => Ok(id),
                        None => {
                            trace!(path = %path, "Loading directory ID");
                            let generation = self.generation.load(Ordering::SeqCst);
                            let result = loader(path.clone(), parent_id.clone()).await;
                            if let Ok(id) = &result {
                                self.store_loaded(&path, id, generation);
                            }
                            result
                        }
                    };
                    drop(guard);
                    // No receivers is fine
                    let _ = sender.send(result.clone());
                    return result;
                }
                AttachResult::Waiter(mut receiver) => match receiver.recv().await {
                    Ok(result) => return result,
                    Err(_) => {
                        trace!(path = %path, "Directory ID leader abandoned, retrying");
                    }
                },
            }
        }
    }

    /// Cache a freshly loaded ID unless an invalidation ran since `generation`.
    ///
    /// The second check catches an invalidation that lands between the first
    /// check and the insert.
    fn store_loaded(&self, path: &CloudPath, id: &DirId, generation: u64) {
        if self.generation.load(Ordering::SeqCst) != generation {
            trace!(path = %path, "Directory ID invalidated while loading, not caching");
            return;
        }
        self.entries.insert(path.clone(), id.clone());
        if self.generation.load(Ordering::SeqCst) != generation {
            self.entries.remove_if(path, |_, cached| cached == id);
        }
    }

    /// Record a known directory ID, e.g. right after creating the folder.
    pub fn insert(&self, path: CloudPath, id: DirId) {
        if !path.is_root() {
            self.entries.insert(path, id);
        }
    }

    /// Forget `path` and every cached path beneath it.
    pub fn invalidate(&self, path: &CloudPath) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.entries.retain(|cached, _| !cached.starts_with(path));
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
