//! Type-safe path handling for cloud vaults.
//!
//! This module provides two distinct types to prevent confusion between:
//! - `DirId`: Internal directory identifiers (opaque bytes, usually a UUID string)
//! - `CloudPath`: Normalized paths on a cloud provider, cleartext or ciphertext

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use relative_path::{RelativePath, RelativePathBuf};
use serde::{Deserialize, Serialize};

/// Opaque directory identifier.
///
/// Every non-root directory of a vault has exactly one, stored in its
/// id-marker file (`0<name>` in format 6, `dir.c9r` in format 7). The ID is
/// hashed by the cryptor to derive the directory's ciphertext location and is
/// used as associated data for the names of its children.
///
/// # Examples
///
/// ```
/// use oxcrypt_cloud::DirId;
///
/// let root = DirId::root();
/// assert!(root.is_root());
///
/// let dir_id = DirId::from_raw("550e8400-e29b-41d4-a716-446655440000");
/// assert!(!dir_id.is_root());
/// assert_eq!(dir_id.as_bytes().len(), 36);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DirId(Vec<u8>);

impl DirId {
    /// The root directory (empty ID).
    #[inline]
    pub fn root() -> Self {
        DirId(Vec::new())
    }

    /// Create a DirId from raw bytes (e.g., the content of an id-marker file).
    #[inline]
    pub fn from_raw(id: impl Into<Vec<u8>>) -> Self {
        DirId(id.into())
    }

    /// Generate a fresh random directory ID (a v4 UUID string).
    pub fn generate() -> Self {
        DirId(uuid::Uuid::new_v4().to_string().into_bytes())
    }

    /// Check if this is the root directory.
    #[inline]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for DirId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for DirId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "<root>")
        } else {
            write!(f, "{}", String::from_utf8_lossy(&self.0))
        }
    }
}

/// Normalized path on a cloud provider.
///
/// Paths use `/` as the separator regardless of the host OS. Leading and
/// trailing slashes, empty segments and `.` segments are dropped, so two paths
/// are equal exactly when their segment lists are equal. Ordering compares the
/// segment lists.
///
/// # Examples
///
/// ```
/// use oxcrypt_cloud::CloudPath;
///
/// let path = CloudPath::new("/Documents/report.txt");
/// assert_eq!(path.file_name(), Some("report.txt"));
/// assert_eq!(path.parent().unwrap().to_string(), "/Documents");
///
/// let path2 = CloudPath::new("Documents//report.txt/");
/// assert_eq!(path, path2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct CloudPath(RelativePathBuf);

impl CloudPath {
    /// The root path (no segments).
    #[inline]
    pub fn root() -> Self {
        CloudPath(RelativePathBuf::new())
    }

    /// Create a new cloud path from a string, normalizing it.
    pub fn new(path: impl AsRef<str>) -> Self {
        let s = path.as_ref().trim_start_matches('/');
        CloudPath(RelativePath::new(s).normalize())
    }

    fn from_components<'a>(components: impl IntoIterator<Item = &'a str>) -> Self {
        let mut buf = RelativePathBuf::new();
        for component in components {
            buf.push(component);
        }
        CloudPath(buf)
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.0.as_str().is_empty()
    }

    /// The path without a leading slash (`""` for the root).
    #[inline]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    #[inline]
    pub fn as_relative_path(&self) -> &RelativePath {
        &self.0
    }

    /// Append one or more segments.
    ///
    /// ```
    /// use oxcrypt_cloud::CloudPath;
    ///
    /// let docs = CloudPath::new("Documents");
    /// assert_eq!(docs.join("report.txt").to_string(), "/Documents/report.txt");
    /// ```
    pub fn join(&self, component: impl AsRef<str>) -> Self {
        CloudPath::new(self.0.join(component.as_ref()).as_str())
    }

    /// The parent path, or `None` for the root.
    pub fn parent(&self) -> Option<CloudPath> {
        if self.is_root() {
            return None;
        }
        let depth = self.depth();
        Some(self.truncated(depth - 1))
    }

    /// The final segment, or `None` for the root.
    pub fn file_name(&self) -> Option<&str> {
        self.components().last()
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.components().map(|c| c.as_str())
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.components().count()
    }

    /// The segment at `index` (zero-based), if present.
    pub fn component(&self, index: usize) -> Option<&str> {
        self.components().nth(index)
    }

    /// The first `len` segments of this path.
    pub fn truncated(&self, len: usize) -> CloudPath {
        CloudPath::from_components(self.components().take(len))
    }

    /// A copy of this path with the segment at `index` replaced by `name`.
    ///
    /// Returns an unchanged copy if `index` is out of range.
    pub fn with_component(&self, index: usize, name: &str) -> CloudPath {
        CloudPath::from_components(
            self.components()
                .enumerate()
                .map(|(i, c)| if i == index { name } else { c }),
        )
    }

    /// Segment-wise prefix test. Every path starts with the root.
    pub fn starts_with(&self, prefix: &CloudPath) -> bool {
        let mut own = self.components();
        prefix.components().all(|p| own.next() == Some(p))
    }

    /// Re-root this path from `from` to `to`, if it lies at or beneath `from`.
    ///
    /// ```
    /// use oxcrypt_cloud::CloudPath;
    ///
    /// let path = CloudPath::new("/a/b/c.txt");
    /// let moved = path.rebase(&CloudPath::new("/a"), &CloudPath::new("/x/y"));
    /// assert_eq!(moved, Some(CloudPath::new("/x/y/b/c.txt")));
    /// ```
    pub fn rebase(&self, from: &CloudPath, to: &CloudPath) -> Option<CloudPath> {
        if !self.starts_with(from) {
            return None;
        }
        let rest = self.components().skip(from.depth());
        Some(CloudPath::from_components(to.components().chain(rest)))
    }

    /// Split this path into parent path and final segment.
    ///
    /// Returns `None` for the root path.
    pub fn split(&self) -> Option<(CloudPath, &str)> {
        let parent = self.parent()?;
        let name = self.file_name()?;
        Some((parent, name))
    }
}

impl PartialEq for CloudPath {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for CloudPath {}

impl Hash for CloudPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl PartialOrd for CloudPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CloudPath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.components().cmp(other.components())
    }
}

impl AsRef<str> for CloudPath {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for CloudPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0)
    }
}

impl From<&str> for CloudPath {
    fn from(s: &str) -> Self {
        CloudPath::new(s)
    }
}

impl From<String> for CloudPath {
    fn from(s: String) -> Self {
        CloudPath::new(s)
    }
}

impl From<CloudPath> for String {
    fn from(path: CloudPath) -> Self {
        path.to_string()
    }
}
