//! Deterministic shortening of over-long ciphertext names.
//!
//! Only the item segment directly beneath a ciphertext directory
//! (`<vault>/d/XX/YYYY/<item>`) is ever shortened. A name longer than the
//! threshold is replaced by `encode(SHA1(nfc(name))) + suffix`; the original is
//! kept in a mapping file stored next to (format 7) or apart from (format 6)
//! the shortened item.
//!
//! # Reference Implementation
//!
//! - Format 6: `<vault>/m/<s[0..2]>/<s[2..4]>/<s>` holds the original name
//! - Format 7: `<s>/name.c9s` inside the `.c9s` wrapper holds the original name

use std::future::Future;

use dashmap::DashMap;
use ring::digest;
use tracing::trace;
use unicode_normalization::UnicodeNormalization;

use crate::error::{CloudOpContext, CloudProviderError};
use crate::vault::format::{VaultFormat, DATA_DIR, METADATA_DIR, NAME_FILE};
use crate::vault::path::CloudPath;

/// One shortened item and the location of its durable mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortenedEntry {
    /// The name that was too long.
    pub original_name: String,
    /// Hash-derived replacement, including the suffix.
    pub shortened_name: String,
    /// Path of the shortened item itself.
    pub entry_path: CloudPath,
    /// Path of the file holding `original_name`.
    pub mapping_path: CloudPath,
}

/// Result of [`NameShorteningCache::shorten`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortenedPath {
    /// The path to use on the backend.
    pub path: CloudPath,
    /// Set when the item segment was shortened.
    pub entry: Option<ShortenedEntry>,
}

impl ShortenedPath {
    /// True if the path addresses the shortened item itself rather than
    /// something inside a format 7 wrapper.
    pub fn points_to_entry(&self) -> bool {
        self.entry
            .as_ref()
            .is_some_and(|entry| entry.entry_path == self.path)
    }
}

/// Shortened name → original name, backed by the vault's mapping files.
#[derive(Debug)]
pub struct NameShorteningCache {
    vault_path: CloudPath,
    format: VaultFormat,
    threshold: usize,
    item_index: usize,
    entries: DashMap<String, String>,
}

impl NameShorteningCache {
    pub fn new(vault_path: CloudPath, format: VaultFormat, threshold: usize) -> Self {
        let item_index = vault_path.depth() + 3;
        Self {
            vault_path,
            format,
            threshold,
            item_index,
            entries: DashMap::new(),
        }
    }

    #[inline]
    pub fn vault_path(&self) -> &CloudPath {
        &self.vault_path
    }

    #[inline]
    pub fn format(&self) -> VaultFormat {
        self.format
    }

    #[inline]
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Zero-based index of the item segment in backend paths.
    #[inline]
    pub fn item_index(&self) -> usize {
        self.item_index
    }

    /// The item segment of `path`, if `path` reaches into a ciphertext directory.
    pub fn item_segment<'a>(&self, path: &'a CloudPath) -> Option<&'a str> {
        if !path.starts_with(&self.vault_path)
            || path.component(self.vault_path.depth()) != Some(DATA_DIR)
        {
            return None;
        }
        path.component(self.item_index)
    }

    /// True if the item segment of `path` is a shortened name.
    pub fn is_shortened(&self, path: &CloudPath) -> bool {
        self.item_segment(path)
            .is_some_and(|segment| self.format.is_shortened(segment))
    }

    /// Compute the shortened name for `name`.
    pub fn shortened_name(&self, name: &str) -> String {
        let normalized: String = name.nfc().collect();
        let hash = digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, normalized.as_bytes());
        format!(
            "{}{}",
            self.format.encode_digest(hash.as_ref()),
            self.format.shortened_suffix()
        )
    }

    /// Location of the mapping file for the shortened item at `entry_path`.
    pub fn mapping_path(&self, entry_path: &CloudPath, shortened_name: &str) -> CloudPath {
        match self.format {
            VaultFormat::Format6 => {
                let first = shortened_name.get(..2).unwrap_or(shortened_name);
                let second = shortened_name.get(2..4).unwrap_or_default();
                self.vault_path
                    .join(METADATA_DIR)
                    .join(first)
                    .join(second)
                    .join(shortened_name)
            }
            VaultFormat::Format7 => entry_path.join(NAME_FILE),
        }
    }

    /// Shorten the item segment of `path` if it exceeds the threshold.
    ///
    /// Records the mapping locally; persisting the mapping file is up to the
    /// caller.
    pub fn shorten(&self, path: &CloudPath) -> ShortenedPath {
        let Some(segment) = self.item_segment(path) else {
            return ShortenedPath {
                path: path.clone(),
                entry: None,
            };
        };
        if segment.chars().count() <= self.threshold {
            return ShortenedPath {
                path: path.clone(),
                entry: None,
            };
        }

        let shortened_name = self.shortened_name(segment);
        let entry_path = path
            .truncated(self.item_index + 1)
            .with_component(self.item_index, &shortened_name);
        let mapping_path = self.mapping_path(&entry_path, &shortened_name);
        self.entries
            .insert(shortened_name.clone(), segment.to_string());
        trace!(original = segment, shortened = %shortened_name, "Shortened item name");

        ShortenedPath {
            path: path.with_component(self.item_index, &shortened_name),
            entry: Some(ShortenedEntry {
                original_name: segment.to_string(),
                shortened_name,
                entry_path,
                mapping_path,
            }),
        }
    }

    /// Reverse [`shorten`](Self::shorten).
    ///
    /// On a cache miss `loader` is called with the mapping file's path and
    /// must return its content.
    pub async fn unshorten<F, Fut>(&self, path: &CloudPath, loader: F) -> Result<CloudPath, CloudProviderError>
    where
        F: FnOnce(CloudPath) -> Fut,
        Fut: Future<Output = Result<Vec<u8>, CloudProviderError>>,
    {
        let Some(segment) = self.item_segment(path) else {
            return Ok(path.clone());
        };
        if !self.format.is_shortened(segment) {
            return Ok(path.clone());
        }

        let cached = self.entries.get(segment).map(|original| original.clone());
        let original = match cached {
            Some(original) => original,
            None => {
                let entry_path = path.truncated(self.item_index + 1);
                let bytes = loader(self.mapping_path(&entry_path, segment)).await?;
                let original = String::from_utf8(bytes).map_err(|_| {
                    CloudProviderError::generic(
                        "Name mapping is not valid UTF-8",
                        CloudOpContext::from(&entry_path),
                    )
                })?;
                self.entries.insert(segment.to_string(), original.clone());
                original
            }
        };
        Ok(path.with_component(self.item_index, &original))
    }
}
