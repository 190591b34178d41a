//! Error taxonomy shared by every [`CloudProvider`](crate::CloudProvider) layer.
//!
//! Backend-native failures (`std::io::Error`, cryptor failures) are translated
//! into [`CloudProviderError`] once, at the layer where they occur. Decorators
//! above that point propagate the taxonomy unchanged.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::crypto::CryptorError;
use crate::vault::path::{CloudPath, DirId};

/// Context for a failed cloud operation, providing debugging information.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloudOpContext {
    /// The cloud path being operated on (cleartext or ciphertext, depending on the layer)
    pub path: Option<String>,
    /// The directory ID involved in the operation
    pub dir_id: Option<String>,
}

impl CloudOpContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(mut self, path: &CloudPath) -> Self {
        self.path = Some(path.to_string());
        self
    }

    pub fn with_dir_id(mut self, dir_id: &DirId) -> Self {
        self.dir_id = Some(dir_id.to_string());
        self
    }
}

impl From<&CloudPath> for CloudOpContext {
    fn from(path: &CloudPath) -> Self {
        CloudOpContext::new().with_path(path)
    }
}

impl fmt::Display for CloudOpContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();

        if let Some(ref path) = self.path {
            parts.push(format!("path '{path}'"));
        }
        if let Some(ref dir_id) = self.dir_id {
            let display_id = if dir_id.chars().count() > 12 {
                format!("{}...", dir_id.chars().take(12).collect::<String>())
            } else {
                dir_id.clone()
            };
            parts.push(format!("in directory {display_id}"));
        }

        if parts.is_empty() {
            write!(f, "(no context)")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// Every public operation of every layer fails with exactly one of these.
///
/// The type is `Clone` so that a single result can be handed to every waiter
/// of a coalesced directory-id lookup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CloudProviderError {
    #[error("Item not found for {context}")]
    NotFound { context: CloudOpContext },

    #[error("Item already exists for {context}")]
    AlreadyExists { context: CloudOpContext },

    /// A file was found where a folder was expected, or vice versa.
    #[error("Item type mismatch for {context}")]
    TypeMismatch { context: CloudOpContext },

    #[error("Parent folder does not exist for {context}")]
    ParentMissing { context: CloudOpContext },

    #[error("Quota exceeded for {context}")]
    QuotaExceeded { context: CloudOpContext },

    #[error("Unauthorized access to {context}")]
    Unauthorized { context: CloudOpContext },

    #[error("Invalid page token '{token}'")]
    InvalidPageToken { token: String },

    #[error("Inconsistent cache state for {context}: {reason}")]
    InconsistentCache {
        reason: String,
        context: CloudOpContext,
    },

    /// The item lives inside the vault's storage area but is not part of the vault.
    #[error("Unrelated foreign item at {context}")]
    UnrelatedForeignItem { context: CloudOpContext },

    #[error("Vault format mismatch: vault uses format {expected}, masterkey reports version {actual}")]
    VersionMismatch { expected: u32, actual: u32 },

    #[error("{reason} ({context})")]
    Generic {
        reason: String,
        context: CloudOpContext,
    },
}

impl CloudProviderError {
    pub fn not_found(path: &CloudPath) -> Self {
        CloudProviderError::NotFound { context: path.into() }
    }

    pub fn already_exists(path: &CloudPath) -> Self {
        CloudProviderError::AlreadyExists { context: path.into() }
    }

    pub fn type_mismatch(path: &CloudPath) -> Self {
        CloudProviderError::TypeMismatch { context: path.into() }
    }

    pub fn parent_missing(path: &CloudPath) -> Self {
        CloudProviderError::ParentMissing { context: path.into() }
    }

    pub fn foreign_item(path: &CloudPath) -> Self {
        CloudProviderError::UnrelatedForeignItem { context: path.into() }
    }

    pub fn generic(reason: impl Into<String>, context: CloudOpContext) -> Self {
        CloudProviderError::Generic {
            reason: reason.into(),
            context,
        }
    }

    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudProviderError::NotFound { .. })
    }

    #[inline]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, CloudProviderError::AlreadyExists { .. })
    }

    /// Translate an I/O error into the taxonomy.
    ///
    /// `path` is the cloud path the I/O concerned, if any. Errors on private
    /// temp files pass `None`.
    pub fn from_io(err: &io::Error, path: Option<&CloudPath>) -> Self {
        let context = path.map(CloudOpContext::from).unwrap_or_default();
        match err.kind() {
            io::ErrorKind::NotFound => CloudProviderError::NotFound { context },
            io::ErrorKind::AlreadyExists => CloudProviderError::AlreadyExists { context },
            io::ErrorKind::PermissionDenied => CloudProviderError::Unauthorized { context },
            io::ErrorKind::StorageFull | io::ErrorKind::QuotaExceeded => {
                CloudProviderError::QuotaExceeded { context }
            }
            io::ErrorKind::NotADirectory | io::ErrorKind::IsADirectory => {
                CloudProviderError::TypeMismatch { context }
            }
            _ => CloudProviderError::Generic {
                reason: format!("I/O error: {err}"),
                context,
            },
        }
    }

    /// Rewrite a `NotFound` into `ParentMissing`.
    ///
    /// Used where the failing lookup was the parent of the target.
    pub(crate) fn into_parent_missing(self) -> Self {
        match self {
            CloudProviderError::NotFound { context } => CloudProviderError::ParentMissing { context },
            other => other,
        }
    }
}

impl From<CryptorError> for CloudProviderError {
    fn from(err: CryptorError) -> Self {
        CloudProviderError::Generic {
            reason: format!("Cryptor failure: {err}"),
            context: CloudOpContext::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_display() {
        let ctx = CloudOpContext::new()
            .with_path(&CloudPath::new("/vault/d/AB/CDEF"))
            .with_dir_id(&DirId::from_raw("550e8400-e29b-41d4-a716-446655440000"));
        assert_eq!(
            ctx.to_string(),
            "path '/vault/d/AB/CDEF', in directory 550e8400-e29..."
        );
        assert_eq!(CloudOpContext::new().to_string(), "(no context)");
    }

    #[test]
    fn test_from_io_maps_kinds() {
        let path = CloudPath::new("/a/b");
        let not_found = io::Error::new(io::ErrorKind::NotFound, "gone");
        assert!(CloudProviderError::from_io(&not_found, Some(&path)).is_not_found());

        let exists = io::Error::new(io::ErrorKind::AlreadyExists, "there");
        assert!(CloudProviderError::from_io(&exists, Some(&path)).is_already_exists());

        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "no");
        assert!(matches!(
            CloudProviderError::from_io(&denied, None),
            CloudProviderError::Unauthorized { .. }
        ));

        let other = io::Error::other("boom");
        assert!(matches!(
            CloudProviderError::from_io(&other, None),
            CloudProviderError::Generic { .. }
        ));
    }

    #[test]
    fn test_into_parent_missing() {
        let path = CloudPath::new("/a");
        assert!(matches!(
            CloudProviderError::not_found(&path).into_parent_missing(),
            CloudProviderError::ParentMissing { .. }
        ));
        assert!(CloudProviderError::already_exists(&path)
            .into_parent_missing()
            .is_already_exists());
    }

    #[test]
    fn test_cryptor_error_becomes_generic() {
        let err: CloudProviderError = CryptorError::DecryptionFailed {
            reason: "bad tag".to_string(),
        }
        .into();
        assert!(matches!(err, CloudProviderError::Generic { .. }));
    }
}
