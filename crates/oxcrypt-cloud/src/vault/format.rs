//! Vault format versions and their on-storage layout conventions.
//!
//! Formats 6 and 7 share the directory scheme (`d/XX/YYYY`) but differ in how
//! item types are encoded, how names are encoded and how over-long names are
//! shortened. Everything version-specific is answered by [`VaultFormat`].

use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use data_encoding::BASE32;
use serde::{Deserialize, Serialize};

use crate::crypto::{Cryptor, NameEncoding};
use crate::error::CloudProviderError;

/// Directory holding all ciphertext directories.
pub const DATA_DIR: &str = "d";
/// Directory holding the format-6 name mapping files.
pub const METADATA_DIR: &str = "m";

/// Format 6 prefix of a folder entry (a file holding the folder's dir ID).
pub const FOLDER_PREFIX: &str = "0";
/// Format 6 prefix of a symlink entry.
pub const SYMLINK_PREFIX: &str = "1S";

/// Format 7 suffix of every regular ciphertext name.
pub const CIPHERTEXT_SUFFIX: &str = ".c9r";
/// Format 7 id-marker file inside a folder entry.
pub const DIR_MARKER: &str = "dir.c9r";
/// Format 7 payload file inside a shortened file entry.
pub const CONTENTS_FILE: &str = "contents.c9r";
/// Format 7 payload file inside a symlink entry.
pub const SYMLINK_MARKER: &str = "symlink.c9r";
/// Format 7 mapping file inside a shortened entry.
pub const NAME_FILE: &str = "name.c9s";

/// Supported vault formats.
///
/// Serializes as its version number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum VaultFormat {
    /// Format 6: base32 names, type prefixes, `.lng` shortening.
    Format6,
    /// Format 7: base64url `.c9r` names, folder entries, `.c9s` shortening.
    Format7,
}

impl VaultFormat {
    #[inline]
    pub fn version(self) -> u32 {
        match self {
            VaultFormat::Format6 => 6,
            VaultFormat::Format7 => 7,
        }
    }

    /// Longest item name (in characters) stored without shortening.
    pub fn default_shortening_threshold(self) -> usize {
        match self {
            VaultFormat::Format6 => 129,
            VaultFormat::Format7 => 220,
        }
    }

    /// Suffix of a shortened item name.
    pub fn shortened_suffix(self) -> &'static str {
        match self {
            VaultFormat::Format6 => ".lng",
            VaultFormat::Format7 => ".c9s",
        }
    }

    pub fn name_encoding(self) -> NameEncoding {
        match self {
            VaultFormat::Format6 => NameEncoding::Base32,
            VaultFormat::Format7 => NameEncoding::Base64Url,
        }
    }

    #[inline]
    pub fn is_shortened(self, name: &str) -> bool {
        name.ends_with(self.shortened_suffix())
    }

    /// Encode a SHA-1 digest the way this format names shortened items.
    pub(crate) fn encode_digest(self, digest: &[u8]) -> String {
        match self {
            VaultFormat::Format6 => BASE32.encode(digest),
            VaultFormat::Format7 => URL_SAFE.encode(digest),
        }
    }
}

impl TryFrom<u32> for VaultFormat {
    type Error = CloudProviderError;

    fn try_from(version: u32) -> Result<Self, Self::Error> {
        match version {
            6 => Ok(VaultFormat::Format6),
            7 => Ok(VaultFormat::Format7),
            other => Err(CloudProviderError::generic(
                format!("Unsupported vault format {other}"),
                Default::default(),
            )),
        }
    }
}

impl From<VaultFormat> for u32 {
    fn from(format: VaultFormat) -> Self {
        format.version()
    }
}

impl std::fmt::Display for VaultFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "format {}", self.version())
    }
}

/// Fail with `VersionMismatch` unless `cryptor` was unlocked for `format`.
pub fn ensure_compatible(format: VaultFormat, cryptor: &dyn Cryptor) -> Result<(), CloudProviderError> {
    let actual = cryptor.key_format_version();
    if actual == format.version() {
        Ok(())
    } else {
        Err(CloudProviderError::VersionMismatch {
            expected: format.version(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestCryptor;

    #[test]
    fn test_format_parameters() {
        assert_eq!(VaultFormat::Format6.default_shortening_threshold(), 129);
        assert_eq!(VaultFormat::Format7.default_shortening_threshold(), 220);
        assert!(VaultFormat::Format6.is_shortened("ABC.lng"));
        assert!(!VaultFormat::Format6.is_shortened("ABC.c9s"));
        assert!(VaultFormat::Format7.is_shortened("abc=.c9s"));
        assert_eq!(VaultFormat::Format7.name_encoding(), NameEncoding::Base64Url);
    }

    #[test]
    fn test_digest_encoding_is_padded() {
        // 20-byte SHA-1 digests: 32 base32 chars, 28 base64 chars with one '='
        let digest = [0xffu8; 20];
        assert_eq!(VaultFormat::Format6.encode_digest(&digest).len(), 32);
        let b64 = VaultFormat::Format7.encode_digest(&digest);
        assert_eq!(b64.len(), 28);
        assert!(b64.ends_with('='));
        assert!(!b64.contains('/'));
    }

    #[test]
    fn test_version_roundtrip() {
        assert_eq!(VaultFormat::try_from(6).unwrap(), VaultFormat::Format6);
        assert_eq!(u32::from(VaultFormat::Format7), 7);
        assert!(VaultFormat::try_from(8).is_err());
        assert_eq!(serde_json::to_string(&VaultFormat::Format7).unwrap(), "7");
    }

    #[test]
    fn test_ensure_compatible() {
        assert!(ensure_compatible(VaultFormat::Format7, &TestCryptor::new(7)).is_ok());
        let err = ensure_compatible(VaultFormat::Format6, &TestCryptor::new(7)).unwrap_err();
        assert_eq!(
            err,
            CloudProviderError::VersionMismatch {
                expected: 6,
                actual: 7
            }
        );
    }
}
