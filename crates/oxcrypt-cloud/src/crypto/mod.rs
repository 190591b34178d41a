//! The keyed cryptographic engine consumed by the vault decorator.
//!
//! Implementations wrap an unlocked masterkey and provide the filename cipher,
//! the directory-id hash and the content cipher of a Cryptomator vault. This
//! crate never implements those algorithms itself; it only decides *what* to
//! encrypt and *where* the result is stored.

use std::path::Path;

use thiserror::Error;

use crate::vault::path::DirId;

/// Text encoding of encrypted filenames.
///
/// Vault format 6 stores names in base32, format 7 in padded base64url.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameEncoding {
    Base32,
    Base64Url,
}

/// Errors reported by a [`Cryptor`].
///
/// # Security Classification
///
/// `DecryptionFailed` indicates an **integrity violation** when the cipher is
/// authenticated: tampered ciphertext, a wrong key, or a name moved into a
/// directory with a different ID. During listings the vault decorator treats
/// such names as foreign items instead of failing.
#[derive(Error, Debug)]
pub enum CryptorError {
    #[error("Decryption failed: {reason}")]
    DecryptionFailed { reason: String },

    #[error("Encryption failed: {reason}")]
    EncryptionFailed { reason: String },

    #[error("Invalid ciphertext size {size}")]
    InvalidCiphertextSize { size: u64 },

    #[error("IO error during content transformation: {0}")]
    Io(#[from] std::io::Error),
}

/// Keyed vault cryptor.
///
/// All methods are synchronous and CPU-bound. The decorator calls the content
/// methods from [`tokio::task::spawn_blocking`].
pub trait Cryptor: Send + Sync {
    /// Version of the masterkey format this cryptor was unlocked from.
    ///
    /// Must equal the vault format the cryptor is used with.
    fn key_format_version(&self) -> u32;

    /// Encrypt a cleartext filename, using `dir_id` as associated data.
    ///
    /// Returns the encoded ciphertext without any vault-format prefix or suffix.
    fn encrypt_file_name(
        &self,
        name: &str,
        dir_id: &DirId,
        encoding: NameEncoding,
    ) -> Result<String, CryptorError>;

    /// Reverse of [`encrypt_file_name`](Self::encrypt_file_name).
    fn decrypt_file_name(
        &self,
        ciphertext_name: &str,
        dir_id: &DirId,
        encoding: NameEncoding,
    ) -> Result<String, CryptorError>;

    /// Hash a directory ID into the digest naming its ciphertext directory.
    ///
    /// The digest must be at least three characters long; the vault stores
    /// the directory at `d/<digest[0..2]>/<digest[2..]>`.
    fn encrypt_dir_id(&self, dir_id: &DirId) -> Result<String, CryptorError>;

    /// Encrypt the cleartext file at `source` into `destination`.
    fn encrypt_content(&self, source: &Path, destination: &Path) -> Result<(), CryptorError>;

    /// Decrypt the ciphertext file at `source` into `destination`.
    fn decrypt_content(&self, source: &Path, destination: &Path) -> Result<(), CryptorError>;

    /// Cleartext size of a file whose ciphertext is `ciphertext_size` bytes.
    fn calculate_cleartext_size(&self, ciphertext_size: u64) -> Result<u64, CryptorError>;
}
