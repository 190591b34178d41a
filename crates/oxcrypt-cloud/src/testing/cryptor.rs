//! Deterministic, reversible cryptor for tests.
//!
//! Names are the encoded bytes of `dir_id || 0x00 || nfc(name)`, so a name
//! only "decrypts" under the directory it was encrypted for. Content is XORed
//! behind a 4-byte header. None of this is encryption.

use std::path::Path;

use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use data_encoding::BASE32;
use ring::digest;
use unicode_normalization::UnicodeNormalization;

use crate::crypto::{Cryptor, CryptorError, NameEncoding};
use crate::vault::path::DirId;

const HEADER: &[u8; 4] = b"OXC1";
const CONTENT_KEY: u8 = 0x5a;

/// Non-secure [`Cryptor`] whose output is predictable from its input.
#[derive(Debug, Clone, Copy)]
pub struct TestCryptor {
    version: u32,
}

impl TestCryptor {
    /// A cryptor reporting `version` as its masterkey format.
    pub fn new(version: u32) -> Self {
        Self { version }
    }

    /// Size of the header prepended to every content file.
    pub const HEADER_SIZE: u64 = HEADER.len() as u64;
}

impl Cryptor for TestCryptor {
    fn key_format_version(&self) -> u32 {
        self.version
    }

    fn encrypt_file_name(&self, name: &str, dir_id: &DirId, encoding: NameEncoding) -> Result<String, CryptorError> {
        let mut plain = dir_id.as_bytes().to_vec();
        plain.push(0);
        plain.extend(name.nfc().collect::<String>().into_bytes());
        Ok(match encoding {
            NameEncoding::Base32 => BASE32.encode(&plain),
            NameEncoding::Base64Url => URL_SAFE.encode(&plain),
        })
    }

    fn decrypt_file_name(
        &self,
        ciphertext_name: &str,
        dir_id: &DirId,
        encoding: NameEncoding,
    ) -> Result<String, CryptorError> {
        let decoded = match encoding {
            NameEncoding::Base32 => BASE32.decode(ciphertext_name.as_bytes()).map_err(|e| e.to_string()),
            NameEncoding::Base64Url => URL_SAFE.decode(ciphertext_name).map_err(|e| e.to_string()),
        }
        .map_err(|reason| CryptorError::DecryptionFailed { reason })?;

        let prefix_len = dir_id.as_bytes().len();
        if decoded.len() <= prefix_len
            || &decoded[..prefix_len] != dir_id.as_bytes()
            || decoded[prefix_len] != 0
        {
            return Err(CryptorError::DecryptionFailed {
                reason: "name belongs to a different directory".to_string(),
            });
        }
        String::from_utf8(decoded[prefix_len + 1..].to_vec()).map_err(|_| CryptorError::DecryptionFailed {
            reason: "name is not valid UTF-8".to_string(),
        })
    }

    fn encrypt_dir_id(&self, dir_id: &DirId) -> Result<String, CryptorError> {
        let hash = digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, dir_id.as_bytes());
        Ok(BASE32.encode(hash.as_ref()))
    }

    fn encrypt_content(&self, source: &Path, destination: &Path) -> Result<(), CryptorError> {
        let plain = std::fs::read(source)?;
        let mut out = Vec::with_capacity(plain.len() + HEADER.len());
        out.extend_from_slice(HEADER);
        out.extend(plain.iter().map(|b| b ^ CONTENT_KEY));
        std::fs::write(destination, out)?;
        Ok(())
    }

    fn decrypt_content(&self, source: &Path, destination: &Path) -> Result<(), CryptorError> {
        let cipher = std::fs::read(source)?;
        let Some(body) = cipher.strip_prefix(HEADER.as_slice()) else {
            return Err(CryptorError::DecryptionFailed {
                reason: "missing content header".to_string(),
            });
        };
        let plain: Vec<u8> = body.iter().map(|b| b ^ CONTENT_KEY).collect();
        std::fs::write(destination, plain)?;
        Ok(())
    }

    fn calculate_cleartext_size(&self, ciphertext_size: u64) -> Result<u64, CryptorError> {
        ciphertext_size
            .checked_sub(Self::HEADER_SIZE)
            .ok_or(CryptorError::InvalidCiphertextSize { size: ciphertext_size })
    }
}
