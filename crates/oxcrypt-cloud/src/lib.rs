//! Cryptomator vault formats 6 and 7 on top of arbitrary cloud storage.
//!
//! The crate presents a cleartext, hierarchical [`CloudProvider`] while the
//! wrapped backend only ever sees encrypted names, encrypted content and
//! opaque directory identifiers. The decorator chain is:
//!
//! ```text
//! VaultProviderDecorator ──► ShorteningProviderDecorator ──► backend
//!   (names, ids, content)      (over-long name segments)      (any CloudProvider)
//! ```
//!
//! Every layer implements the same [`CloudProvider`] trait, so the chain
//! composes transparently. Use [`vault::open_vault`] to build it.
//!
//! The cryptographic primitives are supplied by the caller through the
//! [`Cryptor`] trait.

pub mod crypto;
pub mod error;
pub mod provider;
pub mod shortening;
pub mod vault;

/// In-memory backend and a deterministic cryptor for tests.
///
/// Only built with the `testing` feature. Nothing in this module is suitable
/// for protecting real data.
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use crypto::{Cryptor, CryptorError, NameEncoding};
pub use error::{CloudOpContext, CloudProviderError};
pub use provider::{
    fetch_all_items, CloudItemList, CloudItemMetadata, CloudItemType, CloudProvider, LocalBackend,
};
pub use shortening::{NameShorteningCache, ShorteningProviderDecorator};
pub use vault::{
    open_vault, CloudPath, DirId, DirectoryIdCache, VaultFormat, VaultProviderConfig,
    VaultProviderDecorator,
};
