//! Name shortening for backends with path-segment length limits.

mod cache;
mod decorator;

pub use cache::{NameShorteningCache, ShortenedEntry, ShortenedPath};
pub use decorator::ShorteningProviderDecorator;
