mod cryptor;
mod memory;

pub use cryptor::TestCryptor;
pub use memory::MemoryBackend;
