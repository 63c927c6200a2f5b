//! Key material: storage, caching provider, generation and rotation
//!
//! The process holds one active RSA-2048 keypair. [`KeyMaterialProvider`] reads
//! it lazily from a [`KeyStorage`] and caches it; [`rotate_keypair`] writes a
//! fresh pair and invalidates the cache in one step.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tokenmint::keys::{rotate_keypair, KeyMaterialProvider, MemoryKeyStorage};
//! use tokenmint::settings::Settings;
//!
//! let storage = Arc::new(MemoryKeyStorage::new());
//! let provider = KeyMaterialProvider::new(Settings::with_defaults(), storage.clone(), storage);
//!
//! rotate_keypair(&provider)?;
//! assert!(provider.get_public_key()?.pem().starts_with(b"-----BEGIN PUBLIC KEY-----"));
//! # Ok::<(), tokenmint::TokenError>(())
//! ```

mod generate;
mod provider;
mod storage;

pub use generate::{KEY_BITS, KeyPairPem, generate_keypair, rotate_keypair};
pub use provider::{KeyMaterialProvider, PrivateKeyMaterial, PublicKeyMaterial};
pub use storage::{
    ConfiguredDiskKeyStorage, KeyRole, KeyStorage, LocalDiskKeyStorage, MemoryKeyStorage,
};

/// Keypair shared by every unit test in the crate; RSA generation is slow
#[cfg(test)]
pub(crate) fn test_keypair() -> &'static KeyPairPem {
    use std::sync::OnceLock;

    static KEYPAIR: OnceLock<KeyPairPem> = OnceLock::new();
    KEYPAIR.get_or_init(|| generate_keypair().expect("test keypair generation"))
}
