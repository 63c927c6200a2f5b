//! Cached signing and verification keys

use std::fmt;
use std::sync::Arc;

use jsonwebtoken::{DecodingKey, EncodingKey};
use parking_lot::RwLock;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::storage::{ConfiguredDiskKeyStorage, KeyRole, KeyStorage};
use crate::error::{Result, TokenError};
use crate::settings::Settings;

/// Private key bytes plus the parsed signing key
pub struct PrivateKeyMaterial {
    pem: Zeroizing<Vec<u8>>,
    key: EncodingKey,
}

impl PrivateKeyMaterial {
    /// Raw PEM bytes as read from storage
    pub fn pem(&self) -> &[u8] {
        &self.pem
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.key
    }
}

impl fmt::Debug for PrivateKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKeyMaterial")
            .field("pem", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Public key bytes plus the parsed verification key
pub struct PublicKeyMaterial {
    pem: Vec<u8>,
    key: DecodingKey,
}

impl PublicKeyMaterial {
    /// Raw PEM bytes as read from storage
    pub fn pem(&self) -> &[u8] {
        &self.pem
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }
}

impl fmt::Debug for PublicKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKeyMaterial")
            .field("pem_len", &self.pem.len())
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct KeyCache {
    /// Bumped by `invalidate`; fills read under an older generation are dropped
    generation: u64,
    private: Option<Arc<PrivateKeyMaterial>>,
    public: Option<Arc<PublicKeyMaterial>>,
}

/// Owner of the process's active keypair
///
/// Keys are read lazily from storage under the names configured in
/// [`Settings`] and cached until [`invalidate`](Self::invalidate). Concurrent
/// first access may read storage more than once; all readers end up with
/// equivalent keys.
///
/// An invalidation is visible to every call that starts after it returns: a
/// fill that began reading before the invalidation is handed to its own
/// caller but never cached.
pub struct KeyMaterialProvider {
    settings: Arc<Settings>,
    private_storage: Arc<dyn KeyStorage>,
    public_storage: Arc<dyn KeyStorage>,
    cache: RwLock<KeyCache>,
}

impl fmt::Debug for KeyMaterialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cache = self.cache.read();
        f.debug_struct("KeyMaterialProvider")
            .field("private_storage", &self.private_storage)
            .field("public_storage", &self.public_storage)
            .field("generation", &cache.generation)
            .field("private_cached", &cache.private.is_some())
            .field("public_cached", &cache.public.is_some())
            .finish()
    }
}

impl KeyMaterialProvider {
    /// Provider reading from explicit storages
    pub fn new(
        settings: Arc<Settings>,
        private_storage: Arc<dyn KeyStorage>,
        public_storage: Arc<dyn KeyStorage>,
    ) -> Self {
        Self {
            settings,
            private_storage,
            public_storage,
            cache: RwLock::new(KeyCache::default()),
        }
    }

    /// Provider over local directories named by the key storage settings
    ///
    /// The directories are re-resolved on every storage access, so they
    /// follow configuration changes.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InvalidSetting`] if a storage setting is not text.
    pub fn from_settings(settings: Arc<Settings>) -> Result<Self> {
        let private_storage = ConfiguredDiskKeyStorage::new(settings.clone(), KeyRole::Private);
        let public_storage = ConfiguredDiskKeyStorage::new(settings.clone(), KeyRole::Public);
        private_storage.current()?;
        public_storage.current()?;
        Ok(Self::new(
            settings,
            Arc::new(private_storage),
            Arc::new(public_storage),
        ))
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub fn private_storage(&self) -> &Arc<dyn KeyStorage> {
        &self.private_storage
    }

    pub fn public_storage(&self) -> &Arc<dyn KeyStorage> {
        &self.public_storage
    }

    /// Current signing key
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::KeyUnavailable`] if storage has no key at the
    /// configured path and [`TokenError::InvalidKey`] if it cannot be parsed.
    pub fn get_private_key(&self) -> Result<Arc<PrivateKeyMaterial>> {
        let generation = {
            let cache = self.cache.read();
            if let Some(key) = &cache.private {
                return Ok(Arc::clone(key));
            }
            cache.generation
        };

        let path = self.settings.private_key_path()?;
        let pem = Zeroizing::new(self.private_storage.open(&path)?);
        let key = EncodingKey::from_rsa_pem(&pem).map_err(|e| {
            warn!(path = %path, error = %e, "Private key could not be parsed");
            TokenError::InvalidKey {
                path: path.clone(),
                reason: e.to_string(),
            }
        })?;
        let material = Arc::new(PrivateKeyMaterial { pem, key });

        let mut cache = self.cache.write();
        if cache.generation == generation {
            debug!(path = %path, "Cached private key");
            Ok(Arc::clone(cache.private.get_or_insert(material)))
        } else {
            Ok(material)
        }
    }

    /// Current verification key
    ///
    /// # Errors
    ///
    /// Same as [`get_private_key`](Self::get_private_key).
    pub fn get_public_key(&self) -> Result<Arc<PublicKeyMaterial>> {
        let generation = {
            let cache = self.cache.read();
            if let Some(key) = &cache.public {
                return Ok(Arc::clone(key));
            }
            cache.generation
        };

        let path = self.settings.public_key_path()?;
        let pem = self.public_storage.open(&path)?;
        let key = DecodingKey::from_rsa_pem(&pem).map_err(|e| {
            warn!(path = %path, error = %e, "Public key could not be parsed");
            TokenError::InvalidKey {
                path: path.clone(),
                reason: e.to_string(),
            }
        })?;
        let material = Arc::new(PublicKeyMaterial { pem, key });

        let mut cache = self.cache.write();
        if cache.generation == generation {
            debug!(path = %path, "Cached public key");
            Ok(Arc::clone(cache.public.get_or_insert(material)))
        } else {
            Ok(material)
        }
    }

    /// Drop both cached keys; the next access re-reads storage
    pub fn invalidate(&self) {
        let mut cache = self.cache.write();
        cache.generation += 1;
        cache.private = None;
        cache.public = None;
        info!(generation = cache.generation, "Key material cache invalidated");
    }
}
