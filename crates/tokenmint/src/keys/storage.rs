//! Key storage backends

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{Result, TokenError};
use crate::settings::Settings;

/// Named byte storage for key files
///
/// `save` must overwrite an existing entry: rotation always replaces keys
/// under the same name.
pub trait KeyStorage: Send + Sync + std::fmt::Debug {
    /// Store `bytes` under `name`, returning the name it was stored as
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Storage`] if the backend cannot write.
    fn save(&self, name: &str, bytes: &[u8]) -> Result<String>;

    /// Read the bytes stored under `name`
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::KeyUnavailable`] if nothing is stored under `name`,
    /// [`TokenError::Storage`] for any other read failure.
    fn open(&self, name: &str) -> Result<Vec<u8>>;
}

/// Files under a root directory
#[derive(Debug, Clone)]
pub struct LocalDiskKeyStorage {
    root: PathBuf,
}

impl LocalDiskKeyStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl KeyStorage for LocalDiskKeyStorage {
    fn save(&self, name: &str, bytes: &[u8]) -> Result<String> {
        let path = self.resolve(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        debug!(path = %path.display(), bytes = bytes.len(), "Wrote key file");
        Ok(name.to_string())
    }

    fn open(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.resolve(name);
        fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => TokenError::KeyUnavailable {
                path: path.display().to_string(),
            },
            _ => TokenError::Storage(e),
        })
    }
}

/// Which key storage setting a [`ConfiguredDiskKeyStorage`] follows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    /// `JWT_PRIVATE_KEY_STORAGE`
    Private,
    /// `JWT_PUBLIC_KEY_STORAGE`
    Public,
}

/// Files under the directory currently named by the storage setting
///
/// The root is resolved from [`Settings`] on every `save` and `open`, so a
/// configuration change moves later reads and writes to the new directory.
pub struct ConfiguredDiskKeyStorage {
    settings: Arc<Settings>,
    role: KeyRole,
}

impl ConfiguredDiskKeyStorage {
    pub fn new(settings: Arc<Settings>, role: KeyRole) -> Self {
        Self { settings, role }
    }

    pub fn role(&self) -> KeyRole {
        self.role
    }

    /// Disk storage over the root configured right now
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InvalidSetting`] if the storage setting is not text.
    pub fn current(&self) -> Result<LocalDiskKeyStorage> {
        let root = match self.role {
            KeyRole::Private => self.settings.private_key_storage()?,
            KeyRole::Public => self.settings.public_key_storage()?,
        };
        Ok(LocalDiskKeyStorage::new(root))
    }
}

impl std::fmt::Debug for ConfiguredDiskKeyStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfiguredDiskKeyStorage")
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

impl KeyStorage for ConfiguredDiskKeyStorage {
    fn save(&self, name: &str, bytes: &[u8]) -> Result<String> {
        self.current()?.save(name, bytes)
    }

    fn open(&self, name: &str) -> Result<Vec<u8>> {
        self.current()?.open(name)
    }
}

/// In-process storage, for tests and embedders that keep keys elsewhere
#[derive(Debug, Default)]
pub struct MemoryKeyStorage {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryKeyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an entry exists under `name`
    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }
}

impl KeyStorage for MemoryKeyStorage {
    fn save(&self, name: &str, bytes: &[u8]) -> Result<String> {
        self.entries.write().insert(name.to_string(), bytes.to_vec());
        Ok(name.to_string())
    }

    fn open(&self, name: &str) -> Result<Vec<u8>> {
        self.entries
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| TokenError::KeyUnavailable {
                path: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_save_creates_directories_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalDiskKeyStorage::new(dir.path());

        let stored = storage.save("nested/keys/jwt-signing.pem", b"first").unwrap();
        assert_eq!(stored, "nested/keys/jwt-signing.pem");
        storage.save("nested/keys/jwt-signing.pem", b"second").unwrap();

        assert_eq!(storage.open("nested/keys/jwt-signing.pem").unwrap(), b"second");
    }

    #[test]
    fn test_disk_missing_file_is_key_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalDiskKeyStorage::new(dir.path());

        let err = storage.open("jwt-signing.pem").unwrap_err();
        assert!(matches!(err, TokenError::KeyUnavailable { ref path } if path.ends_with("jwt-signing.pem")));
    }

    #[test]
    fn test_configured_storage_follows_setting_changes() {
        use crate::settings::{MemoryConfigSource, SettingValue, defaults};

        let dir = tempfile::tempdir().unwrap();
        let old_root = dir.path().join("old");
        let new_root = dir.path().join("new");
        let source = Arc::new(MemoryConfigSource::new());
        source.set(
            defaults::PUBLIC_KEY_STORAGE,
            SettingValue::text(old_root.to_string_lossy()),
        );
        let storage = ConfiguredDiskKeyStorage::new(Settings::new(source.clone()), KeyRole::Public);
        storage.save("jwt-signing.pub", b"old").unwrap();

        source.set(
            defaults::PUBLIC_KEY_STORAGE,
            SettingValue::text(new_root.to_string_lossy()),
        );

        assert!(matches!(
            storage.open("jwt-signing.pub"),
            Err(TokenError::KeyUnavailable { .. })
        ));
        storage.save("jwt-signing.pub", b"new").unwrap();
        assert_eq!(fs::read(new_root.join("jwt-signing.pub")).unwrap(), b"new");
        assert_eq!(fs::read(old_root.join("jwt-signing.pub")).unwrap(), b"old");
    }

    #[test]
    fn test_configured_storage_rejects_non_text_root() {
        use crate::settings::{MemoryConfigSource, SettingValue, defaults};

        let source = Arc::new(MemoryConfigSource::new());
        source.set(defaults::PRIVATE_KEY_STORAGE, SettingValue::Flag(true));
        let storage = ConfiguredDiskKeyStorage::new(Settings::new(source), KeyRole::Private);

        assert!(matches!(
            storage.save("jwt-signing.pem", b"key"),
            Err(TokenError::InvalidSetting { .. })
        ));
    }

    #[test]
    fn test_memory_storage_round_trip() {
        let storage = MemoryKeyStorage::new();
        assert!(matches!(
            storage.open("jwt-signing.pub"),
            Err(TokenError::KeyUnavailable { .. })
        ));

        storage.save("jwt-signing.pub", b"old").unwrap();
        storage.save("jwt-signing.pub", b"new").unwrap();

        assert!(storage.contains("jwt-signing.pub"));
        assert_eq!(storage.open("jwt-signing.pub").unwrap(), b"new");
    }
}
