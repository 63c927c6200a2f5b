//! Configuration sources
//!
//! A source supplies the current user overrides and notifies subscribers when
//! they change. [`Settings`](super::Settings) subscribes at construction and
//! drops its cache on every notification.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::SettingValue;

/// Setting name → override value
pub type Overrides = HashMap<String, SettingValue>;

/// Callback fired after a source's overrides change
///
/// Returning `false` unsubscribes it. Listeners run under the registry lock
/// and must not subscribe from inside the callback.
pub type ChangeListener = Box<dyn Fn() -> bool + Send + Sync>;

/// Supplier of setting overrides with change notification
pub trait ConfigSource: Send + Sync {
    /// Current overrides
    fn snapshot(&self) -> Arc<Overrides>;

    /// Register `listener` to run after every change until it returns `false`
    fn subscribe(&self, listener: ChangeListener);
}

/// Registered change listeners
#[derive(Default)]
pub(crate) struct Listeners {
    inner: RwLock<Vec<ChangeListener>>,
}

impl Listeners {
    pub(crate) fn push(&self, listener: ChangeListener) {
        self.inner.write().push(listener);
    }

    pub(crate) fn notify(&self) {
        let mut listeners = self.inner.write();
        debug!(listeners = listeners.len(), "Configuration changed, notifying");
        listeners.retain(|listener| listener());
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.read().len()
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.len())
            .finish()
    }
}

/// Programmatic overrides
///
/// Every mutation publishes a new snapshot and notifies subscribers.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::time::Duration;
/// use tokenmint::settings::{defaults, MemoryConfigSource, SettingValue, Settings};
///
/// let source = Arc::new(MemoryConfigSource::new());
/// let settings = Settings::new(source.clone());
///
/// source.set(defaults::ACCESS_TOKEN_LIFETIME, SettingValue::Lifetime(Duration::from_secs(60)));
/// assert_eq!(settings.access_token_lifetime().unwrap(), Duration::from_secs(60));
/// ```
#[derive(Debug, Default)]
pub struct MemoryConfigSource {
    overrides: RwLock<Arc<Overrides>>,
    listeners: Listeners,
}

impl MemoryConfigSource {
    /// Source with no overrides
    pub fn new() -> Self {
        Self::default()
    }

    /// Source starting from `overrides`
    pub fn with_overrides(overrides: Overrides) -> Self {
        Self {
            overrides: RwLock::new(Arc::new(overrides)),
            listeners: Listeners::default(),
        }
    }

    /// Override `key`
    pub fn set(&self, key: impl Into<String>, value: SettingValue) {
        self.update(|overrides| {
            overrides.insert(key.into(), value);
        });
    }

    /// Drop the override for `key`, falling back to its default
    pub fn remove(&self, key: &str) {
        self.update(|overrides| {
            overrides.remove(key);
        });
    }

    /// Replace every override at once
    pub fn replace(&self, overrides: Overrides) {
        self.update(|current| *current = overrides);
    }

    /// Drop every override
    pub fn clear(&self) {
        self.update(HashMap::clear);
    }

    fn update(&self, mutate: impl FnOnce(&mut Overrides)) {
        {
            let mut guard = self.overrides.write();
            let mut next = Overrides::clone(&guard);
            mutate(&mut next);
            *guard = Arc::new(next);
        }
        // Outside the lock: listeners call back into snapshot().
        self.listeners.notify();
    }
}

impl ConfigSource for MemoryConfigSource {
    fn snapshot(&self) -> Arc<Overrides> {
        Arc::clone(&self.overrides.read())
    }

    fn subscribe(&self, listener: ChangeListener) {
        self.listeners.push(listener);
    }
}
