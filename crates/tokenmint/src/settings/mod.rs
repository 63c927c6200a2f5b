//! Settings resolution
//!
//! [`Settings`] resolves each recognized setting to the user override if one is
//! present, else the hard-coded default, and memoizes the result. The set of
//! recognized names is closed: asking for anything else fails with
//! [`TokenError::UnknownSetting`] instead of silently yielding nothing.
//!
//! The cache is dropped in bulk by [`Settings::reload`], which runs
//! automatically whenever the underlying [`ConfigSource`] reports a change.

pub mod defaults;
pub mod file;
pub mod source;

pub use file::FileConfigSource;
pub use source::{ChangeListener, ConfigSource, MemoryConfigSource, Overrides};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::claims::ClaimMap;
use crate::codec::TokenKind;
use crate::encoder::ClaimEncoder;
use crate::error::{Result, TokenError};

/// A resolved setting value
#[derive(Clone)]
pub enum SettingValue {
    /// Text (paths, names, cookie attributes)
    Text(String),
    /// Boolean flag
    Flag(bool),
    /// Token lifetime
    Lifetime(Duration),
    /// Claim → attribute configuration
    ClaimMap(ClaimMap),
    /// Claim encoder hook
    Encoder(Arc<dyn ClaimEncoder>),
}

impl SettingValue {
    /// Shorthand for [`SettingValue::Text`]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }
}

impl fmt::Debug for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Self::Flag(b) => f.debug_tuple("Flag").field(b).finish(),
            Self::Lifetime(d) => f.debug_tuple("Lifetime").field(d).finish(),
            Self::ClaimMap(m) => f.debug_tuple("ClaimMap").field(m).finish(),
            Self::Encoder(e) => f.debug_tuple("Encoder").field(e).finish(),
        }
    }
}

/// Refresh-cookie attributes handed untouched to the web layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshCookieSettings {
    /// Cookie name
    pub name: String,
    /// `Secure` attribute
    pub secure: bool,
    /// `HttpOnly` attribute
    pub http_only: bool,
    /// `SameSite` attribute
    pub same_site: String,
    /// `Path` attribute
    pub path: String,
}

#[derive(Default)]
struct CacheState {
    /// Bumped by every reload; fills computed under an older generation are dropped
    generation: u64,
    overrides: Option<Arc<Overrides>>,
    values: HashMap<&'static str, SettingValue>,
}

/// Cached, reloadable view over defaults and a [`ConfigSource`]
///
/// Construct it once and share the `Arc` with every component that needs
/// configuration.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use tokenmint::settings::Settings;
///
/// let settings = Settings::with_defaults();
/// assert_eq!(settings.access_token_lifetime().unwrap(), Duration::from_secs(15 * 60));
/// assert!(settings.get("JWT_TYPO").is_err());
/// ```
pub struct Settings {
    source: Arc<dyn ConfigSource>,
    state: RwLock<CacheState>,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Settings")
            .field("generation", &state.generation)
            .field("cached", &state.values.len())
            .finish_non_exhaustive()
    }
}

impl Settings {
    /// Settings over `source`, reloading automatically when it changes
    pub fn new(source: Arc<dyn ConfigSource>) -> Arc<Self> {
        let settings = Arc::new(Self {
            source,
            state: RwLock::new(CacheState::default()),
        });

        let weak = Arc::downgrade(&settings);
        settings.source.subscribe(Box::new(move || match weak.upgrade() {
            Some(settings) => {
                settings.reload();
                true
            }
            None => false,
        }));
        settings
    }

    /// Settings with no overrides
    pub fn with_defaults() -> Arc<Self> {
        Self::new(Arc::new(MemoryConfigSource::new()))
    }

    /// Resolve `key`
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::UnknownSetting`] if `key` is not a recognized name.
    pub fn get(&self, key: &str) -> Result<SettingValue> {
        let key = defaults::canonical_key(key)
            .ok_or_else(|| TokenError::UnknownSetting(key.to_string()))?;

        let (generation, overrides) = {
            let state = self.state.read();
            if let Some(value) = state.values.get(key) {
                return Ok(value.clone());
            }
            (state.generation, state.overrides.clone())
        };

        let overrides = overrides.unwrap_or_else(|| self.source.snapshot());
        let value = match overrides.get(key) {
            Some(value) => value.clone(),
            None => defaults::default_value(key)
                .ok_or_else(|| TokenError::UnknownSetting(key.to_string()))?,
        };

        let mut state = self.state.write();
        if state.generation == generation {
            state.overrides.get_or_insert(overrides);
            state.values.entry(key).or_insert_with(|| value.clone());
        } else {
            debug!(setting = key, "Settings reloaded during resolution, not caching");
        }
        Ok(value)
    }

    /// Drop every cached value and the cached override snapshot
    ///
    /// The next [`get`](Self::get) re-reads the configuration source.
    pub fn reload(&self) {
        let mut state = self.state.write();
        state.generation += 1;
        state.overrides = None;
        state.values.clear();
        info!(generation = state.generation, "Token settings cache cleared");
    }

    fn text(&self, key: &'static str) -> Result<String> {
        match self.get(key)? {
            SettingValue::Text(value) => Ok(value),
            _ => Err(invalid(key, "text")),
        }
    }

    fn flag(&self, key: &'static str) -> Result<bool> {
        match self.get(key)? {
            SettingValue::Flag(value) => Ok(value),
            _ => Err(invalid(key, "boolean")),
        }
    }

    fn lifetime(&self, key: &'static str) -> Result<Duration> {
        match self.get(key)? {
            SettingValue::Lifetime(value) if value >= Duration::from_secs(1) => Ok(value),
            _ => Err(invalid(key, "duration of at least one second")),
        }
    }

    /// Lifetime of access tokens
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InvalidSetting`] if the override is not a duration of
    /// at least one second.
    pub fn access_token_lifetime(&self) -> Result<Duration> {
        self.lifetime(defaults::ACCESS_TOKEN_LIFETIME)
    }

    /// Lifetime of refresh tokens
    ///
    /// # Errors
    ///
    /// Same as [`access_token_lifetime`](Self::access_token_lifetime).
    pub fn refresh_token_lifetime(&self) -> Result<Duration> {
        self.lifetime(defaults::REFRESH_TOKEN_LIFETIME)
    }

    /// Lifetime of tokens of `kind`
    ///
    /// # Errors
    ///
    /// Same as [`access_token_lifetime`](Self::access_token_lifetime).
    pub fn lifetime_for(&self, kind: TokenKind) -> Result<Duration> {
        match kind {
            TokenKind::Access => self.access_token_lifetime(),
            TokenKind::Refresh => self.refresh_token_lifetime(),
        }
    }

    /// Storage root of the private key
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InvalidSetting`] if the override is not text.
    pub fn private_key_storage(&self) -> Result<String> {
        self.text(defaults::PRIVATE_KEY_STORAGE)
    }

    /// Storage root of the public key
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InvalidSetting`] if the override is not text.
    pub fn public_key_storage(&self) -> Result<String> {
        self.text(defaults::PUBLIC_KEY_STORAGE)
    }

    /// Name of the private key within its storage
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InvalidSetting`] if the override is not text.
    pub fn private_key_path(&self) -> Result<String> {
        self.text(defaults::PRIVATE_KEY_PATH)
    }

    /// Name of the public key within its storage
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InvalidSetting`] if the override is not text.
    pub fn public_key_path(&self) -> Result<String> {
        self.text(defaults::PUBLIC_KEY_PATH)
    }

    /// Credential-store field matched against the sign-in username
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InvalidSetting`] if the override is not text.
    pub fn username_field(&self) -> Result<String> {
        self.text(defaults::USERNAME_FIELD)
    }

    /// Claim → attribute map
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InvalidSetting`] if the override is not a claim map.
    pub fn claim_map(&self) -> Result<ClaimMap> {
        match self.get(defaults::TOKEN_CLAIM_USER_ATTRIBUTE_MAP)? {
            SettingValue::ClaimMap(map) => Ok(map),
            _ => Err(invalid(defaults::TOKEN_CLAIM_USER_ATTRIBUTE_MAP, "claim map")),
        }
    }

    /// Claim encoder hook
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InvalidSetting`] if the override is not an encoder.
    pub fn claim_encoder(&self) -> Result<Arc<dyn ClaimEncoder>> {
        match self.get(defaults::TOKEN_USER_ENCODER)? {
            SettingValue::Encoder(encoder) => Ok(encoder),
            _ => Err(invalid(defaults::TOKEN_USER_ENCODER, "claim encoder")),
        }
    }

    /// Refresh-cookie attributes
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InvalidSetting`] if any cookie override has the wrong type.
    pub fn refresh_cookie(&self) -> Result<RefreshCookieSettings> {
        Ok(RefreshCookieSettings {
            name: self.text(defaults::REFRESH_COOKIE_NAME)?,
            secure: self.flag(defaults::REFRESH_COOKIE_SECURE)?,
            http_only: self.flag(defaults::REFRESH_COOKIE_HTTP_ONLY)?,
            same_site: self.text(defaults::REFRESH_COOKIE_SAME_SITE_POLICY)?,
            path: self.text(defaults::REFRESH_COOKIE_PATH)?,
        })
    }
}

fn invalid(key: &str, expected: &'static str) -> TokenError {
    TokenError::InvalidSetting {
        key: key.to_string(),
        expected,
    }
}
