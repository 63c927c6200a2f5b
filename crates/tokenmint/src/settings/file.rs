//! File and environment backed configuration source

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use parking_lot::RwLock;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use tracing::info;

use super::defaults;
use super::source::{ChangeListener, ConfigSource, Listeners, Overrides};
use super::SettingValue;
use crate::claims::ClaimMap;
use crate::error::{Result, TokenError};

/// Default prefix for environment overrides (`TOKENMINT_JWT_ACCESS_TOKEN_LIFETIME=60`)
pub const DEFAULT_ENV_PREFIX: &str = "TOKENMINT";

/// On-disk layout: lower-cased setting names, lifetimes in whole seconds
#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    jwt_private_key_storage: Option<String>,
    jwt_public_key_storage: Option<String>,
    jwt_private_key_path: Option<String>,
    jwt_public_key_path: Option<String>,
    jwt_refresh_cookie_name: Option<String>,
    jwt_refresh_token_lifetime: Option<u64>,
    jwt_access_token_lifetime: Option<u64>,
    web_refresh_cookie_secure: Option<bool>,
    web_refresh_cookie_http_only: Option<bool>,
    web_refresh_cookie_same_site_policy: Option<String>,
    web_refresh_cookie_path: Option<String>,
    username_field: Option<String>,
    #[serde(default, deserialize_with = "ordered_claim_map")]
    token_claim_user_attribute_map: Option<Vec<(String, String)>>,
}

/// Claim table entries in the order the file lists them
fn ordered_claim_map<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Vec<(String, String)>>, D::Error>
where
    D: Deserializer<'de>,
{
    struct EntriesVisitor;

    impl<'de> Visitor<'de> for EntriesVisitor {
        type Value = Vec<(String, String)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a table of claim name to attribute name")
        }

        fn visit_map<M: MapAccess<'de>>(
            self,
            mut map: M,
        ) -> std::result::Result<Self::Value, M::Error> {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some(entry) = map.next_entry::<String, String>()? {
                entries.push(entry);
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(EntriesVisitor).map(Some)
}

impl FileSettings {
    fn into_overrides(self) -> Overrides {
        let mut overrides = Overrides::new();
        let mut text = |key: &str, value: Option<String>| {
            if let Some(value) = value {
                overrides.insert(key.to_string(), SettingValue::Text(value));
            }
        };
        text(defaults::PRIVATE_KEY_STORAGE, self.jwt_private_key_storage);
        text(defaults::PUBLIC_KEY_STORAGE, self.jwt_public_key_storage);
        text(defaults::PRIVATE_KEY_PATH, self.jwt_private_key_path);
        text(defaults::PUBLIC_KEY_PATH, self.jwt_public_key_path);
        text(defaults::REFRESH_COOKIE_NAME, self.jwt_refresh_cookie_name);
        text(
            defaults::REFRESH_COOKIE_SAME_SITE_POLICY,
            self.web_refresh_cookie_same_site_policy,
        );
        text(defaults::REFRESH_COOKIE_PATH, self.web_refresh_cookie_path);
        text(defaults::USERNAME_FIELD, self.username_field);

        let lifetimes = [
            (defaults::REFRESH_TOKEN_LIFETIME, self.jwt_refresh_token_lifetime),
            (defaults::ACCESS_TOKEN_LIFETIME, self.jwt_access_token_lifetime),
        ];
        for (key, secs) in lifetimes {
            if let Some(secs) = secs {
                overrides.insert(
                    key.to_string(),
                    SettingValue::Lifetime(Duration::from_secs(secs)),
                );
            }
        }

        let flags = [
            (defaults::REFRESH_COOKIE_SECURE, self.web_refresh_cookie_secure),
            (defaults::REFRESH_COOKIE_HTTP_ONLY, self.web_refresh_cookie_http_only),
        ];
        for (key, flag) in flags {
            if let Some(flag) = flag {
                overrides.insert(key.to_string(), SettingValue::Flag(flag));
            }
        }

        if let Some(map) = self.token_claim_user_attribute_map {
            overrides.insert(
                defaults::TOKEN_CLAIM_USER_ATTRIBUTE_MAP.to_string(),
                SettingValue::ClaimMap(map.into_iter().collect::<ClaimMap>()),
            );
        }
        overrides
    }
}

/// Overrides read from a TOML, YAML or JSON file, with environment variables on top
///
/// Environment variables use the prefix given at load time and `__` as the
/// nesting separator, e.g. `TOKENMINT_TOKEN_CLAIM_USER_ATTRIBUTE_MAP__EMAIL=email`.
///
/// ```toml
/// jwt_access_token_lifetime = 600
/// jwt_private_key_storage = "/etc/myapp/keys"
///
/// [token_claim_user_attribute_map]
/// user_id = "id"
/// email = "email"
/// ```
///
/// The encoder hook cannot be expressed in a file; it keeps its default
/// unless overridden programmatically.
#[derive(Debug)]
pub struct FileConfigSource {
    path: PathBuf,
    env_prefix: String,
    overrides: RwLock<Arc<Overrides>>,
    listeners: Listeners,
}

impl FileConfigSource {
    /// Load `path` with the [`DEFAULT_ENV_PREFIX`] environment prefix
    ///
    /// # Errors
    ///
    /// See [`FileConfigSource::load_with_prefix`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with_prefix(path, DEFAULT_ENV_PREFIX)
    }

    /// Load `path`, letting `{env_prefix}_*` variables override file values
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Config`] if the file is missing, has an unsupported
    /// extension, or contains values of the wrong type.
    pub fn load_with_prefix(path: impl AsRef<Path>, env_prefix: &str) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let overrides = read_overrides(&path, env_prefix)?;
        info!(
            path = %path.display(),
            overrides = overrides.len(),
            "Loaded token settings from file"
        );
        Ok(Self {
            path,
            env_prefix: env_prefix.to_string(),
            overrides: RwLock::new(Arc::new(overrides)),
            listeners: Listeners::default(),
        })
    }

    /// File this source reads
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file and environment, then notify subscribers
    ///
    /// On error the previous overrides stay in effect and nobody is notified.
    ///
    /// # Errors
    ///
    /// Same as [`FileConfigSource::load_with_prefix`].
    pub fn reload_from_disk(&self) -> Result<()> {
        let overrides = read_overrides(&self.path, &self.env_prefix)?;
        *self.overrides.write() = Arc::new(overrides);
        info!(path = %self.path.display(), "Reloaded token settings from file");
        self.listeners.notify();
        Ok(())
    }
}

impl ConfigSource for FileConfigSource {
    fn snapshot(&self) -> Arc<Overrides> {
        Arc::clone(&self.overrides.read())
    }

    fn subscribe(&self, listener: ChangeListener) {
        self.listeners.push(listener);
    }
}

fn read_overrides(path: &Path, env_prefix: &str) -> Result<Overrides> {
    let format = match path.extension().and_then(|s| s.to_str()) {
        Some("toml") => FileFormat::Toml,
        Some("yaml" | "yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        _ => {
            return Err(TokenError::Config(config::ConfigError::Message(format!(
                "unsupported configuration file format: {}",
                path.display()
            ))));
        }
    };

    let name = path.to_str().ok_or_else(|| {
        TokenError::Config(config::ConfigError::Message(format!(
            "configuration path is not valid UTF-8: {}",
            path.display()
        )))
    })?;

    let config = Config::builder()
        .add_source(File::new(name, format))
        .add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let file: FileSettings = config.try_deserialize()?;
    Ok(file.into_overrides())
}
