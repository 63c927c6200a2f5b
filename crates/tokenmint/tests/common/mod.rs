//! Shared fixtures for integration tests
//!
//! RSA-2048 generation takes a noticeable fraction of a second, so each test
//! binary generates one keypair and reuses it.

#![allow(dead_code)]

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value, json};
use tokenmint::keys::KeyPairPem;
use tokenmint::settings::defaults;
use tokenmint::{
    FixedClock, KeyMaterialProvider, KeyStorage, MemoryConfigSource, MemoryKeyStorage,
    SettingValue, Settings, TokenCodec, TokenService, generate_keypair,
};

/// Install a test subscriber once; `RUST_LOG=tokenmint=debug` shows crate events
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Keypair shared by every test in this binary
pub fn shared_keypair() -> &'static KeyPairPem {
    static KEYPAIR: OnceLock<KeyPairPem> = OnceLock::new();
    KEYPAIR.get_or_init(|| generate_keypair().expect("Failed to generate RSA keypair"))
}

/// 2024-01-11T12:00:01Z
pub fn scenario_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 11, 12, 0, 1).unwrap()
}

/// `{id: "1", username: "bebe"}`
pub fn bebe() -> Map<String, Value> {
    let mut user = Map::new();
    user.insert("id".into(), json!("1"));
    user.insert("username".into(), json!("bebe"));
    user
}

/// A fully wired service over in-memory keys, overrides and a frozen clock
pub struct Harness {
    pub source: Arc<MemoryConfigSource>,
    pub settings: Arc<Settings>,
    pub storage: Arc<MemoryKeyStorage>,
    pub keys: Arc<KeyMaterialProvider>,
    pub clock: Arc<FixedClock>,
    pub service: TokenService,
}

impl Harness {
    /// Harness with the shared keypair installed and default settings
    pub fn new() -> Self {
        init_tracing();

        let source = Arc::new(MemoryConfigSource::new());
        let settings = Settings::new(source.clone());
        let storage = Arc::new(MemoryKeyStorage::new());
        let keypair = shared_keypair();
        storage
            .save("jwt-signing.pem", keypair.private_pem.as_bytes())
            .unwrap();
        storage
            .save("jwt-signing.pub", keypair.public_pem.as_bytes())
            .unwrap();

        let keys = Arc::new(KeyMaterialProvider::new(
            settings.clone(),
            storage.clone(),
            storage.clone(),
        ));
        let clock = Arc::new(FixedClock::new(scenario_start()));
        let codec = TokenCodec::new(keys.clone(), settings.clone()).with_clock(clock.clone());

        Self {
            source,
            settings,
            storage,
            keys,
            clock,
            service: TokenService::new(codec),
        }
    }

    /// The scenario lifetimes: 15 minutes access, 30 days refresh
    pub fn with_scenario_lifetimes(self) -> Self {
        self.source.set(
            defaults::ACCESS_TOKEN_LIFETIME,
            SettingValue::Lifetime(Duration::from_secs(15 * 60)),
        );
        self.source.set(
            defaults::REFRESH_TOKEN_LIFETIME,
            SettingValue::Lifetime(Duration::from_secs(30 * 24 * 60 * 60)),
        );
        self
    }
}
