//! Environment overrides on top of a configuration file
//!
//! Kept in its own test binary: `set_var` must not race with the environment
//! reads every `FileConfigSource` load performs.

use std::sync::Arc;

use tokenmint::{FileConfigSource, Settings};

#[test]
fn test_environment_overrides_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tokens.yaml");
    std::fs::write(&path, "jwt_refresh_cookie_name: refresh_token\n").unwrap();
    // SAFETY: the only test in this binary; no other thread reads the environment
    unsafe { std::env::set_var("TOKENMINT_IT_ENV_JWT_REFRESH_COOKIE_NAME", "rt") };

    let source = Arc::new(FileConfigSource::load_with_prefix(&path, "TOKENMINT_IT_ENV").unwrap());
    let settings = Settings::new(source);

    assert_eq!(settings.refresh_cookie().unwrap().name, "rt");
}
