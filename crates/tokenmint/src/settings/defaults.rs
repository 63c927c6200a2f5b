//! Recognized setting names and their defaults

use std::sync::Arc;
use std::time::Duration;

use super::SettingValue;
use crate::claims::ClaimMap;
use crate::encoder::JsonClaimEncoder;

/// Storage root holding the private key
pub const PRIVATE_KEY_STORAGE: &str = "JWT_PRIVATE_KEY_STORAGE";
/// Storage root holding the public key
pub const PUBLIC_KEY_STORAGE: &str = "JWT_PUBLIC_KEY_STORAGE";
/// Name of the private key inside its storage
pub const PRIVATE_KEY_PATH: &str = "JWT_PRIVATE_KEY_PATH";
/// Name of the public key inside its storage
pub const PUBLIC_KEY_PATH: &str = "JWT_PUBLIC_KEY_PATH";
/// Cookie carrying the refresh token for browser clients
pub const REFRESH_COOKIE_NAME: &str = "JWT_REFRESH_COOKIE_NAME";
/// Lifetime of refresh tokens
pub const REFRESH_TOKEN_LIFETIME: &str = "JWT_REFRESH_TOKEN_LIFETIME";
/// Lifetime of access tokens
pub const ACCESS_TOKEN_LIFETIME: &str = "JWT_ACCESS_TOKEN_LIFETIME";
/// `Secure` attribute of the refresh cookie
pub const REFRESH_COOKIE_SECURE: &str = "WEB_REFRESH_COOKIE_SECURE";
/// `HttpOnly` attribute of the refresh cookie
pub const REFRESH_COOKIE_HTTP_ONLY: &str = "WEB_REFRESH_COOKIE_HTTP_ONLY";
/// `SameSite` attribute of the refresh cookie
pub const REFRESH_COOKIE_SAME_SITE_POLICY: &str = "WEB_REFRESH_COOKIE_SAME_SITE_POLICY";
/// `Path` attribute of the refresh cookie
pub const REFRESH_COOKIE_PATH: &str = "WEB_REFRESH_COOKIE_PATH";
/// Credential-store field the sign-in username is matched against
pub const USERNAME_FIELD: &str = "USERNAME_FIELD";
/// Claim → principal attribute map
pub const TOKEN_CLAIM_USER_ATTRIBUTE_MAP: &str = "TOKEN_CLAIM_USER_ATTRIBUTE_MAP";
/// Encoder turning attribute values into claim values
pub const TOKEN_USER_ENCODER: &str = "TOKEN_USER_ENCODER";

/// Every recognized setting name
pub const SETTING_KEYS: &[&str] = &[
    PRIVATE_KEY_STORAGE,
    PUBLIC_KEY_STORAGE,
    PRIVATE_KEY_PATH,
    PUBLIC_KEY_PATH,
    REFRESH_COOKIE_NAME,
    REFRESH_TOKEN_LIFETIME,
    ACCESS_TOKEN_LIFETIME,
    REFRESH_COOKIE_SECURE,
    REFRESH_COOKIE_HTTP_ONLY,
    REFRESH_COOKIE_SAME_SITE_POLICY,
    REFRESH_COOKIE_PATH,
    USERNAME_FIELD,
    TOKEN_CLAIM_USER_ATTRIBUTE_MAP,
    TOKEN_USER_ENCODER,
];

/// Canonical `'static` name for `key`, if it is recognized
pub fn canonical_key(key: &str) -> Option<&'static str> {
    SETTING_KEYS.iter().copied().find(|known| *known == key)
}

/// Hard-coded default for `key`, or `None` if the key is not recognized
pub fn default_value(key: &str) -> Option<SettingValue> {
    let value = match key {
        PRIVATE_KEY_STORAGE | PUBLIC_KEY_STORAGE => SettingValue::text("."),
        PRIVATE_KEY_PATH => SettingValue::text("jwt-signing.pem"),
        PUBLIC_KEY_PATH => SettingValue::text("jwt-signing.pub"),
        REFRESH_COOKIE_NAME => SettingValue::text("refresh"),
        REFRESH_TOKEN_LIFETIME => SettingValue::Lifetime(Duration::from_secs(30 * 24 * 60 * 60)),
        ACCESS_TOKEN_LIFETIME => SettingValue::Lifetime(Duration::from_secs(15 * 60)),
        REFRESH_COOKIE_SECURE | REFRESH_COOKIE_HTTP_ONLY => SettingValue::Flag(true),
        REFRESH_COOKIE_SAME_SITE_POLICY => SettingValue::text("Strict"),
        REFRESH_COOKIE_PATH => SettingValue::text("/api/auth/web/token-refresh"),
        USERNAME_FIELD => SettingValue::text("username"),
        TOKEN_CLAIM_USER_ATTRIBUTE_MAP => SettingValue::ClaimMap(ClaimMap::standard()),
        TOKEN_USER_ENCODER => SettingValue::Encoder(Arc::new(JsonClaimEncoder)),
        _ => return None,
    };
    Some(value)
}
