//! Token issuance and verification API
//!
//! [`TokenService`] is what the web layer talks to. It combines the claims
//! mapper configured in [`Settings`](crate::settings::Settings) with a
//! [`TokenCodec`].

use std::fmt;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde_json::Map;
use tracing::{debug, info};

use crate::claims::{ClaimsMapper, Principal};
use crate::codec::{TokenCodec, TokenEnvelope, TokenKind};
use crate::error::{Result, TokenError};

/// A signed token and the envelope it carries
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedToken {
    /// Compact signed token
    pub token: String,
    pub envelope: TokenEnvelope,
}

/// Refresh and access token issued together at sign-in
#[derive(Debug, Clone, PartialEq)]
pub struct TokenPair {
    pub refresh: IssuedToken,
    pub access: IssuedToken,
}

/// Refresh-token cookie for browser clients
///
/// The crate never writes HTTP responses; the web layer copies these fields
/// onto its `Set-Cookie` header untouched.
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshCookie {
    pub name: String,
    /// The refresh token
    pub value: String,
    /// Instant the refresh token expires
    pub expires: DateTime<Utc>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: String,
    pub path: String,
}

impl fmt::Debug for RefreshCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshCookie")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .field("expires", &self.expires)
            .field("secure", &self.secure)
            .field("http_only", &self.http_only)
            .field("same_site", &self.same_site)
            .field("path", &self.path)
            .finish()
    }
}

/// Sign-in credentials as handed to a [`CredentialStore`]
#[derive(Debug)]
pub struct CredentialParams {
    /// Store field the username is matched against (`USERNAME_FIELD`)
    pub username_field: String,
    pub username: String,
    pub password: SecretString,
}

/// External user store verifying username/password pairs
pub trait CredentialStore {
    /// Principal type produced on success
    type Principal: Principal;

    /// The principal matching `params`, or `None` if the credentials are wrong
    fn authenticate(&self, params: &CredentialParams) -> Option<Self::Principal>;
}

/// Issues, refreshes and verifies tokens
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use serde_json::{json, Map};
/// use tokenmint::codec::{TokenCodec, TokenKind};
/// use tokenmint::keys::{rotate_keypair, KeyMaterialProvider, MemoryKeyStorage};
/// use tokenmint::service::TokenService;
/// use tokenmint::settings::Settings;
///
/// let settings = Settings::with_defaults();
/// let storage = Arc::new(MemoryKeyStorage::new());
/// let keys = Arc::new(KeyMaterialProvider::new(settings.clone(), storage.clone(), storage));
/// rotate_keypair(&keys)?;
/// let service = TokenService::new(TokenCodec::new(keys, settings));
///
/// let mut user = Map::new();
/// user.insert("id".into(), json!("1"));
/// user.insert("username".into(), json!("bebe"));
///
/// let refresh = service.issue_refresh_token(&user)?;
/// let access = service.refresh_access_token(&refresh.token)?;
/// let envelope = service.verify_token(&access.token, TokenKind::Access)?;
/// assert_eq!(envelope.claims["username"], json!("bebe"));
/// # Ok::<(), tokenmint::TokenError>(())
/// ```
#[derive(Debug, Clone)]
pub struct TokenService {
    codec: TokenCodec,
}

impl TokenService {
    pub fn new(codec: TokenCodec) -> Self {
        Self { codec }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Mapper built from the current claim map and encoder settings
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InvalidSetting`] if either setting has the wrong type.
    pub fn claims_mapper(&self) -> Result<ClaimsMapper> {
        let settings = self.codec.settings();
        Ok(ClaimsMapper::new(
            settings.claim_map()?,
            settings.claim_encoder()?,
        ))
    }

    fn issue<P: Principal + ?Sized>(&self, principal: &P, kind: TokenKind) -> Result<IssuedToken> {
        let claims = self.claims_mapper()?.to_claims(principal)?;
        let (token, envelope) = self.codec.encode(&claims, kind, &Map::new())?;
        Ok(IssuedToken { token, envelope })
    }

    /// Access token for an authenticated principal
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Encoding`] if a claim cannot be encoded, or any
    /// settings or key error from [`TokenCodec::encode`].
    pub fn issue_access_token<P: Principal + ?Sized>(&self, principal: &P) -> Result<IssuedToken> {
        self.issue(principal, TokenKind::Access)
    }

    /// Refresh token for an authenticated principal
    ///
    /// # Errors
    ///
    /// Same as [`issue_access_token`](Self::issue_access_token).
    pub fn issue_refresh_token<P: Principal + ?Sized>(&self, principal: &P) -> Result<IssuedToken> {
        self.issue(principal, TokenKind::Refresh)
    }

    /// Refresh and access token for an authenticated principal
    ///
    /// # Errors
    ///
    /// Same as [`issue_access_token`](Self::issue_access_token).
    pub fn issue_token_pair<P: Principal + ?Sized>(&self, principal: &P) -> Result<TokenPair> {
        Ok(TokenPair {
            refresh: self.issue_refresh_token(principal)?,
            access: self.issue_access_token(principal)?,
        })
    }

    /// Exchange a refresh token for a new access token
    ///
    /// The new token carries exactly the claims named in the current claim map,
    /// copied from the verified refresh token (`null` where the refresh token
    /// lacks one). The refresh token itself stays valid.
    ///
    /// # Errors
    ///
    /// Any verification error from [`TokenCodec::decode`] for
    /// [`TokenKind::Refresh`], including [`TokenError::WrongTokenType`] when an
    /// access token is presented.
    pub fn refresh_access_token(&self, refresh_token: &str) -> Result<IssuedToken> {
        let refresh = self.codec.decode(refresh_token, TokenKind::Refresh)?;
        let claims = self.claims_mapper()?.select_claims(&refresh.claims);
        let (token, envelope) = self.codec.encode(&claims, TokenKind::Access, &Map::new())?;
        debug!(refresh_jti = %refresh.jti, access_jti = %envelope.jti, "Refreshed access token");
        Ok(IssuedToken { token, envelope })
    }

    /// Verify `token` as a token of `kind`
    ///
    /// # Errors
    ///
    /// See [`TokenCodec::decode`].
    pub fn verify_token(&self, token: &str, kind: TokenKind) -> Result<TokenEnvelope> {
        self.codec.decode(token, kind)
    }

    /// Authenticate against `store` and issue a token pair
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InvalidCredentials`] if the store rejects the
    /// credentials, otherwise the errors of [`issue_token_pair`](Self::issue_token_pair).
    pub fn sign_in<S: CredentialStore + ?Sized>(
        &self,
        store: &S,
        username: &str,
        password: SecretString,
    ) -> Result<TokenPair> {
        let params = CredentialParams {
            username_field: self.codec.settings().username_field()?,
            username: username.to_string(),
            password,
        };

        let Some(principal) = store.authenticate(&params) else {
            debug!(field = %params.username_field, "Sign-in rejected by credential store");
            return Err(TokenError::InvalidCredentials);
        };

        let pair = self.issue_token_pair(&principal)?;
        info!(
            refresh_jti = %pair.refresh.envelope.jti,
            access_jti = %pair.access.envelope.jti,
            "Signed in"
        );
        Ok(pair)
    }

    /// Cookie transporting `refresh` to a browser client
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::WrongTokenType`] if `refresh` is not a refresh
    /// token, or [`TokenError::InvalidSetting`] if a cookie setting has the
    /// wrong type.
    pub fn refresh_cookie(&self, refresh: &IssuedToken) -> Result<RefreshCookie> {
        let envelope = &refresh.envelope;
        if envelope.token_type != TokenKind::Refresh {
            return Err(TokenError::WrongTokenType {
                expected: TokenKind::Refresh.to_string(),
                found: envelope.token_type.to_string(),
            });
        }
        let expires = envelope
            .expires_at()
            .ok_or_else(|| TokenError::Malformed(format!("exp {} is out of range", envelope.exp)))?;

        let cookie = self.codec.settings().refresh_cookie()?;
        Ok(RefreshCookie {
            name: cookie.name,
            value: refresh.token.clone(),
            expires,
            secure: cookie.secure,
            http_only: cookie.http_only,
            same_site: cookie.same_site,
            path: cookie.path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{TimeDelta, TimeZone};
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;
    use serde_json::{Value, json};

    use crate::claims::{AttributeValue, ClaimMap};
    use crate::clock::FixedClock;
    use crate::keys::{KeyMaterialProvider, KeyStorage, MemoryKeyStorage, test_keypair};
    use crate::settings::{MemoryConfigSource, SettingValue, Settings, defaults};

    struct User {
        id: i64,
        username: String,
    }

    impl Principal for User {
        fn attribute(&self, name: &str) -> Option<AttributeValue> {
            match name {
                "id" => Some(self.id.into()),
                "username" => Some(self.username.as_str().into()),
                _ => None,
            }
        }

        fn set_attribute(&mut self, _name: &str, _value: serde_json::Value) {}
    }

    struct Users;

    impl CredentialStore for Users {
        type Principal = User;

        fn authenticate(&self, params: &CredentialParams) -> Option<User> {
            (params.username_field == "username"
                && params.username == "bebe"
                && params.password.expose_secret() == "hunter2")
                .then(|| User {
                    id: 1,
                    username: "bebe".into(),
                })
        }
    }

    fn service(source: Arc<MemoryConfigSource>) -> (TokenService, Arc<FixedClock>) {
        let storage = Arc::new(MemoryKeyStorage::new());
        let keypair = test_keypair();
        storage.save("jwt-signing.pem", keypair.private_pem.as_bytes()).unwrap();
        storage.save("jwt-signing.pub", keypair.public_pem.as_bytes()).unwrap();

        let settings = Settings::new(source);
        let keys = Arc::new(KeyMaterialProvider::new(settings.clone(), storage.clone(), storage));
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 1, 11, 12, 0, 1).unwrap(),
        ));
        let codec = TokenCodec::new(keys, settings).with_clock(clock.clone());
        (TokenService::new(codec), clock)
    }

    fn user() -> User {
        User {
            id: 1,
            username: "bebe".into(),
        }
    }

    #[test]
    fn test_refresh_copies_mapped_claims() {
        let (service, clock) = service(Arc::new(MemoryConfigSource::new()));
        let refresh = service.issue_refresh_token(&user()).unwrap();

        clock.advance(TimeDelta::seconds(1));
        let access = service.refresh_access_token(&refresh.token).unwrap();

        assert_eq!(access.envelope.iat, 1_704_974_402);
        assert_eq!(access.envelope.exp, 1_704_975_302);
        assert_eq!(
            Value::Object(access.envelope.claims),
            json!({"user_id": 1, "username": "bebe", "last_login": null})
        );
    }

    #[test]
    fn test_refresh_rejects_access_token() {
        let (service, _) = service(Arc::new(MemoryConfigSource::new()));
        let access = service.issue_access_token(&user()).unwrap();

        assert!(matches!(
            service.refresh_access_token(&access.token),
            Err(TokenError::WrongTokenType { .. })
        ));
    }

    #[test]
    fn test_refresh_follows_current_claim_map() {
        let source = Arc::new(MemoryConfigSource::new());
        let (service, _) = service(source.clone());
        let refresh = service.issue_refresh_token(&user()).unwrap();

        source.set(
            defaults::TOKEN_CLAIM_USER_ATTRIBUTE_MAP,
            SettingValue::ClaimMap(ClaimMap::new().field("username", "username").field("email", "email")),
        );
        let access = service.refresh_access_token(&refresh.token).unwrap();

        assert_eq!(
            Value::Object(access.envelope.claims),
            json!({"username": "bebe", "email": null})
        );
    }

    #[test]
    fn test_sign_in_issues_pair() {
        let (service, _) = service(Arc::new(MemoryConfigSource::new()));

        let pair = service
            .sign_in(&Users, "bebe", SecretString::new("hunter2".into()))
            .unwrap();

        assert_eq!(pair.refresh.envelope.token_type, TokenKind::Refresh);
        assert_eq!(pair.access.envelope.token_type, TokenKind::Access);
        assert!(service.verify_token(&pair.access.token, TokenKind::Access).is_ok());
    }

    #[test]
    fn test_sign_in_rejects_bad_password() {
        let (service, _) = service(Arc::new(MemoryConfigSource::new()));

        let err = service
            .sign_in(&Users, "bebe", SecretString::new("wrong".into()))
            .unwrap_err();
        assert!(matches!(err, TokenError::InvalidCredentials));
        assert_eq!(err.public_message(), TokenError::PUBLIC_AUTH_FAILURE);
    }

    #[test]
    fn test_sign_in_uses_configured_username_field() {
        let source = Arc::new(MemoryConfigSource::new());
        source.set(defaults::USERNAME_FIELD, SettingValue::text("email"));
        let (service, _) = service(source);

        assert!(matches!(
            service.sign_in(&Users, "bebe", SecretString::new("hunter2".into())),
            Err(TokenError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_refresh_cookie_from_settings() {
        let source = Arc::new(MemoryConfigSource::new());
        source.set(defaults::REFRESH_COOKIE_SECURE, SettingValue::Flag(false));
        let (service, _) = service(source);
        let refresh = service.issue_refresh_token(&user()).unwrap();

        let cookie = service.refresh_cookie(&refresh).unwrap();

        assert_eq!(cookie.name, "refresh");
        assert_eq!(cookie.value, refresh.token);
        assert_eq!(cookie.expires.timestamp(), 1_707_566_401);
        assert!(!cookie.secure);
        assert!(cookie.http_only);
        assert_eq!(cookie.same_site, "Strict");
        assert_eq!(cookie.path, "/api/auth/web/token-refresh");
        assert!(!format!("{cookie:?}").contains(&refresh.token));
    }

    #[test]
    fn test_refresh_cookie_requires_refresh_token() {
        let (service, _) = service(Arc::new(MemoryConfigSource::new()));
        let access = service.issue_access_token(&user()).unwrap();

        assert!(matches!(
            service.refresh_cookie(&access),
            Err(TokenError::WrongTokenType { .. })
        ));
    }
}
