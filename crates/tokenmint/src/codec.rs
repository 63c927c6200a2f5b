//! Token codec
//!
//! Tokens are compact RS256 JWS strings (`header.payload.signature`). The
//! payload is a flat JSON object: the mapped domain claims followed by four
//! system fields.
//!
//! | Field        | Type    | Meaning                                 |
//! |--------------|---------|-----------------------------------------|
//! | `jti`        | string  | random per-token id (UUIDv4, no dashes) |
//! | `iat`        | integer | issue time, Unix seconds                |
//! | `exp`        | integer | expiry, `iat` + lifetime for the kind   |
//! | `token_type` | string  | `access` or `refresh`                   |
//!
//! Decoding runs the checks in a fixed order and stops at the first failure:
//! structure, signature, expiry, `jti` presence, `token_type` match.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation, crypto, decode, decode_header};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::claims::TokenClaims;
use crate::clock::{Clock, SystemClock};
use crate::error::{Result, TokenError};
use crate::keys::KeyMaterialProvider;
use crate::settings::{Settings, defaults};

/// Payload field holding the token id
pub const JTI: &str = "jti";
/// Payload field holding the issue time
pub const IAT: &str = "iat";
/// Payload field holding the expiry
pub const EXP: &str = "exp";
/// Payload field holding the token kind
pub const TOKEN_TYPE: &str = "token_type";

/// Payload fields owned by the codec; mapped claims with these names are overwritten
pub const RESERVED_CLAIMS: [&str; 4] = [JTI, IAT, EXP, TOKEN_TYPE];

/// Kind of token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Short-lived, presented on every request
    Access,
    /// Long-lived, only exchanged for new access tokens
    Refresh,
}

impl TokenKind {
    /// Wire value of `token_type`
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }

    /// Setting holding this kind's lifetime
    pub fn lifetime_setting(self) -> &'static str {
        match self {
            Self::Access => defaults::ACCESS_TOKEN_LIFETIME,
            Self::Refresh => defaults::REFRESH_TOKEN_LIFETIME,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenKind {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "access" => Ok(Self::Access),
            "refresh" => Ok(Self::Refresh),
            other => Err(TokenError::Malformed(format!("unknown token type '{other}'"))),
        }
    }
}

/// Claims plus the system fields of one token
#[derive(Debug, Clone, PartialEq)]
pub struct TokenEnvelope {
    /// Domain claims, without the system fields
    pub claims: TokenClaims,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub token_type: TokenKind,
}

impl TokenEnvelope {
    /// The full payload as signed: domain claims followed by the system fields
    pub fn to_payload(&self) -> TokenClaims {
        let mut payload = self.claims.clone();
        payload.retain(|name, _| !RESERVED_CLAIMS.contains(&name.as_str()));
        payload.insert(JTI.to_string(), Value::String(self.jti.clone()));
        payload.insert(IAT.to_string(), Value::from(self.iat));
        payload.insert(EXP.to_string(), Value::from(self.exp));
        payload.insert(
            TOKEN_TYPE.to_string(),
            Value::String(self.token_type.as_str().to_string()),
        );
        payload
    }

    /// `iat` as an instant
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.iat, 0)
    }

    /// `exp` as an instant
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

/// Signs and verifies tokens with the provider's current keypair
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use serde_json::{json, Map};
/// use tokenmint::codec::{TokenCodec, TokenKind};
/// use tokenmint::keys::{rotate_keypair, KeyMaterialProvider, MemoryKeyStorage};
/// use tokenmint::settings::Settings;
///
/// let settings = Settings::with_defaults();
/// let storage = Arc::new(MemoryKeyStorage::new());
/// let keys = Arc::new(KeyMaterialProvider::new(settings.clone(), storage.clone(), storage));
/// rotate_keypair(&keys)?;
///
/// let codec = TokenCodec::new(keys, settings);
/// let mut claims = Map::new();
/// claims.insert("username".into(), json!("bebe"));
///
/// let (token, issued) = codec.encode(&claims, TokenKind::Access, &Map::new())?;
/// let verified = codec.decode(&token, TokenKind::Access)?;
/// assert_eq!(verified, issued);
/// # Ok::<(), tokenmint::TokenError>(())
/// ```
#[derive(Debug, Clone)]
pub struct TokenCodec {
    keys: Arc<KeyMaterialProvider>,
    settings: Arc<Settings>,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    /// Codec on the system clock
    pub fn new(keys: Arc<KeyMaterialProvider>, settings: Arc<Settings>) -> Self {
        Self {
            keys,
            settings,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn keys(&self) -> &Arc<KeyMaterialProvider> {
        &self.keys
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Sign `claims` as a token of `kind`
    ///
    /// `extra_headers` are added to the JOSE header; `alg` and `typ` cannot be
    /// overridden. Returns the compact token and the envelope that was signed.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InvalidSetting`] if the lifetime for `kind` is
    /// unusable, and the key provider's error if no signing key can be loaded.
    pub fn encode(
        &self,
        claims: &TokenClaims,
        kind: TokenKind,
        extra_headers: &Map<String, Value>,
    ) -> Result<(String, TokenEnvelope)> {
        let now = self.clock.now();
        let lifetime = self.settings.lifetime_for(kind)?;
        let expires = TimeDelta::from_std(lifetime)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .ok_or_else(|| TokenError::InvalidSetting {
                key: kind.lifetime_setting().to_string(),
                expected: "lifetime within the representable time range",
            })?;

        let mut claims = claims.clone();
        claims.retain(|name, _| !RESERVED_CLAIMS.contains(&name.as_str()));
        let envelope = TokenEnvelope {
            claims,
            jti: Uuid::new_v4().simple().to_string(),
            iat: now.timestamp(),
            exp: expires.timestamp(),
            token_type: kind,
        };

        let mut header = Map::new();
        header.insert("alg".into(), Value::String("RS256".into()));
        header.insert("typ".into(), Value::String("JWT".into()));
        for (name, value) in extra_headers {
            if name != "alg" && name != "typ" {
                header.insert(name.clone(), value.clone());
            }
        }

        let message = format!(
            "{}.{}",
            encode_segment(&header)?,
            encode_segment(&envelope.to_payload())?
        );
        let key = self.keys.get_private_key()?;
        let signature = crypto::sign(message.as_bytes(), key.encoding_key(), Algorithm::RS256)
            .map_err(|e| TokenError::InvalidKey {
                path: self
                    .settings
                    .private_key_path()
                    .unwrap_or_else(|_| defaults::PRIVATE_KEY_PATH.to_string()),
                reason: e.to_string(),
            })?;

        debug!(
            token_type = %kind,
            jti = %envelope.jti,
            exp = envelope.exp,
            "Issued token"
        );
        Ok((format!("{message}.{signature}"), envelope))
    }

    /// Verify `token` and check it is an unexpired token of `kind`
    ///
    /// # Errors
    ///
    /// - [`TokenError::Malformed`] if the token is not a well-formed compact
    ///   token or its `exp`/`iat` are missing or inconsistent
    /// - [`TokenError::SignatureInvalid`] if the signature does not verify against
    ///   the current public key, or the header names an algorithm other than RS256
    /// - [`TokenError::Expired`] if now is at or past `exp`
    /// - [`TokenError::MissingJti`] if the payload has no `jti`
    /// - [`TokenError::WrongTokenType`] if `token_type` is absent or not `kind`
    /// - the key provider's error if no verification key can be loaded
    pub fn decode(&self, token: &str, kind: TokenKind) -> Result<TokenEnvelope> {
        let now = self.clock.now().timestamp();

        decode_header(token)
            .map_err(|e| reject("structure", TokenError::Malformed(e.to_string())))?;

        let key = self.keys.get_public_key()?;
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let mut payload = decode::<TokenClaims>(token, key.decoding_key(), &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    warn!(error = %e, "Token signature rejected");
                    TokenError::SignatureInvalid
                }
                ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidKeyFormat => {
                    TokenError::InvalidKey {
                        path: self
                            .settings
                            .public_key_path()
                            .unwrap_or_else(|_| defaults::PUBLIC_KEY_PATH.to_string()),
                        reason: e.to_string(),
                    }
                }
                _ => reject("signature", TokenError::Malformed(e.to_string())),
            })?
            .claims;

        let exp = integer_field(&payload, EXP)?;
        if now >= exp {
            return Err(reject("expiry", TokenError::Expired));
        }

        let jti = match payload.get(JTI).and_then(Value::as_str) {
            Some(jti) => jti.to_string(),
            None => return Err(reject("jti", TokenError::MissingJti)),
        };

        let found = payload.get(TOKEN_TYPE).and_then(Value::as_str);
        if found != Some(kind.as_str()) {
            return Err(reject(
                "token_type",
                TokenError::WrongTokenType {
                    expected: kind.as_str().to_string(),
                    found: found.unwrap_or("<missing>").to_string(),
                },
            ));
        }

        let iat = integer_field(&payload, IAT)?;
        if exp <= iat {
            return Err(reject(
                "structure",
                TokenError::Malformed(format!("exp {exp} is not after iat {iat}")),
            ));
        }

        payload.retain(|name, _| !RESERVED_CLAIMS.contains(&name.as_str()));
        Ok(TokenEnvelope {
            claims: payload,
            jti,
            iat,
            exp,
            token_type: kind,
        })
    }

    /// The unverified JOSE header of `token`
    ///
    /// Nothing in the result is authenticated; use it for inspection only,
    /// never for trust decisions.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Malformed`] if the token does not have three
    /// segments or its header is not base64url-encoded JSON.
    pub fn inspect_header(token: &str) -> Result<Map<String, Value>> {
        let mut segments = token.split('.');
        let (Some(header), Some(_), Some(_), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(TokenError::Malformed("expected three segments".into()));
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(header)
            .map_err(|e| TokenError::Malformed(format!("header is not base64url: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| TokenError::Malformed(format!("header is not a JSON object: {e}")))
    }
}

fn encode_segment(value: &Map<String, Value>) -> Result<String> {
    let json = serde_json::to_vec(value).map_err(|e| TokenError::Encoding {
        claim: "<payload>".into(),
        reason: e.to_string(),
    })?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn integer_field(payload: &TokenClaims, name: &str) -> Result<i64> {
    payload.get(name).and_then(Value::as_i64).ok_or_else(|| {
        reject(
            "structure",
            TokenError::Malformed(format!("{name} is missing or not an integer")),
        )
    })
}

fn reject(stage: &'static str, error: TokenError) -> TokenError {
    debug!(stage, error = %error, "Token rejected");
    error
}
