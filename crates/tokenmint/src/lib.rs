//! # tokenmint - RS256 Access and Refresh Tokens
//!
//! Issues and verifies asymmetrically signed access and refresh tokens for
//! authenticated principals, and owns the signing keypair they depend on.
//!
//! ## Design Principles
//!
//! - **Explicit dependencies**: key and settings caches are owned values passed
//!   to the codec, never ambient globals
//! - **Closed configuration**: unknown setting names are errors, not silent `None`
//! - **Uniform failures**: every authentication failure maps to one public message
//! - **Rotation-safe caches**: invalidation wins over in-flight cache fills
//!
//! ## Architecture
//!
//! - [`settings`] - Settings resolver with defaults, overrides and reload-on-change
//! - [`keys`] - Key storage, cached key provider, RSA-2048 generation and rotation
//! - [`claims`] - Principal ↔ claims mapping (`FieldLookup` / `ComputedClaim`)
//! - [`encoder`] - Attribute value → JSON claim encoding
//! - [`codec`] - Compact RS256 token encoding and staged verification
//! - [`service`] - Issue, refresh and verify API, sign-in and refresh cookie
//! - [`bearer`] - `Authorization: Bearer` request authentication
//! - [`clock`] - Time sources (system and fixed)
//! - [`error`] - `TokenError` taxonomy
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::{json, Map};
//! use tokenmint::{
//!     rotate_keypair, KeyMaterialProvider, MemoryKeyStorage, Settings, TokenCodec, TokenKind,
//!     TokenService,
//! };
//!
//! let settings = Settings::with_defaults();
//! let storage = Arc::new(MemoryKeyStorage::new());
//! let keys = Arc::new(KeyMaterialProvider::new(settings.clone(), storage.clone(), storage));
//! rotate_keypair(&keys)?;
//!
//! let service = TokenService::new(TokenCodec::new(keys, settings));
//!
//! let mut user = Map::new();
//! user.insert("id".into(), json!("1"));
//! user.insert("username".into(), json!("bebe"));
//!
//! let pair = service.issue_token_pair(&user)?;
//! let envelope = service.verify_token(&pair.access.token, TokenKind::Access)?;
//! assert_eq!(envelope.claims["user_id"], json!("1"));
//!
//! // A refresh token is never accepted where an access token is expected
//! assert!(service.verify_token(&pair.refresh.token, TokenKind::Access).is_err());
//! # Ok::<(), tokenmint::TokenError>(())
//! ```
//!
//! ## Logging
//!
//! The crate emits `tracing` events (cache fills, invalidation, rotation,
//! rejections with their stage) and never installs a subscriber. Token strings
//! and private key bytes are never logged.

pub mod bearer;
pub mod claims;
pub mod clock;
pub mod codec;
pub mod encoder;
pub mod error;
pub mod keys;
pub mod service;
pub mod settings;

#[doc(inline)]
pub use error::{Result, TokenError};

#[doc(inline)]
pub use claims::{
    AttributeDescriptor, AttributeValue, ClaimMap, ClaimValue, ClaimsMapper, ClaimsPrincipal,
    Principal, TokenClaims,
};

#[doc(inline)]
pub use codec::{TokenCodec, TokenEnvelope, TokenKind};

#[doc(inline)]
pub use keys::{
    ConfiguredDiskKeyStorage, KeyMaterialProvider, KeyRole, KeyStorage, LocalDiskKeyStorage,
    MemoryKeyStorage, generate_keypair, rotate_keypair,
};

#[doc(inline)]
pub use service::{
    CredentialParams, CredentialStore, IssuedToken, RefreshCookie, TokenPair, TokenService,
};

#[doc(inline)]
pub use settings::{ConfigSource, FileConfigSource, MemoryConfigSource, SettingValue, Settings};

pub use bearer::BearerAuthenticator;
pub use clock::{Clock, FixedClock, SystemClock};
pub use encoder::{ClaimEncoder, JsonClaimEncoder};
