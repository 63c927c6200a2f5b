//! Token error types
//!
//! Every failure in this crate is terminal for the call that produced it: nothing
//! is retried internally. Errors fall into two groups:
//!
//! - **Authentication failures** (`Malformed`, `SignatureInvalid`, `Expired`,
//!   `MissingJti`, `WrongTokenType`, `InvalidCredentials`,
//!   `InvalidAuthorizationHeader`): caused by what the end user presented. The web
//!   layer should answer all of them identically, see [`TokenError::public_message`].
//! - **Operator errors** (`KeyUnavailable`, `UnknownSetting`, `InvalidSetting`,
//!   `InvalidKey`, `KeyGeneration`, `Storage`, `Config`): misconfiguration that
//!   should surface at startup or rotation time, see [`TokenError::is_operator_error`].

use thiserror::Error;

/// Errors produced while issuing or verifying tokens and managing their inputs
///
/// # Non-exhaustive
///
/// New variants may be added in minor releases. Match expressions must include
/// a wildcard arm.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TokenError {
    /// The token is not a well-formed compact token
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// Signature does not verify against the current public key
    #[error("Token signature is invalid")]
    SignatureInvalid,

    /// Current time is at or past the token's `exp`
    #[error("Token has expired")]
    Expired,

    /// The verified payload carries no `jti` claim
    #[error("Token is missing the jti claim")]
    MissingJti,

    /// `token_type` is absent or names a different kind than requested
    #[error("Wrong token type: expected {expected}, found {found}")]
    WrongTokenType {
        /// Kind requested by the caller
        expected: String,
        /// Kind found in the token (`<missing>` when absent)
        found: String,
    },

    /// Key storage has no entry at the configured path
    #[error("Key unavailable at '{path}'")]
    KeyUnavailable {
        /// Storage name that was looked up
        path: String,
    },

    /// Stored key material could not be parsed
    #[error("Invalid key material at '{path}': {reason}")]
    InvalidKey {
        /// Storage name of the offending key
        path: String,
        /// Parser message
        reason: String,
    },

    /// Fresh keypair generation failed
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// Key storage I/O failed for a reason other than a missing entry
    #[error("Key storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// The requested setting is not part of the recognized set
    #[error("Unknown setting: {0}")]
    UnknownSetting(String),

    /// A setting override holds a value of the wrong type or range
    #[error("Invalid value for setting {key}: expected {expected}")]
    InvalidSetting {
        /// Setting name
        key: String,
        /// Description of the accepted values
        expected: &'static str,
    },

    /// Loading a configuration file or environment failed
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// A claim value cannot be represented in the token payload
    #[error("Cannot encode claim '{claim}': {reason}")]
    Encoding {
        /// Claim name
        claim: String,
        /// Why the value was rejected
        reason: String,
    },

    /// The credential store did not recognize the username/password pair
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The Authorization header is not of the form `Bearer <token>`
    #[error("Invalid Authorization header")]
    InvalidAuthorizationHeader,
}

impl TokenError {
    /// Message safe to show to an end user for any authentication failure
    ///
    /// Deliberately identical for every check so callers cannot learn which
    /// stage rejected the token.
    pub const PUBLIC_AUTH_FAILURE: &'static str = "Authentication failed";

    /// Whether this error reflects operator misconfiguration rather than bad input
    pub fn is_operator_error(&self) -> bool {
        matches!(
            self,
            Self::KeyUnavailable { .. }
                | Self::InvalidKey { .. }
                | Self::KeyGeneration(_)
                | Self::Storage(_)
                | Self::UnknownSetting(_)
                | Self::InvalidSetting { .. }
                | Self::Config(_)
        )
    }

    /// Whether this error was caused by what the end user presented
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            Self::Malformed(_)
                | Self::SignatureInvalid
                | Self::Expired
                | Self::MissingJti
                | Self::WrongTokenType { .. }
                | Self::InvalidCredentials
                | Self::InvalidAuthorizationHeader
        )
    }

    /// Uniform, user-facing message for this error
    ///
    /// Authentication failures all collapse to [`Self::PUBLIC_AUTH_FAILURE`];
    /// everything else becomes a generic server-side message.
    pub fn public_message(&self) -> &'static str {
        if self.is_authentication_failure() {
            Self::PUBLIC_AUTH_FAILURE
        } else {
            "Internal server error"
        }
    }
}

/// Result type for token operations
pub type Result<T> = std::result::Result<T, TokenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_failures_share_public_message() {
        let errors = [
            TokenError::Malformed("bad".into()),
            TokenError::SignatureInvalid,
            TokenError::Expired,
            TokenError::MissingJti,
            TokenError::WrongTokenType {
                expected: "access".into(),
                found: "refresh".into(),
            },
            TokenError::InvalidCredentials,
        ];

        for error in &errors {
            assert!(error.is_authentication_failure(), "{error}");
            assert!(!error.is_operator_error(), "{error}");
            assert_eq!(error.public_message(), TokenError::PUBLIC_AUTH_FAILURE);
        }
    }

    #[test]
    fn test_operator_errors_are_not_authentication_failures() {
        let errors = [
            TokenError::KeyUnavailable {
                path: "jwt-signing.pem".into(),
            },
            TokenError::UnknownSetting("JWT_TYPO".into()),
            TokenError::InvalidSetting {
                key: "JWT_ACCESS_TOKEN_LIFETIME".into(),
                expected: "duration",
            },
        ];

        for error in &errors {
            assert!(error.is_operator_error(), "{error}");
            assert!(!error.is_authentication_failure(), "{error}");
            assert_eq!(error.public_message(), "Internal server error");
        }
    }

    #[test]
    fn test_display_includes_context() {
        let error = TokenError::KeyUnavailable {
            path: "keys/jwt-signing.pem".into(),
        };
        assert_eq!(error.to_string(), "Key unavailable at 'keys/jwt-signing.pem'");
    }
}
