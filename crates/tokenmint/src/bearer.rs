//! Bearer-token request authentication

use tracing::debug;

use crate::claims::Principal;
use crate::codec::{TokenEnvelope, TokenKind};
use crate::error::{Result, TokenError};
use crate::service::TokenService;

/// Extract the token from an `Authorization: Bearer <token>` header value
///
/// The scheme is matched case-insensitively; the value must be exactly two
/// space-separated parts.
///
/// # Errors
///
/// Returns [`TokenError::InvalidAuthorizationHeader`] for any other shape.
pub fn parse_authorization(value: &str) -> Result<&str> {
    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => Ok(token),
        _ => Err(TokenError::InvalidAuthorizationHeader),
    }
}

/// Authenticates requests carrying an access token
///
/// Verified claims are copied onto the request's principal through the
/// configured claims mapper.
#[derive(Debug, Clone)]
pub struct BearerAuthenticator {
    service: TokenService,
}

impl BearerAuthenticator {
    pub fn new(service: TokenService) -> Self {
        Self { service }
    }

    /// Verify the access token in `authorization` and apply its claims to `principal`
    ///
    /// `principal` is untouched unless verification succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InvalidAuthorizationHeader`] if the header is not a
    /// bearer credential, otherwise any error of [`TokenService::verify_token`]
    /// for [`TokenKind::Access`].
    pub fn authenticate<P: Principal + ?Sized>(
        &self,
        authorization: &str,
        principal: &mut P,
    ) -> Result<TokenEnvelope> {
        let token = parse_authorization(authorization)?;
        let envelope = self.service.verify_token(token, TokenKind::Access)?;
        self.service
            .claims_mapper()?
            .apply_claims(principal, &envelope.claims);
        debug!(jti = %envelope.jti, "Authenticated bearer token");
        Ok(envelope)
    }
}
