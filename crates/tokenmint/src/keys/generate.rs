//! Keypair generation and rotation

use rand::rngs::OsRng;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use tracing::info;
use zeroize::Zeroizing;

use super::provider::KeyMaterialProvider;
use crate::error::{Result, TokenError};

/// RSA modulus size in bits
pub const KEY_BITS: usize = 2048;

/// Freshly generated PEM-encoded keypair
pub struct KeyPairPem {
    /// Unencrypted PKCS#1 (`BEGIN RSA PRIVATE KEY`)
    pub private_pem: Zeroizing<String>,
    /// SubjectPublicKeyInfo (`BEGIN PUBLIC KEY`)
    pub public_pem: String,
}

impl std::fmt::Debug for KeyPairPem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPairPem")
            .field("private_pem", &"<redacted>")
            .field("public_pem", &self.public_pem)
            .finish()
    }
}

/// Generate an RSA-2048 keypair
///
/// # Errors
///
/// Returns [`TokenError::KeyGeneration`] if key generation or PEM encoding fails.
pub fn generate_keypair() -> Result<KeyPairPem> {
    let mut rng = OsRng;
    let private_key = RsaPrivateKey::new(&mut rng, KEY_BITS)
        .map_err(|e| TokenError::KeyGeneration(format!("Failed to generate RSA key: {e}")))?;
    let public_key = RsaPublicKey::from(&private_key);

    let private_pem = private_key
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| TokenError::KeyGeneration(format!("Failed to encode private key: {e}")))?;
    let public_pem = public_key
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| TokenError::KeyGeneration(format!("Failed to encode public key: {e}")))?;

    Ok(KeyPairPem {
        private_pem,
        public_pem,
    })
}

/// Replace the active keypair
///
/// Generates a new keypair, writes both halves to the provider's storage under
/// the configured names, then invalidates the provider's cache so no later
/// call signs or verifies with the old keys. Returns the stored
/// `(private, public)` names.
///
/// Tokens signed before rotation stop verifying as soon as this returns.
///
/// # Errors
///
/// Returns [`TokenError::KeyGeneration`] if generation fails, and the storage
/// or settings error if either key cannot be written.
pub fn rotate_keypair(provider: &KeyMaterialProvider) -> Result<(String, String)> {
    let keypair = generate_keypair()?;
    let settings = provider.settings();

    let private_name = provider
        .private_storage()
        .save(&settings.private_key_path()?, keypair.private_pem.as_bytes())?;
    let public_name = provider
        .public_storage()
        .save(&settings.public_key_path()?, keypair.public_pem.as_bytes())?;

    provider.invalidate();
    info!(
        private_key = %private_name,
        public_key = %public_name,
        "Rotated token signing keypair"
    );
    Ok((private_name, public_name))
}
