// Tool key pool: RSA keypair generation, JWK export, JWKS assembly, and
// rotation.
//
// The pool is the shared signing identity for registrations without their
// own keypair. Deactivating a key only removes it from the published JWKS;
// the row stays so still-unexpired assertions signed with it keep
// verifying.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use rsa::pkcs8::{DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use lti_tool_core::db::models::Key;
use lti_tool_core::error::{LtiToolError, Result};

use crate::context::ToolContext;

const RSA_KEY_BITS: usize = 2048;

/// A public JWK as served from the JWKS endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwkPublic {
    pub kid: String,
    pub kty: String,
    pub alg: String,
    #[serde(rename = "use")]
    pub use_: String,
    pub n: String,
    pub e: String,
}

/// JSON Web Key Set response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwksResponse {
    pub keys: Vec<JwkPublic>,
}

/// Generate a fresh RSA-2048 keypair as a pool `Key` record.
pub fn generate_keypair() -> Result<Key> {
    let mut rng = rand::thread_rng();
    let private = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
        .map_err(|e| LtiToolError::Crypto(format!("RSA key generation failed: {e}")))?;
    let public = RsaPublicKey::from(&private);

    let private_pem = private
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| LtiToolError::Crypto(format!("Private key encoding failed: {e}")))?;
    let public_pem = public
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| LtiToolError::Crypto(format!("Public key encoding failed: {e}")))?;

    Ok(Key::new(public_pem, private_pem.to_string()))
}

/// Convert a public key PEM into its JWK representation.
///
/// The kid is the base64url SHA-256 thumbprint of the modulus, so the same
/// key always publishes under the same id.
pub fn public_key_jwk(public_pem: &str) -> Result<JwkPublic> {
    let public = RsaPublicKey::from_public_key_pem(public_pem)
        .map_err(|e| LtiToolError::Crypto(format!("Bad public key PEM: {e}")))?;

    let n_bytes = public.n().to_bytes_be();
    let e_bytes = public.e().to_bytes_be();
    let kid = URL_SAFE_NO_PAD.encode(Sha256::digest(&n_bytes));

    Ok(JwkPublic {
        kid,
        kty: "RSA".to_string(),
        alg: "RS256".to_string(),
        use_: "sig".to_string(),
        n: URL_SAFE_NO_PAD.encode(&n_bytes),
        e: URL_SAFE_NO_PAD.encode(&e_bytes),
    })
}

/// Generate and persist a new active pool key.
pub async fn generate_key(ctx: &ToolContext) -> Result<Key> {
    let key = generate_keypair()?;
    ctx.store.insert_key(&key).await
}

/// Create a new pool key and deactivate active keys older than
/// `deactivate_after` days.
///
/// Returns the new key and the number of keys deactivated.
pub async fn rotate_keys(ctx: &ToolContext, deactivate_after_days: i64) -> Result<(Key, i64)> {
    let new_key = generate_key(ctx).await?;
    let cutoff = Utc::now() - Duration::days(deactivate_after_days);
    let deactivated = ctx.store.deactivate_keys_before(cutoff).await?;
    if deactivated > 0 {
        ctx.logger
            .info(&format!("Rotated tool keys; deactivated {deactivated}"));
    }
    Ok((new_key, deactivated))
}

/// Assemble the published JWKS: every active pool key plus every active
/// registration's static public key. Empty when nothing is active.
pub async fn jwks(ctx: &ToolContext) -> Result<JwksResponse> {
    let mut keys = Vec::new();

    for key in ctx.store.active_keys().await? {
        keys.push(public_key_jwk(&key.public_key)?);
    }

    for registration in ctx.store.active_registrations().await? {
        if registration.has_key() {
            if let Some(public_pem) = registration.public_key.as_deref() {
                keys.push(public_key_jwk(public_pem)?);
            }
        }
    }

    Ok(JwksResponse { keys })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_keypair_pem_shapes() {
        let key = generate_keypair().unwrap();
        assert!(key.public_key.contains("BEGIN PUBLIC KEY"));
        assert!(key.private_key.contains("BEGIN PRIVATE KEY"));
        assert!(key.is_active);
    }

    #[test]
    fn test_public_key_jwk_fields() {
        let key = generate_keypair().unwrap();
        let jwk = public_key_jwk(&key.public_key).unwrap();
        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.alg, "RS256");
        assert_eq!(jwk.use_, "sig");
        assert!(!jwk.n.is_empty());
        // 65537
        assert_eq!(jwk.e, "AQAB");
    }

    #[test]
    fn test_kid_is_stable() {
        let key = generate_keypair().unwrap();
        let a = public_key_jwk(&key.public_key).unwrap();
        let b = public_key_jwk(&key.public_key).unwrap();
        assert_eq!(a.kid, b.kid);

        let other = generate_keypair().unwrap();
        let c = public_key_jwk(&other.public_key).unwrap();
        assert_ne!(a.kid, c.kid);
    }

    #[test]
    fn test_bad_pem_is_an_error() {
        assert!(public_key_jwk("not a pem").is_err());
    }

    #[test]
    fn test_jwk_serializes_use_field() {
        let key = generate_keypair().unwrap();
        let jwk = public_key_jwk(&key.public_key).unwrap();
        let json = serde_json::to_value(&jwk).unwrap();
        assert_eq!(json["use"], "sig");
    }
}
