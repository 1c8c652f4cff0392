// Launch token verification and tool-side assertion signing.
//
// Platforms sign the id_token with RS256 against their published JWKS; the
// tool signs client assertions with its own RSA key. Both directions go
// through `jsonwebtoken`.

use jsonwebtoken::{
    decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};

use lti_tool_core::claims::LaunchData;
use lti_tool_core::error::{LtiErrorCode, LtiToolError, ProtocolError, Result};

/// One RSA key from a platform JWKS document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformJwk {
    #[serde(default)]
    pub kid: Option<String>,
    pub kty: String,
    #[serde(default)]
    pub alg: Option<String>,
    pub n: String,
    pub e: String,
}

/// A parsed platform key set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformJwks {
    pub keys: Vec<PlatformJwk>,
}

impl PlatformJwks {
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        serde_json::from_value(value.clone()).map_err(|e| {
            ProtocolError::with_detail(
                LtiErrorCode::KeysetUnavailable,
                format!("Malformed platform key set: {e}"),
            )
            .into()
        })
    }

    /// Select the verification key for a token.
    ///
    /// A token kid must match an entry; a token without a kid is accepted
    /// only against a single-key set.
    pub fn decoding_key(&self, token_kid: Option<&str>) -> Result<DecodingKey> {
        let jwk = match token_kid {
            Some(kid) => self
                .keys
                .iter()
                .find(|k| k.kid.as_deref() == Some(kid)),
            None if self.keys.len() == 1 => self.keys.first(),
            None => None,
        }
        .ok_or_else(|| {
            LtiToolError::from(ProtocolError::with_detail(
                LtiErrorCode::UnknownKeyId,
                format!("kid={}", token_kid.unwrap_or("<none>")),
            ))
        })?;

        DecodingKey::from_rsa_components(&jwk.n, &jwk.e).map_err(|e| {
            ProtocolError::with_detail(
                LtiErrorCode::KeysetUnavailable,
                format!("Unusable platform key: {e}"),
            )
            .into()
        })
    }
}

/// Verify a launch id_token against the platform key set.
///
/// Checks signature, issuer, audience (string or array; the match
/// succeeds when the client id appears in either form), and expiry with
/// the given leeway. Returns the full claim set.
pub fn verify_launch_token(
    id_token: &str,
    platform_keys: &PlatformJwks,
    expected_issuer: &str,
    client_id: &str,
    leeway_secs: u64,
) -> Result<LaunchData> {
    let header = decode_header(id_token).map_err(|e| {
        ProtocolError::with_detail(LtiErrorCode::InvalidToken, format!("Bad token header: {e}"))
    })?;

    if header.alg != Algorithm::RS256 {
        return Err(ProtocolError::with_detail(
            LtiErrorCode::InvalidToken,
            format!("Unexpected algorithm {:?}", header.alg),
        )
        .into());
    }

    let key = platform_keys.decoding_key(header.kid.as_deref())?;

    let mut validation = Validation::new(Algorithm::RS256);
    validation.leeway = leeway_secs;
    validation.set_issuer(&[expected_issuer]);
    validation.set_audience(&[client_id]);
    validation.set_required_spec_claims(&["exp", "iss", "aud"]);

    let token_data =
        decode::<serde_json::Value>(id_token, &key, &validation).map_err(|e| {
            let code = match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => LtiErrorCode::TokenExpired,
                jsonwebtoken::errors::ErrorKind::InvalidIssuer => LtiErrorCode::IssuerMismatch,
                jsonwebtoken::errors::ErrorKind::InvalidAudience => LtiErrorCode::AudienceMismatch,
                _ => LtiErrorCode::InvalidToken,
            };
            LtiToolError::from(ProtocolError::with_detail(code, e.to_string()))
        })?;

    LaunchData::from_value(token_data.claims).ok_or_else(|| {
        ProtocolError::with_detail(LtiErrorCode::InvalidToken, "Claims are not an object").into()
    })
}

/// Sign a claim set with the tool's RSA private key (RS256).
///
/// Used for client assertions to platform token endpoints and for any
/// tool-originated message the platform verifies against our JWKS.
pub fn sign_tool_jwt<T: Serialize>(
    claims: &T,
    private_key_pem: &str,
    kid: Option<String>,
) -> Result<String> {
    let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
        .map_err(|e| LtiToolError::Crypto(format!("Bad tool private key: {e}")))?;
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid;
    encode(&header, claims, &key)
        .map_err(|e| LtiToolError::Crypto(format!("JWT signing failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::{generate_keypair, public_key_jwk};
    use lti_tool_core::claims::keys as claim_keys;
    use serde_json::json;

    fn jwks_for(public_pem: &str) -> PlatformJwks {
        let jwk = public_key_jwk(public_pem).unwrap();
        PlatformJwks {
            keys: vec![PlatformJwk {
                kid: Some(jwk.kid),
                kty: jwk.kty,
                alg: Some(jwk.alg),
                n: jwk.n,
                e: jwk.e,
            }],
        }
    }

    fn signed_token(private_pem: &str, kid: Option<String>, claims: serde_json::Value) -> String {
        sign_tool_jwt(&claims, private_pem, kid).unwrap()
    }

    fn base_claims() -> serde_json::Value {
        json!({
            "iss": "https://lms.example",
            "aud": "client-abc",
            "sub": "u1",
            "exp": chrono::Utc::now().timestamp() + 600,
            "iat": chrono::Utc::now().timestamp(),
            "nonce": "n-1",
            (claim_keys::DEPLOYMENT_ID): "dep-1",
        })
    }

    #[test]
    fn test_verify_round_trip() {
        let pair = generate_keypair().unwrap();
        let jwks = jwks_for(&pair.public_key);
        let kid = jwks.keys[0].kid.clone();

        let token = signed_token(&pair.private_key, kid, base_claims());
        let data =
            verify_launch_token(&token, &jwks, "https://lms.example", "client-abc", 60).unwrap();
        assert_eq!(data.sub(), Some("u1"));
        assert_eq!(data.deployment_id(), Some("dep-1"));
    }

    #[test]
    fn test_verify_audience_array() {
        let pair = generate_keypair().unwrap();
        let jwks = jwks_for(&pair.public_key);
        let kid = jwks.keys[0].kid.clone();

        let mut claims = base_claims();
        claims["aud"] = json!(["other-client", "client-abc"]);
        let token = signed_token(&pair.private_key, kid, claims);
        let data =
            verify_launch_token(&token, &jwks, "https://lms.example", "client-abc", 60).unwrap();
        assert_eq!(data.aud_values().len(), 2);
    }

    #[test]
    fn test_verify_wrong_audience() {
        let pair = generate_keypair().unwrap();
        let jwks = jwks_for(&pair.public_key);
        let kid = jwks.keys[0].kid.clone();

        let token = signed_token(&pair.private_key, kid, base_claims());
        let err = verify_launch_token(&token, &jwks, "https://lms.example", "someone-else", 60)
            .unwrap_err();
        assert_eq!(err.protocol_code(), Some(LtiErrorCode::AudienceMismatch));
    }

    #[test]
    fn test_verify_wrong_issuer() {
        let pair = generate_keypair().unwrap();
        let jwks = jwks_for(&pair.public_key);
        let kid = jwks.keys[0].kid.clone();

        let token = signed_token(&pair.private_key, kid, base_claims());
        let err =
            verify_launch_token(&token, &jwks, "https://other.example", "client-abc", 60)
                .unwrap_err();
        assert_eq!(err.protocol_code(), Some(LtiErrorCode::IssuerMismatch));
    }

    #[test]
    fn test_verify_expired_token() {
        let pair = generate_keypair().unwrap();
        let jwks = jwks_for(&pair.public_key);
        let kid = jwks.keys[0].kid.clone();

        let mut claims = base_claims();
        claims["exp"] = json!(chrono::Utc::now().timestamp() - 3600);
        let token = signed_token(&pair.private_key, kid, claims);
        let err = verify_launch_token(&token, &jwks, "https://lms.example", "client-abc", 60)
            .unwrap_err();
        assert_eq!(err.protocol_code(), Some(LtiErrorCode::TokenExpired));
    }

    #[test]
    fn test_verify_wrong_key() {
        let signer = generate_keypair().unwrap();
        let other = generate_keypair().unwrap();
        // JWKS advertises a different key under the signer's kid
        let signer_jwk = public_key_jwk(&signer.public_key).unwrap();
        let other_jwk = public_key_jwk(&other.public_key).unwrap();
        let jwks = PlatformJwks {
            keys: vec![PlatformJwk {
                kid: Some(signer_jwk.kid.clone()),
                kty: other_jwk.kty,
                alg: Some(other_jwk.alg),
                n: other_jwk.n,
                e: other_jwk.e,
            }],
        };

        let token = signed_token(&signer.private_key, Some(signer_jwk.kid), base_claims());
        let err = verify_launch_token(&token, &jwks, "https://lms.example", "client-abc", 60)
            .unwrap_err();
        assert_eq!(err.protocol_code(), Some(LtiErrorCode::InvalidToken));
    }

    #[test]
    fn test_unknown_kid() {
        let pair = generate_keypair().unwrap();
        let jwks = jwks_for(&pair.public_key);

        let token = signed_token(&pair.private_key, Some("mystery-kid".into()), base_claims());
        let err = verify_launch_token(&token, &jwks, "https://lms.example", "client-abc", 60)
            .unwrap_err();
        assert_eq!(err.protocol_code(), Some(LtiErrorCode::UnknownKeyId));
    }

    #[test]
    fn test_no_kid_single_key_set() {
        let pair = generate_keypair().unwrap();
        let jwks = jwks_for(&pair.public_key);

        let token = signed_token(&pair.private_key, None, base_claims());
        let data =
            verify_launch_token(&token, &jwks, "https://lms.example", "client-abc", 60).unwrap();
        assert_eq!(data.iss(), Some("https://lms.example"));
    }

    #[test]
    fn test_jwks_from_malformed_value() {
        let err = PlatformJwks::from_value(&json!({"keys": "nope"})).unwrap_err();
        assert_eq!(err.protocol_code(), Some(LtiErrorCode::KeysetUnavailable));
    }
}
