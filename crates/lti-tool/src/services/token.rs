// Platform access tokens via the OAuth2 client-credentials grant.
//
// The tool authenticates with a private-key JWT client assertion signed by
// its RSA key, then caches the returned bearer token for its lifetime so
// back-to-back service calls reuse it.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use lti_tool_core::db::models::LtiRegistration;
use lti_tool_core::db::secondary_storage::SecondaryStorage;
use lti_tool_core::error::{LtiToolError, Result};

use crate::context::ToolContext;
use crate::crypto::jwt::sign_tool_jwt;
use crate::registration::key_material;

const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// A bearer token granted by a platform token endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
    jti: String,
}

fn token_cache_key(registration_id: &str, scopes: &[&str]) -> String {
    let mut sorted: Vec<&str> = scopes.to_vec();
    sorted.sort_unstable();
    format!("lti1p3-token:{registration_id}:{}", sorted.join(" "))
}

/// Obtain a bearer token for the given scopes, reusing a cached one when
/// it has lifetime left.
pub async fn access_token(
    ctx: &ToolContext,
    registration: &LtiRegistration,
    scopes: &[&str],
) -> Result<AccessToken> {
    let cache_key = token_cache_key(&registration.id, scopes);
    if let Some(cached) = ctx.storage.get(&cache_key).await? {
        if let Ok(token) = serde_json::from_str::<AccessToken>(&cached) {
            return Ok(token);
        }
    }

    let material = key_material(ctx, registration).await?;
    let now = Utc::now().timestamp();
    let audience = material.audience.as_deref().unwrap_or(&material.token_url);

    let claims = AssertionClaims {
        iss: &material.client_id,
        sub: &material.client_id,
        aud: audience,
        iat: now,
        exp: now + ctx.options.access_token_assertion_ttl_secs as i64,
        jti: uuid::Uuid::new_v4().to_string(),
    };
    let assertion = sign_tool_jwt(&claims, &material.tool_private_key, Some(material.tool_kid))?;

    let scope = scopes.join(" ");
    let form = [
        ("grant_type", "client_credentials"),
        ("client_assertion_type", CLIENT_ASSERTION_TYPE),
        ("client_assertion", assertion.as_str()),
        ("scope", scope.as_str()),
    ];

    let response = ctx
        .http
        .post(&material.token_url)
        .form(&form)
        .send()
        .await
        .map_err(|e| LtiToolError::Service(format!("Token request failed: {e}")))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(LtiToolError::Service(format!(
            "Token endpoint returned {status}: {body}"
        )));
    }

    let token: AccessToken = response
        .json()
        .await
        .map_err(|e| LtiToolError::Service(format!("Malformed token response: {e}")))?;

    // Cache for the token's lifetime, trimmed so a token never outlives
    // its grant while cached.
    if let Some(expires_in) = token.expires_in {
        if expires_in > 60 {
            if let Ok(encoded) = serde_json::to_string(&token) {
                ctx.storage
                    .set(&cache_key, &encoded, Some((expires_in - 60) as u64))
                    .await?;
            }
        }
    }

    Ok(token)
}
