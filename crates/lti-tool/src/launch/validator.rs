// Launch validation: the second half of the OIDC flow.
//
// The platform POSTs back a signed id_token plus the state issued at
// initiation. Atomically consuming the pending-state record is the
// single-use gate for the whole exchange: the nonce lives inside that
// record, so a replayed (state, nonce, id_token) triple finds nothing to
// consume and fails. A nonce tombstone additionally blocks a seen nonce
// from riding any other state for the token's remaining lifetime.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use lti_tool_core::claims::LaunchData;
use lti_tool_core::db::secondary_storage::SecondaryStorage;
use lti_tool_core::error::{LtiErrorCode, LtiToolError, ProtocolError, Result};

use crate::context::ToolContext;
use crate::crypto::jwt::verify_launch_token;
use crate::crypto::migration::validate_migration_claim;
use crate::crypto::random::generate_launch_id;
use crate::launch::message::{LaunchSession, LtiLaunch};
use crate::launch::oidc::{state_key, PendingLogin};
use crate::registration::{platform_jwks, resolve_deployment};

fn nonce_key(nonce: &str) -> String {
    format!("lti1p3-nonce:{nonce}")
}

/// The launch endpoint's inputs.
#[derive(Debug, Clone, Deserialize)]
pub struct LaunchRequest {
    pub id_token: String,
    pub state: String,
    /// Registration uuid when the launch URL is path-scoped to one.
    #[serde(default)]
    pub registration_uuid: Option<String>,
}

/// What the launch cache stores under the opaque launch id.
#[derive(Debug, Serialize, Deserialize)]
struct CachedLaunch {
    claims: LaunchData,
    registration_id: String,
    deployment_id: String,
    migration_verified: bool,
}

/// Validate an inbound launch.
///
/// Failure at any step is a protocol error; callers render the absent
/// launch state rather than crashing or passing an unverified claim
/// onward.
pub async fn validate_launch(ctx: &ToolContext, request: &LaunchRequest) -> Result<LtiLaunch> {
    // (a) consume the pending state (single use, atomic)
    let pending = ctx
        .storage
        .take(&state_key(&request.state))
        .await?
        .ok_or_else(|| ProtocolError::new(LtiErrorCode::StateMismatch))?;
    let pending: PendingLogin = serde_json::from_str(&pending)
        .map_err(|e| LtiToolError::Database(format!("Corrupt pending login: {e}")))?;

    // The registration resolved at initiation must still exist and be
    // active at launch time.
    let registration = ctx
        .store
        .find_registration_by_id(&pending.registration_id)
        .await?
        .filter(|r| r.is_active)
        .ok_or_else(|| ProtocolError::new(LtiErrorCode::RegistrationNotFound))?;

    if let Some(uuid) = request.registration_uuid.as_deref() {
        if uuid != registration.uuid {
            return Err(ProtocolError::with_detail(
                LtiErrorCode::RegistrationNotFound,
                "Launch registration does not match the scoped uuid",
            )
            .into());
        }
    }

    // (b) verify signature, issuer, audience, expiry
    let keys = platform_jwks(ctx, &registration).await?;
    let data = verify_launch_token(
        &request.id_token,
        &keys,
        &registration.issuer,
        &registration.client_id,
        ctx.options.jwt_leeway_secs,
    )?;

    // (c) the token nonce must be the one issued with this state, and a
    // nonce seen once is dead for its remaining lifetime
    let token_nonce = data
        .nonce()
        .ok_or_else(|| ProtocolError::with_detail(LtiErrorCode::NonceMismatch, "nonce absent"))?;
    if token_nonce != pending.nonce {
        return Err(ProtocolError::new(LtiErrorCode::NonceMismatch).into());
    }
    let tombstone = nonce_key(token_nonce);
    if ctx.storage.get(&tombstone).await?.is_some() {
        return Err(ProtocolError::new(LtiErrorCode::NonceReused).into());
    }
    let remaining = data
        .exp()
        .map(|exp| exp - Utc::now().timestamp())
        .unwrap_or(0)
        .max(60) as u64;
    ctx.storage
        .set(&tombstone, "used", Some(remaining + ctx.options.jwt_leeway_secs))
        .await?;

    // (d) resolve the deployment named by the token
    let deployment_id = data
        .deployment_id()
        .ok_or_else(|| ProtocolError::new(LtiErrorCode::MissingDeploymentId))?;
    let deployment = resolve_deployment(ctx, &registration, deployment_id).await?;

    // Legacy migration check. A bad signature never fails the launch; it
    // only withholds the 1.1 identifiers from reconciliation.
    let migration_verified = match registration.lti1p1_shared_secret.as_deref() {
        Some(secret) if data.migration().is_some() => {
            let verified = validate_migration_claim(&data, secret);
            if !verified {
                ctx.logger.warn(&format!(
                    "Migration claim signature failed for issuer {}",
                    registration.issuer
                ));
            }
            verified
        }
        _ => false,
    };

    // Cache under a fresh opaque id so same-session requests reattach
    // without re-validating the token.
    let launch_id = generate_launch_id();
    let cached = CachedLaunch {
        claims: data.clone(),
        registration_id: registration.id.clone(),
        deployment_id: deployment.id.clone(),
        migration_verified,
    };
    let value = serde_json::to_string(&cached)
        .map_err(|e| LtiToolError::Database(format!("Launch cache encoding failed: {e}")))?;
    ctx.storage
        .set(&launch_id, &value, Some(ctx.options.launch_cache_ttl_secs))
        .await?;

    ctx.logger.info(&format!(
        "Validated launch {} for issuer {}",
        launch_id, registration.issuer
    ));

    Ok(LtiLaunch::new(
        launch_id,
        data,
        registration,
        deployment,
        migration_verified,
    ))
}

/// Reattach to a previously validated launch by its opaque id.
pub async fn launch_from_cache(ctx: &ToolContext, launch_id: &str) -> Result<LtiLaunch> {
    let cached = ctx
        .storage
        .get(launch_id)
        .await?
        .ok_or_else(|| ProtocolError::new(LtiErrorCode::LaunchNotFound))?;
    let cached: CachedLaunch = serde_json::from_str(&cached)
        .map_err(|e| LtiToolError::Database(format!("Corrupt launch cache entry: {e}")))?;

    let registration = ctx
        .store
        .find_registration_by_id(&cached.registration_id)
        .await?
        .ok_or_else(|| ProtocolError::new(LtiErrorCode::RegistrationNotFound))?;
    let deployment_id = cached
        .claims
        .deployment_id()
        .ok_or_else(|| ProtocolError::new(LtiErrorCode::MissingDeploymentId))?;
    let deployment = ctx
        .store
        .find_deployment(&registration.id, deployment_id)
        .await?
        .ok_or_else(|| ProtocolError::new(LtiErrorCode::DeploymentNotFound))?;

    Ok(LtiLaunch::new(
        launch_id.to_string(),
        cached.claims,
        registration,
        deployment,
        cached.migration_verified,
    ))
}

/// Session-level reattachment: protocol failures become `Absent` instead
/// of surfacing, matching how request middleware consumes launches.
pub async fn session_from_cache(ctx: &ToolContext, launch_id: Option<&str>) -> LaunchSession {
    let Some(launch_id) = launch_id else {
        return LaunchSession::Absent;
    };
    match launch_from_cache(ctx, launch_id).await {
        Ok(launch) => LaunchSession::Present(Box::new(launch)),
        Err(err) => {
            if err.protocol_code().is_none() {
                ctx.logger
                    .error(&format!("Launch cache lookup failed: {err}"));
            }
            LaunchSession::Absent
        }
    }
}
