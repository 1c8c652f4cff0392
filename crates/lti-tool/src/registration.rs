// Registration and deployment resolution.
//
// Two lookup paths, selected by which identifiers the inbound request
// supplies: issuer-only initiation needs the registration uuid correlation
// key; the standard path looks up (issuer, client_id), optionally
// constrained by uuid. Both require the registration to be active.

use lti_tool_core::db::models::{LtiDeployment, LtiRegistration};
use lti_tool_core::error::{LtiErrorCode, LtiToolError, ProtocolError, Result};
use lti_tool_core::options::DeploymentPolicy;

use crate::context::ToolContext;
use crate::crypto::jwt::PlatformJwks;
use crate::crypto::keys::public_key_jwk;

/// The trust material derived from a resolved registration: everything the
/// validator and service clients need without touching the row again.
#[derive(Debug, Clone)]
pub struct KeyMaterial {
    pub issuer: String,
    pub client_id: String,
    /// Fixed token audience override; token_url otherwise.
    pub audience: Option<String>,
    pub auth_url: String,
    pub token_url: String,
    pub keyset_url: String,
    /// Tool signing keypair (PEM) and the kid it publishes under.
    pub tool_public_key: String,
    pub tool_private_key: String,
    pub tool_kid: String,
}

/// Resolve the active registration for an inbound request.
///
/// With no client_id the uuid correlation key is mandatory, since an issuer
/// alone cannot disambiguate multi-registration platforms.
pub async fn resolve_registration(
    ctx: &ToolContext,
    issuer: &str,
    client_id: Option<&str>,
    registration_uuid: Option<&str>,
) -> Result<LtiRegistration> {
    let found = match (client_id, registration_uuid) {
        (Some(client_id), uuid) => {
            ctx.store
                .find_active_registration(issuer, client_id, uuid)
                .await?
        }
        (None, Some(uuid)) => ctx.store.find_active_registration_by_uuid(uuid, issuer).await?,
        (None, None) => None,
    };

    found.ok_or_else(|| {
        ctx.logger
            .warn(&format!("No active registration for issuer {issuer}"));
        ProtocolError::with_detail(LtiErrorCode::RegistrationNotFound, format!("issuer={issuer}"))
            .into()
    })
}

/// Resolve the deployment named by a validated launch.
///
/// Under `Strict` an unknown deployment fails the launch; under
/// `AutoCreate` an inactive placeholder row is created and returned;
/// activation stays a separate administrative action, and launches against
/// the placeholder are halted downstream.
pub async fn resolve_deployment(
    ctx: &ToolContext,
    registration: &LtiRegistration,
    deployment_id: &str,
) -> Result<LtiDeployment> {
    if let Some(deployment) = ctx
        .store
        .find_deployment(&registration.id, deployment_id)
        .await?
    {
        return Ok(deployment);
    }

    match ctx.options.deployment_policy {
        DeploymentPolicy::Strict => Err(ProtocolError::with_detail(
            LtiErrorCode::DeploymentNotFound,
            format!("deployment_id={deployment_id}"),
        )
        .into()),
        DeploymentPolicy::AutoCreate => {
            ctx.logger.info(&format!(
                "Auto-creating inactive deployment {deployment_id} for {}",
                registration.issuer
            ));
            let placeholder = LtiDeployment::new(registration.id.clone(), deployment_id);
            ctx.store.insert_deployment(&placeholder).await
        }
    }
}

/// Administrative activation of a (typically auto-created) deployment.
pub async fn activate_deployment(ctx: &ToolContext, deployment_id: &str) -> Result<LtiDeployment> {
    ctx.store.set_deployment_active(deployment_id, true).await
}

/// Build the key material for a registration.
///
/// Tool key precedence: the registration's own keypair when both halves
/// are present, else the newest active pool key. A registration with
/// neither is unusable and reported as a configuration error.
pub async fn key_material(ctx: &ToolContext, registration: &LtiRegistration) -> Result<KeyMaterial> {
    let (tool_public_key, tool_private_key) = if registration.has_key() {
        (
            registration.public_key.clone().unwrap_or_default(),
            registration.private_key.clone().unwrap_or_default(),
        )
    } else {
        let key = ctx.store.latest_active_key().await?.ok_or_else(|| {
            LtiToolError::Config(format!(
                "Registration {} has no keypair and the key pool is empty; \
                 generate a tool key before accepting launches",
                registration.uuid
            ))
        })?;
        (key.public_key, key.private_key)
    };

    let tool_kid = public_key_jwk(&tool_public_key)?.kid;

    Ok(KeyMaterial {
        issuer: registration.issuer.clone(),
        client_id: registration.client_id.clone(),
        audience: registration.audience.clone(),
        auth_url: registration.auth_url.clone(),
        token_url: registration.token_url.clone(),
        keyset_url: registration.keyset_url.clone(),
        tool_public_key,
        tool_private_key,
        tool_kid,
    })
}

/// Obtain the platform's verification key set.
///
/// A key set cached on the registration wins; otherwise the keyset_url is
/// fetched. A launch validated against a key that is rotated out moments
/// later stays valid: verification happens against the set as retrieved
/// here, never retroactively.
pub async fn platform_jwks(
    ctx: &ToolContext,
    registration: &LtiRegistration,
) -> Result<PlatformJwks> {
    if let Some(cached) = registration.platform_jwks.as_ref() {
        return PlatformJwks::from_value(cached);
    }

    let response = ctx
        .http
        .get(&registration.keyset_url)
        .send()
        .await
        .map_err(|e| {
            LtiToolError::from(ProtocolError::with_detail(
                LtiErrorCode::KeysetUnavailable,
                format!("Fetch of {} failed: {e}", registration.keyset_url),
            ))
        })?;

    if !response.status().is_success() {
        return Err(ProtocolError::with_detail(
            LtiErrorCode::KeysetUnavailable,
            format!("{} returned {}", registration.keyset_url, response.status()),
        )
        .into());
    }

    let document: serde_json::Value = response.json().await.map_err(|e| {
        LtiToolError::from(ProtocolError::with_detail(
            LtiErrorCode::KeysetUnavailable,
            format!("Malformed key set response: {e}"),
        ))
    })?;

    PlatformJwks::from_value(&document)
}

