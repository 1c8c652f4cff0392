// OIDC third-party-initiated login.
//
// The platform opens the flow with issuer + login hint; the tool answers
// with a redirect to the platform's authorization endpoint carrying a
// fresh state/nonce pair. The pair is persisted under the state key so the
// launch endpoint can verify and consume it exactly once.

use serde::{Deserialize, Serialize};

use lti_tool_core::db::secondary_storage::SecondaryStorage;
use lti_tool_core::error::{LtiErrorCode, ProtocolError, Result};

use crate::context::ToolContext;
use crate::crypto::random;
use crate::registration::resolve_registration;

/// Storage key for a pending login state.
pub(crate) fn state_key(state: &str) -> String {
    format!("lti1p3-state:{state}")
}

/// Parameters of an OIDC initiation request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginInitParams {
    pub iss: String,
    pub login_hint: String,
    pub target_link_uri: Option<String>,
    /// Present when the platform includes the tool's client id up front.
    pub client_id: Option<String>,
    pub lti_message_hint: Option<String>,
}

/// What the login endpoint persists until the launch arrives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PendingLogin {
    pub nonce: String,
    pub registration_id: String,
    pub target_link_uri: String,
}

/// The outcome of a successful initiation.
#[derive(Debug, Clone)]
pub struct LoginRedirect {
    /// Fully-built platform authorization URL to redirect the browser to.
    pub redirect_url: String,
    pub state: String,
}

/// Handle an OIDC initiation request.
///
/// A missing `target_link_uri` is rejected before any platform contact.
/// The registration uuid comes from the initiation URL path and is the
/// only disambiguator when the request omits `client_id`.
pub async fn handle_login_init(
    ctx: &ToolContext,
    registration_uuid: Option<&str>,
    params: &LoginInitParams,
) -> Result<LoginRedirect> {
    let target_link_uri = params
        .target_link_uri
        .as_deref()
        .filter(|uri| !uri.is_empty())
        .ok_or_else(|| ProtocolError::new(LtiErrorCode::MissingTargetLinkUri))?;

    let registration = resolve_registration(
        ctx,
        &params.iss,
        params.client_id.as_deref(),
        registration_uuid,
    )
    .await?;

    let state = random::generate_state();
    let nonce = random::generate_nonce();

    let pending = PendingLogin {
        nonce: nonce.clone(),
        registration_id: registration.id.clone(),
        target_link_uri: target_link_uri.to_string(),
    };
    let value = serde_json::to_string(&pending)
        .map_err(|e| lti_tool_core::error::LtiToolError::Database(e.to_string()))?;
    ctx.storage
        .set(&state_key(&state), &value, Some(ctx.options.state_ttl_secs))
        .await?;

    let mut url = url::Url::parse(&registration.auth_url).map_err(|e| {
        lti_tool_core::error::LtiToolError::Config(format!(
            "Registration {} has an unparseable auth URL: {e}",
            registration.uuid
        ))
    })?;

    {
        let mut pairs = url.query_pairs_mut();
        pairs
            .append_pair("scope", "openid")
            .append_pair("response_type", "id_token")
            .append_pair("response_mode", "form_post")
            .append_pair("prompt", "none")
            .append_pair("client_id", &registration.client_id)
            .append_pair("redirect_uri", target_link_uri)
            .append_pair("state", &state)
            .append_pair("nonce", &nonce)
            .append_pair("login_hint", &params.login_hint);
        if let Some(hint) = params.lti_message_hint.as_deref() {
            pairs.append_pair("lti_message_hint", hint);
        }
    }

    ctx.logger.debug(&format!(
        "OIDC initiation for {} redirecting to {}",
        registration.issuer, registration.auth_url
    ));

    Ok(LoginRedirect {
        redirect_url: url.to_string(),
        state,
    })
}

/// Render the auto-submitting form used when third-party cookies are
/// blocked and a plain redirect would lose the session.
pub fn check_cookies_page(redirect_url: &str, main_msg: &str, click_msg: &str) -> String {
    let escaped = redirect_url.replace('"', "&quot;");
    format!(
        "<!DOCTYPE html>\n<html>\n<body onload=\"document.forms[0].submit()\">\n\
         <noscript>\n<p>{main_msg}</p>\n\
         <p><a href=\"{escaped}\">{click_msg}</a></p>\n</noscript>\n\
         <form action=\"{escaped}\" method=\"get\"></form>\n\
         </body>\n</html>\n"
    )
}
