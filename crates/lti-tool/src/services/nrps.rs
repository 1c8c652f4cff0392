// Names and Role Provisioning Service client: roster fetch and membership
// reconciliation.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use lti_tool_core::db::models::{LtiContext, LtiRegistration};
use lti_tool_core::error::{LtiToolError, Result};
use lti_tool_core::vocabulary::normalize_role;

use crate::context::ToolContext;
use crate::services::token::access_token;
use crate::sync::membership_flags;

const NRPS_SCOPE: &str =
    "https://purl.imsglobal.org/spec/lti-nrps/scope/contextmembership.readonly";
const NRPS_MEDIA_TYPE: &str = "application/vnd.ims.lti-nrps.v2.membershipcontainer+json";

/// One member entry from the membership container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub user_id: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MembershipContainer {
    #[serde(default)]
    members: Vec<Member>,
}

/// Pull the next-page URL out of a Link header, if any.
fn next_link(header: Option<&str>) -> Option<String> {
    let header = header?;
    header.split(',').find_map(|part| {
        let (url_part, params) = part.split_once(';')?;
        if params.contains("rel=\"next\"") || params.contains("rel=next") {
            Some(url_part.trim().trim_matches(['<', '>']).to_string())
        } else {
            None
        }
    })
}

/// Fetch the full member list for a context, following pagination.
///
/// A context without a memberships URL (no NRPS claim seen yet) yields an
/// empty roster rather than an error.
pub async fn fetch_member_data(
    ctx: &ToolContext,
    registration: &LtiRegistration,
    context: &LtiContext,
) -> Result<Vec<Member>> {
    if context.memberships_url.is_empty() {
        return Ok(Vec::new());
    }

    let token = access_token(ctx, registration, &[NRPS_SCOPE]).await?;
    let mut members = Vec::new();
    let mut next = Some(context.memberships_url.clone());

    while let Some(url) = next {
        let response = ctx
            .http
            .get(&url)
            .bearer_auth(&token.access_token)
            .header(reqwest::header::ACCEPT, NRPS_MEDIA_TYPE)
            .send()
            .await
            .map_err(|e| LtiToolError::Service(format!("NRPS request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(LtiToolError::Service(format!(
                "NRPS endpoint returned {}",
                response.status()
            )));
        }

        next = response
            .headers()
            .get(reqwest::header::LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| next_link(Some(s)));

        let container: MembershipContainer = response
            .json()
            .await
            .map_err(|e| LtiToolError::Service(format!("Malformed NRPS response: {e}")))?;
        members.extend(container.members);
    }

    Ok(members)
}

/// Apply one roster entry to the user and membership tables.
pub async fn apply_member(
    ctx: &ToolContext,
    registration: &LtiRegistration,
    context: &LtiContext,
    member: &Member,
) -> Result<()> {
    let mut user_fields = Map::new();
    for (key, value) in [
        ("givenName", member.given_name.as_deref()),
        ("familyName", member.family_name.as_deref()),
        ("name", member.name.as_deref()),
        ("email", member.email.as_deref()),
        ("pictureUrl", member.picture.as_deref()),
    ] {
        if let Some(value) = value {
            user_fields.insert(key.to_string(), json!(value));
        }
    }
    let user = ctx
        .store
        .upsert_user(&registration.id, &member.user_id, Value::Object(user_fields))
        .await?;

    let roles: Vec<String> = member.roles.iter().map(|r| normalize_role(r)).collect();
    let mut fields = membership_flags(&roles);
    if let Some(obj) = fields.as_object_mut() {
        obj.insert(
            "isActive".to_string(),
            json!(member.status.as_deref() == Some("Active")),
        );
    }
    ctx.store
        .upsert_membership(&user.id, &context.id, fields)
        .await?;
    Ok(())
}

/// Fetch the roster and reconcile every member.
/// Returns the number of members applied.
pub async fn sync_memberships(
    ctx: &ToolContext,
    registration: &LtiRegistration,
    context: &LtiContext,
) -> Result<usize> {
    let members = fetch_member_data(ctx, registration, context).await?;
    for member in &members {
        apply_member(ctx, registration, context, member).await?;
    }
    ctx.logger.info(&format!(
        "NRPS sync applied {} members to context {}",
        members.len(),
        context.id_on_platform
    ));
    Ok(members.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_link_parsing() {
        let header = "<https://lms.example/members?page=2>; rel=\"next\", \
                      <https://lms.example/members?page=9>; rel=\"last\"";
        assert_eq!(
            next_link(Some(header)),
            Some("https://lms.example/members?page=2".to_string())
        );
    }

    #[test]
    fn test_next_link_absent() {
        assert_eq!(next_link(None), None);
        assert_eq!(
            next_link(Some("<https://lms.example/members?page=1>; rel=\"first\"")),
            None
        );
    }

    #[test]
    fn test_member_deserialization_defaults() {
        let member: Member = serde_json::from_str(r#"{"user_id": "u7"}"#).unwrap();
        assert_eq!(member.user_id, "u7");
        assert!(member.roles.is_empty());
        assert!(member.status.is_none());
    }
}
