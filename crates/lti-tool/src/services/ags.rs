// Assignment and Grade Services client: line-item listing, creation, and
// local reconciliation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use lti_tool_core::db::models::{LtiContext, LtiLineItem, LtiRegistration};
use lti_tool_core::error::{LtiToolError, Result};
use lti_tool_core::vocabulary::AgsScope;

use crate::context::ToolContext;
use crate::services::token::access_token;

const LINE_ITEM_CONTAINER_MEDIA_TYPE: &str =
    "application/vnd.ims.lis.v2.lineitemcontainer+json";
const LINE_ITEM_MEDIA_TYPE: &str = "application/vnd.ims.lis.v2.lineitem+json";

/// A line item as exchanged with the platform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    /// The line item URL on the platform; absent only on creation payloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub score_maximum: f64,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_link_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date_time: Option<DateTime<Utc>>,
}

/// The AGS scopes a context's capability flags grant.
pub fn context_scopes(context: &LtiContext) -> Vec<&'static str> {
    let pairs = [
        (context.can_query_lineitems, AgsScope::QueryLineItems),
        (context.can_manage_lineitems, AgsScope::ManageLineItems),
        (context.can_publish_scores, AgsScope::PublishScores),
        (context.can_access_results, AgsScope::AccessResults),
    ];
    pairs
        .into_iter()
        .filter_map(|(granted, scope)| granted.then(|| scope.uri()))
        .collect()
}

fn require_lineitems_url(context: &LtiContext) -> Result<&str> {
    if context.lineitems_url.is_empty() {
        return Err(LtiToolError::Service(format!(
            "Context {} has no AGS line-item container",
            context.id_on_platform
        )));
    }
    Ok(&context.lineitems_url)
}

/// List the platform's line items for a context.
pub async fn get_line_items(
    ctx: &ToolContext,
    registration: &LtiRegistration,
    context: &LtiContext,
) -> Result<Vec<LineItem>> {
    let url = require_lineitems_url(context)?;
    let scopes = context_scopes(context);
    let token = access_token(ctx, registration, &scopes).await?;

    let response = ctx
        .http
        .get(url)
        .bearer_auth(&token.access_token)
        .header(reqwest::header::ACCEPT, LINE_ITEM_CONTAINER_MEDIA_TYPE)
        .send()
        .await
        .map_err(|e| LtiToolError::Service(format!("AGS request failed: {e}")))?;

    if !response.status().is_success() {
        return Err(LtiToolError::Service(format!(
            "AGS endpoint returned {}",
            response.status()
        )));
    }

    response
        .json()
        .await
        .map_err(|e| LtiToolError::Service(format!("Malformed AGS response: {e}")))
}

/// Create a line item in the platform's container.
/// Requires the manage-lineitems capability.
pub async fn create_line_item(
    ctx: &ToolContext,
    registration: &LtiRegistration,
    context: &LtiContext,
    line_item: &LineItem,
) -> Result<LineItem> {
    if !context.can_manage_lineitems {
        return Err(LtiToolError::Service(format!(
            "Context {} was not granted line-item management",
            context.id_on_platform
        )));
    }
    let url = require_lineitems_url(context)?;
    let token = access_token(ctx, registration, &[AgsScope::ManageLineItems.uri()]).await?;

    let response = ctx
        .http
        .post(url)
        .bearer_auth(&token.access_token)
        .header(reqwest::header::CONTENT_TYPE, LINE_ITEM_MEDIA_TYPE)
        .json(line_item)
        .send()
        .await
        .map_err(|e| LtiToolError::Service(format!("AGS create failed: {e}")))?;

    if !response.status().is_success() {
        return Err(LtiToolError::Service(format!(
            "AGS create returned {}",
            response.status()
        )));
    }

    response
        .json()
        .await
        .map_err(|e| LtiToolError::Service(format!("Malformed AGS response: {e}")))
}

/// Upsert one platform line item into the local table, keyed by its URL.
pub async fn sync_line_item(
    ctx: &ToolContext,
    context: &LtiContext,
    line_item: &LineItem,
) -> Result<LtiLineItem> {
    let url = line_item.id.as_deref().ok_or_else(|| {
        LtiToolError::Service("Platform line item is missing its id URL".to_string())
    })?;

    let fields = json!({
        "maximumScore": line_item.score_maximum,
        "label": line_item.label,
        "tag": line_item.tag.clone().unwrap_or_default(),
        "resourceId": line_item.resource_id.clone().unwrap_or_default(),
        "startDateTime": line_item.start_date_time,
        "endDateTime": line_item.end_date_time,
    });

    ctx.store.upsert_line_item(&context.id, url, fields).await
}

/// Fetch all line items for a context and reconcile the local rows.
///
/// With `update_only` set, items the tool has never seen are ignored
/// instead of created.
pub async fn sync_line_items(
    ctx: &ToolContext,
    registration: &LtiRegistration,
    context: &LtiContext,
    update_only: bool,
) -> Result<Vec<LtiLineItem>> {
    let platform_items = get_line_items(ctx, registration, context).await?;

    let known_urls = if update_only {
        ctx.store.line_item_urls(&context.id).await?
    } else {
        Vec::new()
    };

    let mut synced = Vec::new();
    for item in &platform_items {
        if update_only {
            let known = item
                .id
                .as_deref()
                .map(|url| known_urls.iter().any(|k| k == url))
                .unwrap_or(false);
            if !known {
                continue;
            }
        }
        synced.push(sync_line_item(ctx, context, item).await?);
    }
    Ok(synced)
}
