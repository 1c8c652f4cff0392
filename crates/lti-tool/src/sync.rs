// Claim reconciliation: maps a validated launch onto local records.
//
// Runs synchronously once per successful validation, before any
// type-specific handling. Each entity has its own merge rule, mirroring
// how the upstream claim block is structured: user identity claims are
// incrementally disclosable (sparse merge), the resource-link claim is
// always complete (full overwrite), context type flags and membership
// role flags are snapshots recomputed wholesale.

use serde_json::{json, Map, Value};

use lti_tool_core::db::models::{
    LtiContext, LtiMembership, LtiPlatformInstance, LtiResourceLink, LtiUser,
};
use lti_tool_core::error::Result;
use lti_tool_core::vocabulary::{AgsScope, ContextRole, ContextType};

use crate::context::ToolContext;
use crate::launch::message::LtiLaunch;

/// Everything a single launch reconciliation touched.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub user: LtiUser,
    pub context: Option<LtiContext>,
    pub membership: Option<LtiMembership>,
    pub resource_link: Option<LtiResourceLink>,
    pub platform_instance: Option<LtiPlatformInstance>,
}

/// Insert a field only when the claim is present. This is the sparse half of the
/// user merge rule.
fn put_if_present(fields: &mut Map<String, Value>, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        fields.insert(key.to_string(), json!(value));
    }
}

/// Upsert the launch user by (registration, sub).
///
/// Only claims present in the token overwrite fields; an absent claim
/// leaves the stored value untouched.
pub async fn sync_user_from_launch(ctx: &ToolContext, launch: &LtiLaunch) -> Result<LtiUser> {
    let data = launch.data();
    let sub = data.sub().unwrap_or_default();

    let mut fields = Map::new();
    put_if_present(&mut fields, "givenName", data.given_name());
    put_if_present(&mut fields, "familyName", data.family_name());
    put_if_present(&mut fields, "name", data.name());
    put_if_present(&mut fields, "email", data.email());
    put_if_present(&mut fields, "pictureUrl", data.picture());

    // Legacy identifiers ride along only when the migration signature held.
    if launch.migration_verified() {
        if let Some(user_id) = launch.migration_claim().and_then(|m| m.user_id) {
            fields.insert("lti1p1UserId".to_string(), json!(user_id));
        }
    }

    ctx.store
        .upsert_user(&launch.registration().id, sub, Value::Object(fields))
        .await
}

/// Upsert the launch context by (deployment, id_on_platform).
///
/// Launches without a context claim map to the deployment's empty-id
/// context row. Type flags are recomputed wholesale from the claim's type
/// array; NRPS/AGS columns are written only when their claims are present.
pub async fn sync_context_from_launch(ctx: &ToolContext, launch: &LtiLaunch) -> Result<LtiContext> {
    let data = launch.data();
    let nrps_endpoint = data
        .nrps()
        .map(|claim| claim.context_memberships_url)
        .unwrap_or_default();

    let Some(context_claim) = launch.context_claim() else {
        // No context claim: get-or-create the deployment's empty-id row
        if let Some(existing) = ctx.store.find_context(&launch.deployment().id, "").await? {
            return Ok(existing);
        }
        let mut fields = Map::new();
        fields.insert("membershipsUrl".to_string(), json!(nrps_endpoint));
        return ctx
            .store
            .upsert_context(&launch.deployment().id, "", Value::Object(fields))
            .await;
    };

    let types = &context_claim.context_types;
    let mut fields = Map::new();
    fields.insert(
        "title".to_string(),
        json!(context_claim.title.clone().unwrap_or_default()),
    );
    fields.insert(
        "label".to_string(),
        json!(context_claim.label.clone().unwrap_or_default()),
    );
    fields.insert(
        "isCourseTemplate".to_string(),
        json!(types.contains(&ContextType::CourseTemplate.uri())),
    );
    fields.insert(
        "isCourseOffering".to_string(),
        json!(types.contains(&ContextType::CourseOffering.uri())),
    );
    fields.insert(
        "isCourseSection".to_string(),
        json!(types.contains(&ContextType::CourseSection.uri())),
    );
    fields.insert(
        "isGroup".to_string(),
        json!(types.contains(&ContextType::Group.uri())),
    );
    if !nrps_endpoint.is_empty() {
        fields.insert("membershipsUrl".to_string(), json!(nrps_endpoint));
    }

    if let Some(ags) = data.ags_endpoint() {
        fields.insert(
            "lineitemsUrl".to_string(),
            json!(ags.lineitems.clone().unwrap_or_default()),
        );
        fields.insert(
            "canQueryLineitems".to_string(),
            json!(ags.scope.iter().any(|s| s == AgsScope::QueryLineItems.uri())),
        );
        fields.insert(
            "canManageLineitems".to_string(),
            json!(ags.scope.iter().any(|s| s == AgsScope::ManageLineItems.uri())),
        );
        fields.insert(
            "canPublishScores".to_string(),
            json!(ags.scope.iter().any(|s| s == AgsScope::PublishScores.uri())),
        );
        fields.insert(
            "canAccessResults".to_string(),
            json!(ags.scope.iter().any(|s| s == AgsScope::AccessResults.uri())),
        );
    }

    ctx.store
        .upsert_context(
            &launch.deployment().id,
            &context_claim.id,
            Value::Object(fields),
        )
        .await
}

/// Build the five membership flags from a normalized role set.
pub(crate) fn membership_flags(normalized_roles: &[String]) -> Value {
    let has = |role: ContextRole| normalized_roles.contains(&role.uri());
    json!({
        "isAdministrator": has(ContextRole::Administrator),
        "isContentDeveloper": has(ContextRole::ContentDeveloper),
        "isInstructor": has(ContextRole::Instructor),
        "isLearner": has(ContextRole::Learner),
        "isMentor": has(ContextRole::Mentor),
    })
}

/// Upsert the membership row for (user, context).
///
/// Every flag is written on every sync, so the row always snapshots the
/// most recent launch's roles; a role dropped between launches goes
/// false.
pub async fn sync_membership_from_launch(
    ctx: &ToolContext,
    launch: &LtiLaunch,
    user: &LtiUser,
    context: &LtiContext,
) -> Result<LtiMembership> {
    let roles = launch.normalized_roles();
    ctx.store
        .upsert_membership(&user.id, &context.id, membership_flags(&roles))
        .await
}

/// Upsert the resource link by (context, id_on_platform).
///
/// Full overwrite: title and description become empty strings when the
/// claim omits them. Launches without a resource-link claim sync nothing.
pub async fn sync_resource_link_from_launch(
    ctx: &ToolContext,
    launch: &LtiLaunch,
    context: &LtiContext,
) -> Result<Option<LtiResourceLink>> {
    let Some(claim) = launch.resource_link_claim() else {
        return Ok(None);
    };

    let mut fields = Map::new();
    fields.insert("title".to_string(), json!(claim.title.clone().unwrap_or_default()));
    fields.insert(
        "description".to_string(),
        json!(claim.description.clone().unwrap_or_default()),
    );
    if launch.migration_verified() {
        if let Some(legacy_id) = launch.migration_claim().and_then(|m| m.resource_link_id) {
            fields.insert("lti1p1ResourceLinkId".to_string(), json!(legacy_id));
        }
    }

    let link = ctx
        .store
        .upsert_resource_link(&context.id, &claim.id, Value::Object(fields))
        .await?;
    Ok(Some(link))
}

/// Upsert the platform instance by (issuer, guid) and attach it to the
/// launch deployment. Absent claim is a no-op.
pub async fn sync_platform_instance_from_launch(
    ctx: &ToolContext,
    launch: &LtiLaunch,
) -> Result<Option<LtiPlatformInstance>> {
    let Some(claim) = launch.platform_instance_claim() else {
        return Ok(None);
    };
    let issuer = launch.data().iss().unwrap_or_default();

    let fields = json!({
        "contactEmail": claim.contact_email.clone().unwrap_or_default(),
        "description": claim.description.clone().unwrap_or_default(),
        "name": claim.name.clone().unwrap_or_default(),
        "url": claim.url.clone().unwrap_or_default(),
        "productFamilyCode": claim.product_family_code.clone().unwrap_or_default(),
        "version": claim.version.clone().unwrap_or_default(),
    });

    let instance = ctx
        .store
        .upsert_platform_instance(issuer, &claim.guid, fields)
        .await?;
    ctx.store
        .set_deployment_platform_instance(&launch.deployment().id, &instance.id)
        .await?;
    Ok(Some(instance))
}

/// Run the full reconciliation for a validated launch.
///
/// Data-privacy launches persist no context, membership, or resource-link
/// rows for the user; deep-linking launches have no singular resource
/// link. The platform instance is always attempted last.
pub async fn sync_data_from_launch(ctx: &ToolContext, launch: &LtiLaunch) -> Result<SyncOutcome> {
    let user = sync_user_from_launch(ctx, launch).await?;

    let mut context = None;
    let mut membership = None;
    let mut resource_link = None;
    if !launch.is_data_privacy_launch() {
        let synced_context = sync_context_from_launch(ctx, launch).await?;
        membership = Some(sync_membership_from_launch(ctx, launch, &user, &synced_context).await?);
        if !launch.is_deep_link_launch() {
            resource_link = sync_resource_link_from_launch(ctx, launch, &synced_context).await?;
        }
        context = Some(synced_context);
    }

    let platform_instance = sync_platform_instance_from_launch(ctx, launch).await?;

    Ok(SyncOutcome {
        user,
        context,
        membership,
        resource_link,
        platform_instance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership_flags_from_roles() {
        let roles = vec![
            ContextRole::Instructor.uri(),
            ContextRole::Mentor.uri(),
            "http://purl.imsglobal.org/vocab/lis/v2/institution/person#Staff".to_string(),
        ];
        let flags = membership_flags(&roles);
        assert_eq!(flags["isInstructor"], true);
        assert_eq!(flags["isMentor"], true);
        assert_eq!(flags["isLearner"], false);
        assert_eq!(flags["isAdministrator"], false);
    }

    #[test]
    fn test_membership_flags_empty_roles() {
        let flags = membership_flags(&[]);
        for key in [
            "isAdministrator",
            "isContentDeveloper",
            "isInstructor",
            "isLearner",
            "isMentor",
        ] {
            assert_eq!(flags[key], false, "{key} should be false");
        }
    }
}
