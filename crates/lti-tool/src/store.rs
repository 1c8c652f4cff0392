// Typed persistence layer over the raw JSON-value adapter.
//
// Every upsert follows the same get-or-create-or-update shape: look up by
// natural key, update on hit, insert on miss, and fall back to an update
// when a concurrent insert wins the race (surfaced by the backend as a
// uniqueness violation).

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};

use lti_tool_core::db::adapter::{
    is_unique_violation, Adapter, FindManyQuery, Operator, SortBy, SortDirection, WhereClause,
};
use lti_tool_core::db::models::{
    from_row, model, to_row, Key, LtiContext, LtiDeployment, LtiLineItem, LtiMembership,
    LtiPlatformInstance, LtiRegistration, LtiResourceLink, LtiUser,
};
use lti_tool_core::error::{LtiToolError, Result};

/// Typed store shared through the tool context.
#[derive(Clone)]
pub struct ToolStore {
    adapter: Arc<dyn Adapter>,
}

impl std::fmt::Debug for ToolStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolStore").finish()
    }
}

/// Merge `updatedAt` into an update payload.
fn stamped(mut data: Value) -> Value {
    if let Some(obj) = data.as_object_mut() {
        obj.insert("updatedAt".into(), json!(Utc::now()));
    }
    data
}

impl ToolStore {
    pub fn new(adapter: Arc<dyn Adapter>) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &Arc<dyn Adapter> {
        &self.adapter
    }

    /// Shared upsert: update by natural key, insert on miss, retry the
    /// update when a racing insert hits the uniqueness constraint first.
    async fn upsert(
        &self,
        model: &str,
        key: &[WhereClause],
        insert_row: Value,
        update_data: Value,
    ) -> Result<Value> {
        if let Some(updated) = self
            .adapter
            .update(model, key, stamped(update_data.clone()))
            .await?
        {
            return Ok(updated);
        }

        match self.adapter.create(model, insert_row).await {
            Ok(created) => Ok(created),
            Err(err) if is_unique_violation(&err) => self
                .adapter
                .update(model, key, stamped(update_data))
                .await?
                .ok_or(err),
            Err(err) => Err(err),
        }
    }

    // ── Registrations ────────────────────────────────────────────

    pub async fn insert_registration(&self, registration: &LtiRegistration) -> Result<LtiRegistration> {
        let row = self.adapter.create(model::REGISTRATION, to_row(registration)?).await?;
        from_row(row)
    }

    /// Lookup for OIDC initiation without a client_id: the registration
    /// uuid disambiguates issuers with multiple registrations.
    pub async fn find_active_registration_by_uuid(
        &self,
        uuid: &str,
        issuer: &str,
    ) -> Result<Option<LtiRegistration>> {
        let row = self
            .adapter
            .find_one(
                model::REGISTRATION,
                &[
                    WhereClause::eq("uuid", uuid),
                    WhereClause::eq("issuer", issuer),
                    WhereClause::eq("isActive", true),
                ],
            )
            .await?;
        row.map(from_row).transpose()
    }

    /// Standard lookup by (issuer, client_id), optionally constrained by
    /// the registration uuid when one is scoped into the request path.
    pub async fn find_active_registration(
        &self,
        issuer: &str,
        client_id: &str,
        uuid: Option<&str>,
    ) -> Result<Option<LtiRegistration>> {
        let mut clauses = vec![
            WhereClause::eq("issuer", issuer),
            WhereClause::eq("clientId", client_id),
            WhereClause::eq("isActive", true),
        ];
        if let Some(uuid) = uuid {
            clauses.push(WhereClause::eq("uuid", uuid));
        }
        let row = self.adapter.find_one(model::REGISTRATION, &clauses).await?;
        row.map(from_row).transpose()
    }

    pub async fn find_registration_by_id(&self, id: &str) -> Result<Option<LtiRegistration>> {
        let row = self
            .adapter
            .find_one(model::REGISTRATION, &[WhereClause::eq("id", id)])
            .await?;
        row.map(from_row).transpose()
    }

    /// Active registrations, for JWKS assembly.
    pub async fn active_registrations(&self) -> Result<Vec<LtiRegistration>> {
        let rows = self
            .adapter
            .find_many(
                model::REGISTRATION,
                FindManyQuery {
                    where_clauses: vec![WhereClause::eq("isActive", true)],
                    ..Default::default()
                },
            )
            .await?;
        rows.into_iter().map(from_row).collect()
    }

    // ── Deployments ──────────────────────────────────────────────

    pub async fn insert_deployment(&self, deployment: &LtiDeployment) -> Result<LtiDeployment> {
        let row = self.adapter.create(model::DEPLOYMENT, to_row(deployment)?).await?;
        from_row(row)
    }

    pub async fn find_deployment(
        &self,
        registration_id: &str,
        deployment_id: &str,
    ) -> Result<Option<LtiDeployment>> {
        let row = self
            .adapter
            .find_one(
                model::DEPLOYMENT,
                &[
                    WhereClause::eq("registrationId", registration_id),
                    WhereClause::eq("deploymentId", deployment_id),
                ],
            )
            .await?;
        row.map(from_row).transpose()
    }

    /// Flip a deployment's active flag. This is the administrative action
    /// that turns an auto-created placeholder into a launchable deployment.
    pub async fn set_deployment_active(&self, id: &str, is_active: bool) -> Result<LtiDeployment> {
        let row = self
            .adapter
            .update(
                model::DEPLOYMENT,
                &[WhereClause::eq("id", id)],
                stamped(json!({ "isActive": is_active })),
            )
            .await?
            .ok_or_else(|| LtiToolError::Database(format!("Deployment {id} not found")))?;
        from_row(row)
    }

    pub async fn set_deployment_platform_instance(
        &self,
        id: &str,
        platform_instance_id: &str,
    ) -> Result<()> {
        self.adapter
            .update(
                model::DEPLOYMENT,
                &[WhereClause::eq("id", id)],
                stamped(json!({ "platformInstanceId": platform_instance_id })),
            )
            .await?;
        Ok(())
    }

    // ── Users ────────────────────────────────────────────────────

    /// Sparse-merge upsert by (registration, sub): only the fields present
    /// in `fields` overwrite existing values.
    pub async fn upsert_user(
        &self,
        registration_id: &str,
        sub: &str,
        fields: Value,
    ) -> Result<LtiUser> {
        let now = Utc::now();
        let mut insert_row = json!({
            "id": uuid::Uuid::new_v4().to_string(),
            "registrationId": registration_id,
            "sub": sub,
            "createdAt": now,
            "updatedAt": now,
        });
        if let (Some(row), Some(extra)) = (insert_row.as_object_mut(), fields.as_object()) {
            for (k, v) in extra {
                row.insert(k.clone(), v.clone());
            }
        }

        let key = [
            WhereClause::eq("registrationId", registration_id),
            WhereClause::eq("sub", sub),
        ];
        let row = self.upsert(model::USER, &key, insert_row, fields).await?;
        from_row(row)
    }

    pub async fn find_user(&self, registration_id: &str, sub: &str) -> Result<Option<LtiUser>> {
        let row = self
            .adapter
            .find_one(
                model::USER,
                &[
                    WhereClause::eq("registrationId", registration_id),
                    WhereClause::eq("sub", sub),
                ],
            )
            .await?;
        row.map(from_row).transpose()
    }

    // ── Contexts ─────────────────────────────────────────────────

    /// Upsert by (deployment, id_on_platform). `fields` is the full set of
    /// claim-derived columns for this sync.
    pub async fn upsert_context(
        &self,
        deployment_id: &str,
        id_on_platform: &str,
        fields: Value,
    ) -> Result<LtiContext> {
        let now = Utc::now();
        let mut insert_row = json!({
            "id": uuid::Uuid::new_v4().to_string(),
            "deploymentId": deployment_id,
            "idOnPlatform": id_on_platform,
            "createdAt": now,
            "updatedAt": now,
        });
        if let (Some(row), Some(extra)) = (insert_row.as_object_mut(), fields.as_object()) {
            for (k, v) in extra {
                row.insert(k.clone(), v.clone());
            }
        }

        let key = [
            WhereClause::eq("deploymentId", deployment_id),
            WhereClause::eq("idOnPlatform", id_on_platform),
        ];
        let row = self.upsert(model::CONTEXT, &key, insert_row, fields).await?;
        from_row(row)
    }

    pub async fn find_context(
        &self,
        deployment_id: &str,
        id_on_platform: &str,
    ) -> Result<Option<LtiContext>> {
        let row = self
            .adapter
            .find_one(
                model::CONTEXT,
                &[
                    WhereClause::eq("deploymentId", deployment_id),
                    WhereClause::eq("idOnPlatform", id_on_platform),
                ],
            )
            .await?;
        row.map(from_row).transpose()
    }

    // ── Memberships ──────────────────────────────────────────────

    /// Upsert by (user, context) with the complete flag set; callers pass
    /// every flag so the row snapshots the latest claim set.
    pub async fn upsert_membership(
        &self,
        user_id: &str,
        context_id: &str,
        fields: Value,
    ) -> Result<LtiMembership> {
        let now = Utc::now();
        let mut insert_row = json!({
            "id": uuid::Uuid::new_v4().to_string(),
            "userId": user_id,
            "contextId": context_id,
            "isActive": true,
            "createdAt": now,
            "updatedAt": now,
        });
        if let (Some(row), Some(extra)) = (insert_row.as_object_mut(), fields.as_object()) {
            for (k, v) in extra {
                row.insert(k.clone(), v.clone());
            }
        }

        let key = [
            WhereClause::eq("userId", user_id),
            WhereClause::eq("contextId", context_id),
        ];
        let row = self
            .upsert(model::MEMBERSHIP, &key, insert_row, fields)
            .await?;
        from_row(row)
    }

    pub async fn find_membership(
        &self,
        user_id: &str,
        context_id: &str,
    ) -> Result<Option<LtiMembership>> {
        let row = self
            .adapter
            .find_one(
                model::MEMBERSHIP,
                &[
                    WhereClause::eq("userId", user_id),
                    WhereClause::eq("contextId", context_id),
                ],
            )
            .await?;
        row.map(from_row).transpose()
    }

    // ── Resource links ───────────────────────────────────────────

    pub async fn upsert_resource_link(
        &self,
        context_id: &str,
        id_on_platform: &str,
        fields: Value,
    ) -> Result<LtiResourceLink> {
        let now = Utc::now();
        let mut insert_row = json!({
            "id": uuid::Uuid::new_v4().to_string(),
            "contextId": context_id,
            "idOnPlatform": id_on_platform,
            "createdAt": now,
            "updatedAt": now,
        });
        if let (Some(row), Some(extra)) = (insert_row.as_object_mut(), fields.as_object()) {
            for (k, v) in extra {
                row.insert(k.clone(), v.clone());
            }
        }

        let key = [
            WhereClause::eq("contextId", context_id),
            WhereClause::eq("idOnPlatform", id_on_platform),
        ];
        let row = self
            .upsert(model::RESOURCE_LINK, &key, insert_row, fields)
            .await?;
        from_row(row)
    }

    pub async fn find_resource_link(
        &self,
        context_id: &str,
        id_on_platform: &str,
    ) -> Result<Option<LtiResourceLink>> {
        let row = self
            .adapter
            .find_one(
                model::RESOURCE_LINK,
                &[
                    WhereClause::eq("contextId", context_id),
                    WhereClause::eq("idOnPlatform", id_on_platform),
                ],
            )
            .await?;
        row.map(from_row).transpose()
    }

    // ── Platform instances ───────────────────────────────────────

    pub async fn upsert_platform_instance(
        &self,
        issuer: &str,
        guid: &str,
        fields: Value,
    ) -> Result<LtiPlatformInstance> {
        let now = Utc::now();
        let mut insert_row = json!({
            "id": uuid::Uuid::new_v4().to_string(),
            "issuer": issuer,
            "guid": guid,
            "createdAt": now,
            "updatedAt": now,
        });
        if let (Some(row), Some(extra)) = (insert_row.as_object_mut(), fields.as_object()) {
            for (k, v) in extra {
                row.insert(k.clone(), v.clone());
            }
        }

        let key = [WhereClause::eq("issuer", issuer), WhereClause::eq("guid", guid)];
        let row = self
            .upsert(model::PLATFORM_INSTANCE, &key, insert_row, fields)
            .await?;
        from_row(row)
    }

    // ── Line items ───────────────────────────────────────────────

    pub async fn upsert_line_item(
        &self,
        context_id: &str,
        url: &str,
        fields: Value,
    ) -> Result<LtiLineItem> {
        let now = Utc::now();
        let mut insert_row = json!({
            "id": uuid::Uuid::new_v4().to_string(),
            "contextId": context_id,
            "url": url,
            "createdAt": now,
            "updatedAt": now,
        });
        if let (Some(row), Some(extra)) = (insert_row.as_object_mut(), fields.as_object()) {
            for (k, v) in extra {
                row.insert(k.clone(), v.clone());
            }
        }

        let key = [WhereClause::eq("url", url)];
        let row = self.upsert(model::LINE_ITEM, &key, insert_row, fields).await?;
        from_row(row)
    }

    /// Known line-item URLs for a context, for update-only syncs.
    pub async fn line_item_urls(&self, context_id: &str) -> Result<Vec<String>> {
        let rows = self
            .adapter
            .find_many(
                model::LINE_ITEM,
                FindManyQuery {
                    where_clauses: vec![WhereClause::eq("contextId", context_id)],
                    ..Default::default()
                },
            )
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.get("url").and_then(Value::as_str).map(str::to_string))
            .collect())
    }

    // ── Keys ─────────────────────────────────────────────────────

    pub async fn insert_key(&self, key: &Key) -> Result<Key> {
        let row = self.adapter.create(model::KEY, to_row(key)?).await?;
        from_row(row)
    }

    /// The newest active pool key, the default tool signing identity.
    pub async fn latest_active_key(&self) -> Result<Option<Key>> {
        let rows = self
            .adapter
            .find_many(
                model::KEY,
                FindManyQuery {
                    where_clauses: vec![WhereClause::eq("isActive", true)],
                    sort_by: Some(SortBy {
                        field: "createdAt".into(),
                        direction: SortDirection::Desc,
                    }),
                    limit: Some(1),
                    ..Default::default()
                },
            )
            .await?;
        rows.into_iter().next().map(from_row).transpose()
    }

    pub async fn active_keys(&self) -> Result<Vec<Key>> {
        let rows = self
            .adapter
            .find_many(
                model::KEY,
                FindManyQuery {
                    where_clauses: vec![WhereClause::eq("isActive", true)],
                    sort_by: Some(SortBy {
                        field: "createdAt".into(),
                        direction: SortDirection::Desc,
                    }),
                    ..Default::default()
                },
            )
            .await?;
        rows.into_iter().map(from_row).collect()
    }

    /// Deactivate active keys created before the cutoff.
    /// Returns the number of keys deactivated.
    pub async fn deactivate_keys_before(
        &self,
        cutoff: chrono::DateTime<Utc>,
    ) -> Result<i64> {
        let count = self
            .adapter
            .update_many(
                model::KEY,
                &[
                    WhereClause::eq("isActive", true),
                    WhereClause::with_operator("createdAt", json!(cutoff), Operator::Lt),
                ],
                stamped(json!({ "isActive": false })),
            )
            .await?;
        Ok(count)
    }
}
