// In-memory database adapter: a HashMap-based store implementing the core
// Adapter trait.
//
// Stores rows in `HashMap<String, Vec<serde_json::Value>>` keyed by model
// name, thread-safe via `tokio::sync::RwLock`. Data is lost on drop.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use lti_tool_core::db::adapter::{
    Adapter, AdapterResult, FindManyQuery, Operator, SortDirection, WhereClause,
};

/// Type alias for the in-memory store.
type Store = HashMap<String, Vec<serde_json::Value>>;

/// In-memory database adapter.
///
/// Suitable for tests, development, and single-node deployments. Natural-key
/// uniqueness is not enforced here; the typed store layer's find-first
/// upserts keep rows unique under single-node use.
#[derive(Debug, Clone, Default)]
pub struct MemoryAdapter {
    store: Arc<RwLock<Store>>,
}

impl MemoryAdapter {
    /// Create a new empty in-memory adapter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of all data (for debugging/testing).
    pub async fn snapshot(&self) -> Store {
        self.store.read().await.clone()
    }

    /// Clear all data.
    pub async fn clear(&self) {
        self.store.write().await.clear();
    }

    /// Row count for a specific model.
    pub async fn model_count(&self, model: &str) -> usize {
        self.store
            .read()
            .await
            .get(model)
            .map(|v| v.len())
            .unwrap_or(0)
    }
}

/// Check if a record matches every WHERE clause.
fn matches_where(record: &serde_json::Value, clauses: &[WhereClause]) -> bool {
    clauses.iter().all(|clause| {
        let field_val = record
            .get(&clause.field)
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        match_operator(&field_val, &clause.value, &clause.operator)
    })
}

/// Match a single operator condition.
fn match_operator(
    field_val: &serde_json::Value,
    target: &serde_json::Value,
    op: &Operator,
) -> bool {
    match op {
        Operator::Eq => field_val == target,
        Operator::Ne => field_val != target,
        Operator::Lt => compare_json(field_val, target).is_some_and(|c| c < 0),
        Operator::Lte => compare_json(field_val, target).is_some_and(|c| c <= 0),
        Operator::Gt => compare_json(field_val, target).is_some_and(|c| c > 0),
        Operator::Gte => compare_json(field_val, target).is_some_and(|c| c >= 0),
        Operator::In => match target {
            serde_json::Value::Array(arr) => arr.contains(field_val),
            _ => false,
        },
    }
}

/// Compare two JSON values numerically or lexicographically.
fn compare_json(a: &serde_json::Value, b: &serde_json::Value) -> Option<i8> {
    match (a, b) {
        (serde_json::Value::Number(an), serde_json::Value::Number(bn)) => {
            let af = an.as_f64()?;
            let bf = bn.as_f64()?;
            af.partial_cmp(&bf).map(|o| match o {
                std::cmp::Ordering::Less => -1,
                std::cmp::Ordering::Equal => 0,
                std::cmp::Ordering::Greater => 1,
            })
        }
        (serde_json::Value::String(a_s), serde_json::Value::String(b_s)) => {
            Some(match a_s.cmp(b_s) {
                std::cmp::Ordering::Less => -1,
                std::cmp::Ordering::Equal => 0,
                std::cmp::Ordering::Greater => 1,
            })
        }
        _ => None,
    }
}

/// Apply sorting to records.
fn sort_records(records: &mut [serde_json::Value], query: &FindManyQuery) {
    if let Some(ref sort) = query.sort_by {
        records.sort_by(|a, b| {
            let av = a.get(&sort.field);
            let bv = b.get(&sort.field);
            let cmp = match (av, bv) {
                (Some(av), Some(bv)) => compare_json(av, bv).unwrap_or(0),
                (Some(_), None) => 1,
                (None, Some(_)) => -1,
                (None, None) => 0,
            };
            match sort.direction {
                SortDirection::Asc => cmp.cmp(&0),
                SortDirection::Desc => cmp.cmp(&0).reverse(),
            }
        });
    }
}

/// Merge update data into an existing record.
fn merge_update(record: &mut serde_json::Value, data: &serde_json::Value) {
    if let (Some(rec_obj), Some(data_obj)) = (record.as_object_mut(), data.as_object()) {
        for (k, v) in data_obj {
            rec_obj.insert(k.clone(), v.clone());
        }
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    async fn create(
        &self,
        model: &str,
        data: serde_json::Value,
    ) -> AdapterResult<serde_json::Value> {
        let mut record = data;

        // Auto-generate ID if not present
        if record.get("id").map_or(true, |id| id.is_null()) {
            if let Some(obj) = record.as_object_mut() {
                obj.insert(
                    "id".to_string(),
                    serde_json::Value::String(uuid::Uuid::new_v4().to_string()),
                );
            }
        }

        let mut store = self.store.write().await;
        store
            .entry(model.to_string())
            .or_default()
            .push(record.clone());

        Ok(record)
    }

    async fn find_one(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
    ) -> AdapterResult<Option<serde_json::Value>> {
        let store = self.store.read().await;
        Ok(store.get(model).and_then(|recs| {
            recs.iter()
                .find(|r| matches_where(r, where_clauses))
                .cloned()
        }))
    }

    async fn find_many(
        &self,
        model: &str,
        query: FindManyQuery,
    ) -> AdapterResult<Vec<serde_json::Value>> {
        let store = self.store.read().await;
        let empty = Vec::new();
        let records = store.get(model).unwrap_or(&empty);

        let mut result: Vec<serde_json::Value> = records
            .iter()
            .filter(|r| matches_where(r, &query.where_clauses))
            .cloned()
            .collect();

        sort_records(&mut result, &query);

        if let Some(offset) = query.offset {
            if (offset as usize) < result.len() {
                result = result.split_off(offset as usize);
            } else {
                result.clear();
            }
        }

        if let Some(limit) = query.limit {
            result.truncate(limit as usize);
        }

        Ok(result)
    }

    async fn count(&self, model: &str, where_clauses: &[WhereClause]) -> AdapterResult<i64> {
        let store = self.store.read().await;
        let count = store
            .get(model)
            .map(|recs| recs.iter().filter(|r| matches_where(r, where_clauses)).count())
            .unwrap_or(0);
        Ok(count as i64)
    }

    async fn update(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
        data: serde_json::Value,
    ) -> AdapterResult<Option<serde_json::Value>> {
        let mut store = self.store.write().await;
        if let Some(recs) = store.get_mut(model) {
            if let Some(record) = recs.iter_mut().find(|r| matches_where(r, where_clauses)) {
                merge_update(record, &data);
                return Ok(Some(record.clone()));
            }
        }
        Ok(None)
    }

    async fn update_many(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
        data: serde_json::Value,
    ) -> AdapterResult<i64> {
        let mut store = self.store.write().await;
        let mut count = 0i64;
        if let Some(recs) = store.get_mut(model) {
            for record in recs.iter_mut() {
                if matches_where(record, where_clauses) {
                    merge_update(record, &data);
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    async fn delete(&self, model: &str, where_clauses: &[WhereClause]) -> AdapterResult<()> {
        let mut store = self.store.write().await;
        if let Some(recs) = store.get_mut(model) {
            if let Some(pos) = recs.iter().position(|r| matches_where(r, where_clauses)) {
                recs.remove(pos);
            }
        }
        Ok(())
    }

    async fn delete_many(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
    ) -> AdapterResult<i64> {
        let mut store = self.store.write().await;
        if let Some(recs) = store.get_mut(model) {
            let before = recs.len();
            recs.retain(|r| !matches_where(r, where_clauses));
            Ok((before - recs.len()) as i64)
        } else {
            Ok(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lti_tool_core::db::adapter::SortBy;

    #[tokio::test]
    async fn test_create_and_find_one() {
        let adapter = MemoryAdapter::new();
        let data = serde_json::json!({"id": "u1", "sub": "abc123", "email": "a@x.com"});
        adapter.create("ltiUser", data).await.unwrap();

        let found = adapter
            .find_one("ltiUser", &[WhereClause::eq("id", "u1")])
            .await
            .unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap()["sub"], "abc123");
    }

    #[tokio::test]
    async fn test_create_auto_id() {
        let adapter = MemoryAdapter::new();
        let created = adapter
            .create("ltiUser", serde_json::json!({"sub": "u"}))
            .await
            .unwrap();
        assert!(created["id"].is_string());
    }

    #[tokio::test]
    async fn test_find_one_not_found() {
        let adapter = MemoryAdapter::new();
        let found = adapter
            .find_one("ltiUser", &[WhereClause::eq("id", "nope")])
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_find_many_compound_where() {
        let adapter = MemoryAdapter::new();
        for (id, reg, active) in [("d1", "r1", true), ("d2", "r1", false), ("d3", "r2", true)] {
            adapter
                .create(
                    "ltiDeployment",
                    serde_json::json!({"id": id, "registrationId": reg, "isActive": active}),
                )
                .await
                .unwrap();
        }

        let query = FindManyQuery {
            where_clauses: vec![
                WhereClause::eq("registrationId", "r1"),
                WhereClause::eq("isActive", true),
            ],
            ..Default::default()
        };
        let result = adapter.find_many("ltiDeployment", query).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0]["id"], "d1");
    }

    #[tokio::test]
    async fn test_find_many_sorted_desc_with_limit() {
        let adapter = MemoryAdapter::new();
        for (id, created) in [("k1", "2024-01-01"), ("k3", "2024-03-01"), ("k2", "2024-02-01")] {
            adapter
                .create("key", serde_json::json!({"id": id, "createdAt": created}))
                .await
                .unwrap();
        }

        let query = FindManyQuery {
            sort_by: Some(SortBy {
                field: "createdAt".into(),
                direction: SortDirection::Desc,
            }),
            limit: Some(1),
            ..Default::default()
        };
        let result = adapter.find_many("key", query).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0]["id"], "k3");
    }

    #[tokio::test]
    async fn test_count() {
        let adapter = MemoryAdapter::new();
        adapter
            .create("key", serde_json::json!({"id": "k1", "isActive": true}))
            .await
            .unwrap();
        adapter
            .create("key", serde_json::json!({"id": "k2", "isActive": false}))
            .await
            .unwrap();

        assert_eq!(adapter.count("key", &[]).await.unwrap(), 2);
        assert_eq!(
            adapter
                .count("key", &[WhereClause::eq("isActive", true)])
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let adapter = MemoryAdapter::new();
        adapter
            .create(
                "ltiUser",
                serde_json::json!({"id": "u1", "email": "a@x.com", "name": "A"}),
            )
            .await
            .unwrap();

        let updated = adapter
            .update(
                "ltiUser",
                &[WhereClause::eq("id", "u1")],
                serde_json::json!({"name": "B"}),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated["name"], "B");
        // Untouched field survives the merge
        assert_eq!(updated["email"], "a@x.com");
    }

    #[tokio::test]
    async fn test_update_no_match() {
        let adapter = MemoryAdapter::new();
        let updated = adapter
            .update(
                "ltiUser",
                &[WhereClause::eq("id", "missing")],
                serde_json::json!({"name": "B"}),
            )
            .await
            .unwrap();
        assert!(updated.is_none());
    }

    #[tokio::test]
    async fn test_update_many() {
        let adapter = MemoryAdapter::new();
        adapter
            .create("key", serde_json::json!({"id": "k1", "isActive": true}))
            .await
            .unwrap();
        adapter
            .create("key", serde_json::json!({"id": "k2", "isActive": true}))
            .await
            .unwrap();

        let count = adapter
            .update_many("key", &[], serde_json::json!({"isActive": false}))
            .await
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(
            adapter
                .count("key", &[WhereClause::eq("isActive", true)])
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_update_many_lt_operator() {
        let adapter = MemoryAdapter::new();
        for (id, created) in [("k1", "2024-01-01"), ("k2", "2024-06-01")] {
            adapter
                .create(
                    "key",
                    serde_json::json!({"id": id, "createdAt": created, "isActive": true}),
                )
                .await
                .unwrap();
        }

        let count = adapter
            .update_many(
                "key",
                &[WhereClause::with_operator("createdAt", "2024-03-01", Operator::Lt)],
                serde_json::json!({"isActive": false}),
            )
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_delete_and_delete_many() {
        let adapter = MemoryAdapter::new();
        for i in 0..3 {
            adapter
                .create("ltiUser", serde_json::json!({"id": format!("u{i}")}))
                .await
                .unwrap();
        }

        adapter
            .delete("ltiUser", &[WhereClause::eq("id", "u0")])
            .await
            .unwrap();
        assert_eq!(adapter.model_count("ltiUser").await, 2);

        let deleted = adapter.delete_many("ltiUser", &[]).await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(adapter.model_count("ltiUser").await, 0);
    }

    #[tokio::test]
    async fn test_operator_in() {
        let adapter = MemoryAdapter::new();
        for sub in ["a", "b", "c"] {
            adapter
                .create("ltiUser", serde_json::json!({"sub": sub}))
                .await
                .unwrap();
        }

        let clause = WhereClause::with_operator("sub", serde_json::json!(["a", "c"]), Operator::In);
        let result = adapter
            .find_many(
                "ltiUser",
                FindManyQuery {
                    where_clauses: vec![clause],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn test_clear_and_snapshot() {
        let adapter = MemoryAdapter::new();
        adapter
            .create("ltiUser", serde_json::json!({"id": "u1"}))
            .await
            .unwrap();
        let snap = adapter.snapshot().await;
        assert_eq!(snap["ltiUser"].len(), 1);

        adapter.clear().await;
        assert_eq!(adapter.model_count("ltiUser").await, 0);
    }
}
