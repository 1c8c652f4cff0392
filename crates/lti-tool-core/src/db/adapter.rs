// Database adapter trait: the abstraction every storage backend implements.
//
// Adapters work with `serde_json::Value` rows to stay schema-agnostic; the
// typed store layer in the `lti-tool` crate converts between entity records
// and values. Uniqueness constraints on the natural keys (see models) are
// the backend's responsibility; the store layer retries upserts on
// conflict rather than assuming no race.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LtiToolError;

/// Result type for adapter operations.
pub type AdapterResult<T> = std::result::Result<T, LtiToolError>;

// ─── Where Clause ────────────────────────────────────────────────

/// Comparison operators for WHERE clauses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    /// Value is in the given list.
    In,
}

impl Default for Operator {
    fn default() -> Self {
        Self::Eq
    }
}

/// A single WHERE condition. Clauses in a slice are ANDed together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhereClause {
    pub field: String,
    pub value: serde_json::Value,
    #[serde(default)]
    pub operator: Operator,
}

impl WhereClause {
    /// Simple equality filter.
    pub fn eq(field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            operator: Operator::Eq,
        }
    }

    pub fn with_operator(
        field: impl Into<String>,
        value: impl Into<serde_json::Value>,
        operator: Operator,
    ) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            operator,
        }
    }
}

// ─── Sort / Pagination ───────────────────────────────────────────

/// Sort direction for ORDER BY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Sort specification (field + direction).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortBy {
    pub field: String,
    pub direction: SortDirection,
}

/// Query parameters for `find_many`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindManyQuery {
    pub where_clauses: Vec<WhereClause>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<SortBy>,
}

// ─── Adapter Trait ───────────────────────────────────────────────

/// The core database adapter trait.
#[async_trait]
pub trait Adapter: Send + Sync + fmt::Debug {
    /// Create a new record in the given model/table.
    /// Returns the created record with auto-generated fields filled in.
    /// A row violating a uniqueness constraint yields a `Database` error.
    async fn create(
        &self,
        model: &str,
        data: serde_json::Value,
    ) -> AdapterResult<serde_json::Value>;

    /// Find a single record matching the WHERE clauses.
    async fn find_one(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
    ) -> AdapterResult<Option<serde_json::Value>>;

    /// Find records matching the query parameters.
    async fn find_many(
        &self,
        model: &str,
        query: FindManyQuery,
    ) -> AdapterResult<Vec<serde_json::Value>>;

    /// Count records matching the WHERE clauses.
    async fn count(&self, model: &str, where_clauses: &[WhereClause]) -> AdapterResult<i64>;

    /// Update a single record matching the WHERE clauses, merging `data`
    /// into it. Returns the updated record, or `None` on no match.
    async fn update(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
        data: serde_json::Value,
    ) -> AdapterResult<Option<serde_json::Value>>;

    /// Update all records matching the WHERE clauses.
    /// Returns the number of affected rows.
    async fn update_many(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
        data: serde_json::Value,
    ) -> AdapterResult<i64>;

    /// Delete a single record matching the WHERE clauses.
    async fn delete(&self, model: &str, where_clauses: &[WhereClause]) -> AdapterResult<()>;

    /// Delete all records matching the WHERE clauses.
    /// Returns the number of deleted rows.
    async fn delete_many(
        &self,
        model: &str,
        where_clauses: &[WhereClause],
    ) -> AdapterResult<i64>;
}

/// Whether an adapter error reports a uniqueness-constraint violation.
///
/// Backends encode conflicts in their own error text; the store layer uses
/// this to decide when a racing insert should fall back to an update.
pub fn is_unique_violation(err: &LtiToolError) -> bool {
    match err {
        LtiToolError::Database(msg) => {
            let msg = msg.to_lowercase();
            msg.contains("unique") || msg.contains("duplicate") || msg.contains("conflict")
        }
        _ => false,
    }
}
