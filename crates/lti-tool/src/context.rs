// Tool context: the fully-initialized configuration shared across request
// handlers as `Arc<ToolContext>`.

use std::sync::Arc;

use lti_tool_core::db::adapter::Adapter;
use lti_tool_core::db::secondary_storage::SecondaryStorage;
use lti_tool_core::logger::LtiLogger;
use lti_tool_core::options::LtiToolOptions;

use crate::store::ToolStore;

/// Shared state for every launch-processing operation.
pub struct ToolContext {
    /// The original configuration options.
    pub options: LtiToolOptions,

    /// Typed persistence layer over the database adapter.
    pub store: ToolStore,

    /// Key-value store for pending states, nonce tombstones, cached
    /// launches and short-lived access tokens.
    pub storage: Arc<dyn SecondaryStorage>,

    /// Structured logger.
    pub logger: LtiLogger,

    /// Outbound HTTP client for platform services (JWKS, token, NRPS, AGS).
    pub http: reqwest::Client,
}

impl ToolContext {
    /// Build a context from options and the two storage collaborators.
    pub fn new(
        options: LtiToolOptions,
        adapter: Arc<dyn Adapter>,
        storage: Arc<dyn SecondaryStorage>,
    ) -> Arc<Self> {
        Arc::new(Self {
            options,
            store: ToolStore::new(adapter),
            storage,
            logger: LtiLogger::default(),
            http: reqwest::Client::new(),
        })
    }

    pub fn with_logger(
        options: LtiToolOptions,
        adapter: Arc<dyn Adapter>,
        storage: Arc<dyn SecondaryStorage>,
        logger: LtiLogger,
    ) -> Arc<Self> {
        Arc::new(Self {
            options,
            store: ToolStore::new(adapter),
            storage,
            logger,
            http: reqwest::Client::new(),
        })
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("base_url", &self.options.base_url)
            .field("deployment_policy", &self.options.deployment_policy)
            .field("logger", &self.logger)
            .finish()
    }
}
