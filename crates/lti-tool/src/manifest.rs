// Tool configuration manifest: the JSON document a platform consumes
// when registering the tool by URL.

use serde_json::{json, Value};

use lti_tool_core::error::Result;
use lti_tool_core::vocabulary::AgsScope;

use crate::context::ToolContext;

const NRPS_SCOPE: &str =
    "https://purl.imsglobal.org/spec/lti-nrps/scope/contextmembership.readonly";

/// Build the configuration manifest for one registration.
///
/// Hosts typically post-process the returned value to add placements or
/// platform-specific extensions before serving it.
pub fn tool_configuration(ctx: &ToolContext, registration_uuid: &str) -> Result<Value> {
    let options = &ctx.options;

    let mut scopes: Vec<String> = AgsScope::ALL.iter().map(|s| s.uri().to_string()).collect();
    scopes.push(NRPS_SCOPE.to_string());

    let mut config = json!({
        "title": options.title,
        "description": options.description,
        "oidc_initiation_url": options.init_url(registration_uuid),
        "public_jwk_url": options.jwks_url(),
        "scopes": scopes,
    });

    if let Some(target_link_uri) = options.target_link_uri.as_deref() {
        config["target_link_uri"] = json!(target_link_uri);
    }
    if !options.placements.is_empty() {
        config["extensions"] = json!([{ "placements": options.placements }]);
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use lti_tool_core::db::secondary_storage::MemorySecondaryStorage;
    use lti_tool_core::options::LtiToolOptions;
    use lti_tool_memory::MemoryAdapter;

    fn test_ctx(options: LtiToolOptions) -> Arc<ToolContext> {
        ToolContext::new(
            options,
            Arc::new(MemoryAdapter::new()),
            Arc::new(MemorySecondaryStorage::new()),
        )
    }

    #[test]
    fn test_manifest_basics() {
        let mut options = LtiToolOptions::new("https://tool.example");
        options.title = "Example Tool".into();
        options.description = "Does example things.".into();
        let ctx = test_ctx(options);

        let config = tool_configuration(&ctx, "reg-uuid").unwrap();
        assert_eq!(config["title"], "Example Tool");
        assert_eq!(
            config["oidc_initiation_url"],
            "https://tool.example/lti/init/reg-uuid"
        );
        assert_eq!(config["public_jwk_url"], "https://tool.example/lti/jwks.json");
        let scopes = config["scopes"].as_array().unwrap();
        assert_eq!(scopes.len(), 5);
        assert!(config.get("target_link_uri").is_none());
    }

    #[test]
    fn test_manifest_with_target_and_placements() {
        let mut options = LtiToolOptions::new("https://tool.example");
        options.target_link_uri = Some("https://tool.example/lti/launch".into());
        options.placements = vec![json!({"placement": "course_navigation"})];
        let ctx = test_ctx(options);

        let config = tool_configuration(&ctx, "reg-uuid").unwrap();
        assert_eq!(config["target_link_uri"], "https://tool.example/lti/launch");
        assert_eq!(
            config["extensions"][0]["placements"][0]["placement"],
            "course_navigation"
        );
    }
}
