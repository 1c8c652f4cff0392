// LtiToolOptions: top-level configuration for the tool.

use serde::{Deserialize, Serialize};

/// How unknown deployment IDs arriving on a launch are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeploymentPolicy {
    /// The deployment must already exist; unknown IDs fail the launch.
    Strict,
    /// Unknown IDs create an inactive placeholder awaiting activation.
    AutoCreate,
}

impl Default for DeploymentPolicy {
    fn default() -> Self {
        Self::Strict
    }
}

/// Top-level configuration for the LTI tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LtiToolOptions {
    /// Tool title shown to platform administrators.
    #[serde(default)]
    pub title: String,

    /// Tool description for the configuration manifest.
    #[serde(default)]
    pub description: String,

    /// Public base URL of this tool (e.g. "https://tool.example").
    pub base_url: String,

    /// Path prefix for the LTI endpoints (default: "/lti").
    #[serde(default = "default_base_path")]
    pub base_path: String,

    /// Policy for first-seen deployment IDs.
    #[serde(default)]
    pub deployment_policy: DeploymentPolicy,

    /// Seconds a pending login state stays valid (default: 600).
    #[serde(default = "default_state_ttl")]
    pub state_ttl_secs: u64,

    /// Seconds a validated launch stays reattachable by launch id
    /// (default: 3600).
    #[serde(default = "default_launch_cache_ttl")]
    pub launch_cache_ttl_secs: u64,

    /// Clock leeway applied to token expiry checks (default: 60).
    #[serde(default = "default_jwt_leeway")]
    pub jwt_leeway_secs: u64,

    /// Lifetime of the client assertion sent to platform token endpoints
    /// (default: 300).
    #[serde(default = "default_assertion_ttl")]
    pub access_token_assertion_ttl_secs: u64,

    /// Age in days beyond which rotated pool keys are deactivated
    /// (default: 7).
    #[serde(default = "default_key_max_age")]
    pub key_max_age_days: i64,

    /// Default target link URI advertised in the configuration manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_link_uri: Option<String>,

    /// Placement entries merged into the configuration manifest verbatim.
    #[serde(default)]
    pub placements: Vec<serde_json::Value>,
}

impl LtiToolOptions {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            base_url: base_url.into(),
            base_path: default_base_path(),
            deployment_policy: DeploymentPolicy::default(),
            state_ttl_secs: default_state_ttl(),
            launch_cache_ttl_secs: default_launch_cache_ttl(),
            jwt_leeway_secs: default_jwt_leeway(),
            access_token_assertion_ttl_secs: default_assertion_ttl(),
            key_max_age_days: default_key_max_age(),
            target_link_uri: None,
            placements: Vec::new(),
        }
    }

    /// Absolute URL of the JWKS endpoint.
    pub fn jwks_url(&self) -> String {
        format!("{}{}/jwks.json", self.base_url, self.base_path)
    }

    /// Absolute URL of the OIDC initiation endpoint for a registration.
    pub fn init_url(&self, registration_uuid: &str) -> String {
        format!("{}{}/init/{}", self.base_url, self.base_path, registration_uuid)
    }

    /// Absolute URL of the launch endpoint.
    pub fn launch_url(&self) -> String {
        format!("{}{}/launch", self.base_url, self.base_path)
    }
}

fn default_base_path() -> String {
    "/lti".to_string()
}

fn default_state_ttl() -> u64 {
    600
}

fn default_launch_cache_ttl() -> u64 {
    3600
}

fn default_jwt_leeway() -> u64 {
    60
}

fn default_assertion_ttl() -> u64 {
    300
}

fn default_key_max_age() -> i64 {
    7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = LtiToolOptions::new("https://tool.example");
        assert_eq!(options.base_path, "/lti");
        assert_eq!(options.deployment_policy, DeploymentPolicy::Strict);
        assert_eq!(options.state_ttl_secs, 600);
        assert_eq!(options.key_max_age_days, 7);
    }

    #[test]
    fn test_endpoint_urls() {
        let options = LtiToolOptions::new("https://tool.example");
        assert_eq!(options.jwks_url(), "https://tool.example/lti/jwks.json");
        assert_eq!(
            options.init_url("reg-uuid"),
            "https://tool.example/lti/init/reg-uuid"
        );
        assert_eq!(options.launch_url(), "https://tool.example/lti/launch");
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let options: LtiToolOptions =
            serde_json::from_str(r#"{"baseUrl": "https://tool.example"}"#).unwrap();
        assert_eq!(options.base_url, "https://tool.example");
        assert_eq!(options.launch_cache_ttl_secs, 3600);
        assert_eq!(options.deployment_policy, DeploymentPolicy::Strict);
    }

    #[test]
    fn test_deployment_policy_serde() {
        let json = serde_json::to_string(&DeploymentPolicy::AutoCreate).unwrap();
        assert_eq!(json, "\"autoCreate\"");
    }
}
