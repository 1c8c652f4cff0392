// Launch claim keys and typed accessors.
//
// Claims travel as a flat string-keyed JSON map inside the id_token. The
// map stays untyped at the boundary; everything downstream reads it through
// `LaunchData`, which wraps extraction per named claim so no other module
// touches raw values.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Claim URI keys defined by the LTI 1.3 core and service specifications.
pub mod keys {
    pub const MESSAGE_TYPE: &str = "https://purl.imsglobal.org/spec/lti/claim/message_type";
    pub const VERSION: &str = "https://purl.imsglobal.org/spec/lti/claim/version";
    pub const DEPLOYMENT_ID: &str = "https://purl.imsglobal.org/spec/lti/claim/deployment_id";
    pub const TARGET_LINK_URI: &str = "https://purl.imsglobal.org/spec/lti/claim/target_link_uri";
    pub const ROLES: &str = "https://purl.imsglobal.org/spec/lti/claim/roles";
    pub const CONTEXT: &str = "https://purl.imsglobal.org/spec/lti/claim/context";
    pub const RESOURCE_LINK: &str = "https://purl.imsglobal.org/spec/lti/claim/resource_link";
    pub const TOOL_PLATFORM: &str = "https://purl.imsglobal.org/spec/lti/claim/tool_platform";
    pub const LAUNCH_PRESENTATION: &str =
        "https://purl.imsglobal.org/spec/lti/claim/launch_presentation";
    pub const CUSTOM: &str = "https://purl.imsglobal.org/spec/lti/claim/custom";
    pub const LIS: &str = "https://purl.imsglobal.org/spec/lti/claim/lis";
    pub const LTI1P1: &str = "https://purl.imsglobal.org/spec/lti/claim/lti1p1";
    pub const FOR_USER: &str = "https://purl.imsglobal.org/spec/lti/claim/for_user";
    pub const NRPS: &str = "https://purl.imsglobal.org/spec/lti-nrps/claim/namesroleservice";
    pub const AGS_ENDPOINT: &str = "https://purl.imsglobal.org/spec/lti-ags/claim/endpoint";
    pub const DEEP_LINKING_SETTINGS: &str =
        "https://purl.imsglobal.org/spec/lti-dl/claim/deep_linking_settings";
}

/// The four supported launch message types, plus nothing else.
///
/// Message types outside this set are a distinct failure mode
/// (`UnsupportedMessageType`), never coerced into a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    ResourceLink,
    DeepLinking,
    SubmissionReview,
    DataPrivacy,
}

impl MessageType {
    /// Parse the message-type claim value. Unknown strings yield `None`.
    pub fn from_claim(value: &str) -> Option<Self> {
        match value {
            "LtiResourceLinkRequest" => Some(Self::ResourceLink),
            "LtiDeepLinkingRequest" => Some(Self::DeepLinking),
            "LtiSubmissionReviewRequest" => Some(Self::SubmissionReview),
            "DataPrivacyLaunchRequest" => Some(Self::DataPrivacy),
            _ => None,
        }
    }

    pub fn as_claim(&self) -> &'static str {
        match self {
            Self::ResourceLink => "LtiResourceLinkRequest",
            Self::DeepLinking => "LtiDeepLinkingRequest",
            Self::SubmissionReview => "LtiSubmissionReviewRequest",
            Self::DataPrivacy => "DataPrivacyLaunchRequest",
        }
    }
}

/// The context claim block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextClaim {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "type")]
    pub context_types: Vec<String>,
}

/// The resource link claim block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceLinkClaim {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// The AGS endpoint claim block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgsEndpointClaim {
    #[serde(default)]
    pub scope: Vec<String>,
    #[serde(default)]
    pub lineitems: Option<String>,
    #[serde(default)]
    pub lineitem: Option<String>,
}

/// The NRPS claim block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NrpsClaim {
    pub context_memberships_url: String,
    #[serde(default)]
    pub service_versions: Vec<String>,
}

/// The platform instance (tool_platform) claim block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformInstanceClaim {
    pub guid: String,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub product_family_code: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// The launch presentation claim block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LaunchPresentationClaim {
    #[serde(default)]
    pub document_target: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub return_url: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
}

/// The LTI 1.1 migration claim block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationClaim {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub oauth_consumer_key: Option<String>,
    #[serde(default)]
    pub oauth_consumer_key_sign: Option<String>,
    #[serde(default)]
    pub resource_link_id: Option<String>,
}

/// A validated launch claim set with typed accessors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchData(serde_json::Map<String, Value>);

impl LaunchData {
    pub fn new(claims: serde_json::Map<String, Value>) -> Self {
        Self(claims)
    }

    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Raw claim lookup by URI or bare key.
    pub fn get(&self, claim: &str) -> Option<&Value> {
        self.0.get(claim)
    }

    pub fn get_str(&self, claim: &str) -> Option<&str> {
        self.get(claim).and_then(Value::as_str)
    }

    fn get_typed<T: serde::de::DeserializeOwned>(&self, claim: &str) -> Option<T> {
        self.get(claim)
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
    }

    pub fn as_map(&self) -> &serde_json::Map<String, Value> {
        &self.0
    }

    // ── Registered JWT claims ────────────────────────────────────

    pub fn iss(&self) -> Option<&str> {
        self.get_str("iss")
    }

    pub fn sub(&self) -> Option<&str> {
        self.get_str("sub")
    }

    pub fn exp(&self) -> Option<i64> {
        self.get("exp").and_then(Value::as_i64)
    }

    pub fn nonce(&self) -> Option<&str> {
        self.get_str("nonce")
    }

    /// Audience values, tolerating both the single-string and array forms.
    pub fn aud_values(&self) -> Vec<String> {
        match self.get("aud") {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(arr)) => arr
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// The first audience value, used as the client id in single-audience
    /// tokens.
    pub fn primary_aud(&self) -> Option<String> {
        self.aud_values().into_iter().next()
    }

    // ── User identity claims ─────────────────────────────────────

    pub fn given_name(&self) -> Option<&str> {
        self.get_str("given_name")
    }

    pub fn family_name(&self) -> Option<&str> {
        self.get_str("family_name")
    }

    pub fn name(&self) -> Option<&str> {
        self.get_str("name")
    }

    pub fn email(&self) -> Option<&str> {
        self.get_str("email")
    }

    pub fn picture(&self) -> Option<&str> {
        self.get_str("picture")
    }

    // ── LTI claims ───────────────────────────────────────────────

    pub fn message_type(&self) -> Option<MessageType> {
        self.get_str(keys::MESSAGE_TYPE).and_then(MessageType::from_claim)
    }

    /// The raw message-type string, for error reporting on unknown types.
    pub fn message_type_raw(&self) -> Option<&str> {
        self.get_str(keys::MESSAGE_TYPE)
    }

    pub fn deployment_id(&self) -> Option<&str> {
        self.get_str(keys::DEPLOYMENT_ID)
    }

    pub fn target_link_uri(&self) -> Option<&str> {
        self.get_str(keys::TARGET_LINK_URI)
    }

    pub fn roles(&self) -> Vec<String> {
        match self.get(keys::ROLES) {
            Some(Value::Array(arr)) => arr
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn context(&self) -> Option<ContextClaim> {
        self.get_typed(keys::CONTEXT)
    }

    pub fn resource_link(&self) -> Option<ResourceLinkClaim> {
        self.get_typed(keys::RESOURCE_LINK)
    }

    pub fn platform_instance(&self) -> Option<PlatformInstanceClaim> {
        self.get_typed(keys::TOOL_PLATFORM)
    }

    pub fn launch_presentation(&self) -> Option<LaunchPresentationClaim> {
        self.get_typed(keys::LAUNCH_PRESENTATION)
    }

    pub fn nrps(&self) -> Option<NrpsClaim> {
        self.get_typed(keys::NRPS)
    }

    pub fn ags_endpoint(&self) -> Option<AgsEndpointClaim> {
        self.get_typed(keys::AGS_ENDPOINT)
    }

    pub fn migration(&self) -> Option<MigrationClaim> {
        self.get_typed(keys::LTI1P1)
    }

    /// A single custom claim value by bare name.
    pub fn custom(&self, name: &str) -> Option<&str> {
        self.get(keys::CUSTOM)
            .and_then(|custom| custom.get(name))
            .and_then(Value::as_str)
    }

    /// The LIS claim block (person/course sourcedids), kept raw because its
    /// shape varies widely across platforms.
    pub fn lis(&self) -> Option<&Value> {
        self.get(keys::LIS)
    }

    /// The subject a submission-review launch is about.
    pub fn for_user(&self) -> Option<&Value> {
        self.get(keys::FOR_USER)
    }

    /// Deep-linking settings carried by a deep-linking request.
    pub fn deep_linking_settings(&self) -> Option<&Value> {
        self.get(keys::DEEP_LINKING_SETTINGS)
    }
}
