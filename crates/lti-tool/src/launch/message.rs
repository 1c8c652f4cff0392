// The validated launch object and its accessor surface.

use serde::{Deserialize, Serialize};

use lti_tool_core::claims::{
    ContextClaim, LaunchData, LaunchPresentationClaim, MessageType, MigrationClaim,
    PlatformInstanceClaim, ResourceLinkClaim,
};
use lti_tool_core::db::models::{LtiDeployment, LtiRegistration};
use lti_tool_core::error::{LtiErrorCode, ProtocolError, Result};
use lti_tool_core::vocabulary::normalize_role;

/// Width and height of the frame the launch is presented in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewportDimensions {
    pub width: u32,
    pub height: u32,
}

/// A successfully validated launch.
///
/// Wraps the verified claim set together with the resolved registration
/// and deployment rows, and is cached under `launch_id` so browser round
/// trips within the same flow can reattach without re-validating.
#[derive(Debug, Clone)]
pub struct LtiLaunch {
    launch_id: String,
    data: LaunchData,
    registration: LtiRegistration,
    deployment: LtiDeployment,
    migration_verified: bool,
}

impl LtiLaunch {
    pub fn new(
        launch_id: String,
        data: LaunchData,
        registration: LtiRegistration,
        deployment: LtiDeployment,
        migration_verified: bool,
    ) -> Self {
        Self {
            launch_id,
            data,
            registration,
            deployment,
            migration_verified,
        }
    }

    pub fn launch_id(&self) -> &str {
        &self.launch_id
    }

    pub fn data(&self) -> &LaunchData {
        &self.data
    }

    pub fn registration(&self) -> &LtiRegistration {
        &self.registration
    }

    pub fn deployment(&self) -> &LtiDeployment {
        &self.deployment
    }

    /// Whether the LTI 1.1 migration claim carried a valid signature.
    /// Launches without a migration claim report `false`.
    pub fn migration_verified(&self) -> bool {
        self.migration_verified
    }

    /// The launch message type, or `UnsupportedMessageType` for anything
    /// outside the four supported kinds.
    pub fn message_type(&self) -> Result<MessageType> {
        self.data.message_type().ok_or_else(|| {
            ProtocolError::with_detail(
                LtiErrorCode::UnsupportedMessageType,
                self.data
                    .message_type_raw()
                    .unwrap_or("<missing>")
                    .to_string(),
            )
            .into()
        })
    }

    pub fn is_resource_launch(&self) -> bool {
        self.data.message_type() == Some(MessageType::ResourceLink)
    }

    pub fn is_deep_link_launch(&self) -> bool {
        self.data.message_type() == Some(MessageType::DeepLinking)
    }

    pub fn is_submission_review_launch(&self) -> bool {
        self.data.message_type() == Some(MessageType::SubmissionReview)
    }

    pub fn is_data_privacy_launch(&self) -> bool {
        self.data.message_type() == Some(MessageType::DataPrivacy)
    }

    /// Roles claim with every entry normalized to its canonical URI.
    pub fn normalized_roles(&self) -> Vec<String> {
        self.data.roles().iter().map(|r| normalize_role(r)).collect()
    }

    pub fn context_claim(&self) -> Option<ContextClaim> {
        self.data.context()
    }

    pub fn resource_link_claim(&self) -> Option<ResourceLinkClaim> {
        self.data.resource_link()
    }

    pub fn platform_instance_claim(&self) -> Option<PlatformInstanceClaim> {
        self.data.platform_instance()
    }

    pub fn migration_claim(&self) -> Option<MigrationClaim> {
        self.data.migration()
    }

    pub fn launch_presentation(&self) -> Option<LaunchPresentationClaim> {
        self.data.launch_presentation()
    }

    /// The kind of browser window or frame the launch is presented in.
    pub fn document_target(&self) -> Option<String> {
        self.launch_presentation()?.document_target
    }

    pub fn dimensions(&self) -> Option<ViewportDimensions> {
        let presentation = self.launch_presentation()?;
        match (presentation.width, presentation.height) {
            (Some(width), Some(height)) => Some(ViewportDimensions { width, height }),
            _ => None,
        }
    }

    pub fn custom_claim(&self, name: &str) -> Option<String> {
        self.data.custom(name).map(str::to_string)
    }

    /// Build a platform return URL carrying the standard status params.
    ///
    /// Returns `None` when the launch presentation claim has no return
    /// URL. Empty message params are omitted from the query.
    pub fn return_url(&self, params: ReturnParams<'_>) -> Option<String> {
        let return_url = self.launch_presentation()?.return_url?;
        let mut url = url::Url::parse(&return_url).ok()?;

        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in [
                ("lti_errormsg", params.lti_errormsg),
                ("lti_msg", params.lti_msg),
                ("lti_errorlog", params.lti_errorlog),
                ("lti_log", params.lti_log),
            ] {
                if !value.is_empty() {
                    pairs.append_pair(key, value);
                }
            }
        }

        Some(url.to_string())
    }
}

/// Status message params for `return_url`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReturnParams<'a> {
    pub lti_errormsg: &'a str,
    pub lti_msg: &'a str,
    pub lti_errorlog: &'a str,
    pub lti_log: &'a str,
}

impl<'a> ReturnParams<'a> {
    pub fn error(message: &'a str) -> Self {
        Self {
            lti_errormsg: message,
            ..Default::default()
        }
    }
}

/// Launch presence for request handling: callers pattern-match instead of
/// probing attributes.
#[derive(Debug, Clone)]
pub enum LaunchSession {
    Present(Box<LtiLaunch>),
    Absent,
}

impl LaunchSession {
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn launch(&self) -> Option<&LtiLaunch> {
        match self {
            Self::Present(launch) => Some(launch),
            Self::Absent => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lti_tool_core::claims::keys;
    use serde_json::json;

    fn launch_with(claims: serde_json::Value) -> LtiLaunch {
        let registration = LtiRegistration::new(
            "Test",
            "https://lms.example",
            "client-abc",
            "https://lms.example/auth",
            "https://lms.example/token",
            "https://lms.example/jwks",
        );
        let deployment = LtiDeployment::new(registration.id.clone(), "dep-1");
        LtiLaunch::new(
            "lti1p3-launch-test".into(),
            LaunchData::from_value(claims).unwrap(),
            registration,
            deployment,
            false,
        )
    }

    #[test]
    fn test_message_type_dispatch() {
        let launch = launch_with(json!({ (keys::MESSAGE_TYPE): "LtiResourceLinkRequest" }));
        assert!(launch.is_resource_launch());
        assert!(!launch.is_deep_link_launch());
        assert_eq!(launch.message_type().unwrap(), MessageType::ResourceLink);
    }

    #[test]
    fn test_unsupported_message_type() {
        let launch = launch_with(json!({ (keys::MESSAGE_TYPE): "LtiStartProctoring" }));
        let err = launch.message_type().unwrap_err();
        assert_eq!(
            err.protocol_code(),
            Some(LtiErrorCode::UnsupportedMessageType)
        );
    }

    #[test]
    fn test_missing_message_type() {
        let launch = launch_with(json!({}));
        assert!(launch.message_type().is_err());
        assert!(!launch.is_resource_launch());
    }

    #[test]
    fn test_normalized_roles() {
        let launch = launch_with(json!({
            (keys::ROLES): ["Instructor", "http://purl.imsglobal.org/vocab/lis/v2/institution/person#Staff"],
        }));
        let roles = launch.normalized_roles();
        assert_eq!(
            roles[0],
            "http://purl.imsglobal.org/vocab/lis/v2/membership#Instructor"
        );
        assert_eq!(
            roles[1],
            "http://purl.imsglobal.org/vocab/lis/v2/institution/person#Staff"
        );
    }

    #[test]
    fn test_return_url_with_error() {
        let launch = launch_with(json!({
            (keys::LAUNCH_PRESENTATION): {
                "return_url": "https://lms.example/return?course=7",
            },
        }));
        let url = launch
            .return_url(ReturnParams::error("This deployment is not active."))
            .unwrap();
        assert!(url.starts_with("https://lms.example/return?"));
        assert!(url.contains("course=7"));
        assert!(url.contains("lti_errormsg=This+deployment+is+not+active."));
        // Empty params are omitted
        assert!(!url.contains("lti_msg"));
    }

    #[test]
    fn test_return_url_absent() {
        let launch = launch_with(json!({}));
        assert!(launch.return_url(ReturnParams::error("nope")).is_none());
    }

    #[test]
    fn test_dimensions_require_both() {
        let launch = launch_with(json!({
            (keys::LAUNCH_PRESENTATION): { "document_target": "iframe", "width": 800 },
        }));
        assert!(launch.dimensions().is_none());
        assert_eq!(launch.document_target().as_deref(), Some("iframe"));

        let launch = launch_with(json!({
            (keys::LAUNCH_PRESENTATION): { "width": 800, "height": 600 },
        }));
        assert_eq!(
            launch.dimensions(),
            Some(ViewportDimensions { width: 800, height: 600 })
        );
    }

    #[test]
    fn test_launch_session_variants() {
        let session = LaunchSession::Absent;
        assert!(session.is_absent());
        assert!(session.launch().is_none());

        let session = LaunchSession::Present(Box::new(launch_with(json!({}))));
        assert!(session.is_present());
        assert!(session.launch().is_some());
    }
}
