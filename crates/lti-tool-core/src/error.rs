// Error taxonomy for the LTI tool.
//
// Protocol errors carry a flat code so integrations can branch on them
// without string matching; everything else folds into `LtiToolError`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Protocol-level error codes raised while establishing launch trust.
///
/// Every code is fatal to the current launch attempt. Recovery always means
/// the platform re-initiating the flow, never a retry on the tool side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LtiErrorCode {
    RegistrationNotFound,
    DeploymentNotFound,
    DeploymentInactive,
    MissingTargetLinkUri,
    StateMismatch,
    NonceReused,
    NonceMismatch,
    InvalidToken,
    TokenExpired,
    IssuerMismatch,
    AudienceMismatch,
    UnknownKeyId,
    KeysetUnavailable,
    MissingDeploymentId,
    UnsupportedMessageType,
    LaunchNotFound,
}

impl fmt::Display for LtiErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::RegistrationNotFound => "Registration not found",
            Self::DeploymentNotFound => "Deployment not found",
            Self::DeploymentInactive => "Deployment is not active",
            Self::MissingTargetLinkUri => "Missing target_link_uri parameter",
            Self::StateMismatch => "State parameter does not match any pending login",
            Self::NonceReused => "Nonce has already been used",
            Self::NonceMismatch => "Nonce does not match the issued value",
            Self::InvalidToken => "Launch token failed verification",
            Self::TokenExpired => "Launch token has expired",
            Self::IssuerMismatch => "Issuer does not match the registration",
            Self::AudienceMismatch => "Audience does not include the client ID",
            Self::UnknownKeyId => "No platform key matches the token key ID",
            Self::KeysetUnavailable => "Platform key set could not be retrieved",
            Self::MissingDeploymentId => "Launch is missing the deployment ID claim",
            Self::UnsupportedMessageType => "Unsupported LTI message type",
            Self::LaunchNotFound => "No cached launch matches the given ID",
        };
        write!(f, "{msg}")
    }
}

/// A protocol failure: an error code plus context for the log line.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {detail}")]
pub struct ProtocolError {
    pub code: LtiErrorCode,
    pub detail: String,
}

impl ProtocolError {
    pub fn new(code: LtiErrorCode) -> Self {
        Self {
            detail: code.to_string(),
            code,
        }
    }

    pub fn with_detail(code: LtiErrorCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }
}

/// Unified error type for all tool operations.
#[derive(Debug, thiserror::Error)]
pub enum LtiToolError {
    /// Integration misconfiguration: missing collaborator, bad options,
    /// unusable key material. Not transient.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Launch-fatal protocol failure; render the absent-launch state.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Outbound platform service failure (NRPS/AGS/token endpoint).
    /// Never fatal to an already-validated launch.
    #[error("Service error: {0}")]
    Service(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl LtiToolError {
    /// The protocol code, when this error is a protocol failure.
    pub fn protocol_code(&self) -> Option<LtiErrorCode> {
        match self {
            Self::Protocol(e) => Some(e.code),
            _ => None,
        }
    }
}

/// Unified result type for lti-tool operations.
pub type Result<T> = std::result::Result<T, LtiToolError>;
