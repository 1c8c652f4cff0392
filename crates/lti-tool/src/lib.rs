#![doc = include_str!("../README.md")]

pub mod context;
pub mod crypto;
pub mod launch;
pub mod manifest;
pub mod registration;
pub mod services;
pub mod store;
pub mod sync;

pub use context::ToolContext;
pub use launch::{
    handle_login_init, launch_from_cache, session_from_cache, validate_launch, LaunchRequest,
    LaunchSession, LoginInitParams, LoginRedirect, LtiLaunch, ReturnParams,
};
pub use registration::{
    activate_deployment, key_material, resolve_deployment, resolve_registration, KeyMaterial,
};
pub use store::ToolStore;
pub use sync::{sync_data_from_launch, SyncOutcome};

// The core types most integrations need alongside the engine.
pub use lti_tool_core::{
    DeploymentPolicy, LaunchData, LtiErrorCode, LtiRegistration, LtiToolError, LtiToolOptions,
    MessageType, ProtocolError, Result,
};
