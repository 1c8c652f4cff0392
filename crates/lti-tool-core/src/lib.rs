#![doc = include_str!("../README.md")]

pub mod claims;
pub mod db;
pub mod error;
pub mod logger;
pub mod options;
pub mod vocabulary;

// Re-exports for convenience
pub use claims::{LaunchData, MessageType};
pub use db::adapter::Adapter;
pub use db::models::{
    Key, LtiContext, LtiDeployment, LtiLineItem, LtiMembership, LtiPlatformInstance,
    LtiRegistration, LtiResourceLink, LtiUser,
};
pub use db::secondary_storage::{MemorySecondaryStorage, SecondaryStorage, SecondaryStorageError};
pub use error::{LtiErrorCode, LtiToolError, ProtocolError, Result};
pub use logger::{LogHandler, LogLevel, LoggerConfig, LtiLogger};
pub use options::{DeploymentPolicy, LtiToolOptions};
