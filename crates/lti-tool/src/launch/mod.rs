pub mod message;
pub mod oidc;
pub mod validator;

pub use message::{LaunchSession, LtiLaunch, ReturnParams, ViewportDimensions};
pub use oidc::{check_cookies_page, handle_login_init, LoginInitParams, LoginRedirect};
pub use validator::{launch_from_cache, session_from_cache, validate_launch, LaunchRequest};
