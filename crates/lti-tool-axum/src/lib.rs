#![doc = include_str!("../README.md")]

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Form, Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use lti_tool::context::ToolContext;
use lti_tool::crypto::keys;
use lti_tool::launch::{
    check_cookies_page, handle_login_init, validate_launch, LaunchRequest, LoginInitParams,
    LtiLaunch, ReturnParams,
};
use lti_tool::manifest::tool_configuration;
use lti_tool::sync::{sync_data_from_launch, SyncOutcome};
use lti_tool_core::claims::MessageType;
use lti_tool_core::error::{LtiErrorCode, LtiToolError};

/// Session cookie carrying the opaque launch id across same-flow requests.
pub const LAUNCH_ID_COOKIE: &str = "lti-tool.launch_id";

// ─── Error Handling ──────────────────────────────────────────────

/// API error with HTTP status, machine code, and message body.
struct ApiError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": {
                "code": self.code,
                "message": self.message,
            }
        });
        (self.status, Json(body)).into_response()
    }
}

impl From<LtiToolError> for ApiError {
    fn from(err: LtiToolError) -> Self {
        let (status, code) = match &err {
            LtiToolError::Protocol(p) => {
                let status = match p.code {
                    LtiErrorCode::MissingTargetLinkUri => StatusCode::BAD_REQUEST,
                    LtiErrorCode::RegistrationNotFound => StatusCode::NOT_FOUND,
                    _ => StatusCode::FORBIDDEN,
                };
                (status, format!("{:?}", p.code))
            }
            LtiToolError::Config(_) => (StatusCode::BAD_REQUEST, "CONFIGURATION_ERROR".into()),
            LtiToolError::Service(_) => (StatusCode::BAD_GATEWAY, "SERVICE_ERROR".into()),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR".into(),
            ),
        };
        ApiError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

/// Create a 302 Found redirect response.
fn redirect_found(url: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, url.to_string())]).into_response()
}

/// Redirect to the platform return URL with an error message, or respond
/// 403 locally when the launch carries no return URL.
fn refuse_with_return_url(launch: &LtiLaunch, message: &str) -> Response {
    match launch.return_url(ReturnParams::error(message)) {
        Some(url) => redirect_found(&url),
        None => (StatusCode::FORBIDDEN, message.to_string()).into_response(),
    }
}

// ─── Launch Handler ─────────────────────────────────────────────

/// Host-provided launch handling, dispatched after validation and
/// reconciliation succeed.
///
/// Implement `handle_resource_launch`; the other message types default to
/// the platform-visible refusal, and both failure surfaces are
/// overridable.
#[async_trait]
pub trait LaunchHandler: Send + Sync {
    /// A resource link launch, the one every tool must serve.
    async fn handle_resource_launch(&self, launch: &LtiLaunch, outcome: &SyncOutcome) -> Response;

    async fn handle_deep_linking_launch(
        &self,
        launch: &LtiLaunch,
        _outcome: &SyncOutcome,
    ) -> Response {
        refuse_with_return_url(launch, "Deep linking is not supported.")
    }

    async fn handle_submission_review_launch(
        &self,
        launch: &LtiLaunch,
        _outcome: &SyncOutcome,
    ) -> Response {
        refuse_with_return_url(launch, "Submission review launch is not supported.")
    }

    async fn handle_data_privacy_launch(
        &self,
        launch: &LtiLaunch,
        _outcome: &SyncOutcome,
    ) -> Response {
        refuse_with_return_url(launch, "Data privacy launch is not supported.")
    }

    /// A validated launch against a deployment awaiting activation.
    async fn handle_inactive_deployment(&self, launch: &LtiLaunch) -> Response {
        refuse_with_return_url(launch, "This deployment is not active.")
    }

    /// A launch attempt that failed validation: the absent-launch state.
    async fn handle_absent_launch(&self, err: LtiToolError) -> Response {
        ApiError::from(err).into_response()
    }
}

// ─── Router ─────────────────────────────────────────────────────

struct LtiToolState {
    ctx: Arc<ToolContext>,
    handler: Arc<dyn LaunchHandler>,
}

/// The Axum-facing entry point.
pub struct LtiTool {
    state: Arc<LtiToolState>,
}

impl LtiTool {
    pub fn new(ctx: Arc<ToolContext>, handler: Arc<dyn LaunchHandler>) -> Self {
        Self {
            state: Arc::new(LtiToolState { ctx, handler }),
        }
    }

    pub fn context(&self) -> &Arc<ToolContext> {
        &self.state.ctx
    }

    /// Build the LTI router, nested under the configured base path.
    pub fn router(&self) -> Router {
        let base_path = self.state.ctx.options.base_path.clone();
        Router::new().nest(&base_path, self.lti_routes())
    }

    /// Router variant with permissive CORS, for tools embedded across
    /// origins. Production deployments should configure CORS themselves.
    pub fn router_with_cors(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        self.router().layer(cors)
    }

    fn lti_routes(&self) -> Router {
        Router::new()
            .route(
                "/init/{registration_uuid}",
                get(handle_init_get).post(handle_init_post),
            )
            .route("/launch", axum::routing::post(handle_launch))
            .route("/jwks.json", get(handle_jwks))
            .route("/config/{registration_uuid}", get(handle_config))
            .with_state(self.state.clone())
    }
}

// ─── Route Handlers ─────────────────────────────────────────────

/// Login initiation arrives as GET query params or a POSTed form; both
/// carry the same fields.
async fn handle_init_get(
    State(state): State<Arc<LtiToolState>>,
    Path(registration_uuid): Path<String>,
    Query(params): Query<LoginInitParams>,
) -> Response {
    oidc_response(&state, &registration_uuid, params).await
}

async fn handle_init_post(
    State(state): State<Arc<LtiToolState>>,
    Path(registration_uuid): Path<String>,
    Form(params): Form<LoginInitParams>,
) -> Response {
    oidc_response(&state, &registration_uuid, params).await
}

async fn oidc_response(
    state: &LtiToolState,
    registration_uuid: &str,
    params: LoginInitParams,
) -> Response {
    match handle_login_init(&state.ctx, Some(registration_uuid), &params).await {
        Ok(redirect) => redirect_found(&redirect.redirect_url),
        Err(err) => ApiError::from(err).into_response(),
    }
}

/// Serve the cookie-check interstitial for embeds that block third-party
/// cookies. Hosts route here when they detect the condition client-side.
pub fn cookie_check_response(redirect_url: &str) -> Response {
    let html = check_cookies_page(
        redirect_url,
        "Your browser prevents embedded content from using cookies. To work \
         around this, the content must be opened in a new tab or window.",
        "Open a new tab or window now.",
    );
    Html(html).into_response()
}

async fn handle_launch(
    State(state): State<Arc<LtiToolState>>,
    Form(request): Form<LaunchRequest>,
) -> Response {
    let launch = match validate_launch(&state.ctx, &request).await {
        Ok(launch) => launch,
        Err(err) => return state.handler.handle_absent_launch(err).await,
    };

    // An inactive deployment halts the pipeline before reconciliation:
    // nothing is persisted for launches the administrator has not let in.
    if !launch.deployment().is_active {
        return state.handler.handle_inactive_deployment(&launch).await;
    }

    // Reconciliation runs before any type-specific handling.
    let outcome = match sync_data_from_launch(&state.ctx, &launch).await {
        Ok(outcome) => outcome,
        Err(err) => return state.handler.handle_absent_launch(err).await,
    };

    let mut response = match launch.message_type() {
        Ok(MessageType::ResourceLink) => {
            state.handler.handle_resource_launch(&launch, &outcome).await
        }
        Ok(MessageType::DeepLinking) => {
            state
                .handler
                .handle_deep_linking_launch(&launch, &outcome)
                .await
        }
        Ok(MessageType::SubmissionReview) => {
            state
                .handler
                .handle_submission_review_launch(&launch, &outcome)
                .await
        }
        Ok(MessageType::DataPrivacy) => {
            state
                .handler
                .handle_data_privacy_launch(&launch, &outcome)
                .await
        }
        Err(err) => return state.handler.handle_absent_launch(err).await,
    };

    // Mark the session so same-flow requests can reattach to the launch.
    let cookie = format!(
        "{LAUNCH_ID_COOKIE}={}; Path=/; HttpOnly; SameSite=None; Secure",
        launch.launch_id()
    );
    if let Ok(value) = header::HeaderValue::from_str(&cookie) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}

async fn handle_jwks(State(state): State<Arc<LtiToolState>>) -> Response {
    match keys::jwks(&state.ctx).await {
        Ok(document) => Json(document).into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

async fn handle_config(
    State(state): State<Arc<LtiToolState>>,
    Path(registration_uuid): Path<String>,
) -> Response {
    let registration_uuid = registration_uuid
        .strip_suffix(".json")
        .unwrap_or(&registration_uuid);
    match tool_configuration(&state.ctx, registration_uuid) {
        Ok(config) => Json(config).into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

/// Extract the cached launch id from a request's Cookie header.
pub fn launch_id_from_headers(headers: &axum::http::HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|cookie| {
        let (name, value) = cookie.trim().split_once('=')?;
        (name == LAUNCH_ID_COOKIE).then(|| value.to_string())
    })
}
