use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum::http::header::AUTHORIZATION;
use governor::DefaultDirectRateLimiter;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::trace::TraceLayer;

use crate::application::auth::AuthService;
use crate::application::cache::SwrCache;
use crate::application::registration::RegistrationService;
use crate::domain::error::GateError;
use crate::domain::session::Session;
use crate::infrastructure::lms::{ConversationQuery, LmsGateway};

// Cache windows per LMS resource, seconds of (ttl, fresh).
const MESSAGES_CACHE: (u64, u64) = (1800, 120);
const CONVERSATION_CACHE: (u64, u64) = (600, 120);
const UNREAD_CACHE: (u64, u64) = (60, 30);

pub struct AppState {
    pub auth: Arc<AuthService>,
    pub registration: Arc<RegistrationService>,
    pub lms: Arc<LmsGateway>,
    pub cache: SwrCache,
    pub login_limiter: DefaultDirectRateLimiter,
    pub started: Instant,
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/auth/status", get(auth_status))
        .route("/dkmh/periods", get(list_periods))
        .route("/dkmh/period-details", post(period_details))
        .route("/dkmh/search-courses", post(search_courses))
        .route("/dkmh/class-groups", post(class_groups))
        .route("/dkmh/register", post(register))
        .route("/dkmh/registration-result", post(registration_result))
        .route("/dkmh/cancel", post(cancel))
        .route("/lms/init", post(lms_init))
        .route("/lms/messages", get(lms_messages))
        .route("/lms/messages/{conversation_id}", get(lms_conversation))
        .route("/lms/unread", get(lms_unread))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// JSON error response with an optional machine-readable code.
pub struct ApiError {
    status: StatusCode,
    error: String,
    code: Option<&'static str>,
}

impl ApiError {
    fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            code: None,
        }
    }

    fn with_code(status: StatusCode, error: impl Into<String>, code: &'static str) -> Self {
        Self {
            status,
            error: error.into(),
            code: Some(code),
        }
    }

    fn unauthorized(error: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, error)
    }

    fn bad_request(error: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({ "error": self.error });
        if let Some(code) = self.code {
            body["code"] = json!(code);
        }
        (self.status, Json(body)).into_response()
    }
}

impl From<GateError> for ApiError {
    fn from(err: GateError) -> Self {
        let message = err.to_string();
        match err {
            GateError::CredentialsRejected | GateError::SessionAbsent => {
                Self::new(StatusCode::UNAUTHORIZED, message)
            }
            GateError::SsoSessionExpired => Self::new(StatusCode::UNAUTHORIZED, message),
            GateError::RefreshTokenExpired => Self::with_code(
                StatusCode::UNAUTHORIZED,
                message,
                "REFRESH_TOKEN_EXPIRED",
            ),
            GateError::RefreshAuthFailed => {
                Self::with_code(StatusCode::UNAUTHORIZED, message, "REFRESH_AUTH_FAILED")
            }
            GateError::PeriodNotResolved
            | GateError::RegistrationSessionMissing
            | GateError::LmsNotInitialized => Self::new(StatusCode::BAD_REQUEST, message),
            GateError::SsoContextMissing => {
                Self::with_code(StatusCode::BAD_REQUEST, message, "SSO_JAR_MISSING")
            }
            GateError::FormUnavailable | GateError::UpstreamUnavailable(_) => {
                Self::new(StatusCode::BAD_GATEWAY, message)
            }
            GateError::Store(_) | GateError::Internal(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
        .ok_or_else(|| ApiError::unauthorized("No token provided"))
}

async fn authed(state: &AppState, headers: &HeaderMap) -> Result<(String, Session), ApiError> {
    let token = bearer_token(headers)?;
    let session = state.auth.authenticate(&token).await?;
    Ok((token, session))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "uptime_seconds": state.started.elapsed().as_secs(),
    }))
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
    #[serde(default, rename = "rememberMe")]
    remember_me: bool,
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if state.login_limiter.check().is_err() {
        return Err(ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "Too many login attempts, please retry later",
        ));
    }
    if payload.username.trim().is_empty() || payload.password.is_empty() {
        return Err(ApiError::bad_request("Username and password are required"));
    }

    let outcome = state
        .auth
        .login(&payload.username, &payload.password, payload.remember_me)
        .await?;

    Ok(Json(json!({
        "success": true,
        "token": outcome.token,
        "refreshToken": outcome.refresh_token,
        "user": outcome.profile,
    })))
}

#[derive(Deserialize)]
struct RefreshRequest {
    #[serde(rename = "refreshToken")]
    refresh_token: String,
}

async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = state.auth.refresh(&payload.refresh_token).await?;
    Ok(Json(json!({
        "success": true,
        "token": outcome.token,
        "user": outcome.profile,
    })))
}

#[derive(Deserialize, Default)]
struct LogoutRequest {
    #[serde(rename = "refreshToken")]
    refresh_token: Option<String>,
}

async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<LogoutRequest>, axum::extract::rejection::JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    // The refresh token is an optional extra; a missing or empty body is fine.
    let refresh_token = payload.ok().and_then(|Json(p)| p.refresh_token);
    if let Ok(token) = bearer_token(&headers) {
        state
            .auth
            .logout(&token, refresh_token.as_deref())
            .await?;
    }
    Ok(Json(json!({ "success": true })))
}

async fn auth_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (_, session) = authed(&state, &headers).await?;
    Ok(Json(json!({
        "authenticated": session.dkmh_cookie.is_some(),
        "dkmhLoggedIn": session.dkmh_logged_in,
        "username": session.username,
    })))
}

async fn list_periods(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (_, session) = authed(&state, &headers).await?;
    let periods = state.registration.list_periods(&session).await?;
    Ok(Json(json!({ "success": true, "data": periods })))
}

#[derive(Deserialize)]
struct PeriodRequest {
    #[serde(rename = "periodId")]
    period_id: String,
}

async fn period_details(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<PeriodRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (token, session) = authed(&state, &headers).await?;
    let details = state
        .registration
        .period_details(&token, &session, &payload.period_id)
        .await?;
    Ok(Json(json!({ "success": true, "data": details })))
}

#[derive(Deserialize)]
struct SearchRequest {
    #[serde(rename = "periodId")]
    period_id: String,
    query: String,
    #[serde(default, rename = "forceMode")]
    force_mode: bool,
}

async fn search_courses(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<SearchRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (token, _) = authed(&state, &headers).await?;
    let hits = state
        .registration
        .search(&token, &payload.period_id, &payload.query, payload.force_mode)
        .await?;
    Ok(Json(json!({ "success": true, "data": hits })))
}

#[derive(Deserialize)]
struct ClassGroupsRequest {
    #[serde(rename = "periodId")]
    period_id: String,
    #[serde(rename = "monHocId")]
    mon_hoc_id: String,
}

async fn class_groups(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<ClassGroupsRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (token, _) = authed(&state, &headers).await?;
    let groups = state
        .registration
        .class_groups(&token, &payload.period_id, &payload.mon_hoc_id)
        .await?;
    Ok(Json(json!({ "success": true, "data": groups })))
}

#[derive(Deserialize)]
struct RegisterRequest {
    #[serde(rename = "periodId")]
    period_id: String,
    #[serde(rename = "nlmhId")]
    nlmh_id: String,
    #[serde(rename = "monHocId")]
    mon_hoc_id: Option<String>,
    #[serde(default, rename = "forceMode")]
    force_mode: bool,
}

async fn register(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (token, _) = authed(&state, &headers).await?;
    let outcome = state
        .registration
        .register(
            &token,
            &payload.period_id,
            &payload.nlmh_id,
            payload.mon_hoc_id.as_deref(),
            payload.force_mode,
        )
        .await?;

    if outcome.success {
        Ok(Json(json!({
            "success": true,
            "message": outcome.message,
            "forceMode": outcome.force_mode,
        })))
    } else {
        Ok(Json(json!({
            "success": false,
            "error": outcome.message,
            "code": outcome.code,
        })))
    }
}

async fn registration_result(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<PeriodRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (token, _) = authed(&state, &headers).await?;
    let results = state
        .registration
        .registration_result(&token, &payload.period_id)
        .await?;
    Ok(Json(json!({ "success": true, "data": results })))
}

#[derive(Deserialize)]
struct CancelRequest {
    #[serde(rename = "periodId")]
    period_id: String,
    #[serde(rename = "ketquaId")]
    ketqua_id: String,
    #[serde(rename = "monHocMa")]
    mon_hoc_ma: Option<String>,
}

async fn cancel(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CancelRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (token, _) = authed(&state, &headers).await?;
    state
        .registration
        .cancel(&token, &payload.period_id, &payload.ketqua_id)
        .await?;
    let course = payload.mon_hoc_ma.unwrap_or_default();
    Ok(Json(json!({
        "success": true,
        "message": format!("Cancelled registration {}", course).trim().to_string(),
        "ketquaId": payload.ketqua_id,
    })))
}

async fn lms_init(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (token, _) = authed(&state, &headers).await?;
    let activation = state.auth.activate_lms(&token).await?;
    Ok(Json(json!({
        "success": true,
        "userid": activation.userid,
        "cached": activation.cached,
    })))
}

fn default_conversation_type() -> u32 {
    1
}

fn default_message_limit() -> u32 {
    50
}

#[derive(Deserialize)]
struct MessagesQuery {
    #[serde(rename = "type", default = "default_conversation_type")]
    conversation_type: u32,
    #[serde(default = "default_message_limit")]
    limit: u32,
    #[serde(default)]
    offset: u32,
}

async fn lms_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (token, session) = authed(&state, &headers).await?;
    let lms_session = session.lms.clone().ok_or_else(|| {
        ApiError::bad_request("LMS session not initialized. Call /lms/init first.")
    })?;

    let key = format!(
        "LMS_MSG:{}:{}:{}",
        session.username, query.conversation_type, query.offset
    );
    let gateway = state.lms.clone();
    let conversation_query = ConversationQuery {
        conversation_type: query.conversation_type,
        limit: query.limit,
        offset: query.offset,
    };

    let data = state
        .cache
        .read_through(
            &key,
            Duration::from_secs(MESSAGES_CACHE.0),
            Duration::from_secs(MESSAGES_CACHE.1),
            move || {
                let gateway = gateway.clone();
                let lms = lms_session.clone();
                let query = conversation_query.clone();
                async move { gateway.conversations(&lms, &query).await }
            },
        )
        .await
        .map_err(|err| lms_query_error(&state, &token, err))?;

    Ok(Json(json!({ "success": true, "data": data })))
}

#[derive(Deserialize)]
struct ConversationMessagesQuery {
    #[serde(default = "default_conversation_limit")]
    limit: u32,
    #[serde(default)]
    offset: u32,
}

fn default_conversation_limit() -> u32 {
    100
}

async fn lms_conversation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(conversation_id): Path<u64>,
    Query(query): Query<ConversationMessagesQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (token, session) = authed(&state, &headers).await?;
    let lms_session = session
        .lms
        .clone()
        .ok_or_else(|| ApiError::bad_request("LMS session not initialized"))?;

    let key = format!(
        "LMS_CONV:{}:{}:{}",
        session.username, conversation_id, query.offset
    );
    let gateway = state.lms.clone();
    let (limit, offset) = (query.limit, query.offset);

    let data = state
        .cache
        .read_through(
            &key,
            Duration::from_secs(CONVERSATION_CACHE.0),
            Duration::from_secs(CONVERSATION_CACHE.1),
            move || {
                let gateway = gateway.clone();
                let lms = lms_session.clone();
                async move {
                    gateway
                        .conversation_messages(&lms, conversation_id, limit, offset)
                        .await
                }
            },
        )
        .await
        .map_err(|err| lms_query_error(&state, &token, err))?;

    Ok(Json(json!({ "success": true, "data": data })))
}

async fn lms_unread(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (_, session) = authed(&state, &headers).await?;
    let lms_session = session
        .lms
        .clone()
        .ok_or_else(|| ApiError::bad_request("LMS session not initialized"))?;

    let key = format!("LMS_UNREAD:{}", session.username);
    let gateway = state.lms.clone();

    let data = state
        .cache
        .read_through(
            &key,
            Duration::from_secs(UNREAD_CACHE.0),
            Duration::from_secs(UNREAD_CACHE.1),
            move || {
                let gateway = gateway.clone();
                let lms = lms_session.clone();
                async move { gateway.unread_counts(&lms).await }
            },
        )
        .await?;

    Ok(Json(json!({ "success": true, "data": data })))
}

/// A dead sesskey means the LMS sub-session must be re-activated; clear it
/// so the next `/lms/init` starts fresh.
fn lms_query_error(state: &Arc<AppState>, token: &str, err: GateError) -> ApiError {
    if let GateError::UpstreamUnavailable(message) = &err {
        if message.contains("sesskey") || message.contains("expired") {
            let auth = state.auth.clone();
            let token = token.to_string();
            tokio::spawn(async move {
                let _ = auth.invalidate_lms(&token).await;
            });
            return ApiError::with_code(
                StatusCode::UNAUTHORIZED,
                "LMS session expired. Please re-initialize.",
                "LMS_SESSION_EXPIRED",
            );
        }
    }
    err.into()
}
