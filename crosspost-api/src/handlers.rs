//! Route handlers
//!
//! The upstream gateway authenticates the operator and installs their id
//! in the `x-account-id` header; requests without it get a 401 (or, on the
//! browser-facing callback route, a redirect naming `invalid_session`).

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::warn;

use libcrosspost::error::{ConnectError, CrosspostError};
use libcrosspost::fanout::{self, NewPostRequest};
use libcrosspost::types::{Connection, ContentKind, MediaRef, PlatformId};
use libcrosspost::{Config, ConnectionManager, Database};

const POSTS_PAGE_SIZE: usize = 50;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
    pub connections: Arc<ConnectionManager>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/connections/{platform}/initiate", post(initiate))
        .route("/auth/callback/{platform}", get(callback))
        .route("/api/connections", get(list_connections))
        .route("/api/connections/{platform}", delete(disconnect))
        .route("/api/posts", post(create_post).get(list_posts))
        .with_state(state)
}

/// JSON error body: `{"error": "..."}`
fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message.into() })),
    )
        .into_response()
}

/// The authenticated operator id, installed upstream
fn caller_id(headers: &HeaderMap) -> Result<String, Response> {
    headers
        .get("x-account-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "unauthenticated"))
}

fn parse_platform(raw: &str) -> Result<PlatformId, Response> {
    PlatformId::from_str(raw)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, e.to_string()))
}

/// Map a synchronous operation failure onto an HTTP status
fn api_error(error: CrosspostError) -> Response {
    match &error {
        CrosspostError::Validation(_) | CrosspostError::InvalidInput(_) => {
            error_response(StatusCode::BAD_REQUEST, error.to_string())
        }
        CrosspostError::Connect(ConnectError::Unauthenticated(_)) => {
            error_response(StatusCode::UNAUTHORIZED, error.to_string())
        }
        CrosspostError::Connect(_) => error_response(StatusCode::BAD_REQUEST, error.to_string()),
        CrosspostError::Config(_) | CrosspostError::Database(_) | CrosspostError::Publish(_) => {
            warn!(error = %error, "internal error");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

// ----------------------------------------------------------------------
// Connections
// ----------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct InitiateBody {
    account_id: String,
}

#[derive(Debug, Serialize)]
struct InitiateResponse {
    auth_url: String,
}

async fn initiate(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    headers: HeaderMap,
    Json(body): Json<InitiateBody>,
) -> Response {
    let caller = match caller_id(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    let platform = match parse_platform(&platform) {
        Ok(platform) => platform,
        Err(response) => return response,
    };
    if body.account_id.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "account_id is required");
    }

    match state
        .connections
        .initiate(platform, &body.account_id, &caller)
        .await
    {
        Ok(auth_url) => Json(InitiateResponse { auth_url }).into_response(),
        Err(e) => api_error(e),
    }
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    /// Set by the provider instead of `code` when the operator denied
    /// the authorization or the provider failed it
    #[serde(default)]
    error: Option<String>,
}

/// Where the callback redirect lands, with the outcome in the query string
fn connections_redirect(config: &Config, result: &str) -> Redirect {
    let url = format!(
        "{}/connections?{}",
        config.server.public_url.trim_end_matches('/'),
        result
    );
    Redirect::temporary(&url)
}

/// Callback failure kinds surfaced to the connections view
fn callback_error_kind(error: &CrosspostError) -> &'static str {
    match error {
        CrosspostError::Connect(ConnectError::InvalidState(_)) => "invalid_state",
        CrosspostError::Connect(ConnectError::Unauthenticated(_)) => "invalid_session",
        CrosspostError::Database(_) => "database_error",
        _ => "oauth_failed",
    }
}

async fn callback(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Response {
    let redirect = |result: String| connections_redirect(&state.config, &result).into_response();

    let Ok(platform) = PlatformId::from_str(&platform) else {
        return redirect("error=missing_params".to_string());
    };

    if let Some(provider_error) = params.error {
        warn!(%platform, %provider_error, "provider rejected authorization");
        return redirect("error=oauth_failed".to_string());
    }
    let (Some(code), Some(auth_state)) = (params.code, params.state) else {
        return redirect("error=missing_params".to_string());
    };

    let Ok(caller) = caller_id(&headers) else {
        return redirect("error=invalid_session".to_string());
    };

    match state
        .connections
        .complete(platform, &code, &auth_state, &caller)
        .await
    {
        Ok(connection) => redirect(format!("success=1&platform={}", connection.platform)),
        Err(e) => {
            warn!(%platform, error = %e, "authorization callback failed");
            redirect(format!("error={}", callback_error_kind(&e)))
        }
    }
}

/// A connection as shown to the operator: credentials redacted
#[derive(Debug, Serialize)]
struct ConnectionView {
    platform: PlatformId,
    account_id: String,
    external_id: String,
    handle: String,
    status: libcrosspost::ConnectionStatus,
    expires_at: Option<i64>,
    created_at: i64,
}

impl From<Connection> for ConnectionView {
    fn from(c: Connection) -> Self {
        Self {
            platform: c.platform,
            account_id: c.account_id,
            external_id: c.external_id,
            handle: c.handle,
            status: c.status,
            expires_at: c.expires_at,
            created_at: c.created_at,
        }
    }
}

async fn list_connections(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let caller = match caller_id(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };

    match state.db.list_connections(&caller).await {
        Ok(connections) => {
            let views: Vec<ConnectionView> =
                connections.into_iter().map(ConnectionView::from).collect();
            Json(views).into_response()
        }
        Err(e) => api_error(e),
    }
}

#[derive(Debug, Deserialize)]
struct DisconnectParams {
    #[serde(default)]
    account_id: Option<String>,
}

async fn disconnect(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    headers: HeaderMap,
    Query(params): Query<DisconnectParams>,
) -> Response {
    let caller = match caller_id(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    let platform = match parse_platform(&platform) {
        Ok(platform) => platform,
        Err(response) => return response,
    };
    let account_id = params.account_id.unwrap_or(caller);

    match state.connections.disconnect(&account_id, platform).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => error_response(StatusCode::NOT_FOUND, "no such connection"),
        Err(e) => api_error(e),
    }
}

// ----------------------------------------------------------------------
// Posts
// ----------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreatePostBody {
    content: String,
    platforms: Vec<String>,
    #[serde(default)]
    scheduled_for: Option<String>,
    #[serde(default)]
    media_urls: Vec<String>,
    #[serde(default)]
    hashtags: Vec<String>,
    #[serde(default)]
    content_kind: Option<String>,
}

/// Turn the wire-level body into a validated submission request
fn parse_post_body(
    account_id: String,
    body: CreatePostBody,
) -> Result<NewPostRequest, String> {
    let mut platforms = Vec::new();
    for raw in &body.platforms {
        platforms.push(PlatformId::from_str(raw).map_err(|e| e.to_string())?);
    }

    let scheduled_at = match body.scheduled_for.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(
            chrono::DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.timestamp())
                .map_err(|_| format!("scheduled_for is not RFC 3339: {}", raw))?,
        ),
    };

    let mut media = Vec::new();
    for url in &body.media_urls {
        media.push(
            MediaRef::from_url(url).ok_or_else(|| format!("unsupported media type: {}", url))?,
        );
    }

    let content_kind = match body.content_kind.as_deref() {
        None | Some("") => ContentKind::Text,
        Some(raw) => ContentKind::from_str(raw).map_err(|e| e.to_string())?,
    };

    Ok(NewPostRequest {
        account_id,
        content: body.content,
        platforms,
        scheduled_at,
        media,
        hashtags: body.hashtags,
        content_kind,
    })
}

async fn create_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreatePostBody>,
) -> Response {
    let caller = match caller_id(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };

    let request = match parse_post_body(caller, body) {
        Ok(request) => request,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
    };

    match fanout::submit(&state.db, request).await {
        Ok(post) => (StatusCode::CREATED, Json(post)).into_response(),
        Err(e) => api_error(e),
    }
}

async fn list_posts(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let caller = match caller_id(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };

    match state.db.list_posts(&caller, POSTS_PAGE_SIZE).await {
        Ok(posts) => Json(posts).into_response(),
        Err(e) => api_error(e),
    }
}
