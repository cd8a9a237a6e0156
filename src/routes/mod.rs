pub mod appeals;
pub mod auth;
pub mod communities;
pub mod notifications;
pub mod reports;

use axum::{
    extract::{Request, State},
    http::{header::HOST, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};

use crate::error::ModerationError;
use crate::models::Roles;
use crate::services;
use crate::state::AppState;
use crate::ws;
use auth::{extract_claims, Claims};

/// Handler error: either the caller is not authenticated, or the core said no.
pub enum ApiError {
    Auth(StatusCode, String),
    Moderation(ModerationError),
}

impl From<(StatusCode, String)> for ApiError {
    fn from((status, msg): (StatusCode, String)) -> Self {
        ApiError::Auth(status, msg)
    }
}

impl From<ModerationError> for ApiError {
    fn from(err: ModerationError) -> Self {
        ApiError::Moderation(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Auth(status, msg) => (status, msg).into_response(),
            ApiError::Moderation(err) => err.into_response(),
        }
    }
}

pub(crate) fn caller(state: &AppState, headers: &HeaderMap) -> Result<Claims, ApiError> {
    Ok(extract_claims(&state.jwt_secret, headers)?)
}

/// Roles of `username` in a community, through the role cache.
pub(crate) async fn cached_roles(
    state: &AppState,
    community_id: &str,
    username: &str,
) -> Result<Roles, ApiError> {
    let roles = state
        .role_cache
        .get_or_load(username, community_id, || {
            services::community::load_roles(&state.db, community_id, username)
        })
        .await?;
    Ok(roles)
}

/// Gate for read-only moderator views.
pub(crate) async fn require_staff(
    state: &AppState,
    community_id: &str,
    username: &str,
) -> Result<Roles, ApiError> {
    let roles = cached_roles(state, community_id, username).await?;
    if !roles.is_staff() {
        return Err(ModerationError::Unauthorized.into());
    }
    Ok(roles)
}

/// Host name of a `Host` header value, without the port. IPv6 literals keep
/// their brackets.
fn host_name(header: &str) -> &str {
    if header.starts_with('[') {
        return header.find(']').map_or(header, |end| &header[..=end]);
    }
    header.split(':').next().unwrap_or(header)
}

fn is_known_host(host: &str, external_host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "[::1]") || host.eq_ignore_ascii_case(external_host)
}

/// Reject requests addressed to a host this server does not answer for, so a
/// rebound DNS name cannot reach the API from a browser.
async fn require_known_host(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let host = req
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(host_name);
    if let Some(host) = host {
        if !is_known_host(host, &state.external_host) {
            tracing::warn!("Rejected request for unknown host {host}");
            return (StatusCode::MISDIRECTED_REQUEST, "Misdirected Request").into_response();
        }
    }
    next.run(req).await
}

pub fn router(state: AppState) -> Router {
    Router::new()
        // Communities
        .route(
            "/api/communities",
            get(communities::list_communities).post(communities::create_community),
        )
        .route(
            "/api/communities/{id}",
            get(communities::get_community).delete(communities::delete_community),
        )
        .route("/api/communities/{id}/me", get(communities::my_roles))
        .route("/api/communities/{id}/membership", post(communities::toggle_membership))
        .route(
            "/api/communities/{id}/moderators/{username}",
            post(communities::toggle_moderator),
        )
        .route("/api/communities/{id}/bans/{username}", post(communities::toggle_ban))
        .route("/api/communities/{id}/mutes/{username}", post(communities::toggle_mute))
        .route(
            "/api/communities/{id}/announcements",
            post(communities::send_announcement),
        )
        .route("/api/communities/{id}/audit-logs", get(communities::audit_logs))
        // Reports
        .route("/api/communities/{id}/reports", post(reports::create_report))
        .route("/api/communities/{id}/reports/pending", get(reports::pending_reports))
        .route(
            "/api/communities/{id}/reports/users/{username}",
            get(reports::reports_by_user),
        )
        .route("/api/reports/{report_id}/status", put(reports::update_status))
        // Appeals
        .route(
            "/api/communities/{id}/appeals",
            get(appeals::list_appeals).post(appeals::submit_appeal),
        )
        .route(
            "/api/communities/{id}/appeals/{appeal_id}",
            post(appeals::respond_to_appeal),
        )
        // Notifications
        .route("/api/notifications", get(notifications::list_notifications))
        .route("/api/notifications/{id}/read", post(notifications::mark_read))
        // WebSocket
        .route("/ws", get(ws::ws_handler))
        .layer(middleware::from_fn_with_state(state.clone(), require_known_host))
        .with_state(state)
}
