use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::models::{
    AnnouncementRequest, AuditLog, CommunityView, CreateCommunityRequest, MyRoles,
    NotificationView,
};
use crate::routes::{cached_roles, caller, require_staff, ApiError};
use crate::services::{audit, community};
use crate::state::AppState;

// ─── List communities visible to the caller ───
pub async fn list_communities(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<CommunityView>>, ApiError> {
    let claims = caller(&state, &headers)?;
    let communities = community::list_communities(&state.db, &claims.username).await?;
    Ok(Json(communities))
}

// ─── Create a new community ───
pub async fn create_community(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateCommunityRequest>,
) -> Result<(StatusCode, Json<CommunityView>), ApiError> {
    let claims = caller(&state, &headers)?;
    let created = community::create_community(&state, &claims.username, req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_community(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CommunityView>, ApiError> {
    Ok(Json(community::get_community(&state.db, &id).await?))
}

// ─── Delete a community (admin only) ───
pub async fn delete_community(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let claims = caller(&state, &headers)?;
    community::delete_community(&state, &id, &claims.username).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn my_roles(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<MyRoles>, ApiError> {
    let claims = caller(&state, &headers)?;
    let roles = cached_roles(&state, &id, &claims.username).await?;
    Ok(Json(MyRoles {
        community_id: id,
        username: claims.username,
        can_post: roles.can_post(),
        roles,
    }))
}

// ─── Join / leave ───
pub async fn toggle_membership(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<CommunityView>, ApiError> {
    let claims = caller(&state, &headers)?;
    Ok(Json(
        community::toggle_membership(&state, &id, &claims.username).await?,
    ))
}

pub async fn toggle_moderator(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, username)): Path<(String, String)>,
) -> Result<Json<CommunityView>, ApiError> {
    let claims = caller(&state, &headers)?;
    Ok(Json(
        community::toggle_moderator(&state, &id, &claims.username, &username).await?,
    ))
}

pub async fn toggle_ban(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, username)): Path<(String, String)>,
) -> Result<Json<CommunityView>, ApiError> {
    let claims = caller(&state, &headers)?;
    Ok(Json(
        community::toggle_ban_user(&state, &id, &claims.username, &username).await?,
    ))
}

pub async fn toggle_mute(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, username)): Path<(String, String)>,
) -> Result<Json<CommunityView>, ApiError> {
    let claims = caller(&state, &headers)?;
    Ok(Json(
        community::toggle_mute_community_user(&state, &id, &claims.username, &username).await?,
    ))
}

pub async fn send_announcement(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<AnnouncementRequest>,
) -> Result<(StatusCode, Json<NotificationView>), ApiError> {
    let claims = caller(&state, &headers)?;
    let sent =
        community::send_community_announcement(&state, &id, &claims.username, &req.title, &req.msg)
            .await?;
    Ok((StatusCode::CREATED, Json(sent)))
}

pub async fn audit_logs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<AuditLog>>, ApiError> {
    let claims = caller(&state, &headers)?;
    require_staff(&state, &id, &claims.username).await?;
    Ok(Json(audit::list(&state.db, &id).await?))
}
