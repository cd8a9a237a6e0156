use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::models::NotificationView;
use crate::routes::{caller, ApiError};
use crate::services::notification;
use crate::state::AppState;

pub async fn list_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<NotificationView>>, ApiError> {
    let claims = caller(&state, &headers)?;
    Ok(Json(
        notification::notifications_for(&state.db, &claims.username).await?,
    ))
}

pub async fn mark_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let claims = caller(&state, &headers)?;
    notification::mark_read(&state.writer, &claims.username, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
