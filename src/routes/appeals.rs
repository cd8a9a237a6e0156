use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::models::{Appeal, CommunityView, RespondAppealRequest, SubmitAppealRequest};
use crate::routes::{caller, ApiError};
use crate::services::appeal;
use crate::state::AppState;

pub async fn list_appeals(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<Appeal>>, ApiError> {
    let claims = caller(&state, &headers)?;
    Ok(Json(
        appeal::list_appeals(&state.db, &id, &claims.username).await?,
    ))
}

pub async fn submit_appeal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<SubmitAppealRequest>,
) -> Result<(StatusCode, Json<Appeal>), ApiError> {
    let claims = caller(&state, &headers)?;
    let submitted = appeal::submit_appeal(&state, &id, &claims.username, &req.description).await?;
    Ok((StatusCode::CREATED, Json(submitted)))
}

pub async fn respond_to_appeal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, appeal_id)): Path<(String, String)>,
    Json(req): Json<RespondAppealRequest>,
) -> Result<Json<CommunityView>, ApiError> {
    let claims = caller(&state, &headers)?;
    Ok(Json(
        appeal::respond_to_appeal(&state, &id, &appeal_id, req.decision, &claims.username).await?,
    ))
}
