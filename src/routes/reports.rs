use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::models::{CreateReportRequest, Report, ReportCreated, UpdateReportStatusRequest};
use crate::routes::{caller, require_staff, ApiError};
use crate::services::report;
use crate::state::AppState;

// ─── File a report (runs the auto-ban check) ───
pub async fn create_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<CreateReportRequest>,
) -> Result<(StatusCode, Json<ReportCreated>), ApiError> {
    let claims = caller(&state, &headers)?;
    let created = report::create_report(&state, &id, &claims.username, req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn pending_reports(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<Report>>, ApiError> {
    let claims = caller(&state, &headers)?;
    require_staff(&state, &id, &claims.username).await?;
    Ok(Json(
        report::get_pending_reports_by_community(&state.db, &id).await?,
    ))
}

pub async fn reports_by_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, username)): Path<(String, String)>,
) -> Result<Json<Vec<Report>>, ApiError> {
    let claims = caller(&state, &headers)?;
    require_staff(&state, &id, &claims.username).await?;
    Ok(Json(
        report::get_reports_by_user(&state.db, &id, &username).await?,
    ))
}

// ─── Review a report (staff of the report's community) ───
pub async fn update_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(report_id): Path<String>,
    Json(req): Json<UpdateReportStatusRequest>,
) -> Result<Json<Report>, ApiError> {
    let claims = caller(&state, &headers)?;
    Ok(Json(
        report::update_report_status(&state, &report_id, req.status, &claims.username).await?,
    ))
}
