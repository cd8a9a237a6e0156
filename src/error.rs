//! Tagged errors returned by every moderation, report and appeal operation.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::{DbErr, SqlErr};
use serde::Serialize;
use thiserror::Error;

/// Coarse classification callers can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    Conflict,
    ValidationFailed,
    StorageFailure,
}

impl ErrorKind {
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::ValidationFailed => StatusCode::BAD_REQUEST,
            ErrorKind::StorageFailure => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("community not found")]
    CommunityNotFound,

    #[error("report not found")]
    ReportNotFound,

    #[error("appeal not found")]
    AppealNotFound,

    #[error("notification not found")]
    NotificationNotFound,

    #[error("user is not a member of this community")]
    NotAMember,

    #[error("you are not allowed to perform this action")]
    Unauthorized,

    #[error("the admin cannot leave the community; delete it instead")]
    AdminCannotLeave,

    #[error("the admin cannot be banned or muted")]
    AdminOrModCannotBeBanned,

    #[error("moderators cannot ban or mute other moderators")]
    ModCannotBanMod,

    #[error("you must be a member of this community to report")]
    MustBeMember,

    #[error("you can only report members of this community")]
    CanOnlyReportMembers,

    #[error("you cannot report yourself")]
    SelfReport,

    #[error("you have already reported this user in this community")]
    AlreadyReported,

    #[error("an appeal for this community is already pending")]
    AppealAlreadyPending,

    #[error("user is not banned from this community")]
    NotBanned,

    #[error("you are banned from this community")]
    BannedFromCommunity,

    #[error("a community with this name already exists")]
    NameTaken,

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("operation failed")]
    Failed,

    #[error("community update failed")]
    UpdateFailed,

    #[error("storage error: {0}")]
    Storage(#[from] DbErr),
}

impl ModerationError {
    pub fn kind(&self) -> ErrorKind {
        use ModerationError::*;
        match self {
            CommunityNotFound | ReportNotFound | AppealNotFound | NotificationNotFound
            | NotAMember => ErrorKind::NotFound,
            Unauthorized | AdminOrModCannotBeBanned | ModCannotBanMod | MustBeMember
            | BannedFromCommunity => ErrorKind::Unauthorized,
            AdminCannotLeave | AlreadyReported | AppealAlreadyPending | NameTaken => {
                ErrorKind::Conflict
            }
            SelfReport | CanOnlyReportMembers | NotBanned | Validation(_) => {
                ErrorKind::ValidationFailed
            }
            Failed | UpdateFailed | Storage(_) => ErrorKind::StorageFailure,
        }
    }

    /// Maps a unique-index violation to `conflict`, anything else to `Storage`.
    pub fn on_unique_violation(err: DbErr, conflict: ModerationError) -> ModerationError {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => conflict,
            _ => ModerationError::Storage(err),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    kind: ErrorKind,
}

impl IntoResponse for ModerationError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        if kind == ErrorKind::StorageFailure {
            tracing::error!("Moderation operation failed: {self}");
        }
        let body = ErrorBody {
            error: self.to_string(),
            kind,
        };
        (kind.status(), Json(body)).into_response()
    }
}
