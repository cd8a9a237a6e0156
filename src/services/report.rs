//! Report ledger and the sliding-window auto-ban evaluator.

use sea_orm::*;
use uuid::Uuid;

use crate::entities::{community, report};
use crate::error::ModerationError;
use crate::models::{
    AutoBanOutcome, AutoBanReason, CreateReportRequest, NewNotification, NotificationKind, Report,
    ReportCreated, ReportStatus, Roles, MAX_REPORT_REASON, SYSTEM_SENDER,
};
use crate::services::audit;
use crate::services::community::{apply_ban, find_community, find_members, roles_of};
use crate::services::notification::best_effort;
use crate::state::AppState;

/// File a report, then run the auto-ban evaluator on the reported user.
pub async fn create_report(
    state: &AppState,
    community_id: &str,
    reporter_user: &str,
    req: CreateReportRequest,
) -> Result<ReportCreated, ModerationError> {
    let reported_user = req.reported_user.trim().to_string();
    let reason = req.reason.trim().to_string();
    if reason.is_empty() || reason.chars().count() > MAX_REPORT_REASON {
        return Err(ModerationError::Validation(format!(
            "reason must be 1-{MAX_REPORT_REASON} characters"
        )));
    }

    if reported_user == reporter_user {
        return Err(ModerationError::SelfReport);
    }

    let community = find_community(&state.db, community_id).await?;
    if !roles_of(&state.db, &community, reporter_user).await?.is_member() {
        return Err(ModerationError::MustBeMember);
    }
    if !roles_of(&state.db, &community, &reported_user).await?.is_member() {
        return Err(ModerationError::CanOnlyReportMembers);
    }

    let existing = report::Entity::find()
        .filter(report::Column::CommunityId.eq(community_id))
        .filter(report::Column::ReportedUser.eq(&reported_user))
        .filter(report::Column::ReporterUser.eq(reporter_user))
        .one(&state.db)
        .await?;
    if existing.is_some() {
        return Err(ModerationError::AlreadyReported);
    }

    let model = report::Model {
        id: Uuid::new_v4().to_string(),
        community_id: community_id.to_string(),
        reported_user: reported_user.clone(),
        reporter_user: reporter_user.to_string(),
        reason,
        category: req.category,
        status: ReportStatus::Pending,
        created_at: chrono::Utc::now(),
        reviewed_by: None,
        reviewed_at: None,
    };
    insert_report(&state.writer, &model)
        .await
        // A concurrent duplicate can still slip past the lookup above
        .map_err(|e| ModerationError::on_unique_violation(e, ModerationError::AlreadyReported))?;

    tracing::info!(
        "{reporter_user} reported {reported_user} in {community_id} ({:?})",
        model.category
    );

    let auto_ban = check_and_apply_auto_ban(state, community_id, &reported_user).await;
    Ok(ReportCreated {
        ban_applied: auto_ban.banned,
        report: model,
        auto_ban,
    })
}

pub(crate) async fn insert_report<C: ConnectionTrait>(conn: &C, model: &Report) -> Result<(), DbErr> {
    let row = report::ActiveModel {
        id: Set(model.id.clone()),
        community_id: Set(model.community_id.clone()),
        reported_user: Set(model.reported_user.clone()),
        reporter_user: Set(model.reporter_user.clone()),
        reason: Set(model.reason.clone()),
        category: Set(model.category),
        status: Set(model.status),
        created_at: Set(model.created_at),
        reviewed_by: Set(model.reviewed_by.clone()),
        reviewed_at: Set(model.reviewed_at),
    };
    report::Entity::insert(row).exec(conn).await?;
    Ok(())
}

/// Distinct reporters of `reported_user` in the current window, ignoring
/// dismissed reports.
pub async fn distinct_reporters<C: ConnectionTrait>(
    conn: &C,
    community_id: &str,
    reported_user: &str,
    window: chrono::Duration,
) -> Result<usize, DbErr> {
    let cutoff = chrono::Utc::now() - window;
    let reporters: Vec<String> = report::Entity::find()
        .select_only()
        .column(report::Column::ReporterUser)
        .distinct()
        .filter(report::Column::CommunityId.eq(community_id))
        .filter(report::Column::ReportedUser.eq(reported_user))
        .filter(report::Column::CreatedAt.gte(cutoff))
        .filter(report::Column::Status.ne(ReportStatus::Dismissed))
        .into_tuple()
        .all(conn)
        .await?;
    Ok(reporters.len())
}

/// Ban `reported_user` once enough distinct members reported them within the
/// window. Never fails: internal errors come back as `banned: false` with
/// `error` set.
pub async fn check_and_apply_auto_ban(
    state: &AppState,
    community_id: &str,
    reported_user: &str,
) -> AutoBanOutcome {
    match evaluate_auto_ban(state, community_id, reported_user).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!("Auto-ban check for {reported_user} in {community_id} failed: {e}");
            AutoBanOutcome::failed(e)
        }
    }
}

async fn evaluate_auto_ban(
    state: &AppState,
    community_id: &str,
    reported_user: &str,
) -> Result<AutoBanOutcome, ModerationError> {
    let policy = state.policy;
    let count = distinct_reporters(&state.db, community_id, reported_user, policy.window).await?;
    if count < policy.threshold {
        return Ok(AutoBanOutcome::not_banned(count, AutoBanReason::BelowThreshold));
    }

    let txn = state.begin_write().await?;
    let community = find_community(&txn, community_id).await?;
    let roles = roles_of(&txn, &community, reported_user).await?;
    if roles.contains(Roles::BANNED) {
        return Ok(AutoBanOutcome::not_banned(count, AutoBanReason::AlreadyBanned));
    }
    if roles.is_staff() {
        tracing::warn!(
            "{reported_user} crossed the auto-ban threshold in {community_id} but holds a privileged role"
        );
        return Ok(AutoBanOutcome::not_banned(count, AutoBanReason::PrivilegedRole));
    }

    apply_ban(&txn, community_id, reported_user).await?;
    let staff = find_members(&txn, &community).await?;
    txn.commit().await?;

    state.role_cache.invalidate(reported_user);
    tracing::info!(
        "Auto-banned {reported_user} from {community_id} after reports from {count} members"
    );
    audit::record(
        &state.writer,
        community_id,
        SYSTEM_SENDER,
        "AUTO_BAN",
        Some(reported_user),
        Some(&format!("{count} distinct reporters")),
    )
    .await;

    notify_auto_ban(state, &community, reported_user, &staff, count).await;

    Ok(AutoBanOutcome {
        banned: true,
        report_count: Some(count),
        reason: Some(AutoBanReason::ThresholdReached),
        error: None,
    })
}

/// Both notices are best-effort; the ban is already committed.
async fn notify_auto_ban(
    state: &AppState,
    community: &community::Model,
    reported_user: &str,
    staff: &[String],
    count: usize,
) {
    let notifier = state.notifier();

    let to_user = NewNotification::system(
        NotificationKind::Ban,
        "You have been banned",
        format!(
            "You have been automatically banned from {} after being reported by multiple members.",
            community.name
        ),
    )
    .with_context(community.id.clone());
    best_effort(
        "auto-ban notification",
        notifier.send(&[reported_user.to_string()], to_user),
    )
    .await;

    let to_staff = NewNotification::system(
        NotificationKind::Report,
        "User automatically banned",
        format!(
            "{reported_user} was automatically banned from {} after {count} members reported them.",
            community.name
        ),
    )
    .with_context(community.id.clone());
    best_effort("auto-ban staff notification", notifier.send(staff, to_staff)).await;
}

/// Reports filed against `username` in a community, newest first.
pub async fn get_reports_by_user(
    db: &DatabaseConnection,
    community_id: &str,
    username: &str,
) -> Result<Vec<Report>, ModerationError> {
    Ok(report::Entity::find()
        .inner_join(community::Entity)
        .filter(report::Column::CommunityId.eq(community_id))
        .filter(report::Column::ReportedUser.eq(username))
        .order_by_desc(report::Column::CreatedAt)
        .all(db)
        .await?)
}

/// Pending reports of a community, newest first.
pub async fn get_pending_reports_by_community(
    db: &DatabaseConnection,
    community_id: &str,
) -> Result<Vec<Report>, ModerationError> {
    find_community(db, community_id).await?;
    Ok(report::Entity::find()
        .filter(report::Column::CommunityId.eq(community_id))
        .filter(report::Column::Status.eq(ReportStatus::Pending))
        .order_by_desc(report::Column::CreatedAt)
        .all(db)
        .await?)
}

/// Mark a report reviewed or dismissed. Only staff of the report's community.
pub async fn update_report_status(
    state: &AppState,
    report_id: &str,
    status: ReportStatus,
    reviewed_by: &str,
) -> Result<Report, ModerationError> {
    if status == ReportStatus::Pending {
        return Err(ModerationError::Validation(
            "status must be reviewed or dismissed".into(),
        ));
    }

    let existing = report::Entity::find_by_id(report_id)
        .one(&state.db)
        .await?
        .ok_or(ModerationError::ReportNotFound)?;
    // Reports of a deleted community are no longer actionable
    let community = find_community(&state.db, &existing.community_id).await?;
    if !roles_of(&state.db, &community, reviewed_by).await?.is_staff() {
        return Err(ModerationError::Unauthorized);
    }

    let mut active: report::ActiveModel = existing.into();
    active.status = Set(status);
    active.reviewed_by = Set(Some(reviewed_by.to_string()));
    active.reviewed_at = Set(Some(chrono::Utc::now()));
    let updated = active.update(&state.writer).await?;

    audit::record(
        &state.writer,
        &community.id,
        reviewed_by,
        "REVIEW_REPORT",
        Some(&updated.reported_user),
        Some(&format!("{status:?}")),
    )
    .await;
    Ok(updated)
}
