use sea_orm::*;

use crate::entities::audit_log;
use crate::error::ModerationError;
use crate::models::AuditLog;

const AUDIT_PAGE: u64 = 100;

/// Append a moderation event. Failures are logged, never returned.
pub async fn record(
    db: &DatabaseConnection,
    community_id: &str,
    actor: &str,
    action: &str,
    target: Option<&str>,
    details: Option<&str>,
) {
    let row = audit_log::ActiveModel {
        id: Set(uuid::Uuid::new_v4().to_string()),
        community_id: Set(community_id.to_string()),
        actor: Set(actor.to_string()),
        action: Set(action.to_string()),
        target: Set(target.map(str::to_string)),
        details: Set(details.map(str::to_string)),
        created_at: Set(chrono::Utc::now()),
    };
    if let Err(e) = audit_log::Entity::insert(row).exec(db).await {
        tracing::warn!("Failed to write audit log {action} for {community_id}: {e}");
    }
}

/// Latest entries first.
pub async fn list(
    db: &DatabaseConnection,
    community_id: &str,
) -> Result<Vec<AuditLog>, ModerationError> {
    Ok(audit_log::Entity::find()
        .filter(audit_log::Column::CommunityId.eq(community_id))
        .order_by_desc(audit_log::Column::CreatedAt)
        .limit(AUDIT_PAGE)
        .all(db)
        .await?)
}
