//! Appeals: banned users ask to be reinstated, staff approve or deny.

use sea_orm::*;
use uuid::Uuid;

use crate::entities::appeal;
use crate::error::ModerationError;
use crate::models::{
    Appeal, AppealDecision, CommunityView, MemberSet, NewNotification, NotificationKind, Roles,
    MAX_APPEAL_DESCRIPTION,
};
use crate::services::audit;
use crate::services::community::{find_community, find_members, pull_from_sets, roles_of, view};
use crate::services::notification::{self, best_effort};
use crate::state::AppState;

/// Submit an appeal. The appeal and the notice to the community's staff commit
/// together; either both exist afterwards or neither does.
pub async fn submit_appeal(
    state: &AppState,
    community_id: &str,
    username: &str,
    description: &str,
) -> Result<Appeal, ModerationError> {
    let description = description.trim();
    if description.is_empty() || description.chars().count() > MAX_APPEAL_DESCRIPTION {
        return Err(ModerationError::Validation(format!(
            "description must be 1-{MAX_APPEAL_DESCRIPTION} characters"
        )));
    }

    let txn = state.begin_write().await?;
    let community = find_community(&txn, community_id).await?;
    if !roles_of(&txn, &community, username).await?.contains(Roles::BANNED) {
        return Err(ModerationError::NotBanned);
    }

    let pending = appeal::Entity::find()
        .filter(appeal::Column::CommunityId.eq(community_id))
        .filter(appeal::Column::Username.eq(username))
        .one(&txn)
        .await?;
    if pending.is_some() {
        return Err(ModerationError::AppealAlreadyPending);
    }

    let model = appeal::Model {
        id: Uuid::new_v4().to_string(),
        community_id: community_id.to_string(),
        username: username.to_string(),
        description: description.to_string(),
        appeal_date_time: chrono::Utc::now(),
        reviewed: false,
    };
    let row = appeal::ActiveModel {
        id: Set(model.id.clone()),
        community_id: Set(model.community_id.clone()),
        username: Set(model.username.clone()),
        description: Set(model.description.clone()),
        appeal_date_time: Set(model.appeal_date_time),
        reviewed: Set(false),
    };
    appeal::Entity::insert(row)
        .exec(&txn)
        .await
        .map_err(|e| ModerationError::on_unique_violation(e, ModerationError::AppealAlreadyPending))?;

    let staff = find_members(&txn, &community).await?;
    let notice = NewNotification::system(
        NotificationKind::Appeal,
        "New ban appeal",
        format!("{username} appealed their ban from {}.", community.name),
    )
    .with_context(model.id.clone());
    let stored = notification::store(&txn, &staff, notice).await?;
    txn.commit().await?;

    state.notifier().push_live(&staff, &stored);
    tracing::info!("{username} submitted appeal {} in {community_id}", model.id);
    Ok(model)
}

/// Open appeals of a community, oldest first. Staff only.
pub async fn list_appeals(
    db: &DatabaseConnection,
    community_id: &str,
    acting_user: &str,
) -> Result<Vec<Appeal>, ModerationError> {
    let community = find_community(db, community_id).await?;
    if !roles_of(db, &community, acting_user).await?.is_staff() {
        return Err(ModerationError::Unauthorized);
    }
    Ok(appeal::Entity::find()
        .filter(appeal::Column::CommunityId.eq(community_id))
        .order_by_asc(appeal::Column::AppealDateTime)
        .all(db)
        .await?)
}

/// Approve or deny an appeal. The appeal is consumed by the first responder;
/// anyone after that gets `AppealNotFound`.
pub async fn respond_to_appeal(
    state: &AppState,
    community_id: &str,
    appeal_id: &str,
    decision: AppealDecision,
    acting_user: &str,
) -> Result<CommunityView, ModerationError> {
    let txn = state.begin_write().await?;
    let community = find_community(&txn, community_id).await?;
    if !roles_of(&txn, &community, acting_user).await?.is_staff() {
        return Err(ModerationError::Unauthorized);
    }

    let found = appeal::Entity::find_by_id(appeal_id)
        .filter(appeal::Column::CommunityId.eq(community_id))
        .one(&txn)
        .await?
        .ok_or(ModerationError::AppealNotFound)?;

    // Claim it: only one responder can delete the row
    let claimed = appeal::Entity::delete_many()
        .filter(appeal::Column::Id.eq(appeal_id))
        .filter(appeal::Column::CommunityId.eq(community_id))
        .exec(&txn)
        .await?;
    if claimed.rows_affected == 0 {
        return Err(ModerationError::AppealNotFound);
    }

    if decision == AppealDecision::Approve {
        pull_from_sets(
            &txn,
            community_id,
            &found.username,
            &[MemberSet::Banned, MemberSet::Muted],
        )
        .await?;
    }

    let current = crate::entities::community::Entity::find_by_id(community_id)
        .one(&txn)
        .await?
        .ok_or(ModerationError::UpdateFailed)?;
    let updated = view(&txn, current).await?;
    txn.commit().await?;

    let action = match decision {
        AppealDecision::Approve => "APPROVE_APPEAL",
        AppealDecision::Deny => "DENY_APPEAL",
    };
    audit::record(
        &state.writer,
        community_id,
        acting_user,
        action,
        Some(&found.username),
        None,
    )
    .await;
    tracing::info!("{acting_user} {action} {appeal_id} for {} in {community_id}", found.username);

    if decision == AppealDecision::Approve {
        state.role_cache.invalidate(&found.username);
        // Best-effort: the user is unbanned regardless
        let notice = NewNotification::system(
            NotificationKind::Unban,
            "Your appeal was approved",
            format!("You have been unbanned from {}.", community.name),
        )
        .with_context(community_id);
        best_effort(
            "unban notification",
            state.notifier().send(&[found.username.clone()], notice),
        )
        .await;
    }

    Ok(updated)
}
