//! Role & membership store and the moderation actions built on it.
//!
//! Membership is kept as rows of (community, username, set). Every mutation is
//! an add-to-set (insert, ignoring conflicts) or a pull (delete); mutations that
//! touch several sets run inside one transaction. `DatabaseTransaction` rolls
//! back when dropped, so any early `?` return aborts the whole action.

use std::collections::HashMap;

use sea_orm::*;
use uuid::Uuid;

use crate::entities::{appeal, community, membership};
use crate::error::ModerationError;
use crate::models::{
    CommunityView, CreateCommunityRequest, MemberSet, NewNotification, NotificationKind,
    NotificationView, Roles, MAX_COMMUNITY_NAME, MAX_DESCRIPTION, MAX_MESSAGE, MAX_TITLE,
};
use crate::services::audit;
use crate::services::notification::{self, best_effort};
use crate::state::AppState;

// ─── Store primitives ───

pub async fn find_community<C: ConnectionTrait>(
    conn: &C,
    community_id: &str,
) -> Result<community::Model, ModerationError> {
    community::Entity::find_by_id(community_id)
        .one(conn)
        .await?
        .ok_or(ModerationError::CommunityNotFound)
}

/// Add `username` to `set`. A no-op if already present.
pub(crate) async fn add_to_set<C: ConnectionTrait>(
    conn: &C,
    community_id: &str,
    username: &str,
    set: MemberSet,
) -> Result<(), DbErr> {
    let row = membership::ActiveModel {
        community_id: Set(community_id.to_string()),
        username: Set(username.to_string()),
        member_set: Set(set.as_str().to_string()),
        added_at: Set(chrono::Utc::now()),
    };
    membership::Entity::insert(row)
        .on_conflict(
            sea_query::OnConflict::columns([
                membership::Column::CommunityId,
                membership::Column::Username,
                membership::Column::MemberSet,
            ])
            .do_nothing()
            .to_owned(),
        )
        .do_nothing()
        .exec(conn)
        .await?;
    Ok(())
}

/// Remove `username` from every set in `sets`. A no-op for sets it is not in.
pub(crate) async fn pull_from_sets<C: ConnectionTrait>(
    conn: &C,
    community_id: &str,
    username: &str,
    sets: &[MemberSet],
) -> Result<(), DbErr> {
    membership::Entity::delete_many()
        .filter(membership::Column::CommunityId.eq(community_id))
        .filter(membership::Column::Username.eq(username))
        .filter(membership::Column::MemberSet.is_in(sets.iter().map(|s| s.as_str())))
        .exec(conn)
        .await?;
    Ok(())
}

/// Ban: add to `banned`, pull from `participants` and `moderators`.
pub(crate) async fn apply_ban<C: ConnectionTrait>(
    conn: &C,
    community_id: &str,
    username: &str,
) -> Result<(), DbErr> {
    add_to_set(conn, community_id, username, MemberSet::Banned).await?;
    pull_from_sets(
        conn,
        community_id,
        username,
        &[MemberSet::Participant, MemberSet::Moderator],
    )
    .await
}

pub async fn roles_of<C: ConnectionTrait>(
    conn: &C,
    community: &community::Model,
    username: &str,
) -> Result<Roles, DbErr> {
    let sets: Vec<String> = membership::Entity::find()
        .select_only()
        .column(membership::Column::MemberSet)
        .filter(membership::Column::CommunityId.eq(&community.id))
        .filter(membership::Column::Username.eq(username))
        .into_tuple()
        .all(conn)
        .await?;

    let mut roles = sets
        .iter()
        .filter_map(|s| MemberSet::parse(s))
        .fold(Roles::empty(), |acc, set| acc | Roles::from_set(set));
    if community.admin == username {
        roles.insert(Roles::ADMIN);
    }
    Ok(roles)
}

/// Loader used by the role cache.
pub async fn load_roles(
    db: &DatabaseConnection,
    community_id: &str,
    username: &str,
) -> Result<Roles, ModerationError> {
    let community = find_community(db, community_id).await?;
    Ok(roles_of(db, &community, username).await?)
}

pub async fn view<C: ConnectionTrait>(
    conn: &C,
    community: community::Model,
) -> Result<CommunityView, DbErr> {
    let rows = membership::Entity::find()
        .filter(membership::Column::CommunityId.eq(&community.id))
        .order_by_asc(membership::Column::AddedAt)
        .order_by_asc(membership::Column::Username)
        .all(conn)
        .await?;

    let mut sets: HashMap<MemberSet, Vec<String>> = HashMap::new();
    for row in rows {
        if let Some(set) = MemberSet::parse(&row.member_set) {
            sets.entry(set).or_default().push(row.username);
        }
    }

    let appeals: Vec<String> = appeal::Entity::find()
        .select_only()
        .column(appeal::Column::Id)
        .filter(appeal::Column::CommunityId.eq(&community.id))
        .order_by_asc(appeal::Column::AppealDateTime)
        .into_tuple()
        .all(conn)
        .await?;

    Ok(CommunityView {
        id: community.id,
        name: community.name,
        description: community.description,
        visibility: community.visibility,
        admin: community.admin,
        participants: sets.remove(&MemberSet::Participant).unwrap_or_default(),
        moderators: sets.remove(&MemberSet::Moderator).unwrap_or_default(),
        banned: sets.remove(&MemberSet::Banned).unwrap_or_default(),
        muted: sets.remove(&MemberSet::Muted).unwrap_or_default(),
        appeals,
        created_at: community.created_at,
    })
}

async fn reload<C: ConnectionTrait>(
    conn: &C,
    community_id: &str,
) -> Result<Option<CommunityView>, DbErr> {
    match community::Entity::find_by_id(community_id).one(conn).await? {
        Some(c) => Ok(Some(view(conn, c).await?)),
        None => Ok(None),
    }
}

/// User directory lookup: the admin and all moderators of a community.
pub async fn find_members<C: ConnectionTrait>(
    conn: &C,
    community: &community::Model,
) -> Result<Vec<String>, DbErr> {
    let mut staff = members_in(conn, &community.id, MemberSet::Moderator).await?;
    staff.push(community.admin.clone());
    staff.sort();
    staff.dedup();
    Ok(staff)
}

pub async fn members_in<C: ConnectionTrait>(
    conn: &C,
    community_id: &str,
    set: MemberSet,
) -> Result<Vec<String>, DbErr> {
    membership::Entity::find()
        .select_only()
        .column(membership::Column::Username)
        .filter(membership::Column::CommunityId.eq(community_id))
        .filter(membership::Column::MemberSet.eq(set.as_str()))
        .into_tuple()
        .all(conn)
        .await
}

/// Admin or moderator may act on ordinary members; only the admin may act on
/// moderators; nobody acts on the admin.
fn authorize_moderation(actor: Roles, target: Roles) -> Result<(), ModerationError> {
    if !actor.is_staff() {
        return Err(ModerationError::Unauthorized);
    }
    if target.contains(Roles::ADMIN) {
        return Err(ModerationError::AdminOrModCannotBeBanned);
    }
    if target.contains(Roles::MODERATOR) && !actor.contains(Roles::ADMIN) {
        return Err(ModerationError::ModCannotBanMod);
    }
    Ok(())
}

// ─── Operations ───

pub async fn create_community(
    state: &AppState,
    admin: &str,
    req: CreateCommunityRequest,
) -> Result<CommunityView, ModerationError> {
    let name = req.name.trim().to_string();
    if name.is_empty() || name.chars().count() > MAX_COMMUNITY_NAME {
        return Err(ModerationError::Validation(format!(
            "community name must be 1-{MAX_COMMUNITY_NAME} characters"
        )));
    }
    let description = req
        .description
        .unwrap_or_default()
        .chars()
        .take(MAX_DESCRIPTION)
        .collect::<String>();

    let community_id = Uuid::new_v4().to_string();
    let txn = state.begin_write().await?;

    let row = community::ActiveModel {
        id: Set(community_id.clone()),
        name: Set(name.clone()),
        description: Set(description),
        visibility: Set(req.visibility),
        admin: Set(admin.to_string()),
        created_at: Set(chrono::Utc::now()),
    };
    community::Entity::insert(row)
        .exec(&txn)
        .await
        .map_err(|e| ModerationError::on_unique_violation(e, ModerationError::NameTaken))?;

    // The admin is always a participant
    add_to_set(&txn, &community_id, admin, MemberSet::Participant).await?;

    let created = reload(&txn, &community_id)
        .await?
        .ok_or(ModerationError::Failed)?;
    txn.commit().await?;

    state.role_cache.invalidate(admin);
    tracing::info!("Community {name} ({community_id}) created by {admin}");
    Ok(created)
}

pub async fn get_community(
    db: &DatabaseConnection,
    community_id: &str,
) -> Result<CommunityView, ModerationError> {
    let community = find_community(db, community_id).await?;
    Ok(view(db, community).await?)
}

/// Public communities plus every community `username` participates in.
pub async fn list_communities(
    db: &DatabaseConnection,
    username: &str,
) -> Result<Vec<CommunityView>, ModerationError> {
    let joined: Vec<String> = membership::Entity::find()
        .select_only()
        .column(membership::Column::CommunityId)
        .filter(membership::Column::Username.eq(username))
        .filter(membership::Column::MemberSet.eq(MemberSet::Participant.as_str()))
        .into_tuple()
        .all(db)
        .await?;

    let communities = community::Entity::find()
        .filter(
            Condition::any()
                .add(community::Column::Visibility.eq(community::Visibility::Public))
                .add(community::Column::Id.is_in(joined)),
        )
        .order_by_asc(community::Column::CreatedAt)
        .all(db)
        .await?;

    let mut views = Vec::with_capacity(communities.len());
    for c in communities {
        views.push(view(db, c).await?);
    }
    Ok(views)
}

/// Join or leave. Leaving drops moderator status; a mute stays in place and
/// applies again on rejoin.
pub async fn toggle_membership(
    state: &AppState,
    community_id: &str,
    username: &str,
) -> Result<CommunityView, ModerationError> {
    let txn = state.begin_write().await?;
    let community = find_community(&txn, community_id).await?;
    let roles = roles_of(&txn, &community, username).await?;

    if roles.is_member() {
        if roles.contains(Roles::ADMIN) {
            return Err(ModerationError::AdminCannotLeave);
        }
        pull_from_sets(
            &txn,
            community_id,
            username,
            &[MemberSet::Participant, MemberSet::Moderator],
        )
        .await?;
        tracing::info!("{username} left community {community_id}");
    } else {
        if roles.contains(Roles::BANNED) {
            return Err(ModerationError::BannedFromCommunity);
        }
        add_to_set(&txn, community_id, username, MemberSet::Participant).await?;
        tracing::info!("{username} joined community {community_id}");
    }

    let updated = reload(&txn, community_id)
        .await?
        .ok_or(ModerationError::Failed)?;
    txn.commit().await?;

    state.role_cache.invalidate(username);
    Ok(updated)
}

/// Promote or demote a participant. The membership check and the write share
/// one transaction, so a user who leaves concurrently is never left behind as
/// a moderator.
pub async fn toggle_moderator(
    state: &AppState,
    community_id: &str,
    acting_admin: &str,
    username: &str,
) -> Result<CommunityView, ModerationError> {
    let txn = state.begin_write().await?;
    let community = find_community(&txn, community_id).await?;
    if community.admin != acting_admin {
        return Err(ModerationError::Unauthorized);
    }

    let roles = roles_of(&txn, &community, username).await?;
    if !roles.is_member() {
        return Err(ModerationError::NotAMember);
    }

    let action = if roles.contains(Roles::MODERATOR) {
        pull_from_sets(&txn, community_id, username, &[MemberSet::Moderator]).await?;
        "REMOVE_MODERATOR"
    } else {
        add_to_set(&txn, community_id, username, MemberSet::Moderator).await?;
        "ADD_MODERATOR"
    };

    let updated = reload(&txn, community_id)
        .await?
        .ok_or(ModerationError::Failed)?;
    txn.commit().await?;
    state.role_cache.invalidate(username);

    audit::record(&state.writer, community_id, acting_admin, action, Some(username), None).await;
    tracing::info!("{acting_admin} toggled moderator {username} in {community_id}: {action}");
    Ok(updated)
}

/// Ban or unban. The banned user is notified; unbanning is silent.
pub async fn toggle_ban_user(
    state: &AppState,
    community_id: &str,
    acting_user: &str,
    username: &str,
) -> Result<CommunityView, ModerationError> {
    let txn = state.begin_write().await?;
    let community = find_community(&txn, community_id).await?;
    let actor = roles_of(&txn, &community, acting_user).await?;
    let target = roles_of(&txn, &community, username).await?;
    authorize_moderation(actor, target)?;

    let banning = !target.contains(Roles::BANNED);
    if banning {
        apply_ban(&txn, community_id, username).await?;
    } else {
        pull_from_sets(&txn, community_id, username, &[MemberSet::Banned]).await?;
    }

    let updated = reload(&txn, community_id)
        .await?
        .ok_or(ModerationError::Failed)?;
    txn.commit().await?;
    state.role_cache.invalidate(username);

    let action = if banning { "BAN_USER" } else { "UNBAN_USER" };
    audit::record(&state.writer, community_id, acting_user, action, Some(username), None).await;
    tracing::info!("{acting_user} {action} {username} in community {community_id}");

    if banning {
        // Best-effort: the ban stands even if the notice is lost
        let notice = NewNotification::system(
            NotificationKind::Ban,
            "You have been banned",
            format!("You have been banned from {}.", community.name),
        )
        .with_context(community_id);
        best_effort(
            "ban notification",
            state.notifier().send(&[username.to_string()], notice),
        )
        .await;
    }

    Ok(updated)
}

/// Mute or unmute. Same authorization as banning; only muting notifies.
pub async fn toggle_mute_community_user(
    state: &AppState,
    community_id: &str,
    acting_user: &str,
    username: &str,
) -> Result<CommunityView, ModerationError> {
    let txn = state.begin_write().await?;
    let community = find_community(&txn, community_id).await?;
    let actor = roles_of(&txn, &community, acting_user).await?;
    let target = roles_of(&txn, &community, username).await?;
    authorize_moderation(actor, target)?;

    let muting = !target.contains(Roles::MUTED);
    if muting {
        if !target.is_member() {
            return Err(ModerationError::NotAMember);
        }
        add_to_set(&txn, community_id, username, MemberSet::Muted).await?;
    } else {
        pull_from_sets(&txn, community_id, username, &[MemberSet::Muted]).await?;
    }

    let updated = reload(&txn, community_id)
        .await?
        .ok_or(ModerationError::Failed)?;
    txn.commit().await?;
    state.role_cache.invalidate(username);

    let action = if muting { "MUTE_USER" } else { "UNMUTE_USER" };
    audit::record(&state.writer, community_id, acting_user, action, Some(username), None).await;

    if muting {
        // Best-effort: the mute stands even if the notice is lost
        let notice = NewNotification::system(
            NotificationKind::Mute,
            "You have been muted",
            format!("You can no longer post in {}.", community.name),
        )
        .with_context(community_id);
        best_effort(
            "mute notification",
            state.notifier().send(&[username.to_string()], notice),
        )
        .await;
    }

    Ok(updated)
}

/// Hard delete. Reports and appeals that point here are left behind and
/// ignored by readers.
pub async fn delete_community(
    state: &AppState,
    community_id: &str,
    username: &str,
) -> Result<(), ModerationError> {
    let txn = state.begin_write().await?;
    let community = find_community(&txn, community_id).await?;
    if community.admin != username {
        return Err(ModerationError::Unauthorized);
    }

    membership::Entity::delete_many()
        .filter(membership::Column::CommunityId.eq(community_id))
        .exec(&txn)
        .await?;
    let deleted = community::Entity::delete_by_id(community_id)
        .exec(&txn)
        .await?;
    if deleted.rows_affected == 0 {
        return Err(ModerationError::CommunityNotFound);
    }
    txn.commit().await?;

    state.role_cache.invalidate_community(community_id);
    tracing::info!("Community {} ({community_id}) deleted by {username}", community.name);
    Ok(())
}

/// Broadcast to every participant. The notification and its inbox references
/// commit together or not at all.
pub async fn send_community_announcement(
    state: &AppState,
    community_id: &str,
    acting_user: &str,
    title: &str,
    msg: &str,
) -> Result<NotificationView, ModerationError> {
    let title = title.trim();
    let msg = msg.trim();
    if title.is_empty() || title.chars().count() > MAX_TITLE {
        return Err(ModerationError::Validation(format!(
            "title must be 1-{MAX_TITLE} characters"
        )));
    }
    if msg.is_empty() || msg.chars().count() > MAX_MESSAGE {
        return Err(ModerationError::Validation(format!(
            "message must be 1-{MAX_MESSAGE} characters"
        )));
    }

    let txn = state.begin_write().await?;
    let community = find_community(&txn, community_id).await?;
    let actor = roles_of(&txn, &community, acting_user).await?;
    if !actor.is_staff() {
        return Err(ModerationError::Unauthorized);
    }

    let recipients = members_in(&txn, community_id, MemberSet::Participant).await?;
    let new = NewNotification {
        title: title.to_string(),
        msg: msg.to_string(),
        sender: acting_user.to_string(),
        context_id: Some(community_id.to_string()),
        kind: NotificationKind::Community,
    };
    let stored = notification::store(&txn, &recipients, new).await?;
    txn.commit().await?;

    state.notifier().push_live(&recipients, &stored);
    audit::record(
        &state.writer,
        community_id,
        acting_user,
        "ANNOUNCEMENT",
        None,
        Some(title),
    )
    .await;

    Ok(notification::to_view(&stored, false))
}
