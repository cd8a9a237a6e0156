//! Shared fixtures: an in-memory database with the real schema and a few
//! seeded communities.

#![allow(dead_code)]

use std::time::Duration;

use agora_server::config::ModerationPolicy;
use agora_server::db;
use agora_server::entities::report;
use agora_server::models::{
    CommunityView, CreateCommunityRequest, NotificationKind, NotificationView, ReportCategory,
    ReportStatus, Visibility,
};
use agora_server::services::{community, notification};
use agora_server::AppState;
use sea_orm::{EntityTrait, Set};

pub const JWT_SECRET: &str = "test-secret";

pub async fn test_state() -> AppState {
    test_state_with(ModerationPolicy::default()).await
}

pub async fn test_state_with(policy: ModerationPolicy) -> AppState {
    let pools = db::connect_in_memory()
        .await
        .expect("in-memory database");
    state_from(pools, policy)
}

/// State over a real database file with separate read and write pools. Keep
/// the returned directory alive for the duration of the test.
pub async fn file_state() -> (AppState, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("agora.db");
    let pools = db::init_pool(&path.to_string_lossy())
        .await
        .expect("file database");
    (state_from(pools, ModerationPolicy::default()), dir)
}

fn state_from(pools: db::DbPools, policy: ModerationPolicy) -> AppState {
    AppState::new(
        pools,
        JWT_SECRET.to_string(),
        "localhost".to_string(),
        policy,
        Duration::from_secs(60),
    )
}

/// Community `name` owned by `admin` with `members` joined.
pub async fn community_with(state: &AppState, admin: &str, members: &[&str]) -> CommunityView {
    let created = community::create_community(
        state,
        admin,
        CreateCommunityRequest {
            name: format!("community-of-{admin}-{}", uuid::Uuid::new_v4()),
            description: Some("test community".to_string()),
            visibility: Visibility::Public,
        },
    )
    .await
    .expect("create community");

    for member in members {
        community::toggle_membership(state, &created.id, member)
            .await
            .expect("join community");
    }
    community::get_community(&state.db, &created.id)
        .await
        .expect("reload community")
}

/// Write a report straight into the ledger with a chosen age and status.
pub async fn backdated_report(
    state: &AppState,
    community_id: &str,
    reported: &str,
    reporter: &str,
    age: chrono::Duration,
    status: ReportStatus,
) {
    let row = report::ActiveModel {
        id: Set(uuid::Uuid::new_v4().to_string()),
        community_id: Set(community_id.to_string()),
        reported_user: Set(reported.to_string()),
        reporter_user: Set(reporter.to_string()),
        reason: Set("seeded".to_string()),
        category: Set(ReportCategory::Spam),
        status: Set(status),
        created_at: Set(chrono::Utc::now() - age),
        reviewed_by: Set(None),
        reviewed_at: Set(None),
    };
    report::Entity::insert(row)
        .exec(&state.writer)
        .await
        .expect("insert report");
}

pub async fn inbox(state: &AppState, username: &str) -> Vec<NotificationView> {
    notification::notifications_for(&state.db, username)
        .await
        .expect("inbox")
}

pub async fn inbox_kinds(state: &AppState, username: &str) -> Vec<NotificationKind> {
    inbox(state, username).await.into_iter().map(|n| n.kind).collect()
}

/// The membership invariants that must hold after any sequence of operations.
pub fn assert_invariants(view: &CommunityView) {
    assert!(
        !view.banned.contains(&view.admin),
        "admin {} is banned",
        view.admin
    );
    assert!(
        view.participants.contains(&view.admin),
        "admin {} is not a participant",
        view.admin
    );
    for m in &view.moderators {
        assert!(view.participants.contains(m), "moderator {m} is not a participant");
    }
    for b in &view.banned {
        assert!(!view.participants.contains(b), "banned user {b} is still a participant");
    }
}
