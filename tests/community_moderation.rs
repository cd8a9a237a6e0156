mod common;

use agora_server::models::{
    CreateCommunityRequest, NotificationKind, Roles, Visibility, WsServerMessage,
};
use agora_server::services::{audit, community};
use agora_server::{ErrorKind, ModerationError};
use common::{assert_invariants, community_with, inbox, inbox_kinds, test_state};

#[tokio::test]
async fn creator_becomes_admin_and_participant() {
    let state = test_state().await;
    let created = community::create_community(
        &state,
        "alice",
        CreateCommunityRequest {
            name: "  rustaceans  ".into(),
            description: None,
            visibility: Visibility::Private,
        },
    )
    .await
    .unwrap();

    assert_eq!(created.name, "rustaceans");
    assert_eq!(created.admin, "alice");
    assert_eq!(created.participants, vec!["alice".to_string()]);
    assert!(created.moderators.is_empty());
    assert_invariants(&created);

    let dup = community::create_community(
        &state,
        "bob",
        CreateCommunityRequest {
            name: "rustaceans".into(),
            description: None,
            visibility: Visibility::Public,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(dup, ModerationError::NameTaken));
    assert_eq!(dup.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn blank_name_is_rejected() {
    let state = test_state().await;
    let err = community::create_community(
        &state,
        "alice",
        CreateCommunityRequest {
            name: "   ".into(),
            description: None,
            visibility: Visibility::Public,
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailed);
}

#[tokio::test]
async fn private_communities_are_listed_only_for_members() {
    let state = test_state().await;
    let public = community_with(&state, "alice", &[]).await;
    let private = community::create_community(
        &state,
        "carol",
        CreateCommunityRequest {
            name: "hidden".into(),
            description: None,
            visibility: Visibility::Private,
        },
    )
    .await
    .unwrap();

    let for_bob = community::list_communities(&state.db, "bob").await.unwrap();
    let ids: Vec<_> = for_bob.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec![public.id.as_str()]);

    let for_carol = community::list_communities(&state.db, "carol").await.unwrap();
    assert!(for_carol.iter().any(|c| c.id == private.id));
    assert!(for_carol.iter().any(|c| c.id == public.id));
}

#[tokio::test]
async fn toggling_membership_twice_restores_the_original_state() {
    let state = test_state().await;
    let c = community_with(&state, "alice", &[]).await;

    let joined = community::toggle_membership(&state, &c.id, "bob").await.unwrap();
    assert!(joined.participants.contains(&"bob".to_string()));

    let left = community::toggle_membership(&state, &c.id, "bob").await.unwrap();
    assert_eq!(left.participants, c.participants);
    assert_invariants(&left);
}

#[tokio::test]
async fn admin_cannot_leave() {
    let state = test_state().await;
    let c = community_with(&state, "alice", &["bob"]).await;

    let err = community::toggle_membership(&state, &c.id, "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, ModerationError::AdminCannotLeave));

    let after = community::get_community(&state.db, &c.id).await.unwrap();
    assert!(after.participants.contains(&"alice".to_string()));
}

#[tokio::test]
async fn leaving_drops_moderator_status_but_not_a_mute() {
    let state = test_state().await;
    let c = community_with(&state, "alice", &["bob", "carol"]).await;
    community::toggle_moderator(&state, &c.id, "alice", "bob")
        .await
        .unwrap();
    community::toggle_mute_community_user(&state, &c.id, "alice", "carol")
        .await
        .unwrap();

    community::toggle_membership(&state, &c.id, "bob").await.unwrap();
    let after = community::toggle_membership(&state, &c.id, "carol").await.unwrap();

    assert!(after.moderators.is_empty());
    assert_eq!(after.participants, vec!["alice".to_string()]);
    assert_eq!(after.muted, vec!["carol".to_string()]);
    assert_invariants(&after);

    // Rejoining does not shake off the mute, nor restore moderation rights
    let rejoined = community::toggle_membership(&state, &c.id, "carol").await.unwrap();
    assert!(!rejoined.roles_of("carol").can_post());
    let rejoined = community::toggle_membership(&state, &c.id, "bob").await.unwrap();
    assert!(!rejoined.roles_of("bob").is_staff());
}

#[tokio::test]
async fn muted_user_who_left_can_still_be_unmuted() {
    let state = test_state().await;
    let c = community_with(&state, "alice", &["carol"]).await;
    community::toggle_mute_community_user(&state, &c.id, "alice", "carol")
        .await
        .unwrap();
    community::toggle_membership(&state, &c.id, "carol").await.unwrap();

    let unmuted = community::toggle_mute_community_user(&state, &c.id, "alice", "carol")
        .await
        .unwrap();
    assert!(unmuted.muted.is_empty());
}

#[tokio::test]
async fn former_member_cannot_be_promoted() {
    let state = test_state().await;
    let c = community_with(&state, "alice", &["bob"]).await;
    community::toggle_membership(&state, &c.id, "bob").await.unwrap();

    let err = community::toggle_moderator(&state, &c.id, "alice", "bob")
        .await
        .unwrap_err();
    assert!(matches!(err, ModerationError::NotAMember));
    let after = community::get_community(&state.db, &c.id).await.unwrap();
    assert!(after.moderators.is_empty());
    assert_invariants(&after);
}

#[tokio::test]
async fn moderator_toggle_is_admin_only() {
    let state = test_state().await;
    let c = community_with(&state, "alice", &["bob", "carol"]).await;

    let err = community::toggle_moderator(&state, &c.id, "bob", "carol")
        .await
        .unwrap_err();
    assert!(matches!(err, ModerationError::Unauthorized));

    let err = community::toggle_moderator(&state, &c.id, "alice", "dave")
        .await
        .unwrap_err();
    assert!(matches!(err, ModerationError::NotAMember));

    let err = community::toggle_moderator(&state, "missing", "alice", "bob")
        .await
        .unwrap_err();
    assert!(matches!(err, ModerationError::CommunityNotFound));

    let promoted = community::toggle_moderator(&state, &c.id, "alice", "bob")
        .await
        .unwrap();
    assert_eq!(promoted.moderators, vec!["bob".to_string()]);
    let demoted = community::toggle_moderator(&state, &c.id, "alice", "bob")
        .await
        .unwrap();
    assert!(demoted.moderators.is_empty());
    assert!(demoted.participants.contains(&"bob".to_string()));
}

#[tokio::test]
async fn ban_removes_member_and_notifies_only_on_ban() {
    let state = test_state().await;
    let c = community_with(&state, "alice", &["bob", "carol"]).await;
    community::toggle_moderator(&state, &c.id, "alice", "carol")
        .await
        .unwrap();

    // Banning a moderator requires the admin, and strips the moderator role
    let banned = community::toggle_ban_user(&state, &c.id, "alice", "carol")
        .await
        .unwrap();
    assert_eq!(banned.banned, vec!["carol".to_string()]);
    assert!(!banned.participants.contains(&"carol".to_string()));
    assert!(banned.moderators.is_empty());
    assert_invariants(&banned);

    let notices = inbox(&state, "carol").await;
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, NotificationKind::Ban);
    assert_eq!(notices[0].context_id.as_deref(), Some(c.id.as_str()));
    assert!(!notices[0].read);

    let unbanned = community::toggle_ban_user(&state, &c.id, "alice", "carol")
        .await
        .unwrap();
    assert!(unbanned.banned.is_empty());
    // Unbanning does not restore participation
    assert!(!unbanned.participants.contains(&"carol".to_string()));
    assert_eq!(inbox(&state, "carol").await.len(), 1);
}

#[tokio::test]
async fn banned_user_cannot_rejoin() {
    let state = test_state().await;
    let c = community_with(&state, "alice", &["bob"]).await;
    community::toggle_ban_user(&state, &c.id, "alice", "bob")
        .await
        .unwrap();

    let err = community::toggle_membership(&state, &c.id, "bob")
        .await
        .unwrap_err();
    assert!(matches!(err, ModerationError::BannedFromCommunity));
}

#[tokio::test]
async fn moderator_cannot_ban_another_moderator() {
    let state = test_state().await;
    let c = community_with(&state, "alice", &["mod1", "mod2"]).await;
    community::toggle_moderator(&state, &c.id, "alice", "mod1")
        .await
        .unwrap();
    let before = community::toggle_moderator(&state, &c.id, "alice", "mod2")
        .await
        .unwrap();

    let err = community::toggle_ban_user(&state, &c.id, "mod1", "mod2")
        .await
        .unwrap_err();
    assert!(matches!(err, ModerationError::ModCannotBanMod));
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    let after = community::get_community(&state.db, &c.id).await.unwrap();
    assert_eq!(after.participants, before.participants);
    assert_eq!(after.moderators, before.moderators);
    assert!(after.banned.is_empty());
}

#[tokio::test]
async fn nobody_can_ban_the_admin() {
    let state = test_state().await;
    let c = community_with(&state, "alice", &["bob"]).await;
    community::toggle_moderator(&state, &c.id, "alice", "bob")
        .await
        .unwrap();

    let err = community::toggle_ban_user(&state, &c.id, "bob", "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, ModerationError::AdminOrModCannotBeBanned));
}

#[tokio::test]
async fn plain_members_cannot_moderate() {
    let state = test_state().await;
    let c = community_with(&state, "alice", &["bob", "carol"]).await;

    let ban = community::toggle_ban_user(&state, &c.id, "bob", "carol")
        .await
        .unwrap_err();
    assert!(matches!(ban, ModerationError::Unauthorized));

    let mute = community::toggle_mute_community_user(&state, &c.id, "bob", "carol")
        .await
        .unwrap_err();
    assert!(matches!(mute, ModerationError::Unauthorized));
}

#[tokio::test]
async fn moderator_can_mute_members_and_only_mute_notifies() {
    let state = test_state().await;
    let c = community_with(&state, "alice", &["bob", "carol"]).await;
    community::toggle_moderator(&state, &c.id, "alice", "bob")
        .await
        .unwrap();

    let muted = community::toggle_mute_community_user(&state, &c.id, "bob", "carol")
        .await
        .unwrap();
    assert_eq!(muted.muted, vec!["carol".to_string()]);
    assert!(muted.participants.contains(&"carol".to_string()));
    assert!(!muted.roles_of("carol").can_post());

    let unmuted = community::toggle_mute_community_user(&state, &c.id, "bob", "carol")
        .await
        .unwrap();
    assert!(unmuted.muted.is_empty());
    assert_eq!(inbox_kinds(&state, "carol").await, vec![NotificationKind::Mute]);

    let err = community::toggle_mute_community_user(&state, &c.id, "bob", "dave")
        .await
        .unwrap_err();
    assert!(matches!(err, ModerationError::NotAMember));
}

#[tokio::test]
async fn delete_is_admin_only_and_final() {
    let state = test_state().await;
    let c = community_with(&state, "alice", &["bob"]).await;

    let err = community::delete_community(&state, &c.id, "bob")
        .await
        .unwrap_err();
    assert!(matches!(err, ModerationError::Unauthorized));

    community::delete_community(&state, &c.id, "alice")
        .await
        .unwrap();
    let gone = community::get_community(&state.db, &c.id).await.unwrap_err();
    assert!(matches!(gone, ModerationError::CommunityNotFound));

    let again = community::delete_community(&state, &c.id, "alice")
        .await
        .unwrap_err();
    assert!(matches!(again, ModerationError::CommunityNotFound));
    assert!(community::list_communities(&state.db, "bob")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn announcement_reaches_every_participant() {
    let state = test_state().await;
    let c = community_with(&state, "alice", &["bob", "carol"]).await;

    let err = community::send_community_announcement(&state, &c.id, "bob", "Hi", "hello")
        .await
        .unwrap_err();
    assert!(matches!(err, ModerationError::Unauthorized));

    let sent = community::send_community_announcement(
        &state,
        &c.id,
        "alice",
        "Welcome",
        "Be kind to each other",
    )
    .await
    .unwrap();
    assert_eq!(sent.kind, NotificationKind::Community);
    assert_eq!(sent.sender, "alice");

    for user in ["alice", "bob", "carol"] {
        let notices = inbox(&state, user).await;
        assert_eq!(notices.len(), 1, "{user} inbox");
        assert_eq!(notices[0].id, sent.id);
    }
    assert!(inbox(&state, "dave").await.is_empty());
}

#[tokio::test]
async fn mark_read_flips_only_the_callers_copy() {
    let state = test_state().await;
    let c = community_with(&state, "alice", &["bob"]).await;
    let sent = community::send_community_announcement(&state, &c.id, "alice", "T", "M")
        .await
        .unwrap();

    agora_server::services::notification::mark_read(&state.writer, "bob", &sent.id)
        .await
        .unwrap();
    assert!(inbox(&state, "bob").await[0].read);
    assert!(!inbox(&state, "alice").await[0].read);

    let err = agora_server::services::notification::mark_read(&state.writer, "dave", &sent.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ModerationError::NotificationNotFound));
}

#[tokio::test]
async fn online_user_receives_ban_notice_live() {
    let state = test_state().await;
    let c = community_with(&state, "alice", &["bob"]).await;
    let (_session, mut live) = state.registry.register("bob");

    community::toggle_ban_user(&state, &c.id, "alice", "bob")
        .await
        .unwrap();

    match live.try_recv() {
        Ok(WsServerMessage::Notification { notification }) => {
            assert_eq!(notification.kind, NotificationKind::Ban);
        }
        other => panic!("expected a live ban notice, got {other:?}"),
    }
}

#[tokio::test]
async fn online_count_follows_live_sessions() {
    let state = test_state().await;
    assert_eq!(state.online_count(), 0);

    let (first, _rx1) = state.registry.register("bob");
    let (_alice, _rx2) = state.registry.register("alice");
    let (second, _rx3) = state.registry.register("bob");
    assert_eq!(state.online_count(), 2);

    state.registry.unregister("bob", &first);
    assert_eq!(state.online_count(), 2);
    state.registry.unregister("bob", &second);
    assert_eq!(state.online_count(), 1);
}

#[tokio::test]
async fn moderation_actions_refresh_cached_roles() {
    let state = test_state().await;
    let c = community_with(&state, "alice", &["bob"]).await;

    let cached = state
        .role_cache
        .get_or_load("bob", &c.id, || community::load_roles(&state.db, &c.id, "bob"))
        .await
        .unwrap();
    assert_eq!(cached, Roles::PARTICIPANT);

    community::toggle_ban_user(&state, &c.id, "alice", "bob")
        .await
        .unwrap();

    let reloaded = state
        .role_cache
        .get_or_load("bob", &c.id, || community::load_roles(&state.db, &c.id, "bob"))
        .await
        .unwrap();
    assert_eq!(reloaded, Roles::BANNED);
}

#[tokio::test]
async fn moderation_actions_are_audited() {
    let state = test_state().await;
    let c = community_with(&state, "alice", &["bob"]).await;
    community::toggle_ban_user(&state, &c.id, "alice", "bob")
        .await
        .unwrap();

    let logs = audit::list(&state.db, &c.id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action, "BAN_USER");
    assert_eq!(logs[0].actor, "alice");
    assert_eq!(logs[0].target.as_deref(), Some("bob"));
}

#[tokio::test]
async fn invariants_hold_across_a_mixed_sequence() {
    let state = test_state().await;
    let c = community_with(&state, "alice", &["bob", "carol", "dave"]).await;

    community::toggle_moderator(&state, &c.id, "alice", "bob").await.unwrap();
    community::toggle_mute_community_user(&state, &c.id, "bob", "dave").await.unwrap();
    community::toggle_ban_user(&state, &c.id, "bob", "carol").await.unwrap();
    community::toggle_ban_user(&state, &c.id, "alice", "bob").await.unwrap();
    community::toggle_ban_user(&state, &c.id, "alice", "carol").await.unwrap();
    community::toggle_membership(&state, &c.id, "carol").await.unwrap();
    let last = community::toggle_membership(&state, &c.id, "dave").await.unwrap();

    assert_invariants(&last);
    assert_eq!(last.banned, vec!["bob".to_string()]);
    assert_eq!(last.participants, vec!["alice".to_string(), "carol".to_string()]);
}
