use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Re-export entity models for API payloads ───
pub use crate::entities::appeal::Model as Appeal;
pub use crate::entities::audit_log::Model as AuditLog;
pub use crate::entities::community::Visibility;
pub use crate::entities::membership::MemberSet;
pub use crate::entities::notification::NotificationKind;
pub use crate::entities::report::Model as Report;
pub use crate::entities::report::{ReportCategory, ReportStatus};

pub const MAX_COMMUNITY_NAME: usize = 100;
pub const MAX_DESCRIPTION: usize = 500;
pub const MAX_REPORT_REASON: usize = 500;
pub const MAX_APPEAL_DESCRIPTION: usize = 1000;
pub const MAX_TITLE: usize = 120;
pub const MAX_MESSAGE: usize = 2000;

/// Sender name stamped on automated notifications.
pub const SYSTEM_SENDER: &str = "System";

// ─── Roles ───
bitflags::bitflags! {
    /// What a username is within one community.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Roles: u8 {
        const PARTICIPANT = 1 << 0;
        const MODERATOR   = 1 << 1;
        const ADMIN       = 1 << 2;
        const BANNED      = 1 << 3;
        const MUTED       = 1 << 4;
    }
}

impl Roles {
    pub fn from_set(set: MemberSet) -> Self {
        match set {
            MemberSet::Participant => Self::PARTICIPANT,
            MemberSet::Moderator => Self::MODERATOR,
            MemberSet::Banned => Self::BANNED,
            MemberSet::Muted => Self::MUTED,
        }
    }

    /// Admin or moderator.
    pub fn is_staff(&self) -> bool {
        self.intersects(Self::ADMIN | Self::MODERATOR)
    }

    pub fn is_member(&self) -> bool {
        self.contains(Self::PARTICIPANT)
    }

    /// Members who are not muted may post.
    pub fn can_post(&self) -> bool {
        self.is_member() && !self.intersects(Self::MUTED | Self::BANNED)
    }
}

// ─── Views ───

/// A community with its membership sets resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub visibility: Visibility,
    pub admin: String,
    pub participants: Vec<String>,
    pub moderators: Vec<String>,
    pub banned: Vec<String>,
    pub muted: Vec<String>,
    /// Open appeal ids, oldest first
    pub appeals: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl CommunityView {
    pub fn roles_of(&self, username: &str) -> Roles {
        let mut roles = Roles::empty();
        if self.admin == username {
            roles.insert(Roles::ADMIN);
        }
        let sets = [
            (&self.participants, Roles::PARTICIPANT),
            (&self.moderators, Roles::MODERATOR),
            (&self.banned, Roles::BANNED),
            (&self.muted, Roles::MUTED),
        ];
        for (members, flag) in sets {
            if members.iter().any(|m| m == username) {
                roles.insert(flag);
            }
        }
        roles
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationView {
    pub id: String,
    pub title: String,
    pub msg: String,
    pub date_time: DateTime<Utc>,
    pub sender: String,
    pub context_id: Option<String>,
    pub kind: NotificationKind,
    pub read: bool,
}

/// Notification content before it is stored.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub title: String,
    pub msg: String,
    pub sender: String,
    pub context_id: Option<String>,
    pub kind: NotificationKind,
}

impl NewNotification {
    pub fn system(kind: NotificationKind, title: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            msg: msg.into(),
            sender: SYSTEM_SENDER.to_string(),
            context_id: None,
            kind,
        }
    }

    pub fn with_context(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self
    }
}

// ─── Auto-ban ───

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoBanReason {
    /// The threshold was crossed and the ban was applied
    ThresholdReached,
    BelowThreshold,
    AlreadyBanned,
    /// Admin and moderators are never auto-banned
    PrivilegedRole,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoBanOutcome {
    pub banned: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<AutoBanReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AutoBanOutcome {
    pub fn not_banned(report_count: usize, reason: AutoBanReason) -> Self {
        Self {
            banned: false,
            report_count: Some(report_count),
            reason: Some(reason),
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            banned: false,
            report_count: None,
            reason: None,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportCreated {
    pub report: Report,
    pub ban_applied: bool,
    pub auto_ban: AutoBanOutcome,
}

// ─── API Types ───

#[derive(Debug, Deserialize)]
pub struct CreateCommunityRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub visibility: Visibility,
}

#[derive(Debug, Deserialize)]
pub struct CreateReportRequest {
    pub reported_user: String,
    pub reason: String,
    pub category: ReportCategory,
}

#[derive(Debug, Deserialize)]
pub struct UpdateReportStatusRequest {
    pub status: ReportStatus,
}

#[derive(Debug, Deserialize)]
pub struct SubmitAppealRequest {
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppealDecision {
    Approve,
    Deny,
}

#[derive(Debug, Deserialize)]
pub struct RespondAppealRequest {
    pub decision: AppealDecision,
}

#[derive(Debug, Deserialize)]
pub struct AnnouncementRequest {
    pub title: String,
    pub msg: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MyRoles {
    pub community_id: String,
    pub username: String,
    pub roles: Roles,
    pub can_post: bool,
}

// ─── WebSocket ───

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsClientMessage {
    #[serde(rename = "ping")]
    Ping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsServerMessage {
    #[serde(rename = "identity")]
    Identity { username: String, session_id: String },
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "notification")]
    Notification { notification: NotificationView },
    #[serde(rename = "error")]
    Error { message: String },
}
