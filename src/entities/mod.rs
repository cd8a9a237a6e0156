pub mod appeal;
pub mod audit_log;
pub mod community;
pub mod membership;
pub mod notification;
pub mod report;
pub mod user_notification;
