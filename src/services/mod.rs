//! Moderation core. Every public operation returns `Result<_, ModerationError>`;
//! the HTTP layer only translates.

pub mod appeal;
pub mod audit;
pub mod community;
pub mod notification;
pub mod report;
