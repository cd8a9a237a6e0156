//! Notification fan-out: one stored notification, referenced from every
//! recipient's inbox, pushed to whoever is connected right now.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use sea_orm::*;
use uuid::Uuid;

use crate::entities::{notification, user_notification};
use crate::error::ModerationError;
use crate::models::{NewNotification, NotificationView, WsServerMessage};
use crate::registry::ConnectionRegistry;

/// Run a sub-step whose failure must not fail the enclosing operation.
/// The error is logged and `None` returned.
pub async fn best_effort<T, E, F>(label: &str, step: F) -> Option<T>
where
    E: Display,
    F: Future<Output = Result<T, E>>,
{
    match step.await {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("{label} failed, continuing: {e}");
            None
        }
    }
}

/// Persist `new` once and attach a read=false reference for each recipient.
///
/// Takes any connection so transactional callers can pass their transaction.
pub async fn store<C>(
    conn: &C,
    recipients: &[String],
    new: NewNotification,
) -> Result<notification::Model, DbErr>
where
    C: ConnectionTrait,
{
    let model = notification::Model {
        id: Uuid::new_v4().to_string(),
        title: new.title,
        msg: new.msg,
        date_time: chrono::Utc::now(),
        sender: new.sender,
        context_id: new.context_id,
        kind: new.kind,
    };
    let row = notification::ActiveModel {
        id: Set(model.id.clone()),
        title: Set(model.title.clone()),
        msg: Set(model.msg.clone()),
        date_time: Set(model.date_time),
        sender: Set(model.sender.clone()),
        context_id: Set(model.context_id.clone()),
        kind: Set(model.kind),
    };
    notification::Entity::insert(row).exec(conn).await?;

    let recipients = dedup(recipients);
    if !recipients.is_empty() {
        let refs = recipients.into_iter().map(|username| user_notification::ActiveModel {
            username: Set(username),
            notification_id: Set(model.id.clone()),
            read: Set(false),
        });
        user_notification::Entity::insert_many(refs)
            .on_conflict(
                sea_query::OnConflict::columns([
                    user_notification::Column::Username,
                    user_notification::Column::NotificationId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .do_nothing()
            .exec(conn)
            .await?;
    }

    Ok(model)
}

fn dedup(recipients: &[String]) -> Vec<String> {
    let mut out: Vec<String> = recipients.to_vec();
    out.sort();
    out.dedup();
    out
}

pub(crate) fn to_view(model: &notification::Model, read: bool) -> NotificationView {
    NotificationView {
        id: model.id.clone(),
        title: model.title.clone(),
        msg: model.msg.clone(),
        date_time: model.date_time,
        sender: model.sender.clone(),
        context_id: model.context_id.clone(),
        kind: model.kind,
        read,
    }
}

/// Stores notifications and pushes them over live sessions.
#[derive(Clone)]
pub struct Notifier {
    db: DatabaseConnection,
    registry: Arc<ConnectionRegistry>,
}

impl Notifier {
    pub fn new(db: DatabaseConnection, registry: Arc<ConnectionRegistry>) -> Self {
        Self { db, registry }
    }

    /// Non-transactional send: store, attach, then push live.
    pub async fn send(
        &self,
        recipients: &[String],
        new: NewNotification,
    ) -> Result<notification::Model, ModerationError> {
        let stored = store(&self.db, recipients, new).await?;
        self.push_live(recipients, &stored);
        Ok(stored)
    }

    /// Push to every recipient with an open session. Offline recipients see the
    /// notification on their next poll.
    pub fn push_live(&self, recipients: &[String], notification: &notification::Model) -> usize {
        let mut delivered = 0;
        for username in dedup(recipients) {
            let Some(session_id) = self.registry.session_for(&username) else {
                continue;
            };
            let event = WsServerMessage::Notification {
                notification: to_view(notification, false),
            };
            if self.registry.emit(&session_id, event) {
                delivered += 1;
            }
        }
        tracing::debug!(
            "Notification {} pushed live to {delivered} session(s)",
            notification.id
        );
        delivered
    }
}

/// A user's inbox, newest first.
pub async fn notifications_for(
    db: &DatabaseConnection,
    username: &str,
) -> Result<Vec<NotificationView>, ModerationError> {
    let rows = user_notification::Entity::find()
        .filter(user_notification::Column::Username.eq(username))
        .find_also_related(notification::Entity)
        .order_by_desc(notification::Column::DateTime)
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(link, n)| n.map(|n| to_view(&n, link.read)))
        .collect())
}

pub async fn mark_read(
    db: &DatabaseConnection,
    username: &str,
    notification_id: &str,
) -> Result<(), ModerationError> {
    let result = user_notification::Entity::update_many()
        .col_expr(user_notification::Column::Read, sea_query::Expr::value(true))
        .filter(user_notification::Column::Username.eq(username))
        .filter(user_notification::Column::NotificationId.eq(notification_id))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(ModerationError::NotificationNotFound);
    }
    Ok(())
}
