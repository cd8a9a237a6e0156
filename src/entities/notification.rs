use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    #[sea_orm(string_value = "ban")]
    Ban,
    #[sea_orm(string_value = "mute")]
    Mute,
    #[sea_orm(string_value = "unban")]
    Unban,
    #[sea_orm(string_value = "report")]
    Report,
    #[sea_orm(string_value = "appeal")]
    Appeal,
    #[sea_orm(string_value = "community")]
    Community,
}

/// Stored once and referenced from every recipient's inbox.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notifications")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub title: String,
    pub msg: String,
    pub date_time: DateTimeUtc,
    pub sender: String,
    pub context_id: Option<String>,
    pub kind: NotificationKind,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::user_notification::Entity")]
    UserNotification,
}

impl Related<super::user_notification::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UserNotification.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
