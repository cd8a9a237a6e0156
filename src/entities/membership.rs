use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// The sets a username can belong to within a community.
///
/// Stored as plain text because it is part of the composite primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberSet {
    Participant,
    Moderator,
    Banned,
    Muted,
}

impl MemberSet {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberSet::Participant => "participant",
            MemberSet::Moderator => "moderator",
            MemberSet::Banned => "banned",
            MemberSet::Muted => "muted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "participant" => Some(MemberSet::Participant),
            "moderator" => Some(MemberSet::Moderator),
            "banned" => Some(MemberSet::Banned),
            "muted" => Some(MemberSet::Muted),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "community_memberships")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub community_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub username: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub member_set: String,
    pub added_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::community::Entity",
        from = "Column::CommunityId",
        to = "super::community::Column::Id"
    )]
    Community,
}

impl Related<super::community::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Community.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
