//! The module contains `Fund` struct and its persistence model.

use chrono::{DateTime, Utc};
use sea_orm::entity::{ActiveValue, prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::EngineError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundKind {
    Admin,
    Project,
}

impl FundKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Project => "project",
        }
    }
}

impl TryFrom<&str> for FundKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "admin" => Ok(Self::Admin),
            "project" => Ok(Self::Project),
            other => Err(EngineError::InvalidName(format!("invalid fund kind: {other}"))),
        }
    }
}

/// A fund.
///
/// A fund is a named balance. There is one admin fund, owned by the admin
/// owner key the engine was built with, and one fund per project. Money only
/// enters or leaves the system through the admin fund; deposits and
/// withdrawals move it between funds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fund {
    pub id: Uuid,
    pub name: String,
    pub balance: i64,
    pub kind: FundKind,
    /// Set iff `kind` is [`FundKind::Admin`].
    pub owner_id: Option<String>,
    /// Set iff `kind` is [`FundKind::Project`].
    pub project_id: Option<Uuid>,
    /// Bumped on every balance change.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Fund {
    pub fn admin(owner_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: format!("admin fund ({owner_id})"),
            balance: 0,
            kind: FundKind::Admin,
            owner_id: Some(owner_id.to_string()),
            project_id: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn project(project_id: Uuid, project_name: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: format!("project fund ({project_name})"),
            balance: 0,
            kind: FundKind::Project,
            owner_id: None,
            project_id: Some(project_id),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns `true` if the fund can absorb `delta` without going negative.
    pub fn covers(&self, delta: i64) -> bool {
        self.balance
            .checked_add(delta)
            .is_some_and(|balance| balance >= 0)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "funds")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub balance: i64,
    pub kind: String,
    pub owner_id: Option<String>,
    pub project_id: Option<Uuid>,
    pub version: i64,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::projects::Entity",
        from = "Column::ProjectId",
        to = "super::projects::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Project,
}

impl Related<super::projects::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Fund> for ActiveModel {
    fn from(fund: &Fund) -> Self {
        Self {
            id: ActiveValue::Set(fund.id),
            name: ActiveValue::Set(fund.name.clone()),
            balance: ActiveValue::Set(fund.balance),
            kind: ActiveValue::Set(fund.kind.as_str().to_string()),
            owner_id: ActiveValue::Set(fund.owner_id.clone()),
            project_id: ActiveValue::Set(fund.project_id),
            version: ActiveValue::Set(fund.version),
            created_at: ActiveValue::Set(fund.created_at),
            updated_at: ActiveValue::Set(fund.updated_at),
        }
    }
}

impl TryFrom<Model> for Fund {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            name: model.name,
            balance: model.balance,
            kind: FundKind::try_from(model.kind.as_str())?,
            owner_id: model.owner_id,
            project_id: model.project_id,
            version: model.version,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}
