//! Expense type registry.
//!
//! Expense types are the buckets the ledger classifies expense transactions
//! into. Lookups go through `name_norm`, so "Fuel", "fuel" and " FUEL " name
//! the same type.

use chrono::{DateTime, Utc};
use sea_orm::entity::{ActiveValue, prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseType {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    /// Types created by the engine itself (the deferred payments bucket).
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "expense_types")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub name_norm: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub is_system: bool,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::ledger_entries::Entity")]
    LedgerEntries,
}

impl Related<super::ledger_entries::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LedgerEntries.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for ExpenseType {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            is_active: model.is_active,
            is_system: model.is_system,
            created_at: model.created_at,
        }
    }
}

impl ActiveModel {
    pub(crate) fn new(
        name: String,
        name_norm: String,
        description: Option<String>,
        is_system: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ActiveValue::Set(Uuid::new_v4()),
            name: ActiveValue::Set(name),
            name_norm: ActiveValue::Set(name_norm),
            description: ActiveValue::Set(description),
            is_active: ActiveValue::Set(true),
            is_system: ActiveValue::Set(is_system),
            created_at: ActiveValue::Set(now),
        }
    }
}
