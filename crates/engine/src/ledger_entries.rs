//! Ledger entries.
//!
//! A ledger entry binds either a transaction or a deferred payment to an
//! expense type. Both keys are unique when present, which is what makes
//! classification and transfers idempotent.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::EngineError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Classified,
    GeneralExpense,
    /// A deferred payment moved to the ledger before being fully paid.
    PendingTransfer,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Classified => "classified",
            Self::GeneralExpense => "general_expense",
            Self::PendingTransfer => "pending_transfer",
        }
    }
}

impl TryFrom<&str> for EntryKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "classified" => Ok(Self::Classified),
            "general_expense" => Ok(Self::GeneralExpense),
            "pending_transfer" => Ok(Self::PendingTransfer),
            other => Err(EngineError::InvalidName(format!(
                "invalid ledger entry kind: {other}"
            ))),
        }
    }
}

/// Where a ledger entry comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum EntrySource {
    Transaction { transaction_id: Uuid },
    DeferredPayment { deferred_payment_id: Uuid },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub entry_date: DateTime<Utc>,
    pub source: EntrySource,
    pub expense_type_id: Option<Uuid>,
    pub amount: i64,
    pub description: Option<String>,
    pub project_id: Option<Uuid>,
    pub kind: EntryKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "ledger_entries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub entry_date: DateTimeUtc,
    pub transaction_id: Option<Uuid>,
    pub deferred_payment_id: Option<Uuid>,
    pub expense_type_id: Option<Uuid>,
    pub amount: i64,
    pub description: Option<String>,
    pub project_id: Option<Uuid>,
    pub entry_kind: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::transactions::Entity",
        from = "Column::TransactionId",
        to = "super::transactions::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Transaction,
    #[sea_orm(
        belongs_to = "super::expense_types::Entity",
        from = "Column::ExpenseTypeId",
        to = "super::expense_types::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    ExpenseType,
}

impl Related<super::transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transaction.def()
    }
}

impl Related<super::expense_types::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ExpenseType.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&LedgerEntry> for ActiveModel {
    fn from(entry: &LedgerEntry) -> Self {
        let (transaction_id, deferred_payment_id) = match entry.source {
            EntrySource::Transaction { transaction_id } => (Some(transaction_id), None),
            EntrySource::DeferredPayment {
                deferred_payment_id,
            } => (None, Some(deferred_payment_id)),
        };
        Self {
            id: ActiveValue::Set(entry.id),
            entry_date: ActiveValue::Set(entry.entry_date),
            transaction_id: ActiveValue::Set(transaction_id),
            deferred_payment_id: ActiveValue::Set(deferred_payment_id),
            expense_type_id: ActiveValue::Set(entry.expense_type_id),
            amount: ActiveValue::Set(entry.amount),
            description: ActiveValue::Set(entry.description.clone()),
            project_id: ActiveValue::Set(entry.project_id),
            entry_kind: ActiveValue::Set(entry.kind.as_str().to_string()),
            created_at: ActiveValue::Set(entry.created_at),
            updated_at: ActiveValue::Set(entry.updated_at),
        }
    }
}

impl TryFrom<Model> for LedgerEntry {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let source = match (model.transaction_id, model.deferred_payment_id) {
            (Some(transaction_id), None) => EntrySource::Transaction { transaction_id },
            (None, Some(deferred_payment_id)) => EntrySource::DeferredPayment {
                deferred_payment_id,
            },
            _ => {
                return Err(EngineError::InvalidName(format!(
                    "ledger entry {} must reference exactly one source",
                    model.id
                )));
            }
        };
        Ok(Self {
            id: model.id,
            entry_date: model.entry_date,
            source,
            expense_type_id: model.expense_type_id,
            amount: model.amount,
            description: model.description,
            project_id: model.project_id,
            kind: EntryKind::try_from(model.entry_kind.as_str())?,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}
