//! Deferred payments.
//!
//! A deferred payment is an obligation towards a beneficiary that is settled
//! in installments. The status is a pure function of the paid and total
//! amounts:
//!
//! - `pending`: nothing paid yet
//! - `partial`: `0 < paid < total`
//! - `completed`: `paid >= total`
//!
//! `paid_amount` never exceeds `total_amount`: an installment that would push
//! it past the total is rejected with [`EngineError::Overpayment`].

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, ResultEngine};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeferredStatus {
    Pending,
    Partial,
    Completed,
}

impl DeferredStatus {
    pub fn derive(paid_amount: i64, total_amount: i64) -> Self {
        if paid_amount >= total_amount {
            Self::Completed
        } else if paid_amount > 0 {
            Self::Partial
        } else {
            Self::Pending
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Partial => "partial",
            Self::Completed => "completed",
        }
    }
}

impl TryFrom<&str> for DeferredStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(Self::Pending),
            "partial" => Ok(Self::Partial),
            "completed" => Ok(Self::Completed),
            other => Err(EngineError::InvalidName(format!(
                "invalid deferred payment status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredPayment {
    pub id: Uuid,
    pub beneficiary_name: String,
    pub total_amount: i64,
    pub paid_amount: i64,
    pub status: DeferredStatus,
    pub project_id: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub description: Option<String>,
    /// Bumped on every write.
    pub version: i64,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeferredPayment {
    pub(crate) fn new(
        beneficiary_name: String,
        total_amount: i64,
        project_id: Option<Uuid>,
        due_date: Option<NaiveDate>,
        description: Option<String>,
        created_by: String,
        now: DateTime<Utc>,
    ) -> ResultEngine<Self> {
        if total_amount <= 0 {
            return Err(EngineError::InvalidAmount(
                "total_amount must be > 0".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            beneficiary_name,
            total_amount,
            paid_amount: 0,
            status: DeferredStatus::Pending,
            project_id,
            due_date,
            description,
            version: 0,
            created_by,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn remaining_amount(&self) -> i64 {
        self.total_amount - self.paid_amount
    }

    /// Adds an installment to the paid amount.
    pub(crate) fn record_payment(&mut self, amount: i64) -> ResultEngine<()> {
        if amount <= 0 {
            return Err(EngineError::InvalidAmount("amount must be > 0".to_string()));
        }
        let paid_amount = self
            .paid_amount
            .checked_add(amount)
            .filter(|paid| *paid <= self.total_amount)
            .ok_or_else(|| {
                EngineError::Overpayment(format!(
                    "installment of {amount} exceeds the remaining {}",
                    self.remaining_amount()
                ))
            })?;
        self.paid_amount = paid_amount;
        self.status = DeferredStatus::derive(self.paid_amount, self.total_amount);
        Ok(())
    }

    /// Moves the paid amount by `delta` after an installment transaction was
    /// edited. The result must stay within `[0, total_amount]`.
    pub(crate) fn adjust_payment(&mut self, delta: i64) -> ResultEngine<()> {
        let paid_amount = self.paid_amount + delta;
        if paid_amount > self.total_amount {
            return Err(EngineError::Overpayment(format!(
                "paid amount {paid_amount} exceeds total {}",
                self.total_amount
            )));
        }
        self.paid_amount = paid_amount.max(0);
        self.status = DeferredStatus::derive(self.paid_amount, self.total_amount);
        Ok(())
    }

    /// Removes a deleted installment from the paid amount, floored at 0.
    pub(crate) fn revert_payment(&mut self, amount: i64) {
        self.paid_amount = (self.paid_amount - amount).max(0);
        self.status = DeferredStatus::derive(self.paid_amount, self.total_amount);
    }

    pub(crate) fn set_total(&mut self, total_amount: i64) -> ResultEngine<()> {
        if total_amount <= 0 {
            return Err(EngineError::InvalidAmount(
                "total_amount must be > 0".to_string(),
            ));
        }
        if self.paid_amount > total_amount {
            return Err(EngineError::Overpayment(format!(
                "already paid {} which exceeds the new total {total_amount}",
                self.paid_amount
            )));
        }
        self.total_amount = total_amount;
        self.status = DeferredStatus::derive(self.paid_amount, self.total_amount);
        Ok(())
    }

    pub(crate) fn installment_description(&self) -> String {
        format!(
            "payment of installment for beneficiary: {}",
            self.beneficiary_name
        )
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "deferred_payments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub beneficiary_name: String,
    pub total_amount: i64,
    pub paid_amount: i64,
    pub status: String,
    pub project_id: Option<Uuid>,
    pub due_date: Option<Date>,
    pub description: Option<String>,
    pub version: i64,
    pub created_by: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::transactions::Entity")]
    Transactions,
}

impl Related<super::transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&DeferredPayment> for ActiveModel {
    fn from(payment: &DeferredPayment) -> Self {
        Self {
            id: ActiveValue::Set(payment.id),
            beneficiary_name: ActiveValue::Set(payment.beneficiary_name.clone()),
            total_amount: ActiveValue::Set(payment.total_amount),
            paid_amount: ActiveValue::Set(payment.paid_amount),
            status: ActiveValue::Set(payment.status.as_str().to_string()),
            project_id: ActiveValue::Set(payment.project_id),
            due_date: ActiveValue::Set(payment.due_date),
            description: ActiveValue::Set(payment.description.clone()),
            version: ActiveValue::Set(payment.version),
            created_by: ActiveValue::Set(payment.created_by.clone()),
            created_at: ActiveValue::Set(payment.created_at),
            updated_at: ActiveValue::Set(payment.updated_at),
        }
    }
}

impl From<Model> for DeferredPayment {
    /// The persisted status is only a query helper: it is derived again from
    /// the amounts on load.
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            beneficiary_name: model.beneficiary_name,
            total_amount: model.total_amount,
            paid_amount: model.paid_amount,
            status: DeferredStatus::derive(model.paid_amount, model.total_amount),
            project_id: model.project_id,
            due_date: model.due_date,
            description: model.description,
            version: model.version,
            created_by: model.created_by,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}
