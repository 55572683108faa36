//! Command structs for engine operations.
//!
//! These types group parameters for write operations (deposit / withdrawal /
//! admin transaction / installment bookkeeping), keeping call sites readable
//! and avoiding long argument lists.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::{Actor, Attachment, ExpenseLabel, TransactionKind};

/// Common metadata for transaction creation.
#[derive(Clone, Debug, Default)]
pub struct TxMeta {
    pub description: Option<String>,
    /// Defaults to the time the operation runs.
    pub occurred_at: Option<DateTime<Utc>>,
    pub attachment: Option<Attachment>,
}

impl TxMeta {
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    #[must_use]
    pub fn attachment(mut self, url: impl Into<String>, file_type: Option<String>) -> Self {
        self.attachment = Some(Attachment {
            url: url.into(),
            file_type,
        });
        self
    }
}

/// Move money from the admin fund to a project fund.
#[derive(Clone, Debug)]
pub struct DepositCmd {
    pub actor: Actor,
    pub project_id: Uuid,
    pub amount: i64,
    pub meta: TxMeta,
}

impl DepositCmd {
    #[must_use]
    pub fn new(actor: Actor, project_id: Uuid, amount: i64) -> Self {
        Self {
            actor,
            project_id,
            amount,
            meta: TxMeta::default(),
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.meta.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn meta(mut self, meta: TxMeta) -> Self {
        self.meta = meta;
        self
    }
}

/// Spend money from a project fund.
#[derive(Clone, Debug)]
pub struct WithdrawalCmd {
    pub actor: Actor,
    pub project_id: Uuid,
    pub amount: i64,
    pub expense_label: ExpenseLabel,
    pub meta: TxMeta,
}

impl WithdrawalCmd {
    #[must_use]
    pub fn new(actor: Actor, project_id: Uuid, amount: i64) -> Self {
        Self {
            actor,
            project_id,
            amount,
            expense_label: ExpenseLabel::General,
            meta: TxMeta::default(),
        }
    }

    /// Blank names fall back to the general expense label.
    #[must_use]
    pub fn expense_type(mut self, name: impl AsRef<str>) -> Self {
        self.expense_label = ExpenseLabel::from_input(Some(name.as_ref()));
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.meta.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn meta(mut self, meta: TxMeta) -> Self {
        self.meta = meta;
        self
    }
}

/// Credit or debit the admin fund directly.
#[derive(Clone, Debug)]
pub struct AdminTransactionCmd {
    pub actor: Actor,
    pub kind: TransactionKind,
    pub amount: i64,
    /// Only meaningful for expenses.
    pub expense_label: ExpenseLabel,
    pub meta: TxMeta,
}

impl AdminTransactionCmd {
    #[must_use]
    pub fn new(actor: Actor, kind: TransactionKind, amount: i64) -> Self {
        Self {
            actor,
            kind,
            amount,
            expense_label: ExpenseLabel::General,
            meta: TxMeta::default(),
        }
    }

    #[must_use]
    pub fn expense_type(mut self, name: impl AsRef<str>) -> Self {
        self.expense_label = ExpenseLabel::from_input(Some(name.as_ref()));
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.meta.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn meta(mut self, meta: TxMeta) -> Self {
        self.meta = meta;
        self
    }
}

/// Edit amount, date or description of an existing transaction.
#[derive(Clone, Debug)]
pub struct UpdateTransactionCmd {
    pub actor: Actor,
    pub transaction_id: Uuid,
    pub amount: Option<i64>,
    pub occurred_at: Option<DateTime<Utc>>,
    pub description: Option<String>,
}

impl UpdateTransactionCmd {
    #[must_use]
    pub fn new(actor: Actor, transaction_id: Uuid) -> Self {
        Self {
            actor,
            transaction_id,
            amount: None,
            occurred_at: None,
            description: None,
        }
    }

    #[must_use]
    pub fn amount(mut self, amount: i64) -> Self {
        self.amount = Some(amount);
        self
    }

    #[must_use]
    pub fn occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Register an obligation towards a beneficiary.
#[derive(Clone, Debug)]
pub struct NewDeferredPaymentCmd {
    pub actor: Actor,
    pub beneficiary_name: String,
    pub total_amount: i64,
    pub project_id: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub description: Option<String>,
}

impl NewDeferredPaymentCmd {
    #[must_use]
    pub fn new(actor: Actor, beneficiary_name: impl Into<String>, total_amount: i64) -> Self {
        Self {
            actor,
            beneficiary_name: beneficiary_name.into(),
            total_amount,
            project_id: None,
            due_date: None,
            description: None,
        }
    }

    #[must_use]
    pub fn project_id(mut self, project_id: Uuid) -> Self {
        self.project_id = Some(project_id);
        self
    }

    #[must_use]
    pub fn due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Admin edit of a deferred payment. `None` fields are left untouched.
#[derive(Clone, Debug)]
pub struct UpdateDeferredPaymentCmd {
    pub actor: Actor,
    pub deferred_payment_id: Uuid,
    pub beneficiary_name: Option<String>,
    pub total_amount: Option<i64>,
    pub due_date: Option<NaiveDate>,
    pub description: Option<String>,
}

impl UpdateDeferredPaymentCmd {
    #[must_use]
    pub fn new(actor: Actor, deferred_payment_id: Uuid) -> Self {
        Self {
            actor,
            deferred_payment_id,
            beneficiary_name: None,
            total_amount: None,
            due_date: None,
            description: None,
        }
    }

    #[must_use]
    pub fn beneficiary_name(mut self, name: impl Into<String>) -> Self {
        self.beneficiary_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn total_amount(mut self, total_amount: i64) -> Self {
        self.total_amount = Some(total_amount);
        self
    }

    #[must_use]
    pub fn due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Patch for an expense type. `None` fields are left untouched.
#[derive(Clone, Debug, Default)]
pub struct ExpenseTypePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}
