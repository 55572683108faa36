//! Transaction primitives.
//!
//! A `Transaction` records one money movement. Income transactions with a
//! project are deposits (admin fund to project fund), income transactions
//! without a project credit the admin fund. Expense transactions debit the
//! project fund, or the admin fund when no project is attached.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, ResultEngine, util::normalize_name_key};

/// Lookup key of the name that stands for [`ExpenseLabel::General`] in
/// free-form input. No expense type may take it.
pub(crate) const GENERAL_EXPENSE_KEY: &str = "general expense";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }
}

impl TryFrom<&str> for TransactionKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            other => Err(EngineError::InvalidAmount(format!(
                "invalid transaction kind: {other}"
            ))),
        }
    }
}

/// The expense type an expense transaction declares.
///
/// `General` is the catch-all "general expense" bucket. It is not an
/// [`ExpenseType`](crate::ExpenseType) row and is never classified unless
/// classification is forced.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "label", content = "name")]
pub enum ExpenseLabel {
    #[default]
    General,
    Named(String),
}

impl ExpenseLabel {
    /// Builds a label from free-form input. Blank input and the
    /// "general expense" name, in any case or spacing, are `General`.
    pub fn from_input(input: Option<&str>) -> Self {
        match input.map(str::trim).filter(|s| !s.is_empty()) {
            Some(name) if !is_general_expense_name(name) => Self::Named(name.to_string()),
            _ => Self::General,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::General => None,
            Self::Named(name) => Some(name),
        }
    }

    pub fn is_general(&self) -> bool {
        matches!(self, Self::General)
    }
}

/// Whether `name` normalizes to the general expense key.
fn is_general_expense_name(name: &str) -> bool {
    normalize_name_key(name).is_ok_and(|key| key == GENERAL_EXPENSE_KEY)
}

/// Opaque reference to a file stored by the attachment service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    pub file_type: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub amount: i64,
    pub kind: TransactionKind,
    /// Always `Some` for expenses and `None` for income.
    pub expense_label: Option<ExpenseLabel>,
    pub description: Option<String>,
    /// `None` means the transaction moved the admin fund.
    pub project_id: Option<Uuid>,
    pub created_by: String,
    pub attachment: Option<Attachment>,
    pub archived: bool,
    /// Set on installment payments.
    pub deferred_payment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Input for [`Transaction::new`].
pub(crate) struct NewTransaction {
    pub kind: TransactionKind,
    pub amount: i64,
    pub occurred_at: DateTime<Utc>,
    pub expense_label: ExpenseLabel,
    pub description: Option<String>,
    pub project_id: Option<Uuid>,
    pub created_by: String,
    pub attachment: Option<Attachment>,
    pub deferred_payment_id: Option<Uuid>,
}

impl Transaction {
    pub(crate) fn new(input: NewTransaction, now: DateTime<Utc>) -> ResultEngine<Self> {
        if input.amount <= 0 {
            return Err(EngineError::InvalidAmount("amount must be > 0".to_string()));
        }
        let expense_label = match input.kind {
            TransactionKind::Expense => Some(input.expense_label),
            TransactionKind::Income => None,
        };
        Ok(Self {
            id: Uuid::new_v4(),
            occurred_at: input.occurred_at,
            amount: input.amount,
            kind: input.kind,
            expense_label,
            description: input.description,
            project_id: input.project_id,
            created_by: input.created_by,
            attachment: input.attachment,
            archived: false,
            deferred_payment_id: input.deferred_payment_id,
            created_at: now,
        })
    }

    /// The signed fund effect of this transaction, as `(project, admin)`
    /// deltas.
    ///
    /// A deposit moves money from the admin fund to the project fund, so it
    /// is the only movement touching two funds.
    pub fn fund_deltas(&self) -> (Option<(Uuid, i64)>, Option<i64>) {
        self.fund_deltas_for(self.amount)
    }

    /// Same as [`Transaction::fund_deltas`] for an arbitrary signed amount.
    /// A negative amount undoes the movement.
    pub(crate) fn fund_deltas_for(&self, amount: i64) -> (Option<(Uuid, i64)>, Option<i64>) {
        match (self.kind, self.project_id) {
            (TransactionKind::Income, Some(project_id)) => {
                (Some((project_id, amount)), Some(-amount))
            }
            (TransactionKind::Expense, Some(project_id)) => (Some((project_id, -amount)), None),
            (TransactionKind::Income, None) => (None, Some(amount)),
            (TransactionKind::Expense, None) => (None, Some(-amount)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub occurred_at: DateTimeUtc,
    pub amount: i64,
    pub kind: String,
    pub expense_type: Option<String>,
    pub description: Option<String>,
    pub project_id: Option<Uuid>,
    pub created_by: String,
    pub file_url: Option<String>,
    pub file_type: Option<String>,
    pub archived: bool,
    pub deferred_payment_id: Option<Uuid>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::ledger_entries::Entity")]
    LedgerEntry,
    #[sea_orm(
        belongs_to = "super::deferred_payments::Entity",
        from = "Column::DeferredPaymentId",
        to = "super::deferred_payments::Column::Id",
        on_update = "NoAction",
        on_delete = "SetNull"
    )]
    DeferredPayment,
}

impl Related<super::ledger_entries::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LedgerEntry.def()
    }
}

impl Related<super::deferred_payments::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DeferredPayment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Transaction> for ActiveModel {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: ActiveValue::Set(tx.id),
            occurred_at: ActiveValue::Set(tx.occurred_at),
            amount: ActiveValue::Set(tx.amount),
            kind: ActiveValue::Set(tx.kind.as_str().to_string()),
            expense_type: ActiveValue::Set(
                tx.expense_label
                    .as_ref()
                    .and_then(|label| label.name().map(ToString::to_string)),
            ),
            description: ActiveValue::Set(tx.description.clone()),
            project_id: ActiveValue::Set(tx.project_id),
            created_by: ActiveValue::Set(tx.created_by.clone()),
            file_url: ActiveValue::Set(tx.attachment.as_ref().map(|a| a.url.clone())),
            file_type: ActiveValue::Set(tx.attachment.as_ref().and_then(|a| a.file_type.clone())),
            archived: ActiveValue::Set(tx.archived),
            deferred_payment_id: ActiveValue::Set(tx.deferred_payment_id),
            created_at: ActiveValue::Set(tx.created_at),
        }
    }
}

impl TryFrom<Model> for Transaction {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let kind = TransactionKind::try_from(model.kind.as_str())?;
        let expense_label = match kind {
            TransactionKind::Expense => Some(ExpenseLabel::from_input(model.expense_type.as_deref())),
            TransactionKind::Income => None,
        };
        let attachment = model.file_url.map(|url| Attachment {
            url,
            file_type: model.file_type,
        });
        Ok(Self {
            id: model.id,
            occurred_at: model.occurred_at,
            amount: model.amount,
            kind,
            expense_label,
            description: model.description,
            project_id: model.project_id,
            created_by: model.created_by,
            attachment,
            archived: model.archived,
            deferred_payment_id: model.deferred_payment_id,
            created_at: model.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(kind: TransactionKind, amount: i64, project_id: Option<Uuid>) -> NewTransaction {
        NewTransaction {
            kind,
            amount,
            occurred_at: Utc::now(),
            expense_label: ExpenseLabel::Named("fuel".to_string()),
            description: None,
            project_id,
            created_by: "alice".to_string(),
            attachment: None,
            deferred_payment_id: None,
        }
    }

    #[test]
    fn blank_label_is_general() {
        assert_eq!(ExpenseLabel::from_input(None), ExpenseLabel::General);
        assert_eq!(ExpenseLabel::from_input(Some("   ")), ExpenseLabel::General);
        assert_eq!(
            ExpenseLabel::from_input(Some(" fuel ")),
            ExpenseLabel::Named("fuel".to_string())
        );
    }

    #[test]
    fn general_expense_name_is_general() {
        assert_eq!(
            ExpenseLabel::from_input(Some("general expense")),
            ExpenseLabel::General
        );
        assert_eq!(
            ExpenseLabel::from_input(Some("  General_Expense ")),
            ExpenseLabel::General
        );
        assert_eq!(
            ExpenseLabel::from_input(Some("general expenses")),
            ExpenseLabel::Named("general expenses".to_string())
        );
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        let err = Transaction::new(draft(TransactionKind::Income, 0, None), Utc::now()).unwrap_err();
        assert_eq!(err, EngineError::InvalidAmount("amount must be > 0".to_string()));
    }

    #[test]
    fn income_drops_expense_label() {
        let tx = Transaction::new(draft(TransactionKind::Income, 10, None), Utc::now()).unwrap();
        assert_eq!(tx.expense_label, None);
    }

    #[test]
    fn deposit_moves_money_between_two_funds() {
        let project_id = Uuid::new_v4();
        let tx = Transaction::new(
            draft(TransactionKind::Income, 200, Some(project_id)),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(tx.fund_deltas(), (Some((project_id, 200)), Some(-200)));
    }

    #[test]
    fn admin_expense_only_touches_admin_fund() {
        let tx = Transaction::new(draft(TransactionKind::Expense, 75, None), Utc::now()).unwrap();
        assert_eq!(tx.fund_deltas(), (None, Some(-75)));
    }

    #[test]
    fn negative_amount_undoes_a_withdrawal() {
        let project_id = Uuid::new_v4();
        let tx = Transaction::new(
            draft(TransactionKind::Expense, 40, Some(project_id)),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(tx.fund_deltas_for(-40), (Some((project_id, 40)), None));
    }

    #[test]
    fn general_label_is_stored_as_null() {
        let mut input = draft(TransactionKind::Expense, 5, None);
        input.expense_label = ExpenseLabel::General;
        let tx = Transaction::new(input, Utc::now()).unwrap();
        let model = ActiveModel::from(&tx);

        assert_eq!(model.expense_type, ActiveValue::Set(None));
    }
}
