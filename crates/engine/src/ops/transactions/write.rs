use chrono::Utc;
use sea_orm::{DatabaseTransaction, prelude::*};
use serde_json::json;
use uuid::Uuid;

use crate::{
    Actor, AuditRecord, ExpenseLabel, ResultEngine, Transaction, TransactionKind, TxMeta,
    transactions::{self, NewTransaction},
    util::normalize_optional_text,
};

use super::super::Engine;

mod create;
mod delete;
mod update;

/// Builds the row of a new transaction from a command's pieces.
pub(in crate::ops) fn draft_transaction(
    actor: &Actor,
    kind: TransactionKind,
    amount: i64,
    project_id: Option<Uuid>,
    expense_label: ExpenseLabel,
    meta: &TxMeta,
) -> NewTransaction {
    NewTransaction {
        kind,
        amount,
        occurred_at: meta.occurred_at.unwrap_or_else(Utc::now),
        expense_label,
        description: normalize_optional_text(meta.description.as_deref()),
        project_id,
        created_by: actor.user_id.clone(),
        attachment: meta.attachment.clone(),
        deferred_payment_id: None,
    }
}

impl Engine {
    /// Validates a new transaction, moves the funds it touches and stores it.
    pub(in crate::ops) async fn record_transaction(
        &self,
        db: &DatabaseTransaction,
        input: NewTransaction,
    ) -> ResultEngine<Transaction> {
        let tx = Transaction::new(input, Utc::now())?;
        self.apply_deltas(db, tx.fund_deltas()).await?;
        transactions::ActiveModel::from(&tx).insert(db).await?;
        Ok(tx)
    }

    /// Post-commit work for a freshly recorded transaction: named expenses
    /// are classified and the audit record is emitted.
    pub(in crate::ops) async fn after_record(
        &self,
        actor: &Actor,
        action: &'static str,
        tx: &Transaction,
    ) {
        tracing::info!(
            transaction_id = %tx.id,
            kind = tx.kind.as_str(),
            amount = tx.amount,
            project_id = ?tx.project_id,
            "{action} recorded"
        );
        let named = tx
            .expense_label
            .as_ref()
            .is_some_and(|label| !label.is_general());
        if named {
            self.classify_committed(tx.id).await;
        }
        self.emit(AuditRecord::new(
            &actor.user_id,
            action,
            "transaction",
            tx.id,
            json!({
                "kind": tx.kind.as_str(),
                "amount": tx.amount,
                "project_id": tx.project_id,
                "expense_type": tx.expense_label.as_ref().and_then(ExpenseLabel::name),
                "description": tx.description,
            }),
        ));
    }
}
