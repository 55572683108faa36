use sea_orm::{ActiveValue, DatabaseTransaction, prelude::*};
use serde_json::json;

use crate::{
    AuditRecord, EngineError, ResultEngine, Transaction, UpdateTransactionCmd, transactions,
    util::normalize_optional_text,
};

use super::super::super::{Engine, with_tx};

impl Engine {
    /// Edits the amount, date or description of a transaction.
    ///
    /// An amount change moves the funds by the difference and, for
    /// installments, the paid amount of the deferred payment. The ledger
    /// entry is refreshed after commit.
    ///
    /// Authorization: project transactions need project access, admin fund
    /// transactions the admin role.
    pub async fn update_transaction(&self, cmd: UpdateTransactionCmd) -> ResultEngine<Transaction> {
        let (tx, previous_amount) =
            with_tx!(self, |db_tx| self.update_in_tx(&db_tx, &cmd).await)?;

        tracing::info!(
            transaction_id = %tx.id,
            previous_amount,
            amount = tx.amount,
            "transaction updated"
        );
        self.refresh_classification(tx.id).await;
        self.emit(AuditRecord::new(
            &cmd.actor.user_id,
            "update",
            "transaction",
            tx.id,
            json!({
                "previous_amount": previous_amount,
                "amount": tx.amount,
                "occurred_at": tx.occurred_at,
                "description": tx.description,
            }),
        ));
        Ok(tx)
    }

    async fn update_in_tx(
        &self,
        db: &DatabaseTransaction,
        cmd: &UpdateTransactionCmd,
    ) -> ResultEngine<(Transaction, i64)> {
        let mut tx = self
            .require_transaction_access(
                db,
                &cmd.actor,
                cmd.transaction_id,
                "editing an admin fund transaction",
            )
            .await?;
        let previous_amount = tx.amount;

        if let Some(amount) = cmd.amount {
            if amount <= 0 {
                return Err(EngineError::InvalidAmount("amount must be > 0".to_string()));
            }
            let delta = amount - previous_amount;
            if delta != 0 {
                self.apply_deltas(db, tx.fund_deltas_for(delta)).await?;
                if let Some(payment_id) = tx.deferred_payment_id {
                    self.adjust_installment(db, payment_id, delta).await?;
                }
                tx.amount = amount;
            }
        }
        if let Some(occurred_at) = cmd.occurred_at {
            tx.occurred_at = occurred_at;
        }
        if let Some(description) = cmd.description.as_deref() {
            tx.description = normalize_optional_text(Some(description));
        }

        transactions::ActiveModel {
            id: ActiveValue::Set(tx.id),
            amount: ActiveValue::Set(tx.amount),
            occurred_at: ActiveValue::Set(tx.occurred_at),
            description: ActiveValue::Set(tx.description.clone()),
            ..Default::default()
        }
        .update(db)
        .await?;

        Ok((tx, previous_amount))
    }
}
