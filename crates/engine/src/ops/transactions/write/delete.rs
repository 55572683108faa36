use sea_orm::{ActiveValue, DatabaseTransaction, QueryFilter, prelude::*};
use serde_json::json;
use uuid::Uuid;

use crate::{Actor, AuditRecord, ResultEngine, Transaction, ledger_entries, transactions};

use super::super::super::{Engine, with_tx};

impl Engine {
    /// Deletes a transaction and undoes its effects.
    ///
    /// In one unit of work:
    /// - the fund movement is reversed; a reversal that would leave a fund
    ///   negative fails with `InsufficientFunds` and nothing is deleted
    /// - an installment gives its amount back to the deferred payment
    /// - the ledger entry of the transaction is removed
    ///
    /// Authorization: project transactions need project access, admin fund
    /// transactions the admin role.
    pub async fn delete_transaction(
        &self,
        actor: &Actor,
        transaction_id: Uuid,
    ) -> ResultEngine<Transaction> {
        let tx = with_tx!(self, |db_tx| {
            self.delete_in_tx(&db_tx, actor, transaction_id).await
        })?;

        tracing::info!(
            transaction_id = %tx.id,
            amount = tx.amount,
            project_id = ?tx.project_id,
            "transaction deleted"
        );
        self.emit(AuditRecord::new(
            &actor.user_id,
            "delete",
            "transaction",
            tx.id,
            json!({
                "kind": tx.kind.as_str(),
                "amount": tx.amount,
                "project_id": tx.project_id,
                "deferred_payment_id": tx.deferred_payment_id,
            }),
        ));
        Ok(tx)
    }

    async fn delete_in_tx(
        &self,
        db: &DatabaseTransaction,
        actor: &Actor,
        transaction_id: Uuid,
    ) -> ResultEngine<Transaction> {
        let tx = self
            .require_transaction_access(
                db,
                actor,
                transaction_id,
                "deleting an admin fund transaction",
            )
            .await?;

        self.apply_deltas(db, tx.fund_deltas_for(-tx.amount)).await?;
        if let Some(payment_id) = tx.deferred_payment_id {
            self.revert_installment(db, payment_id, tx.amount).await?;
        }

        ledger_entries::Entity::delete_many()
            .filter(ledger_entries::Column::TransactionId.eq(tx.id))
            .exec(db)
            .await?;
        transactions::Entity::delete_by_id(tx.id).exec(db).await?;
        Ok(tx)
    }

    /// Archives or restores a transaction. Archived transactions keep their
    /// fund effect but are hidden from default listings.
    pub async fn set_transaction_archived(
        &self,
        actor: &Actor,
        transaction_id: Uuid,
        archived: bool,
    ) -> ResultEngine<Transaction> {
        let tx = with_tx!(self, |db_tx| {
            let mut tx = self
                .require_transaction_access(
                    &db_tx,
                    actor,
                    transaction_id,
                    "archiving an admin fund transaction",
                )
                .await?;
            transactions::ActiveModel {
                id: ActiveValue::Set(tx.id),
                archived: ActiveValue::Set(archived),
                ..Default::default()
            }
            .update(&db_tx)
            .await?;
            tx.archived = archived;
            Ok(tx)
        })?;

        self.emit(AuditRecord::new(
            &actor.user_id,
            if archived { "archive" } else { "unarchive" },
            "transaction",
            tx.id,
            json!({ "archived": archived }),
        ));
        Ok(tx)
    }
}
