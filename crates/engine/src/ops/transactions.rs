use sea_orm::{DatabaseTransaction, prelude::*};
use uuid::Uuid;

use crate::{Actor, EngineError, ResultEngine, Transaction, transactions};

use super::Engine;

mod list;
mod write;

pub use list::TransactionListFilter;
pub(super) use write::draft_transaction;

impl Engine {
    pub(super) async fn require_transaction(
        &self,
        db: &DatabaseTransaction,
        transaction_id: Uuid,
    ) -> ResultEngine<Transaction> {
        let model = transactions::Entity::find_by_id(transaction_id)
            .one(db)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound("transaction not exists".to_string()))?;
        Transaction::try_from(model)
    }

    /// Loads a transaction and checks the actor may act on it: project
    /// transactions need project access, admin fund transactions the admin
    /// role.
    async fn require_transaction_access(
        &self,
        db: &DatabaseTransaction,
        actor: &Actor,
        transaction_id: Uuid,
        action: &str,
    ) -> ResultEngine<Transaction> {
        let tx = self.require_transaction(db, transaction_id).await?;
        self.require_scope_access(db, actor, tx.project_id, action)
            .await?;
        Ok(tx)
    }
}
