use sea_orm::{DatabaseTransaction, QueryFilter, QueryOrder, QuerySelect, prelude::*};
use uuid::Uuid;

use crate::{Actor, ResultEngine, Transaction, TransactionKind, project_members, transactions};

use super::super::{Engine, with_tx};

/// Filter for [`Engine::list_transactions`]. The default lists every
/// visible, non archived transaction.
#[derive(Clone, Debug, Default)]
pub struct TransactionListFilter {
    pub project_id: Option<Uuid>,
    /// Only transactions that moved the admin fund directly.
    pub admin_only: bool,
    pub kind: Option<TransactionKind>,
    pub deferred_payment_id: Option<Uuid>,
    pub include_archived: bool,
    pub limit: Option<u64>,
}

impl Engine {
    /// Return a transaction the actor can see.
    pub async fn transaction(&self, actor: &Actor, transaction_id: Uuid) -> ResultEngine<Transaction> {
        with_tx!(self, |db_tx| {
            self.require_transaction_access(
                &db_tx,
                actor,
                transaction_id,
                "reading an admin fund transaction",
            )
            .await
        })
    }

    /// Lists transactions, most recent first.
    ///
    /// Members only see the transactions of their projects; admin fund
    /// transactions are reserved to admins.
    pub async fn list_transactions(
        &self,
        actor: &Actor,
        filter: &TransactionListFilter,
    ) -> ResultEngine<Vec<Transaction>> {
        with_tx!(self, |db_tx| {
            self.list_transactions_in_tx(&db_tx, actor, filter).await
        })
    }

    async fn list_transactions_in_tx(
        &self,
        db: &DatabaseTransaction,
        actor: &Actor,
        filter: &TransactionListFilter,
    ) -> ResultEngine<Vec<Transaction>> {
        let mut query = transactions::Entity::find();

        if let Some(project_id) = filter.project_id {
            self.require_project_access(db, actor, project_id).await?;
            query = query.filter(transactions::Column::ProjectId.eq(project_id));
        } else if filter.admin_only {
            self.require_admin(actor, "listing admin fund transactions")?;
            query = query.filter(transactions::Column::ProjectId.is_null());
        } else if !actor.is_admin() {
            let member_of: Vec<Uuid> = project_members::Entity::find()
                .filter(project_members::Column::UserId.eq(actor.user_id.clone()))
                .all(db)
                .await?
                .into_iter()
                .map(|member| member.project_id)
                .collect();
            query = query.filter(transactions::Column::ProjectId.is_in(member_of));
        }

        if let Some(kind) = filter.kind {
            query = query.filter(transactions::Column::Kind.eq(kind.as_str()));
        }
        if let Some(payment_id) = filter.deferred_payment_id {
            query = query.filter(transactions::Column::DeferredPaymentId.eq(payment_id));
        }
        if !filter.include_archived {
            query = query.filter(transactions::Column::Archived.eq(false));
        }
        if let Some(limit) = filter.limit {
            query = query.limit(limit);
        }

        query
            .order_by_desc(transactions::Column::OccurredAt)
            .order_by_desc(transactions::Column::CreatedAt)
            .all(db)
            .await?
            .into_iter()
            .map(Transaction::try_from)
            .collect()
    }
}
