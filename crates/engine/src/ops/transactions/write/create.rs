use sea_orm::DatabaseTransaction;

use crate::{
    AdminTransactionCmd, DepositCmd, ExpenseLabel, ResultEngine, Transaction, TransactionKind,
    WithdrawalCmd,
};

use super::{super::super::Engine, draft_transaction};
use crate::ops::with_tx;

impl Engine {
    /// Moves `amount` from the admin fund to a project fund.
    ///
    /// The project fund is created on the first deposit. Fails with
    /// `KeyNotFound` when the project or the admin fund is missing,
    /// `Forbidden` without project access and `InsufficientFunds` when the
    /// admin fund cannot cover the amount.
    pub async fn process_deposit(&self, cmd: DepositCmd) -> ResultEngine<Transaction> {
        let tx = with_tx!(self, |db_tx| self.deposit_in_tx(&db_tx, &cmd).await)?;
        self.after_record(&cmd.actor, "deposit", &tx).await;
        Ok(tx)
    }

    async fn deposit_in_tx(
        &self,
        db: &DatabaseTransaction,
        cmd: &DepositCmd,
    ) -> ResultEngine<Transaction> {
        self.require_project_access(db, &cmd.actor, cmd.project_id)
            .await?;
        self.record_transaction(
            db,
            draft_transaction(
                &cmd.actor,
                TransactionKind::Income,
                cmd.amount,
                Some(cmd.project_id),
                ExpenseLabel::General,
                &cmd.meta,
            ),
        )
        .await
    }

    /// Spends `amount` from a project fund.
    ///
    /// The expense is classified right after commit when it carries a named
    /// expense type.
    pub async fn process_withdrawal(&self, cmd: WithdrawalCmd) -> ResultEngine<Transaction> {
        let tx = with_tx!(self, |db_tx| self.withdrawal_in_tx(&db_tx, &cmd).await)?;
        self.after_record(&cmd.actor, "withdrawal", &tx).await;
        Ok(tx)
    }

    async fn withdrawal_in_tx(
        &self,
        db: &DatabaseTransaction,
        cmd: &WithdrawalCmd,
    ) -> ResultEngine<Transaction> {
        self.require_project_access(db, &cmd.actor, cmd.project_id)
            .await?;
        self.record_transaction(
            db,
            draft_transaction(
                &cmd.actor,
                TransactionKind::Expense,
                cmd.amount,
                Some(cmd.project_id),
                cmd.expense_label.clone(),
                &cmd.meta,
            ),
        )
        .await
    }

    /// Credits or debits the admin fund.
    ///
    /// Authorization: requires the admin role.
    pub async fn process_admin_transaction(
        &self,
        cmd: AdminTransactionCmd,
    ) -> ResultEngine<Transaction> {
        self.require_admin(&cmd.actor, "recording an admin transaction")?;
        let tx = with_tx!(self, |db_tx| {
            self.record_transaction(
                &db_tx,
                draft_transaction(
                    &cmd.actor,
                    cmd.kind,
                    cmd.amount,
                    None,
                    cmd.expense_label.clone(),
                    &cmd.meta,
                ),
            )
            .await
        })?;
        let action = match cmd.kind {
            TransactionKind::Income => "admin_income",
            TransactionKind::Expense => "admin_expense",
        };
        self.after_record(&cmd.actor, action, &tx).await;
        Ok(tx)
    }
}
