//! Deferred payments: obligations settled in installments.

use chrono::Utc;
use sea_orm::{
    DatabaseTransaction, PaginatorTrait, QueryFilter, QueryOrder, prelude::*, sea_query::Expr,
};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    Actor, AuditRecord, DeferredPayment, DeferredStatus, EngineError, EntryKind, EntrySource,
    ExpenseLabel, LedgerEntry, NewDeferredPaymentCmd, ResultEngine, Transaction, TransactionKind,
    TxMeta, UpdateDeferredPaymentCmd, deferred_payments, ledger_entries, project_members,
    transactions,
    util::{normalize_optional_text, normalize_required_name},
};

use super::{Engine, transactions::draft_transaction, with_tx};

#[derive(Clone, Debug, Default)]
pub struct DeferredPaymentFilter {
    pub project_id: Option<Uuid>,
    pub status: Option<DeferredStatus>,
}

/// Result of [`Engine::pay_installment`]: the payment after the installment
/// and the expense transaction recording it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InstallmentReceipt {
    pub payment: DeferredPayment,
    pub transaction: Transaction,
}

impl Engine {
    /// Registers a deferred payment.
    ///
    /// A payment attached to a project needs project access, one without a
    /// project is paid from the admin fund and needs the admin role.
    pub async fn create_deferred_payment(
        &self,
        cmd: NewDeferredPaymentCmd,
    ) -> ResultEngine<DeferredPayment> {
        let beneficiary_name = normalize_required_name(&cmd.beneficiary_name, "beneficiary")?;
        let payment = DeferredPayment::new(
            beneficiary_name,
            cmd.total_amount,
            cmd.project_id,
            cmd.due_date,
            normalize_optional_text(cmd.description.as_deref()),
            cmd.actor.user_id.clone(),
            Utc::now(),
        )?;

        with_tx!(self, |db_tx| {
            self.require_scope_access(
                &db_tx,
                &cmd.actor,
                payment.project_id,
                "creating an admin deferred payment",
            )
            .await?;
            deferred_payments::ActiveModel::from(&payment)
                .insert(&db_tx)
                .await?;
            Ok(())
        })?;

        tracing::info!(
            deferred_payment_id = %payment.id,
            total = payment.total_amount,
            "deferred payment created"
        );
        self.emit(AuditRecord::new(
            &cmd.actor.user_id,
            "create",
            "deferred_payment",
            payment.id,
            json!({
                "beneficiary_name": payment.beneficiary_name,
                "total_amount": payment.total_amount,
                "project_id": payment.project_id,
            }),
        ));
        Ok(payment)
    }

    /// Return a deferred payment the actor can see.
    pub async fn deferred_payment(
        &self,
        actor: &Actor,
        deferred_payment_id: Uuid,
    ) -> ResultEngine<DeferredPayment> {
        with_tx!(self, |db_tx| {
            let payment = self
                .require_deferred_payment(&db_tx, deferred_payment_id)
                .await?;
            self.require_scope_access(
                &db_tx,
                actor,
                payment.project_id,
                "reading an admin deferred payment",
            )
            .await?;
            Ok(payment)
        })
    }

    /// Lists deferred payments, closest due date first.
    pub async fn list_deferred_payments(
        &self,
        actor: &Actor,
        filter: &DeferredPaymentFilter,
    ) -> ResultEngine<Vec<DeferredPayment>> {
        with_tx!(self, |db_tx| {
            self.list_deferred_in_tx(&db_tx, actor, filter).await
        })
    }

    async fn list_deferred_in_tx(
        &self,
        db: &DatabaseTransaction,
        actor: &Actor,
        filter: &DeferredPaymentFilter,
    ) -> ResultEngine<Vec<DeferredPayment>> {
        let mut query = deferred_payments::Entity::find();
        if let Some(project_id) = filter.project_id {
            self.require_project_access(db, actor, project_id).await?;
            query = query.filter(deferred_payments::Column::ProjectId.eq(project_id));
        } else if !actor.is_admin() {
            let member_of: Vec<Uuid> = project_members::Entity::find()
                .filter(project_members::Column::UserId.eq(actor.user_id.clone()))
                .all(db)
                .await?
                .into_iter()
                .map(|member| member.project_id)
                .collect();
            query = query.filter(deferred_payments::Column::ProjectId.is_in(member_of));
        }
        if let Some(status) = filter.status {
            query = query.filter(deferred_payments::Column::Status.eq(status.as_str()));
        }
        Ok(query
            .order_by_asc(deferred_payments::Column::DueDate)
            .order_by_asc(deferred_payments::Column::CreatedAt)
            .all(db)
            .await?
            .into_iter()
            .map(DeferredPayment::from)
            .collect())
    }

    /// Edits a deferred payment. The new total must still cover what was
    /// paid (`Overpayment`).
    ///
    /// Authorization: requires the admin role.
    pub async fn update_deferred_payment(
        &self,
        cmd: UpdateDeferredPaymentCmd,
    ) -> ResultEngine<DeferredPayment> {
        self.require_admin(&cmd.actor, "editing a deferred payment")?;
        let beneficiary_name = cmd
            .beneficiary_name
            .as_deref()
            .map(|name| normalize_required_name(name, "beneficiary"))
            .transpose()?;

        let payment = with_tx!(self, |db_tx| {
            self.update_deferred_in_tx(&db_tx, &cmd, beneficiary_name.clone())
                .await
        })?;

        self.emit(AuditRecord::new(
            &cmd.actor.user_id,
            "update",
            "deferred_payment",
            payment.id,
            json!({
                "beneficiary_name": payment.beneficiary_name,
                "total_amount": payment.total_amount,
                "status": payment.status.as_str(),
            }),
        ));
        Ok(payment)
    }

    async fn update_deferred_in_tx(
        &self,
        db: &DatabaseTransaction,
        cmd: &UpdateDeferredPaymentCmd,
        beneficiary_name: Option<String>,
    ) -> ResultEngine<DeferredPayment> {
        let mut payment = self
            .require_deferred_payment(db, cmd.deferred_payment_id)
            .await?;
        if let Some(name) = beneficiary_name {
            payment.beneficiary_name = name;
        }
        if let Some(total_amount) = cmd.total_amount {
            payment.set_total(total_amount)?;
        }
        if let Some(due_date) = cmd.due_date {
            payment.due_date = Some(due_date);
        }
        if let Some(description) = cmd.description.as_deref() {
            payment.description = normalize_optional_text(Some(description));
        }
        self.save_deferred_payment(db, &mut payment).await?;
        Ok(payment)
    }

    /// Deletes a deferred payment. Its installment transactions are kept and
    /// lose their link to it. A payment already transferred to the ledger
    /// cannot be deleted (`ReferencedEntity`).
    ///
    /// Authorization: requires the admin role.
    pub async fn delete_deferred_payment(
        &self,
        actor: &Actor,
        deferred_payment_id: Uuid,
    ) -> ResultEngine<()> {
        self.require_admin(actor, "deleting a deferred payment")?;
        let payment = with_tx!(self, |db_tx| {
            let payment = self
                .require_deferred_payment(&db_tx, deferred_payment_id)
                .await?;
            let transferred = ledger_entries::Entity::find()
                .filter(ledger_entries::Column::DeferredPaymentId.eq(deferred_payment_id))
                .count(&db_tx)
                .await?;
            if transferred > 0 {
                return Err(EngineError::ReferencedEntity(format!(
                    "deferred payment for '{}' was transferred to the ledger",
                    payment.beneficiary_name
                )));
            }
            transactions::Entity::update_many()
                .col_expr(
                    transactions::Column::DeferredPaymentId,
                    Expr::value(Option::<Uuid>::None),
                )
                .filter(transactions::Column::DeferredPaymentId.eq(deferred_payment_id))
                .exec(&db_tx)
                .await?;
            deferred_payments::Entity::delete_by_id(deferred_payment_id)
                .exec(&db_tx)
                .await?;
            Ok(payment)
        })?;

        self.emit(AuditRecord::new(
            &actor.user_id,
            "delete",
            "deferred_payment",
            payment.id,
            json!({
                "beneficiary_name": payment.beneficiary_name,
                "paid_amount": payment.paid_amount,
            }),
        ));
        Ok(())
    }

    /// Pays an installment.
    ///
    /// In one unit of work the paid amount grows by `amount` and a general
    /// expense is recorded against the payment's project fund, or the admin
    /// fund when the payment has no project. An installment above the
    /// remaining amount fails with `Overpayment`; a fund that cannot cover it
    /// fails with `InsufficientFunds` and nothing is written.
    pub async fn pay_installment(
        &self,
        actor: &Actor,
        deferred_payment_id: Uuid,
        amount: i64,
    ) -> ResultEngine<InstallmentReceipt> {
        let receipt = with_tx!(self, |db_tx| {
            self.pay_installment_in_tx(&db_tx, actor, deferred_payment_id, amount)
                .await
        })?;

        self.after_record(actor, "installment", &receipt.transaction)
            .await;
        tracing::info!(
            %deferred_payment_id,
            paid = receipt.payment.paid_amount,
            status = receipt.payment.status.as_str(),
            "installment paid"
        );
        self.emit(AuditRecord::new(
            &actor.user_id,
            "pay_installment",
            "deferred_payment",
            deferred_payment_id,
            json!({
                "amount": amount,
                "paid_amount": receipt.payment.paid_amount,
                "status": receipt.payment.status.as_str(),
                "transaction_id": receipt.transaction.id,
            }),
        ));
        Ok(receipt)
    }

    async fn pay_installment_in_tx(
        &self,
        db: &DatabaseTransaction,
        actor: &Actor,
        deferred_payment_id: Uuid,
        amount: i64,
    ) -> ResultEngine<InstallmentReceipt> {
        let mut payment = self
            .require_deferred_payment(db, deferred_payment_id)
            .await?;
        self.require_scope_access(
            db,
            actor,
            payment.project_id,
            "paying an admin deferred payment",
        )
        .await?;

        payment.record_payment(amount)?;

        let meta = TxMeta::default().description(payment.installment_description());
        let mut input = draft_transaction(
            actor,
            TransactionKind::Expense,
            amount,
            payment.project_id,
            ExpenseLabel::General,
            &meta,
        );
        input.deferred_payment_id = Some(payment.id);
        let transaction = self.record_transaction(db, input).await?;

        self.save_deferred_payment(db, &mut payment).await?;
        Ok(InstallmentReceipt {
            payment,
            transaction,
        })
    }

    /// Moves a deferred payment into the ledger under the system "Deferred
    /// payments" expense type.
    ///
    /// A completed payment becomes a `classified` entry. A partial one
    /// becomes a `pending_transfer` entry, refreshed and promoted on later
    /// transfers once the payment completes. Transferring a payment whose
    /// entry is already `classified` fails with `AlreadyTransferred`.
    ///
    /// Authorization: requires the admin role.
    pub async fn transfer_to_ledger(
        &self,
        actor: &Actor,
        deferred_payment_id: Uuid,
    ) -> ResultEngine<LedgerEntry> {
        self.require_admin(actor, "transferring a deferred payment")?;
        let entry = with_tx!(self, |db_tx| {
            self.transfer_in_tx(&db_tx, deferred_payment_id).await
        })?;

        tracing::info!(
            %deferred_payment_id,
            entry_id = %entry.id,
            kind = entry.kind.as_str(),
            "deferred payment transferred"
        );
        self.emit(AuditRecord::new(
            &actor.user_id,
            "transfer",
            "deferred_payment",
            deferred_payment_id,
            json!({
                "ledger_entry_id": entry.id,
                "amount": entry.amount,
                "entry_kind": entry.kind.as_str(),
            }),
        ));
        Ok(entry)
    }

    async fn transfer_in_tx(
        &self,
        db: &DatabaseTransaction,
        deferred_payment_id: Uuid,
    ) -> ResultEngine<LedgerEntry> {
        let payment = self
            .require_deferred_payment(db, deferred_payment_id)
            .await?;
        if payment.paid_amount <= 0 {
            return Err(EngineError::InvalidAmount(format!(
                "nothing was paid to '{}' yet",
                payment.beneficiary_name
            )));
        }
        let kind = match payment.status {
            DeferredStatus::Completed => EntryKind::Classified,
            DeferredStatus::Partial | DeferredStatus::Pending => EntryKind::PendingTransfer,
        };
        let system_type = self.ensure_system_expense_type(db).await?;
        let now = Utc::now();

        let existing = ledger_entries::Entity::find()
            .filter(ledger_entries::Column::DeferredPaymentId.eq(deferred_payment_id))
            .one(db)
            .await?
            .map(LedgerEntry::try_from)
            .transpose()?;

        match existing {
            Some(entry) if entry.kind != EntryKind::PendingTransfer => {
                Err(EngineError::AlreadyTransferred(format!(
                    "deferred payment for '{}'",
                    payment.beneficiary_name
                )))
            }
            Some(mut entry) => {
                entry.amount = payment.paid_amount;
                entry.kind = kind;
                entry.expense_type_id = Some(system_type.id);
                entry.updated_at = now;
                ledger_entries::ActiveModel::from(&entry).update(db).await?;
                Ok(entry)
            }
            None => {
                let entry = LedgerEntry {
                    id: Uuid::new_v4(),
                    entry_date: now,
                    source: EntrySource::DeferredPayment {
                        deferred_payment_id,
                    },
                    expense_type_id: Some(system_type.id),
                    amount: payment.paid_amount,
                    description: Some(
                        payment
                            .description
                            .clone()
                            .unwrap_or_else(|| format!("deferred payment: {}", payment.beneficiary_name)),
                    ),
                    project_id: payment.project_id,
                    kind,
                    created_at: now,
                    updated_at: now,
                };
                ledger_entries::ActiveModel::from(&entry).insert(db).await?;
                Ok(entry)
            }
        }
    }

    async fn require_deferred_payment(
        &self,
        db: &DatabaseTransaction,
        deferred_payment_id: Uuid,
    ) -> ResultEngine<DeferredPayment> {
        deferred_payments::Entity::find_by_id(deferred_payment_id)
            .one(db)
            .await?
            .map(DeferredPayment::from)
            .ok_or_else(|| EngineError::KeyNotFound("deferred payment not exists".to_string()))
    }

    /// Moves the paid amount of an installment's payment after the
    /// installment amount changed by `delta`. A payment that no longer
    /// exists is skipped.
    pub(super) async fn adjust_installment(
        &self,
        db: &DatabaseTransaction,
        deferred_payment_id: Uuid,
        delta: i64,
    ) -> ResultEngine<()> {
        let Some(mut payment) = self.find_deferred_payment(db, deferred_payment_id).await? else {
            tracing::warn!(%deferred_payment_id, "installment edited, deferred payment missing");
            return Ok(());
        };
        payment.adjust_payment(delta)?;
        self.save_deferred_payment(db, &mut payment).await
    }

    /// Gives a deleted installment back to its payment, floored at zero. A
    /// payment that no longer exists is skipped.
    pub(super) async fn revert_installment(
        &self,
        db: &DatabaseTransaction,
        deferred_payment_id: Uuid,
        amount: i64,
    ) -> ResultEngine<()> {
        let Some(mut payment) = self.find_deferred_payment(db, deferred_payment_id).await? else {
            tracing::warn!(%deferred_payment_id, "installment deleted, deferred payment missing");
            return Ok(());
        };
        payment.revert_payment(amount);
        self.save_deferred_payment(db, &mut payment).await
    }

    async fn find_deferred_payment(
        &self,
        db: &DatabaseTransaction,
        deferred_payment_id: Uuid,
    ) -> ResultEngine<Option<DeferredPayment>> {
        Ok(deferred_payments::Entity::find_by_id(deferred_payment_id)
            .one(db)
            .await?
            .map(DeferredPayment::from))
    }

    /// Writes a payment back, provided its version did not move since it was
    /// read (`Conflict` otherwise).
    async fn save_deferred_payment(
        &self,
        db: &DatabaseTransaction,
        payment: &mut DeferredPayment,
    ) -> ResultEngine<()> {
        payment.updated_at = Utc::now();
        let result = deferred_payments::Entity::update_many()
            .col_expr(
                deferred_payments::Column::BeneficiaryName,
                Expr::value(payment.beneficiary_name.clone()),
            )
            .col_expr(
                deferred_payments::Column::TotalAmount,
                Expr::value(payment.total_amount),
            )
            .col_expr(
                deferred_payments::Column::PaidAmount,
                Expr::value(payment.paid_amount),
            )
            .col_expr(
                deferred_payments::Column::Status,
                Expr::value(payment.status.as_str()),
            )
            .col_expr(deferred_payments::Column::DueDate, Expr::value(payment.due_date))
            .col_expr(
                deferred_payments::Column::Description,
                Expr::value(payment.description.clone()),
            )
            .col_expr(
                deferred_payments::Column::Version,
                Expr::col(deferred_payments::Column::Version).add(1),
            )
            .col_expr(
                deferred_payments::Column::UpdatedAt,
                Expr::value(payment.updated_at),
            )
            .filter(deferred_payments::Column::Id.eq(payment.id))
            .filter(deferred_payments::Column::Version.eq(payment.version))
            .exec(db)
            .await?;
        if result.rows_affected == 0 {
            return Err(EngineError::Conflict(format!(
                "deferred payment {} changed while being updated",
                payment.id
            )));
        }
        payment.version += 1;
        Ok(())
    }
}
