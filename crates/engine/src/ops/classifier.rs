//! Ledger classification.
//!
//! Expense transactions are bound to an expense type through a ledger entry.
//! There is at most one entry per transaction (unique `transaction_id`), so
//! classifying again updates the entry in place.

use std::collections::BTreeMap;

use chrono::Utc;
use sea_orm::{
    ActiveValue, DatabaseTransaction, QueryFilter, QueryOrder, QuerySelect, SqlErr, prelude::*,
};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    Actor, AuditRecord, EngineError, EntryKind, EntrySource, ExpenseLabel, LedgerEntry,
    ResultEngine, Transaction, TransactionKind, expense_types, ledger_entries, transactions,
};

use super::{Engine, with_tx};

/// Why a transaction got no ledger entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "name", rename_all = "snake_case")]
pub enum SkipReason {
    Income,
    /// Installments reach the ledger through their deferred payment.
    Installment,
    /// General expenses are only classified when forced.
    GeneralExpense,
    /// The label names no active expense type.
    UnknownExpenseType(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClassifyOutcome {
    Created(LedgerEntry),
    Updated(LedgerEntry),
    /// An entry exists and classification was not forced.
    Unchanged(LedgerEntry),
    Skipped(SkipReason),
}

impl ClassifyOutcome {
    pub fn entry(&self) -> Option<&LedgerEntry> {
        match self {
            Self::Created(entry) | Self::Updated(entry) | Self::Unchanged(entry) => Some(entry),
            Self::Skipped(_) => None,
        }
    }
}

/// Which transactions [`Engine::reclassify_transactions`] walks through.
#[derive(Clone, Debug, Default)]
pub struct ReclassifyScope {
    pub project_id: Option<Uuid>,
    pub force: bool,
    pub include_archived: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClassificationFailure {
    pub transaction_id: Uuid,
    pub error: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReclassifyReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failures: Vec<ClassificationFailure>,
}

impl ReclassifyReport {
    fn count(&mut self, outcome: &ClassifyOutcome) {
        match outcome {
            ClassifyOutcome::Created(_) => self.created += 1,
            ClassifyOutcome::Updated(_) => self.updated += 1,
            ClassifyOutcome::Unchanged(_) => self.unchanged += 1,
            ClassifyOutcome::Skipped(_) => self.skipped += 1,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct LedgerFilter {
    pub project_id: Option<Uuid>,
    pub expense_type_id: Option<Uuid>,
    pub kind: Option<EntryKind>,
    pub limit: Option<u64>,
}

/// Sum of the ledger entries of one expense type. General expenses have no
/// expense type and are grouped under `None`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LedgerTotal {
    pub expense_type_id: Option<Uuid>,
    pub expense_type_name: Option<String>,
    pub entries: u64,
    pub total: i64,
}

impl Engine {
    /// Classifies one transaction.
    ///
    /// - income is skipped, and so are deferred payment installments, even
    ///   when forced
    /// - a general expense is skipped unless `force`, which records it as a
    ///   `general_expense` entry without expense type
    /// - a named expense resolves against active expense types; an unknown
    ///   name is skipped, or fails with `ClassificationFailed` when forced
    /// - an existing entry is left alone unless `force`, which rewrites it
    ///
    /// Authorization: requires the admin role.
    pub async fn classify_transaction(
        &self,
        actor: &Actor,
        transaction_id: Uuid,
        force: bool,
    ) -> ResultEngine<ClassifyOutcome> {
        self.require_admin(actor, "classifying a transaction")?;
        let outcome = with_tx!(self, |db_tx| {
            self.classify_in_tx(&db_tx, transaction_id, force).await
        })?;
        self.audit_classification(actor, transaction_id, &outcome);
        Ok(outcome)
    }

    /// Classifies every expense transaction in scope, one unit of work per
    /// transaction. Running it twice creates no new entries.
    ///
    /// Authorization: requires the admin role.
    pub async fn reclassify_transactions(
        &self,
        actor: &Actor,
        scope: &ReclassifyScope,
    ) -> ResultEngine<ReclassifyReport> {
        self.require_admin(actor, "reclassifying transactions")?;
        let ids = with_tx!(self, |db_tx| self.expense_ids_in_scope(&db_tx, scope).await)?;

        let mut report = ReclassifyReport::default();
        for transaction_id in ids {
            let result = with_tx!(self, |db_tx| {
                self.classify_in_tx(&db_tx, transaction_id, scope.force).await
            });
            match result {
                Ok(outcome) => {
                    report.count(&outcome);
                    self.audit_classification(actor, transaction_id, &outcome);
                }
                Err(err) => {
                    tracing::warn!(%transaction_id, "reclassification failed: {err}");
                    report.failures.push(ClassificationFailure {
                        transaction_id,
                        error: err.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            skipped = report.skipped,
            failed = report.failures.len(),
            "reclassification done"
        );
        Ok(report)
    }

    /// The ledger entry of a transaction, if it was classified.
    pub async fn ledger_entry_for_transaction(
        &self,
        actor: &Actor,
        transaction_id: Uuid,
    ) -> ResultEngine<Option<LedgerEntry>> {
        with_tx!(self, |db_tx| {
            let tx = self.require_transaction(&db_tx, transaction_id).await?;
            self.require_scope_access(&db_tx, actor, tx.project_id, "reading the admin ledger")
                .await?;
            self.find_entry_for_transaction(&db_tx, transaction_id)
                .await
        })
    }

    /// Lists ledger entries, most recent first.
    ///
    /// Unscoped listings require the admin role.
    pub async fn ledger_entries(
        &self,
        actor: &Actor,
        filter: &LedgerFilter,
    ) -> ResultEngine<Vec<LedgerEntry>> {
        with_tx!(self, |db_tx| {
            self.require_ledger_scope(&db_tx, actor, filter.project_id)
                .await?;
            let mut query = ledger_entries::Entity::find();
            if let Some(project_id) = filter.project_id {
                query = query.filter(ledger_entries::Column::ProjectId.eq(project_id));
            }
            if let Some(expense_type_id) = filter.expense_type_id {
                query = query.filter(ledger_entries::Column::ExpenseTypeId.eq(expense_type_id));
            }
            if let Some(kind) = filter.kind {
                query = query.filter(ledger_entries::Column::EntryKind.eq(kind.as_str()));
            }
            if let Some(limit) = filter.limit {
                query = query.limit(limit);
            }
            query
                .order_by_desc(ledger_entries::Column::EntryDate)
                .all(&db_tx)
                .await?
                .into_iter()
                .map(LedgerEntry::try_from)
                .collect::<ResultEngine<Vec<_>>>()
        })
    }

    /// Ledger amounts summed per expense type, named types by name and the
    /// general bucket last.
    pub async fn ledger_totals(
        &self,
        actor: &Actor,
        project_id: Option<Uuid>,
    ) -> ResultEngine<Vec<LedgerTotal>> {
        with_tx!(self, |db_tx| {
            self.require_ledger_scope(&db_tx, actor, project_id).await?;
            self.ledger_totals_in_tx(&db_tx, project_id).await
        })
    }

    async fn ledger_totals_in_tx(
        &self,
        db: &DatabaseTransaction,
        project_id: Option<Uuid>,
    ) -> ResultEngine<Vec<LedgerTotal>> {
        let mut query = ledger_entries::Entity::find();
        if let Some(project_id) = project_id {
            query = query.filter(ledger_entries::Column::ProjectId.eq(project_id));
        }
        let mut sums: BTreeMap<Option<Uuid>, (u64, i64)> = BTreeMap::new();
        for entry in query.all(db).await? {
            let slot = sums.entry(entry.expense_type_id).or_default();
            slot.0 += 1;
            slot.1 += entry.amount;
        }

        let type_ids: Vec<Uuid> = sums.keys().flatten().copied().collect();
        let names: BTreeMap<Uuid, String> = expense_types::Entity::find()
            .filter(expense_types::Column::Id.is_in(type_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|model| (model.id, model.name))
            .collect();

        let mut totals: Vec<LedgerTotal> = sums
            .into_iter()
            .map(|(expense_type_id, (entries, total))| LedgerTotal {
                expense_type_id,
                expense_type_name: expense_type_id.and_then(|id| names.get(&id).cloned()),
                entries,
                total,
            })
            .collect();
        totals.sort_by(|a, b| {
            (a.expense_type_id.is_none(), &a.expense_type_name)
                .cmp(&(b.expense_type_id.is_none(), &b.expense_type_name))
        });
        Ok(totals)
    }

    async fn require_ledger_scope(
        &self,
        db: &DatabaseTransaction,
        actor: &Actor,
        project_id: Option<Uuid>,
    ) -> ResultEngine<()> {
        self.require_scope_access(db, actor, project_id, "reading the whole ledger")
            .await
    }

    pub(super) async fn find_entry_for_transaction(
        &self,
        db: &DatabaseTransaction,
        transaction_id: Uuid,
    ) -> ResultEngine<Option<LedgerEntry>> {
        ledger_entries::Entity::find()
            .filter(ledger_entries::Column::TransactionId.eq(transaction_id))
            .one(db)
            .await?
            .map(LedgerEntry::try_from)
            .transpose()
    }

    async fn expense_ids_in_scope(
        &self,
        db: &DatabaseTransaction,
        scope: &ReclassifyScope,
    ) -> ResultEngine<Vec<Uuid>> {
        let mut query = transactions::Entity::find()
            .filter(transactions::Column::Kind.eq(TransactionKind::Expense.as_str()));
        if let Some(project_id) = scope.project_id {
            self.require_project(db, project_id).await?;
            query = query.filter(transactions::Column::ProjectId.eq(project_id));
        }
        if !scope.include_archived {
            query = query.filter(transactions::Column::Archived.eq(false));
        }
        Ok(query
            .order_by_asc(transactions::Column::OccurredAt)
            .all(db)
            .await?
            .into_iter()
            .map(|model| model.id)
            .collect())
    }

    pub(super) async fn classify_in_tx(
        &self,
        db: &DatabaseTransaction,
        transaction_id: Uuid,
        force: bool,
    ) -> ResultEngine<ClassifyOutcome> {
        let tx = self.require_transaction(db, transaction_id).await?;
        if tx.kind == TransactionKind::Income {
            return Ok(ClassifyOutcome::Skipped(SkipReason::Income));
        }
        if tx.deferred_payment_id.is_some() {
            return Ok(ClassifyOutcome::Skipped(SkipReason::Installment));
        }

        let (expense_type_id, kind) = match tx.expense_label.clone().unwrap_or_default() {
            ExpenseLabel::General if !force => {
                return Ok(ClassifyOutcome::Skipped(SkipReason::GeneralExpense));
            }
            ExpenseLabel::General => (None, EntryKind::GeneralExpense),
            ExpenseLabel::Named(name) => match self.resolve_active_expense_type(db, &name).await? {
                Some(expense_type) => (Some(expense_type.id), EntryKind::Classified),
                None if force => {
                    return Err(EngineError::ClassificationFailed(format!(
                        "no active expense type named '{name}'"
                    )));
                }
                None => {
                    return Ok(ClassifyOutcome::Skipped(SkipReason::UnknownExpenseType(name)));
                }
            },
        };

        let now = Utc::now();
        match self.find_entry_for_transaction(db, transaction_id).await? {
            Some(entry) if !force => Ok(ClassifyOutcome::Unchanged(entry)),
            Some(mut entry) => {
                entry.entry_date = tx.occurred_at;
                entry.expense_type_id = expense_type_id;
                entry.amount = tx.amount;
                entry.description = tx.description.clone();
                entry.project_id = tx.project_id;
                entry.kind = kind;
                entry.updated_at = now;
                ledger_entries::ActiveModel {
                    id: ActiveValue::Set(entry.id),
                    entry_date: ActiveValue::Set(entry.entry_date),
                    expense_type_id: ActiveValue::Set(entry.expense_type_id),
                    amount: ActiveValue::Set(entry.amount),
                    description: ActiveValue::Set(entry.description.clone()),
                    project_id: ActiveValue::Set(entry.project_id),
                    entry_kind: ActiveValue::Set(entry.kind.as_str().to_string()),
                    updated_at: ActiveValue::Set(now),
                    ..Default::default()
                }
                .update(db)
                .await?;
                Ok(ClassifyOutcome::Updated(entry))
            }
            None => {
                let entry = entry_for(&tx, expense_type_id, kind, now);
                ledger_entries::ActiveModel::from(&entry)
                    .insert(db)
                    .await
                    .map_err(|err| match err.sql_err() {
                        // Lost a race with another classification of the same
                        // transaction; the retry sees its entry.
                        Some(SqlErr::UniqueConstraintViolation(_)) => EngineError::Conflict(
                            format!("transaction {transaction_id} classified concurrently"),
                        ),
                        _ => EngineError::from(err),
                    })?;
                Ok(ClassifyOutcome::Created(entry))
            }
        }
    }

    /// Classification right after a transaction was recorded. Failures are
    /// logged and never reach the caller.
    pub(super) async fn classify_committed(&self, transaction_id: Uuid) {
        let result = with_tx!(self, |db_tx| {
            self.classify_in_tx(&db_tx, transaction_id, false).await
        });
        log_classification(transaction_id, result);
    }

    /// Brings the ledger entry of an edited transaction up to date. An
    /// existing entry is rewritten, a missing one is created when possible.
    pub(super) async fn refresh_classification(&self, transaction_id: Uuid) {
        let result = with_tx!(self, |db_tx| {
            self.refresh_in_tx(&db_tx, transaction_id).await
        });
        log_classification(transaction_id, result);
    }

    async fn refresh_in_tx(
        &self,
        db: &DatabaseTransaction,
        transaction_id: Uuid,
    ) -> ResultEngine<ClassifyOutcome> {
        let classified = self
            .find_entry_for_transaction(db, transaction_id)
            .await?
            .is_some();
        self.classify_in_tx(db, transaction_id, classified).await
    }

    fn audit_classification(&self, actor: &Actor, transaction_id: Uuid, outcome: &ClassifyOutcome) {
        let action = match outcome {
            ClassifyOutcome::Created(_) => "classify",
            ClassifyOutcome::Updated(_) => "reclassify",
            ClassifyOutcome::Unchanged(_) | ClassifyOutcome::Skipped(_) => return,
        };
        let Some(entry) = outcome.entry() else {
            return;
        };
        self.emit(AuditRecord::new(
            &actor.user_id,
            action,
            "ledger_entry",
            entry.id,
            json!({
                "transaction_id": transaction_id,
                "expense_type_id": entry.expense_type_id,
                "amount": entry.amount,
            }),
        ));
    }
}

fn entry_for(
    tx: &Transaction,
    expense_type_id: Option<Uuid>,
    kind: EntryKind,
    now: chrono::DateTime<Utc>,
) -> LedgerEntry {
    LedgerEntry {
        id: Uuid::new_v4(),
        entry_date: tx.occurred_at,
        source: EntrySource::Transaction {
            transaction_id: tx.id,
        },
        expense_type_id,
        amount: tx.amount,
        description: tx.description.clone(),
        project_id: tx.project_id,
        kind,
        created_at: now,
        updated_at: now,
    }
}

fn log_classification(transaction_id: Uuid, result: ResultEngine<ClassifyOutcome>) {
    match result {
        Ok(ClassifyOutcome::Skipped(SkipReason::UnknownExpenseType(name))) => {
            tracing::warn!(%transaction_id, "not classified: no active expense type named '{name}'");
        }
        Ok(outcome) => {
            tracing::debug!(%transaction_id, ?outcome, "classification done");
        }
        Err(err) => {
            tracing::warn!(%transaction_id, "classification failed: {err}");
        }
    }
}
