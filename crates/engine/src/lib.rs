//! Fund ledger engine.
//!
//! Keeps the balances of an admin fund and one fund per project, records every
//! money movement as a [`Transaction`], classifies expenses into a ledger by
//! [`ExpenseType`] and tracks [`DeferredPayment`]s settled in installments.
//!
//! Every mutating operation runs in one database transaction; see
//! [`Engine`] for the operations and [`EngineError`] for the failure modes.

pub use actor::{Actor, Role};
pub use audit::{AuditError, AuditRecord, AuditSink, TracingAuditSink};
pub use commands::{
    AdminTransactionCmd, DepositCmd, ExpenseTypePatch, NewDeferredPaymentCmd, TxMeta,
    UpdateDeferredPaymentCmd, UpdateTransactionCmd, WithdrawalCmd,
};
pub use deferred_payments::{DeferredPayment, DeferredStatus};
pub use error::EngineError;
pub use expense_types::ExpenseType;
pub use funds::{Fund, FundKind};
pub use ledger_entries::{EntryKind, EntrySource, LedgerEntry};
pub use ops::{
    ClassificationFailure, ClassifyOutcome, DEFAULT_ADMIN_OWNER, DeferredPaymentFilter, Engine,
    EngineBuilder, InstallmentReceipt, LedgerFilter, LedgerTotal, ReclassifyReport,
    ReclassifyScope, SkipReason, TransactionListFilter,
};
pub use projects::Project;
pub use router::DatabaseRouter;
pub use transactions::{Attachment, ExpenseLabel, Transaction, TransactionKind};

mod actor;
mod audit;
mod commands;
mod deferred_payments;
mod error;
mod expense_types;
mod funds;
mod ledger_entries;
mod ops;
mod project_members;
mod projects;
mod router;
mod transactions;
mod util;

type ResultEngine<T> = Result<T, EngineError>;
