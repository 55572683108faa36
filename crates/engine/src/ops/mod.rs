use std::sync::Arc;

use crate::{
    AuditRecord, AuditSink, DatabaseRouter, EngineError, ResultEngine, TracingAuditSink,
    util::normalize_required_name,
};

mod access;
mod classifier;
mod deferred;
mod expense_types;
mod funds;
mod projects;
mod transactions;

pub use classifier::{
    ClassificationFailure, ClassifyOutcome, LedgerFilter, LedgerTotal, ReclassifyReport,
    ReclassifyScope, SkipReason,
};
pub use deferred::{DeferredPaymentFilter, InstallmentReceipt};
pub use transactions::TransactionListFilter;

/// Owner key of the admin fund when none is configured.
pub const DEFAULT_ADMIN_OWNER: &str = "admin";

/// How many times a unit of work is attempted when it loses an optimistic
/// concurrency race on a fund or deferred payment row.
pub(crate) const MAX_TX_ATTEMPTS: u32 = 3;

/// Run a block inside a DB transaction, committing on success and rolling back
/// on error.
///
/// Units failing with a retryable error ([`EngineError::Conflict`]) are run
/// again on a fresh transaction. Early returns through `?` inside `$body` skip
/// the retry; bodies that need it evaluate to a `ResultEngine` instead.
///
/// The macro evaluates to a `ResultEngine`; failures to begin or commit are
/// part of it, so callers that do not return a `Result` can use it too.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let $tx = match $self.router.begin().await {
                Ok(tx) => tx,
                Err(err) => break Err($crate::EngineError::from(err)),
            };
            let result: $crate::ResultEngine<_> = $body;
            match result {
                Ok(value) => match $tx.commit().await {
                    Ok(()) => break Ok(value),
                    Err(err) => break Err($crate::EngineError::from(err)),
                },
                Err(err) if err.is_retryable() && attempt < $crate::ops::MAX_TX_ATTEMPTS => {
                    tracing::debug!(attempt, "retrying unit of work: {err}");
                }
                Err(err) => break Err(err),
            }
        }
    }};
}

pub(crate) use with_tx;

#[derive(Debug)]
pub struct Engine {
    router: DatabaseRouter,
    admin_owner: String,
    audit: Arc<dyn AuditSink>,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Owner key of the admin fund deposits are drawn from.
    pub fn admin_owner(&self) -> &str {
        &self.admin_owner
    }

    pub fn router(&self) -> &DatabaseRouter {
        &self.router
    }

    /// Hand a record to the audit sink. Failures never reach the caller.
    fn emit(&self, record: AuditRecord) {
        if let Err(err) = self.audit.record(&record) {
            tracing::warn!(
                action = record.action,
                entity_id = %record.entity_id,
                "audit record dropped: {err}"
            );
        }
    }
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    router: Option<DatabaseRouter>,
    admin_owner: Option<String>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: sea_orm::DatabaseConnection) -> EngineBuilder {
        self.router = Some(DatabaseRouter::new(db));
        self
    }

    /// Pass a router, when a backup database is available.
    pub fn router(mut self, router: DatabaseRouter) -> EngineBuilder {
        self.router = Some(router);
        self
    }

    /// Owner key of the admin fund. Defaults to [`DEFAULT_ADMIN_OWNER`].
    pub fn admin_owner(mut self, owner: impl Into<String>) -> EngineBuilder {
        self.admin_owner = Some(owner.into());
        self
    }

    /// Where audit records go. Defaults to [`TracingAuditSink`].
    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> EngineBuilder {
        self.audit = Some(sink);
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        let router = self
            .router
            .ok_or_else(|| EngineError::KeyNotFound("database".to_string()))?;
        let admin_owner = match self.admin_owner {
            Some(owner) => normalize_required_name(&owner, "admin owner")?,
            None => DEFAULT_ADMIN_OWNER.to_string(),
        };
        Ok(Engine {
            router,
            admin_owner,
            audit: self
                .audit
                .unwrap_or_else(|| Arc::new(TracingAuditSink)),
        })
    }
}

#[cfg(test)]
mod tests {
    use migration::MigratorTrait;
    use sea_orm::{Database, DatabaseConnection};

    use super::*;

    async fn engine() -> Engine {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        migration::Migrator::up(&db, None).await.unwrap();
        Engine::builder().database(db).build().await.unwrap()
    }

    /// Used from a function that does not return a `Result`.
    async fn begins(engine: &Engine) -> bool {
        with_tx!(engine, |db_tx| {
            let _ = &db_tx;
            Ok(())
        })
        .is_ok()
    }

    #[tokio::test]
    async fn conflicts_are_retried_until_the_unit_succeeds() {
        let engine = engine().await;
        let mut attempts = 0;

        let result = with_tx!(engine, |db_tx| {
            let _ = &db_tx;
            attempts += 1;
            if attempts < MAX_TX_ATTEMPTS {
                Err(EngineError::Conflict("fund".to_string()))
            } else {
                Ok(attempts)
            }
        });

        assert_eq!(result, Ok(MAX_TX_ATTEMPTS));
    }

    #[tokio::test]
    async fn conflicts_surface_once_attempts_run_out() {
        let engine = engine().await;
        let mut attempts = 0;

        let result: ResultEngine<()> = with_tx!(engine, |db_tx| {
            let _ = &db_tx;
            attempts += 1;
            Err(EngineError::Conflict("fund".to_string()))
        });

        assert_eq!(result, Err(EngineError::Conflict("fund".to_string())));
        assert_eq!(attempts, MAX_TX_ATTEMPTS);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let engine = engine().await;
        let mut attempts = 0;

        let result: ResultEngine<()> = with_tx!(engine, |db_tx| {
            let _ = &db_tx;
            attempts += 1;
            Err(EngineError::InsufficientFunds("fund".to_string()))
        });

        assert!(matches!(result, Err(EngineError::InsufficientFunds(_))));
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn begin_failures_become_errors() {
        let engine = Engine::builder()
            .database(DatabaseConnection::default())
            .build()
            .await
            .unwrap();

        assert!(!begins(&engine).await);
        assert!(begins(&self::engine().await).await);
    }
}
