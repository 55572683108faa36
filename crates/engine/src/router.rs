//! Database routing.
//!
//! The engine talks to the database through a [`DatabaseRouter`]: a primary
//! connection and an optional backup. When the primary cannot hand out a
//! connection, the router flips to the backup and stays there until
//! [`DatabaseRouter::restore_primary`] is called. The flag lives in the
//! router value (and its clones), never in process-wide state.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use sea_orm::{DatabaseConnection, DatabaseTransaction, DbErr, TransactionTrait};

#[derive(Clone, Debug)]
pub struct DatabaseRouter {
    primary: DatabaseConnection,
    backup: Option<DatabaseConnection>,
    backup_active: Arc<AtomicBool>,
}

impl DatabaseRouter {
    pub fn new(primary: DatabaseConnection) -> Self {
        Self {
            primary,
            backup: None,
            backup_active: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn with_backup(mut self, backup: DatabaseConnection) -> Self {
        self.backup = Some(backup);
        self
    }

    pub fn is_backup_active(&self) -> bool {
        self.backup.is_some() && self.backup_active.load(Ordering::Acquire)
    }

    /// The connection reads and writes currently go to.
    pub fn connection(&self) -> &DatabaseConnection {
        match &self.backup {
            Some(backup) if self.backup_active.load(Ordering::Acquire) => backup,
            _ => &self.primary,
        }
    }

    /// Route back to the primary connection.
    pub fn restore_primary(&self) {
        if self.backup_active.swap(false, Ordering::AcqRel) {
            tracing::info!("database router restored primary connection");
        }
    }

    /// Begin a transaction on the active connection, failing over to the
    /// backup once if the primary is unreachable.
    pub async fn begin(&self) -> Result<DatabaseTransaction, DbErr> {
        match self.connection().begin().await {
            Ok(tx) => Ok(tx),
            Err(err) if is_connection_error(&err) && self.switch_to_backup() => {
                tracing::warn!("primary database unavailable, switching to backup: {err}");
                self.connection().begin().await
            }
            Err(err) => Err(err),
        }
    }

    /// Returns `true` only for the call that actually performed the switch.
    fn switch_to_backup(&self) -> bool {
        self.backup.is_some() && !self.backup_active.swap(true, Ordering::AcqRel)
    }
}

impl From<DatabaseConnection> for DatabaseRouter {
    fn from(value: DatabaseConnection) -> Self {
        Self::new(value)
    }
}

fn is_connection_error(err: &DbErr) -> bool {
    matches!(err, DbErr::Conn(_) | DbErr::ConnectionAcquire(_))
}
