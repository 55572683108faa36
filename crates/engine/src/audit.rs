//! Activity audit.
//!
//! The engine emits one [`AuditRecord`] per successful mutating operation,
//! after the database transaction committed. Sinks are best effort: a failing
//! sink is logged and the operation still succeeds.

use std::fmt::Debug;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AuditRecord {
    pub actor: String,
    pub action: &'static str,
    pub entity_type: &'static str,
    pub entity_id: Uuid,
    /// Human readable detail, kept as JSON so sinks can index it.
    pub detail: serde_json::Value,
    pub at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        actor: &str,
        action: &'static str,
        entity_type: &'static str,
        entity_id: Uuid,
        detail: serde_json::Value,
    ) -> Self {
        Self {
            actor: actor.to_string(),
            action,
            entity_type,
            entity_id,
            detail,
            at: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
#[error("audit sink failed: {0}")]
pub struct AuditError(pub String);

pub trait AuditSink: Debug + Send + Sync {
    fn record(&self, record: &AuditRecord) -> Result<(), AuditError>;
}

/// Writes audit records as structured `tracing` events on the `audit` target.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        tracing::info!(
            target: "audit",
            actor = %record.actor,
            action = record.action,
            entity_type = record.entity_type,
            entity_id = %record.entity_id,
            detail = %record.detail,
            "activity"
        );
        Ok(())
    }
}
