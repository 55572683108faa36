#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use sea_orm::{Database, DatabaseConnection};

use engine::{
    Actor, AdminTransactionCmd, AuditError, AuditRecord, AuditSink, DepositCmd, Engine, Fund,
    TransactionKind,
};
use migration::MigratorTrait;
use uuid::Uuid;

pub const ADMIN_OWNER: &str = "treasury";

pub fn admin() -> Actor {
    Actor::admin("root")
}

pub async fn database() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    db
}

pub async fn engine_with_db() -> (Engine, DatabaseConnection) {
    let db = database().await;
    let engine = Engine::builder()
        .database(db.clone())
        .admin_owner(ADMIN_OWNER)
        .build()
        .await
        .unwrap();
    (engine, db)
}

pub async fn engine_with_sink(sink: Arc<dyn AuditSink>) -> Engine {
    Engine::builder()
        .database(database().await)
        .admin_owner(ADMIN_OWNER)
        .audit_sink(sink)
        .build()
        .await
        .unwrap()
}

/// Admin fund with `admin_balance`, one project and `deposit` moved into it.
pub async fn funded_project(engine: &Engine, admin_balance: i64, deposit: i64) -> Uuid {
    engine
        .bootstrap_admin_fund(&admin(), admin_balance)
        .await
        .unwrap();
    let project = engine.create_project(&admin(), "Site A").await.unwrap();
    if deposit > 0 {
        engine
            .process_deposit(DepositCmd::new(admin(), project.id, deposit))
            .await
            .unwrap();
    }
    project.id
}

pub async fn admin_balance(engine: &Engine) -> i64 {
    engine.admin_fund(&admin()).await.unwrap().balance
}

pub async fn project_balance(engine: &Engine, project_id: Uuid) -> i64 {
    engine
        .fund_by_project(&admin(), project_id)
        .await
        .unwrap()
        .map_or(0, |fund: Fund| fund.balance)
}

pub async fn admin_income(engine: &Engine, amount: i64) {
    engine
        .process_admin_transaction(AdminTransactionCmd::new(
            admin(),
            TransactionKind::Income,
            amount,
        ))
        .await
        .unwrap();
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl RecordingSink {
    pub fn actions(&self) -> Vec<&'static str> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|record| record.action)
            .collect()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl AuditSink for RecordingSink {
    fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FailingSink;

impl AuditSink for FailingSink {
    fn record(&self, _record: &AuditRecord) -> Result<(), AuditError> {
        Err(AuditError("sink offline".to_string()))
    }
}
