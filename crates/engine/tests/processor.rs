use std::sync::Arc;

use engine::{
    Actor, AdminTransactionCmd, DepositCmd, EngineError, TransactionKind, TransactionListFilter,
    UpdateTransactionCmd, WithdrawalCmd,
};

mod common;

use common::{
    FailingSink, RecordingSink, admin, admin_balance, admin_income, engine_with_db,
    engine_with_sink, funded_project, project_balance,
};

#[tokio::test]
async fn deposit_moves_money_from_admin_to_project() {
    let (engine, _db) = engine_with_db().await;
    let project_id = funded_project(&engine, 1_000_000, 200_000).await;

    assert_eq!(admin_balance(&engine).await, 800_000);
    assert_eq!(project_balance(&engine, project_id).await, 200_000);

    let filter = TransactionListFilter {
        project_id: Some(project_id),
        ..Default::default()
    };
    let txs = engine.list_transactions(&admin(), &filter).await.unwrap();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].kind, TransactionKind::Income);
    assert_eq!(txs[0].amount, 200_000);
    assert_eq!(txs[0].project_id, Some(project_id));
    assert_eq!(txs[0].expense_label, None);
}

#[tokio::test]
async fn withdrawal_beyond_balance_changes_nothing() {
    let (engine, _db) = engine_with_db().await;
    let project_id = funded_project(&engine, 1_000_000, 200_000).await;

    let err = engine
        .process_withdrawal(WithdrawalCmd::new(admin(), project_id, 250_000).expense_type("fuel"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientFunds(_)));

    assert_eq!(project_balance(&engine, project_id).await, 200_000);
    let expenses = TransactionListFilter {
        project_id: Some(project_id),
        kind: Some(TransactionKind::Expense),
        ..Default::default()
    };
    assert!(
        engine
            .list_transactions(&admin(), &expenses)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn deposit_then_withdraw_restores_project_balance() {
    let (engine, _db) = engine_with_db().await;
    let project_id = funded_project(&engine, 1_000_000, 0).await;

    engine
        .process_deposit(DepositCmd::new(admin(), project_id, 75_000))
        .await
        .unwrap();
    let tx = engine
        .process_withdrawal(WithdrawalCmd::new(admin(), project_id, 75_000))
        .await
        .unwrap();

    assert_eq!(project_balance(&engine, project_id).await, 0);
    assert_eq!(admin_balance(&engine).await, 925_000);
    assert_eq!(tx.expense_label, Some(engine::ExpenseLabel::General));
}

#[tokio::test]
async fn deposit_needs_an_admin_fund_that_covers_it() {
    let (engine, _db) = engine_with_db().await;
    let project = engine.create_project(&admin(), "Site A").await.unwrap();

    let err = engine
        .process_deposit(DepositCmd::new(admin(), project.id, 100))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::KeyNotFound("admin fund not exists".to_string())
    );

    admin_income(&engine, 50).await;
    let err = engine
        .process_deposit(DepositCmd::new(admin(), project.id, 100))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientFunds(_)));
    assert_eq!(admin_balance(&engine).await, 50);
    assert_eq!(project_balance(&engine, project.id).await, 0);
}

#[tokio::test]
async fn deposit_to_unknown_project_is_key_not_found() {
    let (engine, _db) = engine_with_db().await;
    admin_income(&engine, 1_000).await;

    let err = engine
        .process_deposit(DepositCmd::new(admin(), uuid::Uuid::new_v4(), 100))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::KeyNotFound("project not exists".to_string()));
}

#[tokio::test]
async fn withdrawal_from_project_without_fund_is_key_not_found() {
    let (engine, _db) = engine_with_db().await;
    let project_id = funded_project(&engine, 1_000, 0).await;

    let err = engine
        .process_withdrawal(WithdrawalCmd::new(admin(), project_id, 10))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::KeyNotFound("project fund not exists".to_string())
    );
}

#[tokio::test]
async fn members_need_project_access() {
    let (engine, _db) = engine_with_db().await;
    let project_id = funded_project(&engine, 1_000, 500).await;
    let bob = Actor::member("bob");

    let err = engine
        .process_withdrawal(WithdrawalCmd::new(bob.clone(), project_id, 100))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    engine
        .grant_project_access(&admin(), project_id, "bob")
        .await
        .unwrap();
    let tx = engine
        .process_withdrawal(WithdrawalCmd::new(bob.clone(), project_id, 100))
        .await
        .unwrap();
    assert_eq!(tx.created_by, "bob");
    assert_eq!(project_balance(&engine, project_id).await, 400);

    let funds = engine.list_funds(&bob).await.unwrap();
    assert_eq!(funds.len(), 1);
    assert_eq!(funds[0].project_id, Some(project_id));
}

#[tokio::test]
async fn admin_transactions_require_the_admin_role() {
    let (engine, _db) = engine_with_db().await;

    let err = engine
        .process_admin_transaction(AdminTransactionCmd::new(
            Actor::member("bob"),
            TransactionKind::Income,
            100,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));
}

#[tokio::test]
async fn admin_income_creates_the_admin_fund_lazily() {
    let (engine, _db) = engine_with_db().await;

    admin_income(&engine, 500).await;
    let fund = engine.admin_fund(&admin()).await.unwrap();
    assert_eq!(fund.balance, 500);
    assert_eq!(fund.owner_id.as_deref(), Some(common::ADMIN_OWNER));

    let err = engine
        .process_admin_transaction(AdminTransactionCmd::new(
            admin(),
            TransactionKind::Expense,
            501,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientFunds(_)));
    assert_eq!(admin_balance(&engine).await, 500);
}

#[tokio::test]
async fn bootstrap_twice_is_rejected() {
    let (engine, _db) = engine_with_db().await;
    engine.bootstrap_admin_fund(&admin(), 10).await.unwrap();

    let err = engine.bootstrap_admin_fund(&admin(), 10).await.unwrap_err();
    assert!(matches!(err, EngineError::ExistingKey(_)));
    assert_eq!(admin_balance(&engine).await, 10);
}

#[tokio::test]
async fn non_positive_amounts_are_invalid() {
    let (engine, _db) = engine_with_db().await;
    let project_id = funded_project(&engine, 1_000, 500).await;

    let err = engine
        .process_withdrawal(WithdrawalCmd::new(admin(), project_id, 0))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::InvalidAmount("amount must be > 0".to_string()));

    let err = engine
        .process_deposit(DepositCmd::new(admin(), project_id, -5))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidAmount(_)));
    assert_eq!(project_balance(&engine, project_id).await, 500);
}

#[tokio::test]
async fn fund_total_only_moves_with_money_entering_or_leaving() {
    let (engine, _db) = engine_with_db().await;
    let project_id = funded_project(&engine, 10_000, 0).await;
    let other = engine.create_project(&admin(), "Site B").await.unwrap();

    engine
        .process_deposit(DepositCmd::new(admin(), project_id, 3_000))
        .await
        .unwrap();
    engine
        .process_deposit(DepositCmd::new(admin(), other.id, 2_000))
        .await
        .unwrap();
    let total = |funds: Vec<engine::Fund>| funds.iter().map(|f| f.balance).sum::<i64>();
    assert_eq!(total(engine.list_funds(&admin()).await.unwrap()), 10_000);

    engine
        .process_withdrawal(WithdrawalCmd::new(admin(), project_id, 1_000))
        .await
        .unwrap();
    admin_income(&engine, 400).await;
    let _ = engine
        .process_withdrawal(WithdrawalCmd::new(admin(), other.id, 5_000))
        .await
        .unwrap_err();

    let funds = engine.list_funds(&admin()).await.unwrap();
    assert!(funds.iter().all(|f| f.balance >= 0));
    assert_eq!(total(funds), 10_000 - 1_000 + 400);
}

#[tokio::test]
async fn deleting_a_deposit_restores_both_funds() {
    let (engine, _db) = engine_with_db().await;
    let project_id = funded_project(&engine, 1_000_000, 0).await;
    let deposit = engine
        .process_deposit(DepositCmd::new(admin(), project_id, 200_000))
        .await
        .unwrap();

    engine.delete_transaction(&admin(), deposit.id).await.unwrap();

    assert_eq!(admin_balance(&engine).await, 1_000_000);
    assert_eq!(project_balance(&engine, project_id).await, 0);
    let err = engine.transaction(&admin(), deposit.id).await.unwrap_err();
    assert_eq!(
        err,
        EngineError::KeyNotFound("transaction not exists".to_string())
    );
}

#[tokio::test]
async fn deleting_a_spent_deposit_is_refused() {
    let (engine, _db) = engine_with_db().await;
    let project_id = funded_project(&engine, 1_000_000, 0).await;
    let deposit = engine
        .process_deposit(DepositCmd::new(admin(), project_id, 200_000))
        .await
        .unwrap();
    engine
        .process_withdrawal(WithdrawalCmd::new(admin(), project_id, 150_000))
        .await
        .unwrap();

    let err = engine
        .delete_transaction(&admin(), deposit.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientFunds(_)));
    assert_eq!(project_balance(&engine, project_id).await, 50_000);
    assert_eq!(admin_balance(&engine).await, 800_000);
    assert!(engine.transaction(&admin(), deposit.id).await.is_ok());
}

#[tokio::test]
async fn deleting_a_withdrawal_gives_the_money_back() {
    let (engine, _db) = engine_with_db().await;
    let project_id = funded_project(&engine, 1_000, 600).await;
    let tx = engine
        .process_withdrawal(WithdrawalCmd::new(admin(), project_id, 250))
        .await
        .unwrap();

    engine.delete_transaction(&admin(), tx.id).await.unwrap();
    assert_eq!(project_balance(&engine, project_id).await, 600);
}

#[tokio::test]
async fn members_cannot_delete_admin_fund_transactions() {
    let (engine, _db) = engine_with_db().await;
    admin_income(&engine, 1_000).await;
    let filter = TransactionListFilter {
        admin_only: true,
        ..Default::default()
    };
    let income = engine.list_transactions(&admin(), &filter).await.unwrap();
    assert_eq!(income.len(), 1);

    let err = engine
        .delete_transaction(&Actor::member("bob"), income[0].id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));
    assert_eq!(admin_balance(&engine).await, 1_000);
}

#[tokio::test]
async fn editing_the_amount_moves_funds_by_the_difference() {
    let (engine, _db) = engine_with_db().await;
    let project_id = funded_project(&engine, 1_000, 500).await;
    let tx = engine
        .process_withdrawal(WithdrawalCmd::new(admin(), project_id, 100))
        .await
        .unwrap();

    let updated = engine
        .update_transaction(
            UpdateTransactionCmd::new(admin(), tx.id)
                .amount(60)
                .description("  cement  "),
        )
        .await
        .unwrap();
    assert_eq!(updated.amount, 60);
    assert_eq!(updated.description.as_deref(), Some("cement"));
    assert_eq!(project_balance(&engine, project_id).await, 440);

    let err = engine
        .update_transaction(UpdateTransactionCmd::new(admin(), tx.id).amount(1_000))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientFunds(_)));
    assert_eq!(engine.transaction(&admin(), tx.id).await.unwrap().amount, 60);
}

#[tokio::test]
async fn archived_transactions_are_hidden_by_default() {
    let (engine, _db) = engine_with_db().await;
    let project_id = funded_project(&engine, 1_000, 500).await;
    let tx = engine
        .process_withdrawal(WithdrawalCmd::new(admin(), project_id, 100))
        .await
        .unwrap();

    engine
        .set_transaction_archived(&admin(), tx.id, true)
        .await
        .unwrap();

    let mut filter = TransactionListFilter {
        project_id: Some(project_id),
        kind: Some(TransactionKind::Expense),
        ..Default::default()
    };
    assert!(engine.list_transactions(&admin(), &filter).await.unwrap().is_empty());
    filter.include_archived = true;
    assert_eq!(engine.list_transactions(&admin(), &filter).await.unwrap().len(), 1);
    assert_eq!(project_balance(&engine, project_id).await, 400);
}

#[tokio::test]
async fn successful_operations_are_audited_after_commit() {
    let sink = Arc::new(RecordingSink::default());
    let engine = engine_with_sink(sink.clone()).await;
    let project_id = funded_project(&engine, 1_000, 300).await;

    let _ = engine
        .process_withdrawal(WithdrawalCmd::new(admin(), project_id, 10_000))
        .await
        .unwrap_err();

    assert_eq!(sink.actions(), vec!["bootstrap", "create", "deposit"]);
    let deposit = &sink.records()[2];
    assert_eq!(deposit.actor, "root");
    assert_eq!(deposit.entity_type, "transaction");
    assert_eq!(deposit.detail["amount"], 300);
}

#[tokio::test]
async fn failing_audit_sink_does_not_fail_the_operation() {
    let engine = engine_with_sink(Arc::new(FailingSink)).await;
    let project_id = funded_project(&engine, 1_000, 300).await;

    assert_eq!(project_balance(&engine, project_id).await, 300);
}
