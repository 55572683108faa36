use engine::{
    Actor, ClassifyOutcome, EngineError, EntryKind, EntrySource, ExpenseTypePatch, LedgerFilter,
    ReclassifyScope, SkipReason, UpdateTransactionCmd, WithdrawalCmd,
};

mod common;

use common::{admin, engine_with_db, funded_project, project_balance};

#[tokio::test]
async fn named_withdrawal_is_classified_after_commit() {
    let (engine, _db) = engine_with_db().await;
    let fuel = engine
        .create_expense_type(&admin(), "Fuel", Some("diesel and petrol"))
        .await
        .unwrap();
    let project_id = funded_project(&engine, 1_000, 500).await;

    let tx = engine
        .process_withdrawal(
            WithdrawalCmd::new(admin(), project_id, 120)
                .expense_type("  FUEL ")
                .description("generator"),
        )
        .await
        .unwrap();

    let entry = engine
        .ledger_entry_for_transaction(&admin(), tx.id)
        .await
        .unwrap()
        .expect("withdrawal should be classified");
    assert_eq!(entry.expense_type_id, Some(fuel.id));
    assert_eq!(entry.amount, 120);
    assert_eq!(entry.kind, EntryKind::Classified);
    assert_eq!(entry.project_id, Some(project_id));
    assert_eq!(entry.description.as_deref(), Some("generator"));
    assert_eq!(
        entry.source,
        EntrySource::Transaction {
            transaction_id: tx.id
        }
    );
}

#[tokio::test]
async fn classifying_again_keeps_a_single_entry() {
    let (engine, _db) = engine_with_db().await;
    engine.create_expense_type(&admin(), "Fuel", None).await.unwrap();
    let project_id = funded_project(&engine, 1_000, 500).await;
    let tx = engine
        .process_withdrawal(WithdrawalCmd::new(admin(), project_id, 100).expense_type("fuel"))
        .await
        .unwrap();
    let first = engine
        .ledger_entry_for_transaction(&admin(), tx.id)
        .await
        .unwrap()
        .unwrap();

    let outcome = engine
        .classify_transaction(&admin(), tx.id, false)
        .await
        .unwrap();
    assert!(matches!(&outcome, ClassifyOutcome::Unchanged(entry) if entry.id == first.id));

    let outcome = engine
        .classify_transaction(&admin(), tx.id, true)
        .await
        .unwrap();
    assert!(matches!(&outcome, ClassifyOutcome::Updated(entry) if entry.id == first.id));

    let entries = engine
        .ledger_entries(&admin(), &LedgerFilter::default())
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn unknown_expense_type_is_skipped_or_fails_when_forced() {
    let (engine, _db) = engine_with_db().await;
    let project_id = funded_project(&engine, 1_000, 500).await;
    let tx = engine
        .process_withdrawal(WithdrawalCmd::new(admin(), project_id, 100).expense_type("Lunch"))
        .await
        .unwrap();

    assert_eq!(project_balance(&engine, project_id).await, 400);
    assert_eq!(
        engine.ledger_entry_for_transaction(&admin(), tx.id).await.unwrap(),
        None
    );

    let outcome = engine
        .classify_transaction(&admin(), tx.id, false)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ClassifyOutcome::Skipped(SkipReason::UnknownExpenseType("Lunch".to_string()))
    );

    let err = engine
        .classify_transaction(&admin(), tx.id, true)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ClassificationFailed(_)));
}

#[tokio::test]
async fn general_expenses_are_only_classified_when_forced() {
    let (engine, _db) = engine_with_db().await;
    let project_id = funded_project(&engine, 1_000, 500).await;
    let tx = engine
        .process_withdrawal(WithdrawalCmd::new(admin(), project_id, 100))
        .await
        .unwrap();

    let outcome = engine
        .classify_transaction(&admin(), tx.id, false)
        .await
        .unwrap();
    assert_eq!(outcome, ClassifyOutcome::Skipped(SkipReason::GeneralExpense));

    let outcome = engine
        .classify_transaction(&admin(), tx.id, true)
        .await
        .unwrap();
    let ClassifyOutcome::Created(entry) = outcome else {
        panic!("expected a new entry, got {outcome:?}");
    };
    assert_eq!(entry.kind, EntryKind::GeneralExpense);
    assert_eq!(entry.expense_type_id, None);
}

#[tokio::test]
async fn deposits_are_never_classified() {
    let (engine, _db) = engine_with_db().await;
    let project_id = funded_project(&engine, 1_000, 0).await;
    let deposit = engine
        .process_deposit(engine::DepositCmd::new(admin(), project_id, 100))
        .await
        .unwrap();

    let outcome = engine
        .classify_transaction(&admin(), deposit.id, true)
        .await
        .unwrap();
    assert_eq!(outcome, ClassifyOutcome::Skipped(SkipReason::Income));
}

#[tokio::test]
async fn classification_requires_the_admin_role() {
    let (engine, _db) = engine_with_db().await;
    let project_id = funded_project(&engine, 1_000, 500).await;
    let tx = engine
        .process_withdrawal(WithdrawalCmd::new(admin(), project_id, 100))
        .await
        .unwrap();

    let err = engine
        .classify_transaction(&Actor::member("bob"), tx.id, true)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));
}

#[tokio::test]
async fn inactive_expense_types_do_not_resolve() {
    let (engine, _db) = engine_with_db().await;
    let fuel = engine.create_expense_type(&admin(), "Fuel", None).await.unwrap();
    engine
        .update_expense_type(
            &admin(),
            fuel.id,
            ExpenseTypePatch {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let project_id = funded_project(&engine, 1_000, 500).await;

    let tx = engine
        .process_withdrawal(WithdrawalCmd::new(admin(), project_id, 100).expense_type("Fuel"))
        .await
        .unwrap();

    assert_eq!(
        engine.ledger_entry_for_transaction(&admin(), tx.id).await.unwrap(),
        None
    );
    let found = engine.expense_type_by_name("fuel").await.unwrap().unwrap();
    assert!(!found.is_active);
    assert!(engine.list_expense_types(false).await.unwrap().is_empty());
    assert_eq!(engine.list_expense_types(true).await.unwrap().len(), 1);
}

#[tokio::test]
async fn expense_type_names_are_unique_ignoring_case() {
    let (engine, _db) = engine_with_db().await;
    engine.create_expense_type(&admin(), "Fuel", None).await.unwrap();

    let err = engine
        .create_expense_type(&admin(), "  fuel ", None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ExistingKey(_)));

    let err = engine
        .create_expense_type(&Actor::member("bob"), "Cement", None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));
}

#[tokio::test]
async fn referenced_expense_types_cannot_be_deleted() {
    let (engine, _db) = engine_with_db().await;
    let fuel = engine.create_expense_type(&admin(), "Fuel", None).await.unwrap();
    let spare = engine.create_expense_type(&admin(), "Spare", None).await.unwrap();
    let project_id = funded_project(&engine, 1_000, 500).await;
    engine
        .process_withdrawal(WithdrawalCmd::new(admin(), project_id, 100).expense_type("Fuel"))
        .await
        .unwrap();

    let err = engine
        .delete_expense_type(&admin(), fuel.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ReferencedEntity(_)));

    engine.delete_expense_type(&admin(), spare.id).await.unwrap();
    assert_eq!(engine.expense_type_by_name("Spare").await.unwrap(), None);
}

#[tokio::test]
async fn reclassifying_twice_creates_nothing_new() {
    let (engine, _db) = engine_with_db().await;
    engine.create_expense_type(&admin(), "Fuel", None).await.unwrap();
    let project_id = funded_project(&engine, 10_000, 5_000).await;

    engine
        .process_withdrawal(WithdrawalCmd::new(admin(), project_id, 100).expense_type("Fuel"))
        .await
        .unwrap();
    engine
        .process_withdrawal(WithdrawalCmd::new(admin(), project_id, 300).expense_type("Cement"))
        .await
        .unwrap();
    engine
        .process_withdrawal(WithdrawalCmd::new(admin(), project_id, 50))
        .await
        .unwrap();
    engine.create_expense_type(&admin(), "Cement", None).await.unwrap();

    let scope = ReclassifyScope::default();
    let first = engine
        .reclassify_transactions(&admin(), &scope)
        .await
        .unwrap();
    assert_eq!(
        (first.created, first.updated, first.unchanged, first.skipped),
        (1, 0, 1, 1)
    );
    assert!(first.failures.is_empty());

    let second = engine
        .reclassify_transactions(&admin(), &scope)
        .await
        .unwrap();
    assert_eq!(
        (second.created, second.updated, second.unchanged, second.skipped),
        (0, 0, 2, 1)
    );

    let totals = engine.ledger_totals(&admin(), Some(project_id)).await.unwrap();
    let named: Vec<(Option<&str>, u64, i64)> = totals
        .iter()
        .map(|t| (t.expense_type_name.as_deref(), t.entries, t.total))
        .collect();
    assert_eq!(named, vec![(Some("Cement"), 1, 300), (Some("Fuel"), 1, 100)]);
}

#[tokio::test]
async fn forced_reclassification_reports_failures_and_general_bucket() {
    let (engine, _db) = engine_with_db().await;
    engine.create_expense_type(&admin(), "Fuel", None).await.unwrap();
    let project_id = funded_project(&engine, 10_000, 5_000).await;

    engine
        .process_withdrawal(WithdrawalCmd::new(admin(), project_id, 100).expense_type("Fuel"))
        .await
        .unwrap();
    let unknown = engine
        .process_withdrawal(WithdrawalCmd::new(admin(), project_id, 70).expense_type("Lunch"))
        .await
        .unwrap();
    engine
        .process_withdrawal(WithdrawalCmd::new(admin(), project_id, 50))
        .await
        .unwrap();

    let report = engine
        .reclassify_transactions(
            &admin(),
            &ReclassifyScope {
                project_id: Some(project_id),
                force: true,
                include_archived: false,
            },
        )
        .await
        .unwrap();
    assert_eq!((report.created, report.updated), (1, 1));
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].transaction_id, unknown.id);

    let totals = engine.ledger_totals(&admin(), None).await.unwrap();
    assert_eq!(totals.len(), 2);
    assert_eq!(totals[0].expense_type_name.as_deref(), Some("Fuel"));
    assert_eq!(totals[1].expense_type_id, None);
    assert_eq!(totals[1].total, 50);
}

#[tokio::test]
async fn editing_a_transaction_refreshes_its_entry() {
    let (engine, _db) = engine_with_db().await;
    engine.create_expense_type(&admin(), "Fuel", None).await.unwrap();
    let project_id = funded_project(&engine, 1_000, 500).await;
    let tx = engine
        .process_withdrawal(WithdrawalCmd::new(admin(), project_id, 100).expense_type("Fuel"))
        .await
        .unwrap();
    let before = engine
        .ledger_entry_for_transaction(&admin(), tx.id)
        .await
        .unwrap()
        .unwrap();

    engine
        .update_transaction(UpdateTransactionCmd::new(admin(), tx.id).amount(180))
        .await
        .unwrap();

    let after = engine
        .ledger_entry_for_transaction(&admin(), tx.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.id, before.id);
    assert_eq!(after.amount, 180);
}

#[tokio::test]
async fn deleting_a_transaction_removes_its_entry() {
    let (engine, _db) = engine_with_db().await;
    engine.create_expense_type(&admin(), "Fuel", None).await.unwrap();
    let project_id = funded_project(&engine, 1_000, 500).await;
    let tx = engine
        .process_withdrawal(WithdrawalCmd::new(admin(), project_id, 100).expense_type("Fuel"))
        .await
        .unwrap();

    engine.delete_transaction(&admin(), tx.id).await.unwrap();

    let entries = engine
        .ledger_entries(&admin(), &LedgerFilter::default())
        .await
        .unwrap();
    assert!(entries.is_empty());
}

#[tokio::test]
async fn members_only_read_the_ledger_of_their_projects() {
    let (engine, _db) = engine_with_db().await;
    let project_id = funded_project(&engine, 1_000, 500).await;
    let bob = Actor::member("bob");

    let err = engine
        .ledger_entries(&bob, &LedgerFilter::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    engine
        .grant_project_access(&admin(), project_id, "bob")
        .await
        .unwrap();
    let filter = LedgerFilter {
        project_id: Some(project_id),
        ..Default::default()
    };
    assert!(engine.ledger_entries(&bob, &filter).await.unwrap().is_empty());
}

#[tokio::test]
async fn general_expense_name_is_the_general_bucket() {
    let (engine, _db) = engine_with_db().await;
    let project_id = funded_project(&engine, 1_000, 500).await;

    let tx = engine
        .process_withdrawal(
            WithdrawalCmd::new(admin(), project_id, 100).expense_type("General Expense"),
        )
        .await
        .unwrap();
    assert_eq!(tx.expense_label, Some(engine::ExpenseLabel::General));

    let outcome = engine
        .classify_transaction(&admin(), tx.id, true)
        .await
        .unwrap();
    let ClassifyOutcome::Created(entry) = outcome else {
        panic!("expected a new entry, got {outcome:?}");
    };
    assert_eq!(entry.kind, EntryKind::GeneralExpense);
    assert_eq!(entry.expense_type_id, None);
}

#[tokio::test]
async fn general_expense_name_cannot_become_an_expense_type() {
    let (engine, _db) = engine_with_db().await;

    let err = engine
        .create_expense_type(&admin(), "General Expense", None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidName(_)));

    let fuel = engine.create_expense_type(&admin(), "Fuel", None).await.unwrap();
    let err = engine
        .update_expense_type(
            &admin(),
            fuel.id,
            ExpenseTypePatch {
                name: Some("general  expense".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidName(_)));
    assert!(engine.expense_type_by_name("Fuel").await.unwrap().is_some());
}
