//! Initial schema.
//!
//! - `projects` / `project_members`: projects and who may act on them
//! - `funds`: the admin fund and one fund per project
//! - `expense_types`: the buckets expenses are classified into
//! - `deferred_payments`: obligations settled in installments
//! - `transactions`: every money movement
//! - `ledger_entries`: classification of transactions and transferred
//!   deferred payments

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// ─────────────────────────────────────────────────────────────────────────────
// Table identifiers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Iden)]
enum Projects {
    Table,
    Id,
    Name,
    NameNorm,
    CreatedAt,
}

#[derive(Iden)]
enum ProjectMembers {
    Table,
    ProjectId,
    UserId,
}

#[derive(Iden)]
enum Funds {
    Table,
    Id,
    Name,
    Balance,
    Kind,
    OwnerId,
    ProjectId,
    Version,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum ExpenseTypes {
    Table,
    Id,
    Name,
    NameNorm,
    Description,
    IsActive,
    IsSystem,
    CreatedAt,
}

#[derive(Iden)]
enum DeferredPayments {
    Table,
    Id,
    BeneficiaryName,
    TotalAmount,
    PaidAmount,
    Status,
    ProjectId,
    DueDate,
    Description,
    Version,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Transactions {
    Table,
    Id,
    OccurredAt,
    Amount,
    Kind,
    ExpenseType,
    Description,
    ProjectId,
    CreatedBy,
    FileUrl,
    FileType,
    Archived,
    DeferredPaymentId,
    CreatedAt,
}

#[derive(Iden)]
enum LedgerEntries {
    Table,
    Id,
    EntryDate,
    TransactionId,
    DeferredPaymentId,
    ExpenseTypeId,
    Amount,
    Description,
    ProjectId,
    EntryKind,
    CreatedAt,
    UpdatedAt,
}

// ─────────────────────────────────────────────────────────────────────────────
// Migration implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ───────────────────────────────────────────────────────────────────
        // 1. Projects
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Projects::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Projects::Id).blob().not_null().primary_key())
                    .col(ColumnDef::new(Projects::Name).string().not_null())
                    .col(ColumnDef::new(Projects::NameNorm).string().not_null())
                    .col(ColumnDef::new(Projects::CreatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-projects-name_norm-unique")
                    .table(Projects::Table)
                    .col(Projects::NameNorm)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ProjectMembers::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(ProjectMembers::ProjectId).blob().not_null())
                    .col(ColumnDef::new(ProjectMembers::UserId).string().not_null())
                    .primary_key(
                        Index::create()
                            .col(ProjectMembers::ProjectId)
                            .col(ProjectMembers::UserId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-project_members-project_id")
                            .from(ProjectMembers::Table, ProjectMembers::ProjectId)
                            .to(Projects::Table, Projects::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-project_members-user_id")
                    .table(ProjectMembers::Table)
                    .col(ProjectMembers::UserId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 2. Funds
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Funds::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Funds::Id).blob().not_null().primary_key())
                    .col(ColumnDef::new(Funds::Name).string().not_null())
                    .col(
                        ColumnDef::new(Funds::Balance)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Funds::Kind).string().not_null())
                    .col(ColumnDef::new(Funds::OwnerId).string())
                    .col(ColumnDef::new(Funds::ProjectId).blob())
                    .col(
                        ColumnDef::new(Funds::Version)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Funds::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Funds::UpdatedAt).timestamp().not_null())
                    .check(Expr::col(Funds::Balance).gte(0))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-funds-project_id")
                            .from(Funds::Table, Funds::ProjectId)
                            .to(Projects::Table, Projects::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-funds-owner_id-unique")
                    .table(Funds::Table)
                    .col(Funds::OwnerId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-funds-project_id-unique")
                    .table(Funds::Table)
                    .col(Funds::ProjectId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 3. Expense types
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(ExpenseTypes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ExpenseTypes::Id)
                            .blob()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ExpenseTypes::Name).string().not_null())
                    .col(ColumnDef::new(ExpenseTypes::NameNorm).string().not_null())
                    .col(ColumnDef::new(ExpenseTypes::Description).string())
                    .col(
                        ColumnDef::new(ExpenseTypes::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(ExpenseTypes::IsSystem)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(ExpenseTypes::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-expense_types-name_norm-unique")
                    .table(ExpenseTypes::Table)
                    .col(ExpenseTypes::NameNorm)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 4. Deferred payments
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(DeferredPayments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeferredPayments::Id)
                            .blob()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DeferredPayments::BeneficiaryName)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeferredPayments::TotalAmount)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeferredPayments::PaidAmount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(DeferredPayments::Status).string().not_null())
                    .col(ColumnDef::new(DeferredPayments::ProjectId).blob())
                    .col(ColumnDef::new(DeferredPayments::DueDate).date())
                    .col(ColumnDef::new(DeferredPayments::Description).string())
                    .col(
                        ColumnDef::new(DeferredPayments::Version)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(DeferredPayments::CreatedBy)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeferredPayments::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeferredPayments::UpdatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .check(
                        Expr::col(DeferredPayments::PaidAmount)
                            .gte(0)
                            .and(
                                Expr::col(DeferredPayments::PaidAmount)
                                    .lte(Expr::col(DeferredPayments::TotalAmount)),
                            ),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-deferred_payments-project_id")
                            .from(DeferredPayments::Table, DeferredPayments::ProjectId)
                            .to(Projects::Table, Projects::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-deferred_payments-project_id-status")
                    .table(DeferredPayments::Table)
                    .col(DeferredPayments::ProjectId)
                    .col(DeferredPayments::Status)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 5. Transactions
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transactions::Id)
                            .blob()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Transactions::OccurredAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transactions::Amount).big_integer().not_null())
                    .col(ColumnDef::new(Transactions::Kind).string().not_null())
                    .col(ColumnDef::new(Transactions::ExpenseType).string())
                    .col(ColumnDef::new(Transactions::Description).string())
                    .col(ColumnDef::new(Transactions::ProjectId).blob())
                    .col(ColumnDef::new(Transactions::CreatedBy).string().not_null())
                    .col(ColumnDef::new(Transactions::FileUrl).string())
                    .col(ColumnDef::new(Transactions::FileType).string())
                    .col(
                        ColumnDef::new(Transactions::Archived)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Transactions::DeferredPaymentId).blob())
                    .col(
                        ColumnDef::new(Transactions::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .check(Expr::col(Transactions::Amount).gt(0))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-transactions-project_id")
                            .from(Transactions::Table, Transactions::ProjectId)
                            .to(Projects::Table, Projects::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-transactions-deferred_payment_id")
                            .from(Transactions::Table, Transactions::DeferredPaymentId)
                            .to(DeferredPayments::Table, DeferredPayments::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-project_id-occurred_at")
                    .table(Transactions::Table)
                    .col(Transactions::ProjectId)
                    .col(Transactions::OccurredAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-deferred_payment_id")
                    .table(Transactions::Table)
                    .col(Transactions::DeferredPaymentId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 6. Ledger entries
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(LedgerEntries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LedgerEntries::Id)
                            .blob()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(LedgerEntries::EntryDate)
                            .timestamp()
                            .not_null(),
                    )
                    .col(ColumnDef::new(LedgerEntries::TransactionId).blob())
                    .col(ColumnDef::new(LedgerEntries::DeferredPaymentId).blob())
                    .col(ColumnDef::new(LedgerEntries::ExpenseTypeId).blob())
                    .col(
                        ColumnDef::new(LedgerEntries::Amount)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(LedgerEntries::Description).string())
                    .col(ColumnDef::new(LedgerEntries::ProjectId).blob())
                    .col(ColumnDef::new(LedgerEntries::EntryKind).string().not_null())
                    .col(
                        ColumnDef::new(LedgerEntries::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(LedgerEntries::UpdatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-ledger_entries-transaction_id")
                            .from(LedgerEntries::Table, LedgerEntries::TransactionId)
                            .to(Transactions::Table, Transactions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-ledger_entries-deferred_payment_id")
                            .from(LedgerEntries::Table, LedgerEntries::DeferredPaymentId)
                            .to(DeferredPayments::Table, DeferredPayments::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-ledger_entries-expense_type_id")
                            .from(LedgerEntries::Table, LedgerEntries::ExpenseTypeId)
                            .to(ExpenseTypes::Table, ExpenseTypes::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // At most one entry per transaction and per deferred payment. NULLs
        // do not collide in a unique index.
        manager
            .create_index(
                Index::create()
                    .name("idx-ledger_entries-transaction_id-unique")
                    .table(LedgerEntries::Table)
                    .col(LedgerEntries::TransactionId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-ledger_entries-deferred_payment_id-unique")
                    .table(LedgerEntries::Table)
                    .col(LedgerEntries::DeferredPaymentId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-ledger_entries-expense_type_id")
                    .table(LedgerEntries::Table)
                    .col(LedgerEntries::ExpenseTypeId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(LedgerEntries::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Transactions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DeferredPayments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ExpenseTypes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Funds::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProjectMembers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Projects::Table).to_owned())
            .await?;
        Ok(())
    }
}
