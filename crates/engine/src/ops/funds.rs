use chrono::Utc;
use sea_orm::{DatabaseTransaction, QueryFilter, QueryOrder, prelude::*, sea_query::Expr};
use serde_json::json;
use uuid::Uuid;

use crate::{
    Actor, AuditRecord, EngineError, Fund, ResultEngine, Transaction, TransactionKind, funds,
    project_members, transactions::NewTransaction,
};

use super::{Engine, with_tx};

impl Engine {
    /// Return a fund by id.
    ///
    /// Project funds are visible to the project members, the admin fund only
    /// to admins.
    pub async fn fund(&self, actor: &Actor, fund_id: Uuid) -> ResultEngine<Fund> {
        with_tx!(self, |db_tx| {
            let fund = self.require_fund(&db_tx, fund_id).await?;
            self.require_scope_access(&db_tx, actor, fund.project_id, "reading the admin fund")
                .await?;
            Ok(fund)
        })
    }

    /// The fund of a project, if it was created already.
    pub async fn fund_by_project(
        &self,
        actor: &Actor,
        project_id: Uuid,
    ) -> ResultEngine<Option<Fund>> {
        with_tx!(self, |db_tx| {
            self.require_project_access(&db_tx, actor, project_id)
                .await?;
            self.find_project_fund(&db_tx, project_id).await
        })
    }

    /// The fund owned by `owner_id`, if any.
    ///
    /// Authorization: requires the admin role.
    pub async fn fund_by_owner(&self, actor: &Actor, owner_id: &str) -> ResultEngine<Option<Fund>> {
        self.require_admin(actor, "reading owner funds")?;
        with_tx!(self, |db_tx| self.find_owner_fund(&db_tx, owner_id).await)
    }

    /// The admin fund. Fails with `KeyNotFound` until it has been created by
    /// [`Engine::bootstrap_admin_fund`] or a first admin income.
    pub async fn admin_fund(&self, actor: &Actor) -> ResultEngine<Fund> {
        self.require_admin(actor, "reading the admin fund")?;
        with_tx!(self, |db_tx| {
            self.find_owner_fund(&db_tx, &self.admin_owner)
                .await?
                .ok_or_else(|| EngineError::KeyNotFound("admin fund not exists".to_string()))
        })
    }

    /// Lists every fund visible to the actor, the admin fund first.
    pub async fn list_funds(&self, actor: &Actor) -> ResultEngine<Vec<Fund>> {
        with_tx!(self, |db_tx| self.list_funds_in_tx(&db_tx, actor).await)
    }

    async fn list_funds_in_tx(
        &self,
        db: &DatabaseTransaction,
        actor: &Actor,
    ) -> ResultEngine<Vec<Fund>> {
        let mut query = funds::Entity::find();
        if !actor.is_admin() {
            let member_of: Vec<Uuid> = project_members::Entity::find()
                .filter(project_members::Column::UserId.eq(actor.user_id.clone()))
                .all(db)
                .await?
                .into_iter()
                .map(|member| member.project_id)
                .collect();
            query = query.filter(funds::Column::ProjectId.is_in(member_of));
        }
        query
            .order_by_asc(funds::Column::Kind)
            .order_by_asc(funds::Column::Name)
            .all(db)
            .await?
            .into_iter()
            .map(Fund::try_from)
            .collect()
    }

    /// Creates the admin fund. A positive `opening_balance` is booked as an
    /// admin income so the fund balance stays explained by transactions.
    ///
    /// Authorization: requires the admin role.
    pub async fn bootstrap_admin_fund(
        &self,
        actor: &Actor,
        opening_balance: i64,
    ) -> ResultEngine<Fund> {
        self.require_admin(actor, "bootstrapping the admin fund")?;
        if opening_balance < 0 {
            return Err(EngineError::InvalidAmount(
                "opening balance must be >= 0".to_string(),
            ));
        }

        let fund = with_tx!(self, |db_tx| {
            self.bootstrap_in_tx(&db_tx, actor, opening_balance).await
        })?;

        tracing::info!(fund_id = %fund.id, balance = fund.balance, "admin fund ready");
        self.emit(AuditRecord::new(
            &actor.user_id,
            "bootstrap",
            "fund",
            fund.id,
            json!({ "owner_id": self.admin_owner, "opening_balance": opening_balance }),
        ));
        Ok(fund)
    }

    async fn bootstrap_in_tx(
        &self,
        db_tx: &DatabaseTransaction,
        actor: &Actor,
        opening_balance: i64,
    ) -> ResultEngine<Fund> {
        if self.find_owner_fund(db_tx, &self.admin_owner).await?.is_some() {
            return Err(EngineError::ExistingKey(format!(
                "admin fund ({})",
                self.admin_owner
            )));
        }
        let fund = self.create_admin_fund(db_tx).await?;
        if opening_balance == 0 {
            return Ok(fund);
        }

        let now = Utc::now();
        let tx = Transaction::new(
            NewTransaction {
                kind: TransactionKind::Income,
                amount: opening_balance,
                occurred_at: now,
                expense_label: Default::default(),
                description: Some("opening balance".to_string()),
                project_id: None,
                created_by: actor.user_id.clone(),
                attachment: None,
                deferred_payment_id: None,
            },
            now,
        )?;
        crate::transactions::ActiveModel::from(&tx)
            .insert(db_tx)
            .await?;
        self.update_balance(db_tx, fund.id, opening_balance).await
    }

    pub(super) async fn require_fund(
        &self,
        db: &DatabaseTransaction,
        fund_id: Uuid,
    ) -> ResultEngine<Fund> {
        let model = funds::Entity::find_by_id(fund_id)
            .one(db)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound("fund not exists".to_string()))?;
        Fund::try_from(model)
    }

    pub(super) async fn find_owner_fund(
        &self,
        db: &DatabaseTransaction,
        owner_id: &str,
    ) -> ResultEngine<Option<Fund>> {
        funds::Entity::find()
            .filter(funds::Column::OwnerId.eq(owner_id.to_string()))
            .one(db)
            .await?
            .map(Fund::try_from)
            .transpose()
    }

    pub(super) async fn find_project_fund(
        &self,
        db: &DatabaseTransaction,
        project_id: Uuid,
    ) -> ResultEngine<Option<Fund>> {
        funds::Entity::find()
            .filter(funds::Column::ProjectId.eq(project_id))
            .one(db)
            .await?
            .map(Fund::try_from)
            .transpose()
    }

    async fn create_admin_fund(&self, db: &DatabaseTransaction) -> ResultEngine<Fund> {
        let fund = Fund::admin(&self.admin_owner, Utc::now());
        funds::ActiveModel::from(&fund).insert(db).await?;
        tracing::debug!(fund_id = %fund.id, owner = %self.admin_owner, "admin fund created");
        Ok(fund)
    }

    async fn create_project_fund(
        &self,
        db: &DatabaseTransaction,
        project_id: Uuid,
    ) -> ResultEngine<Fund> {
        let project = self.require_project(db, project_id).await?;
        let fund = Fund::project(project_id, &project.name, Utc::now());
        funds::ActiveModel::from(&fund).insert(db).await?;
        tracing::debug!(fund_id = %fund.id, %project_id, "project fund created");
        Ok(fund)
    }

    /// Adds `delta` to a fund balance.
    ///
    /// The row is only written if its version did not move since it was read
    /// and the new balance is not negative. When nothing was written the row
    /// is read again: a balance that cannot cover `delta` is
    /// `InsufficientFunds`, anything else is a `Conflict` and the unit of work
    /// is retried.
    pub(super) async fn update_balance(
        &self,
        db: &DatabaseTransaction,
        fund_id: Uuid,
        delta: i64,
    ) -> ResultEngine<Fund> {
        let fund = self.require_fund(db, fund_id).await?;
        self.write_balance(db, fund, delta).await
    }

    /// Writes `delta` on top of a fund read earlier in the unit of work.
    pub(super) async fn write_balance(
        &self,
        db: &DatabaseTransaction,
        mut fund: Fund,
        delta: i64,
    ) -> ResultEngine<Fund> {
        ensure_covers(&fund, delta)?;

        let fund_id = fund.id;
        let now = Utc::now();
        let result = funds::Entity::update_many()
            .col_expr(
                funds::Column::Balance,
                Expr::col(funds::Column::Balance).add(delta),
            )
            .col_expr(
                funds::Column::Version,
                Expr::col(funds::Column::Version).add(1),
            )
            .col_expr(funds::Column::UpdatedAt, Expr::value(now))
            .filter(funds::Column::Id.eq(fund_id))
            .filter(funds::Column::Version.eq(fund.version))
            .filter(Expr::expr(Expr::col(funds::Column::Balance).add(delta)).gte(0))
            .exec(db)
            .await?;
        if result.rows_affected == 0 {
            let current = self.require_fund(db, fund_id).await?;
            ensure_covers(&current, delta)?;
            return Err(EngineError::Conflict(format!(
                "fund {fund_id} changed while being updated"
            )));
        }

        fund.balance += delta;
        fund.version += 1;
        fund.updated_at = now;
        tracing::trace!(%fund_id, delta, balance = fund.balance, "fund balance updated");
        Ok(fund)
    }

    /// Applies the `(project, admin)` deltas of a money movement.
    ///
    /// Debits run before credits so a deposit fails on the admin fund before
    /// the project fund is touched. A missing fund is created on the fly when
    /// it is about to be credited; debiting a missing fund is `KeyNotFound`.
    pub(super) async fn apply_deltas(
        &self,
        db: &DatabaseTransaction,
        deltas: (Option<(Uuid, i64)>, Option<i64>),
    ) -> ResultEngine<()> {
        let (project, admin) = deltas;
        let mut moves: Vec<(Option<Uuid>, i64)> = Vec::with_capacity(2);
        if let Some((project_id, delta)) = project {
            moves.push((Some(project_id), delta));
        }
        if let Some(delta) = admin {
            moves.push((None, delta));
        }
        moves.sort_by_key(|(_, delta)| *delta);

        for (project_id, delta) in moves {
            if delta == 0 {
                continue;
            }
            let fund = match project_id {
                Some(project_id) => match self.find_project_fund(db, project_id).await? {
                    Some(fund) => fund,
                    None if delta > 0 => self.create_project_fund(db, project_id).await?,
                    None => {
                        return Err(EngineError::KeyNotFound(
                            "project fund not exists".to_string(),
                        ));
                    }
                },
                None => match self.find_owner_fund(db, &self.admin_owner).await? {
                    Some(fund) => fund,
                    None if delta > 0 => self.create_admin_fund(db).await?,
                    None => {
                        return Err(EngineError::KeyNotFound("admin fund not exists".to_string()));
                    }
                },
            };
            self.update_balance(db, fund.id, delta).await?;
        }
        Ok(())
    }
}

fn ensure_covers(fund: &Fund, delta: i64) -> ResultEngine<()> {
    if fund.covers(delta) {
        return Ok(());
    }
    if fund.balance.checked_add(delta).is_none() {
        return Err(EngineError::InvalidAmount(format!(
            "{} cannot hold {} more",
            fund.name, delta
        )));
    }
    Err(EngineError::InsufficientFunds(format!(
        "{} has {} available, {} requested",
        fund.name,
        fund.balance,
        delta.saturating_neg()
    )))
}

#[cfg(test)]
mod tests {
    use migration::MigratorTrait;
    use sea_orm::Database;

    use super::*;

    async fn engine_with_fund(balance: i64) -> (Engine, Fund) {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        migration::Migrator::up(&db, None).await.unwrap();
        let engine = Engine::builder().database(db).build().await.unwrap();
        let admin = Actor::admin("root");
        let fund = engine.bootstrap_admin_fund(&admin, balance).await.unwrap();
        (engine, fund)
    }

    async fn bump_version(db: &DatabaseTransaction, fund_id: Uuid, delta: i64) {
        funds::Entity::update_many()
            .col_expr(
                funds::Column::Balance,
                Expr::col(funds::Column::Balance).add(delta),
            )
            .col_expr(
                funds::Column::Version,
                Expr::col(funds::Column::Version).add(1),
            )
            .filter(funds::Column::Id.eq(fund_id))
            .exec(db)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn stale_fund_is_a_conflict() {
        let (engine, fund) = engine_with_fund(1_000).await;
        let db_tx = engine.router.begin().await.unwrap();
        let stale = engine.require_fund(&db_tx, fund.id).await.unwrap();
        bump_version(&db_tx, fund.id, -100).await;

        let err = engine.write_balance(&db_tx, stale, -50).await.unwrap_err();

        assert!(matches!(err, EngineError::Conflict(_)));
        assert!(err.is_retryable());
        let current = engine.require_fund(&db_tx, fund.id).await.unwrap();
        assert_eq!(current.balance, 900);
    }

    #[tokio::test]
    async fn stale_fund_that_can_no_longer_cover_is_insufficient() {
        let (engine, fund) = engine_with_fund(1_000).await;
        let db_tx = engine.router.begin().await.unwrap();
        let stale = engine.require_fund(&db_tx, fund.id).await.unwrap();
        bump_version(&db_tx, fund.id, -900).await;

        let err = engine.write_balance(&db_tx, stale, -500).await.unwrap_err();

        assert!(matches!(err, EngineError::InsufficientFunds(_)));
    }

    #[tokio::test]
    async fn fresh_fund_is_written_and_versioned() {
        let (engine, fund) = engine_with_fund(1_000).await;
        let db_tx = engine.router.begin().await.unwrap();
        let read = engine.require_fund(&db_tx, fund.id).await.unwrap();

        let written = engine.write_balance(&db_tx, read.clone(), -250).await.unwrap();

        assert_eq!(written.balance, 750);
        assert_eq!(written.version, read.version + 1);
        let current = engine.require_fund(&db_tx, fund.id).await.unwrap();
        assert_eq!(current.balance, 750);
        assert_eq!(current.version, written.version);
    }

    #[tokio::test]
    async fn credit_past_the_maximum_is_an_invalid_amount() {
        let (engine, fund) = engine_with_fund(i64::MAX - 10).await;
        let db_tx = engine.router.begin().await.unwrap();

        let err = engine.update_balance(&db_tx, fund.id, 11).await.unwrap_err();

        assert!(matches!(err, EngineError::InvalidAmount(_)));
        let err = engine.update_balance(&db_tx, fund.id, -i64::MAX).await.unwrap_err();
        assert!(matches!(err, EngineError::InsufficientFunds(_)));
    }
}
