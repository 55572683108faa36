use chrono::Utc;
use sea_orm::{
    ActiveValue, DatabaseTransaction, PaginatorTrait, QueryFilter, QueryOrder, prelude::*,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    Actor, AuditRecord, EngineError, ExpenseType, ExpenseTypePatch, ResultEngine, expense_types,
    ledger_entries,
    transactions::GENERAL_EXPENSE_KEY,
    util::{normalize_name_key, normalize_optional_text, normalize_required_name},
};

use super::{Engine, with_tx};

/// Name of the expense type deferred payments are transferred into.
pub(crate) const DEFERRED_PAYMENTS_TYPE: &str = "Deferred payments";

impl Engine {
    /// Registers a new expense type.
    ///
    /// Authorization: requires the admin role.
    pub async fn create_expense_type(
        &self,
        actor: &Actor,
        name: &str,
        description: Option<&str>,
    ) -> ResultEngine<ExpenseType> {
        self.require_admin(actor, "creating an expense type")?;
        let name = normalize_required_name(name, "expense type")?;
        let name_norm = expense_type_key(&name)?;
        let description = normalize_optional_text(description);

        let expense_type = with_tx!(self, |db_tx| {
            if self.find_expense_type(&db_tx, &name_norm).await?.is_some() {
                return Err(EngineError::ExistingKey(name));
            }
            let model = expense_types::ActiveModel::new(
                name.clone(),
                name_norm.clone(),
                description.clone(),
                false,
                Utc::now(),
            )
            .insert(&db_tx)
            .await?;
            Ok(ExpenseType::from(model))
        })?;

        self.emit(AuditRecord::new(
            &actor.user_id,
            "create",
            "expense_type",
            expense_type.id,
            json!({ "name": expense_type.name }),
        ));
        Ok(expense_type)
    }

    /// Renames, describes or toggles an expense type.
    ///
    /// Authorization: requires the admin role.
    pub async fn update_expense_type(
        &self,
        actor: &Actor,
        expense_type_id: Uuid,
        patch: ExpenseTypePatch,
    ) -> ResultEngine<ExpenseType> {
        self.require_admin(actor, "updating an expense type")?;
        let renamed = match patch.name.as_deref() {
            Some(name) => {
                let name = normalize_required_name(name, "expense type")?;
                let name_norm = expense_type_key(&name)?;
                Some((name, name_norm))
            }
            None => None,
        };

        let expense_type = with_tx!(self, |db_tx| {
            let current = self.require_expense_type(&db_tx, expense_type_id).await?;
            let mut model: expense_types::ActiveModel = current.into();
            if let Some((name, name_norm)) = &renamed {
                if let Some(other) = self.find_expense_type(&db_tx, name_norm).await? {
                    if other.id != expense_type_id {
                        return Err(EngineError::ExistingKey(name.clone()));
                    }
                }
                model.name = ActiveValue::Set(name.clone());
                model.name_norm = ActiveValue::Set(name_norm.clone());
            }
            if let Some(description) = patch.description.as_deref() {
                model.description = ActiveValue::Set(normalize_optional_text(Some(description)));
            }
            if let Some(is_active) = patch.is_active {
                model.is_active = ActiveValue::Set(is_active);
            }
            let model = model.update(&db_tx).await?;
            Ok(ExpenseType::from(model))
        })?;

        self.emit(AuditRecord::new(
            &actor.user_id,
            "update",
            "expense_type",
            expense_type.id,
            json!({
                "name": expense_type.name,
                "is_active": expense_type.is_active,
            }),
        ));
        Ok(expense_type)
    }

    /// Deletes an expense type nobody classified into.
    ///
    /// Referenced types fail with `ReferencedEntity`; disable them with
    /// [`Engine::update_expense_type`] instead.
    ///
    /// Authorization: requires the admin role.
    pub async fn delete_expense_type(
        &self,
        actor: &Actor,
        expense_type_id: Uuid,
    ) -> ResultEngine<()> {
        self.require_admin(actor, "deleting an expense type")?;
        let name = with_tx!(self, |db_tx| {
            let current = self.require_expense_type(&db_tx, expense_type_id).await?;
            let references = ledger_entries::Entity::find()
                .filter(ledger_entries::Column::ExpenseTypeId.eq(expense_type_id))
                .count(&db_tx)
                .await?;
            if references > 0 {
                return Err(EngineError::ReferencedEntity(format!(
                    "expense type '{}' is used by {references} ledger entries",
                    current.name
                )));
            }
            expense_types::Entity::delete_by_id(expense_type_id)
                .exec(&db_tx)
                .await?;
            Ok(current.name)
        })?;

        self.emit(AuditRecord::new(
            &actor.user_id,
            "delete",
            "expense_type",
            expense_type_id,
            json!({ "name": name }),
        ));
        Ok(())
    }

    /// Looks an expense type up by name, ignoring case and accents.
    /// Inactive types are returned as well.
    pub async fn expense_type_by_name(&self, name: &str) -> ResultEngine<Option<ExpenseType>> {
        let name_norm = normalize_name_key(name)?;
        let model = with_tx!(self, |db_tx| {
            self.find_expense_type(&db_tx, &name_norm).await
        })?;
        Ok(model.map(ExpenseType::from))
    }

    /// Lists expense types ordered by name.
    pub async fn list_expense_types(
        &self,
        include_inactive: bool,
    ) -> ResultEngine<Vec<ExpenseType>> {
        let models = with_tx!(self, |db_tx| {
            let mut query = expense_types::Entity::find();
            if !include_inactive {
                query = query.filter(expense_types::Column::IsActive.eq(true));
            }
            query
                .order_by_asc(expense_types::Column::NameNorm)
                .all(&db_tx)
                .await
                .map_err(EngineError::from)
        })?;
        Ok(models.into_iter().map(ExpenseType::from).collect())
    }

    async fn find_expense_type(
        &self,
        db: &DatabaseTransaction,
        name_norm: &str,
    ) -> ResultEngine<Option<expense_types::Model>> {
        expense_types::Entity::find()
            .filter(expense_types::Column::NameNorm.eq(name_norm.to_string()))
            .one(db)
            .await
            .map_err(Into::into)
    }

    async fn require_expense_type(
        &self,
        db: &DatabaseTransaction,
        expense_type_id: Uuid,
    ) -> ResultEngine<expense_types::Model> {
        expense_types::Entity::find_by_id(expense_type_id)
            .one(db)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound("expense type not exists".to_string()))
    }

    /// Resolves a label to an active expense type. Disabled types resolve to
    /// `None`, like unknown ones.
    pub(super) async fn resolve_active_expense_type(
        &self,
        db: &DatabaseTransaction,
        name: &str,
    ) -> ResultEngine<Option<expense_types::Model>> {
        let Ok(name_norm) = normalize_name_key(name) else {
            return Ok(None);
        };
        Ok(self
            .find_expense_type(db, &name_norm)
            .await?
            .filter(|model| model.is_active))
    }

    /// The system type deferred payments are transferred into, created on
    /// first use. A disabled system type is enabled again.
    pub(super) async fn ensure_system_expense_type(
        &self,
        db: &DatabaseTransaction,
    ) -> ResultEngine<expense_types::Model> {
        let name_norm = normalize_name_key(DEFERRED_PAYMENTS_TYPE)?;
        match self.find_expense_type(db, &name_norm).await? {
            Some(model) if model.is_active => Ok(model),
            Some(model) => {
                let mut active: expense_types::ActiveModel = model.into();
                active.is_active = ActiveValue::Set(true);
                Ok(active.update(db).await?)
            }
            None => {
                tracing::info!("creating the '{DEFERRED_PAYMENTS_TYPE}' expense type");
                Ok(expense_types::ActiveModel::new(
                    DEFERRED_PAYMENTS_TYPE.to_string(),
                    name_norm,
                    None,
                    true,
                    Utc::now(),
                )
                .insert(db)
                .await?)
            }
        }
    }
}

/// Lookup key for a user supplied type name. The general expense bucket is
/// not an expense type, so its name is reserved.
fn expense_type_key(name: &str) -> ResultEngine<String> {
    let name_norm = normalize_name_key(name)?;
    if name_norm == GENERAL_EXPENSE_KEY {
        return Err(EngineError::InvalidName(format!(
            "'{name}' is reserved for general expenses"
        )));
    }
    Ok(name_norm)
}
