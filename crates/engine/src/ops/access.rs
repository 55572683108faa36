use sea_orm::{DatabaseTransaction, prelude::*};
use uuid::Uuid;

use crate::{Actor, EngineError, ResultEngine, project_members, projects};

use super::Engine;

impl Engine {
    pub(super) fn require_admin(&self, actor: &Actor, action: &str) -> ResultEngine<()> {
        if !actor.is_admin() {
            return Err(EngineError::Forbidden(format!(
                "{action} requires the admin role"
            )));
        }
        Ok(())
    }

    pub(super) async fn require_project(
        &self,
        db: &DatabaseTransaction,
        project_id: Uuid,
    ) -> ResultEngine<projects::Model> {
        projects::Entity::find_by_id(project_id)
            .one(db)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound("project not exists".to_string()))
    }

    async fn is_project_member(
        &self,
        db: &DatabaseTransaction,
        project_id: Uuid,
        user_id: &str,
    ) -> ResultEngine<bool> {
        project_members::Entity::find_by_id((project_id, user_id.to_string()))
            .one(db)
            .await
            .map(|row| row.is_some())
            .map_err(Into::into)
    }

    /// The project must exist (`KeyNotFound`) and the actor must be an admin
    /// or one of its members (`Forbidden`), checked in this order.
    pub(super) async fn require_project_access(
        &self,
        db: &DatabaseTransaction,
        actor: &Actor,
        project_id: Uuid,
    ) -> ResultEngine<projects::Model> {
        let project = self.require_project(db, project_id).await?;
        if actor.is_admin() || self.is_project_member(db, project_id, &actor.user_id).await? {
            return Ok(project);
        }
        Err(EngineError::Forbidden(format!(
            "user '{}' has no access to project '{}'",
            actor.user_id, project.name
        )))
    }

    /// Access to something that is either scoped to a project or, when
    /// `project_id` is `None`, to the admin fund.
    pub(super) async fn require_scope_access(
        &self,
        db: &DatabaseTransaction,
        actor: &Actor,
        project_id: Option<Uuid>,
        action: &str,
    ) -> ResultEngine<()> {
        match project_id {
            Some(project_id) => {
                self.require_project_access(db, actor, project_id).await?;
                Ok(())
            }
            None => self.require_admin(actor, action),
        }
    }
}
