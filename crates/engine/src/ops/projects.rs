use chrono::Utc;
use sea_orm::{ActiveValue, QueryFilter, QueryOrder, prelude::*};
use serde_json::json;
use uuid::Uuid;

use crate::{
    Actor, AuditRecord, EngineError, Project, ResultEngine, project_members, projects,
    util::{normalize_name_key, normalize_required_name},
};

use super::{Engine, with_tx};

impl Engine {
    /// Creates a project. Names are unique regardless of case and accents.
    ///
    /// Authorization: requires the admin role.
    pub async fn create_project(&self, actor: &Actor, name: &str) -> ResultEngine<Project> {
        self.require_admin(actor, "creating a project")?;
        let name = normalize_required_name(name, "project")?;
        let name_norm = normalize_name_key(&name)?;
        let project = with_tx!(self, |db_tx| {
            let exists = projects::Entity::find()
                .filter(projects::Column::NameNorm.eq(name_norm.clone()))
                .one(&db_tx)
                .await?
                .is_some();
            if exists {
                return Err(EngineError::ExistingKey(name));
            }

            let project = Project {
                id: Uuid::new_v4(),
                name: name.clone(),
                created_at: Utc::now(),
            };
            let mut model: projects::ActiveModel = (&project).into();
            model.name_norm = ActiveValue::Set(name_norm.clone());
            model.insert(&db_tx).await?;
            Ok(project)
        })?;

        self.emit(AuditRecord::new(
            &actor.user_id,
            "create",
            "project",
            project.id,
            json!({ "name": project.name }),
        ));
        Ok(project)
    }

    /// Gives a member access to a project. Granting twice is a no-op.
    ///
    /// Authorization: requires the admin role.
    pub async fn grant_project_access(
        &self,
        actor: &Actor,
        project_id: Uuid,
        user_id: &str,
    ) -> ResultEngine<()> {
        self.require_admin(actor, "granting project access")?;
        let user_id = normalize_required_name(user_id, "user")?;
        with_tx!(self, |db_tx| {
            self.require_project(&db_tx, project_id).await?;
            let existing = project_members::Entity::find_by_id((project_id, user_id.clone()))
                .one(&db_tx)
                .await?;
            if existing.is_none() {
                project_members::ActiveModel {
                    project_id: ActiveValue::Set(project_id),
                    user_id: ActiveValue::Set(user_id.clone()),
                }
                .insert(&db_tx)
                .await?;
            }
            Ok(())
        })?;

        self.emit(AuditRecord::new(
            &actor.user_id,
            "grant_access",
            "project",
            project_id,
            json!({ "user_id": user_id }),
        ));
        Ok(())
    }

    /// Removes a member from a project.
    ///
    /// Authorization: requires the admin role.
    pub async fn revoke_project_access(
        &self,
        actor: &Actor,
        project_id: Uuid,
        user_id: &str,
    ) -> ResultEngine<()> {
        self.require_admin(actor, "revoking project access")?;
        with_tx!(self, |db_tx| {
            self.require_project(&db_tx, project_id).await?;
            project_members::Entity::delete_by_id((project_id, user_id.to_string()))
                .exec(&db_tx)
                .await?;
            Ok(())
        })?;

        self.emit(AuditRecord::new(
            &actor.user_id,
            "revoke_access",
            "project",
            project_id,
            json!({ "user_id": user_id }),
        ));
        Ok(())
    }

    /// Return a project the actor can access.
    pub async fn project(&self, actor: &Actor, project_id: Uuid) -> ResultEngine<Project> {
        with_tx!(self, |db_tx| {
            let model = self
                .require_project_access(&db_tx, actor, project_id)
                .await?;
            Ok(Project::from(model))
        })
    }

    /// Lists the projects visible to the actor: all of them for admins, the
    /// ones they are a member of otherwise.
    pub async fn list_projects(&self, actor: &Actor) -> ResultEngine<Vec<Project>> {
        with_tx!(self, |db_tx| {
            let models = if actor.is_admin() {
                projects::Entity::find()
                    .order_by_asc(projects::Column::Name)
                    .all(&db_tx)
                    .await?
            } else {
                projects::Entity::find()
                    .inner_join(project_members::Entity)
                    .filter(project_members::Column::UserId.eq(actor.user_id.clone()))
                    .order_by_asc(projects::Column::Name)
                    .all(&db_tx)
                    .await?
            };
            Ok(models.into_iter().map(Project::from).collect())
        })
    }
}
