//! Entity access control
//!
//! Authenticated callers see every entity with its full field set.
//! Anonymous callers see a bounded window of the same ordering (ascending
//! views, ties by id) projected to name and author. Only the author of an
//! entity may change or delete it.

use crate::audit::{audit_log, AuditEvent};
use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::state::AppState;
use portico_core::validation::{validate_entity_name, validate_link, validate_views};
use portico_core::{AccountId, Entity, EntityChanges, EntityId, NewEntity};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateEntityRequest {
    pub name: String,
    pub link: String,
    /// Defaults to 0
    #[serde(default)]
    pub views: Option<i64>,
}

/// Partial update; omitted fields keep their value
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateEntityRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub views: Option<i64>,
}

/// Entity as seen by an authenticated caller
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EntityDetail {
    pub id: EntityId,
    pub name: String,
    /// Author account ID
    pub author: AccountId,
    pub views: i64,
    pub link: String,
}

impl From<Entity> for EntityDetail {
    fn from(entity: Entity) -> Self {
        Self {
            id: entity.id,
            name: entity.name,
            author: entity.author_id,
            views: entity.views,
            link: entity.link,
        }
    }
}

/// Entity as seen by an anonymous caller
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EntitySummary {
    pub name: String,
    pub author: AccountId,
}

impl From<Entity> for EntitySummary {
    fn from(entity: Entity) -> Self {
        Self {
            name: entity.name,
            author: entity.author_id,
        }
    }
}

/// Caller-dependent projection
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum EntityView {
    Detail(EntityDetail),
    Summary(EntitySummary),
}

impl EntityView {
    fn for_caller(entity: Entity, caller: Option<&AuthenticatedUser>) -> Self {
        match caller {
            Some(_) => EntityView::Detail(entity.into()),
            None => EntityView::Summary(entity.into()),
        }
    }
}

/// Entity operations with caller-based access control
#[derive(Clone)]
pub struct EntityService {
    state: Arc<AppState>,
    ip_address: Option<String>,
}

impl EntityService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            ip_address: None,
        }
    }

    /// Attach the caller's address to audit events
    pub fn with_client_ip(mut self, ip_address: Option<String>) -> Self {
        self.ip_address = ip_address;
        self
    }

    fn anonymous_limit(&self) -> usize {
        self.state.config.entities.anonymous_list_limit
    }

    /// Entities visible to the caller, in view order
    pub async fn list(&self, caller: Option<&AuthenticatedUser>) -> Result<Vec<EntityView>, AppError> {
        let limit = match caller {
            Some(_) => None,
            None => Some(self.anonymous_limit()),
        };

        let entities = self.state.entities.list_entities(limit).await?;
        Ok(entities
            .into_iter()
            .map(|entity| EntityView::for_caller(entity, caller))
            .collect())
    }

    /// One entity, if the caller may see it
    ///
    /// Anonymous callers only reach entities inside their list window; any
    /// other ID reads as missing.
    pub async fn retrieve(
        &self,
        caller: Option<&AuthenticatedUser>,
        id: EntityId,
    ) -> Result<EntityView, AppError> {
        let entity = match caller {
            Some(_) => self.state.entities.get_entity(id).await?,
            None => self
                .state
                .entities
                .list_entities(Some(self.anonymous_limit()))
                .await?
                .into_iter()
                .find(|entity| entity.id == id),
        };

        entity
            .map(|entity| EntityView::for_caller(entity, caller))
            .ok_or_else(|| AppError::NotFound("Entity".to_string()))
    }

    pub async fn create(
        &self,
        caller: &AuthenticatedUser,
        request: CreateEntityRequest,
    ) -> Result<EntityDetail, AppError> {
        let views = request.views.unwrap_or(0);
        let errors: Vec<_> = [
            validate_entity_name(&request.name),
            validate_link(&request.link),
            validate_views(views),
        ]
        .into_iter()
        .flatten()
        .collect();
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        let entity = self
            .state
            .entities
            .create_entity(NewEntity {
                name: request.name,
                link: request.link,
                views,
                author_id: caller.account_id,
            })
            .await?;

        tracing::debug!(entity_id = entity.id, author = caller.account_id, "Entity created");
        Ok(entity.into())
    }

    pub async fn update(
        &self,
        caller: &AuthenticatedUser,
        id: EntityId,
        request: UpdateEntityRequest,
    ) -> Result<EntityDetail, AppError> {
        let errors: Vec<_> = [
            request.name.as_deref().and_then(validate_entity_name),
            request.link.as_deref().and_then(validate_link),
            request.views.and_then(validate_views),
        ]
        .into_iter()
        .flatten()
        .collect();
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        self.authored(caller, id).await?;

        let entity = self
            .state
            .entities
            .update_entity(
                id,
                &EntityChanges {
                    name: request.name,
                    link: request.link,
                    views: request.views,
                },
            )
            .await?;

        Ok(entity.into())
    }

    pub async fn delete(&self, caller: &AuthenticatedUser, id: EntityId) -> Result<(), AppError> {
        self.authored(caller, id).await?;

        if !self.state.entities.delete_entity(id).await? {
            return Err(AppError::NotFound("Entity".to_string()));
        }

        tracing::debug!(entity_id = id, author = caller.account_id, "Entity deleted");
        Ok(())
    }

    /// Load an entity the caller wrote
    async fn authored(&self, caller: &AuthenticatedUser, id: EntityId) -> Result<Entity, AppError> {
        let entity = self
            .state
            .entities
            .get_entity(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Entity".to_string()))?;

        if entity.author_id != caller.account_id {
            audit_log(&self.access_denied(caller, id));
            return Err(AppError::Authorization(
                "Only the author may modify this entity.".to_string(),
            ));
        }

        Ok(entity)
    }

    fn access_denied(&self, caller: &AuthenticatedUser, id: EntityId) -> AuditEvent {
        AuditEvent::AccessDenied {
            account_id: caller.account_id,
            resource: format!("entities/{id}"),
            ip_address: self.ip_address.clone(),
        }
    }
}
