//! In-memory store
//!
//! Process-local implementation of every store trait. Used by the test
//! router and by `DATABASE_BACKEND=memory` deployments. Uniqueness checks and
//! writes happen under a single write lock, so concurrent registrations cannot
//! both claim the same username, email, alias or link.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::{AccountStore, EntityStore, TokenStore};
use crate::{
    fold_alias, Account, AccountId, Entity, EntityChanges, EntityId, NewAccount, NewEntity,
    OutstandingToken, PorticoError, ProfileUpdate, Result, UniqueField,
};

#[derive(Default)]
struct Inner {
    accounts: HashMap<AccountId, Account>,
    next_account_id: AccountId,
    outstanding: Vec<OutstandingToken>,
    blacklisted: HashSet<String>,
    entities: HashMap<EntityId, Entity>,
    next_entity_id: EntityId,
}

impl Inner {
    fn account_conflicts(
        &self,
        username: &str,
        email: &str,
        alt_name_folded: &str,
        except: Option<AccountId>,
    ) -> Vec<UniqueField> {
        let others = || {
            self.accounts
                .values()
                .filter(move |a| Some(a.id) != except)
        };

        let mut conflicts = Vec::new();
        if others().any(|a| a.username == username) {
            conflicts.push(UniqueField::Username);
        }
        if others().any(|a| a.email == email) {
            conflicts.push(UniqueField::Email);
        }
        if others().any(|a| a.alt_name_folded == alt_name_folded) {
            conflicts.push(UniqueField::AltName);
        }
        conflicts
    }

    fn account_mut(&mut self, id: AccountId) -> Result<&mut Account> {
        self.accounts
            .get_mut(&id)
            .ok_or_else(|| PorticoError::NotFound(format!("account {id}")))
    }

    fn link_taken(&self, link: &str, except: Option<EntityId>) -> bool {
        self.entities
            .values()
            .any(|e| e.link == link && Some(e.id) != except)
    }
}

/// Store backed by process memory
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn create_account(&self, account: NewAccount) -> Result<Account> {
        let mut inner = self.inner.write().await;
        let folded = account.alt_name_folded();

        if let Some(field) = inner
            .account_conflicts(&account.username, &account.email, &folded, None)
            .into_iter()
            .next()
        {
            return Err(PorticoError::Conflict { field });
        }

        inner.next_account_id += 1;
        let created = Account {
            id: inner.next_account_id,
            uid: Uuid::new_v4(),
            username: account.username,
            alt_name: account.alt_name,
            alt_name_folded: folded,
            email: account.email,
            password_hash: account.password_hash,
            is_active: false,
            email_validated: false,
            is_staff: account.is_staff,
            date_joined: Utc::now(),
            last_login: None,
        };
        inner.accounts.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        Ok(self.inner.read().await.accounts.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>> {
        let inner = self.inner.read().await;
        Ok(inner
            .accounts
            .values()
            .find(|a| a.username == username)
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        let inner = self.inner.read().await;
        Ok(inner.accounts.values().find(|a| a.email == email).cloned())
    }

    async fn find_conflicts(
        &self,
        username: &str,
        email: &str,
        alt_name: &str,
        except: Option<AccountId>,
    ) -> Result<Vec<UniqueField>> {
        let inner = self.inner.read().await;
        Ok(inner.account_conflicts(username, email, &fold_alias(alt_name), except))
    }

    async fn activate_account(&self, id: AccountId) -> Result<Option<Account>> {
        let mut inner = self.inner.write().await;
        match inner.accounts.get_mut(&id) {
            Some(account) if !account.is_active => {
                account.is_active = true;
                account.email_validated = true;
                Ok(Some(account.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn set_password(
        &self,
        id: AccountId,
        password_hash: &str,
        activate: bool,
    ) -> Result<Account> {
        let mut inner = self.inner.write().await;
        let account = inner.account_mut(id)?;
        account.password_hash = password_hash.to_string();
        if activate {
            account.is_active = true;
        }
        Ok(account.clone())
    }

    async fn update_profile(&self, id: AccountId, update: &ProfileUpdate) -> Result<Account> {
        let mut inner = self.inner.write().await;
        let folded = fold_alias(&update.alt_name);

        if let Some(field) = inner
            .account_conflicts(&update.username, &update.email, &folded, Some(id))
            .into_iter()
            .next()
        {
            return Err(PorticoError::Conflict { field });
        }

        let account = inner.account_mut(id)?;
        account.username = update.username.clone();
        account.email = update.email.clone();
        account.alt_name = update.alt_name.clone();
        account.alt_name_folded = folded;
        Ok(account.clone())
    }

    async fn record_login(&self, id: AccountId, at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.account_mut(id)?.last_login = Some(at);
        Ok(())
    }

    async fn list_accounts(&self) -> Result<Vec<Account>> {
        let inner = self.inner.read().await;
        let mut accounts: Vec<Account> = inner.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| b.date_joined.cmp(&a.date_joined).then(b.id.cmp(&a.id)));
        Ok(accounts)
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn record_outstanding(&self, token: OutstandingToken) -> Result<()> {
        self.inner.write().await.outstanding.push(token);
        Ok(())
    }

    async fn list_outstanding(&self, account_id: AccountId) -> Result<Vec<OutstandingToken>> {
        let inner = self.inner.read().await;
        Ok(inner
            .outstanding
            .iter()
            .filter(|t| t.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn blacklist(&self, jti: &str) -> Result<bool> {
        Ok(self.inner.write().await.blacklisted.insert(jti.to_string()))
    }

    async fn is_blacklisted(&self, jti: &str) -> Result<bool> {
        Ok(self.inner.read().await.blacklisted.contains(jti))
    }

    async fn purge_expired(&self, account_id: AccountId, now: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let Inner {
            outstanding,
            blacklisted,
            ..
        } = &mut *inner;

        let before = outstanding.len();
        outstanding.retain(|t| {
            let expired = t.account_id == account_id && t.expires_at < now;
            if expired {
                blacklisted.remove(&t.jti);
            }
            !expired
        });
        Ok((before - outstanding.len()) as u64)
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn list_entities(&self, limit: Option<usize>) -> Result<Vec<Entity>> {
        let inner = self.inner.read().await;
        let mut entities: Vec<Entity> = inner.entities.values().cloned().collect();
        entities.sort_by(|a, b| a.views.cmp(&b.views).then(a.id.cmp(&b.id)));
        if let Some(limit) = limit {
            entities.truncate(limit);
        }
        Ok(entities)
    }

    async fn get_entity(&self, id: EntityId) -> Result<Option<Entity>> {
        Ok(self.inner.read().await.entities.get(&id).cloned())
    }

    async fn create_entity(&self, entity: NewEntity) -> Result<Entity> {
        let mut inner = self.inner.write().await;
        if inner.link_taken(&entity.link, None) {
            return Err(PorticoError::Conflict {
                field: UniqueField::Link,
            });
        }

        inner.next_entity_id += 1;
        let now = Utc::now();
        let created = Entity {
            id: inner.next_entity_id,
            name: entity.name,
            link: entity.link,
            views: entity.views,
            author_id: entity.author_id,
            created: now,
            updated: now,
        };
        inner.entities.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_entity(&self, id: EntityId, changes: &EntityChanges) -> Result<Entity> {
        let mut inner = self.inner.write().await;
        if let Some(link) = &changes.link {
            if inner.link_taken(link, Some(id)) {
                return Err(PorticoError::Conflict {
                    field: UniqueField::Link,
                });
            }
        }

        let entity = inner
            .entities
            .get_mut(&id)
            .ok_or_else(|| PorticoError::NotFound(format!("entity {id}")))?;
        if let Some(name) = &changes.name {
            entity.name = name.clone();
        }
        if let Some(link) = &changes.link {
            entity.link = link.clone();
        }
        if let Some(views) = changes.views {
            entity.views = views;
        }
        entity.updated = Utc::now();
        Ok(entity.clone())
    }

    async fn delete_entity(&self, id: EntityId) -> Result<bool> {
        Ok(self.inner.write().await.entities.remove(&id).is_some())
    }
}
