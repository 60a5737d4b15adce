//! Store traits
//!
//! Persistence seams consumed by the API layer. Uniqueness and ordering are
//! the store's responsibility: implementations must reject duplicate
//! usernames, emails, folded aliases and entity links atomically, and must
//! return entities sorted by ascending view count (ties by id).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Account, AccountId, Entity, EntityChanges, EntityId, NewAccount, NewEntity, OutstandingToken,
    ProfileUpdate, Result, UniqueField,
};

/// Account persistence
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert an inactive account, assigning `id` and `uid`
    async fn create_account(&self, account: NewAccount) -> Result<Account>;

    /// Get account by ID
    async fn get_account(&self, id: AccountId) -> Result<Option<Account>>;

    /// Exact username lookup
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>>;

    /// Exact email lookup
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>>;

    /// Report which of the given values are already held by another account.
    /// `alt_name` is folded before comparison; `except` excludes one account.
    async fn find_conflicts(
        &self,
        username: &str,
        email: &str,
        alt_name: &str,
        except: Option<AccountId>,
    ) -> Result<Vec<UniqueField>>;

    /// Mark an inactive account active with a validated email.
    ///
    /// Returns `None` when the account is already active or missing, so of
    /// several concurrent activations exactly one gets the account back.
    async fn activate_account(&self, id: AccountId) -> Result<Option<Account>>;

    /// Replace the password hash, optionally activating the account
    async fn set_password(&self, id: AccountId, password_hash: &str, activate: bool)
        -> Result<Account>;

    /// Replace username, email and alias in one write
    async fn update_profile(&self, id: AccountId, update: &ProfileUpdate) -> Result<Account>;

    /// Record a successful login
    async fn record_login(&self, id: AccountId, at: DateTime<Utc>) -> Result<()>;

    /// All accounts, newest first
    async fn list_accounts(&self) -> Result<Vec<Account>>;

    /// Backend reachability probe for readiness checks
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Outstanding and blacklisted session tokens
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Track a freshly issued token
    async fn record_outstanding(&self, token: OutstandingToken) -> Result<()>;

    /// Every token ever issued to the account that has not been purged
    async fn list_outstanding(&self, account_id: AccountId) -> Result<Vec<OutstandingToken>>;

    /// Blacklist a token by JTI. Returns `false` when it was already blacklisted.
    async fn blacklist(&self, jti: &str) -> Result<bool>;

    async fn is_blacklisted(&self, jti: &str) -> Result<bool>;

    /// Drop the account's tokens that expired before `now`, along with their
    /// blacklist entries. Returns how many outstanding records were removed.
    async fn purge_expired(&self, account_id: AccountId, now: DateTime<Utc>) -> Result<u64>;
}

/// Entity persistence
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Entities by ascending views, then id; `limit` truncates after ordering
    async fn list_entities(&self, limit: Option<usize>) -> Result<Vec<Entity>>;

    async fn get_entity(&self, id: EntityId) -> Result<Option<Entity>>;

    async fn create_entity(&self, entity: NewEntity) -> Result<Entity>;

    async fn update_entity(&self, id: EntityId, changes: &EntityChanges) -> Result<Entity>;

    /// Returns `false` when no entity had this ID
    async fn delete_entity(&self, id: EntityId) -> Result<bool>;
}
