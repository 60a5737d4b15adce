//! PostgreSQL store
//!
//! Account, session token and entity persistence using SQLx and PostgreSQL.
//! Uniqueness is enforced by table constraints; violations are mapped back
//! to the offending [`UniqueField`] by constraint name.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use uuid::Uuid;

use crate::store::{AccountStore, EntityStore, TokenStore};
use crate::{
    fold_alias, Account, AccountId, Entity, EntityChanges, EntityId, NewAccount, NewEntity,
    OutstandingToken, PorticoError, ProfileUpdate, Result, TokenKind, UniqueField,
};

const ACCOUNT_COLUMNS: &str = "id, uid, username, alt_name, alt_name_folded, email, \
     password_hash, is_active, email_validated, is_staff, date_joined, last_login";

const ENTITY_COLUMNS: &str = "id, name, link, views, author_id, created, updated";

/// PostgreSQL-backed store
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect with the given pool size
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| PorticoError::DatabaseError(format!("PostgreSQL connection failed: {e}")))?;

        Ok(Self { pool })
    }

    /// Create from an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| PorticoError::DatabaseError(format!("Migration failed: {e}")))
    }
}

/// Constraint name to field, as declared in the migrations
fn unique_field_for_constraint(constraint: &str) -> Option<UniqueField> {
    match constraint {
        "accounts_username_key" => Some(UniqueField::Username),
        "accounts_email_key" => Some(UniqueField::Email),
        "accounts_alt_name_folded_key" => Some(UniqueField::AltName),
        "entities_link_key" => Some(UniqueField::Link),
        _ => None,
    }
}

/// Map a write error, turning unique violations (SQLSTATE `23505`) into conflicts
fn write_error(err: sqlx::Error, action: &str) -> PorticoError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            if let Some(field) = db_err.constraint().and_then(unique_field_for_constraint) {
                return PorticoError::Conflict { field };
            }
            tracing::warn!(constraint = ?db_err.constraint(), "Unique violation on unmapped constraint");
        }
    }
    PorticoError::DatabaseError(format!("Failed to {action}: {err}"))
}

fn read_error(err: sqlx::Error, action: &str) -> PorticoError {
    PorticoError::DatabaseError(format!("Failed to {action}: {err}"))
}

/// Account row from database
#[derive(Debug, FromRow)]
struct AccountRow {
    id: i64,
    uid: Uuid,
    username: String,
    alt_name: String,
    alt_name_folded: String,
    email: String,
    password_hash: String,
    is_active: bool,
    email_validated: bool,
    is_staff: bool,
    date_joined: DateTime<Utc>,
    last_login: Option<DateTime<Utc>>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            id: row.id,
            uid: row.uid,
            username: row.username,
            alt_name: row.alt_name,
            alt_name_folded: row.alt_name_folded,
            email: row.email,
            password_hash: row.password_hash,
            is_active: row.is_active,
            email_validated: row.email_validated,
            is_staff: row.is_staff,
            date_joined: row.date_joined,
            last_login: row.last_login,
        }
    }
}

#[derive(Debug, FromRow)]
struct OutstandingRow {
    jti: String,
    account_id: i64,
    kind: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl TryFrom<OutstandingRow> for OutstandingToken {
    type Error = PorticoError;

    fn try_from(row: OutstandingRow) -> Result<Self> {
        let kind = TokenKind::parse(&row.kind).ok_or_else(|| {
            PorticoError::DatabaseError(format!("Unknown token kind: {}", row.kind))
        })?;
        Ok(OutstandingToken {
            jti: row.jti,
            account_id: row.account_id,
            kind,
            expires_at: row.expires_at,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct EntityRow {
    id: i64,
    name: String,
    link: String,
    views: i64,
    author_id: i64,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
}

impl From<EntityRow> for Entity {
    fn from(row: EntityRow) -> Self {
        Entity {
            id: row.id,
            name: row.name,
            link: row.link,
            views: row.views,
            author_id: row.author_id,
            created: row.created,
            updated: row.updated,
        }
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn create_account(&self, account: NewAccount) -> Result<Account> {
        let folded = account.alt_name_folded();
        let row: AccountRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO accounts (uid, username, alt_name, alt_name_folded, email, password_hash, is_staff)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&account.username)
        .bind(&account.alt_name)
        .bind(&folded)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(account.is_staff)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| write_error(e, "create account"))?;

        Ok(row.into())
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        let row: Option<AccountRow> =
            sqlx::query_as(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| read_error(e, "get account"))?;

        Ok(row.map(Account::from))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| read_error(e, "find account by username"))?;

        Ok(row.map(Account::from))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        let row: Option<AccountRow> =
            sqlx::query_as(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = $1"))
                .bind(email)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| read_error(e, "find account by email"))?;

        Ok(row.map(Account::from))
    }

    async fn find_conflicts(
        &self,
        username: &str,
        email: &str,
        alt_name: &str,
        except: Option<AccountId>,
    ) -> Result<Vec<UniqueField>> {
        let (username_taken, email_taken, alias_taken): (bool, bool, bool) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(BOOL_OR(username = $1), FALSE),
                COALESCE(BOOL_OR(email = $2), FALSE),
                COALESCE(BOOL_OR(alt_name_folded = $3), FALSE)
            FROM accounts
            WHERE ($4::BIGINT IS NULL OR id <> $4)
              AND (username = $1 OR email = $2 OR alt_name_folded = $3)
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(fold_alias(alt_name))
        .bind(except)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| read_error(e, "check account uniqueness"))?;

        let mut conflicts = Vec::new();
        if username_taken {
            conflicts.push(UniqueField::Username);
        }
        if email_taken {
            conflicts.push(UniqueField::Email);
        }
        if alias_taken {
            conflicts.push(UniqueField::AltName);
        }
        Ok(conflicts)
    }

    async fn activate_account(&self, id: AccountId) -> Result<Option<Account>> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            r#"
            UPDATE accounts SET is_active = TRUE, email_validated = TRUE
            WHERE id = $1 AND is_active = FALSE
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| write_error(e, "activate account"))?;

        Ok(row.map(Account::from))
    }

    async fn set_password(
        &self,
        id: AccountId,
        password_hash: &str,
        activate: bool,
    ) -> Result<Account> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            r#"
            UPDATE accounts
            SET password_hash = $2, is_active = is_active OR $3
            WHERE id = $1
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(password_hash)
        .bind(activate)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| write_error(e, "set password"))?;

        row.map(Account::from)
            .ok_or_else(|| PorticoError::NotFound(format!("account {id}")))
    }

    async fn update_profile(&self, id: AccountId, update: &ProfileUpdate) -> Result<Account> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            r#"
            UPDATE accounts
            SET username = $2, email = $3, alt_name = $4, alt_name_folded = $5
            WHERE id = $1
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&update.username)
        .bind(&update.email)
        .bind(&update.alt_name)
        .bind(fold_alias(&update.alt_name))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| write_error(e, "update profile"))?;

        row.map(Account::from)
            .ok_or_else(|| PorticoError::NotFound(format!("account {id}")))
    }

    async fn record_login(&self, id: AccountId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE accounts SET last_login = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(|e| write_error(e, "record login"))?;

        Ok(())
    }

    async fn list_accounts(&self) -> Result<Vec<Account>> {
        let rows: Vec<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY date_joined DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| read_error(e, "list accounts"))?;

        Ok(rows.into_iter().map(Account::from).collect())
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| read_error(e, "reach database"))?;
        Ok(())
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn record_outstanding(&self, token: OutstandingToken) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO outstanding_tokens (jti, account_id, kind, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&token.jti)
        .bind(token.account_id)
        .bind(token.kind.as_str())
        .bind(token.expires_at)
        .bind(token.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, "record outstanding token"))?;

        Ok(())
    }

    async fn list_outstanding(&self, account_id: AccountId) -> Result<Vec<OutstandingToken>> {
        let rows: Vec<OutstandingRow> = sqlx::query_as(
            r#"
            SELECT jti, account_id, kind, expires_at, created_at
            FROM outstanding_tokens
            WHERE account_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| read_error(e, "list outstanding tokens"))?;

        rows.into_iter().map(OutstandingToken::try_from).collect()
    }

    async fn blacklist(&self, jti: &str) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO blacklisted_tokens (jti) VALUES ($1) ON CONFLICT (jti) DO NOTHING",
        )
        .bind(jti)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, "blacklist token"))?;

        Ok(result.rows_affected() == 1)
    }

    async fn is_blacklisted(&self, jti: &str) -> Result<bool> {
        let row: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM blacklisted_tokens WHERE jti = $1)")
                .bind(jti)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| read_error(e, "check blacklist"))?;

        Ok(row.0)
    }

    async fn purge_expired(&self, account_id: AccountId, now: DateTime<Utc>) -> Result<u64> {
        let purged: (i64,) = sqlx::query_as(
            r#"
            WITH expired AS (
                DELETE FROM outstanding_tokens
                WHERE account_id = $1 AND expires_at < $2
                RETURNING jti
            ), unlisted AS (
                DELETE FROM blacklisted_tokens
                WHERE jti IN (SELECT jti FROM expired)
            )
            SELECT COUNT(*) FROM expired
            "#,
        )
        .bind(account_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| write_error(e, "purge expired tokens"))?;

        Ok(purged.0 as u64)
    }
}

#[async_trait]
impl EntityStore for PgStore {
    async fn list_entities(&self, limit: Option<usize>) -> Result<Vec<Entity>> {
        // LIMIT NULL means no limit in PostgreSQL
        let rows: Vec<EntityRow> = sqlx::query_as(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities ORDER BY views ASC, id ASC LIMIT $1"
        ))
        .bind(limit.map(|l| l as i64))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| read_error(e, "list entities"))?;

        Ok(rows.into_iter().map(Entity::from).collect())
    }

    async fn get_entity(&self, id: EntityId) -> Result<Option<Entity>> {
        let row: Option<EntityRow> =
            sqlx::query_as(&format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| read_error(e, "get entity"))?;

        Ok(row.map(Entity::from))
    }

    async fn create_entity(&self, entity: NewEntity) -> Result<Entity> {
        let row: EntityRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO entities (name, link, views, author_id)
            VALUES ($1, $2, $3, $4)
            RETURNING {ENTITY_COLUMNS}
            "#
        ))
        .bind(&entity.name)
        .bind(&entity.link)
        .bind(entity.views)
        .bind(entity.author_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| write_error(e, "create entity"))?;

        Ok(row.into())
    }

    async fn update_entity(&self, id: EntityId, changes: &EntityChanges) -> Result<Entity> {
        let row: Option<EntityRow> = sqlx::query_as(&format!(
            r#"
            UPDATE entities SET
                name = COALESCE($2, name),
                link = COALESCE($3, link),
                views = COALESCE($4, views),
                updated = NOW()
            WHERE id = $1
            RETURNING {ENTITY_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&changes.name)
        .bind(&changes.link)
        .bind(changes.views)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| write_error(e, "update entity"))?;

        row.map(Entity::from)
            .ok_or_else(|| PorticoError::NotFound(format!("entity {id}")))
    }

    async fn delete_entity(&self, id: EntityId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM entities WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| write_error(e, "delete entity"))?;

        Ok(result.rows_affected() > 0)
    }
}
