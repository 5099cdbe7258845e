//! Postgres-backed identity store.
//!
//! ## Schema
//!
//! See [`SCHEMA`]: `users`, `roles` and `user_roles`, with unique constraints
//! on `users.username` and `roles.name`, a `CHECK` enforcing the `ROLE_`
//! prefix, and `ON DELETE CASCADE` on both association foreign keys.
//!
//! ## Create-or-fetch
//!
//! Inserts use `ON CONFLICT DO NOTHING` followed by a fetch of the canonical
//! row, so concurrent creators of the same key converge on one row.
//!
//! ## Error Mapping
//!
//! | SQLx Error | StoreError |
//! |------------|------------|
//! | `Io`, `Tls`, `PoolTimedOut`, `PoolClosed`, `WorkerCrashed` | `Unavailable` |
//! | Database `23514` (check violation) | `CorruptRow` |
//! | Anything else | `Unavailable` (with operation context) |

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use rolegate_auth::{NewUser, RoleName, RoleRecord, SecretHash, UserRecord, Username};
use rolegate_core::{Entity, RoleId, UserId};

use super::r#trait::{IdentityStore, StoreError, UpsertOutcome};

/// DDL for the identity tables. Idempotent.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id          UUID PRIMARY KEY,
    username    VARCHAR(50) NOT NULL UNIQUE,
    secret_hash TEXT NOT NULL,
    enabled     BOOLEAN NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS roles (
    id   UUID PRIMARY KEY,
    name VARCHAR(50) NOT NULL UNIQUE CHECK (name LIKE 'ROLE\_%')
);

CREATE TABLE IF NOT EXISTS user_roles (
    user_id UUID NOT NULL REFERENCES users (id) ON DELETE CASCADE,
    role_id UUID NOT NULL REFERENCES roles (id) ON DELETE CASCADE,
    PRIMARY KEY (user_id, role_id)
);
"#;

/// Postgres-backed identity store.
///
/// ## Thread Safety
///
/// Uses SQLx connection pool which is thread-safe (Arc + Send + Sync).
/// Multi-row writes run inside a single transaction.
#[derive(Debug, Clone)]
pub struct PostgresIdentityStore {
    pool: Arc<PgPool>,
}

impl PostgresIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the identity tables if they do not exist.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    pub async fn fetch_user(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, username, secret_hash, enabled, created_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_user", e))?;

        row.map(|r| user_from_row(&r)).transpose()
    }

    #[instrument(skip(self), err)]
    pub async fn fetch_role(&self, name: &str) -> Result<Option<RoleRecord>, StoreError> {
        let row = sqlx::query("SELECT id, name FROM roles WHERE name = $1")
            .bind(name)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_role", e))?;

        row.map(|r| role_from_row(&r)).transpose()
    }

    #[instrument(skip(self), fields(role = %name), err)]
    pub async fn ensure_role(&self, name: &RoleName) -> Result<RoleRecord, StoreError> {
        let mut tx = self.begin().await?;
        let role = ensure_role_in(&mut tx, name).await?;
        commit(tx).await?;
        Ok(role)
    }

    #[instrument(skip(self, user), fields(username = %user.username, roles = user.roles.len()), err)]
    pub async fn upsert_user(&self, user: NewUser) -> Result<UpsertOutcome, StoreError> {
        let mut tx = self.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO users (id, username, secret_hash, enabled, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (username) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(Uuid::from(UserId::new()))
        .bind(user.username.as_str())
        .bind(user.secret_hash.expose())
        .bind(user.enabled)
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_user", e))?;
        let created = inserted.is_some();

        // Existing rows are fetched, never updated: seeding must not clobber
        // a changed secret or enabled flag.
        let row = sqlx::query(
            r#"
            SELECT id, username, secret_hash, enabled, created_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(user.username.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("fetch_user", e))?;
        let record = user_from_row(&row)?;

        let mut roles: Vec<&RoleName> = user.roles.iter().collect();
        roles.sort();
        roles.dedup();

        let mut roles_added = Vec::new();
        for name in roles {
            let role = ensure_role_in(&mut tx, name).await?;
            if attach_in(&mut tx, record.id(), role.id()).await? {
                roles_added.push(role.name);
            }
        }

        commit(tx).await?;

        Ok(UpsertOutcome {
            user: record,
            created,
            roles_added,
        })
    }

    #[instrument(skip(self), err)]
    pub async fn fetch_roles_of(&self, user_id: UserId) -> Result<Vec<RoleRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT r.id, r.name
            FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id
            WHERE ur.user_id = $1
            ORDER BY r.name ASC
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_roles_of", e))?;

        rows.iter().map(role_from_row).collect()
    }

    #[instrument(skip(self), fields(username = %username, role = %role), err)]
    pub async fn attach_role(&self, username: &Username, role: &RoleName) -> Result<bool, StoreError> {
        let mut tx = self.begin().await?;

        let user_id: Option<Uuid> = sqlx::query("SELECT id FROM users WHERE username = $1")
            .bind(username.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("fetch_user_id", e))?
            .map(|r| r.try_get("id"))
            .transpose()
            .map_err(|e| map_sqlx_error("decode_user_id", e))?;

        let Some(user_id) = user_id else {
            rollback(tx).await?;
            return Err(StoreError::UnknownUser(username.to_string()));
        };

        let role = ensure_role_in(&mut tx, role).await?;
        let attached = attach_in(&mut tx, UserId::from_uuid(user_id), role.id()).await?;
        commit(tx).await?;
        Ok(attached)
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }

    /// Run an async store call from the synchronous trait surface.
    ///
    /// Requires a multi-threaded tokio runtime on the calling thread (or a
    /// `spawn_blocking` thread belonging to one).
    fn block_on<F, T>(&self, fut: F) -> Result<T, StoreError>
    where
        F: std::future::Future<Output = Result<T, StoreError>>,
    {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            StoreError::Unavailable(
                "PostgresIdentityStore requires a tokio runtime on the calling thread".to_string(),
            )
        })?;
        tokio::task::block_in_place(|| handle.block_on(fut))
    }
}

impl IdentityStore for PostgresIdentityStore {
    fn find_user_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        self.block_on(self.fetch_user(username))
    }

    fn find_role_by_name(&self, name: &str) -> Result<Option<RoleRecord>, StoreError> {
        self.block_on(self.fetch_role(name))
    }

    fn create_role_if_absent(&self, name: &str) -> Result<RoleRecord, StoreError> {
        let name = RoleName::parse(name.to_string())?;
        self.block_on(self.ensure_role(&name))
    }

    fn upsert_user_with_roles(&self, user: NewUser) -> Result<UpsertOutcome, StoreError> {
        self.block_on(self.upsert_user(user))
    }

    fn roles_of(&self, user_id: UserId) -> Result<Vec<RoleRecord>, StoreError> {
        self.block_on(self.fetch_roles_of(user_id))
    }

    fn assign_role(&self, username: &Username, role: &RoleName) -> Result<bool, StoreError> {
        self.block_on(self.attach_role(username, role))
    }
}

async fn ensure_role_in(
    tx: &mut Transaction<'static, Postgres>,
    name: &RoleName,
) -> Result<RoleRecord, StoreError> {
    sqlx::query("INSERT INTO roles (id, name) VALUES ($1, $2) ON CONFLICT (name) DO NOTHING")
        .bind(Uuid::from(RoleId::new()))
        .bind(name.as_str())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_role", e))?;

    let row = sqlx::query("SELECT id, name FROM roles WHERE name = $1")
        .bind(name.as_str())
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("fetch_role", e))?;

    role_from_row(&row)
}

/// Returns whether a new association row was written.
async fn attach_in(
    tx: &mut Transaction<'static, Postgres>,
    user_id: UserId,
    role_id: RoleId,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(user_id.as_uuid())
    .bind(role_id.as_uuid())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("attach_role", e))?;

    Ok(result.rows_affected() == 1)
}

async fn commit(tx: Transaction<'static, Postgres>) -> Result<(), StoreError> {
    tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
}

async fn rollback(tx: Transaction<'static, Postgres>) -> Result<(), StoreError> {
    tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))
}

fn user_from_row(row: &sqlx::postgres::PgRow) -> Result<UserRecord, StoreError> {
    let decode = |e: sqlx::Error| map_sqlx_error("decode_user", e);

    let id: Uuid = row.try_get("id").map_err(decode)?;
    let username: String = row.try_get("username").map_err(decode)?;
    let secret_hash: String = row.try_get("secret_hash").map_err(decode)?;
    let enabled: bool = row.try_get("enabled").map_err(decode)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(decode)?;

    let username = Username::parse(username).map_err(|e| StoreError::CorruptRow {
        table: "users",
        message: e.to_string(),
    })?;

    Ok(UserRecord {
        id: UserId::from_uuid(id),
        username,
        secret_hash: SecretHash::from_stored(secret_hash),
        enabled,
        created_at,
    })
}

fn role_from_row(row: &sqlx::postgres::PgRow) -> Result<RoleRecord, StoreError> {
    let decode = |e: sqlx::Error| map_sqlx_error("decode_role", e);

    let id: Uuid = row.try_get("id").map_err(decode)?;
    let name: String = row.try_get("name").map_err(decode)?;
    let name = RoleName::parse(name).map_err(|e| StoreError::CorruptRow {
        table: "roles",
        message: e.to_string(),
    })?;

    Ok(RoleRecord {
        id: RoleId::from_uuid(id),
        name,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            map_database_error(operation, db_err.code().as_deref(), db_err.message())
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("timed out acquiring a connection in {operation}"))
        }
        other => StoreError::Unavailable(format!("sqlx error in {operation}: {other}")),
    }
}

/// Classify a Postgres error by SQLSTATE.
///
/// Class 22 (data exception) covers values the server refuses outright,
/// such as `22001` for a string longer than its `VARCHAR` column.
fn map_database_error(operation: &str, code: Option<&str>, message: &str) -> StoreError {
    match code {
        Some("23514") => StoreError::CorruptRow {
            table: "identity",
            message: format!("check constraint violated in {operation}: {message}"),
        },
        Some(code) if code.starts_with("22") => StoreError::Rejected {
            operation: operation.to_string(),
            message: format!("{message} (sqlstate {code})"),
        },
        _ => StoreError::Unavailable(format!("database error in {operation}: {message}")),
    }
}
