//! PostgreSQL credential store
//!
//! Stores user accounts and their current refresh credential using SQLx.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{CredentialStore, NewPrincipal, Principal, Result, SmrError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id            UUID PRIMARY KEY,
    username      TEXT NOT NULL,
    email         TEXT NOT NULL UNIQUE,
    accountname   TEXT NOT NULL UNIQUE,
    intro         TEXT NOT NULL DEFAULT '',
    image         TEXT NOT NULL,
    role          TEXT NOT NULL DEFAULT 'USER',
    password_hash TEXT NOT NULL,
    refresh_token TEXT,
    created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at    TIMESTAMPTZ
)
"#;

const SELECT_COLUMNS: &str = "id, username, email, accountname, intro, image, role, \
     password_hash, refresh_token, created_at, updated_at";

/// PostgreSQL credential store
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    /// Create a new store connection
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| SmrError::DatabaseError(format!("PostgreSQL connection failed: {e}")))?;

        Ok(Self { pool })
    }

    /// Create the `users` table if it does not exist yet
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| SmrError::DatabaseError(format!("Failed to create schema: {e}")))?;
        Ok(())
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<Principal>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM users WHERE {column} = $1");
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SmrError::DatabaseError(format!("Failed to fetch user: {e}")))?;

        Ok(row.map(Principal::from))
    }
}

/// User row from database
#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    accountname: String,
    intro: String,
    image: String,
    role: String,
    password_hash: String,
    refresh_token: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl From<UserRow> for Principal {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            email: row.email,
            accountname: row.accountname,
            intro: row.intro,
            image: row.image,
            role: row.role.parse().unwrap_or_default(),
            password_hash: row.password_hash,
            refresh_token: row.refresh_token,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn map_insert_error(e: sqlx::Error) -> SmrError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            SmrError::Conflict("email or account name already registered".to_string())
        }
        _ => SmrError::DatabaseError(format!("Failed to create user: {e}")),
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Principal>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM users WHERE id = $1");
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SmrError::DatabaseError(format!("Failed to fetch user: {e}")))?;

        Ok(row.map(Principal::from))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>> {
        self.find_one("email", email).await
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool> {
        let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| SmrError::DatabaseError(format!("Failed to check email: {e}")))?;

        Ok(exists.0)
    }

    async fn exists_by_accountname(&self, accountname: &str) -> Result<bool> {
        let exists: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE accountname = $1)")
                .bind(accountname)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    SmrError::DatabaseError(format!("Failed to check account name: {e}"))
                })?;

        Ok(exists.0)
    }

    async fn create(&self, principal: NewPrincipal) -> Result<Principal> {
        let principal = principal.into_principal();

        let sql = format!(
            r#"
            INSERT INTO users (
                id, username, email, accountname, intro, image,
                role, password_hash, refresh_token, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NULL, $9)
            RETURNING {SELECT_COLUMNS}
            "#
        );
        let row: UserRow = sqlx::query_as(&sql)
            .bind(principal.id)
            .bind(&principal.username)
            .bind(&principal.email)
            .bind(&principal.accountname)
            .bind(&principal.intro)
            .bind(&principal.image)
            .bind(principal.role.as_str())
            .bind(&principal.password_hash)
            .bind(principal.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(map_insert_error)?;

        Ok(row.into())
    }

    async fn set_refresh_token(&self, email: &str, token: Option<&str>) -> Result<bool> {
        let result =
            sqlx::query("UPDATE users SET refresh_token = $2, updated_at = NOW() WHERE email = $1")
                .bind(email)
                .bind(token)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    SmrError::DatabaseError(format!("Failed to update refresh token: {e}"))
                })?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| SmrError::DatabaseError(format!("Ping failed: {e}")))?;
        Ok(())
    }

    fn name(&self) -> &str {
        "postgres"
    }
}
