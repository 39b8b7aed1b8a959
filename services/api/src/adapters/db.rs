//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `AccountService` port from the `core` crate. It persists operators,
//! their browser sessions, and the secret sync key in SQLite using `sqlx`.

use async_trait::async_trait;
use attendance_core::{AccountService, PortError, PortResult, Role, User, UserCredentials};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

const SYNC_KEY_SETTING: &str = "sync_key";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `AccountService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: SqlitePool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    email: String,
    hashed_password: String,
    role: String,
}
impl UserRecord {
    fn to_domain(self) -> PortResult<UserCredentials> {
        let role = Role::parse(&self.role)
            .ok_or_else(|| PortError::Unexpected(format!("Unknown role '{}' for {}", self.role, self.email)))?;
        Ok(UserCredentials {
            email: self.email,
            role,
            hashed_password: self.hashed_password,
        })
    }
}

#[derive(FromRow)]
struct AuthSessionRecord {
    email: String,
    role: String,
    expires_at: DateTime<Utc>,
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// `AccountService` Trait Implementation
//=========================================================================================

#[async_trait]
impl AccountService for DbAdapter {
    async fn create_user(&self, email: &str, hashed_password: &str) -> PortResult<User> {
        // One statement, so concurrent first sign-ups cannot both see an empty table.
        let role = sqlx::query_scalar::<_, String>(
            "INSERT INTO users (email, hashed_password, role)
             SELECT ?1, ?2, CASE WHEN EXISTS (SELECT 1 FROM users) THEN 'user' ELSE 'superuser' END
             RETURNING role",
        )
        .bind(email)
        .bind(hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                PortError::Conflict(format!("User {} already exists", email))
            }
            _ => unexpected(e),
        })?;

        let role = Role::parse(&role)
            .ok_or_else(|| PortError::Unexpected(format!("Unknown role '{}' for {}", role, email)))?;
        Ok(User {
            email: email.to_string(),
            role,
        })
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT email, hashed_password, role FROM users WHERE email = ?1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", email)),
            _ => unexpected(e),
        })?;
        record.to_domain()
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        email: &str,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, email, expires_at) VALUES (?1, ?2, ?3)")
            .bind(session_id)
            .bind(email)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<User> {
        let record = sqlx::query_as::<_, AuthSessionRecord>(
            "SELECT u.email, u.role, s.expires_at
             FROM auth_sessions s JOIN users u ON u.email = s.email
             WHERE s.id = ?1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or(PortError::Unauthorized)?;

        if record.expires_at <= Utc::now() {
            self.delete_auth_session(session_id).await?;
            return Err(PortError::Unauthorized);
        }

        let role = Role::parse(&record.role)
            .ok_or_else(|| PortError::Unexpected(format!("Unknown role '{}'", record.role)))?;
        Ok(User {
            email: record.email,
            role,
        })
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = ?1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn get_sync_key(&self) -> PortResult<Option<String>> {
        sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = ?1")
            .bind(SYNC_KEY_SETTING)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)
    }

    async fn set_sync_key(&self, key: &str) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT (key) DO UPDATE SET value = excluded.value",
        )
        .bind(SYNC_KEY_SETTING)
        .bind(key)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }
}
