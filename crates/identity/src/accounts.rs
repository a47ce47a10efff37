//! Accounts and the session store.

use chrono::{DateTime, Duration, Utc};
use leadforge_config::AuthConfig;
use leadforge_database::{parse_timestamp, timestamp};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool, Transaction};
use thiserror::Error;
use tracing::{debug, info};

use crate::password::{hash_password, verify_password};
use crate::quota::Plan;
use crate::validation::{
    validate_display_name, validate_email, validate_password, validate_username, ValidationError,
};
use crate::{generate_secret, hash_secret, new_public_id, ttl_from_seconds};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("user already exists")]
    UserExists,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("session not found")]
    SessionNotFound,
    #[error("session expired")]
    SessionExpired,
    #[error("invalid session token")]
    InvalidSession,
    #[error("user not found")]
    UserNotFound,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("password hashing failed: {0}")]
    PasswordHash(#[from] argon2::password_hash::Error),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(skip_serializing)]
    pub id: i64,
    pub public_id: String,
    pub email: String,
    pub username: String,
    pub display_name: String,
    pub email_verified: bool,
    pub plan: String,
}

impl User {
    pub(crate) const COLUMNS: &'static str =
        "id, public_id, email, username, display_name, email_verified, plan";

    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            public_id: row.try_get("public_id")?,
            email: row.try_get("email")?,
            username: row.try_get("username")?,
            display_name: row.try_get("display_name")?,
            email_verified: row.try_get("email_verified")?,
            plan: row.try_get("plan")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AuthSession {
    pub token: String,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
}

/// Registration input, validated before anything touches the store.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub username: String,
    pub display_name: String,
}

#[derive(Clone)]
pub struct Authenticator {
    pool: SqlitePool,
    session_ttl: Duration,
}

impl Authenticator {
    pub fn new(pool: SqlitePool, config: &AuthConfig) -> Self {
        Self {
            pool,
            session_ttl: ttl_from_seconds(config.session_ttl_seconds),
        }
    }

    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    pub async fn register(&self, account: NewAccount) -> Result<User, AuthError> {
        let email = validate_email(&account.email)?;
        let username = validate_username(&account.username)?;
        let display_name = validate_display_name(&account.display_name)?;
        validate_password(&account.password)?;

        let existing = sqlx::query("SELECT id FROM users WHERE email = ? OR username = ?")
            .bind(&email)
            .bind(&username)
            .fetch_optional(&self.pool)
            .await?;

        if existing.is_some() {
            return Err(AuthError::UserExists);
        }

        let password_hash = hash_password(&account.password)?;

        // The unique indexes still decide a race between two registrations.
        let mut tx = self.pool.begin().await?;
        let user = insert_user(&mut tx, &email, &username, &display_name, &password_hash).await?;

        tx.commit().await?;

        info!(user = %user.public_id, "registered account");
        Ok(user)
    }

    pub async fn login_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(User, AuthSession), AuthError> {
        let email = validate_email(email).map_err(|_| AuthError::InvalidCredentials)?;

        let row = sqlx::query(&format!(
            "SELECT {}, password_hash FROM users WHERE email = ?",
            User::COLUMNS
        ))
        .bind(&email)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Err(AuthError::InvalidCredentials);
        };

        let stored_hash: String = row.try_get("password_hash")?;
        if !verify_password(password, &stored_hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        let user = User::from_row(&row)?;
        let session = self.issue_session(user.id).await?;
        debug!(user = %user.public_id, "password login succeeded");

        Ok((user, session))
    }

    /// Resolve a raw session token to its user. Fails closed on anything
    /// unknown, expired or unparsable.
    pub async fn authenticate_token(&self, token: &str) -> Result<(User, AuthSession), AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::InvalidSession);
        }

        let token_hash = hash_secret(token);
        let row = sqlx::query("SELECT user_id, expires_at FROM sessions WHERE token_hash = ?")
            .bind(&token_hash)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Err(AuthError::SessionNotFound);
        };

        let user_id: i64 = row.try_get("user_id")?;
        let expires_at: String = row.try_get("expires_at")?;
        let expires_at = parse_timestamp(&expires_at).map_err(|_| AuthError::InvalidSession)?;

        if expires_at <= Utc::now() {
            sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
                .bind(&token_hash)
                .execute(&self.pool)
                .await?;
            return Err(AuthError::SessionExpired);
        }

        let user = self
            .fetch_user(user_id)
            .await?
            .ok_or(AuthError::InvalidSession)?;
        let session = AuthSession {
            token: token.to_owned(),
            user_id,
            expires_at,
        };

        Ok((user, session))
    }

    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
            .bind(hash_secret(token.trim()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn user_profile(&self, user_id: i64) -> Result<User, AuthError> {
        self.fetch_user(user_id).await?.ok_or(AuthError::UserNotFound)
    }

    /// Move an account to another plan. Plan names come from the billing side.
    pub async fn assign_plan(&self, user_id: i64, plan: Plan) -> Result<(), AuthError> {
        let result = sqlx::query("UPDATE users SET plan = ?, updated_at = ? WHERE id = ?")
            .bind(plan.as_str())
            .bind(timestamp(Utc::now()))
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::UserNotFound);
        }
        info!(user_id, plan = %plan, "assigned plan");
        Ok(())
    }

    async fn fetch_user(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", User::COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(User::from_row).transpose()
    }

    async fn issue_session(&self, user_id: i64) -> Result<AuthSession, AuthError> {
        let token = generate_secret();
        let now = Utc::now();
        let expires_at = now + self.session_ttl;

        sqlx::query(
            "INSERT INTO sessions (token_hash, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(hash_secret(&token))
        .bind(user_id)
        .bind(timestamp(now))
        .bind(timestamp(expires_at))
        .execute(&self.pool)
        .await?;

        Ok(AuthSession {
            token,
            user_id,
            expires_at,
        })
    }
}

async fn insert_user(
    tx: &mut Transaction<'_, sqlx::Sqlite>,
    email: &str,
    username: &str,
    display_name: &str,
    password_hash: &str,
) -> Result<User, AuthError> {
    let now = timestamp(Utc::now());
    let public_id = new_public_id();

    let result = sqlx::query(
        "INSERT INTO users (public_id, email, username, display_name, password_hash, email_verified, plan, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, 0, ?, ?, ?)",
    )
    .bind(&public_id)
    .bind(email)
    .bind(username)
    .bind(display_name)
    .bind(password_hash)
    .bind(Plan::Free.as_str())
    .bind(&now)
    .bind(&now)
    .execute(&mut **tx)
    .await
    .map_err(|error| match error {
        sqlx::Error::Database(db) if db.is_unique_violation() => AuthError::UserExists,
        other => AuthError::Database(other),
    })?;

    Ok(User {
        id: result.last_insert_rowid(),
        public_id,
        email: email.to_owned(),
        username: username.to_owned(),
        display_name: display_name.to_owned(),
        email_verified: false,
        plan: Plan::Free.as_str().to_owned(),
    })
}
