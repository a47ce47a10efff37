//! Single-use, expiring security tokens.
//!
//! Raw token values leave this module exactly once, inside [`IssuedToken`].
//! The store only ever sees their SHA-256 digest. Issuing a token deletes
//! every outstanding token of the same purpose for the same subject in the
//! same transaction, so at most one is ever honoured.
//!
//! Consumption is a conditional `UPDATE ... RETURNING` that only matches an
//! unconsumed, unexpired row. It runs inside the transaction that applies the
//! purpose's side effect, so two concurrent verifications of one value cannot
//! both succeed.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use leadforge_config::AuthConfig;
use leadforge_database::{parse_timestamp, timestamp};
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::password::hash_password;
use crate::validation::normalize_email;
use crate::{generate_secret, hash_secret, ttl_from_seconds};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    PasswordReset,
    EmailVerify,
    EmailChange,
    TeamInvite,
}

impl TokenPurpose {
    pub const fn as_str(self) -> &'static str {
        match self {
            TokenPurpose::PasswordReset => "password_reset",
            TokenPurpose::EmailVerify => "email_verify",
            TokenPurpose::EmailChange => "email_change",
            TokenPurpose::TeamInvite => "team_invite",
        }
    }

    /// Invites are outstanding per (workspace owner, invitee); everything
    /// else per user.
    const fn scoped_by_email(self) -> bool {
        matches!(self, TokenPurpose::TeamInvite)
    }
}

impl fmt::Display for TokenPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("token is required")]
    MissingToken,
    #[error("email address is already in use")]
    EmailTaken,
    #[error("user not found")]
    UserNotFound,
    #[error("password hashing failed: {0}")]
    PasswordHash(#[from] argon2::password_hash::Error),
    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Lifetime of each token kind.
#[derive(Debug, Clone, Copy)]
pub struct TokenTtls {
    pub password_reset: Duration,
    pub email_verify: Duration,
    pub email_change: Duration,
    pub team_invite: Duration,
}

impl TokenTtls {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            password_reset: ttl_from_seconds(config.password_reset_ttl_seconds),
            email_verify: ttl_from_seconds(config.email_verify_ttl_seconds),
            email_change: ttl_from_seconds(config.email_change_ttl_seconds),
            team_invite: ttl_from_seconds(config.team_invite_ttl_seconds),
        }
    }

    pub fn for_purpose(&self, purpose: TokenPurpose) -> Duration {
        match purpose {
            TokenPurpose::PasswordReset => self.password_reset,
            TokenPurpose::EmailVerify => self.email_verify,
            TokenPurpose::EmailChange => self.email_change,
            TokenPurpose::TeamInvite => self.team_invite,
        }
    }
}

impl Default for TokenTtls {
    fn default() -> Self {
        Self::from_config(&AuthConfig::default())
    }
}

/// Who a token is issued for. `email` is the address the link is mailed to
/// when it differs from the account's own (pending address, invitee).
#[derive(Debug, Clone)]
pub struct TokenSubject {
    pub user_id: i64,
    pub email: Option<String>,
    pub payload: Option<Value>,
}

impl TokenSubject {
    pub fn user(user_id: i64) -> Self {
        Self {
            user_id,
            email: None,
            payload: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub purpose: TokenPurpose,
    pub user_id: i64,
    /// Address the link should be sent to.
    pub recipient: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct VerifiedToken {
    pub purpose: TokenPurpose,
    pub user_id: i64,
    pub email: Option<String>,
    pub payload: Option<Value>,
}

#[derive(Debug, Clone)]
pub enum ResendOutcome {
    Issued(IssuedToken),
    AlreadyVerified,
    UnknownAccount,
}

#[derive(Debug, Clone)]
pub struct VerifiedEmail {
    pub user_id: i64,
    pub email: String,
    pub display_name: String,
}

#[derive(Debug, Clone)]
pub struct EmailChange {
    pub user_id: i64,
    pub previous_email: String,
    pub new_email: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitePreview {
    pub email: String,
    pub owner_name: String,
    pub owner_username: String,
    pub inviter_name: String,
    pub expired: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptedInvite {
    pub owner_id: i64,
    pub member_id: i64,
}

#[derive(Clone)]
pub struct TokenService {
    pool: SqlitePool,
    ttls: TokenTtls,
}

impl TokenService {
    pub fn new(pool: SqlitePool, ttls: TokenTtls) -> Self {
        Self { pool, ttls }
    }

    pub fn ttls(&self) -> &TokenTtls {
        &self.ttls
    }

    /// Issue a token, invalidating the subject's outstanding ones of the same
    /// purpose. The recipient defaults to the account's email.
    pub async fn issue(
        &self,
        purpose: TokenPurpose,
        subject: TokenSubject,
    ) -> Result<IssuedToken, TokenError> {
        let account_email: Option<String> =
            sqlx::query_scalar("SELECT email FROM users WHERE id = ?")
                .bind(subject.user_id)
                .fetch_optional(&self.pool)
                .await?;
        let Some(account_email) = account_email else {
            return Err(TokenError::UserNotFound);
        };

        let mut tx = self.pool.begin().await?;
        let issued = self
            .insert_token(&mut tx, purpose, &subject, account_email)
            .await?;
        tx.commit().await?;

        info!(user_id = issued.user_id, purpose = %purpose, "issued security token");
        Ok(issued)
    }

    /// Consume a token that has no side effect beyond its own consumption.
    pub async fn verify(
        &self,
        purpose: TokenPurpose,
        token: &str,
    ) -> Result<Option<VerifiedToken>, TokenError> {
        ensure_present(token)?;

        let mut tx = self.pool.begin().await?;
        let verified = consume(&mut tx, purpose, token).await?;
        tx.commit().await?;

        Ok(verified)
    }

    /// `Ok(None)` for unknown addresses: nothing is persisted and the caller
    /// must answer exactly as it would on success.
    pub async fn request_password_reset(
        &self,
        email: &str,
    ) -> Result<Option<IssuedToken>, TokenError> {
        let email = normalize_email(email);
        let user_id: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
            .bind(&email)
            .fetch_optional(&self.pool)
            .await?;

        match user_id {
            Some(user_id) => self
                .issue(TokenPurpose::PasswordReset, TokenSubject::user(user_id))
                .await
                .map(Some),
            None => {
                debug!("password reset requested for unknown address");
                Ok(None)
            }
        }
    }

    pub async fn issue_email_verification(&self, user_id: i64) -> Result<IssuedToken, TokenError> {
        self.issue(TokenPurpose::EmailVerify, TokenSubject::user(user_id))
            .await
    }

    pub async fn resend_verification(&self, email: &str) -> Result<ResendOutcome, TokenError> {
        let email = normalize_email(email);
        let row = sqlx::query("SELECT id, email_verified FROM users WHERE email = ?")
            .bind(&email)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(ResendOutcome::UnknownAccount);
        };
        if row.try_get::<bool, _>("email_verified")? {
            return Ok(ResendOutcome::AlreadyVerified);
        }

        let issued = self.issue_email_verification(row.try_get("id")?).await?;
        Ok(ResendOutcome::Issued(issued))
    }

    /// Start moving an account to `new_email`. The link goes to the new
    /// address; the account keeps its current one until confirmation.
    pub async fn request_email_change(
        &self,
        user_id: i64,
        new_email: &str,
    ) -> Result<IssuedToken, TokenError> {
        let new_email = normalize_email(new_email);

        let taken: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
            .bind(&new_email)
            .fetch_optional(&self.pool)
            .await?;
        if taken.is_some() {
            return Err(TokenError::EmailTaken);
        }

        self.issue(
            TokenPurpose::EmailChange,
            TokenSubject {
                user_id,
                email: Some(new_email),
                payload: None,
            },
        )
        .await
    }

    /// Invite `invitee_email` into the workspace the inviter belongs to. A
    /// member inviting on behalf of a team invites into the owner's workspace.
    pub async fn issue_team_invite(
        &self,
        inviter_id: i64,
        invitee_email: &str,
    ) -> Result<IssuedToken, TokenError> {
        let owner_id: Option<i64> =
            sqlx::query_scalar("SELECT owner_id FROM team_members WHERE member_id = ? LIMIT 1")
                .bind(inviter_id)
                .fetch_optional(&self.pool)
                .await?;

        self.issue(
            TokenPurpose::TeamInvite,
            TokenSubject {
                user_id: owner_id.unwrap_or(inviter_id),
                email: Some(normalize_email(invitee_email)),
                payload: Some(json!({ "inviterId": inviter_id })),
            },
        )
        .await
    }

    /// Consume an email-verify token and mark the address verified.
    pub async fn verify_email(&self, token: &str) -> Result<Option<VerifiedEmail>, TokenError> {
        ensure_present(token)?;

        let mut tx = self.pool.begin().await?;
        let Some(verified) = consume(&mut tx, TokenPurpose::EmailVerify, token).await? else {
            return Ok(None);
        };

        let row = sqlx::query(
            "UPDATE users SET email_verified = 1, updated_at = ? WHERE id = ?
             RETURNING email, display_name",
        )
        .bind(timestamp(Utc::now()))
        .bind(verified.user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let email = VerifiedEmail {
            user_id: verified.user_id,
            email: row.try_get("email")?,
            display_name: row.try_get("display_name")?,
        };
        tx.commit().await?;

        info!(user_id = email.user_id, "email address verified");
        Ok(Some(email))
    }

    /// Consume a password-reset token, store the new password and revoke
    /// every session of the account.
    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<Option<i64>, TokenError> {
        ensure_present(token)?;
        let password_hash = hash_password(new_password)?;

        let mut tx = self.pool.begin().await?;
        let Some(verified) = consume(&mut tx, TokenPurpose::PasswordReset, token).await? else {
            return Ok(None);
        };

        sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(&password_hash)
            .bind(timestamp(Utc::now()))
            .bind(verified.user_id)
            .execute(&mut *tx)
            .await?;

        let revoked = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(verified.user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        info!(user_id = verified.user_id, revoked, "password reset completed");
        Ok(Some(verified.user_id))
    }

    /// Consume an email-change token and rotate the account's address. If the
    /// address was claimed in the meantime nothing changes and the token
    /// stays unconsumed.
    pub async fn confirm_email_change(&self, token: &str) -> Result<Option<EmailChange>, TokenError> {
        ensure_present(token)?;

        let mut tx = self.pool.begin().await?;
        let Some(verified) = consume(&mut tx, TokenPurpose::EmailChange, token).await? else {
            return Ok(None);
        };
        let Some(new_email) = verified.email else {
            warn!(user_id = verified.user_id, "email change token without pending address");
            return Ok(None);
        };

        let previous_email: Option<String> =
            sqlx::query_scalar("SELECT email FROM users WHERE id = ?")
                .bind(verified.user_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(previous_email) = previous_email else {
            return Ok(None);
        };

        let updated = sqlx::query(
            "UPDATE users SET email = ?, email_verified = 1, updated_at = ? WHERE id = ?",
        )
        .bind(&new_email)
        .bind(timestamp(Utc::now()))
        .bind(verified.user_id)
        .execute(&mut *tx)
        .await;

        match updated {
            Ok(_) => {}
            Err(sqlx::Error::Database(error)) if error.is_unique_violation() => {
                debug!(user_id = verified.user_id, "pending email was claimed by another account");
                return Ok(None);
            }
            Err(error) => return Err(error.into()),
        }

        tx.commit().await?;

        info!(user_id = verified.user_id, "email address changed");
        Ok(Some(EmailChange {
            user_id: verified.user_id,
            previous_email,
            new_email,
        }))
    }

    /// Read-only view of an invite for preview screens. Expired invites are
    /// still returned, flagged; consumed or unknown ones are not.
    pub async fn peek_invite(&self, token: &str) -> Result<Option<InvitePreview>, TokenError> {
        ensure_present(token)?;

        let row = sqlx::query(
            "SELECT t.email, t.payload, t.expires_at, o.display_name AS owner_name, o.username AS owner_username
             FROM security_tokens t
             JOIN users o ON o.id = t.user_id
             WHERE t.token_hash = ? AND t.purpose = ? AND t.consumed_at IS NULL",
        )
        .bind(hash_secret(token))
        .bind(TokenPurpose::TeamInvite.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let owner_name: String = row.try_get("owner_name")?;
        let payload: Option<String> = row.try_get("payload")?;
        let inviter_id = payload
            .as_deref()
            .map(serde_json::from_str::<Value>)
            .transpose()?
            .and_then(|payload| payload.get("inviterId").and_then(Value::as_i64));

        let inviter_name = match inviter_id {
            Some(id) => sqlx::query_scalar::<_, String>("SELECT display_name FROM users WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .unwrap_or_else(|| owner_name.clone()),
            None => owner_name.clone(),
        };

        let expires_at: String = row.try_get("expires_at")?;
        let expired = parse_timestamp(&expires_at)
            .map(|expires_at| expires_at < Utc::now())
            .unwrap_or(true);

        Ok(Some(InvitePreview {
            email: row.try_get::<Option<String>, _>("email")?.unwrap_or_default(),
            owner_name,
            owner_username: row.try_get("owner_username")?,
            inviter_name,
            expired,
        }))
    }

    /// Consume an invite and add the accepting user to the owner's team. The
    /// accepting account must hold the invited address; otherwise the token
    /// is left untouched.
    pub async fn accept_invite(
        &self,
        token: &str,
        user_id: i64,
        user_email: &str,
    ) -> Result<Option<AcceptedInvite>, TokenError> {
        ensure_present(token)?;

        let mut tx = self.pool.begin().await?;
        let Some(verified) = consume(&mut tx, TokenPurpose::TeamInvite, token).await? else {
            return Ok(None);
        };

        let owner_id = verified.user_id;
        if verified.email.as_deref() != Some(normalize_email(user_email).as_str())
            || owner_id == user_id
        {
            debug!(user_id, owner_id, "invite presented by an account it was not issued to");
            return Ok(None);
        }

        sqlx::query(
            "INSERT INTO team_members (owner_id, member_id, role, joined_at) VALUES (?, ?, 'member', ?)
             ON CONFLICT (owner_id, member_id) DO NOTHING",
        )
        .bind(owner_id)
        .bind(user_id)
        .bind(timestamp(Utc::now()))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(owner_id, member_id = user_id, "team invite accepted");
        Ok(Some(AcceptedInvite {
            owner_id,
            member_id: user_id,
        }))
    }

    /// Delete consumed and expired rows. Returns how many were removed.
    pub async fn purge_expired(&self) -> Result<u64, TokenError> {
        let removed = sqlx::query(
            "DELETE FROM security_tokens WHERE consumed_at IS NOT NULL OR expires_at <= ?",
        )
        .bind(timestamp(Utc::now()))
        .execute(&self.pool)
        .await?
        .rows_affected();

        info!(removed, "purged spent security tokens");
        Ok(removed)
    }

    async fn insert_token(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        purpose: TokenPurpose,
        subject: &TokenSubject,
        account_email: String,
    ) -> Result<IssuedToken, TokenError> {
        let superseded = if purpose.scoped_by_email() {
            sqlx::query(
                "DELETE FROM security_tokens
                 WHERE user_id = ? AND purpose = ? AND email IS ? AND consumed_at IS NULL",
            )
            .bind(subject.user_id)
            .bind(purpose.as_str())
            .bind(&subject.email)
            .execute(&mut **tx)
            .await?
        } else {
            sqlx::query(
                "DELETE FROM security_tokens WHERE user_id = ? AND purpose = ? AND consumed_at IS NULL",
            )
            .bind(subject.user_id)
            .bind(purpose.as_str())
            .execute(&mut **tx)
            .await?
        };

        let superseded = superseded.rows_affected();
        if superseded > 0 {
            debug!(user_id = subject.user_id, purpose = %purpose, superseded, "invalidated outstanding tokens");
        }

        let token = generate_secret();
        let now = Utc::now();
        let expires_at = now + self.ttls.for_purpose(purpose);
        let payload = subject
            .payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            "INSERT INTO security_tokens (token_hash, purpose, user_id, email, payload, created_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(hash_secret(&token))
        .bind(purpose.as_str())
        .bind(subject.user_id)
        .bind(&subject.email)
        .bind(payload)
        .bind(timestamp(now))
        .bind(timestamp(expires_at))
        .execute(&mut **tx)
        .await?;

        Ok(IssuedToken {
            token,
            purpose,
            user_id: subject.user_id,
            recipient: subject.email.clone().unwrap_or(account_email),
            expires_at,
        })
    }
}

fn ensure_present(token: &str) -> Result<(), TokenError> {
    if token.trim().is_empty() {
        return Err(TokenError::MissingToken);
    }
    Ok(())
}

/// Mark a live token consumed and return what it was issued for. Must run
/// inside the transaction that applies the purpose's side effect.
async fn consume(
    tx: &mut Transaction<'_, Sqlite>,
    purpose: TokenPurpose,
    token: &str,
) -> Result<Option<VerifiedToken>, TokenError> {
    let token_hash = hash_secret(token);
    let now = timestamp(Utc::now());

    let row = sqlx::query(
        "UPDATE security_tokens SET consumed_at = ?
         WHERE token_hash = ? AND purpose = ? AND consumed_at IS NULL AND expires_at > ?
         RETURNING user_id, email, payload",
    )
    .bind(&now)
    .bind(&token_hash)
    .bind(purpose.as_str())
    .bind(&now)
    .fetch_optional(&mut **tx)
    .await?;

    let Some(row) = row else {
        log_rejection(tx, purpose, &token_hash).await?;
        return Ok(None);
    };

    let payload: Option<String> = row.try_get("payload")?;
    Ok(Some(VerifiedToken {
        purpose,
        user_id: row.try_get("user_id")?,
        email: row.try_get("email")?,
        payload: payload.as_deref().map(serde_json::from_str).transpose()?,
    }))
}

async fn log_rejection(
    tx: &mut Transaction<'_, Sqlite>,
    purpose: TokenPurpose,
    token_hash: &str,
) -> Result<(), TokenError> {
    let row = sqlx::query(
        "SELECT consumed_at IS NOT NULL AS consumed FROM security_tokens WHERE token_hash = ? AND purpose = ?",
    )
    .bind(token_hash)
    .bind(purpose.as_str())
    .fetch_optional(&mut **tx)
    .await?;

    let reason = match row {
        None => "absent",
        Some(row) if row.try_get::<bool, _>("consumed")? => "consumed",
        Some(_) => "expired",
    };
    debug!(purpose = %purpose, reason, "token rejected");
    Ok(())
}
