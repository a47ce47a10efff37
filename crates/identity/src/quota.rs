//! OTP allowance per subscription plan.
//!
//! Compiled-in defaults always exist. Paid plans may carry a persisted
//! override in the `plans` table which wins when it is non-null; the free plan
//! never consults the store.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use leadforge_database::timestamp;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Pro,
    Business,
}

impl Plan {
    pub const fn as_str(self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Pro => "pro",
            Plan::Business => "business",
        }
    }

    /// Compiled-in OTP allowance for this plan.
    pub fn default_otp_limit(self) -> i64 {
        PLAN_LIMITS
            .iter()
            .find(|(plan, _)| *plan == self)
            .map(|(_, limit)| *limit)
            .unwrap_or_default()
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = QuotaError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Plan::Free),
            "pro" => Ok(Plan::Pro),
            "business" => Ok(Plan::Business),
            other => Err(QuotaError::UnknownPlan(other.to_string())),
        }
    }
}

/// OTP sends per billing period when no override is stored.
pub const PLAN_LIMITS: [(Plan, i64); 3] = [(Plan::Free, 10), (Plan::Pro, 100), (Plan::Business, 1000)];

/// Values `sync_plan_limits` writes to the store. Free is deliberately absent.
pub const CANONICAL_OTP_OVERRIDES: [(Plan, i64); 2] = [(Plan::Pro, 100), (Plan::Business, 1000)];

#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("unknown plan: {0}")]
    UnknownPlan(String),
    #[error("the free plan cannot carry an override")]
    FreePlanOverride,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct QuotaResolver {
    pool: SqlitePool,
}

impl QuotaResolver {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// OTP allowance for a plan name as stored on the user record.
    ///
    /// `Ok(None)` means no limit is known for the name; what that implies is
    /// the caller's decision.
    pub async fn resolve_otp_limit(&self, plan: &str) -> Result<Option<i64>, QuotaError> {
        let name = plan.trim().to_ascii_lowercase();
        let known = Plan::from_str(&name).ok();

        if known == Some(Plan::Free) {
            return Ok(Some(Plan::Free.default_otp_limit()));
        }

        let stored: Option<Option<i64>> =
            sqlx::query_scalar("SELECT otp_limit FROM plans WHERE name = ?")
                .bind(&name)
                .fetch_optional(&self.pool)
                .await?;

        if let Some(Some(limit)) = stored {
            debug!(plan = %name, limit, "using persisted otp override");
            return Ok(Some(limit));
        }

        Ok(known.map(Plan::default_otp_limit))
    }

    /// Set or clear the persisted override of a paid plan.
    pub async fn set_otp_override(&self, plan: Plan, limit: Option<i64>) -> Result<(), QuotaError> {
        if plan == Plan::Free {
            return Err(QuotaError::FreePlanOverride);
        }

        sqlx::query(
            "INSERT INTO plans (name, otp_limit, updated_at) VALUES (?, ?, ?)
             ON CONFLICT (name) DO UPDATE SET otp_limit = excluded.otp_limit, updated_at = excluded.updated_at",
        )
        .bind(plan.as_str())
        .bind(limit)
        .bind(timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        info!(plan = %plan, ?limit, "updated otp override");
        Ok(())
    }

    /// Bring the persisted overrides in line with [`CANONICAL_OTP_OVERRIDES`].
    ///
    /// Rows already holding the canonical value are left untouched, so a
    /// repeated run changes nothing. Returns the number of rows written.
    pub async fn sync_plan_limits(&self) -> Result<u64, QuotaError> {
        let now = timestamp(Utc::now());
        let mut tx = self.pool.begin().await?;
        let mut changed = 0;

        for (plan, limit) in CANONICAL_OTP_OVERRIDES {
            let result = sqlx::query(
                "INSERT INTO plans (name, otp_limit, updated_at) VALUES (?, ?, ?)
                 ON CONFLICT (name) DO UPDATE SET otp_limit = excluded.otp_limit, updated_at = excluded.updated_at
                 WHERE plans.otp_limit IS NOT excluded.otp_limit",
            )
            .bind(plan.as_str())
            .bind(limit)
            .bind(&now)
            .execute(&mut *tx)
            .await?;

            changed += result.rows_affected();
        }

        tx.commit().await?;

        info!(changed, "plan otp limits synchronised");
        Ok(changed)
    }
}
