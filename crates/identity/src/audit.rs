//! Append-only audit log for sensitive actions.

use std::fmt;

use chrono::{DateTime, Utc};
use leadforge_database::{parse_timestamp, timestamp};
use serde::Serialize;
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    LeadExport,
}

impl AuditAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            AuditAction::LeadExport => "lead_export",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "lead_export" => Some(AuditAction::LeadExport),
            _ => None,
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("metadata serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("corrupt audit row: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: i64,
    pub user_id: i64,
    pub action: AuditAction,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct AuditRecorder {
    pool: SqlitePool,
}

impl AuditRecorder {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one entry. Metadata is stored verbatim and never inspected.
    pub async fn record(
        &self,
        user_id: i64,
        action: AuditAction,
        metadata: Option<Value>,
    ) -> Result<AuditEntry, AuditError> {
        let created_at = Utc::now();
        let encoded = metadata.as_ref().map(serde_json::to_string).transpose()?;

        let result = sqlx::query(
            "INSERT INTO audit_logs (user_id, action, metadata, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(action.as_str())
        .bind(encoded)
        .bind(timestamp(created_at))
        .execute(&self.pool)
        .await?;

        let entry = AuditEntry {
            id: result.last_insert_rowid(),
            user_id,
            action,
            metadata,
            created_at,
        };

        info!(audit_id = entry.id, user_id, %action, "audit entry recorded");
        Ok(entry)
    }

    /// Entries for one user, oldest first.
    pub async fn entries_for_user(&self, user_id: i64) -> Result<Vec<AuditEntry>, AuditError> {
        let rows = sqlx::query(
            "SELECT id, user_id, action, metadata, created_at FROM audit_logs
             WHERE user_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let action: String = row.try_get("action")?;
                let metadata: Option<String> = row.try_get("metadata")?;
                let created_at: String = row.try_get("created_at")?;

                Ok(AuditEntry {
                    id: row.try_get("id")?,
                    user_id: row.try_get("user_id")?,
                    action: AuditAction::parse(&action)
                        .ok_or_else(|| AuditError::Corrupt(format!("unknown action {action}")))?,
                    metadata: metadata.as_deref().map(serde_json::from_str).transpose()?,
                    created_at: parse_timestamp(&created_at)
                        .map_err(|e| AuditError::Corrupt(e.to_string()))?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_names_match_storage_format() {
        assert_eq!(AuditAction::LeadExport.as_str(), "lead_export");
        assert_eq!(AuditAction::parse("lead_export"), Some(AuditAction::LeadExport));
        assert_eq!(AuditAction::parse("lead_import"), None);
    }

    #[test]
    fn entry_serializes_with_camel_case_keys() {
        let created_at = chrono::TimeZone::with_ymd_and_hms(&Utc, 2026, 3, 1, 12, 0, 0).unwrap();
        let entry = AuditEntry {
            id: 7,
            user_id: 3,
            action: AuditAction::LeadExport,
            metadata: Some(serde_json::json!({ "formId": "f1", "count": 2 })),
            created_at,
        };

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["userId"], 3);
        assert_eq!(value["action"], "lead_export");
        assert_eq!(value["metadata"]["count"], 2);
        assert_eq!(value["createdAt"], "2026-03-01T12:00:00Z");
    }
}
