use serde::Serialize;
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use utoipa::ToSchema;

use super::error::ServiceError;

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FormSummary {
    pub id: String,
    pub name: String,
    pub lead_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeadRecord {
    pub email: Option<String>,
    #[schema(value_type = Object)]
    pub data: Value,
    pub created_at: String,
}

/// Forms owned by `user_id`, ordered by name.
pub async fn list_forms(pool: &SqlitePool, user_id: i64) -> Result<Vec<FormSummary>, ServiceError> {
    let rows = sqlx::query(
        r#"
        SELECT f.public_id, f.name, f.created_at, f.updated_at,
               (SELECT COUNT(*) FROM leads l WHERE l.form_id = f.id) AS lead_count
        FROM forms f
        WHERE f.user_id = ?
        ORDER BY f.name ASC, f.id ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(FormSummary {
                id: row.try_get("public_id")?,
                name: row.try_get("name")?,
                lead_count: row.try_get("lead_count")?,
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
            })
        })
        .collect()
}

/// Delete a form and, through the cascade, its leads. Forms of other users
/// are reported as missing.
pub async fn delete_form(
    pool: &SqlitePool,
    user_id: i64,
    form_public_id: &str,
) -> Result<(), ServiceError> {
    let result = sqlx::query("DELETE FROM forms WHERE public_id = ? AND user_id = ?")
        .bind(form_public_id)
        .bind(user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ServiceError::NotFound("Form"));
    }
    Ok(())
}

pub async fn export_leads(
    pool: &SqlitePool,
    user_id: i64,
    form_public_id: &str,
) -> Result<Vec<LeadRecord>, ServiceError> {
    let form_id: i64 = sqlx::query_scalar("SELECT id FROM forms WHERE public_id = ? AND user_id = ?")
        .bind(form_public_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(ServiceError::NotFound("Form"))?;

    let rows = sqlx::query(
        "SELECT email, data, created_at FROM leads WHERE form_id = ? ORDER BY created_at ASC, id ASC",
    )
    .bind(form_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let data: String = row.try_get("data")?;
            Ok(LeadRecord {
                email: row.try_get("email")?,
                data: serde_json::from_str(&data)?,
                created_at: row.try_get("created_at")?,
            })
        })
        .collect()
}
