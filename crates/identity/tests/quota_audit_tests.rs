mod common;

use common::{TestContext, TestResult};
use leadforge_identity::{AuditAction, Plan, QuotaError, QuotaResolver, CANONICAL_OTP_OVERRIDES};
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;

async fn stored_overrides(ctx: &TestContext) -> TestResult<Vec<(String, Option<i64>)>> {
    let rows = sqlx::query_as::<_, (String, Option<i64>)>(
        "SELECT name, otp_limit FROM plans ORDER BY name",
    )
    .fetch_all(&ctx.pool)
    .await?;
    Ok(rows)
}

#[tokio::test]
async fn free_plan_never_touches_the_store() -> TestResult {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    pool.close().await;

    let resolver = QuotaResolver::new(pool);
    assert_eq!(resolver.resolve_otp_limit("free").await?, Some(10));
    assert_eq!(resolver.resolve_otp_limit("FREE").await?, Some(10));

    assert!(matches!(
        resolver.resolve_otp_limit("pro").await,
        Err(QuotaError::Database(_))
    ));
    Ok(())
}

#[tokio::test]
async fn paid_plans_fall_back_to_compiled_defaults() -> TestResult {
    let ctx = TestContext::new().await?;

    assert_eq!(ctx.quota.resolve_otp_limit("pro").await?, Some(100));
    assert_eq!(ctx.quota.resolve_otp_limit("business").await?, Some(1000));

    sqlx::query("DELETE FROM plans")
        .execute(&ctx.pool)
        .await?;
    assert_eq!(ctx.quota.resolve_otp_limit("pro").await?, Some(100));
    Ok(())
}

#[tokio::test]
async fn persisted_override_wins_for_paid_plans() -> TestResult {
    let ctx = TestContext::new().await?;

    ctx.quota.set_otp_override(Plan::Pro, Some(250)).await?;
    ctx.quota.set_otp_override(Plan::Business, Some(0)).await?;

    assert_eq!(ctx.quota.resolve_otp_limit("pro").await?, Some(250));
    assert_eq!(ctx.quota.resolve_otp_limit("business").await?, Some(0));

    ctx.quota.set_otp_override(Plan::Pro, None).await?;
    assert_eq!(ctx.quota.resolve_otp_limit("pro").await?, Some(100));
    Ok(())
}

#[tokio::test]
async fn free_plan_override_is_refused_and_ignored() -> TestResult {
    let ctx = TestContext::new().await?;

    assert!(matches!(
        ctx.quota.set_otp_override(Plan::Free, Some(5)).await,
        Err(QuotaError::FreePlanOverride)
    ));

    sqlx::query("INSERT INTO plans (name, otp_limit, updated_at) VALUES ('free', 5, 'x')")
        .execute(&ctx.pool)
        .await?;
    assert_eq!(ctx.quota.resolve_otp_limit("free").await?, Some(10));
    Ok(())
}

#[tokio::test]
async fn unknown_plan_without_row_has_no_limit() -> TestResult {
    let ctx = TestContext::new().await?;

    assert_eq!(ctx.quota.resolve_otp_limit("enterprise").await?, None);

    sqlx::query("INSERT INTO plans (name, otp_limit, updated_at) VALUES ('enterprise', 5000, 'x')")
        .execute(&ctx.pool)
        .await?;
    assert_eq!(ctx.quota.resolve_otp_limit("enterprise").await?, Some(5000));
    Ok(())
}

#[tokio::test]
async fn sync_plan_limits_is_idempotent() -> TestResult {
    let ctx = TestContext::new().await?;
    ctx.quota.set_otp_override(Plan::Pro, Some(7)).await?;

    let first = ctx.quota.sync_plan_limits().await?;
    assert_eq!(first, 2);
    let after_first = stored_overrides(&ctx).await?;

    let second = ctx.quota.sync_plan_limits().await?;
    assert_eq!(second, 0);
    assert_eq!(stored_overrides(&ctx).await?, after_first);

    let expected: Vec<(String, Option<i64>)> = {
        let mut rows: Vec<_> = CANONICAL_OTP_OVERRIDES
            .iter()
            .map(|(plan, limit)| (plan.as_str().to_owned(), Some(*limit)))
            .collect();
        rows.sort();
        rows
    };
    assert_eq!(after_first, expected, "free must never be written");
    Ok(())
}

#[tokio::test]
async fn audit_entries_are_appended_with_opaque_metadata() -> TestResult {
    let ctx = TestContext::new().await?;
    let user = ctx.register("alice@example.com", "alice", "Alice").await?;

    let metadata = json!({
        "formId": "ckform123",
        "count": 3,
        "filters": {"since": "2026-01-01", "fields": ["email", "name"]},
        "alpha": true
    });

    let entry = ctx
        .audit
        .record(user.id, AuditAction::LeadExport, Some(metadata.clone()))
        .await?;
    assert_eq!(entry.action, AuditAction::LeadExport);
    ctx.audit.record(user.id, AuditAction::LeadExport, None).await?;

    let stored: String = sqlx::query_scalar("SELECT metadata FROM audit_logs WHERE id = ?")
        .bind(entry.id)
        .fetch_one(&ctx.pool)
        .await?;
    assert_eq!(stored, serde_json::to_string(&metadata)?);
    assert!(stored.starts_with(r#"{"formId""#), "key order is preserved");

    let entries = ctx.audit.entries_for_user(user.id).await?;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].metadata.as_ref(), Some(&metadata));
    assert!(entries[1].metadata.is_none());
    Ok(())
}

#[tokio::test]
async fn audit_failure_is_surfaced() -> TestResult {
    let ctx = TestContext::new().await?;
    sqlx::query("DROP TABLE audit_logs")
        .execute(&ctx.pool)
        .await?;

    let result = ctx.audit.record(1, AuditAction::LeadExport, None).await;
    assert!(result.is_err());
    Ok(())
}
