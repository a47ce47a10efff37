#![allow(dead_code)]

use leadforge_config::{AuthConfig, DatabaseConfig};
use leadforge_database::initialize_database;
use leadforge_identity::{
    AuditRecorder, Authenticator, NewAccount, QuotaResolver, TokenService, TokenTtls, User,
};
use sqlx::SqlitePool;
use tempfile::TempDir;

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

pub struct TestContext {
    pub pool: SqlitePool,
    pub authenticator: Authenticator,
    pub tokens: TokenService,
    pub quota: QuotaResolver,
    pub audit: AuditRecorder,
    _temp_dir: TempDir,
}

impl TestContext {
    pub async fn new() -> TestResult<Self> {
        Self::with_auth(AuthConfig::default()).await
    }

    pub async fn with_auth(auth: AuthConfig) -> TestResult<Self> {
        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.path().join("identity.sqlite");
        let config = DatabaseConfig {
            url: format!("sqlite://{}", db_path.display()),
            max_connections: 8,
        };

        let pool = initialize_database(&config).await?;

        Ok(Self {
            authenticator: Authenticator::new(pool.clone(), &auth),
            tokens: TokenService::new(pool.clone(), TokenTtls::from_config(&auth)),
            quota: QuotaResolver::new(pool.clone()),
            audit: AuditRecorder::new(pool.clone()),
            pool,
            _temp_dir: temp_dir,
        })
    }

    pub async fn register(&self, email: &str, username: &str, display_name: &str) -> TestResult<User> {
        let user = self
            .authenticator
            .register(NewAccount {
                email: email.to_owned(),
                password: "correct horse battery".to_owned(),
                username: username.to_owned(),
                display_name: display_name.to_owned(),
            })
            .await?;
        Ok(user)
    }

    /// Move every live token's expiry into the past by `days`.
    pub async fn age_tokens(&self, days: i64) -> TestResult {
        let rows = sqlx::query_as::<_, (i64, String)>("SELECT id, expires_at FROM security_tokens")
            .fetch_all(&self.pool)
            .await?;

        for (id, expires_at) in rows {
            let shifted = leadforge_database::parse_timestamp(&expires_at)?
                - chrono::Duration::days(days);
            sqlx::query("UPDATE security_tokens SET expires_at = ? WHERE id = ?")
                .bind(leadforge_database::timestamp(shifted))
                .bind(id)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }
}
