use std::sync::Arc;

use leadforge_config::AppConfig;
use leadforge_identity::{
    AuditRecorder, AuthSession, Authenticator, MailTemplate, Mailer, QuotaResolver, TokenService,
    TokenTtls, User,
};
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::warn;

use crate::ApiError;

#[derive(Clone)]
pub struct AppState {
    db_pool: SqlitePool,
    config: Arc<AppConfig>,
    authenticator: Authenticator,
    tokens: TokenService,
    quota: QuotaResolver,
    audit: AuditRecorder,
    mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn new(db_pool: SqlitePool, config: AppConfig, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            authenticator: Authenticator::new(db_pool.clone(), &config.auth),
            tokens: TokenService::new(db_pool.clone(), TokenTtls::from_config(&config.auth)),
            quota: QuotaResolver::new(db_pool.clone()),
            audit: AuditRecorder::new(db_pool.clone()),
            config: Arc::new(config),
            mailer,
            db_pool,
        }
    }

    pub fn db_pool(&self) -> &SqlitePool {
        &self.db_pool
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn quota(&self) -> &QuotaResolver {
        &self.quota
    }

    pub fn audit(&self) -> &AuditRecorder {
        &self.audit
    }

    pub async fn authenticate(&self, token: &str) -> Result<(User, AuthSession), ApiError> {
        self.authenticator
            .authenticate_token(token)
            .await
            .map_err(ApiError::from)
    }

    /// Absolute link for emails, `path` relative to the public base URL.
    pub fn link(&self, path: &str, token: &str) -> String {
        let base = self.config.http.public_url.trim_end_matches('/');
        format!("{base}{path}?token={token}")
    }

    /// Send a mail after the triggering state change has been committed.
    /// Returns whether the transport accepted it; failures are only logged.
    pub async fn dispatch_mail(&self, to: &str, template: MailTemplate, data: Value) -> bool {
        match self.mailer.send(to, template, data).await {
            Ok(()) => true,
            Err(error) => {
                warn!(%template, error = %error, "mail dispatch failed");
                false
            }
        }
    }
}
