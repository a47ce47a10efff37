use std::sync::Arc;

use anyhow::{Context, Result};
use leadforge_config::AppConfig;
use leadforge_database::initialize_database;
use leadforge_identity::{HttpMailer, LogMailer, Mailer, QuotaResolver, TokenService, TokenTtls};
use sqlx::SqlitePool;
use tracing::{info, warn};

pub mod telemetry {
    use anyhow::Result;
    use tracing::Level;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    pub fn init_tracing() -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = SubscriberBuilder::default()
            .with_max_level(Level::TRACE)
            .with_env_filter(env_filter)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

/// Process-wide handles shared by the HTTP server and the maintenance commands.
#[derive(Clone)]
pub struct BackendServices {
    pub db_pool: SqlitePool,
    pub mailer: Arc<dyn Mailer>,
}

impl BackendServices {
    /// Opens the database, applies migrations and brings the plan table in
    /// line with the configured OTP limits.
    pub async fn initialise(config: &AppConfig) -> Result<Self> {
        let db_pool = initialize_database(&config.database)
            .await
            .context("failed to initialise database")?;

        QuotaResolver::new(db_pool.clone())
            .sync_plan_limits()
            .await
            .context("failed to synchronise plan limits")?;

        let mailer = select_mailer(config)?;

        Ok(Self { db_pool, mailer })
    }

    pub fn tokens(&self, config: &AppConfig) -> TokenService {
        TokenService::new(self.db_pool.clone(), TokenTtls::from_config(&config.auth))
    }
}

fn select_mailer(config: &AppConfig) -> Result<Arc<dyn Mailer>> {
    match HttpMailer::from_config(&config.mail).context("failed to build mail transport")? {
        Some(mailer) => {
            info!("mail transport: http");
            Ok(Arc::new(mailer))
        }
        None => {
            warn!("no mail api configured, outgoing mail is only logged");
            Ok(Arc::new(LogMailer))
        }
    }
}

pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(?error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
