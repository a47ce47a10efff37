use anyhow::Context;
use clap::{Parser, Subcommand};
use leadforge_api::{build_router, AppState};
use leadforge_config::{load as load_config, AppConfig};
use leadforge_identity::{Plan, QuotaResolver};
use leadforge_runtime::{telemetry, BackendServices};
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser)]
#[command(name = "leadforge-server")]
#[command(about = "Leadforge identity and quota backend")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default)
    Serve,
    /// Write the canonical OTP limits of the paid plans to the database
    SyncPlanLimits,
    /// Set or clear the stored OTP limit of a paid plan
    SetOtpLimit {
        plan: String,
        /// Omit to clear the override and fall back to the compiled-in default
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Delete security tokens that expired or were consumed
    PurgeTokens,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    telemetry::init_tracing().context("failed to initialise tracing")?;
    let config = load_config().context("failed to load configuration")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server(config).await,
        Commands::SyncPlanLimits => sync_plan_limits(config).await,
        Commands::SetOtpLimit { plan, limit } => set_otp_limit(config, &plan, limit).await,
        Commands::PurgeTokens => purge_tokens(config).await,
    }
}

async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    info!("starting Leadforge backend");

    let services = BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;

    let address = format!("{}:{}", config.http.address, config.http.port);
    let state = AppState::new(services.db_pool.clone(), config, services.mailer.clone());
    let app = build_router(state);

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind http listener on {address}"))?;

    info!(%address, "http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(leadforge_runtime::shutdown_signal())
        .await
        .context("http server error")?;

    info!("backend shut down");
    Ok(())
}

async fn sync_plan_limits(config: AppConfig) -> anyhow::Result<()> {
    // Initialisation already performs the sync.
    BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;

    println!("Plan limits synchronised");
    Ok(())
}

async fn set_otp_limit(config: AppConfig, plan: &str, limit: Option<i64>) -> anyhow::Result<()> {
    let plan: Plan = plan.parse()?;
    let services = BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;

    QuotaResolver::new(services.db_pool.clone())
        .set_otp_override(plan, limit)
        .await
        .with_context(|| format!("failed to update the {plan} plan"))?;

    match limit {
        Some(limit) => println!("{plan}: {limit} OTP sends per period"),
        None => println!("{plan}: override cleared, default {}", plan.default_otp_limit()),
    }
    Ok(())
}

async fn purge_tokens(config: AppConfig) -> anyhow::Result<()> {
    let services = BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;

    let purged = services
        .tokens(&config)
        .purge_expired()
        .await
        .context("failed to purge security tokens")?;

    println!("{purged} security tokens purged");
    Ok(())
}
