use anyhow::Context;
use clap::{Parser, Subcommand};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use storage_gateway::config::Config;
use storage_gateway::middleware::api_key::issue_api_key;
use storage_gateway::routes::{create_routes, AppState};

#[derive(Parser)]
#[command(name = "storage-gateway", version, about = "Anti-link and upload lifecycle gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run pending migrations and serve HTTP (default)
    Serve,
    /// Run pending migrations and exit
    Migrate,
    /// Create an API key for a platform and print it once
    IssueApiKey {
        #[arg(long)]
        platform_id: i32,
        #[arg(long)]
        name: String,
        /// Days until the key expires; never when omitted
        #[arg(long)]
        expires_in_days: Option<i64>,
    },
}

async fn connect(config: &Config) -> anyhow::Result<DatabaseConnection> {
    let db = Database::connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    Migrator::up(&db, None)
        .await
        .context("Failed to run migrations")?;
    Ok(db)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "storage_gateway=info,tower_http=info,sea_orm=warn".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Arc::new(Config::from_env()?);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Migrate => {
            connect(&config).await?;
            tracing::info!("migrations applied");
        }
        Command::IssueApiKey {
            platform_id,
            name,
            expires_in_days,
        } => {
            let db = connect(&config).await?;
            let expires_at = expires_in_days
                .map(|days| (chrono::Utc::now() + chrono::Duration::days(days)).naive_utc());
            let key = issue_api_key(&db, platform_id, &name, expires_at)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to issue api key: {e}"))?;
            println!("{key}");
        }
        Command::Serve => {
            let db = connect(&config).await?;
            let state = AppState::from_config(db, config.clone())
                .await
                .context("Failed to initialise storage drivers")?;
            let app = create_routes(state);

            let listener = tokio::net::TcpListener::bind(config.addr())
                .await
                .with_context(|| format!("Failed to bind {}", config.addr()))?;
            tracing::info!(addr = %listener.local_addr()?, "listening");
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
