//! # Haven Server
//!
//! Main binary: loads configuration, connects PostgreSQL, provisions the
//! federation signing key, and serves the HTTP API (client join endpoints
//! plus the public federation key routes) from a single process.
//!
//! `haven issue-token @user:server` mints an access token for a local user
//! without starting the server.

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context as _, bail};
use clap::{Parser, Subcommand};
use haven_api::{AppState, auth, build_router};
use haven_common::{UserId, config::AppConfig};
use haven_db::Database;
use haven_federation::{FederationClient, KeyManager, KeyRing};

#[derive(Debug, Parser)]
#[command(name = "haven", version, about = "Haven homeserver")]
struct Cli {
    /// Config file to read (extension inferred); env vars prefixed HAVEN_ override it.
    #[arg(short, long, env = "HAVEN_CONFIG", default_value = "config", global = true)]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the homeserver (default).
    Serve,
    /// Print an access token for a local user.
    IssueToken {
        /// Full user ID, e.g. `@alice:haven.example.com`.
        user_id: String,
        /// Token lifetime in seconds.
        #[arg(long, default_value_t = 86_400)]
        ttl_secs: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = haven_common::config::init_from(&cli.config)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::IssueToken { user_id, ttl_secs } => {
            println!("{}", issue_token(config, &user_id, ttl_secs)?);
            Ok(())
        }
    }
}

/// Tokens are only minted for users on this server.
fn issue_token(config: &AppConfig, user_id: &str, ttl_secs: u64) -> anyhow::Result<String> {
    let user_id = UserId::parse(user_id).context("invalid user ID")?;
    if user_id.server_name() != config.server.name.as_str() {
        bail!("{} is not a user on {}", user_id, config.server.name);
    }
    Ok(auth::generate_access_token(user_id.as_str(), &config.auth.jwt_secret, ttl_secs)?)
}

async fn serve(config: &'static AppConfig) -> anyhow::Result<()> {
    // Initialize tracing (structured logging)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "haven=debug,tower_http=debug".into()),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    tracing::info!("Starting Haven v{} as {}", env!("CARGO_PKG_VERSION"), config.server.name);

    // Connect to the database and run migrations
    let db = Database::connect(config).await?;
    db.migrate().await?;

    // === Federation signing key ===
    // Load the active Ed25519 key from DB, or generate + persist a new one on first run.
    let federation_key = KeyManager::new(db.pg.clone(), config.federation.key_ttl_days)
        .load_or_generate()
        .await?;
    tracing::info!("Federation signing key ready: {}", federation_key.key_id);

    let federation_client = Arc::new(FederationClient::new(
        config.server.name.clone(),
        federation_key.clone(),
        config.federation.request_timeout(),
        config.federation.discovery_timeout(),
    )?);
    let key_ring = Arc::new(
        KeyRing::new(federation_client.clone())
            .with_local_key(&config.server.name, &federation_key)
            .await,
    );

    // === HTTP API ===
    let state = AppState::new(config, db, federation_key, federation_client, key_ring);
    let router = build_router(state);
    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);

    tracing::info!("HTTP API listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
