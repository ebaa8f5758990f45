//! # haven-db
//!
//! Database layer for Haven. A single PostgreSQL pool holds:
//! - **Accounts**: profiles (display name / avatar) keyed by localpart
//! - **Rooms**: room versions, the event graph, forward extremities, current state
//! - **Directory**: local room aliases
//! - **Invites**: who invited whom to which room
//! - **Federation**: this server's signing keys

pub mod postgres;
pub mod repository;

use anyhow::Result;
use sqlx::PgPool;

/// Shared database state passed through Axum extractors.
#[derive(Clone)]
pub struct Database {
    pub pg: PgPool,
}

impl Database {
    /// Connect to PostgreSQL.
    pub async fn connect(config: &haven_common::config::AppConfig) -> Result<Self> {
        tracing::info!("Connecting to PostgreSQL...");
        let pg = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .min_connections(config.database.min_connections)
            .connect(&config.database.url)
            .await?;

        tracing::info!("Connected to PostgreSQL");

        Ok(Self { pg })
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&self.pg).await?;
        tracing::info!("Migrations complete");
        Ok(())
    }
}
