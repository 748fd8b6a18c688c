use std::time::Duration;

use anyhow::Context;

mod app;
mod auth;
mod board;
mod bootstrap;
mod config;
mod db;
mod error;
mod state;
mod tasks;

use crate::{auth::session, config::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "taskboard=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env().context("load configuration")?;
    let state = AppState::init(config).await?;

    bootstrap::ensure_admin(&state)
        .await
        .context("bootstrap admin account")?;

    let purger = session::spawn_purger(state.sessions.clone(), Duration::from_secs(60));

    let result = app::serve(app::build_app(state)).await;
    purger.abort();
    result
}
