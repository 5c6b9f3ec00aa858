use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use sitestackd::{AppState, Settings, build_manager, create_app, spawn_evictor};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let manager = Arc::new(build_manager(&settings));
    let identity = settings.identity();
    tracing::info!(
        engine = manager.engine().name(),
        stack = %identity,
        error_mode = ?settings.error_mode,
        "Starting sitestackd"
    );

    let evictor = spawn_evictor(manager.clone());
    let state = Arc::new(AppState::new(
        manager.clone(),
        identity.clone(),
        settings.error_mode,
    ));
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(settings.listen)
        .await
        .with_context(|| format!("failed to bind to {}", settings.listen))?;

    println!(
        "{} serving {} on {}",
        "sitestackd".green().bold(),
        identity.to_string().cyan(),
        settings.listen.to_string().cyan()
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    if let Some(evictor) = evictor {
        evictor.abort();
    }
    manager.shutdown().await;
    tracing::info!("sitestackd stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
