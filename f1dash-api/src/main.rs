//! f1dash-api - F1 telemetry dashboard backend
//!
//! Serves session, telemetry and analysis data to the dashboard frontend.
//! Heavy lifting is done by an external analysis script; completed session
//! loads are cached in SQLite (or in memory when no database is configured).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use f1dash_api::engine::{AnalysisEngine, ProcessEngine};
use f1dash_api::store::{MemorySessionStore, SessionStore, SqliteSessionStore};
use f1dash_api::{build_router, AppState};
use f1dash_common::config::{load_config, resolve_config_path, TomlConfig};
use f1dash_common::db::init_database;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for f1dash-api
///
/// Flags override environment variables, which override the config file.
#[derive(Parser, Debug)]
#[command(name = "f1dash-api")]
#[command(about = "Backend API for the F1 telemetry dashboard")]
#[command(version)]
struct Args {
    /// Path to TOML config file
    #[arg(short, long, env = "F1DASH_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "F1DASH_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "F1DASH_PORT")]
    port: Option<u16>,

    /// Session cache database file
    #[arg(short, long, env = "F1DASH_DATABASE")]
    database: Option<PathBuf>,

    /// Analysis script path
    #[arg(short, long, env = "F1DASH_SCRIPT")]
    script: Option<PathBuf>,

    /// Interpreter used to run the analysis script
    #[arg(long, env = "F1DASH_PYTHON")]
    interpreter: Option<String>,
}

impl Args {
    fn apply(self, mut config: TomlConfig) -> TomlConfig {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(database) = self.database {
            config.store.database_path = Some(database);
        }
        if let Some(script) = self.script {
            config.engine.script = script;
        }
        if let Some(interpreter) = self.interpreter {
            config.engine.interpreter = interpreter;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config_path = resolve_config_path(args.config.as_deref());
    let config = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    let config = args.apply(config);

    // RUST_LOG takes precedence over the configured level
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting f1dash-api v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match &config_path {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("Configuration: compiled defaults (no config file found)"),
    }

    let store: Arc<dyn SessionStore> = match &config.store.database_path {
        Some(path) => {
            let pool = init_database(path)
                .await
                .with_context(|| format!("Failed to open session cache {}", path.display()))?;
            info!("Session cache: {}", path.display());
            Arc::new(SqliteSessionStore::new(pool))
        }
        None => {
            info!("Session cache: in memory (no database configured)");
            Arc::new(MemorySessionStore::new())
        }
    };

    if !config.engine.script.exists() {
        warn!(
            "Analysis script {} not found; analysis requests will fail",
            config.engine.script.display()
        );
    }
    let engine: Arc<dyn AnalysisEngine> = Arc::new(ProcessEngine::from_config(&config.engine));
    info!(
        "Analysis engine: {} {}",
        config.engine.interpreter,
        config.engine.script.display()
    );

    let app = build_router(AppState::new(store, engine));

    let listener = tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port))
        .await
        .with_context(|| {
            format!(
                "Failed to bind to {}:{}",
                config.server.host, config.server.port
            )
        })?;
    let addr = listener.local_addr()?;
    info!("f1dash-api listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
