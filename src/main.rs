use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use codev_erp::config::Config;
use codev_erp::AppState;

#[derive(Parser, Debug)]
#[command(name = "codev-erp")]
#[command(author, version, about = "Course, enrollment and sales management backend", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "codev.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,

    /// Override the listen port
    #[arg(long, env = "CODEV_PORT")]
    port: Option<u16>,

    /// Override the database URL
    #[arg(long, env = "CODEV_DATABASE_URL")]
    database_url: Option<String>,

    /// Secret the session cookie key is derived from
    #[arg(long, env = "CODEV_SESSION_SECRET", hide_env_values = true)]
    session_secret: Option<String>,

    /// Override the allowed CORS origin
    #[arg(long, env = "CODEV_CORS_ORIGIN")]
    cors_origin: Option<String>,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(url) = &self.database_url {
            config.database.url = url.clone();
        }
        if let Some(secret) = &self.session_secret {
            config.session.secret = Some(secret.clone());
        }
        if let Some(origin) = &self.cors_origin {
            config.cors.allowed_origin = origin.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration, then let flags and environment win
    let mut config = Config::load(&cli.config)?;
    cli.apply(&mut config);

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting codev-erp v{}", env!("CARGO_PKG_VERSION"));
    if cli.config.exists() {
        tracing::info!("Loaded configuration from {}", cli.config.display());
    } else {
        tracing::info!("No config file at {}, using defaults", cli.config.display());
    }

    // Ensure data and upload directories exist
    std::fs::create_dir_all(&config.server.data_dir).with_context(|| {
        format!("Failed to create data directory: {}", config.server.data_dir.display())
    })?;
    std::fs::create_dir_all(&config.storage.upload_dir).with_context(|| {
        format!("Failed to create upload directory: {}", config.storage.upload_dir.display())
    })?;

    // Initialize database
    let db = codev_erp::db::init(&config.database).await?;

    // Create the bootstrap admin if one is configured
    match (&config.auth.admin_email, &config.auth.admin_password) {
        (Some(email), Some(password)) => {
            codev_erp::db::ensure_admin_user(&db, email, password).await?;
        }
        (Some(_), None) | (None, Some(_)) => {
            tracing::warn!("auth.admin_email and auth.admin_password must both be set; skipping admin bootstrap");
        }
        (None, None) => {}
    }

    let state = Arc::new(AppState::new(config.clone(), db));
    let app = codev_erp::api::create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("API server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
