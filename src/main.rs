use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pulsar_forums::auth::generate_api_token;
use pulsar_forums::config::Config;
use pulsar_forums::db::{self, Database, PoolSettings};
use pulsar_forums::permissions::ForumPermission;
use pulsar_forums::web;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    info!("Starting pulsar-forums");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!(
        database = %config.database_path.display(),
        cache_ttl_secs = config.cache_ttl.as_secs(),
        "Configuration loaded"
    );

    if let Some(parent) = config.database_path.parent() {
        tokio::fs::create_dir_all(parent).await.with_context(|| {
            format!("Failed to create database directory: {}", parent.display())
        })?;
    }

    let db = Database::open(&config.database_path, PoolSettings::from(&config))
        .await
        .context("Failed to initialize database")?;

    info!("Database initialized");

    if let Some(username) = config.admin_username.as_deref() {
        bootstrap_admin(&db, username, config.admin_api_token.as_deref()).await?;
    }

    let web_config = config.clone();
    let web_db = db.clone();
    let web_handle = tokio::spawn(async move {
        if let Err(e) = web::serve(web_config, web_db).await {
            error!("Web server error: {e:#}");
        }
    });

    shutdown_signal().await;

    info!("Shutting down...");
    web_handle.abort();
    info!("Shutdown complete");

    Ok(())
}

/// Make sure the configured administrator exists, holds every forum
/// permission and has a working API token.
async fn bootstrap_admin(db: &Database, username: &str, token: Option<&str>) -> Result<()> {
    let pool = db.pool();
    let user_id = db::get_or_create_user(pool, username)
        .await
        .context("Failed to create admin user")?;

    for permission in ForumPermission::ALL {
        db::grant_permission(pool, user_id, permission.as_str()).await?;
    }

    let token = if let Some(token) = token {
        token.to_string()
    } else {
        let token = generate_api_token();
        warn!(
            username,
            token = %token,
            "ADMIN_API_TOKEN not set; generated a token for the admin user"
        );
        token
    };
    db::create_api_token(pool, user_id, &token).await?;

    info!(user_id, username, "Admin user ready");
    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pulsar_forums=debug"));

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
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
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
