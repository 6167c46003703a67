mod api;
mod error;
pub mod validate;
pub mod views;

pub use error::{ok, ApiError, ApiResult, Envelope};

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::FromRef;
use axum::routing::get;
use axum::Router;
use sqlx::SqlitePool;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::Viewer;
use crate::cache::Cache;
use crate::config::Config;
use crate::db::Database;

use self::views::ViewContext;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub cache: Arc<Cache>,
    pub config: Arc<Config>,
}

impl AppState {
    #[must_use]
    pub fn new(db: Database, config: Config) -> Self {
        Self {
            db,
            cache: Arc::new(Cache::new(config.cache_ttl)),
            config: Arc::new(config),
        }
    }

    /// Borrow the pieces a view builder needs for one request.
    #[must_use]
    pub fn view<'a>(&'a self, viewer: &'a Viewer) -> ViewContext<'a> {
        ViewContext {
            pool: self.db.pool(),
            cache: &self.cache,
            viewer,
        }
    }
}

impl FromRef<AppState> for SqlitePool {
    fn from_ref(state: &AppState) -> Self {
        state.db.pool().clone()
    }
}

/// Start the web server.
///
/// # Errors
///
/// Returns an error if the address is invalid or the listener cannot bind.
pub async fn serve(config: Config, db: Database) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.web_host, config.web_port)
        .parse()
        .context("Invalid web server address")?;

    let app = create_app(AppState::new(db, config));

    info!(addr = %addr, "Starting HTTP web server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind web server")?;

    axum::serve(listener, app)
        .await
        .context("Web server error")?;

    Ok(())
}

/// Create the main application router.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(api::router())
        .route("/healthz", get(health))
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}
