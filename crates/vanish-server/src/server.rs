use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    dirs,
    handlers::{create_secret, get_secret, health, openapi},
    store::Store,
    AppState,
};

/// Where secrets live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StorageKind {
    /// Durable redb file in the data directory.
    #[default]
    Redb,
    /// Process memory only; lost on restart.
    Memory,
}

impl FromStr for StorageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redb" | "disk" => Ok(Self::Redb),
            "memory" | "mem" => Ok(Self::Memory),
            other => anyhow::bail!("unknown storage kind {other:?} (expected redb or memory)"),
        }
    }
}

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: Option<PathBuf>,
    pub storage: StorageKind,
    pub sweep_interval: Duration,
    pub cors_origins: Option<String>,
    pub max_secret_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("VANISH_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("VANISH_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            data_dir: std::env::var("VANISH_DATA_DIR").ok().map(PathBuf::from),
            storage: std::env::var("VANISH_STORAGE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
            sweep_interval: Duration::from_secs(
                std::env::var("VANISH_SWEEP_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .filter(|secs| *secs > 0)
                    .unwrap_or(300),
            ),
            cors_origins: std::env::var("VANISH_CORS_ORIGINS").ok(),
            max_secret_bytes: std::env::var("VANISH_MAX_SECRET_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1_048_576),
        }
    }
}

/// Build the store described by `cfg`.
pub fn open_store(cfg: &ServerConfig) -> Result<Store> {
    match cfg.storage {
        StorageKind::Redb => {
            let path = dirs::db_path(cfg.data_dir.as_deref())?;
            info!(db = %path.display(), "opening secret database");
            Store::open(&path)
        }
        StorageKind::Memory => {
            warn!("in-memory storage: secrets will not survive a restart");
            Ok(Store::in_memory())
        }
    }
}

pub fn router(state: AppState, cors_origins: Option<&str>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api-docs/openapi.json", get(openapi))
        .route("/v1/secret", post(create_secret))
        .route("/v1/secret/{hash}", get(get_secret))
        .with_state(state)
        .layer(build_cors(cors_origins))
        .layer(TraceLayer::new_for_http())
}

pub async fn run(cfg: ServerConfig) -> Result<()> {
    let store = open_store(&cfg).context("open store")?;
    let sweep = store.clone().spawn_sweep(cfg.sweep_interval);

    let state = AppState {
        store,
        max_secret_bytes: cfg.max_secret_bytes,
    };
    let app = router(state, cfg.cors_origins.as_deref());

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;

    info!(%addr, "vanish server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind listener")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    sweep.abort();
    info!("vanish server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "could not listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "could not listen for SIGTERM");
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
    info!("shutdown signal received");
}

fn build_cors(origins: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([http::Method::GET, http::Method::POST, http::Method::OPTIONS])
        .allow_headers(Any);

    match origins {
        Some(o) => {
            let origins: Vec<http::HeaderValue> =
                o.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            cors.allow_origin(origins)
        }
        None => cors.allow_origin(Any),
    }
}
