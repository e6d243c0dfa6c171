pub mod dirs;
pub mod handlers;
pub mod render;
pub mod server;
pub mod store;

/// Shared application state threaded through axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: store::Store,
    /// Largest accepted secret text, in bytes.
    pub max_secret_bytes: usize,
}

pub use server::{open_store, router, run, ServerConfig, StorageKind};
