//! # layer-gateway
//!
//! A small HTTP gateway over [`layer_client`] for user accounts.
//!
//! ## Endpoints
//! - `POST /send_code`: request a login code, returns the `phone_code_hash`
//! - `POST /confirm_code`: sign in with the code and hash
//! - `DELETE /delete_session`: forget a stored session
//! - `POST /get_dialogs`: list chats, groups and channels
//! - `GET /get_messages`: text messages of one chat within a date range
//!
//! Each request opens its own connection bound to the caller's session file
//! and drops it before responding. Nothing is shared between requests except
//! the session files under the data directory.

#![deny(unsafe_code)]

pub mod auth;
pub mod backend;
pub mod client;
pub mod config;
pub mod dialogs;
pub mod errors;
pub mod history;
pub mod http;
pub mod session_store;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use backend::LayerTelegram;
pub use client::{Connection, Credentials, Telegram};
pub use config::Config;
pub use errors::{GatewayError, Result};
pub use session_store::SessionStore;

// ─── AppState ─────────────────────────────────────────────────────────────────

/// Shared by all handlers. Immutable after start-up.
#[derive(Clone)]
pub struct AppState {
    pub telegram: Arc<dyn Telegram>,
    pub sessions: SessionStore,
    pub config:   Arc<Config>,
}

impl AppState {
    pub fn new(telegram: Arc<dyn Telegram>, config: Config) -> Self {
        Self {
            sessions: SessionStore::new(&config.data_dir),
            telegram,
            config:   Arc::new(config),
        }
    }

    /// Request credentials, falling back to the configured defaults.
    pub fn credentials(&self, api_id: Option<i32>, api_hash: Option<String>) -> Result<Credentials> {
        let api_id   = api_id.or(self.config.telegram.api_id);
        let api_hash = api_hash
            .filter(|h| !h.is_empty())
            .or_else(|| self.config.telegram.api_hash.clone());
        match (api_id, api_hash) {
            (Some(api_id), Some(api_hash)) => Ok(Credentials { api_id, api_hash }),
            _ => Err(GatewayError::MissingCredentials),
        }
    }
}

/// The full application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(http::routes())
        .fallback(http::not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
