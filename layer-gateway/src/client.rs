//! The seam between the gateway and the Telegram client library.
//!
//! Every operation opens one [`Connection`] bound to one session file, uses
//! it, and drops it. [`crate::backend::LayerTelegram`] is the production
//! implementation; tests provide their own.

use std::path::Path;

use async_trait::async_trait;
use layer_tl_types as tl;

use crate::dialogs::DialogInfo;
use crate::errors::{GatewayError, Result};
use crate::history::{ChatRef, HistoryMessage};
use crate::session_store::SessionStore;

// ─── Credentials ──────────────────────────────────────────────────────────────

/// Developer API credentials from <https://my.telegram.org>.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_id:   i32,
    pub api_hash: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_id", &self.api_id)
            .field("api_hash", &"<redacted>")
            .finish()
    }
}

// ─── Results crossing the seam ────────────────────────────────────────────────

/// Answer to a login code request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentCode {
    /// A code was sent; the hash must accompany the confirmation.
    Sent { phone_code_hash: String },
    /// The session is already signed in; nothing was sent.
    AlreadyAuthorized,
}

/// A chat the connection knows how to address.
#[derive(Debug, Clone)]
pub struct ResolvedChat {
    /// Marked id (see [`crate::backend::marked_id`]).
    pub id:    i64,
    pub input: tl::enums::InputPeer,
}

// ─── Traits ───────────────────────────────────────────────────────────────────

/// Opens connections bound to a session file.
#[async_trait]
pub trait Telegram: Send + Sync + 'static {
    async fn connect(&self, session: &Path, credentials: &Credentials) -> Result<Box<dyn Connection>>;
}

/// One live, session-bound connection. Released when dropped.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn is_authorized(&self) -> Result<bool>;

    /// Ask Telegram to send a login code to `phone`.
    async fn send_code(&self, phone: &str) -> Result<SentCode>;

    /// Complete sign-in with the received code and the hash from [`Connection::send_code`].
    async fn sign_in(&self, phone: &str, code: &str, phone_code_hash: &str) -> Result<()>;

    /// Persist the connection's auth key to its session file.
    async fn save_session(&self) -> Result<()>;

    /// Every dialog of the account, most recent first.
    async fn dialogs(&self) -> Result<Vec<DialogInfo>>;

    /// Resolve a chat reference; `Ok(None)` when nothing matches.
    async fn resolve(&self, chat: &ChatRef) -> Result<Option<ResolvedChat>>;

    /// One page of history, newest first, strictly older than `offset_id` (0 = latest).
    async fn history(&self, chat: &ResolvedChat, offset_id: i32, limit: i32) -> Result<Vec<HistoryMessage>>;
}

/// Open a connection for `phone` that is known to be signed in.
///
/// Fails with [`GatewayError::Unauthorized`] without touching the network
/// when no session file exists.
pub async fn connect_authorized(
    telegram:    &dyn Telegram,
    sessions:    &SessionStore,
    phone:       &str,
    credentials: &Credentials,
) -> Result<Box<dyn Connection>> {
    if !sessions.exists(phone)? {
        return Err(GatewayError::Unauthorized);
    }
    let conn = telegram.connect(&sessions.path_for(phone)?, credentials).await?;
    if !conn.is_authorized().await? {
        return Err(GatewayError::Unauthorized);
    }
    Ok(conn)
}
