//! Date-bounded message history.
//!
//! History is walked backwards from the newest message in batches, keeping
//! every non-empty text message whose day falls inside the requested window.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::client::{Connection, Credentials, ResolvedChat, Telegram, connect_authorized};
use crate::config::HistoryConfig;
use crate::errors::{GatewayError, Result};
use crate::session_store::SessionStore;

const DATE_FORMAT: &str = "%d/%m/%Y";

// ─── HistoryMessage ───────────────────────────────────────────────────────────

/// A message as retrieved from history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    pub id:        i32,
    pub date:      DateTime<Utc>,
    pub sender_id: Option<i64>,
    /// Empty for service and media-only messages.
    pub text:      String,
}

/// Wire form of a matching message.
#[derive(Debug, Clone, Serialize)]
pub struct MessageOut {
    pub date:      String,
    pub sender_id: Option<i64>,
    pub message:   String,
}

impl From<HistoryMessage> for MessageOut {
    fn from(m: HistoryMessage) -> Self {
        Self {
            date:      m.date.to_rfc3339(),
            sender_id: m.sender_id,
            message:   m.text,
        }
    }
}

// ─── DateWindow ───────────────────────────────────────────────────────────────

/// Inclusive range of UTC days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    from: NaiveDate,
    to:   NaiveDate,
}

impl DateWindow {
    /// Parse two `DD/MM/YYYY` dates.
    pub fn parse(from: &str, to: &str) -> Result<Self> {
        let from = parse_day(from)?;
        let to   = parse_day(to)?;
        if from > to {
            return Err(GatewayError::BadRequest("from_date must not be later than to_date".into()));
        }
        Ok(Self { from, to })
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        let day = ts.date_naive();
        self.from <= day && day <= self.to
    }
}

fn parse_day(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).map_err(|_| GatewayError::BadDate)
}

// ─── ChatRef ──────────────────────────────────────────────────────────────────

/// What the caller passed as `channel_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatRef {
    /// Marked numeric id, as listed by `/get_dialogs`.
    Id(i64),
    /// `@name` or a `t.me/name` link.
    Username(String),
    /// Anything else: tried as a username, then as a dialog title.
    Name(String),
}

impl ChatRef {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(GatewayError::BadRequest("channel_id must not be empty".into()));
        }
        if let Ok(id) = s.parse::<i64>() {
            return Ok(Self::Id(id));
        }
        let link = ["https://t.me/", "http://t.me/", "t.me/"]
            .iter()
            .find_map(|prefix| s.strip_prefix(prefix));
        if let Some(name) = s.strip_prefix('@').or(link) {
            let name = name.trim_end_matches('/');
            if name.is_empty() {
                return Err(GatewayError::BadRequest(format!("invalid chat reference: {s:?}")));
            }
            return Ok(Self::Username(name.to_string()));
        }
        Ok(Self::Name(s.to_string()))
    }
}

impl fmt::Display for ChatRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id)       => write!(f, "{id}"),
            Self::Username(u)  => write!(f, "@{u}"),
            Self::Name(n)      => write!(f, "{n}"),
        }
    }
}

// ─── Fetching ─────────────────────────────────────────────────────────────────

/// Everything `/get_messages` needs after input validation.
#[derive(Debug, Clone)]
pub struct HistoryRequest {
    pub phone:       String,
    pub credentials: Credentials,
    pub chat:        ChatRef,
    pub window:      DateWindow,
    pub limit:       Option<usize>,
}

/// Cap on retrieved messages: the caller's limit, bounded by the configured maximum.
pub fn retrieval_cap(limit: Option<usize>, max_messages: usize) -> usize {
    limit.unwrap_or(max_messages).clamp(1, max_messages.max(1))
}

pub async fn get_messages(
    telegram: &dyn Telegram,
    sessions: &SessionStore,
    config:   &HistoryConfig,
    req:      &HistoryRequest,
) -> Result<Vec<HistoryMessage>> {
    let conn = connect_authorized(telegram, sessions, &req.phone, &req.credentials).await?;
    let chat = conn
        .resolve(&req.chat)
        .await?
        .ok_or_else(|| GatewayError::ChatNotFound(req.chat.to_string()))?;

    let cap = retrieval_cap(req.limit, config.max_messages);
    collect(conn.as_ref(), &chat, &req.window, cap, config).await
}

/// Walk history backwards until an empty batch or `cap` retrieved messages.
pub async fn collect(
    conn:   &dyn Connection,
    chat:   &ResolvedChat,
    window: &DateWindow,
    cap:    usize,
    config: &HistoryConfig,
) -> Result<Vec<HistoryMessage>> {
    let batch_size    = config.batch_size.clamp(1, crate::config::MAX_BATCH_SIZE) as usize;
    let mut offset_id = 0;
    let mut retrieved = 0usize;
    let mut matched   = Vec::new();

    loop {
        let want  = (cap - retrieved).min(batch_size) as i32;
        let batch = conn.history(chat, offset_id, want).await?;
        let Some(oldest) = batch.iter().map(|m| m.id).min() else { break };

        retrieved += batch.len();
        matched.extend(
            batch.into_iter()
                .filter(|m| !m.text.is_empty() && window.contains(m.date)),
        );

        if retrieved >= cap {
            break;
        }
        // A page that does not move the cursor would repeat forever.
        if offset_id != 0 && oldest >= offset_id {
            tracing::warn!("[gateway] history cursor stuck at {offset_id}; stopping");
            break;
        }
        offset_id = oldest;
        tokio::time::sleep(config.batch_delay()).await;
    }

    tracing::debug!(
        "[gateway] chat {}: {retrieved} retrieved, {} matched",
        chat.id,
        matched.len()
    );
    Ok(matched)
}
