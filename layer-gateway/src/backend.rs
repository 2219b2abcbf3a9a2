//! [`Telegram`] implementation backed by layer-client.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use layer_client::{BinaryFileBackend, Client, Config, Dialog, InvocationError};
use layer_tl_types as tl;
use tokio::sync::OnceCell;

use crate::client::{Connection, Credentials, ResolvedChat, SentCode, Telegram};
use crate::dialogs::{DialogInfo, DialogKind};
use crate::errors::{GatewayError, Result};
use crate::history::{ChatRef, HistoryMessage};

/// Offset folded into channel ids by the "marked id" convention.
const CHANNEL_MARK: i64 = 1_000_000_000_000;

// ─── Marked ids ───────────────────────────────────────────────────────────────

/// Signed id encoding the peer kind: users as-is, basic groups negated,
/// channels and supergroups as `-(10^12 + id)`.
pub fn marked_id(peer: &tl::enums::Peer) -> i64 {
    match peer {
        tl::enums::Peer::User(u)    => u.user_id,
        tl::enums::Peer::Chat(c)    => -c.chat_id,
        tl::enums::Peer::Channel(c) => -(CHANNEL_MARK + c.channel_id),
    }
}

fn looks_like_username(name: &str) -> bool {
    (4..=32).contains(&name.len())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ─── LayerTelegram ────────────────────────────────────────────────────────────

/// Connects through layer-client, one session file per connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct LayerTelegram;

#[async_trait]
impl Telegram for LayerTelegram {
    async fn connect(&self, session: &Path, credentials: &Credentials) -> Result<Box<dyn Connection>> {
        tracing::debug!("[gateway] Connecting with session {}", session.display());
        let (client, _shutdown) = Client::connect(Config {
            api_id:          credentials.api_id,
            api_hash:        credentials.api_hash.clone(),
            session_backend: Arc::new(BinaryFileBackend::new(session)),
            ..Default::default()
        }).await?;

        Ok(Box::new(LayerConnection {
            client,
            session:     session.to_path_buf(),
            credentials: credentials.clone(),
            self_id:     OnceCell::new(),
        }))
    }
}

// ─── LayerConnection ──────────────────────────────────────────────────────────

struct LayerConnection {
    client:      Client,
    session:     PathBuf,
    credentials: Credentials,
    self_id:     OnceCell<i64>,
}

impl Drop for LayerConnection {
    fn drop(&mut self) {
        tracing::debug!("[gateway] Connection released ({})", self.session.display());
    }
}

impl LayerConnection {
    fn send_code_request(&self, phone: &str) -> tl::functions::auth::SendCode {
        tl::functions::auth::SendCode {
            phone_number: phone.to_string(),
            api_id:       self.credentials.api_id,
            api_hash:     self.credentials.api_hash.clone(),
            settings:     tl::enums::CodeSettings::CodeSettings(
                tl::types::CodeSettings {
                    allow_flashcall: false, current_number: false, allow_app_hash: false,
                    allow_missed_call: false, allow_firebase: false, unknown_number: false,
                    logout_tokens: None, token: None, app_sandbox: None,
                },
            ),
        }
    }

    /// Walk every dialog and resolve the first one accepted by `pred`.
    ///
    /// Walking the dialogs is also what teaches the client the access hashes
    /// needed to address the match.
    async fn find_dialog(&self, pred: impl Fn(&DialogInfo) -> bool) -> Result<Option<ResolvedChat>> {
        let mut iter = self.client.iter_dialogs();
        while let Some(dialog) = iter.next(&self.client).await? {
            let (Some(info), Some(peer)) = (dialog_info(&dialog), dialog.peer()) else { continue };
            if pred(&info) {
                let input = self.client.resolve_to_input_peer(peer).await?;
                return Ok(Some(ResolvedChat { id: info.id, input }));
            }
        }
        Ok(None)
    }

    /// The signed-in account's user id, fetched once per connection.
    async fn self_id(&self) -> Result<i64> {
        let id = self.self_id
            .get_or_try_init(|| async { self.client.get_me().await.map(|me| me.id) })
            .await?;
        Ok(*id)
    }

    async fn resolve_username(&self, username: &str) -> Result<Option<ResolvedChat>> {
        if !looks_like_username(username) {
            return Ok(None);
        }
        match self.client.resolve_peer(&format!("@{username}")).await {
            Ok(peer) => {
                let input = self.client.resolve_to_input_peer(&peer).await?;
                Ok(Some(ResolvedChat { id: marked_id(&peer), input }))
            }
            Err(e) if e.is("USERNAME_NOT_OCCUPIED") || e.is("USERNAME_INVALID") => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Connection for LayerConnection {
    async fn is_authorized(&self) -> Result<bool> {
        Ok(self.client.is_authorized().await?)
    }

    async fn send_code(&self, phone: &str) -> Result<SentCode> {
        use tl::enums::auth::SentCode as Sent;

        let req  = self.send_code_request(phone);
        let sent = match self.client.invoke(&req).await {
            Ok(s) => s,
            Err(InvocationError::Rpc(ref r)) if r.code == 303 => {
                // The library's login request migrates to the home DC but
                // keeps its hash private, so ask once more there. Telegram
                // delivers a second code and only that one is valid.
                tracing::info!("[gateway] {phone} is served by DC{}; migrating", r.value.unwrap_or(0));
                self.client.request_login_code(phone).await?;
                self.client.save_session().await?;
                tracing::warn!("[gateway] {phone}: second login code requested after migration; the first is void");
                self.client.invoke(&req).await?
            }
            Err(e) => return Err(e.into()),
        };

        match sent {
            Sent::SentCode(s)        => Ok(SentCode::Sent { phone_code_hash: s.phone_code_hash }),
            Sent::Success(_)         => Ok(SentCode::AlreadyAuthorized),
            Sent::PaymentRequired(_) => Err(GatewayError::Telegram("payment required to send code".into())),
        }
    }

    async fn sign_in(&self, phone: &str, code: &str, phone_code_hash: &str) -> Result<()> {
        let req = tl::functions::auth::SignIn {
            phone_number:       phone.to_string(),
            phone_code_hash:    phone_code_hash.to_string(),
            phone_code:         Some(code.to_string()),
            email_verification: None,
        };

        match self.client.invoke(&req).await {
            Ok(tl::enums::auth::Authorization::Authorization(_))  => Ok(()),
            Ok(tl::enums::auth::Authorization::SignUpRequired(_)) => Err(GatewayError::SignUpRequired),
            Err(e) if e.is("SESSION_PASSWORD_NEEDED") => Err(GatewayError::PasswordRequired),
            Err(e) if e.is("PHONE_CODE_*")            => Err(GatewayError::InvalidCode),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_session(&self) -> Result<()> {
        Ok(self.client.save_session().await?)
    }

    async fn dialogs(&self) -> Result<Vec<DialogInfo>> {
        let mut out  = Vec::new();
        let mut iter = self.client.iter_dialogs();
        while let Some(dialog) = iter.next(&self.client).await? {
            out.extend(dialog_info(&dialog));
        }
        Ok(out)
    }

    async fn resolve(&self, chat: &ChatRef) -> Result<Option<ResolvedChat>> {
        match chat {
            ChatRef::Id(id)         => self.find_dialog(|d| d.id == *id).await,
            ChatRef::Username(name) => self.resolve_username(name).await,
            ChatRef::Name(name) => {
                if let Some(found) = self.resolve_username(name).await? {
                    return Ok(Some(found));
                }
                self.find_dialog(|d| d.name == *name).await
            }
        }
    }

    async fn history(&self, chat: &ResolvedChat, offset_id: i32, limit: i32) -> Result<Vec<HistoryMessage>> {
        let page = self.client.get_messages(chat.input.clone(), limit, offset_id).await?;
        let me = if page.iter().any(|m| sent_without_author(&m.raw)) {
            Some(self.self_id().await?)
        } else {
            None
        };
        Ok(page.iter().map(|m| history_message(&m.raw, me)).collect())
    }
}

// ─── Conversions ──────────────────────────────────────────────────────────────

/// `None` for folder entries, which have no peer.
fn dialog_info(dialog: &Dialog) -> Option<DialogInfo> {
    let id = marked_id(dialog.peer()?);
    let (kind, username) = match &dialog.chat {
        Some(tl::enums::Chat::Channel(c)) => (DialogKind::from_flags(c.broadcast, c.megagroup), c.username.clone()),
        Some(tl::enums::Chat::ChannelForbidden(c)) => (DialogKind::from_flags(c.broadcast, c.megagroup), None),
        Some(_) => (DialogKind::Chat, None),
        None => match &dialog.entity {
            Some(tl::enums::User::User(u)) => (DialogKind::Chat, u.username.clone()),
            _ => (DialogKind::Chat, None),
        },
    };
    Some(DialogInfo { id, name: dialog.title(), kind, username })
}

/// Outgoing private messages name no author; the sender is the account itself.
fn sent_without_author(raw: &tl::enums::Message) -> bool {
    matches!(raw, tl::enums::Message::Message(m) if m.out && m.from_id.is_none())
}

/// `me` is the account's own id, used for outgoing messages without `from_id`.
fn history_message(raw: &tl::enums::Message, me: Option<i64>) -> HistoryMessage {
    let date = |ts: i32| DateTime::<Utc>::from_timestamp(ts as i64, 0).unwrap_or_default();
    match raw {
        tl::enums::Message::Message(m) => HistoryMessage {
            id:        m.id,
            date:      date(m.date),
            // Incoming private messages and channel posts carry no from_id.
            sender_id: match (&m.from_id, m.out) {
                (Some(from), _) => Some(marked_id(from)),
                (None, true)    => me,
                (None, false)   => Some(marked_id(&m.peer_id)),
            },
            text:      m.message.clone(),
        },
        tl::enums::Message::Service(m) => HistoryMessage {
            id:        m.id,
            date:      date(m.date),
            sender_id: m.from_id.as_ref().map(marked_id),
            text:      String::new(),
        },
        tl::enums::Message::Empty(m) => HistoryMessage {
            id:        m.id,
            date:      DateTime::<Utc>::default(),
            sender_id: None,
            text:      String::new(),
        },
    }
}
