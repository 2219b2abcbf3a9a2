use serde::Serialize;

use crate::client::{Credentials, Telegram, connect_authorized};
use crate::errors::Result;
use crate::session_store::SessionStore;

/// How a dialog is presented to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogKind {
    Channel,
    Group,
    Chat,
}

impl DialogKind {
    /// Broadcast channels win over supergroups; everything else is a chat.
    pub fn from_flags(broadcast: bool, megagroup: bool) -> Self {
        if broadcast {
            Self::Channel
        } else if megagroup {
            Self::Group
        } else {
            Self::Chat
        }
    }
}

/// A conversation the account takes part in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DialogInfo {
    pub id:       i64,
    pub name:     String,
    #[serde(rename = "type")]
    pub kind:     DialogKind,
    pub username: Option<String>,
}

pub async fn list_dialogs(
    telegram:    &dyn Telegram,
    sessions:    &SessionStore,
    phone:       &str,
    credentials: &Credentials,
) -> Result<Vec<DialogInfo>> {
    let conn    = connect_authorized(telegram, sessions, phone, credentials).await?;
    let dialogs = conn.dialogs().await?;
    tracing::debug!("[gateway] {} dialogs listed", dialogs.len());
    Ok(dialogs)
}
