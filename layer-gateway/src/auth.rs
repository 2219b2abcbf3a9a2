//! Phone login in two stateless steps: request a code, then confirm it.
//!
//! The hash Telegram issues for a code request is bound to the auth key that
//! requested it, so step one always saves the session file and step two
//! reuses it. The file is rewritten only when sign-in succeeds.

use crate::client::{Credentials, SentCode, Telegram};
use crate::errors::{GatewayError, Result};
use crate::session_store::{SessionStore, normalize_phone};

/// Request a login code for `phone`.
///
/// Returns [`SentCode::AlreadyAuthorized`] without sending anything when the
/// stored session is already signed in.
pub async fn request_code(
    telegram:    &dyn Telegram,
    sessions:    &SessionStore,
    phone:       &str,
    credentials: &Credentials,
) -> Result<SentCode> {
    let phone = normalize_phone(phone)?;
    let conn  = telegram.connect(&sessions.path_for(&phone)?, credentials).await?;

    if conn.is_authorized().await? {
        tracing::info!("[gateway] {phone}: already authorized");
        return Ok(SentCode::AlreadyAuthorized);
    }

    let sent = conn.send_code(&phone).await?;
    conn.save_session().await?;
    if let SentCode::Sent { .. } = sent {
        tracing::info!("[gateway] {phone}: login code sent");
    }
    Ok(sent)
}

/// Confirm a login code; on success the session file holds a signed-in key.
pub async fn confirm_code(
    telegram:        &dyn Telegram,
    sessions:        &SessionStore,
    phone:           &str,
    credentials:     &Credentials,
    code:            &str,
    phone_code_hash: &str,
) -> Result<()> {
    let phone = normalize_phone(phone)?;
    let code  = code.trim();
    if code.is_empty() {
        return Err(GatewayError::BadRequest("code must not be empty".into()));
    }
    if phone_code_hash.trim().is_empty() {
        return Err(GatewayError::BadRequest("phone_code_hash must not be empty".into()));
    }
    if !sessions.exists(&phone)? {
        return Err(GatewayError::NoPendingLogin);
    }

    let conn = telegram.connect(&sessions.path_for(&phone)?, credentials).await?;
    conn.sign_in(&phone, code, phone_code_hash.trim()).await?;
    conn.save_session().await?;
    tracing::info!("[gateway] {phone}: signed in");
    Ok(())
}
