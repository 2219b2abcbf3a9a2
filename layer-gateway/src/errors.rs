//! Error type shared by every gateway operation and its HTTP mapping.

use std::io;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use layer_client::InvocationError;
use serde_json::json;

// ─── GatewayError ─────────────────────────────────────────────────────────────

/// Everything that can go wrong while serving a request.
///
/// Only a handful of variants carry their own status code; anything raised by
/// the wrapped client ends up in [`GatewayError::Telegram`] and is reported as
/// a 500 with the library's message.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// `from_date` / `to_date` did not parse.
    #[error("Date must be in DD/MM/YYYY format")]
    BadDate,

    /// Any other malformed input (phone number, empty code, inverted window…).
    #[error("{0}")]
    BadRequest(String),

    /// Neither the request nor the configuration carried API credentials.
    #[error("api_id and api_hash are required")]
    MissingCredentials,

    /// The session file does not exist or is not signed in.
    #[error("session is not authorized; request and confirm a login code first")]
    Unauthorized,

    /// `confirm_code` was called for a phone without a pending code request.
    #[error("no pending login for this phone number; call /send_code first")]
    NoPendingLogin,

    /// The requested chat could not be resolved.
    #[error("Chat not found: {0}")]
    ChatNotFound(String),

    #[error("invalid or expired code")]
    InvalidCode,

    #[error("this phone number is not registered; sign up via an official Telegram app first")]
    SignUpRequired,

    #[error("two-factor password required; password login is not supported")]
    PasswordRequired,

    /// Failure reported by the Telegram client library.
    #[error("{0}")]
    Telegram(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadDate
            | Self::BadRequest(_)
            | Self::MissingCredentials => StatusCode::BAD_REQUEST,
            Self::Unauthorized         => StatusCode::UNAUTHORIZED,
            Self::NoPendingLogin
            | Self::ChatNotFound(_)    => StatusCode::NOT_FOUND,
            Self::InvalidCode
            | Self::SignUpRequired
            | Self::PasswordRequired
            | Self::Telegram(_)
            | Self::Io(_)              => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<InvocationError> for GatewayError {
    fn from(e: InvocationError) -> Self {
        if e.is("AUTH_KEY_UNREGISTERED") || e.is("SESSION_REVOKED") {
            return Self::Unauthorized;
        }
        Self::Telegram(e.to_string())
    }
}

impl From<JsonRejection> for GatewayError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for GatewayError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("[gateway] {status}: {self}");
        } else {
            tracing::debug!("[gateway] {status}: {self}");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
