//! HTTP surface: request/response shapes and axum handlers.

use axum::extract::{FromRequest, FromRequestParts, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::AppState;
use crate::auth;
use crate::client::SentCode;
use crate::dialogs::{self, DialogInfo};
use crate::errors::{GatewayError, Result};
use crate::history::{self, ChatRef, DateWindow, HistoryRequest, MessageOut};
use crate::session_store::DeleteOutcome;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/send_code", post(send_code))
        .route("/confirm_code", post(confirm_code))
        .route("/delete_session", delete(delete_session))
        .route("/get_dialogs", post(get_dialogs))
        .route("/get_messages", get(get_messages))
}

// ============================================================================
// Extractors
// ============================================================================

/// [`Json`] that answers malformed bodies with the gateway's error body.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(GatewayError))]
pub struct JsonBody<T>(pub T);

/// [`Query`] that answers malformed query strings with the gateway's error body.
#[derive(Debug, FromRequestParts)]
#[from_request(via(Query), rejection(GatewayError))]
pub struct QueryParams<T>(pub T);

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SendCodeRequest {
    pub phone_number: String,
    pub api_id:       Option<i32>,
    pub api_hash:     Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmCodeRequest {
    pub phone_number:    String,
    pub api_id:          Option<i32>,
    pub api_hash:        Option<String>,
    pub code:            String,
    pub phone_code_hash: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteSessionRequest {
    pub phone_number: String,
}

#[derive(Debug, Deserialize)]
pub struct DialogsRequest {
    pub phone_number: String,
    pub api_id:       Option<i32>,
    pub api_hash:     Option<String>,
}

/// Query string of `/get_messages`.
#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    #[serde(alias = "channel_name")]
    pub channel_id:   String,
    pub api_id:       Option<i32>,
    pub api_hash:     Option<String>,
    pub phone_number: String,
    /// `DD/MM/YYYY`
    pub from_date:    String,
    /// `DD/MM/YYYY`
    pub to_date:      String,
    pub limit:        Option<usize>,
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    CodeSent,
    AlreadyAuthorized,
    Authorized,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub status: AuthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_code_hash: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DialogsResponse {
    pub dialogs: Vec<DialogInfo>,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<MessageOut>,
    pub count:    usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status:   &'static str,
    pub data_dir: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status:   "ok",
        data_dir: state.sessions.data_dir().display().to_string(),
    })
}

/// POST /send_code
pub async fn send_code(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<SendCodeRequest>,
) -> Result<Json<AuthResponse>> {
    let credentials = state.credentials(req.api_id, req.api_hash)?;
    let sent = auth::request_code(state.telegram.as_ref(), &state.sessions, &req.phone_number, &credentials).await?;

    Ok(Json(match sent {
        SentCode::Sent { phone_code_hash } => AuthResponse {
            status:          AuthStatus::CodeSent,
            phone_code_hash: Some(phone_code_hash),
        },
        SentCode::AlreadyAuthorized => AuthResponse {
            status:          AuthStatus::AlreadyAuthorized,
            phone_code_hash: None,
        },
    }))
}

/// POST /confirm_code
pub async fn confirm_code(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ConfirmCodeRequest>,
) -> Result<Json<AuthResponse>> {
    let credentials = state.credentials(req.api_id, req.api_hash)?;
    auth::confirm_code(
        state.telegram.as_ref(),
        &state.sessions,
        &req.phone_number,
        &credentials,
        &req.code,
        &req.phone_code_hash,
    ).await?;

    Ok(Json(AuthResponse { status: AuthStatus::Authorized, phone_code_hash: None }))
}

/// DELETE /delete_session
///
/// Reports its own `status` field for all three outcomes instead of the
/// generic error body.
pub async fn delete_session(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<DeleteSessionRequest>,
) -> Response {
    match state.sessions.delete(&req.phone_number) {
        Ok(DeleteOutcome::Deleted) => Json(json!({
            "status":  "success",
            "message": "Session deleted",
        })).into_response(),
        Ok(DeleteOutcome::NotFound) => Json(json!({
            "status":  "not_found",
            "message": "Session file not found",
        })).into_response(),
        Err(e) => {
            tracing::error!("[gateway] Failed to delete session: {e}");
            (e.status(), Json(json!({ "status": "error", "error": e.to_string() }))).into_response()
        }
    }
}

/// POST /get_dialogs
pub async fn get_dialogs(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<DialogsRequest>,
) -> Result<Json<DialogsResponse>> {
    let credentials = state.credentials(req.api_id, req.api_hash)?;
    let dialogs = dialogs::list_dialogs(state.telegram.as_ref(), &state.sessions, &req.phone_number, &credentials).await?;
    Ok(Json(DialogsResponse { dialogs }))
}

/// GET /get_messages
pub async fn get_messages(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<MessagesQuery>,
) -> Result<Json<MessagesResponse>> {
    // Input errors win over session errors.
    let window      = DateWindow::parse(&query.from_date, &query.to_date)?;
    let chat        = ChatRef::parse(&query.channel_id)?;
    let credentials = state.credentials(query.api_id, query.api_hash)?;

    let req = HistoryRequest {
        phone: query.phone_number,
        credentials,
        chat,
        window,
        limit: query.limit,
    };
    let messages: Vec<MessageOut> = history::get_messages(
        state.telegram.as_ref(),
        &state.sessions,
        &state.config.history,
        &req,
    ).await?
        .into_iter()
        .map(MessageOut::from)
        .collect();

    Ok(Json(MessagesResponse { count: messages.len(), messages }))
}

/// Fallback for unknown paths.
pub async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" })))
}
