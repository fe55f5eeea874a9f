//! Route handlers.

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{ApiError, AppState};
use crate::error::ClientError;
use crate::mcp::ClientStatus;
use crate::report::{self, Language};

/// Reply sent when no notebook could be selected.
pub const NO_NOTEBOOK_MESSAGE: &str =
    "Error: Could not automatically find a Notebook ID. Check backend logs.";

/// Body of `POST /ask` and `POST /api/chat`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    /// The user's question.
    pub message: String,
}

/// Chat reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// `false` when the reply is an error notice rather than an answer.
    pub success: bool,
    /// Always `"system"`.
    pub role: String,
    /// Answer text.
    pub content: String,
}

impl ChatResponse {
    fn system(success: bool, content: impl Into<String>) -> Self {
        Self {
            success,
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

/// Body of `POST /api/executive-summary/generate`. May be omitted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SummaryRequest {
    /// `en` (default) or `es`.
    #[serde(default)]
    pub language: Language,
}

#[derive(Serialize)]
pub struct StatusResponse {
    success: bool,
    #[serde(flatten)]
    status: ClientStatus,
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn chat(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = body?;
    if request.message.trim().is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".to_string()));
    }

    tracing::info!(len = request.message.len(), "Chat request");
    match state.client.ask(&request.message).await {
        Ok(answer) => Ok(Json(ChatResponse::system(true, answer))),
        Err(ClientError::NoNotebook) => Ok(Json(ChatResponse::system(false, NO_NOTEBOOK_MESSAGE))),
        Err(e) => Err(e.into()),
    }
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        success: true,
        status: state.client.status(),
    })
}

pub async fn rediscover(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let notebook_id = state.client.rediscover().await?;
    Ok(Json(json!({
        "success": true,
        "notebookId": notebook_id,
    })))
}

pub async fn restart(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state.client.restart().await?;
    Ok(Json(json!({
        "success": true,
        "status": state.client.status(),
    })))
}

pub async fn financial_ratios(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let Some(dir) = state.data_dir.as_deref() else {
        return Err(ApiError::NotFound("no data directory configured".to_string()));
    };

    let Some(report) = report::load_ratios(dir)? else {
        return Err(ApiError::NotFound(format!(
            "{} not found",
            report::ratios_path(dir).display()
        )));
    };

    Ok(Json(json!({
        "success": true,
        "data": report,
    })))
}

pub async fn generate_summary(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<report::SummaryDocument>, ApiError> {
    let request: SummaryRequest = if body.iter().all(u8::is_ascii_whitespace) {
        SummaryRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?
    };

    let report = match state.data_dir.as_deref() {
        Some(dir) => report::load_ratios(dir)?,
        None => None,
    };

    let document =
        report::generate_summary(&state.client, report.as_ref(), request.language).await?;
    Ok(Json(document))
}
