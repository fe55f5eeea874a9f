//! HTTP facade over the notebook client.
//!
//! Every response body is JSON carrying a `success` flag, except `/health`.
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `POST /ask`, `POST /api/chat` | Ask the selected notebook a question |
//! | `GET /api/status` | Client lifecycle snapshot |
//! | `POST /api/notebook/rediscover` | Re-run notebook selection |
//! | `POST /api/notebook/restart` | Restart the notebook process |
//! | `GET /api/financial-ratios` | Contents of `dynamic_ratios.json` |
//! | `POST /api/executive-summary/generate` | Executive summary in `en` or `es` |
//! | `GET /health` | Liveness check |

mod error;
mod handlers;

pub use error::{ApiError, ErrorBody};
pub use handlers::{ChatRequest, ChatResponse, SummaryRequest, NO_NOTEBOOK_MESSAGE};

use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::mcp::NotebookClient;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    /// The notebook client.
    pub client: Arc<NotebookClient>,
    /// Directory holding `dynamic_ratios.json`.
    pub data_dir: Option<PathBuf>,
}

impl AppState {
    /// Creates handler state.
    #[must_use]
    pub const fn new(client: Arc<NotebookClient>, data_dir: Option<PathBuf>) -> Self {
        Self { client, data_dir }
    }
}

/// Builds the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ask", post(handlers::chat))
        .route("/api/chat", post(handlers::chat))
        .route("/api/status", get(handlers::status))
        .route("/api/notebook/rediscover", post(handlers::rediscover))
        .route("/api/notebook/restart", post(handlers::restart))
        .route("/api/financial-ratios", get(handlers::financial_ratios))
        .route(
            "/api/executive-summary/generate",
            post(handlers::generate_summary),
        )
        .route("/health", get(handlers::health))
        .with_state(state)
}
