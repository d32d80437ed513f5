//! HTTP request handlers

use super::types::{
    ChatRequest, ChatResponse, ErrorResponse, ModelsResponse, SessionListResponse,
    SessionMessagesResponse, SessionResponse, ToolsResponse,
};
use super::AppState;
use crate::db::DbError;
use crate::runtime::AgentError;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/sessions", get(list_sessions).post(create_session))
        .route("/api/sessions/:id", get(get_session))
        .route("/api/sessions/:id/messages", post(send_message))
        .route("/api/tools", get(list_tools))
        .route("/api/models", get(list_models))
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Sessions
// ============================================================

async fn list_sessions(
    State(state): State<AppState>,
) -> Result<Json<SessionListResponse>, AppError> {
    let sessions = state.db.list_session_summaries()?;
    Ok(Json(SessionListResponse { sessions }))
}

async fn create_session(State(state): State<AppState>) -> Result<Json<SessionResponse>, AppError> {
    let id = state.runtime.create_session().await?;
    let session = state.db.get_session(&id)?;
    Ok(Json(SessionResponse { session }))
}

#[derive(Debug, Deserialize)]
struct GetSessionQuery {
    after_sequence: Option<i64>,
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<GetSessionQuery>,
) -> Result<Json<SessionMessagesResponse>, AppError> {
    state.db.get_session(&id)?;
    let messages = state
        .db
        .get_messages_after(&id, query.after_sequence.unwrap_or(0))?;

    Ok(Json(SessionMessagesResponse {
        session_id: id,
        messages,
    }))
}

// ============================================================
// Turns
// ============================================================

async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if req.text.trim().is_empty() {
        return Err(AppError::BadRequest("Message text is empty".to_string()));
    }

    let messages = state.runtime.process_input(&id, &req.text).await?;
    Ok(Json(ChatResponse { messages }))
}

// ============================================================
// Catalogue
// ============================================================

async fn list_tools(State(state): State<AppState>) -> Json<ToolsResponse> {
    Json(ToolsResponse {
        tools: state.runtime.tool_specs().to_vec(),
    })
}

async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: state.llm_registry.available_model_info(),
        default: state.llm_registry.default_model_id().to_string(),
    })
}

async fn get_version() -> &'static str {
    concat!("chat-agent ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    BadGateway(String),
    Unprocessable(String),
    Internal(String),
}

impl From<AgentError> for AppError {
    fn from(e: AgentError) -> Self {
        let message = e.to_string();
        match e {
            AgentError::ModelBackend { .. } => AppError::BadGateway(message),
            AgentError::TurnIterationLimitExceeded { .. } => AppError::Unprocessable(message),
            AgentError::StoreRead(_) | AgentError::StoreWrite(_) | AgentError::InvalidTransition(_) => {
                AppError::Internal(message)
            }
        }
    }
}

impl From<DbError> for AppError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::SessionNotFound(_) => AppError::NotFound(e.to_string()),
            _ => AppError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
