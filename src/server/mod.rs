//! HTTP 게이트웨이 - axum 기반 챗 API
//!
//! - `GET /`            상태 확인
//! - `POST /chat`       질의 → 응답
//! - `GET /suggestions` 코퍼스 앞쪽 질문 목록
//!
//! 내부 오류는 `{error, details}` 페이로드로 변환되며 프로세스를 멈추지 않습니다.

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{self, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use uuid::Uuid;

use crate::chat::{ChatError, ChatResponse, ChatService, ConversationTurn};

/// 추천 질문 기본 개수
const DEFAULT_SUGGESTION_LIMIT: usize = 3;

// ============================================================================
// State & Payloads
// ============================================================================

/// 게이트웨이 공유 상태
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(chat: Arc<ChatService>) -> Self {
        Self {
            chat,
            started_at: Utc::now(),
        }
    }
}

/// `POST /chat` 요청 본문
#[derive(Debug, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub user_input: Option<String>,
    #[serde(default)]
    pub history: Option<Vec<ConversationTurn>>,
}

/// 에러 페이로드
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorPayload {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// `POST /chat` 응답 (성공 또는 에러)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChatPayload {
    Reply(ChatResponse),
    Error(ErrorPayload),
}

impl From<ChatError> for ChatPayload {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::EmptyInput => Self::Error(ErrorPayload {
                error: err.to_string(),
                details: None,
            }),
            ChatError::Retrieval(inner) => Self::Error(ErrorPayload {
                error: "Internal error".to_string(),
                details: Some(inner.to_string()),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusPayload {
    status: &'static str,
    endpoints: [&'static str; 3],
    entries: usize,
    dimension: usize,
    rephrase: bool,
    started_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct SuggestionsQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct SuggestionsPayload {
    suggested_questions: Vec<String>,
}

// ============================================================================
// Router
// ============================================================================

/// 라우터 구성
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(cors::Any)
        .allow_methods(cors::Any)
        .allow_headers(cors::Any);

    Router::new()
        .route("/", get(root))
        .route("/chat", post(chat))
        .route("/suggestions", get(suggestions))
        .layer(cors)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 서버 실행 (Ctrl+C 시 정상 종료)
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

/// 핸들러 패닉을 에러 페이로드로 변환
fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let details = panic
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| panic.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_else(|| "handler panicked".to_string());
    tracing::error!("Panic while handling request: {}", details);

    let payload = ChatPayload::Error(ErrorPayload {
        error: "Internal error".to_string(),
        details: Some(details),
    });
    (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn root(State(state): State<AppState>) -> Json<StatusPayload> {
    let knowledge = state.chat.knowledge();
    Json(StatusPayload {
        status: "running",
        endpoints: ["/chat (POST)", "/suggestions (GET)", "/ (GET)"],
        entries: knowledge.len(),
        dimension: knowledge.dimension(),
        rephrase: state.chat.rephrase_enabled(),
        started_at: state.started_at,
    })
}

async fn chat(State(state): State<AppState>, body: Bytes) -> Json<ChatPayload> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("chat", %request_id);

    async move {
        let request = match parse_chat_request(&body) {
            Ok(request) => request,
            Err(payload) => {
                tracing::debug!("Rejected chat request: {:?}", payload.details);
                return Json(ChatPayload::Error(payload));
            }
        };

        let user_input = request.user_input.unwrap_or_default();
        let history = request.history.unwrap_or_default();
        tracing::debug!("Received chat request ({} history turns)", history.len());

        match state.chat.respond(&user_input, &history).await {
            Ok(response) => Json(ChatPayload::Reply(response)),
            Err(ChatError::EmptyInput) => Json(ChatError::EmptyInput.into()),
            Err(e) => {
                tracing::error!("Unexpected error in /chat: {}", e);
                Json(e.into())
            }
        }
    }
    .instrument(span)
    .await
}

/// 요청 본문 파싱 (Content-Type 무관)
///
/// `user_input`이 없거나 문자열이 아니면 빈 입력으로 취급합니다.
fn parse_chat_request(body: &[u8]) -> Result<ChatRequest, ErrorPayload> {
    let invalid = |details: String| ErrorPayload {
        error: "Invalid request".to_string(),
        details: Some(details),
    };

    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| invalid(e.to_string()))?;
    let Some(object) = value.as_object() else {
        return Err(invalid("request body must be a JSON object".to_string()));
    };

    let user_input = object
        .get("user_input")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let history = match object.get("history") {
        None | Some(serde_json::Value::Null) => None,
        Some(raw) => Some(
            serde_json::from_value::<Vec<ConversationTurn>>(raw.clone())
                .map_err(|e| invalid(format!("invalid history: {}", e)))?,
        ),
    };

    Ok(ChatRequest {
        user_input,
        history,
    })
}

async fn suggestions(
    State(state): State<AppState>,
    Query(query): Query<SuggestionsQuery>,
) -> Json<SuggestionsPayload> {
    let limit = query.limit.unwrap_or(DEFAULT_SUGGESTION_LIMIT);
    let suggested_questions = state
        .chat
        .knowledge()
        .entries()
        .iter()
        .take(limit)
        .map(|e| e.question.clone())
        .collect();

    Json(SuggestionsPayload {
        suggested_questions,
    })
}

// ============================================================================
// Tests
// ============================================================================
