//! Chat 모듈 - 질의 → 응답 조립
//!
//! 요청 한 건의 흐름:
//! 인사말 확인 → (임베딩 → 검색) → (선택) 재작성 → 응답
//!
//! 재작성은 부가 단계이므로 실패해도 검색된 원문 답변을 그대로 돌려줍니다.
//! 요청 간에 유지되는 상태는 없습니다.

pub mod rephrase;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::DEFAULT_REPHRASE_TIMEOUT_SECS;
use crate::knowledge::{KnowledgeBase, RetrievalError, Retrieval, Retriever};

pub use rephrase::{build_prompt, recent_turns, GeminiRephraser, Rephraser, HISTORY_WINDOW};

/// 인사말 응답
pub const GREETING_REPLY: &str = "Hi! How can I help?";

/// 매칭 실패 시 응답
pub const NO_MATCH_REPLY: &str = "Sorry, I don't have an answer for that right now.";

/// 검색을 건너뛰는 인사말 (소문자, 정확히 일치)
const GREETINGS: [&str; 4] = ["hi", "hello", "hey", "hello!"];

// ============================================================================
// Types
// ============================================================================

/// 대화 턴 (재작성 맥락용, 요청 범위)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub text: String,
}

fn default_role() -> String {
    "user".to_string()
}

/// 응답 페이로드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_match: Option<String>,
    #[serde(default)]
    pub suggested_questions: Vec<String>,
}

impl ChatResponse {
    fn canned(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            top_match: None,
            suggested_questions: Vec::new(),
        }
    }
}

/// 요청 처리 실패
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("No user_input provided")]
    EmptyInput,

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
}

// ============================================================================
// ChatService
// ============================================================================

/// 응답 조립기
///
/// 시작 시 한 번 만들어 모든 요청이 공유합니다.
#[derive(Clone)]
pub struct ChatService {
    retriever: Retriever,
    rephraser: Option<Arc<dyn Rephraser>>,
    rephrase_timeout: Duration,
}

impl ChatService {
    /// 재작성 없이 생성
    pub fn new(retriever: Retriever) -> Self {
        Self {
            retriever,
            rephraser: None,
            rephrase_timeout: Duration::from_secs(DEFAULT_REPHRASE_TIMEOUT_SECS),
        }
    }

    /// 재작성기 연결 (연결되면 재작성 활성화)
    pub fn with_rephraser(mut self, rephraser: Arc<dyn Rephraser>, timeout: Duration) -> Self {
        self.rephraser = Some(rephraser);
        self.rephrase_timeout = timeout;
        self
    }

    pub fn rephrase_enabled(&self) -> bool {
        self.rephraser.is_some()
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        self.retriever.knowledge()
    }

    /// 질의에 대한 응답 생성
    ///
    /// # Arguments
    /// * `user_input` - 사용자 질의 (앞뒤 공백 제거 후 비어 있으면 `EmptyInput`)
    /// * `history` - 최근 대화 (재작성 맥락으로만 사용)
    pub async fn respond(
        &self,
        user_input: &str,
        history: &[ConversationTurn],
    ) -> Result<ChatResponse, ChatError> {
        let query = user_input.trim();
        if query.is_empty() {
            return Err(ChatError::EmptyInput);
        }

        if is_greeting(query) {
            tracing::debug!("Greeting short-circuit");
            return Ok(ChatResponse::canned(GREETING_REPLY));
        }

        let found = match self.retriever.retrieve(query).await? {
            Retrieval::Match(found) => found,
            Retrieval::NoMatch => {
                tracing::debug!("No match for query");
                return Ok(ChatResponse::canned(NO_MATCH_REPLY));
            }
        };

        let reply = self.compose_reply(&found.answer, history).await;

        Ok(ChatResponse {
            reply,
            top_match: Some(found.question),
            suggested_questions: found.suggestions,
        })
    }

    /// 재작성 1회 시도, 실패/빈 결과/타임아웃이면 원문 답변
    async fn compose_reply(&self, answer: &str, history: &[ConversationTurn]) -> String {
        let Some(rephraser) = &self.rephraser else {
            return answer.to_string();
        };

        let recent = recent_turns(history, HISTORY_WINDOW);
        let attempt = tokio::time::timeout(
            self.rephrase_timeout,
            rephraser.rephrase(answer, recent),
        )
        .await;

        match attempt {
            Ok(Ok(text)) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(Ok(_)) => {
                tracing::debug!("{} returned empty text, using retrieved answer", rephraser.name());
                answer.to_string()
            }
            Ok(Err(e)) => {
                tracing::warn!("{} rephrase failed: {:#}", rephraser.name(), e);
                answer.to_string()
            }
            Err(_) => {
                tracing::warn!(
                    "{} rephrase timed out after {:?}",
                    rephraser.name(),
                    self.rephrase_timeout
                );
                answer.to_string()
            }
        }
    }
}

/// 인사말 여부 (공백 제거, 대소문자 무시, 정확히 일치)
pub fn is_greeting(input: &str) -> bool {
    let normalized = input.trim().to_lowercase();
    GREETINGS.contains(&normalized.as_str())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        shipping_service, FailingEmbedding, FixedRephraser, RecordingRephraser, SlowRephraser,
        StaticEmbedding,
    };

    fn turns(n: usize) -> Vec<ConversationTurn> {
        (0..n)
            .map(|i| ConversationTurn {
                role: "user".to_string(),
                text: format!("turn {}", i),
            })
            .collect()
    }

    #[test]
    fn test_is_greeting() {
        assert!(is_greeting("hi"));
        assert!(is_greeting("  Hello "));
        assert!(is_greeting("HEY"));
        assert!(is_greeting("hello!"));
        assert!(!is_greeting("hi!"));
        assert!(!is_greeting("hello there"));
        assert!(!is_greeting("say hi"));
    }

    #[tokio::test]
    async fn test_shipping_scenario() {
        let (service, _) = shipping_service(None);
        let response = service.respond("how long is shipping", &[]).await.unwrap();

        assert_eq!(response.reply, "3-5 days");
        assert_eq!(response.top_match.as_deref(), Some("What is shipping time?"));
        assert_eq!(response.suggested_questions, vec!["Do you ship internationally?"]);
    }

    #[tokio::test]
    async fn test_greeting_skips_embedding() {
        let (service, embedder) = shipping_service(None);
        let response = service.respond("hello", &[]).await.unwrap();

        assert_eq!(response.reply, GREETING_REPLY);
        assert!(response.top_match.is_none());
        assert!(response.suggested_questions.is_empty());
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn test_greeting_substring_takes_retrieval_path() {
        let (service, embedder) = shipping_service(None);
        let response = service.respond("hello, how long is shipping", &[]).await.unwrap();

        assert!(response.top_match.is_some());
        assert_eq!(embedder.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let (service, embedder) = shipping_service(None);
        let err = service.respond("   ", &[]).await.unwrap_err();
        assert!(matches!(err, ChatError::EmptyInput));
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn test_rephrase_success() {
        let rephraser = Arc::new(FixedRephraser::ok("  It usually takes 3-5 days!  "));
        let (service, _) = shipping_service(Some(rephraser));
        let response = service.respond("how long is shipping", &[]).await.unwrap();

        assert_eq!(response.reply, "It usually takes 3-5 days!");
        assert_eq!(response.top_match.as_deref(), Some("What is shipping time?"));
    }

    #[tokio::test]
    async fn test_rephrase_failure_falls_back() {
        let rephraser = Arc::new(FixedRephraser::err("quota exceeded"));
        let (service, _) = shipping_service(Some(rephraser.clone()));
        let response = service.respond("how long is shipping", &[]).await.unwrap();

        assert_eq!(response.reply, "3-5 days");
        assert_eq!(rephraser.calls(), 1);
    }

    #[tokio::test]
    async fn test_rephrase_empty_falls_back() {
        let rephraser = Arc::new(FixedRephraser::ok("   "));
        let (service, _) = shipping_service(Some(rephraser));
        let response = service.respond("how long is shipping", &[]).await.unwrap();

        assert_eq!(response.reply, "3-5 days");
    }

    #[tokio::test]
    async fn test_rephrase_timeout_falls_back() {
        let (service, _) = shipping_service(None);
        let service = service.with_rephraser(
            Arc::new(SlowRephraser(Duration::from_secs(30))),
            Duration::from_millis(50),
        );
        let response = service.respond("how long is shipping", &[]).await.unwrap();

        assert_eq!(response.reply, "3-5 days");
    }

    #[tokio::test]
    async fn test_rephrase_receives_last_four_turns() {
        let rephraser = Arc::new(RecordingRephraser::default());
        let (service, _) = shipping_service(Some(rephraser.clone()));
        service.respond("how long is shipping", &turns(7)).await.unwrap();

        let seen = rephraser.seen();
        assert_eq!(seen.len(), 1);
        let (answer, history) = &seen[0];
        assert_eq!(answer, "3-5 days");
        let texts: Vec<&str> = history.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["turn 3", "turn 4", "turn 5", "turn 6"]);
    }

    #[tokio::test]
    async fn test_greeting_does_not_rephrase() {
        let rephraser = Arc::new(RecordingRephraser::default());
        let (service, _) = shipping_service(Some(rephraser.clone()));
        service.respond("Hey", &turns(2)).await.unwrap();
        assert!(rephraser.seen().is_empty());
    }

    #[tokio::test]
    async fn test_deterministic_without_rephrase() {
        let (service, _) = shipping_service(None);
        let first = service.respond("ship abroad?", &[]).await.unwrap();
        let second = service.respond("ship abroad?", &[]).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_embedding_failure_propagates() {
        let (service, _) = shipping_service(None);
        let service = ChatService::new(service.retriever.clone().with_embedder(Arc::new(FailingEmbedding)));
        let err = service.respond("how long is shipping", &[]).await.unwrap_err();
        assert!(matches!(err, ChatError::Retrieval(RetrievalError::Embedding(_))));
        assert!(err.to_string().contains("query embedding failed"));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_propagates() {
        let (service, _) = shipping_service(None);
        let wrong = Arc::new(StaticEmbedding::new(3));
        let service = ChatService::new(service.retriever.clone().with_embedder(wrong));
        let err = service.respond("how long is shipping", &[]).await.unwrap_err();
        assert!(matches!(err, ChatError::Retrieval(RetrievalError::Search(_))));
    }

    #[tokio::test]
    async fn test_no_match_reply() {
        let artifact = crate::knowledge::EmbeddingArtifact {
            model: "static".to_string(),
            dim: 2,
            vectors: vec![],
        };
        let kb = KnowledgeBase::from_parts(vec![], artifact).unwrap();
        let index = crate::knowledge::FlatL2Index::build(kb.matrix());
        let embedder = Arc::new(StaticEmbedding::new(2));
        let retriever = Retriever::new(Arc::new(kb), Arc::new(index), embedder.clone());

        let rephraser = Arc::new(FixedRephraser::ok("should not be used"));
        let service =
            ChatService::new(retriever).with_rephraser(rephraser.clone(), Duration::from_secs(5));
        let response = service.respond("where is my order", &[]).await.unwrap();

        assert_eq!(response.reply, NO_MATCH_REPLY);
        assert!(response.top_match.is_none());
        assert!(response.suggested_questions.is_empty());
        assert_eq!(embedder.calls(), 1);
        assert_eq!(rephraser.calls(), 0);
    }

    #[test]
    fn test_conversation_turn_defaults() {
        let turn: ConversationTurn = serde_json::from_str(r#"{"text":"hi"}"#).unwrap();
        assert_eq!(turn.role, "user");

        let turn: ConversationTurn = serde_json::from_str(r#"{"role":"bot"}"#).unwrap();
        assert_eq!(turn.text, "");
    }

    #[test]
    fn test_response_serialization_omits_missing_top_match() {
        let value = serde_json::to_value(ChatResponse::canned(GREETING_REPLY)).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"reply": "Hi! How can I help?", "suggested_questions": []})
        );
    }
}
