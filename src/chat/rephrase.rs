//! 답변 재작성 모듈
//!
//! 검색된 답변을 Gemini 생성 API로 한 번 다듬습니다.
//! 실패 처리(원문 답변 사용)는 호출 측 `ChatService`가 담당합니다.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::embedding::GeminiError;

use super::ConversationTurn;

/// 재작성 프롬프트에 포함할 최근 대화 턴 수
pub const HISTORY_WINDOW: usize = 4;

/// Gemini 생성 API 베이스 URL
const GEMINI_MODELS_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

// ============================================================================
// Rephraser Trait
// ============================================================================

/// 재작성 협력자 인터페이스
///
/// 실패할 수 있는 외부 호출입니다. 구현체는 재시도하지 않습니다.
#[async_trait]
pub trait Rephraser: Send + Sync {
    /// 답변 재작성
    ///
    /// # Arguments
    /// * `text` - 검색된 원문 답변
    /// * `history` - 최근 대화 (최대 4턴으로 잘라서 전달됨)
    async fn rephrase(&self, text: &str, history: &[ConversationTurn]) -> Result<String>;

    /// 협력자 이름 (로그용)
    fn name(&self) -> &str;
}

// ============================================================================
// Prompt
// ============================================================================

/// 마지막 `n`개 턴
pub fn recent_turns(history: &[ConversationTurn], n: usize) -> &[ConversationTurn] {
    &history[history.len().saturating_sub(n)..]
}

/// 재작성 프롬프트 생성
///
/// 대화 맥락은 `ROLE: text` 형식으로 한 줄씩 들어갑니다.
pub fn build_prompt(text: &str, history: &[ConversationTurn]) -> String {
    let context: String = recent_turns(history, HISTORY_WINDOW)
        .iter()
        .map(|turn| format!("\n{}: {}", turn.role.to_uppercase(), turn.text))
        .collect();

    format!(
        "You are a helpful assistant. Paraphrase the answer below to be friendly and concise. \
         Keep meaning intact.\n\n\
         Conversation context: {}\n\n\
         Answer to paraphrase:\n{}\n\n\
         Paraphrased answer:\n",
        context, text
    )
}

// ============================================================================
// GeminiRephraser
// ============================================================================

/// Gemini generateContent 기반 재작성기
///
/// ref: https://ai.google.dev/api/generate-content
#[derive(Debug)]
pub struct GeminiRephraser {
    api_key: String,
    client: reqwest::Client,
    model: String,
}

impl GeminiRephraser {
    /// 새 재작성기 생성
    ///
    /// # Arguments
    /// * `api_key` - Google AI API 키
    /// * `model` - 생성 모델 (예: gemini-2.5-flash)
    /// * `timeout` - HTTP 요청 타임아웃
    pub fn new(api_key: String, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            client,
            model: model.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", GEMINI_MODELS_URL, self.model)
    }
}

#[async_trait]
impl Rephraser for GeminiRephraser {
    async fn rephrase(&self, text: &str, history: &[ConversationTurn]) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![GenerateContent {
                parts: vec![GeneratePart {
                    text: build_prompt(text, history),
                }],
            }],
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send generateContent request")?;

        let status = response.status();
        let body = response.text().await.context("Failed to read response body")?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<GeminiError>(&body) {
                anyhow::bail!(
                    "Gemini API error ({}): {}",
                    error.error.status,
                    error.error.message
                );
            }
            anyhow::bail!("Gemini API error ({}): {}", status, body);
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&body).context("Failed to parse generateContent response")?;

        Ok(parsed.text())
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<GenerateContent>,
}

#[derive(Debug, Serialize)]
struct GenerateContent {
    parts: Vec<GeneratePart>,
}

#[derive(Debug, Serialize)]
struct GeneratePart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateResponse {
    /// 첫 후보의 텍스트 파트를 이어 붙인 결과 (없으면 빈 문자열)
    fn text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<String>()
            })
            .unwrap_or_default()
            .trim()
            .to_string()
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<TextPart>,
}

#[derive(Debug, Deserialize)]
struct TextPart {
    text: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================
