//! 설정 모듈 - 환경변수 기반 프로세스 설정
//!
//! 프로세스 시작 시 한 번 읽어서 각 컴포넌트에 명시적으로 전달합니다.
//! CLI 인자가 주어지면 환경변수 값을 덮어씁니다.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::embedding::DEFAULT_DIMENSION;
use crate::knowledge::DEFAULT_TOP_K;

/// Q&A 코퍼스 기본 경로
pub const DEFAULT_QA_PATH: &str = "data/qa_data.json";
/// 사전 계산된 질문 임베딩 기본 경로
pub const DEFAULT_EMB_PATH: &str = "data/question_embs.json";
/// HTTP 서버 기본 바인드 주소
pub const DEFAULT_BIND: &str = "0.0.0.0:8000";
/// 답변 재작성에 사용하는 기본 생성 모델
pub const DEFAULT_REPHRASE_MODEL: &str = "gemini-2.5-flash";
/// 재작성 호출 타임아웃 (초)
pub const DEFAULT_REPHRASE_TIMEOUT_SECS: u64 = 15;

/// API 키 환경변수 (우선순위 순)
pub const API_KEY_VARS: [&str; 3] = ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY", "GENAI_API_KEY"];

// ============================================================================
// ChatConfig
// ============================================================================

/// 프로세스 전역 설정
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Q&A 코퍼스 (JSON 배열)
    pub qa_path: PathBuf,
    /// 질문 임베딩 아티팩트 (JSON)
    pub embeddings_path: PathBuf,
    /// 답변 재작성 사용 여부 (PARAPHRASE_WITH_GENAI)
    pub rephrase: bool,
    /// Gemini API 키
    pub api_key: Option<String>,
    /// precompute 시 사용할 임베딩 차원
    pub embed_dimension: usize,
    /// 최근접 검색 개수
    pub top_k: usize,
    /// 재작성 모델 이름
    pub rephrase_model: String,
    /// 재작성 1회 호출 타임아웃
    pub rephrase_timeout: Duration,
    /// HTTP 바인드 주소
    pub bind: SocketAddr,
}

impl ChatConfig {
    /// 환경변수에서 설정 로드
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 임의의 조회 함수로 설정 로드
    ///
    /// 테스트에서 프로세스 환경변수를 건드리지 않도록 분리되어 있습니다.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let qa_path = lookup("FAQ_QA_PATH")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_QA_PATH.to_string());

        let embeddings_path = lookup("FAQ_EMB_PATH")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_EMB_PATH.to_string());

        // 미설정 시 활성화
        let rephrase = lookup("PARAPHRASE_WITH_GENAI")
            .map(|v| parse_flag(&v))
            .unwrap_or(true);

        let embed_dimension = parse_number(&lookup, "FAQ_EMBED_DIM", DEFAULT_DIMENSION)?;
        let top_k = parse_number(&lookup, "FAQ_TOP_K", DEFAULT_TOP_K)?;
        if top_k == 0 {
            anyhow::bail!("FAQ_TOP_K must be at least 1");
        }

        let rephrase_model = lookup("FAQ_REPHRASE_MODEL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REPHRASE_MODEL.to_string());

        let timeout_secs = parse_number(
            &lookup,
            "FAQ_REPHRASE_TIMEOUT_SECS",
            DEFAULT_REPHRASE_TIMEOUT_SECS,
        )?;

        let bind_str = lookup("FAQ_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind: SocketAddr = bind_str
            .parse()
            .with_context(|| format!("Invalid FAQ_BIND address: {}", bind_str))?;

        Ok(Self {
            qa_path: PathBuf::from(qa_path),
            embeddings_path: PathBuf::from(embeddings_path),
            rephrase,
            api_key: find_api_key(&lookup),
            embed_dimension,
            top_k,
            rephrase_model,
            rephrase_timeout: Duration::from_secs(timeout_secs),
            bind,
        })
    }

    /// API 키 반환 (없으면 설정 방법 안내 에러)
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            anyhow::anyhow!(
                "API key not found. Set GEMINI_API_KEY, GOOGLE_AI_API_KEY or GENAI_API_KEY.\n\
                 Get your API key at: https://aistudio.google.com/app/apikey"
            )
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 우선순위에 따라 비어 있지 않은 첫 API 키를 찾음
pub fn find_api_key<F>(lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    API_KEY_VARS.iter().find_map(|name| {
        let key = lookup(name).filter(|k| !k.is_empty())?;
        tracing::debug!("Using API key from {}", name);
        Some(key)
    })
}

/// "1", "true", "yes" (대소문자 무시)만 참으로 취급
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

fn parse_number<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {}", name, raw)),
        _ => Ok(default),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ChatConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.qa_path, PathBuf::from(DEFAULT_QA_PATH));
        assert_eq!(config.embeddings_path, PathBuf::from(DEFAULT_EMB_PATH));
        assert!(config.rephrase);
        assert!(config.api_key.is_none());
        assert_eq!(config.top_k, 4);
        assert_eq!(config.embed_dimension, 768);
        assert_eq!(config.rephrase_timeout, Duration::from_secs(15));
        assert_eq!(config.bind.port(), 8000);
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("1"));
        assert!(parse_flag("TRUE"));
        assert!(parse_flag(" yes "));
        assert!(!parse_flag("false"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("on"));
    }

    #[test]
    fn test_rephrase_disabled() {
        let config =
            ChatConfig::from_lookup(lookup_from(&[("PARAPHRASE_WITH_GENAI", "False")])).unwrap();
        assert!(!config.rephrase);
    }

    #[test]
    fn test_api_key_priority() {
        let key = find_api_key(lookup_from(&[
            ("GENAI_API_KEY", "genai"),
            ("GOOGLE_AI_API_KEY", "google"),
        ]));
        assert_eq!(key.as_deref(), Some("google"));

        let key = find_api_key(lookup_from(&[("GEMINI_API_KEY", ""), ("GENAI_API_KEY", "genai")]));
        assert_eq!(key.as_deref(), Some("genai"));
    }

    #[test]
    fn test_require_api_key_without_key() {
        let config = ChatConfig::from_lookup(lookup_from(&[])).unwrap();
        let err = config.require_api_key().unwrap_err();
        assert!(err.to_string().contains("API key not found"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(ChatConfig::from_lookup(lookup_from(&[("FAQ_TOP_K", "0")])).is_err());
        assert!(ChatConfig::from_lookup(lookup_from(&[("FAQ_TOP_K", "four")])).is_err());
        assert!(ChatConfig::from_lookup(lookup_from(&[("FAQ_BIND", "nowhere")])).is_err());
    }

    #[test]
    fn test_overrides_from_env() {
        let config = ChatConfig::from_lookup(lookup_from(&[
            ("FAQ_QA_PATH", "/tmp/qa.json"),
            ("FAQ_TOP_K", "6"),
            ("FAQ_REPHRASE_TIMEOUT_SECS", "3"),
            ("FAQ_BIND", "127.0.0.1:9000"),
        ]))
        .unwrap();
        assert_eq!(config.qa_path, PathBuf::from("/tmp/qa.json"));
        assert_eq!(config.top_k, 6);
        assert_eq!(config.rephrase_timeout, Duration::from_secs(3));
        assert_eq!(config.bind.port(), 9000);
    }
}
