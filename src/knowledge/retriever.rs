//! Retriever - 질의 임베딩 → 최근접 검색 → 1순위 답변 + 추천 질문
//!
//! 1순위(거리가 가장 작은) 엔트리의 답변을 사용하고,
//! 나머지 결과에서 1순위를 제외한 질문을 순서대로 최대 3개 추천합니다.

use std::sync::Arc;

use thiserror::Error;

use crate::embedding::EmbeddingProvider;

use super::store::KnowledgeBase;
use super::vector::{IndexError, Neighbor, SimilarityIndex, DEFAULT_TOP_K};

/// 최대 추천 질문 수
pub const MAX_SUGGESTIONS: usize = 3;

// ============================================================================
// Types
// ============================================================================

/// 검색 결과
#[derive(Debug, Clone, PartialEq)]
pub enum Retrieval {
    /// 1순위 매칭 성공
    Match(RetrievedMatch),
    /// 코퍼스에서 아무것도 찾지 못함 (빈 결과)
    NoMatch,
}

/// 1순위 매칭과 추천 질문
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedMatch {
    /// 코퍼스 엔트리 위치
    pub index: usize,
    /// 질의와의 제곱 L2 거리
    pub distance: f32,
    /// 매칭된 질문
    pub question: String,
    /// 매칭된 답변
    pub answer: String,
    /// 추천 질문 (거리순, 1순위 제외)
    pub suggestions: Vec<String>,
}

/// 필수 단계(임베딩/검색) 실패
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("query embedding failed: {0:#}")]
    Embedding(anyhow::Error),

    #[error(transparent)]
    Search(#[from] IndexError),
}

// ============================================================================
// Retriever
// ============================================================================

/// 검색 엔진
///
/// 지식베이스와 인덱스는 읽기 전용이므로 동시 요청 간에 잠금 없이 공유됩니다.
#[derive(Clone)]
pub struct Retriever {
    knowledge: Arc<KnowledgeBase>,
    index: Arc<dyn SimilarityIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    top_k: usize,
}

impl Retriever {
    /// 새 검색 엔진 생성 (top_k = 4)
    pub fn new(
        knowledge: Arc<KnowledgeBase>,
        index: Arc<dyn SimilarityIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            knowledge,
            index,
            embedder,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// 최근접 검색 개수 지정
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// 임베딩 프로바이더 교체
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    /// 텍스트 질의 검색
    ///
    /// 호출 측에서 공백 제거 후 비어 있지 않은 질의만 전달합니다.
    pub async fn retrieve(&self, query: &str) -> Result<Retrieval, RetrievalError> {
        let query_embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(RetrievalError::Embedding)?;

        self.retrieve_vector(&query_embedding)
    }

    /// 임베딩된 질의 검색
    pub fn retrieve_vector(&self, query_embedding: &[f32]) -> Result<Retrieval, RetrievalError> {
        let neighbors = self.index.search(query_embedding, self.top_k)?;

        let Some(primary) = neighbors.first() else {
            return Ok(Retrieval::NoMatch);
        };

        // 인덱스와 코퍼스 길이가 어긋난 경우도 매칭 없음으로 취급
        let Some(entry) = self.knowledge.entry(primary.index) else {
            tracing::warn!(
                "Search returned index {} outside corpus of {}",
                primary.index,
                self.knowledge.len()
            );
            return Ok(Retrieval::NoMatch);
        };

        let suggestions = select_suggestions(&neighbors, primary.index, |i| {
            self.knowledge.entry(i).map(|e| e.question.as_str())
        });

        tracing::debug!(
            "Primary match #{} (distance={:.4}), {} suggestions",
            primary.index,
            primary.distance,
            suggestions.len()
        );

        Ok(Retrieval::Match(RetrievedMatch {
            index: primary.index,
            distance: primary.distance,
            question: entry.question.clone(),
            answer: entry.answer.clone(),
            suggestions,
        }))
    }
}

/// 추천 질문 선택
///
/// 검색 결과 순서대로 1순위 인덱스가 아닌 엔트리의 질문을 최대 3개 모읍니다.
/// 같은 텍스트의 질문이라도 인덱스가 다르면 제외하지 않습니다.
pub fn select_suggestions<'a, F>(neighbors: &[Neighbor], primary: usize, question_of: F) -> Vec<String>
where
    F: Fn(usize) -> Option<&'a str>,
{
    neighbors
        .iter()
        .filter(|n| n.index != primary)
        .filter_map(|n| question_of(n.index))
        .take(MAX_SUGGESTIONS)
        .map(str::to_string)
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
