//! Knowledge 모듈 - FAQ 지식베이스와 최근접 검색
//!
//! - Store: Q&A 코퍼스 + 사전 계산된 질문 임베딩 (시작 시 1회 로드)
//! - Vector: 제곱 L2 최근접 검색 인덱스
//! - Retriever: 1순위 답변 선택 + 추천 질문 도출

mod retriever;
mod store;
mod vector;

// Re-exports
pub use retriever::{
    select_suggestions, RetrievalError, Retrieval, RetrievedMatch, Retriever, MAX_SUGGESTIONS,
};
pub use store::{
    load_artifact, load_corpus, save_artifact, EmbeddingArtifact, EmbeddingMatrix,
    KnowledgeBase, KnowledgeEntry, KnowledgeStats, StartupError,
};
pub use vector::{
    squared_l2, FlatL2Index, IndexError, Neighbor, SimilarityIndex, DEFAULT_TOP_K,
};
