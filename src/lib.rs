//! faq-chat - 임베딩 최근접 검색 기반 FAQ 챗봇
//!
//! 고정된 Q&A 코퍼스에서 사용자 질문과 가장 가까운 질문을 찾아
//! 답변과 추천 질문을 돌려줍니다. 답변은 선택적으로 Gemini로 다듬습니다.

pub mod chat;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod knowledge;
pub mod server;

#[cfg(test)]
mod test_support;

// Re-exports
pub use chat::{
    is_greeting, ChatError, ChatResponse, ChatService, ConversationTurn, GeminiRephraser,
    Rephraser, GREETING_REPLY, NO_MATCH_REPLY,
};
pub use config::ChatConfig;
pub use embedding::{EmbeddingProvider, EmbeddingTask, GeminiEmbedding};
pub use knowledge::{
    EmbeddingArtifact, FlatL2Index, IndexError, KnowledgeBase, KnowledgeEntry, Neighbor,
    RetrievalError, Retrieval, RetrievedMatch, Retriever, SimilarityIndex, StartupError,
};
pub use server::{build_router, AppState};
