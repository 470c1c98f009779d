//! 테스트용 가짜 협력자 (임베딩, 재작성기)

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::chat::{ChatService, ConversationTurn, Rephraser};
use crate::embedding::EmbeddingProvider;
use crate::knowledge::{EmbeddingArtifact, FlatL2Index, KnowledgeBase, KnowledgeEntry, Retriever};

/// 등록된 텍스트에 고정 벡터를 돌려주는 임베딩 (모르는 텍스트는 영벡터)
pub struct StaticEmbedding {
    dim: usize,
    vectors: HashMap<String, Vec<f32>>,
    calls: AtomicUsize,
}

impl StaticEmbedding {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            vectors: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for StaticEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .vectors
            .get(text)
            .cloned()
            .unwrap_or_else(|| vec![0.0; self.dim]))
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// 항상 실패하는 임베딩
pub struct FailingEmbedding;

#[async_trait]
impl EmbeddingProvider for FailingEmbedding {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        anyhow::bail!("model unavailable")
    }

    fn dimension(&self) -> usize {
        2
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// 고정 결과를 돌려주는 재작성기
pub struct FixedRephraser {
    result: std::result::Result<String, String>,
    calls: AtomicUsize,
}

impl FixedRephraser {
    pub fn ok(text: &str) -> Self {
        Self {
            result: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn err(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Rephraser for FixedRephraser {
    async fn rephrase(&self, _text: &str, _history: &[ConversationTurn]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone().map_err(|e| anyhow::anyhow!(e))
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// 받은 인자를 기록하고 원문을 그대로 돌려주는 재작성기
#[derive(Default)]
pub struct RecordingRephraser {
    seen: Mutex<Vec<(String, Vec<ConversationTurn>)>>,
}

impl RecordingRephraser {
    pub fn seen(&self) -> Vec<(String, Vec<ConversationTurn>)> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Rephraser for RecordingRephraser {
    async fn rephrase(&self, text: &str, history: &[ConversationTurn]) -> Result<String> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push((text.to_string(), history.to_vec()));
        }
        Ok(text.to_string())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// 지정한 시간만큼 응답하지 않는 재작성기
pub struct SlowRephraser(pub Duration);

#[async_trait]
impl Rephraser for SlowRephraser {
    async fn rephrase(&self, text: &str, _history: &[ConversationTurn]) -> Result<String> {
        tokio::time::sleep(self.0).await;
        Ok(format!("late: {}", text))
    }

    fn name(&self) -> &str {
        "slow"
    }
}

/// 배송 FAQ 두 건으로 구성된 서비스
pub fn shipping_service(
    rephraser: Option<Arc<dyn Rephraser>>,
) -> (ChatService, Arc<StaticEmbedding>) {
    let entries = vec![
        KnowledgeEntry::new("What is shipping time?", "3-5 days"),
        KnowledgeEntry::new("Do you ship internationally?", "Yes"),
    ];
    let artifact = EmbeddingArtifact::from_rows("static", vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    let kb = KnowledgeBase::from_parts(entries, artifact).unwrap();
    let index = FlatL2Index::build(kb.matrix());

    let embedder = Arc::new(
        StaticEmbedding::new(2)
            .with("how long is shipping", vec![0.9, 0.1])
            .with("ship abroad?", vec![0.1, 0.9]),
    );

    let retriever = Retriever::new(Arc::new(kb), Arc::new(index), embedder.clone());
    let mut service = ChatService::new(retriever);
    if let Some(rephraser) = rephraser {
        service = service.with_rephraser(rephraser, Duration::from_secs(5));
    }
    (service, embedder)
}
