//! Knowledge Base - 불변 Q&A 코퍼스 + 질문 임베딩 행렬
//!
//! 프로세스 시작 시 한 번 로드되고 이후에는 읽기 전용입니다.
//! 엔트리의 위치(0..N-1)가 임베딩 행렬의 행 번호와 같습니다.
//!
//! - 코퍼스: `[{"question": ..., "answer": ...}, ...]` JSON 배열
//! - 아티팩트: `{"model": ..., "dim": n, "vectors": [[...], ...]}` JSON

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// 기동 실패 (프로세스가 시작되면 안 됨)
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("corpus file not found: {0} (expected a JSON list of {{question, answer}})")]
    CorpusMissing(PathBuf),

    #[error("failed to load corpus {path}: {reason}")]
    CorpusInvalid { path: PathBuf, reason: String },

    #[error("corpus is empty: {0}")]
    CorpusEmpty(PathBuf),

    #[error("embedding artifact not found: {0} (run `faq-chat precompute` first)")]
    EmbeddingsMissing(PathBuf),

    #[error("failed to load embedding artifact {path}: {reason}")]
    EmbeddingsInvalid { path: PathBuf, reason: String },

    #[error("embedding shape mismatch: {0}")]
    EmbeddingShapeMismatch(String),
}

// ============================================================================
// Types
// ============================================================================

/// 지식베이스 엔트리
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub question: String,
    #[serde(default)]
    pub answer: String,
}

impl KnowledgeEntry {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// 임베딩 아티팩트 (precompute 결과물, 디스크 형식)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingArtifact {
    /// 생성에 사용한 임베딩 모델
    #[serde(default)]
    pub model: String,
    /// 벡터 차원
    pub dim: usize,
    /// 코퍼스 순서와 같은 행 벡터
    pub vectors: Vec<Vec<f32>>,
}

impl EmbeddingArtifact {
    /// 행 벡터로부터 생성 (첫 행 길이를 차원으로 사용)
    pub fn from_rows(model: impl Into<String>, vectors: Vec<Vec<f32>>) -> Self {
        let dim = vectors.first().map(Vec::len).unwrap_or(0);
        Self {
            model: model.into(),
            dim,
            vectors,
        }
    }
}

/// 질문 임베딩 행렬 (row-major, 불변)
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    dim: usize,
    data: Vec<f32>,
}

impl EmbeddingMatrix {
    /// 행 벡터 목록을 검증하여 행렬로 변환
    ///
    /// 모든 행의 길이가 `dim`과 같아야 합니다.
    pub fn from_rows(dim: usize, rows: &[Vec<f32>]) -> Result<Self, StartupError> {
        if dim == 0 {
            return Err(StartupError::EmbeddingShapeMismatch(
                "dimension must be positive".to_string(),
            ));
        }

        let mut data = Vec::with_capacity(dim * rows.len());
        for (i, row) in rows.iter().enumerate() {
            if row.len() != dim {
                return Err(StartupError::EmbeddingShapeMismatch(format!(
                    "row {} has {} values, expected {}",
                    i,
                    row.len(),
                    dim
                )));
            }
            data.extend_from_slice(row);
        }

        Ok(Self { dim, data })
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }

    /// i번째 행
    pub fn row(&self, i: usize) -> Option<&[f32]> {
        let start = i.checked_mul(self.dim)?;
        let end = start.checked_add(self.dim)?;
        self.data.get(start..end)
    }

    /// 평탄화된 전체 데이터
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

/// 지식베이스 통계
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeStats {
    pub entry_count: usize,
    pub dimension: usize,
    pub model: String,
}

// ============================================================================
// KnowledgeBase
// ============================================================================

/// Knowledge Base - 불변 Q&A 저장소
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    entries: Vec<KnowledgeEntry>,
    matrix: EmbeddingMatrix,
    model: String,
}

impl KnowledgeBase {
    /// 코퍼스와 임베딩 아티팩트를 읽어 지식베이스 구성
    ///
    /// # Arguments
    /// * `qa_path` - Q&A JSON 경로
    /// * `embeddings_path` - 임베딩 아티팩트 경로
    pub fn load(qa_path: &Path, embeddings_path: &Path) -> Result<Self, StartupError> {
        let entries = load_corpus(qa_path)?;
        if !embeddings_path.exists() {
            return Err(StartupError::EmbeddingsMissing(embeddings_path.to_path_buf()));
        }
        let artifact = load_artifact(embeddings_path)?;
        let kb = Self::from_parts(entries, artifact)?;

        tracing::info!(
            "Knowledge base loaded: {} entries (dim={}, model={})",
            kb.len(),
            kb.dimension(),
            if kb.model.is_empty() { "-" } else { kb.model.as_str() }
        );
        Ok(kb)
    }

    /// 메모리 상의 엔트리와 아티팩트로 구성
    ///
    /// 행 수가 엔트리 수와 다르면 `EmbeddingShapeMismatch`로 실패합니다.
    /// 내용이 최신인지는 확인하지 않습니다.
    pub fn from_parts(
        entries: Vec<KnowledgeEntry>,
        artifact: EmbeddingArtifact,
    ) -> Result<Self, StartupError> {
        if artifact.vectors.len() != entries.len() {
            return Err(StartupError::EmbeddingShapeMismatch(format!(
                "{} embedding rows for {} corpus entries (re-run precompute)",
                artifact.vectors.len(),
                entries.len()
            )));
        }

        let matrix = EmbeddingMatrix::from_rows(artifact.dim, &artifact.vectors)?;

        Ok(Self {
            entries,
            matrix,
            model: artifact.model,
        })
    }

    pub fn entries(&self) -> &[KnowledgeEntry] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> Option<&KnowledgeEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn matrix(&self) -> &EmbeddingMatrix {
        &self.matrix
    }

    pub fn dimension(&self) -> usize {
        self.matrix.dimension()
    }

    /// 아티팩트를 만든 임베딩 모델 (기록이 없으면 빈 문자열)
    pub fn model(&self) -> &str {
        &self.model
    }

    /// 저장소 통계
    pub fn stats(&self) -> KnowledgeStats {
        KnowledgeStats {
            entry_count: self.len(),
            dimension: self.dimension(),
            model: self.model.clone(),
        }
    }
}

// ============================================================================
// File I/O
// ============================================================================

/// Q&A 코퍼스 로드 (비어 있으면 실패)
pub fn load_corpus(path: &Path) -> Result<Vec<KnowledgeEntry>, StartupError> {
    if !path.exists() {
        return Err(StartupError::CorpusMissing(path.to_path_buf()));
    }

    let raw = std::fs::read_to_string(path).map_err(|e| StartupError::CorpusInvalid {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let entries: Vec<KnowledgeEntry> =
        serde_json::from_str(&raw).map_err(|e| StartupError::CorpusInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    if entries.is_empty() {
        return Err(StartupError::CorpusEmpty(path.to_path_buf()));
    }

    Ok(entries)
}

/// 임베딩 아티팩트 로드
pub fn load_artifact(path: &Path) -> Result<EmbeddingArtifact, StartupError> {
    let raw = std::fs::read_to_string(path).map_err(|e| StartupError::EmbeddingsInvalid {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    serde_json::from_str(&raw).map_err(|e| StartupError::EmbeddingsInvalid {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// 임베딩 아티팩트 저장 (부모 디렉토리 자동 생성)
pub fn save_artifact(path: &Path, artifact: &EmbeddingArtifact) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).context("Failed to create artifact directory")?;
        }
    }

    let json = serde_json::to_string(artifact).context("Failed to serialize embeddings")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write embeddings: {}", path.display()))?;

    tracing::info!(
        "Saved {} embeddings (dim={}) to {}",
        artifact.vectors.len(),
        artifact.dim,
        path.display()
    );
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
