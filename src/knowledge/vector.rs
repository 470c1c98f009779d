//! Similarity Index - 최근접 이웃 검색 트레이트 및 구현
//!
//! 시작 시 임베딩 행렬 전체로 한 번 구성되고, 이후 변경되지 않습니다.
//! 거리 척도는 제곱 유클리드 거리입니다 (작을수록 유사).

use thiserror::Error;

use super::store::EmbeddingMatrix;

/// 기본 최근접 검색 개수 (1순위 답변 + 추천 질문 3개)
pub const DEFAULT_TOP_K: usize = 4;

// ============================================================================
// Types
// ============================================================================

/// 검색 결과 한 건
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// 제곱 유클리드 거리
    pub distance: f32,
    /// 코퍼스 엔트리 위치
    pub index: usize,
}

/// 검색 계약 위반
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    #[error("query dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("k must be at least 1")]
    InvalidK,
}

// ============================================================================
// SimilarityIndex Trait
// ============================================================================

/// 최근접 검색 인터페이스
///
/// 구현체는 거리 오름차순으로 `min(k, len)`개를 반환해야 하며,
/// 거리가 정확히 같으면 인덱스가 작은 쪽이 먼저 옵니다.
pub trait SimilarityIndex: Send + Sync {
    /// k-최근접 검색
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError>;

    /// 색인된 벡터 수
    fn len(&self) -> usize;

    /// 비어 있는지 여부
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 벡터 차원
    fn dimension(&self) -> usize;
}

// ============================================================================
// FlatL2Index
// ============================================================================

/// 전수 비교(brute-force) L2 인덱스
///
/// FAQ 규모(수천 건 이하)에서는 ANN 없이도 충분히 빠릅니다.
#[derive(Debug, Clone)]
pub struct FlatL2Index {
    dim: usize,
    data: Vec<f32>,
}

impl FlatL2Index {
    /// 임베딩 행렬로 인덱스 구성
    pub fn build(matrix: &EmbeddingMatrix) -> Self {
        let index = Self {
            dim: matrix.dimension(),
            data: matrix.as_slice().to_vec(),
        };
        tracing::info!(
            "Similarity index built with {} vectors (dim={})",
            index.len(),
            index.dim
        );
        index
    }
}

impl SimilarityIndex for FlatL2Index {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if k == 0 {
            return Err(IndexError::InvalidK);
        }
        if query.len() != self.dim {
            return Err(IndexError::DimensionMismatch {
                expected: self.dim,
                actual: query.len(),
            });
        }

        let mut neighbors: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dim)
            .enumerate()
            .map(|(index, row)| Neighbor {
                distance: squared_l2(query, row),
                index,
            })
            .collect();

        // 안정 정렬: 동점이면 삽입 순서(작은 인덱스) 유지
        neighbors.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        neighbors.truncate(k);

        Ok(neighbors)
    }

    fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 제곱 유클리드 거리
///
/// 길이가 다르면 짧은 쪽 기준으로 계산합니다. 호출 측에서 차원을 먼저 검증합니다.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

// ============================================================================
// Tests
// ============================================================================
