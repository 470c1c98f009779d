//! CLI 모듈
//!
//! faq-chat CLI 명령어 정의 및 구현
//!
//! - `serve`: HTTP 챗 서버
//! - `ask`: 질문 한 건에 답하고 종료
//! - `precompute`: 코퍼스 질문 임베딩 생성 (오프라인 배치)
//! - `status`: 설정 및 데이터 상태 확인

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::chat::{ChatService, ConversationTurn, GeminiRephraser};
use crate::config::ChatConfig;
use crate::embedding::{
    EmbeddingProvider, EmbeddingTask, GeminiEmbedding, DEFAULT_RATE_LIMIT_RPM, GEMINI_EMBED_MODEL,
};
use crate::knowledge::{
    load_artifact, load_corpus, save_artifact, EmbeddingArtifact, FlatL2Index, KnowledgeBase,
    Retriever,
};
use crate::server::{self, AppState};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "faq-chat")]
#[command(version, about = "FAQ 챗봇 - 임베딩 최근접 검색 기반 Q&A", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// 데이터 경로 (환경변수 FAQ_QA_PATH / FAQ_EMB_PATH 덮어쓰기)
#[derive(Args, Debug, Clone, Default)]
pub struct DataArgs {
    /// Q&A 코퍼스 JSON 경로
    #[arg(long)]
    pub qa_path: Option<PathBuf>,

    /// 질문 임베딩 아티팩트 경로
    #[arg(long)]
    pub embeddings: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// HTTP 챗 서버 실행
    Serve {
        #[command(flatten)]
        data: DataArgs,

        /// 바인드 주소 (예: 127.0.0.1:8000)
        #[arg(short, long)]
        bind: Option<String>,

        /// 답변 재작성 끄기
        #[arg(long)]
        no_rephrase: bool,
    },

    /// 질문 한 건에 답변
    Ask {
        /// 질문
        question: String,

        #[command(flatten)]
        data: DataArgs,

        /// 답변 재작성 끄기
        #[arg(long)]
        no_rephrase: bool,
    },

    /// 코퍼스 질문 임베딩 사전 계산
    Precompute {
        #[command(flatten)]
        data: DataArgs,

        /// 임베딩 차원 (768, 1536, 3072)
        #[arg(short, long)]
        dimension: Option<usize>,

        /// 분당 최대 요청 수
        #[arg(long, default_value_t = DEFAULT_RATE_LIMIT_RPM)]
        rpm: u32,
    },

    /// 상태 확인
    Status {
        #[command(flatten)]
        data: DataArgs,
    },
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = ChatConfig::from_env().context("설정 로드 실패")?;

    match cli.command {
        Commands::Serve {
            data,
            bind,
            no_rephrase,
        } => {
            apply_data_args(&mut config, &data);
            if let Some(bind) = bind {
                config.bind = bind
                    .parse()
                    .with_context(|| format!("잘못된 바인드 주소: {}", bind))?;
            }
            if no_rephrase {
                config.rephrase = false;
            }
            cmd_serve(config).await
        }
        Commands::Ask {
            question,
            data,
            no_rephrase,
        } => {
            apply_data_args(&mut config, &data);
            if no_rephrase {
                config.rephrase = false;
            }
            cmd_ask(config, &question).await
        }
        Commands::Precompute {
            data,
            dimension,
            rpm,
        } => {
            apply_data_args(&mut config, &data);
            if let Some(dimension) = dimension {
                config.embed_dimension = dimension;
            }
            cmd_precompute(config, rpm).await
        }
        Commands::Status { data } => {
            apply_data_args(&mut config, &data);
            cmd_status(&config)
        }
    }
}

fn apply_data_args(config: &mut ChatConfig, data: &DataArgs) {
    if let Some(path) = &data.qa_path {
        config.qa_path = path.clone();
    }
    if let Some(path) = &data.embeddings {
        config.embeddings_path = path.clone();
    }
}

// ============================================================================
// Bootstrap
// ============================================================================

/// 설정으로부터 챗 서비스 구성
///
/// 코퍼스/임베딩 로드, 인덱스 구성, 프로바이더 생성을 한 번에 수행합니다.
/// 하나라도 실패하면 서버는 시작되지 않습니다.
pub fn build_service(config: &ChatConfig) -> Result<ChatService> {
    let knowledge = KnowledgeBase::load(&config.qa_path, &config.embeddings_path)
        .context("지식베이스 로드 실패")?;

    if !knowledge.model().is_empty() && knowledge.model() != GEMINI_EMBED_MODEL {
        tracing::warn!(
            "Embeddings were produced by '{}', queries use '{}'",
            knowledge.model(),
            GEMINI_EMBED_MODEL
        );
    }

    let api_key = config.require_api_key()?.to_string();

    // 질의 임베딩 차원은 아티팩트 차원을 따름
    let embedder = GeminiEmbedding::with_dimension(api_key.clone(), knowledge.dimension())
        .context("임베딩 프로바이더 생성 실패")?
        .with_task(EmbeddingTask::Query);

    let index = FlatL2Index::build(knowledge.matrix());
    let retriever = Retriever::new(Arc::new(knowledge), Arc::new(index), Arc::new(embedder))
        .with_top_k(config.top_k);

    let mut service = ChatService::new(retriever);
    if config.rephrase {
        let rephraser = GeminiRephraser::new(
            api_key,
            config.rephrase_model.clone(),
            config.rephrase_timeout,
        )?;
        tracing::info!("Rephrasing enabled ({})", config.rephrase_model);
        service = service.with_rephraser(Arc::new(rephraser), config.rephrase_timeout);
    } else {
        tracing::info!("Rephrasing disabled");
    }

    Ok(service)
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 서버 명령어 (serve)
async fn cmd_serve(config: ChatConfig) -> Result<()> {
    let service = build_service(&config)?;
    let state = AppState::new(Arc::new(service));
    server::serve(state, config.bind).await
}

/// 질문 명령어 (ask)
async fn cmd_ask(config: ChatConfig, question: &str) -> Result<()> {
    let service = build_service(&config)?;
    let history: Vec<ConversationTurn> = Vec::new();

    let response = service
        .respond(question, &history)
        .await
        .context("응답 생성 실패")?;

    println!("{}", response.reply);

    if let Some(top_match) = &response.top_match {
        println!();
        println!("[*] 매칭 질문: {}", top_match);
    }

    if !response.suggested_questions.is_empty() {
        println!("[*] 추천 질문:");
        for (i, suggestion) in response.suggested_questions.iter().enumerate() {
            println!("    {}. {}", i + 1, suggestion);
        }
    }

    Ok(())
}

/// 임베딩 사전 계산 명령어 (precompute)
///
/// 코퍼스가 바뀔 때마다 다시 실행해야 합니다.
async fn cmd_precompute(config: ChatConfig, rpm: u32) -> Result<()> {
    let api_key = config.require_api_key()?.to_string();

    let entries = load_corpus(&config.qa_path).context("코퍼스 로드 실패")?;
    let questions: Vec<String> = entries.iter().map(|e| e.question.clone()).collect();

    let embedder = GeminiEmbedding::with_dimension(api_key, config.embed_dimension)?
        .with_task(EmbeddingTask::Document)
        .with_rate_limit(rpm);

    println!(
        "[*] 질문 {} 건 임베딩 중 (dim={}, {} RPM)...",
        questions.len(),
        embedder.dimension(),
        rpm
    );

    let vectors = embedder
        .embed_batch(&questions)
        .await
        .context("임베딩 생성 실패")?;

    let artifact = EmbeddingArtifact::from_rows(embedder.name(), vectors);

    // 저장 전에 로드 때와 같은 검증을 거침
    KnowledgeBase::from_parts(entries, artifact.clone()).context("임베딩 검증 실패")?;
    save_artifact(&config.embeddings_path, &artifact)?;

    println!(
        "[OK] {} x {} 임베딩 저장: {}",
        artifact.vectors.len(),
        artifact.dim,
        config.embeddings_path.display()
    );

    Ok(())
}

/// 상태 명령어 (status)
fn cmd_status(config: &ChatConfig) -> Result<()> {
    println!("faq-chat v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 코퍼스: {}", config.qa_path.display());
    println!("[*] 임베딩: {}", config.embeddings_path.display());

    if config.api_key.is_some() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }

    println!(
        "[*] 답변 재작성: {}",
        if config.rephrase {
            format!("사용 ({})", config.rephrase_model)
        } else {
            "사용 안 함".to_string()
        }
    );

    match load_corpus(&config.qa_path) {
        Ok(entries) => {
            println!("[OK] Q&A: {} 건", entries.len());
            if let Some(first) = entries.first() {
                println!("     예: {}", truncate_text(&first.question, 60));
            }
        }
        Err(e) => println!("[!] {}", e),
    }

    match load_artifact(&config.embeddings_path) {
        Ok(artifact) => {
            println!(
                "[OK] 임베딩: {} x {} ({}, {})",
                artifact.vectors.len(),
                artifact.dim,
                if artifact.model.is_empty() { "-" } else { artifact.model.as_str() },
                file_size(&config.embeddings_path)
            );
        }
        Err(e) => println!("[!] {}", e),
    }

    match KnowledgeBase::load(&config.qa_path, &config.embeddings_path) {
        Ok(kb) => {
            let stats = kb.stats();
            println!(
                "[OK] 서비스 시작 가능: {} 건, dim={}, model={}",
                stats.entry_count,
                stats.dimension,
                if stats.model.is_empty() { "-" } else { stats.model.as_str() }
            );
        }
        Err(e) => {
            tracing::debug!("Knowledge base check failed: {}", e);
            println!("[!] 서비스 시작 불가: {}", e);
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

fn file_size(path: &Path) -> String {
    std::fs::metadata(path)
        .map(|m| format_bytes(m.len() as usize))
        .unwrap_or_else(|_| "-".to_string())
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
