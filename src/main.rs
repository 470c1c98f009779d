//! faq-chat CLI 진입점

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// RUST_LOG 미설정 시 로그 필터
const DEFAULT_LOG_FILTER: &str = "faq_chat=info,tower_http=info";

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = faq_chat::cli::Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start tokio runtime")?;

    runtime.block_on(faq_chat::cli::run(cli))
}
