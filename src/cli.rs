//! Command-line arguments shared by both binaries.
//!
//! Every flag can also be set from the environment.

use clap::Args;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::config::{
    ConfigError, GradientCredentials, Settings, DEFAULT_BASE_URL, DEFAULT_CHUNK_OVERLAP,
    DEFAULT_CHUNK_SIZE, DEFAULT_EMBEDDING_MODEL, DEFAULT_LLM_MODEL, DEFAULT_MAX_TOKENS,
    DEFAULT_TIMEOUT_SECS, DEFAULT_TOP_K, ENV_ACCESS_TOKEN, ENV_BASE_URL, ENV_WORKSPACE_ID,
};
use crate::documents::SplitterConfig;

/// Gradient connection and model selection
#[derive(Args, Debug, Clone)]
pub struct GradientArgs {
    /// Gradient access token
    #[arg(long, env = ENV_ACCESS_TOKEN, hide_env_values = true)]
    pub gradient_access_token: String,

    /// Gradient workspace id
    #[arg(long, env = ENV_WORKSPACE_ID)]
    pub gradient_workspace_id: String,

    /// Gradient API base URL
    #[arg(long, env = ENV_BASE_URL, default_value = DEFAULT_BASE_URL)]
    pub gradient_base_url: String,

    /// Base model used to answer questions
    #[arg(long, env = "DOCCHAT_LLM_MODEL", default_value = DEFAULT_LLM_MODEL)]
    pub llm_model: String,

    /// Embeddings model used to index the document
    #[arg(long, env = "DOCCHAT_EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    pub embedding_model: String,

    /// Maximum tokens generated per answer
    #[arg(long, env = "DOCCHAT_MAX_TOKENS", default_value_t = DEFAULT_MAX_TOKENS)]
    pub max_tokens: u32,

    /// Segments retrieved per question
    #[arg(long, env = "DOCCHAT_TOP_K", default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,

    /// Timeout for each Gradient request, in seconds
    #[arg(long, env = "DOCCHAT_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Where uploads are staged while indexing (default: system temp dir)
    #[arg(long, env = "DOCCHAT_STAGING_DIR")]
    pub staging_dir: Option<PathBuf>,
}

/// Segment window, in tokens
#[derive(Args, Debug, Clone, Copy)]
pub struct SplitterArgs {
    #[arg(long, env = "DOCCHAT_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: u32,

    #[arg(long, env = "DOCCHAT_CHUNK_OVERLAP", default_value_t = DEFAULT_CHUNK_OVERLAP)]
    pub chunk_overlap: u32,
}

impl SplitterArgs {
    pub fn splitter(&self) -> SplitterConfig {
        SplitterConfig {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        }
    }
}

/// Validated settings from parsed arguments.
pub fn settings_from_args(gradient: &GradientArgs, splitter: &SplitterArgs) -> Result<Settings, ConfigError> {
    let credentials = GradientCredentials::new(
        gradient.gradient_access_token.clone(),
        gradient.gradient_workspace_id.clone(),
    );

    let mut settings = Settings::new(credentials);
    settings.base_url = gradient.gradient_base_url.clone();
    settings.llm_model = gradient.llm_model.clone();
    settings.embedding_model = gradient.embedding_model.clone();
    settings.max_tokens = gradient.max_tokens;
    settings.top_k = gradient.top_k;
    settings.request_timeout = Duration::from_secs(gradient.timeout_secs);
    settings.staging_dir = gradient.staging_dir.clone();
    settings.chunk_size = splitter.chunk_size;
    settings.chunk_overlap = splitter.chunk_overlap;

    settings.validate()?;
    Ok(settings)
}

/// Log to stderr so stdout stays free for chat or JSON output.
///
/// `RUST_LOG` overrides `default_filter`.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}
