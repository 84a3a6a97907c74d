//! Runtime configuration.
//!
//! Defaults match the hosted models the tool was built against; binaries
//! override them from clap arguments (which also read the environment).

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::documents::chunker::MIN_CHUNK_SIZE;
use crate::documents::{QueryOptions, SplitterConfig};

/// Environment variable holding the Gradient access token
pub const ENV_ACCESS_TOKEN: &str = "GRADIENT_ACCESS_TOKEN";
/// Environment variable holding the Gradient workspace id
pub const ENV_WORKSPACE_ID: &str = "GRADIENT_WORKSPACE_ID";
/// Optional override of the Gradient API base URL
pub const ENV_BASE_URL: &str = "GRADIENT_BASE_URL";

pub const DEFAULT_BASE_URL: &str = "https://api.gradient.ai/api";
pub const DEFAULT_LLM_MODEL: &str = "llama2-7b-chat";
pub const DEFAULT_EMBEDDING_MODEL: &str = "bge-large";

/// Segment length in tokens
pub const DEFAULT_CHUNK_SIZE: u32 = 512;
/// Segment overlap in tokens
pub const DEFAULT_CHUNK_OVERLAP: u32 = 20;
/// Maximum tokens generated per answer
pub const DEFAULT_MAX_TOKENS: u32 = 400;
/// Segments retrieved per question
pub const DEFAULT_TOP_K: usize = 2;
/// Texts sent per embedding request
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 10;
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(&'static str),
    #[error("Invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Credentials for the Gradient workspace.
///
/// `Debug` never prints the token.
#[derive(Clone)]
pub struct GradientCredentials {
    pub access_token: String,
    pub workspace_id: String,
}

impl GradientCredentials {
    pub fn new(access_token: impl Into<String>, workspace_id: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            workspace_id: workspace_id.into(),
        }
    }

    /// Read both values from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let access_token = read_env(ENV_ACCESS_TOKEN)?;
        let workspace_id = read_env(ENV_WORKSPACE_ID)?;
        Ok(Self { access_token, workspace_id })
    }
}

impl fmt::Debug for GradientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GradientCredentials")
            .field("access_token", &"<redacted>")
            .field("workspace_id", &self.workspace_id)
            .finish()
    }
}

fn read_env(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingEnv(name)),
    }
}

/// Every tunable of a session
#[derive(Debug, Clone)]
pub struct Settings {
    pub credentials: GradientCredentials,
    pub base_url: String,
    pub llm_model: String,
    pub embedding_model: String,
    pub chunk_size: u32,
    pub chunk_overlap: u32,
    pub max_tokens: u32,
    pub top_k: usize,
    pub embed_batch_size: usize,
    pub context_window: u32,
    pub request_timeout: Duration,
    /// Where uploads are staged while indexing. `None` = system temp dir.
    pub staging_dir: Option<PathBuf>,
}

impl Settings {
    /// Defaults plus the given credentials
    pub fn new(credentials: GradientCredentials) -> Self {
        Self {
            credentials,
            base_url: DEFAULT_BASE_URL.to_string(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            max_tokens: DEFAULT_MAX_TOKENS,
            top_k: DEFAULT_TOP_K,
            embed_batch_size: DEFAULT_EMBED_BATCH_SIZE,
            context_window: crate::context::DEFAULT_CONTEXT_WINDOW,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            staging_dir: None,
        }
    }

    /// Defaults with credentials (and optional base URL) from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Self::new(GradientCredentials::from_env()?);
        if let Ok(base_url) = std::env::var(ENV_BASE_URL) {
            if !base_url.trim().is_empty() {
                settings.base_url = base_url;
            }
        }
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size < MIN_CHUNK_SIZE {
            return Err(invalid("chunk_size", format!("must be at least {}", MIN_CHUNK_SIZE)));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(invalid(
                "chunk_overlap",
                format!("{} must be smaller than chunk_size {}", self.chunk_overlap, self.chunk_size),
            ));
        }
        if self.max_tokens == 0 {
            return Err(invalid("max_tokens", "must be greater than zero"));
        }
        if self.max_tokens >= self.context_window {
            return Err(invalid(
                "max_tokens",
                format!("{} leaves no room in a {} token context window", self.max_tokens, self.context_window),
            ));
        }
        if self.top_k == 0 {
            return Err(invalid("top_k", "must be greater than zero"));
        }
        if self.embed_batch_size == 0 {
            return Err(invalid("embed_batch_size", "must be greater than zero"));
        }
        if self.request_timeout.is_zero() {
            return Err(invalid("request_timeout", "must be greater than zero"));
        }
        if self.credentials.access_token.trim().is_empty() {
            return Err(ConfigError::MissingEnv(ENV_ACCESS_TOKEN));
        }
        if self.credentials.workspace_id.trim().is_empty() {
            return Err(ConfigError::MissingEnv(ENV_WORKSPACE_ID));
        }
        Ok(())
    }

    pub fn splitter(&self) -> SplitterConfig {
        SplitterConfig {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        }
    }

    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            top_k: self.top_k,
            max_tokens: self.max_tokens,
            context_window: self.context_window,
            timeout: self.request_timeout,
        }
    }

    /// Directory used for staging uploads
    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { name, reason: reason.into() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings::new(GradientCredentials::new("token", "workspace"))
    }

    #[test]
    fn test_defaults() {
        let s = settings();
        assert_eq!(s.chunk_size, 512);
        assert_eq!(s.chunk_overlap, 20);
        assert_eq!(s.max_tokens, 400);
        assert_eq!(s.llm_model, "llama2-7b-chat");
        assert_eq!(s.embedding_model, "bge-large");
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_overlap_must_be_smaller() {
        let mut s = settings();
        s.chunk_overlap = 512;
        assert!(matches!(s.validate(), Err(ConfigError::Invalid { name: "chunk_overlap", .. })));
    }

    #[test]
    fn test_tiny_chunk_size_rejected() {
        let mut s = settings();
        s.chunk_size = 3;
        s.chunk_overlap = 0;
        assert!(matches!(s.validate(), Err(ConfigError::Invalid { name: "chunk_size", .. })));

        s.chunk_size = MIN_CHUNK_SIZE;
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_from_env() {
        std::env::remove_var(ENV_ACCESS_TOKEN);
        std::env::set_var(ENV_WORKSPACE_ID, "ws-env");
        assert!(matches!(Settings::from_env(), Err(ConfigError::MissingEnv(ENV_ACCESS_TOKEN))));

        // GRADIENT_BASE_URL is left alone: clap-backed tests read it concurrently
        std::env::set_var(ENV_ACCESS_TOKEN, "tok-env");
        let s = Settings::from_env().unwrap();
        assert_eq!(s.credentials.access_token, "tok-env");
        assert_eq!(s.credentials.workspace_id, "ws-env");
        assert_eq!(s.chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(s.validate().is_ok());

        for name in [ENV_ACCESS_TOKEN, ENV_WORKSPACE_ID] {
            std::env::remove_var(name);
        }
    }

    #[test]
    fn test_zero_top_k_rejected() {
        let mut s = settings();
        s.top_k = 0;
        assert!(matches!(s.validate(), Err(ConfigError::Invalid { name: "top_k", .. })));
    }

    #[test]
    fn test_blank_credentials_rejected() {
        let s = Settings::new(GradientCredentials::new(" ", "workspace"));
        assert!(matches!(s.validate(), Err(ConfigError::MissingEnv(ENV_ACCESS_TOKEN))));
    }

    #[test]
    fn test_debug_redacts_token() {
        let creds = GradientCredentials::new("super-secret", "ws");
        let printed = format!("{:?}", creds);
        assert!(!printed.contains("super-secret"));
        assert!(printed.contains("ws"));
    }
}
