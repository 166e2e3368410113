//! Environment-driven configuration for the engine.
//!
//! [`EngineConfig::from_env`] reads the process environment after
//! loading a `.env` file when one is present. The OpenAI credential is
//! required: ingestion and answering cannot operate without it, so its
//! absence is a fatal startup condition rather than a runtime error.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::types::EngineError;

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;
pub const DEFAULT_TOP_K: usize = 5;

/// Engine settings resolved from the process environment.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// API credential for the embedding and completion endpoints.
    pub openai_api_key: String,
    /// Base URL for OpenAI-compatible endpoints.
    pub openai_base_url: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub chat_model: String,
    /// Directory holding the persisted index artifacts.
    pub index_dir: PathBuf,
    /// SQLite file for trainings, questions, and evidence.
    pub records_db: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    /// Timeout applied to embedding and site-fetch requests. The chat
    /// completion stream deliberately runs without one.
    pub request_timeout: Duration,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, EngineError> {
        dotenvy::dotenv().ok();
        let openai_api_key = env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| EngineError::Config("OPENAI_API_KEY is not set".into()))?;

        let config = Self {
            openai_api_key,
            openai_base_url: env_or("ORACULO_OPENAI_BASE_URL", "https://api.openai.com/v1"),
            embedding_model: env_or("ORACULO_EMBEDDING_MODEL", "text-embedding-3-small"),
            embedding_dimensions: env_parse("ORACULO_EMBEDDING_DIMENSIONS", 1536)?,
            chat_model: env_or("ORACULO_CHAT_MODEL", "gpt-4o-mini"),
            index_dir: PathBuf::from(env_or("ORACULO_INDEX_DIR", "knowledge_index")),
            records_db: PathBuf::from(env_or("ORACULO_RECORDS_DB", "oraculo.db")),
            chunk_size: env_parse("ORACULO_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?,
            chunk_overlap: env_parse("ORACULO_CHUNK_OVERLAP", DEFAULT_CHUNK_OVERLAP)?,
            top_k: env_parse("ORACULO_TOP_K", DEFAULT_TOP_K)?,
            request_timeout: Duration::from_secs(env_parse("ORACULO_REQUEST_TIMEOUT_SECS", 30)?),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.chunk_size == 0 {
            return Err(EngineError::Config("chunk size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(EngineError::Config(format!(
                "chunk overlap {} must be smaller than chunk size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.embedding_dimensions == 0 {
            return Err(EngineError::Config(
                "embedding dimensions must be positive".into(),
            ));
        }
        if self.top_k == 0 {
            return Err(EngineError::Config("top_k must be positive".into()));
        }
        Ok(())
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T, EngineError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|err| EngineError::Config(format!("invalid {key}: {err}"))),
        _ => Ok(default),
    }
}
