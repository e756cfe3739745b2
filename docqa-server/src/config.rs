//! Server configuration read from environment variables.

use std::str::FromStr;

use anyhow::{Context, Result, bail};
use docqa_rag::RagConfig;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8001;
pub const DEFAULT_APP_NAME: &str = "Private Knowledge Q&A";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// SQLite URL; the in-memory store is used when unset.
    pub database_url: Option<String>,
    pub openai_api_key: String,
    pub openai_base_url: Option<String>,
    pub openai_model: String,
    pub embedding_model: String,
    /// Requested embedding size, for models that support truncation.
    pub embedding_dimensions: Option<usize>,
    /// Output size of an embedding model the OpenAI adapter does not know.
    pub embedding_native_dimensions: Option<usize>,
    /// Falls back to `openai_base_url`.
    pub embedding_base_url: Option<String>,
    pub app_url: Option<String>,
    pub app_name: String,
    /// Allowed CORS origins; `*` allows any.
    pub cors_origins: Vec<String>,
    pub rag: RagConfig,
}

impl ServerConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`, which maps a variable name to its value.
    ///
    /// Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let openai_api_key = get("OPENAI_API_KEY").context("OPENAI_API_KEY must be set")?;
        let openai_base_url = get("OPENAI_BASE_URL");

        let defaults = RagConfig::default();
        let rag = RagConfig::builder()
            .chunk_size(parse_or(&get, "CHUNK_SIZE", defaults.chunk_size)?)
            .chunk_overlap(parse_or(&get, "CHUNK_OVERLAP", defaults.chunk_overlap)?)
            .top_k(parse_or(&get, "TOP_K", defaults.top_k)?)
            .min_score(parse_or(&get, "MIN_SCORE", defaults.min_score)?)
            .build()
            .context("invalid retrieval settings")?;

        let cors_origins = get("CORS_ORIGINS")
            .map(|raw| {
                raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect()
            })
            .unwrap_or_else(|| vec!["*".to_string()]);

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or(&get, "PORT", DEFAULT_PORT)?,
            database_url: get("DATABASE_URL"),
            openai_api_key,
            embedding_base_url: get("OPENAI_EMBEDDING_BASE_URL")
                .or_else(|| openai_base_url.clone()),
            openai_base_url,
            openai_model: get("OPENAI_MODEL")
                .unwrap_or_else(|| docqa_rag::openai::DEFAULT_CHAT_MODEL.to_string()),
            embedding_model: get("OPENAI_EMBEDDING_MODEL")
                .unwrap_or_else(|| docqa_rag::openai::DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_dimensions: parse_opt(&get, "OPENAI_EMBEDDING_DIMENSIONS")?,
            embedding_native_dimensions: parse_opt(&get, "OPENAI_EMBEDDING_NATIVE_DIMENSIONS")?,
            app_url: get("OPENAI_APP_URL"),
            app_name: get("OPENAI_APP_NAME").unwrap_or_else(|| DEFAULT_APP_NAME.to_string()),
            cors_origins,
            rag,
        })
    }

    /// Whether any origin is allowed.
    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.is_empty() || self.cors_origins.iter().any(|o| o == "*")
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            bail!("host must not be empty");
        }
        if self.embedding_dimensions == Some(0) || self.embedding_native_dimensions == Some(0) {
            bail!("embedding dimensions must be greater than zero");
        }
        self.rag.validate().context("invalid retrieval settings")?;
        Ok(())
    }
}

fn parse_opt<T, G>(get: &G, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => match raw.parse::<T>() {
            Ok(value) => Ok(Some(value)),
            Err(e) => bail!("{key} has invalid value '{raw}': {e}"),
        },
        None => Ok(None),
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    Ok(parse_opt(get, key)?.unwrap_or(default))
}
