//! TOML configuration.
//!
//! Every section except `[db]` is optional and falls back to the defaults
//! below. [`load_config`] parses and validates in one step so that a bad
//! value is reported before any database or network work starts.
//!
//! ```toml
//! [db]
//! path = "./data/rag.sqlite"
//!
//! [embedding]
//! provider = "gemini"
//! model = "text-embedding-004"
//! dims = 768
//!
//! [generation]
//! provider = "gemini"
//! model = "gemini-1.5-flash"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Providers accepted by `[embedding]` and `[generation]`.
pub const PROVIDERS: [&str; 4] = ["disabled", "gemini", "openai", "ollama"];

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Pinned vector dimension. Falls back to `embedding.dims`.
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_true")]
    pub normalize: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dims: None,
            normalize: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    #[serde(default)]
    pub rerank: RerankConfig,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            rerank: RerankConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RerankConfig {
    #[serde(default)]
    pub enabled: bool,
    /// `keyword` or `embedding`.
    #[serde(default = "default_scorer")]
    pub scorer: String,
    #[serde(default = "default_fanout")]
    pub fanout: usize,
    #[serde(default)]
    pub top_k: Option<usize>,
    /// Weight of the first-stage score for the `keyword` scorer.
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f64,
    /// Embedding model used by the `embedding` scorer. Defaults to the
    /// `[embedding]` model.
    #[serde(default)]
    pub model: Option<String>,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            scorer: default_scorer(),
            fanout: default_fanout(),
            top_k: None,
            semantic_weight: default_semantic_weight(),
            model: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override (Ollama host, OpenAI-compatible gateway, ...).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            timeout_secs: default_embedding_timeout(),
            max_retries: default_embedding_retries(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            timeout_secs: default_generation_timeout(),
            max_retries: 0,
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ChatConfig {
    /// Keep only the most recent N history turns. Unlimited when unset.
    #[serde(default)]
    pub max_history_turns: Option<usize>,
    /// Number of recent turns whose user messages are prepended to the
    /// retrieval query.
    #[serde(default)]
    pub history_query_turns: usize,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_top_k() -> usize {
    5
}
fn default_scorer() -> String {
    "keyword".to_string()
}
fn default_fanout() -> usize {
    rag_engine_core::rerank::DEFAULT_FANOUT
}
fn default_semantic_weight() -> f64 {
    0.7
}
fn default_provider() -> String {
    "disabled".to_string()
}
fn default_embedding_timeout() -> u64 {
    30
}
fn default_embedding_retries() -> u32 {
    2
}
fn default_generation_timeout() -> u64 {
    60
}
fn default_max_output_tokens() -> u32 {
    1024
}
fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

impl Config {
    /// Minimal configuration: everything at defaults, providers disabled.
    pub fn minimal(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            index: IndexConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            chat: ChatConfig::default(),
            server: ServerConfig::default(),
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).with_context(|| "Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Vector dimension the index should be pinned to, if known.
    pub fn index_dims(&self) -> Option<usize> {
        self.index.dims.or(self.embedding.dims)
    }

    pub fn validate(&self) -> Result<()> {
        // Retrieval
        if !(1..=100).contains(&self.retrieval.default_top_k) {
            bail!("retrieval.default_top_k must be in [1, 100]");
        }
        let rerank = &self.retrieval.rerank;
        if rerank.fanout == 0 {
            bail!("retrieval.rerank.fanout must be >= 1");
        }
        if rerank.top_k == Some(0) {
            bail!("retrieval.rerank.top_k must be >= 1");
        }
        if !(0.0..=1.0).contains(&rerank.semantic_weight) {
            bail!("retrieval.rerank.semantic_weight must be in [0.0, 1.0]");
        }
        match rerank.scorer.as_str() {
            "keyword" => {}
            "embedding" => {
                if rerank.enabled && !self.embedding.is_enabled() {
                    bail!("retrieval.rerank.scorer = 'embedding' requires an [embedding] provider");
                }
            }
            other => bail!(
                "Unknown rerank scorer: '{}'. Must be keyword or embedding.",
                other
            ),
        }

        // Index
        if self.index.dims == Some(0) {
            bail!("index.dims must be > 0");
        }
        if let (Some(index_dims), Some(embedding_dims)) = (self.index.dims, self.embedding.dims) {
            if index_dims != embedding_dims {
                bail!(
                    "index.dims ({}) does not match embedding.dims ({})",
                    index_dims,
                    embedding_dims
                );
            }
        }

        // Embedding
        check_provider("embedding", &self.embedding.provider)?;
        if self.embedding.is_enabled() {
            if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    self.embedding.provider
                );
            }
        }

        // Generation
        check_provider("generation", &self.generation.provider)?;
        if self.generation.is_enabled() && self.generation.model.is_none() {
            bail!(
                "generation.model must be specified when provider is '{}'",
                self.generation.provider
            );
        }
        if self.generation.max_output_tokens == 0 {
            bail!("generation.max_output_tokens must be > 0");
        }

        Ok(())
    }
}

fn check_provider(section: &str, provider: &str) -> Result<()> {
    if !PROVIDERS.contains(&provider) {
        bail!(
            "Unknown {} provider: '{}'. Must be disabled, gemini, openai, or ollama.",
            section,
            provider
        );
    }
    Ok(())
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    Config::from_toml_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let cfg = Config::from_toml_str("[db]\npath = \"./data/rag.sqlite\"\n").unwrap();
        assert_eq!(cfg.retrieval.default_top_k, 5);
        assert!(cfg.index.normalize);
        assert!(!cfg.retrieval.rerank.enabled);
        assert_eq!(cfg.retrieval.rerank.fanout, 2);
        assert_eq!(cfg.embedding.timeout_secs, 30);
        assert_eq!(cfg.embedding.max_retries, 2);
        assert_eq!(cfg.generation.timeout_secs, 60);
        assert_eq!(cfg.generation.max_retries, 0);
        assert_eq!(cfg.generation.max_output_tokens, 1024);
        assert_eq!(cfg.chat.history_query_turns, 0);
        assert_eq!(cfg.server.bind, "127.0.0.1:8000");
        assert_eq!(cfg.index_dims(), None);
    }

    #[test]
    fn test_full_toml() {
        let cfg = Config::from_toml_str(
            r#"
            [db]
            path = "rag.sqlite"

            [index]
            normalize = false

            [retrieval]
            default_top_k = 3

            [retrieval.rerank]
            enabled = true
            scorer = "keyword"
            fanout = 4
            top_k = 2

            [embedding]
            provider = "ollama"
            model = "nomic-embed-text"
            dims = 768
            url = "http://localhost:11434"

            [generation]
            provider = "gemini"
            model = "gemini-1.5-flash"

            [chat]
            max_history_turns = 10
            history_query_turns = 3
            system_prompt = "Be brief."

            [server]
            bind = "0.0.0.0:9000"
            "#,
        )
        .unwrap();
        assert!(!cfg.index.normalize);
        assert_eq!(cfg.index_dims(), Some(768));
        assert_eq!(cfg.retrieval.rerank.top_k, Some(2));
        assert_eq!(cfg.chat.max_history_turns, Some(10));
        assert_eq!(cfg.chat.system_prompt.as_deref(), Some("Be brief."));
        assert_eq!(cfg.server.bind, "0.0.0.0:9000");
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let err = Config::from_toml_str(
            "[db]\npath = \"x\"\n[embedding]\nprovider = \"faiss\"\nmodel = \"m\"\ndims = 4\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn test_enabled_embedding_requires_model_and_dims() {
        let err = Config::from_toml_str("[db]\npath = \"x\"\n[embedding]\nprovider = \"gemini\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));

        let err = Config::from_toml_str(
            "[db]\npath = \"x\"\n[embedding]\nprovider = \"gemini\"\ndims = 768\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("embedding.model"));
    }

    #[test]
    fn test_enabled_generation_requires_model() {
        let err = Config::from_toml_str("[db]\npath = \"x\"\n[generation]\nprovider = \"openai\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("generation.model"));
    }

    #[test]
    fn test_rejects_mismatched_dims() {
        let err = Config::from_toml_str(
            "[db]\npath = \"x\"\n[index]\ndims = 3\n[embedding]\nprovider = \"ollama\"\nmodel = \"m\"\ndims = 4\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn test_rejects_bad_retrieval_values() {
        assert!(
            Config::from_toml_str("[db]\npath = \"x\"\n[retrieval]\ndefault_top_k = 0\n").is_err()
        );
        assert!(Config::from_toml_str(
            "[db]\npath = \"x\"\n[retrieval.rerank]\nfanout = 0\n"
        )
        .is_err());
        assert!(Config::from_toml_str(
            "[db]\npath = \"x\"\n[retrieval.rerank]\nscorer = \"cross-encoder\"\n"
        )
        .is_err());
        assert!(Config::from_toml_str(
            "[db]\npath = \"x\"\n[retrieval.rerank]\nenabled = true\nscorer = \"embedding\"\n"
        )
        .is_err());
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Path::new("/nonexistent/rag.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
