use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_BATCH_SIZE;
use crate::canned::{default_table, CannedResponse, CannedResponses};
use crate::embed::DEFAULT_HASH_DIM;
use crate::error::ConfigError;

/// Maximum squared L2 distance still accepted as a match. With unit-length
/// embeddings this is the same cut as cosine similarity >= 0.6.
pub const DEFAULT_THRESHOLD: f32 = 0.8;
/// Default for the hashing embedder (cosine >= 0.4). Keyword overlap between
/// a short question and a question-plus-answer text sits well below what a
/// sentence model gives for the same pair.
pub const DEFAULT_HASH_THRESHOLD: f32 = 1.2;
pub const DEFAULT_CORPUS_PATH: &str = "data/cloud_services_faq.csv";
pub const DEFAULT_CACHE_PATH: &str = "data/embeddings_faq.json";
pub const DEFAULT_BIND: &str = "127.0.0.1:8000";
pub const DEFAULT_SAMPLE_COUNT: usize = 6;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub corpus_path: PathBuf,
    pub cache_path: PathBuf,
    /// Unset means the default of the configured embedding model.
    pub threshold: Option<f32>,
    pub batch_size: usize,
    pub model: ModelConfig,
    pub messages: Messages,
    /// Replaces the built-in pleasantries when present. Order is kept.
    pub canned: Option<Vec<CannedResponse>>,
    pub server: ServerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            corpus_path: PathBuf::from(DEFAULT_CORPUS_PATH),
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            threshold: None,
            batch_size: DEFAULT_BATCH_SIZE,
            model: ModelConfig::default(),
            messages: Messages::default(),
            canned: None,
            server: ServerConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn effective_threshold(&self) -> f32 {
        self.threshold.unwrap_or_else(|| self.model.default_threshold())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.effective_threshold();
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "threshold must be a non-negative number, got {threshold}"
            )));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be >= 1".to_string()));
        }
        if self.model.model_path.is_some() != self.model.tokenizer_path.is_some() {
            return Err(ConfigError::Invalid(
                "model.model_path and model.tokenizer_path must be set together".to_string(),
            ));
        }
        Ok(())
    }

    pub fn canned_responses(&self) -> CannedResponses {
        CannedResponses::new(self.canned.clone().unwrap_or_else(default_table))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// all-MiniLM-L6-v2 `.safetensors` weights. Unset means the hashing
    /// embedder is used.
    pub model_path: Option<PathBuf>,
    pub tokenizer_path: Option<PathBuf>,
    pub hash_dim: usize,
}

impl ModelConfig {
    pub fn uses_minilm(&self) -> bool {
        self.model_path.is_some()
    }

    pub fn default_threshold(&self) -> f32 {
        if self.uses_minilm() {
            DEFAULT_THRESHOLD
        } else {
            DEFAULT_HASH_THRESHOLD
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            tokenizer_path: None,
            hash_dim: DEFAULT_HASH_DIM,
        }
    }
}

/// Fixed replies for the non-answer branches of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Messages {
    pub empty_query: String,
    pub setup_broken: String,
    pub no_match: String,
    pub unavailable: String,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            empty_query: "⚠️ Please enter a question.".to_string(),
            setup_broken:
                "⚠️ Embeddings are empty in the similarity index. Please check the FAQ setup."
                    .to_string(),
            no_match: "❗ Sorry, this chatbot can only help with cloud services. Please ask something related!"
                .to_string(),
            unavailable: "Chatbot core not available. Please check backend setup.".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub cors_origins: Vec<String>,
    pub request_timeout_ms: u64,
    pub default_sample_count: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            default_sample_count: DEFAULT_SAMPLE_COUNT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.threshold, None);
        assert_eq!(config.effective_threshold(), DEFAULT_HASH_THRESHOLD);
        assert_eq!(config.canned_responses().len(), 8);
    }

    #[test]
    fn partial_document_overrides_only_given_fields() {
        let config = EngineConfig::from_toml_str(
            r#"
            threshold = 0.5
            corpus_path = "faq.jsonl"

            [messages]
            no_match = "Out of scope."

            [[canned]]
            trigger = "ping"
            reply = "pong"

            [server]
            bind = "0.0.0.0:9000"
            "#,
        )
        .unwrap();

        assert_eq!(config.threshold, Some(0.5));
        assert_eq!(config.effective_threshold(), 0.5);
        assert_eq!(config.corpus_path, PathBuf::from("faq.jsonl"));
        assert_eq!(config.cache_path, PathBuf::from(DEFAULT_CACHE_PATH));
        assert_eq!(config.messages.no_match, "Out of scope.");
        assert_eq!(config.messages.empty_query, Messages::default().empty_query);
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.server.default_sample_count, 6);

        let canned = config.canned_responses();
        assert_eq!(canned.len(), 1);
        assert_eq!(canned.find("ping me").unwrap().reply, "pong");
    }

    #[test]
    fn bundled_config_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../faqbot.toml");
        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.corpus_path, PathBuf::from(DEFAULT_CORPUS_PATH));
        assert_eq!(config.model.model_path, None);
        assert_eq!(config.effective_threshold(), DEFAULT_HASH_THRESHOLD);
        assert_eq!(config.server.request_timeout_ms, 10_000);
    }

    #[test]
    fn threshold_default_follows_the_model() {
        let config = EngineConfig::from_toml_str(
            "[model]\nmodel_path = \"m.safetensors\"\ntokenizer_path = \"t.json\"",
        )
        .unwrap();
        assert_eq!(config.effective_threshold(), DEFAULT_THRESHOLD);

        let pinned = EngineConfig {
            threshold: Some(0.3),
            ..config
        };
        assert_eq!(pinned.effective_threshold(), 0.3);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            EngineConfig::from_toml_str("threshold = -1.0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("batch_size = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("[model]\nmodel_path = \"m.safetensors\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("threshold = \"high\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
