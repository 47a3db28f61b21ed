pub mod cache;
pub mod canned;
pub mod config;
pub mod corpus;
pub mod embed;
pub mod engine;
pub mod error;
pub mod index;
pub mod minilm_embed;
pub mod model;

pub use cache::{
    compute_embeddings, get_embeddings, load_cache, save_cache, EmbeddingCacheFile,
    DEFAULT_BATCH_SIZE,
};
pub use canned::{normalize_query, CannedResponse, CannedResponses};
pub use config::{
    EngineConfig, Messages, ModelConfig, ServerConfig, DEFAULT_HASH_THRESHOLD, DEFAULT_THRESHOLD,
};
pub use corpus::Corpus;
pub use embed::{EmbeddingProvider, HashEmbeddingProvider, DEFAULT_HASH_DIM};
pub use engine::FaqEngine;
pub use error::{
    CacheError, ConfigError, CorpusError, EmbeddingComputeError, EngineError, IndexError,
};
pub use index::{squared_l2, FlatL2Index, Neighbor};
pub use minilm_embed::MiniLmEmbeddingProvider;
pub use model::{FaqEntry, Outcome, Reply};

/// Pick the embedding model the way the CLI flags describe it: weights and
/// tokenizer together select MiniLM, neither selects the hashing embedder.
pub fn make_provider(model: &ModelConfig) -> anyhow::Result<Box<dyn EmbeddingProvider>> {
    match (&model.model_path, &model.tokenizer_path) {
        (Some(weights), Some(tokenizer)) => {
            tracing::info!(model = %weights.display(), "loading MiniLM embedding model");
            Ok(Box::new(MiniLmEmbeddingProvider::load(weights, tokenizer)?))
        }
        (None, None) => Ok(Box::new(HashEmbeddingProvider::new(model.hash_dim))),
        _ => anyhow::bail!("--model-path and --tokenizer-path must both be provided"),
    }
}
