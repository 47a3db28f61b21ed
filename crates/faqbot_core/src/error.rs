use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("corpus not found at {}", .0.display())]
    NotFound(PathBuf),

    #[error("I/O error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corpus must contain '{0}' column")]
    MissingColumn(&'static str),

    #[error("row {row}: missing required field '{field}'")]
    MissingField { row: usize, field: &'static str },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("line {line}: invalid JSON record: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Raised when the embedding model fails, for the corpus or a live query.
#[derive(Error, Debug)]
#[error("embedding computation failed: {0}")]
pub struct EmbeddingComputeError(pub String);

impl EmbeddingComputeError {
    pub fn from_anyhow(err: anyhow::Error) -> Self {
        Self(format!("{err:#}"))
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum IndexError {
    #[error("cannot build an index from an empty embedding set")]
    Empty,

    #[error("vector {position} has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        position: usize,
        expected: usize,
        actual: usize,
    },

    #[error("k must be at least 1")]
    InvalidK,

    #[error("{vectors} embeddings for {entries} corpus entries")]
    CountMismatch { vectors: usize, entries: usize },
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("failed to write embedding cache {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize embedding cache: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Startup failure. Any of these aborts engine initialization.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Corpus(#[from] CorpusError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingComputeError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
