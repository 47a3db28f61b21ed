use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::embed::EmbeddingProvider;
use crate::error::{CacheError, EmbeddingComputeError, EngineError};

pub const DEFAULT_BATCH_SIZE: usize = 32;

/// On-disk form of the corpus embeddings: one vector per entry, corpus
/// order, written and read as a single document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingCacheFile {
    pub model_id: String,
    pub dimension: usize,
    pub created_at: DateTime<Utc>,
    pub vectors: Vec<Vec<f32>>,
}

impl EmbeddingCacheFile {
    pub fn new(model_id: impl Into<String>, vectors: Vec<Vec<f32>>) -> Self {
        let dimension = vectors.first().map_or(0, Vec::len);
        Self {
            model_id: model_id.into(),
            dimension,
            created_at: Utc::now(),
            vectors,
        }
    }

    /// Why this cache cannot be used for `expected_len` entries embedded
    /// with `model_id`, or `None` if it can.
    fn rejection(&self, expected_len: usize, model_id: &str) -> Option<String> {
        if self.vectors.len() != expected_len {
            return Some(format!(
                "cache holds {} vectors but corpus has {} entries",
                self.vectors.len(),
                expected_len
            ));
        }
        if self.model_id != model_id {
            return Some(format!(
                "cache built with model '{}', active model is '{}'",
                self.model_id, model_id
            ));
        }
        if let Some(pos) = self.vectors.iter().position(|v| v.len() != self.dimension) {
            return Some(format!(
                "vector {pos} does not have the recorded dimension {}",
                self.dimension
            ));
        }
        None
    }
}

pub fn load_cache(path: &Path) -> anyhow::Result<EmbeddingCacheFile> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file)).context("parse embedding cache json")
}

/// Write to a sibling temp file, then rename over `path`, so a reader never
/// sees a half-written cache.
pub fn save_cache(path: &Path, cache: &EmbeddingCacheFile) -> Result<(), CacheError> {
    let write_err = |source: std::io::Error| CacheError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }

    let tmp = tmp_path(path);
    let file = File::create(&tmp).map_err(write_err)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, cache)?;
    writer.flush().map_err(write_err)?;
    drop(writer);

    fs::rename(&tmp, path).map_err(write_err)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Embed `texts` in order, `batch_size` at a time. All or nothing.
pub fn compute_embeddings<E>(
    provider: &E,
    texts: &[&str],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingComputeError>
where
    E: EmbeddingProvider + ?Sized,
{
    let batch_size = batch_size.max(1);
    let mut out = Vec::with_capacity(texts.len());

    for (n, chunk) in texts.chunks(batch_size).enumerate() {
        let vectors = provider
            .embed_batch(chunk)
            .map_err(EmbeddingComputeError::from_anyhow)?;
        if vectors.len() != chunk.len() {
            return Err(EmbeddingComputeError(format!(
                "model returned {} vectors for a batch of {}",
                vectors.len(),
                chunk.len()
            )));
        }
        out.extend(vectors);
        debug!(batch = n + 1, done = out.len(), total = texts.len(), "embedded batch");
    }

    Ok(out)
}

/// Return one vector per text, reusing the cache at `cache_path` when it
/// matches, otherwise computing and persisting a fresh set.
pub fn get_embeddings<E>(
    provider: &E,
    texts: &[&str],
    cache_path: &Path,
    batch_size: usize,
) -> Result<Vec<Vec<f32>>, EngineError>
where
    E: EmbeddingProvider + ?Sized,
{
    if cache_path.exists() {
        match load_cache(cache_path) {
            Ok(cache) => match cache.rejection(texts.len(), provider.model_id()) {
                None => {
                    info!(
                        vectors = cache.vectors.len(),
                        path = %cache_path.display(),
                        "loaded embedding cache"
                    );
                    return Ok(cache.vectors);
                }
                Some(reason) => warn!(%reason, "embedding cache is stale, recomputing"),
            },
            Err(err) => {
                let reason = format!("{err:#}");
                warn!(%reason, "embedding cache unreadable, recomputing");
            }
        }
    } else {
        info!(path = %cache_path.display(), "no embedding cache, computing");
    }

    let vectors = compute_embeddings(provider, texts, batch_size)?;
    let cache = EmbeddingCacheFile::new(provider.model_id(), vectors);
    save_cache(cache_path, &cache)?;
    info!(
        vectors = cache.vectors.len(),
        dimension = cache.dimension,
        path = %cache_path.display(),
        "embeddings computed and cached"
    );

    Ok(cache.vectors)
}
