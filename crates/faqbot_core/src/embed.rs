use anyhow::Result;

/// Text-to-vector model. Implementations must be deterministic for a given
/// text and model, and safe to call from several request threads at once.
pub trait EmbeddingProvider: Send + Sync {
    /// Identifies the model; stored in the embedding cache so that vectors
    /// from a different model are never reused.
    fn model_id(&self) -> &str;

    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, preserving order.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

impl EmbeddingProvider for Box<dyn EmbeddingProvider> {
    fn model_id(&self) -> &str {
        (**self).model_id()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed(text)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_batch(texts)
    }
}

pub const DEFAULT_HASH_DIM: usize = 384;

/// Function words carry no topic; left in, they dominate short questions.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "for", "from", "how",
    "i", "in", "is", "it", "my", "of", "on", "or", "the", "this", "to", "what", "when", "where",
    "which", "who", "why", "with", "you", "your",
];

/// Bag-of-keywords embedding: each lowercase alphanumeric token that is not
/// a stop word is hashed (FNV-1a) into a bucket, then the vector is
/// L2-normalized. Text made only of stop words keeps them; text with no
/// tokens at all hashes the empty token, so every output has unit length.
#[derive(Debug, Clone)]
pub struct HashEmbeddingProvider {
    dim: usize,
    model_id: String,
}

impl HashEmbeddingProvider {
    pub fn new(dim: usize) -> Self {
        let dim = dim.max(8);
        Self {
            dim,
            model_id: format!("hash-fnv1a-{dim}"),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    fn bucket(&self, token: &str) -> usize {
        let mut h: u64 = 0xcbf2_9ce4_8422_2325;
        for b in token.as_bytes() {
            h ^= u64::from(*b);
            h = h.wrapping_mul(0x0100_0000_01b3);
        }
        (h % self.dim as u64) as usize
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_DIM)
    }
}

impl EmbeddingProvider for HashEmbeddingProvider {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        let mut terms: Vec<&str> = tokens
            .iter()
            .copied()
            .filter(|t| !STOP_WORDS.contains(t))
            .collect();
        if terms.is_empty() {
            terms = tokens;
        }
        if terms.is_empty() {
            terms.push("");
        }

        let mut v = vec![0.0f32; self.dim];
        for term in terms {
            v[self.bucket(term)] += 1.0;
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        v.iter_mut().for_each(|x| *x /= norm);

        Ok(v)
    }
}
