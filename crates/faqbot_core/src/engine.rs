use rand::Rng;
use tracing::{error, info, warn};

use crate::cache::get_embeddings;
use crate::canned::{normalize_query, CannedResponses};
use crate::config::{EngineConfig, Messages};
use crate::corpus::Corpus;
use crate::embed::EmbeddingProvider;
use crate::error::{EngineError, IndexError};
use crate::index::FlatL2Index;
use crate::model::{Outcome, Reply};

/// Read-only retrieval engine: built once at startup, then shared by every
/// request.
pub struct FaqEngine {
    corpus: Corpus,
    index: FlatL2Index,
    canned: CannedResponses,
    provider: Box<dyn EmbeddingProvider>,
    threshold: f32,
    messages: Messages,
}

impl std::fmt::Debug for FaqEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaqEngine")
            .field("entries", &self.corpus.len())
            .field("dimension", &self.index.dim())
            .field("model_id", &self.provider.model_id())
            .field("threshold", &self.threshold)
            .finish()
    }
}

impl FaqEngine {
    /// Load the corpus, resolve the embedding cache and build the index.
    pub fn init(
        config: &EngineConfig,
        provider: Box<dyn EmbeddingProvider>,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let corpus = Corpus::load(&config.corpus_path)?;
        let embeddings = get_embeddings(
            provider.as_ref(),
            &corpus.match_texts(),
            &config.cache_path,
            config.batch_size,
        )?;

        Self::from_parts(corpus, &embeddings, provider, config)
    }

    pub fn from_parts(
        corpus: Corpus,
        embeddings: &[Vec<f32>],
        provider: Box<dyn EmbeddingProvider>,
        config: &EngineConfig,
    ) -> Result<Self, EngineError> {
        if embeddings.len() != corpus.len() {
            return Err(IndexError::CountMismatch {
                vectors: embeddings.len(),
                entries: corpus.len(),
            }
            .into());
        }

        let index = FlatL2Index::build(embeddings)?;
        let threshold = config.effective_threshold();
        info!(
            entries = index.len(),
            dimension = index.dim(),
            model = provider.model_id(),
            threshold,
            "similarity index built"
        );

        Ok(Self {
            corpus,
            index,
            canned: config.canned_responses(),
            provider,
            threshold,
            messages: config.messages.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.corpus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corpus.is_empty()
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn model_id(&self) -> &str {
        self.provider.model_id()
    }

    pub fn dimension(&self) -> usize {
        self.index.dim()
    }

    pub fn messages(&self) -> &Messages {
        &self.messages
    }

    pub fn respond(&self, query: &str) -> String {
        self.respond_detailed(query).text
    }

    /// Empty check, canned reply, embedding, top-1 search, threshold.
    /// Every branch ends in a reply; nothing here returns an error.
    pub fn respond_detailed(&self, query: &str) -> Reply {
        if query.trim().is_empty() {
            return self.reply(&self.messages.empty_query, Outcome::EmptyQuery);
        }

        let normalized = normalize_query(query);
        if let Some(canned) = self.canned.find(&normalized) {
            info!(query, trigger = %canned.trigger, "canned response");
            return Reply {
                text: canned.reply.clone(),
                outcome: Outcome::Canned {
                    trigger: canned.trigger.clone(),
                },
            };
        }

        let vector = match self.provider.embed(query) {
            Ok(v) => v,
            Err(err) => {
                let reason = format!("{err:#}");
                error!(query, %reason, "query embedding failed");
                return self.reply(&self.messages.unavailable, Outcome::EmbeddingFailed);
            }
        };

        let nearest = match self.index.nearest(&vector) {
            Ok(n) => n,
            Err(err) => {
                error!(query, error = %err, "query vector rejected by index");
                return self.reply(&self.messages.unavailable, Outcome::EmbeddingFailed);
            }
        };

        let Some(best) = nearest else {
            error!("similarity index is empty");
            return self.reply(&self.messages.setup_broken, Outcome::IndexEmpty);
        };

        match self.corpus.get(best.entry_index) {
            Some(entry) if best.distance <= self.threshold => {
                info!(
                    query,
                    entry_index = best.entry_index,
                    distance = best.distance,
                    question = %entry.question,
                    "matched FAQ entry"
                );
                Reply {
                    text: entry.answer.clone(),
                    outcome: Outcome::Matched {
                        entry_index: best.entry_index,
                        distance: best.distance,
                    },
                }
            }
            _ => {
                warn!(
                    query,
                    best_distance = best.distance,
                    threshold = self.threshold,
                    "no FAQ entry close enough"
                );
                self.reply(
                    &self.messages.no_match,
                    Outcome::NoMatch {
                        best_distance: best.distance,
                    },
                )
            }
        }
    }

    fn reply(&self, text: &str, outcome: Outcome) -> Reply {
        Reply {
            text: text.to_string(),
            outcome,
        }
    }

    pub fn sample_questions(&self, count: usize) -> Vec<String> {
        self.sample_questions_with(&mut rand::thread_rng(), count)
    }

    /// `count` distinct questions drawn uniformly without replacement;
    /// `count` is clamped to the corpus size.
    pub fn sample_questions_with<R>(&self, rng: &mut R, count: usize) -> Vec<String>
    where
        R: Rng + ?Sized,
    {
        let entries = self.corpus.entries();
        let amount = count.min(entries.len());
        if amount == 0 {
            return Vec::new();
        }

        rand::seq::index::sample(rng, entries.len(), amount)
            .into_iter()
            .map(|i| entries[i].question.clone())
            .collect()
    }
}
