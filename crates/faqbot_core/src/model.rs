use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct FaqEntry {
    pub id: usize,
    pub question: String,
    pub answer: String,
    match_text: String,
}

impl FaqEntry {
    pub fn new(id: usize, question: String, answer: String) -> Self {
        let match_text = format!("{question} {answer}");
        Self {
            id,
            question,
            answer,
            match_text,
        }
    }

    /// Question and answer joined by a space; the text that gets embedded.
    pub fn match_text(&self) -> &str {
        &self.match_text
    }
}

/// How a request was resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    EmptyQuery,
    Canned { trigger: String },
    Matched { entry_index: usize, distance: f32 },
    NoMatch { best_distance: f32 },
    IndexEmpty,
    EmbeddingFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub text: String,
    pub outcome: Outcome,
}

impl Reply {
    pub fn is_match(&self) -> bool {
        matches!(self.outcome, Outcome::Matched { .. })
    }
}
