use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::CorpusError;
use crate::model::FaqEntry;

pub const QUESTION_COLUMN: &str = "Question";
pub const ANSWER_COLUMN: &str = "Answer";

/// Ordered FAQ entries. Position `i` here is position `i` in the embedding
/// set and in the similarity index.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    entries: Vec<FaqEntry>,
}

impl Corpus {
    pub fn from_pairs<I, Q, A>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (Q, A)>,
        Q: Into<String>,
        A: Into<String>,
    {
        let entries = pairs
            .into_iter()
            .enumerate()
            .map(|(id, (q, a))| FaqEntry::new(id, q.into(), a.into()))
            .collect();
        Self { entries }
    }

    /// Load a corpus, picking the reader from the file extension: `.jsonl`
    /// for JSON Lines, anything else as CSV.
    pub fn load(path: &Path) -> Result<Self, CorpusError> {
        if !path.exists() {
            return Err(CorpusError::NotFound(path.to_path_buf()));
        }

        let is_jsonl = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("jsonl"));

        let pairs = if is_jsonl {
            read_jsonl(path)?
        } else {
            read_csv(path)?
        };

        let corpus = Self::from_pairs(pairs);
        info!(entries = corpus.len(), path = %path.display(), "loaded FAQ corpus");
        Ok(corpus)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[FaqEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&FaqEntry> {
        self.entries.get(index)
    }

    pub fn match_texts(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.match_text()).collect()
    }
}

fn open(path: &Path) -> Result<File, CorpusError> {
    File::open(path).map_err(|source| CorpusError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn required(value: Option<&str>, row: usize, field: &'static str) -> Result<String, CorpusError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(CorpusError::MissingField { row, field }),
    }
}

fn read_csv(path: &Path) -> Result<Vec<(String, String)>, CorpusError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(open(path)?);

    let headers = reader.headers()?.clone();
    let column = |name: &'static str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or(CorpusError::MissingColumn(name))
    };
    let q_col = column(QUESTION_COLUMN)?;
    let a_col = column(ANSWER_COLUMN)?;

    let mut out = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let row = i + 1;
        let question = required(record.get(q_col), row, QUESTION_COLUMN)?;
        let answer = required(record.get(a_col), row, ANSWER_COLUMN)?;
        out.push((question, answer));
    }

    Ok(out)
}

#[derive(Debug, Deserialize)]
struct RawFaq {
    #[serde(alias = "Question")]
    question: Option<String>,
    #[serde(alias = "Answer")]
    answer: Option<String>,
}

fn read_jsonl(path: &Path) -> Result<Vec<(String, String)>, CorpusError> {
    let reader = BufReader::new(open(path)?);
    let mut out = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let line_no = i + 1;
        let line = line.map_err(|source| CorpusError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let raw: RawFaq = serde_json::from_str(&line).map_err(|source| CorpusError::Json {
            line: line_no,
            source,
        })?;
        let question = required(raw.question.as_deref(), line_no, QUESTION_COLUMN)?;
        let answer = required(raw.answer.as_deref(), line_no, ANSWER_COLUMN)?;
        out.push((question, answer));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_file(suffix: &str, contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_csv_in_order_with_extra_columns() {
        let file = write_file(
            ".csv",
            "Category,Question,Answer\n\
             storage,What is cloud storage?,It keeps files online.\n\
             compute,\"What is a VM, exactly?\",A virtual machine.\n",
        );
        let corpus = Corpus::load(file.path()).unwrap();

        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.entries()[0].id, 0);
        assert_eq!(corpus.entries()[1].question, "What is a VM, exactly?");
        assert_eq!(
            corpus.entries()[0].match_text(),
            "What is cloud storage? It keeps files online."
        );
    }

    #[test]
    fn duplicates_are_kept() {
        let file = write_file(".csv", "Question,Answer\nq,a\nq,a\n");
        let corpus = Corpus::load(file.path()).unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.entries()[1].id, 1);
    }

    #[test]
    fn missing_column_is_rejected() {
        let file = write_file(".csv", "Question,Reply\nq,a\n");
        let err = Corpus::load(file.path()).unwrap_err();
        assert!(matches!(err, CorpusError::MissingColumn("Answer")));
    }

    #[test]
    fn short_row_reports_missing_field() {
        let file = write_file(".csv", "Question,Answer\nq1,a1\nq2\n");
        let err = Corpus::load(file.path()).unwrap_err();
        assert!(matches!(
            err,
            CorpusError::MissingField {
                row: 2,
                field: "Answer"
            }
        ));
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = Corpus::load(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, CorpusError::NotFound(_)));
    }

    #[test]
    fn loads_jsonl_and_skips_blank_lines() {
        let file = write_file(
            ".jsonl",
            "{\"question\":\"q1\",\"answer\":\"a1\"}\n\n{\"Question\":\"q2\",\"Answer\":\"a2\"}\n",
        );
        let corpus = Corpus::load(file.path()).unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.entries()[1].answer, "a2");
    }

    #[test]
    fn jsonl_without_answer_fails() {
        let file = write_file(".jsonl", "{\"question\":\"q1\"}\n");
        let err = Corpus::load(file.path()).unwrap_err();
        assert!(matches!(
            err,
            CorpusError::MissingField {
                row: 1,
                field: "Answer"
            }
        ));
    }

    #[test]
    fn bundled_corpus_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../data/cloud_services_faq.csv");
        let corpus = Corpus::load(&path).unwrap();
        assert_eq!(corpus.len(), 10);
        assert_eq!(corpus.entries()[1].question, "What is cloud storage?");
    }

    #[test]
    fn header_only_csv_is_an_empty_corpus() {
        let file = write_file(".csv", "Question,Answer\n");
        let corpus = Corpus::load(file.path()).unwrap();
        assert!(corpus.is_empty());
    }
}
