use std::collections::HashSet;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

const CORPUS: &str = "\
Question,Answer
What is cloud storage?,Cloud storage keeps files online.
What is a container?,A container packages code with its dependencies.
How do I reset my password?,Open account settings and choose reset password.
";

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("faq.csv"), CORPUS).unwrap();
        Self { dir }
    }

    fn cache(&self) -> PathBuf {
        self.dir.path().join("embeddings.json")
    }

    fn corpus(&self) -> PathBuf {
        self.dir.path().join("faq.csv")
    }

    fn bin(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("faqbot"));
        cmd.env("RUST_LOG", "warn")
            .arg("--corpus")
            .arg(self.corpus())
            .arg("--cache")
            .arg(self.cache());
        cmd
    }
}

fn stdout_of(assert: &assert_cmd::assert::Assert) -> String {
    String::from_utf8(assert.get_output().stdout.clone()).unwrap()
}

#[test]
fn ask_returns_the_matching_answer() {
    let ws = Workspace::new();
    ws.bin()
        .args(["ask", "--question", "What is cloud storage?"])
        .assert()
        .success()
        .stdout(predicate::str::contains("outcome=matched entry_index=0"))
        .stdout(predicate::str::contains("Cloud storage keeps files online."));
    assert!(ws.cache().exists());
}

#[test]
fn ask_falls_back_for_unrelated_text() {
    let ws = Workspace::new();
    ws.bin()
        .args(["ask", "--question", "asdkjaslkdj random text"])
        .assert()
        .success()
        .stdout(predicate::str::contains("outcome=no_match"))
        .stdout(predicate::str::contains(
            "Sorry, this chatbot can only help with cloud services.",
        ));
}

#[test]
fn ask_json_reports_canned_outcome() {
    let ws = Workspace::new();
    let assert = ws
        .bin()
        .args(["ask", "--json", "--question", "hello there!"])
        .assert()
        .success();

    let json: Value = serde_json::from_str(stdout_of(&assert).trim()).unwrap();
    assert_eq!(json["outcome"]["kind"], "canned");
    assert_eq!(json["outcome"]["trigger"], "hello");
    assert_eq!(
        json["text"],
        "Hi! What can I help you with regarding cloud services?"
    );
}

#[test]
fn build_cache_then_sample() {
    let ws = Workspace::new();
    ws.bin()
        .arg("build-cache")
        .assert()
        .success()
        .stdout(predicate::str::contains("entries=3"))
        .stdout(predicate::str::contains("model=hash-fnv1a-384"));
    assert!(ws.cache().exists());

    let assert = ws
        .bin()
        .args(["sample", "--count", "10"])
        .assert()
        .success();
    let lines: HashSet<String> = stdout_of(&assert).lines().map(str::to_string).collect();
    let expected: HashSet<String> = [
        "What is cloud storage?",
        "What is a container?",
        "How do I reset my password?",
    ]
    .into_iter()
    .map(str::to_string)
    .collect();
    assert_eq!(lines, expected);
}

#[test]
fn stale_cache_is_rebuilt() {
    let ws = Workspace::new();
    std::fs::write(
        ws.cache(),
        r#"{"model_id":"hash-fnv1a-384","dimension":2,"created_at":"2024-01-01T00:00:00Z","vectors":[[0.0,1.0]]}"#,
    )
    .unwrap();

    ws.bin().arg("build-cache").assert().success();

    let cache: Value = serde_json::from_str(&std::fs::read_to_string(ws.cache()).unwrap()).unwrap();
    assert_eq!(cache["vectors"].as_array().unwrap().len(), 3);
    assert_eq!(cache["dimension"], 384);
}

#[test]
fn config_file_is_honored() {
    let ws = Workspace::new();
    let config = ws.dir.path().join("faqbot.toml");
    std::fs::write(
        &config,
        "[messages]\nno_match = \"Only cloud questions, please.\"\n",
    )
    .unwrap();

    ws.bin()
        .arg("--config")
        .arg(&config)
        .args(["ask", "--question", "asdkjaslkdj random text"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Only cloud questions, please."));
}

#[test]
fn bundled_corpus_and_config_answer_out_of_the_box() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
    let dir = tempfile::tempdir().unwrap();

    Command::new(assert_cmd::cargo::cargo_bin!("faqbot"))
        .env("RUST_LOG", "warn")
        .arg("--config")
        .arg(root.join("faqbot.toml"))
        .arg("--corpus")
        .arg(root.join("data/cloud_services_faq.csv"))
        .arg("--cache")
        .arg(dir.path().join("embeddings.json"))
        .args(["ask", "--question", "What is cloud storage?"])
        .assert()
        .success()
        .stdout(predicate::str::contains("outcome=matched entry_index=1"))
        .stdout(predicate::str::contains(
            "Cloud storage is a service that keeps your files on remote servers",
        ));
}

#[test]
fn missing_corpus_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.csv");

    Command::new(assert_cmd::cargo::cargo_bin!("faqbot"))
        .arg("--corpus")
        .arg(&missing)
        .arg("--cache")
        .arg(dir.path().join("embeddings.json"))
        .args(["ask", "--question", "What is cloud storage?"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("corpus not found"));
    assert!(!Path::new(&dir.path().join("embeddings.json")).exists());
}
