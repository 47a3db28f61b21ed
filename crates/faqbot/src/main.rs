mod server;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use faqbot_core::{make_provider, EngineConfig, FaqEngine, Outcome};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "faqbot")]
#[command(version, about = "Semantic FAQ chat assistant")]
struct Cli {
    /// TOML configuration file. Flags below override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// FAQ corpus (.csv with Question/Answer columns, or .jsonl).
    #[arg(long, global = true)]
    corpus: Option<PathBuf>,

    /// Embedding cache file.
    #[arg(long, global = true)]
    cache: Option<PathBuf>,

    /// Maximum squared L2 distance accepted as a match. Defaults to 0.8 for
    /// MiniLM and 1.2 for the hashing embedder.
    #[arg(long, global = true)]
    threshold: Option<f32>,

    /// all-MiniLM-L6-v2 .safetensors weights. Requires --tokenizer-path.
    #[arg(long, global = true)]
    model_path: Option<PathBuf>,

    /// tokenizer.json matching --model-path.
    #[arg(long, global = true)]
    tokenizer_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Answer one question.
    Ask {
        #[arg(long)]
        question: String,
        /// Print the full reply as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print random questions from the corpus.
    Sample {
        #[arg(long, default_value_t = faqbot_core::config::DEFAULT_SAMPLE_COUNT)]
        count: usize,
    },
    /// Load the corpus and make sure the embedding cache is current.
    BuildCache,
    /// Run the HTTP API.
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
}

impl Cli {
    fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_file(path)
                .with_context(|| format!("load config {}", path.display()))?,
            None => EngineConfig::default(),
        };

        if let Some(corpus) = &self.corpus {
            config.corpus_path = corpus.clone();
        }
        if let Some(cache) = &self.cache {
            config.cache_path = cache.clone();
        }
        if let Some(threshold) = self.threshold {
            config.threshold = Some(threshold);
        }
        if self.model_path.is_some() || self.tokenizer_path.is_some() {
            config.model.model_path = self.model_path.clone();
            config.model.tokenizer_path = self.tokenizer_path.clone();
        }
        if let Commands::Serve { bind: Some(bind) } = &self.command {
            config.server.bind = bind.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn start_engine(config: &EngineConfig) -> Result<FaqEngine> {
    let provider = make_provider(&config.model)?;
    FaqEngine::init(config, provider).context("initialize FAQ engine")
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.engine_config()?;

    match &cli.command {
        Commands::Ask { question, json } => {
            let engine = start_engine(&config)?;
            let reply = engine.respond_detailed(question);

            if *json {
                println!("{}", serde_json::to_string(&reply)?);
                return Ok(());
            }

            match &reply.outcome {
                Outcome::Matched {
                    entry_index,
                    distance,
                } => println!(
                    "model={} outcome=matched entry_index={} distance={:.4}",
                    engine.model_id(),
                    entry_index,
                    distance
                ),
                Outcome::NoMatch { best_distance } => println!(
                    "model={} outcome=no_match best_distance={:.4} threshold={:.4}",
                    engine.model_id(),
                    best_distance,
                    engine.threshold()
                ),
                Outcome::Canned { trigger } => {
                    println!("model={} outcome=canned trigger={}", engine.model_id(), trigger)
                }
                other => println!("model={} outcome={:?}", engine.model_id(), other),
            }
            println!("{}", reply.text);
        }
        Commands::Sample { count } => {
            let engine = start_engine(&config)?;
            for question in engine.sample_questions(*count) {
                println!("{question}");
            }
        }
        Commands::BuildCache => {
            let engine = start_engine(&config)?;
            println!(
                "model={} entries={} dimension={} cache={}",
                engine.model_id(),
                engine.len(),
                engine.dimension(),
                config.cache_path.display()
            );
        }
        Commands::Serve { .. } => {
            let runtime = tokio::runtime::Runtime::new().context("start tokio runtime")?;
            runtime.block_on(server::serve(config))?;
        }
    }

    Ok(())
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
