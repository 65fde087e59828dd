//! Command-line interface for istok.
//!
//! Every command prints JSON to stdout; logs go to stderr.

use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use crate::adapters::{DashboardLink, OllamaAnnotator, RemoteAnnotator, RemoteExtraction};
use crate::config::{load_config, ResolvedConfig};
use crate::fusion::FaultAnalyzer;
use crate::ingest::transcribe;
use crate::tagger::{ModelMeta, TaggerAdapter, TrainingConfig, TrainingCorpus, TrainingReport};

/// istok - entity resolution for equipment fault reports
#[derive(Parser, Debug)]
#[command(name = "istok")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze a fault report
    Analyze {
        /// Report text (reads --input, --audio or stdin if not provided)
        text: Option<String>,

        /// Read the report from a file
        #[arg(short, long, conflicts_with = "audio")]
        input: Option<PathBuf>,

        /// Transcribe an audio report first
        #[arg(short, long)]
        audio: Option<PathBuf>,

        /// Skip the tagger and print only the rule-based report
        #[arg(long)]
        rules_only: bool,
    },

    /// Train the sequence tagger and persist it
    Train {
        /// Glob of corpus JSON files
        #[arg(short, long)]
        corpus: String,

        /// Model directory (defaults to the configured one)
        #[arg(short, long, env = "ISTOK_MODEL_DIR")]
        output: Option<PathBuf>,

        /// Training iterations
        #[arg(long)]
        iterations: Option<usize>,
    },

    /// Ask the remote annotator
    Remote {
        /// Report text
        text: String,

        /// Also build a dashboard link from the answer
        #[arg(long)]
        link: bool,
    },

    /// Show resolved configuration
    Config,
}

#[derive(Debug, Serialize)]
struct TrainOutput<'a> {
    report: &'a TrainingReport,
    model: &'a ModelMeta,
    model_dir: &'a Path,
}

#[derive(Debug, Serialize)]
struct RemoteOutput {
    annotator: String,
    result: RemoteExtraction,
    #[serde(skip_serializing_if = "Option::is_none")]
    link: Option<String>,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let config = load_config()?;
        match self.command {
            Commands::Analyze {
                text,
                input,
                audio,
                rules_only,
            } => analyze(&config, text, input, audio, rules_only).await,
            Commands::Train {
                corpus,
                output,
                iterations,
            } => train(&config, &corpus, output, iterations),
            Commands::Remote { text, link } => remote(&config, &text, link).await,
            Commands::Config => print_json(&config),
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

async fn read_report(
    config: &ResolvedConfig,
    text: Option<String>,
    input: Option<PathBuf>,
    audio: Option<PathBuf>,
) -> Result<String> {
    if let Some(text) = text {
        return Ok(text);
    }
    if let Some(path) = input {
        return std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read input file: {}", path.display()));
    }
    if let Some(path) = audio {
        let transcript = transcribe(&path, &config.transcriber).await?;
        info!(
            language = %transcript.language,
            duration = transcript.duration_seconds,
            "audio transcribed"
        );
        return Ok(transcript.text);
    }
    if io::stdin().is_terminal() {
        anyhow::bail!("No input provided. Pass TEXT, --input <file>, --audio <file> or pipe to stdin");
    }
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read from stdin")?;
    Ok(buffer)
}

fn build_analyzer(config: &ResolvedConfig, tagger: TaggerAdapter) -> Result<FaultAnalyzer> {
    FaultAnalyzer::from_resources(config.lexicon.as_deref(), config.terms.as_deref(), Arc::new(tagger))
}

async fn analyze(
    config: &ResolvedConfig,
    text: Option<String>,
    input: Option<PathBuf>,
    audio: Option<PathBuf>,
    rules_only: bool,
) -> Result<()> {
    let report = read_report(config, text, input, audio).await?;

    if rules_only {
        let analyzer = build_analyzer(config, TaggerAdapter::empty())?;
        return print_json(&analyzer.analyze_rules_only(&report));
    }

    let analyzer = build_analyzer(config, TaggerAdapter::load_or_empty(&config.model_dir))?;
    print_json(&analyzer.analyze(&report))
}

fn train(config: &ResolvedConfig, pattern: &str, output: Option<PathBuf>, iterations: Option<usize>) -> Result<()> {
    let mut corpus = TrainingCorpus::default();
    let mut files = 0;
    for entry in glob::glob(pattern).with_context(|| format!("Invalid corpus glob: {}", pattern))? {
        let path = entry.context("Failed to read corpus path")?;
        corpus.extend(TrainingCorpus::from_file(&path)?);
        files += 1;
    }
    if files == 0 {
        anyhow::bail!("No corpus files match {}", pattern);
    }
    info!(files, examples = corpus.len(), "corpus loaded");

    let training = TrainingConfig {
        iterations: iterations.unwrap_or(config.training.iterations),
        ..config.training.clone()
    };
    let model_dir = output.unwrap_or_else(|| config.model_dir.clone());

    let mut adapter = TaggerAdapter::load_or_empty(&model_dir);
    let report = adapter.fit(&corpus, &training)?.clone();
    let meta = adapter.save(&model_dir)?;

    print_json(&TrainOutput {
        report: &report,
        model: meta,
        model_dir: &model_dir,
    })
}

async fn remote(config: &ResolvedConfig, text: &str, with_link: bool) -> Result<()> {
    let annotator = OllamaAnnotator::new(
        config.remote.url.clone(),
        config.remote.model.clone(),
        config.remote.timeout(),
    );
    let result = annotator.annotate(text).await?;

    let link = match (with_link, result.entities()) {
        (true, Some(entities)) => Some(
            DashboardLink::from_entities(entities)
                .url(&config.remote.dashboard_url)?
                .to_string(),
        ),
        _ => None,
    };

    print_json(&RemoteOutput {
        annotator: annotator.name().to_string(),
        result,
        link,
    })
}
