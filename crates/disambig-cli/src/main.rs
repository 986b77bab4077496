//! Command-line driver: stream JSONL mentions through a single decision
//! engine and print a summary.
//!
//! Each input line is one mention object (`name`, optional `orcid`,
//! `affiliation` as string or array, `coauthors`, `journals`). Mentions are
//! processed in order on one engine, matching the engine's single-writer
//! model; shard the input and run several processes to parallelize.

use anyhow::{Context, Result};
use clap::Parser;
use disambig_engine::{
    AuthorRepository, Decision, DecisionEngine, EngineConfig, InMemoryAuthorRepository, Mention,
    Weights,
};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Environment variable consulted for the redaction salt when `--salt` is
/// not given.
const SALT_ENV_VAR: &str = "DISAMBIG_TRACE_SALT";

#[derive(Debug, Parser)]
#[command(
    name = "disambig",
    about = "Incremental author disambiguation over a JSONL mention stream"
)]
struct Args {
    /// JSONL file of mentions, or "-" for stdin.
    #[arg(long, default_value = "-")]
    input: String,

    /// Engine configuration file (JSON). Flags below override its fields.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Scoring mode: "baseline" or "fs".
    #[arg(long)]
    mode: Option<String>,

    /// Score at or above which a mention merges.
    #[arg(long)]
    accept_threshold: Option<f64>,

    /// Score at or below which a mention becomes a new author.
    #[arg(long)]
    reject_threshold: Option<f64>,

    /// Main trace sink (JSONL, append-only).
    #[arg(long)]
    trace: Option<PathBuf>,

    /// Review-queue sink for UNKNOWN decisions.
    #[arg(long)]
    review: Option<PathBuf>,

    /// Redaction salt; falls back to $DISAMBIG_TRACE_SALT.
    #[arg(long)]
    salt: Option<String>,

    /// Run id stamped into every trace record.
    #[arg(long)]
    run_id: Option<String>,

    #[arg(long)]
    top_k: Option<usize>,

    #[arg(long)]
    max_candidates: Option<usize>,
}

fn default_weights() -> Weights {
    [("name", 0.5), ("coauthor", 0.3), ("journal", 0.2)]
        .into_iter()
        .map(|(feature, weight)| (feature.to_string(), weight))
        .collect()
}

fn build_config(args: &Args) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("failed to open config {}", path.display()))?;
            serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("failed to parse config {}", path.display()))?
        }
        None => EngineConfig::baseline(0.70, 0.20, default_weights()),
    };

    if let Some(mode) = &args.mode {
        config.mode = mode.parse().map_err(anyhow::Error::msg)?;
    }
    if let Some(accept) = args.accept_threshold {
        config.accept_threshold = accept;
    }
    if let Some(reject) = args.reject_threshold {
        config.reject_threshold = reject;
    }
    if let Some(trace) = &args.trace {
        config.trace_path = Some(trace.clone());
    }
    if let Some(review) = &args.review {
        config.review_path = Some(review.clone());
    }
    if let Some(salt) = &args.salt {
        config.trace_salt = salt.clone();
    } else if config.trace_salt.is_empty() {
        if let Ok(salt) = std::env::var(SALT_ENV_VAR) {
            config.trace_salt = salt;
        }
    }
    if let Some(top_k) = args.top_k {
        config.top_k = top_k;
    }
    if let Some(max_candidates) = args.max_candidates {
        config.max_candidates = max_candidates;
    }
    Ok(config)
}

fn open_input(input: &str) -> Result<Box<dyn BufRead>> {
    if input == "-" {
        Ok(Box::new(BufReader::new(io::stdin())))
    } else {
        let file =
            File::open(input).with_context(|| format!("failed to open input {input}"))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

#[derive(Debug, Default)]
struct Summary {
    merged: u64,
    new: u64,
    unknown: u64,
    invalid: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = build_config(&args)?;
    let run_id = args
        .run_id
        .clone()
        .unwrap_or_else(|| format!("run_{}", &uuid::Uuid::new_v4().simple().to_string()[..8]));

    let mut engine = DecisionEngine::new(config, InMemoryAuthorRepository::new())
        .context("invalid engine configuration")?
        .with_run_id(run_id.clone());
    info!(run_id = %run_id, "engine ready");

    let mut summary = Summary::default();
    for (line_number, line) in open_input(&args.input)?.lines().enumerate() {
        let line = line.context("failed to read input line")?;
        if line.trim().is_empty() {
            continue;
        }
        let mention: Mention = match serde_json::from_str(&line) {
            Ok(mention) => mention,
            Err(err) => {
                warn!(line = line_number + 1, %err, "skipping unparseable mention");
                summary.invalid += 1;
                continue;
            }
        };
        match engine.decide(&mention) {
            Ok(result) => match result.decision {
                Decision::Merge => summary.merged += 1,
                Decision::New => summary.new += 1,
                Decision::Unknown => summary.unknown += 1,
            },
            Err(err) => {
                warn!(line = line_number + 1, %err, "mention rejected");
                summary.invalid += 1;
            }
        }
    }

    println!("run_id:    {run_id}");
    println!("merged:    {}", summary.merged);
    println!("new:       {}", summary.new);
    println!("unknown:   {}", summary.unknown);
    println!("invalid:   {}", summary.invalid);
    println!("authors:   {}", engine.repository().count());
    Ok(())
}
