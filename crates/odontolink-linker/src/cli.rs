//! Command-line arguments for the `odontolink` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Hybrid entity linker for Hebrew dental text
#[derive(Parser, Debug)]
#[command(name = "odontolink")]
#[command(
    author,
    version,
    about = "Link Hebrew dental mentions to OHD ontology identifiers",
    long_about = r#"
odontolink - hybrid lexical + vector entity linker

Reads tokenizer output (JSONL, one line per record) and writes:
  gazetteer_hits.jsonl      raw gazetteer mentions
  vector_hits.jsonl         raw vector hits
  merged_candidates.jsonl   scored, deduplicated mentions
  final.jsonl               selected identifier per mention, plus bundles

EXAMPLES:
  odontolink run-all --input tokens.jsonl --out-dir out/
  odontolink build-index
  odontolink check-artifacts
"#
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (default: $ODONTOLINK_CONFIG, then ./odontolink.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Link every line of a token file and write the four artifacts
    #[command(visible_alias = "run")]
    RunAll(RunAllArgs),

    /// Embed the lexicon with the configured encoder and write the vector index
    BuildIndex,

    /// Load the lexicon and vector index and report their identity
    #[command(visible_alias = "check")]
    CheckArtifacts,
}

#[derive(Args, Debug)]
pub struct RunAllArgs {
    /// Tokenizer output, one JSON record per line
    #[arg(short, long)]
    pub input: PathBuf,

    /// Directory for the output artifacts (created if missing)
    #[arg(short, long)]
    pub out_dir: PathBuf,

    /// Lines resolved concurrently (overrides pipeline.concurrency)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Lines read into memory per batch
    #[arg(long, default_value_t = 512)]
    pub chunk_size: usize,
}
