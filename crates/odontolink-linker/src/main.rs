//! OdontoLink command-line runner.

use std::path::Path;

use anyhow::Context;
use clap::Parser;
use odontolink_config::LinkerConfig;
use odontolink_embed::{build_encoder, FlatVectorIndex, IndexRow, SentenceEncoder, VectorIndex};
use odontolink_lexicon::load_artifacts;
use odontolink_linker::cli::{Cli, Commands, RunAllArgs};
use odontolink_linker::{read_records, ArtifactWriter, BatchSummary, Linker};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("odontolink=info,warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = LinkerConfig::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::RunAll(args) => run_all(config, args).await,
        Commands::BuildIndex => build_index(&config).await,
        Commands::CheckArtifacts => check_artifacts(&config),
    }
}

async fn run_all(mut config: LinkerConfig, args: RunAllArgs) -> anyhow::Result<()> {
    if let Some(n) = args.concurrency {
        config.pipeline.concurrency = n.max(1);
    }
    info!("OdontoLink {} starting run-all", env!("CARGO_PKG_VERSION"));

    let linker = Linker::from_config(config).await.context("loading artifacts")?;
    let input = read_records(&args.input).with_context(|| format!("reading {}", args.input.display()))?;
    if input.malformed > 0 {
        warn!("{} malformed input records skipped", input.malformed);
    }
    info!("Read {} records from {}", input.records.len(), args.input.display());

    let mut writer = ArtifactWriter::create(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;
    let mut totals = BatchSummary::default();
    let mut records = input.records;
    let chunk_size = args.chunk_size.max(1);
    while !records.is_empty() {
        let rest = records.split_off(chunk_size.min(records.len()));
        let batch = linker.link_batch(records).await;
        for output in &batch.outputs {
            writer.write(output)?;
        }
        let s = batch.summary();
        totals.lines += s.lines;
        totals.skipped += s.skipped;
        totals.mentions += s.mentions;
        totals.bundles += s.bundles;
        totals.rescued += s.rescued;
        records = rest;
    }
    let written = writer.finish()?;

    info!(
        lines = written,
        skipped = totals.skipped + input.malformed,
        mentions = totals.mentions,
        bundles = totals.bundles,
        rescued = totals.rescued,
        "Artifacts written to {}",
        args.out_dir.display()
    );
    Ok(())
}

async fn build_index(config: &LinkerConfig) -> anyhow::Result<()> {
    let lexicon = load_artifacts(&config.artifacts).context("loading lexicon")?;
    let encoder = build_encoder(&config.vector).await?;
    let rows = IndexRow::for_entries(lexicon.index.entries());
    info!("Embedding {} rows with {}", rows.len(), encoder.model_id());

    let index = FlatVectorIndex::from_texts(encoder.as_ref(), rows).await?;
    let (meta, data) = (&config.artifacts.vector_meta, &config.artifacts.vector_data);
    for path in [meta, data] {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
    }
    index.save(meta, data)?;
    info!("Vector index written: {} rows, dim {} -> {}", index.len(), index.meta().dim, meta.display());
    Ok(())
}

fn check_artifacts(config: &LinkerConfig) -> anyhow::Result<()> {
    let lexicon = load_artifacts(&config.artifacts).context("loading lexicon")?;
    let stats = lexicon.index.stats();
    println!("lexicon     {}", config.artifacts.lexicon.display());
    println!("  entries   {} ({} skipped)", stats.entries, stats.skipped_entries);
    println!("  surfaces  {} label, {} synonym, {} auxiliary", stats.label_surfaces, stats.synonym_surfaces, stats.auxiliary_surfaces);
    println!("  aliases   {}", lexicon.aliases.len());

    report_index(&config.artifacts.vector_meta, &config.artifacts.vector_data, config)
}

fn report_index(meta_path: &Path, data_path: &Path, config: &LinkerConfig) -> anyhow::Result<()> {
    println!("vector      {}", meta_path.display());
    match FlatVectorIndex::load(meta_path, data_path) {
        Ok(index) => {
            let meta = index.meta();
            println!("  model     {}", meta.model_name);
            println!("  dim       {}", meta.dim);
            println!("  rows      {}", index.len());
            if meta.model_name != config.vector.model_id {
                warn!(
                    "Index model '{}' differs from configured encoder '{}'",
                    meta.model_name, config.vector.model_id
                );
            }
            Ok(())
        }
        Err(e) if !config.vector.enabled || !config.vector.require_index => {
            println!("  unavailable: {e}");
            Ok(())
        }
        Err(e) => Err(e).context("loading vector index"),
    }
}
