//! odontolink-linker — Per-line linking pipeline and artifact I/O.
//!
//! Wires the gazetteer, vector retriever, alias resolver, rescue guard,
//! hybrid scorer, deduplicator and bundle aggregator into one pipeline
//! over tokenizer output.

pub mod bundle;
pub mod cli;
pub mod io;
pub mod merge;
pub mod pipeline;

pub use bundle::BundleAggregator;
pub use io::{read_records, ArtifactWriter, FinalMention, InputBatch};
pub use pipeline::{BatchOutput, BatchSummary, LineOutput, Linker, LinkerBuilder, RescueRecord, RESCUE_NOTE};
