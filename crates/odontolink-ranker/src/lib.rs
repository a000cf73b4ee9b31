//! odontolink-ranker — Hybrid scoring of mention candidates.
//!
//! Fuses lexical, vector, prior and context scores with weights
//! renormalized over the components actually present, then deduplicates
//! and prunes the scored mentions.

pub mod context;
pub mod dedup;
pub mod scorer;
pub mod weights;

pub use context::NeighborContext;
pub use dedup::Deduplicator;
pub use scorer::HybridScorer;
pub use weights::HybridWeights;
