//! odontolink-lexicon — Lexicon index, gazetteer matching and alias resolution.
//!
//! The [`LexiconIndex`] is built once from pre-exported artifacts and then
//! shared read-only across workers. The [`GazetteerMatcher`] turns a token
//! stream into lexical mentions; the [`AliasResolver`] upgrades placeholder
//! identifiers to real ontology identifiers.

pub mod alias;
pub mod entry;
pub mod fuzzy;
pub mod gazetteer;
pub mod hints;
pub mod index;
pub mod loader;
pub mod normalize;

use std::path::PathBuf;

use thiserror::Error;

pub use alias::{AliasMap, AliasResolver, AliasTarget, Resolution, ResolutionStage, SemanticHit, SemanticLookup};
pub use entry::LexiconEntry;
pub use fuzzy::{FuzzyAssessment, FuzzyMatcher};
pub use gazetteer::GazetteerMatcher;
pub use index::{LexiconBuilder, LexiconIndex, LexiconStats, SurfaceMeta};
pub use loader::{load_artifacts, LoadedLexicon};

#[derive(Debug, Error)]
pub enum LexiconError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed record in {path} at line {line}: {source}")]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Lexicon {0} contains no indexable entries")]
    Empty(PathBuf),

    #[error("Failed to build matcher: {0}")]
    Automaton(String),
}

impl From<LexiconError> for odontolink_common::LinkError {
    fn from(err: LexiconError) -> Self {
        odontolink_common::LinkError::Lexicon(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LexiconError>;
