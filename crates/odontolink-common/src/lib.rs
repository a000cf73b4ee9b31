//! odontolink-common — Shared types, errors, and the mention lifecycle used across all OdontoLink crates.

pub mod candidate;
pub mod error;
pub mod hints;
pub mod mention;
pub mod tokens;

pub use candidate::{Candidate, ConceptKind, Evidence, IriSource, MatchKind, Scores};
pub use error::{LinkError, Result};
pub use mention::{Bundle, Mention, MentionState};
pub use tokens::{LineRecord, Script, Span, Token, TokenKind};
