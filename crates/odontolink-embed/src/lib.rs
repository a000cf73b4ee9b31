//! odontolink-embed — Sentence encoding and vector retrieval.
//!
//! The vector path of the linker: a [`SentenceEncoder`] turns query text into
//! unit vectors, a read-only [`VectorIndex`] holds pre-embedded ontology
//! labels and synonyms, and the [`VectorRetriever`] builds per-mention queries,
//! batches their encoding per line and caches embeddings.
//!
//! The default encoder is a deterministic character n-gram hasher. The
//! transformer encoder (Candle, `bert` feature) is used when the index was
//! built with a Hugging Face sentence model.

#[cfg(feature = "bert")]
pub mod bert;
pub mod cache;
pub mod encoder;
pub mod error;
pub mod index;
#[cfg(feature = "bert")]
pub mod pooling;
pub mod retriever;
pub mod similarity;
pub mod translate;

#[cfg(feature = "bert")]
pub use bert::{BertEncoder, BertEncoderConfig};
pub use cache::{CacheStats, EmbeddingCache};
pub use encoder::{build_encoder, HashingEncoder, SentenceEncoder};
pub use error::{EmbedError, Result};
pub use index::{FlatVectorIndex, IndexMeta, IndexRow, VectorIndex};
pub use retriever::{VectorHit, VectorRetriever, VectorTarget};
pub use translate::TranslationTable;
