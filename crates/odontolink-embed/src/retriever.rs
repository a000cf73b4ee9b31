//! Vector retrieval of ontology candidates for mentions.
//!
//! One query per target, built from (in priority order) canonical terms from
//! a rescue, the static translation table, or the raw surface plus nearby
//! word tokens. Query embeddings for a line are computed in a single batch
//! and cached by normalized query text. Index hits are re-ranked by exact
//! cosine before thresholding.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use odontolink_common::{Candidate, IriSource, Mention, Scores, Span, Token};
use odontolink_config::VectorConfig;
use odontolink_lexicon::normalize::normalize_surface;
use odontolink_lexicon::{LexiconIndex, SemanticHit, SemanticLookup};
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::{CacheStats, EmbeddingCache};
use crate::encoder::SentenceEncoder;
use crate::index::VectorIndex;
use crate::similarity::cosine;
use crate::translate::TranslationTable;
use crate::{EmbedError, Result};

/// Something to retrieve candidates for.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorTarget {
    pub mention_id: String,
    pub surface: String,
    pub span: Span,
    pub token_idxs: Vec<usize>,
    /// Rescue output; when present it replaces the surface as query text.
    pub canonical_terms: Vec<String>,
}

impl VectorTarget {
    pub fn from_mention(mention: &Mention) -> Self {
        Self {
            mention_id: mention.mention_id.clone(),
            surface: mention.surface.clone(),
            span: mention.span,
            token_idxs: mention.covered_token_idxs.clone(),
            canonical_terms: Vec::new(),
        }
    }

    pub fn from_token(token: &Token) -> Self {
        Self {
            mention_id: Mention::id_for(token.span),
            surface: token.text.clone(),
            span: token.span,
            token_idxs: vec![token.idx],
            canonical_terms: Vec::new(),
        }
    }

    pub fn with_canonical_terms(mut self, terms: Vec<String>) -> Self {
        self.canonical_terms = terms;
        self
    }
}

/// Raw vector output for one target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorHit {
    pub mention_id: String,
    pub surface: String,
    pub query: String,
    pub span: Span,
    #[serde(skip)]
    pub token_idxs: Vec<usize>,
    pub candidates: Vec<Candidate>,
}

pub struct VectorRetriever {
    encoder: Arc<dyn SentenceEncoder>,
    index: Option<Arc<dyn VectorIndex>>,
    cache: EmbeddingCache,
    translations: TranslationTable,
    lexicon: Option<Arc<LexiconIndex>>,
    config: VectorConfig,
    unavailable_warned: AtomicBool,
}

impl VectorRetriever {
    /// Checks index identity against the encoder.
    ///
    /// A differing model name is only warned about; a differing dimension
    /// cannot be searched and is an error. A missing or empty index is an
    /// error when `require_index` is set.
    pub fn new(
        config: VectorConfig,
        encoder: Arc<dyn SentenceEncoder>,
        index: Option<Arc<dyn VectorIndex>>,
    ) -> Result<Self> {
        match &index {
            Some(idx) if !idx.is_empty() => {
                let meta = idx.meta();
                if meta.dim != encoder.dimension() {
                    return Err(EmbedError::DimensionMismatch {
                        index: meta.dim,
                        encoder: encoder.dimension(),
                    });
                }
                if meta.model_name != encoder.model_id() {
                    warn!(
                        "Vector index was built with '{}' but encoder is '{}'; similarities may be degraded",
                        meta.model_name,
                        encoder.model_id()
                    );
                }
            }
            _ if config.enabled && config.require_index => {
                return Err(EmbedError::IndexUnavailable(
                    "vector index is missing or empty".to_string(),
                ));
            }
            _ => {}
        }

        Ok(Self {
            cache: EmbeddingCache::new(config.cache_capacity),
            encoder,
            index,
            translations: TranslationTable::new(),
            lexicon: None,
            config,
            unavailable_warned: AtomicBool::new(false),
        })
    }

    pub fn with_translations(mut self, translations: TranslationTable) -> Self {
        self.translations = translations;
        self
    }

    /// Attach the lexicon so vector candidates carry concept kind and material.
    pub fn with_lexicon(mut self, lexicon: Arc<LexiconIndex>) -> Self {
        self.lexicon = Some(lexicon);
        self
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// False when retrieval is disabled or the index is gone. Warns once.
    pub fn is_available(&self) -> bool {
        if !self.config.enabled {
            return false;
        }
        let ok = self.index.as_ref().map(|i| !i.is_empty()).unwrap_or(false);
        if !ok && !self.unavailable_warned.swap(true, Ordering::Relaxed) {
            warn!("Vector index unavailable; continuing with lexical-only scoring");
        }
        ok
    }

    /// Query text for a target within its line.
    pub fn build_query(&self, target: &VectorTarget, tokens: &[Token]) -> String {
        if !target.canonical_terms.is_empty() {
            return target
                .canonical_terms
                .iter()
                .take(3)
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(" ");
        }
        if let Some(english) = self.translations.lookup(&target.surface) {
            return english.to_string();
        }

        let first = target.token_idxs.iter().min().copied();
        let last = target.token_idxs.iter().max().copied();
        let (Some(first), Some(last)) = (first, last) else {
            return target.surface.clone();
        };
        let window = self.config.neighbor_window;
        let distance = |t: &Token| {
            if t.idx < first {
                first - t.idx
            } else {
                t.idx.saturating_sub(last)
            }
        };
        // Nearest neighbours win; the chosen ones keep their line order.
        let mut nearby: Vec<&Token> = tokens
            .iter()
            .filter(|t| t.is_linkable() && (t.idx < first || t.idx > last))
            .filter(|t| distance(t) <= window)
            .collect();
        nearby.sort_by_key(|t| distance(t));
        nearby.truncate(window);
        nearby.sort_by_key(|t| t.idx);
        let neighbors: Vec<&str> = nearby.iter().map(|t| t.text.as_str()).collect();

        if neighbors.is_empty() {
            target.surface.clone()
        } else {
            format!("{} {}", target.surface, neighbors.join(" "))
        }
    }

    /// Retrieve candidates for every target of one line.
    ///
    /// Uncached queries are encoded in one batch. Returns no hits when the
    /// index is unavailable.
    pub async fn retrieve(&self, targets: &[VectorTarget], tokens: &[Token]) -> Result<Vec<VectorHit>> {
        if targets.is_empty() || !self.is_available() {
            return Ok(Vec::new());
        }
        let queries: Vec<String> = targets.iter().map(|t| self.build_query(t, tokens)).collect();
        let embeddings = self.embed_all(&queries).await?;

        let mut hits = Vec::with_capacity(targets.len());
        for ((target, query), embedding) in targets.iter().zip(queries).zip(embeddings) {
            let candidates = self.search(&embedding, self.config.topk, self.config.min_score);
            debug!(
                "Vector query '{}' for {} returned {} candidates",
                query,
                target.mention_id,
                candidates.len()
            );
            hits.push(VectorHit {
                mention_id: target.mention_id.clone(),
                surface: target.surface.clone(),
                query,
                span: target.span,
                token_idxs: target.token_idxs.clone(),
                candidates: candidates.into_iter().map(|(c, _)| c).collect(),
            });
        }
        Ok(hits)
    }

    async fn embed_all(&self, queries: &[String]) -> Result<Vec<Arc<Vec<f32>>>> {
        let keys: Vec<String> = queries.iter().map(|q| normalize_surface(q)).collect();
        let mut found: HashMap<&str, Arc<Vec<f32>>> = HashMap::new();
        let mut missing: Vec<String> = Vec::new();
        for key in &keys {
            if found.contains_key(key.as_str()) || missing.contains(key) {
                continue;
            }
            match self.cache.get(key) {
                Some(v) => {
                    found.insert(key.as_str(), v);
                }
                None => missing.push(key.clone()),
            }
        }

        if !missing.is_empty() {
            let start = Instant::now();
            let vectors = self.encoder.encode_batch(&missing).await?;
            metrics::histogram!("odontolink_encode_latency_seconds").record(start.elapsed().as_secs_f64());
            if vectors.len() != missing.len() {
                return Err(EmbedError::Inference(format!(
                    "encoder returned {} vectors for {} texts",
                    vectors.len(),
                    missing.len()
                )));
            }
            for (key, vector) in missing.iter().zip(vectors) {
                let vector = Arc::new(vector);
                self.cache.put(key.clone(), vector.clone());
                if let Some(k) = keys.iter().find(|k| *k == key) {
                    found.insert(k.as_str(), vector);
                }
            }
        }

        keys.iter()
            .map(|k| {
                found
                    .get(k.as_str())
                    .cloned()
                    .ok_or_else(|| EmbedError::Inference(format!("no embedding for '{k}'")))
            })
            .collect()
    }

    /// Approximate top-k, re-ranked by exact cosine, deduplicated by IRI.
    fn search(&self, query: &[f32], k: usize, min_score: f64) -> Vec<(Candidate, f64)> {
        let Some(index) = self.index.as_ref() else {
            return Vec::new();
        };
        let mut best: Vec<(Candidate, f64)> = Vec::new();
        for (row_idx, _) in index.search(query, k) {
            let (Some(row), Some(vector)) = (index.row(row_idx), index.vector(row_idx)) else {
                continue;
            };
            let score = (cosine(query, vector) as f64).clamp(0.0, 1.0);
            if score < min_score {
                continue;
            }
            if let Some(existing) = best.iter_mut().find(|(c, _)| c.iri == row.iri) {
                if score > existing.1 {
                    existing.0.scores.vec = Some(score);
                    existing.1 = score;
                }
                continue;
            }
            let source = if row.is_synonym() {
                IriSource::OhdSynonym
            } else {
                IriSource::OhdLabel
            };
            let entry = self.lexicon.as_ref().and_then(|lx| lx.entry_by_iri(&row.iri));
            let mut candidate = Candidate::new(&row.iri, &row.label, source)
                .with_scores(Scores::vector(score))
                .with_kind(entry.and_then(|e| e.kind))
                .with_material(entry.and_then(|e| e.material.clone()));
            candidate.evidence.vector = true;
            best.push((candidate, score));
        }
        best.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.iri.cmp(&b.0.iri)));
        best
    }
}

#[async_trait]
impl SemanticLookup for VectorRetriever {
    async fn nearest(&self, text: &str, k: usize) -> odontolink_common::Result<Vec<SemanticHit>> {
        if !self.is_available() {
            return Ok(Vec::new());
        }
        let embeddings = self.embed_all(&[text.to_string()]).await?;
        let Some(embedding) = embeddings.first() else {
            return Ok(Vec::new());
        };
        Ok(self
            .search(embedding, k, 0.0)
            .into_iter()
            .take(k)
            .map(|(c, score)| SemanticHit {
                iri: c.iri,
                label: c.label,
                score,
            })
            .collect())
    }
}
