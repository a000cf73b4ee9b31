//! Alias map and staged alias resolution.
//!
//! Resolution order for a placeholder candidate:
//! 1. case-insensitive exact label/synonym match,
//! 2. containment match (shortest label wins),
//! 3. semantic top-k lookup, accepted at cosine >= threshold and re-ranked by
//!    edit distance to the alias text.
//!
//! Resolutions are cached per placeholder token, so later lines reuse them
//! without repeating the stages, and the alias map entry that issued the
//! token is replaced in place. A failed resolution downgrades the candidate
//! to `alias_only`; the scorer penalizes it downstream.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use odontolink_common::{IriSource, MatchKind, Mention};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::index::LexiconIndex;
use crate::normalize::normalize_surface;
use crate::{LexiconError, Result};

/// What a surface maps to.
#[derive(Debug, Clone, PartialEq)]
pub enum AliasTarget {
    Resolved { iri: String, label: String },
    /// Provisional token plus the text used to resolve it.
    Placeholder { token: String, label: String },
}

impl AliasTarget {
    pub fn is_resolved(&self) -> bool {
        matches!(self, AliasTarget::Resolved { .. })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAlias {
    Target(String),
    Detailed { target: String, #[serde(default)] label: Option<String> },
}

/// Surface → identifier map. Only the resolver mutates it.
#[derive(Debug, Default)]
pub struct AliasMap {
    inner: RwLock<HashMap<String, AliasTarget>>,
}

impl AliasMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `{surface: target}` or `{surface: {target, label}}`.
    ///
    /// A target naming a known lexicon identifier is resolved up front; any
    /// other target is alias text to be resolved later.
    pub fn from_json(json: &str, is_known_iri: impl Fn(&str) -> bool) -> serde_json::Result<Self> {
        let raw: HashMap<String, RawAlias> = serde_json::from_str(json)?;
        let map = Self::new();
        for (surface, value) in raw {
            let (target, label) = match value {
                RawAlias::Target(t) => (t, None),
                RawAlias::Detailed { target, label } => (target, label),
            };
            let entry = if is_known_iri(&target) {
                AliasTarget::Resolved {
                    label: label.unwrap_or_else(|| surface.clone()),
                    iri: target,
                }
            } else {
                AliasTarget::Placeholder {
                    token: format!("ALIAS:{surface}"),
                    label: label.unwrap_or(target),
                }
            };
            map.insert(&surface, entry);
        }
        Ok(map)
    }

    pub fn load(path: &Path, is_known_iri: impl Fn(&str) -> bool) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| LexiconError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content, is_known_iri).map_err(|source| LexiconError::Parse {
            path: path.to_path_buf(),
            line: 1,
            source,
        })
    }

    pub fn insert(&self, surface: &str, target: AliasTarget) {
        if let Ok(mut map) = self.inner.write() {
            map.insert(normalize_surface(surface), target);
        }
    }

    pub fn get(&self, surface: &str) -> Option<AliasTarget> {
        self.inner
            .read()
            .ok()
            .and_then(|map| map.get(&normalize_surface(surface)).cloned())
    }

    /// Snapshot of all entries, sorted by surface.
    pub fn entries(&self) -> Vec<(String, AliasTarget)> {
        let mut out: Vec<_> = self
            .inner
            .read()
            .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Semantic lookup seam ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct SemanticHit {
    pub iri: String,
    pub label: String,
    /// Cosine similarity.
    pub score: f64,
}

/// Nearest-neighbour lookup over ontology labels, provided by the vector layer.
#[async_trait]
pub trait SemanticLookup: Send + Sync {
    async fn nearest(&self, text: &str, k: usize) -> odontolink_common::Result<Vec<SemanticHit>>;
}

// ── Resolver ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStage {
    Cached,
    Exact,
    Containment,
    Semantic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub iri: String,
    pub label: String,
    pub stage: ResolutionStage,
}

pub struct AliasResolver {
    index: Arc<LexiconIndex>,
    aliases: Arc<AliasMap>,
    semantic: Option<Arc<dyn SemanticLookup>>,
    accept_threshold: f64,
    top_k: usize,
    resolved: RwLock<HashMap<String, Resolution>>,
}

impl AliasResolver {
    pub fn new(index: Arc<LexiconIndex>, aliases: Arc<AliasMap>) -> Self {
        Self {
            index,
            aliases,
            semantic: None,
            accept_threshold: 0.6,
            top_k: 3,
            resolved: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_semantic(mut self, semantic: Arc<dyn SemanticLookup>) -> Self {
        self.semantic = Some(semantic);
        self
    }

    pub fn with_acceptance(mut self, threshold: f64, top_k: usize) -> Self {
        self.accept_threshold = threshold;
        self.top_k = top_k.max(1);
        self
    }

    pub fn aliases(&self) -> &Arc<AliasMap> {
        &self.aliases
    }

    /// Resolve free alias text to a real identifier.
    pub async fn resolve_text(&self, text: &str) -> Option<Resolution> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        if let Some(meta) = self.index.find_exact(text) {
            return Some(Resolution {
                iri: meta.iri.clone(),
                label: meta.label.clone(),
                stage: ResolutionStage::Exact,
            });
        }

        if let Some(entry) = self.index.find_containing(text).and_then(|i| self.index.entry(i)) {
            return Some(Resolution {
                iri: entry.iri.clone(),
                label: entry.label.clone(),
                stage: ResolutionStage::Containment,
            });
        }

        let semantic = self.semantic.as_ref()?;
        let hits = match semantic.nearest(text, self.top_k).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!("Semantic alias lookup failed for '{}': {}", text, e);
                return None;
            }
        };
        let query = text.to_lowercase();
        hits.into_iter()
            .filter(|h| h.score >= self.accept_threshold && self.index.entry_index(&h.iri).is_some())
            .min_by(|a, b| {
                let da = strsim::levenshtein(&query, &a.label.to_lowercase());
                let db = strsim::levenshtein(&query, &b.label.to_lowercase());
                da.cmp(&db).then(b.score.total_cmp(&a.score))
            })
            .map(|h| Resolution {
                iri: h.iri,
                label: h.label,
                stage: ResolutionStage::Semantic,
            })
    }

    /// Resolve every placeholder candidate of every mention.
    ///
    /// Returns the number of candidates upgraded to `resolved_alias`.
    pub async fn resolve_mentions(&self, mentions: &mut [Mention]) -> usize {
        let mut resolved = 0;
        for mention in mentions.iter_mut() {
            for idx in 0..mention.candidates.len() {
                if mention.candidates[idx].iri_source != IriSource::Placeholder {
                    continue;
                }
                let token = mention.candidates[idx].iri.clone();
                let alias_text = mention.candidates[idx].label.clone();
                let outcome = match self.cached(&token) {
                    Some(hit) => Some(hit),
                    None => match self.resolve_text(&alias_text).await {
                        Some(hit) => Some(hit),
                        None if normalize_surface(&alias_text) != normalize_surface(&mention.surface) => {
                            self.resolve_text(&mention.surface).await
                        }
                        None => None,
                    },
                };

                let candidate = &mut mention.candidates[idx];
                match outcome {
                    Some(resolution) => {
                        debug!(
                            "Alias '{}' ({}) resolved to {} via {:?}",
                            mention.surface, token, resolution.iri, resolution.stage
                        );
                        if resolution.stage != ResolutionStage::Cached {
                            self.remember(&mention.surface, &token, &resolution);
                        }
                        if let Some(entry) = self.index.entry_by_iri(&resolution.iri) {
                            candidate.kind = entry.kind;
                            candidate.material = entry.material.clone();
                            if candidate.scores.prior.is_none() {
                                candidate.scores.prior = entry.frequency_prior;
                            }
                        }
                        candidate.iri = resolution.iri;
                        candidate.label = resolution.label;
                        candidate.iri_source = IriSource::ResolvedAlias;
                        candidate.evidence.lexical.get_or_insert(MatchKind::Alias);
                        resolved += 1;
                    }
                    None => {
                        debug!("Alias '{}' could not be resolved; marking alias_only", mention.surface);
                        candidate.iri_source = IriSource::AliasOnly;
                    }
                }
            }
        }
        resolved
    }

    fn cached(&self, token: &str) -> Option<Resolution> {
        let map = self.resolved.read().ok()?;
        map.get(token).map(|r| Resolution {
            stage: ResolutionStage::Cached,
            ..r.clone()
        })
    }

    /// Cache a fresh resolution under its placeholder token and upgrade the
    /// alias map entry if that entry issued the token.
    fn remember(&self, surface: &str, token: &str, resolution: &Resolution) {
        if let Ok(mut map) = self.resolved.write() {
            map.insert(token.to_string(), resolution.clone());
        }
        if matches!(self.aliases.get(surface), Some(AliasTarget::Placeholder { token: ref t, .. }) if t == token) {
            self.aliases.insert(
                surface,
                AliasTarget::Resolved {
                    iri: resolution.iri.clone(),
                    label: resolution.label.clone(),
                },
            );
        }
    }
}
