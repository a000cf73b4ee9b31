//! Per-line linking pipeline.
//!
//! For one validated line:
//!   1. Gazetteer matching over the word tokens
//!   2. Vector retrieval for every mention and uncovered word token (one
//!      encode batch per line)
//!   3. Alias resolution of placeholder identifiers
//!   4. Rescue for word mentions with no candidate from either path, followed
//!      by a second vector pass over the proposed canonical terms
//!   5. Hybrid scoring with neighbour context
//!   6. Deduplication and pruning
//!   7. Device + dimension bundling
//!
//! Shared resources are built once and injected; nothing is looked up from
//! global state. A line never fails because of a sibling line, and nothing
//! after validation fails a line: vector errors degrade the line to
//! lexical-only scoring and rescue failures leave the mention unresolved.

use std::sync::Arc;

use futures_util::future::join_all;
use futures_util::stream::{self, StreamExt};
use odontolink_common::{Bundle, IriSource, LineRecord, LinkError, Mention, MentionState, Result};
use odontolink_config::LinkerConfig;
use odontolink_embed::{
    build_encoder, EmbedError, FlatVectorIndex, TranslationTable, VectorHit, VectorIndex, VectorRetriever,
    VectorTarget,
};
use odontolink_lexicon::{load_artifacts, AliasResolver, GazetteerMatcher, LoadedLexicon, SemanticLookup};
use odontolink_llm::{build_oracle, CanonicalOracle, RescueAuditEntry, RescueGuard};
use odontolink_ranker::{Deduplicator, HybridScorer, NeighborContext};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::bundle::BundleAggregator;
use crate::merge::{absorb_candidates, merge_candidates, vector_targets};

pub const RESCUE_NOTE: &str = "llm_rescue";

// ── Output ────────────────────────────────────────────────────────────────────

/// Rescue attempt for one mention, attached to the line output.
#[derive(Debug, Clone, Serialize)]
pub struct RescueRecord {
    pub mention_id: String,
    pub surface: String,
    pub outcome: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub terms: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit: Option<RescueAuditEntry>,
}

/// Everything produced for one input line.
#[derive(Debug, Clone, Serialize)]
pub struct LineOutput {
    pub line_id: String,
    /// Raw gazetteer mentions, before vector merge and alias resolution.
    pub gazetteer: Vec<Mention>,
    pub vector: Vec<VectorHit>,
    /// Final scored and deduplicated mentions.
    pub mentions: Vec<Mention>,
    pub bundles: Vec<Bundle>,
    pub rescues: Vec<RescueRecord>,
    pub lexical_only: bool,
}

/// Result of a batch: outputs in input order plus the lines that failed validation.
#[derive(Debug, Default)]
pub struct BatchOutput {
    pub outputs: Vec<LineOutput>,
    pub skipped: Vec<LinkError>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub lines: usize,
    pub skipped: usize,
    pub mentions: usize,
    pub bundles: usize,
    pub rescued: usize,
}

impl BatchOutput {
    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            lines: self.outputs.len(),
            skipped: self.skipped.len(),
            mentions: self.outputs.iter().map(|o| o.mentions.len()).sum(),
            bundles: self.outputs.iter().map(|o| o.bundles.len()).sum(),
            rescued: self
                .outputs
                .iter()
                .flat_map(|o| o.mentions.iter())
                .filter(|m| m.has_note(RESCUE_NOTE))
                .count(),
        }
    }
}

// ── Construction ──────────────────────────────────────────────────────────────

pub struct LinkerBuilder {
    config: LinkerConfig,
    lexicon: LoadedLexicon,
    retriever: Option<Arc<VectorRetriever>>,
    oracle: Option<Arc<dyn CanonicalOracle>>,
}

impl LinkerBuilder {
    pub fn retriever(mut self, retriever: VectorRetriever) -> Self {
        self.retriever = Some(Arc::new(retriever));
        self
    }

    /// Oracle override; otherwise the one named by `rescue.backend` is built.
    pub fn oracle(mut self, oracle: Arc<dyn CanonicalOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn build(self) -> Result<Linker> {
        let config = self.config;
        let LoadedLexicon { index, aliases } = self.lexicon;

        let mut resolver = AliasResolver::new(index.clone(), aliases)
            .with_acceptance(config.vector.alias_accept_threshold, config.vector.alias_topk);
        if let Some(retriever) = &self.retriever {
            let semantic: Arc<dyn SemanticLookup> = retriever.clone();
            resolver = resolver.with_semantic(semantic);
        }

        let oracle = match self.oracle {
            Some(oracle) => oracle,
            None => build_oracle(&config.rescue)?,
        };

        let scorer = HybridScorer::new(config.weights, config.scoring.clone());
        if !scorer.weights().validate() {
            debug!("Hybrid weights sum to {:.3}; renormalized per candidate", scorer.weights().sum());
        }

        Ok(Linker {
            gazetteer: GazetteerMatcher::new(index, &config.gazetteer),
            resolver,
            retriever: self.retriever,
            rescue: RescueGuard::new(oracle, &config.rescue),
            lexical_scorer: scorer.clone().lexical_only(true),
            scorer,
            dedup: Deduplicator::new(&config.scoring),
            bundler: BundleAggregator::new(&config.pipeline),
            config,
        })
    }
}

pub struct Linker {
    config: LinkerConfig,
    gazetteer: GazetteerMatcher,
    resolver: AliasResolver,
    retriever: Option<Arc<VectorRetriever>>,
    rescue: RescueGuard,
    scorer: HybridScorer,
    lexical_scorer: HybridScorer,
    dedup: Deduplicator,
    bundler: BundleAggregator,
}

impl Linker {
    pub fn builder(config: LinkerConfig, lexicon: LoadedLexicon) -> LinkerBuilder {
        LinkerBuilder {
            config,
            lexicon,
            retriever: None,
            oracle: None,
        }
    }

    /// Load every artifact named by `config` and wire the pipeline.
    ///
    /// Lexicon and index load failures are fatal. A missing index is only
    /// tolerated when `vector.require_index` is off.
    pub async fn from_config(config: LinkerConfig) -> Result<Self> {
        let lexicon = load_artifacts(&config.artifacts)?;
        let stats = lexicon.index.stats();
        info!(
            "Lexicon loaded: {} entries, {} label surfaces, {} synonym surfaces",
            stats.entries, stats.label_surfaces, stats.synonym_surfaces
        );

        let mut builder = Self::builder(config.clone(), lexicon.clone());
        if config.vector.enabled {
            let encoder = build_encoder(&config.vector).await?;
            let index: Option<Arc<dyn VectorIndex>> =
                match FlatVectorIndex::load(&config.artifacts.vector_meta, &config.artifacts.vector_data) {
                    Ok(index) => {
                        info!(
                            "Vector index loaded: {} rows, dim {}, model {}",
                            index.len(),
                            index.meta().dim,
                            index.meta().model_name
                        );
                        Some(Arc::new(index))
                    }
                    Err(EmbedError::IndexUnavailable(msg)) if !config.vector.require_index => {
                        warn!("Vector index unavailable ({}); continuing lexical-only", msg);
                        None
                    }
                    Err(e) => return Err(e.into()),
                };
            let translations = match &config.artifacts.translations {
                Some(path) => TranslationTable::load(path)?,
                None => TranslationTable::new(),
            };
            info!("Loaded {} translation entries", translations.len());
            let retriever = VectorRetriever::new(config.vector.clone(), encoder, index)?
                .with_translations(translations)
                .with_lexicon(lexicon.index.clone());
            builder = builder.retriever(retriever);
        } else {
            info!("Vector retrieval disabled; scoring is lexical-only");
        }
        builder.build()
    }

    pub fn config(&self) -> &LinkerConfig {
        &self.config
    }

    /// Whether the vector path can contribute candidates right now.
    pub fn vector_available(&self) -> bool {
        self.retriever.as_ref().map(|r| r.is_available()).unwrap_or(false)
    }

    // ── Entry points ──────────────────────────────────────────────────────────

    /// Link one line. Only a malformed record is an error.
    #[instrument(skip(self, record), fields(line_id = %record.line_id))]
    pub async fn link_line(&self, record: &LineRecord) -> Result<LineOutput> {
        record.validate()?;
        let gazetteer = self.gazetteer.match_line(record);
        Ok(self.resolve_line(record, gazetteer).await)
    }

    /// Link many lines, `pipeline.concurrency` at a time, keeping input order.
    ///
    /// Lines failing validation are logged and skipped.
    pub async fn link_batch(&self, records: Vec<LineRecord>) -> BatchOutput {
        let mut skipped = Vec::new();
        let mut valid = Vec::with_capacity(records.len());
        for record in records {
            match record.validate() {
                Ok(()) => valid.push(record),
                Err(e) => {
                    warn!("Skipping line: {}", e);
                    skipped.push(e);
                }
            }
        }

        let lexical = self.gazetteer.match_batch(&valid);
        let outputs: Vec<LineOutput> = stream::iter(valid.iter().zip(lexical))
            .map(|(record, gazetteer)| self.resolve_line(record, gazetteer))
            .buffered(self.config.pipeline.concurrency.max(1))
            .collect()
            .await;

        BatchOutput { outputs, skipped }
    }

    // ── Stages ────────────────────────────────────────────────────────────────

    async fn resolve_line(&self, record: &LineRecord, gazetteer: Vec<Mention>) -> LineOutput {
        let tokens = &record.tokens;
        let targets = vector_targets(record, &gazetteer);

        let mut lexical_only = !self.vector_available();
        let hits = match &self.retriever {
            Some(retriever) if !lexical_only => match retriever.retrieve(&targets, tokens).await {
                Ok(hits) => hits,
                Err(e) => {
                    warn!("Vector retrieval failed for line {}: {}; scoring lexically", record.line_id, e);
                    lexical_only = true;
                    Vec::new()
                }
            },
            _ => Vec::new(),
        };

        let mut mentions = merge_candidates(&gazetteer, &targets, &hits, tokens);
        let resolved = self.resolver.resolve_mentions(&mut mentions).await;
        if resolved > 0 {
            debug!("Line {}: {} aliases resolved", record.line_id, resolved);
        }

        let rescues = if lexical_only {
            for m in mentions.iter_mut().filter(|m| m.candidates.is_empty()) {
                m.state = MentionState::UnresolvedFinal;
            }
            Vec::new()
        } else {
            self.rescue_empty(record, &mut mentions).await
        };

        let before = mentions.len();
        mentions.retain(|m| m.state != MentionState::UnresolvedFinal && !m.candidates.is_empty());
        if mentions.len() != before {
            debug!("Line {}: {} unresolved mentions dropped", record.line_id, before - mentions.len());
        }

        let scorer = if lexical_only { &self.lexical_scorer } else { &self.scorer };
        let window = self.config.vector.neighbor_window;
        for m in mentions.iter_mut() {
            let context = NeighborContext::around(tokens, &m.covered_token_idxs, window);
            scorer.score_mention(m, Some(&context));
        }

        let mut mentions = self.dedup.dedup(mentions);
        for m in mentions.iter_mut() {
            finalize(m);
        }
        let bundles = self.bundler.aggregate(&mentions, tokens);

        debug!(
            "Line {}: {} mentions, {} bundles{}",
            record.line_id,
            mentions.len(),
            bundles.len(),
            if lexical_only { " (lexical-only)" } else { "" }
        );

        LineOutput {
            line_id: record.line_id.clone(),
            gazetteer,
            vector: hits,
            mentions,
            bundles,
            rescues,
            lexical_only,
        }
    }

    /// Rescue every word mention that neither path matched.
    ///
    /// Canonical terms only ever become vector queries. Mentions the second
    /// pass still cannot match end as `UnresolvedFinal`.
    async fn rescue_empty(&self, record: &LineRecord, mentions: &mut [Mention]) -> Vec<RescueRecord> {
        let pending: Vec<usize> = mentions
            .iter()
            .enumerate()
            .filter(|(_, m)| m.candidates.is_empty() && covers_only_words(m, record))
            .map(|(i, _)| i)
            .collect();
        if pending.is_empty() {
            return Vec::new();
        }

        let context = record.raw.clone().unwrap_or_else(|| {
            record.tokens.iter().map(|t| t.text.as_str()).collect::<Vec<_>>().join(" ")
        });
        let surfaces: Vec<String> = pending.iter().map(|&i| mentions[i].surface.clone()).collect();
        let reports = join_all(surfaces.iter().map(|s| self.rescue.rescue(s, &context))).await;

        let mut records = Vec::with_capacity(pending.len());
        let mut targets = Vec::new();
        for (&i, report) in pending.iter().zip(reports) {
            let mention = &mut mentions[i];
            match report.outcome.terms() {
                Some(terms) => {
                    targets.push(VectorTarget::from_mention(mention).with_canonical_terms(terms.to_vec()));
                }
                None => {
                    let err = LinkError::RescueValidation {
                        surface: mention.surface.clone(),
                        reason: report.outcome.failure_reason().unwrap_or_default(),
                    };
                    debug!("Mention {} left unresolved: {}", mention.mention_id, err);
                    mention.state = MentionState::UnresolvedFinal;
                }
            }
            records.push(RescueRecord {
                mention_id: mention.mention_id.clone(),
                surface: mention.surface.clone(),
                outcome: report.outcome.label().to_string(),
                terms: report.outcome.terms().map(<[String]>::to_vec).unwrap_or_default(),
                reason: report.outcome.failure_reason(),
                audit: report.audit,
            });
        }

        if targets.is_empty() {
            return records;
        }
        let hits = match &self.retriever {
            Some(retriever) => retriever.retrieve(&targets, &record.tokens).await.unwrap_or_else(|e| {
                warn!("Rescue vector pass failed for line {}: {}", record.line_id, e);
                Vec::new()
            }),
            None => Vec::new(),
        };

        for target in &targets {
            let Some(mention) = mentions.iter_mut().find(|m| m.mention_id == target.mention_id) else {
                continue;
            };
            let candidates = hits
                .iter()
                .find(|h| h.mention_id == target.mention_id)
                .map(|h| h.candidates.clone())
                .unwrap_or_default();
            if candidates.is_empty() {
                debug!("Rescue terms {:?} found nothing for '{}'", target.canonical_terms, mention.surface);
                mention.state = MentionState::UnresolvedFinal;
                continue;
            }
            let rescued: Vec<_> = candidates
                .into_iter()
                .map(|mut c| {
                    c.evidence.rescue = true;
                    c
                })
                .collect();
            absorb_candidates(mention, &rescued);
            mention.add_note(RESCUE_NOTE);
            mention.state = MentionState::Rescued;
        }
        records
    }
}

fn covers_only_words(mention: &Mention, record: &LineRecord) -> bool {
    !mention.covered_token_idxs.is_empty()
        && mention
            .covered_token_idxs
            .iter()
            .all(|&i| record.tokens.get(i).map(|t| t.is_linkable()).unwrap_or(false))
}

/// Last state transition. Any placeholder still present is downgraded.
fn finalize(mention: &mut Mention) {
    for c in mention.candidates.iter_mut().filter(|c| c.iri_source == IriSource::Placeholder) {
        warn!("Unresolved placeholder {} on {}; marking alias_only", c.iri, mention.mention_id);
        c.iri_source = IriSource::AliasOnly;
    }
    mention.state = MentionState::Final;
}
