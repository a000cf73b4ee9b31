//! Gazetteer matching over one line's token stream.
//!
//! Only `word` tokens are considered: numbers, units and pairs are filtered
//! before any lookup, so they can never become part of a mention. Matching runs
//! longest-first:
//!
//! 1. n-grams of contiguous word tokens, from `ngram_max` down to 2, exact on
//!    the normalized or compact form;
//! 2. single tokens, exact on the normalized or compact form, then on the
//!    token's letter core (`שתל14` → `שתל`);
//! 3. single tokens, fuzzy against length-bucketed compact keys.
//!
//! A covered-token mask keeps every token in at most one gazetteer mention.

use std::ops::Range;
use std::sync::Arc;

use odontolink_common::{Candidate, LineRecord, MatchKind, Mention, MentionState, Token};
use odontolink_config::GazetteerConfig;
use tracing::debug;

use crate::fuzzy::{FuzzyAssessment, FuzzyMatcher};
use crate::hints::{derive_hints, hint_for_kind};
use crate::index::{LexiconIndex, SurfaceMeta};
use crate::normalize::{char_len, compact, letter_core, normalize_surface};

struct Hit<'a> {
    metas: Vec<&'a SurfaceMeta>,
    fuzzy: Option<FuzzyAssessment>,
    corrected: Option<String>,
}

pub struct GazetteerMatcher {
    index: Arc<LexiconIndex>,
    config: GazetteerConfig,
    fuzzy: FuzzyMatcher,
}

impl GazetteerMatcher {
    pub fn new(index: Arc<LexiconIndex>, config: &GazetteerConfig) -> Self {
        Self {
            index,
            config: config.clone(),
            fuzzy: FuzzyMatcher::new(config),
        }
    }

    pub fn index(&self) -> &Arc<LexiconIndex> {
        &self.index
    }

    pub fn match_line(&self, record: &LineRecord) -> Vec<Mention> {
        let tokens = &record.tokens;
        let mut covered = vec![false; tokens.len()];
        let mut mentions = Vec::new();

        for run in linkable_runs(tokens) {
            let max_n = self.config.ngram_max.min(run.len());
            for n in (2..=max_n).rev() {
                for start in run.start..=run.end - n {
                    let window = start..start + n;
                    if window.clone().any(|i| covered[i]) {
                        continue;
                    }
                    let text = join_match_text(&tokens[window.clone()]);
                    if let Some(hit) = self.exact(&text) {
                        mentions.push(self.build_mention(&tokens[window.clone()], hit));
                        window.for_each(|i| covered[i] = true);
                    }
                }
            }
        }

        for (i, token) in tokens.iter().enumerate() {
            if covered[i] || !token.is_linkable() {
                continue;
            }
            if let Some(hit) = self.single(token) {
                mentions.push(self.build_mention(std::slice::from_ref(token), hit));
                covered[i] = true;
            }
        }

        mentions.sort_by_key(|m| m.span.start);
        debug!("Line {}: {} gazetteer mentions", record.line_id, mentions.len());
        mentions
    }

    /// Match many lines, in parallel when the `parallel` feature is on.
    pub fn match_batch(&self, records: &[LineRecord]) -> Vec<Vec<Mention>> {
        #[cfg(feature = "parallel")]
        {
            if records.len() > 10 {
                use rayon::prelude::*;
                return records.par_iter().map(|r| self.match_line(r)).collect();
            }
        }
        records.iter().map(|r| self.match_line(r)).collect()
    }

    fn exact(&self, text: &str) -> Option<Hit<'_>> {
        let normalized = normalize_surface(text);
        if normalized.is_empty() {
            return None;
        }
        let direct = self.index.lookup(&normalized);
        let metas: Vec<&SurfaceMeta> = if direct.is_empty() {
            self.index.lookup_compact(&compact(&normalized))
        } else {
            direct.iter().collect()
        };
        (!metas.is_empty()).then_some(Hit {
            metas,
            fuzzy: None,
            corrected: None,
        })
    }

    fn single(&self, token: &Token) -> Option<Hit<'_>> {
        let text = token.match_text();
        if let Some(hit) = self.exact(text) {
            return Some(hit);
        }

        let core = letter_core(text);
        if core.is_empty() {
            return None;
        }
        if core != text {
            if let Some(mut hit) = self.exact(core) {
                hit.corrected = Some(normalize_surface(core));
                return Some(hit);
            }
        }

        let query = compact(&normalize_surface(core));
        if char_len(&query) < self.fuzzy.min_len() {
            return None;
        }
        let (metas, assessment) = self.index.fuzzy_lookup(&self.fuzzy, &query)?;
        let corrected = metas.first().map(|m| m.surface.clone());
        Some(Hit {
            metas,
            fuzzy: Some(assessment),
            corrected,
        })
    }

    fn base_score(&self, kind: MatchKind) -> f64 {
        match kind {
            MatchKind::ExactLabel => self.config.label_score,
            MatchKind::ExactSynonym | MatchKind::Alias => self.config.synonym_score,
            MatchKind::Fuzzy { .. } => self.config.fuzzy_score_range.high,
        }
    }

    fn build_mention(&self, tokens: &[Token], hit: Hit<'_>) -> Mention {
        let surface = tokens.iter().map(|t| t.text.as_str()).collect::<Vec<_>>().join(" ");
        let span = tokens
            .iter()
            .skip(1)
            .fold(tokens[0].span, |acc, t| acc.cover(&t.span));
        let covered = tokens.iter().map(|t| t.idx).collect();

        let mut candidates: Vec<Candidate> = Vec::with_capacity(hit.metas.len());
        for meta in &hit.metas {
            let entry = meta.entry.and_then(|i| self.index.entry(i));
            let (lex, evidence) = match hit.fuzzy {
                Some(a) => (a.score, MatchKind::Fuzzy { edit_distance: a.edit_distance }),
                None => (self.base_score(meta.match_kind), meta.match_kind),
            };
            let mut candidate = Candidate::new(&meta.iri, &meta.label, meta.source)
                .with_kind(entry.and_then(|e| e.kind))
                .with_material(entry.and_then(|e| e.material.clone()))
                .with_normalized_surface(hit.corrected.clone());
            candidate.scores.lex = Some(lex);
            candidate.scores.prior = entry.and_then(|e| e.frequency_prior);
            candidate.evidence.lexical = Some(evidence);

            match candidates.iter().position(|c| c.iri == candidate.iri) {
                Some(pos) if candidates[pos].lex() >= lex => {}
                Some(pos) => candidates[pos] = candidate,
                None => candidates.push(candidate),
            }
        }

        candidates.sort_by(|a, b| {
            b.lex()
                .total_cmp(&a.lex())
                .then(b.iri_source.is_real().cmp(&a.iri_source.is_real()))
                .then(b.scores.prior.unwrap_or(0.0).total_cmp(&a.scores.prior.unwrap_or(0.0)))
                .then(a.iri.cmp(&b.iri))
        });
        if !self.config.keep_all_metas {
            candidates.truncate(1);
        }

        let mut mention = Mention::new(surface, span, covered);
        let mut texts: Vec<&str> = vec![mention.surface.as_str()];
        if let Some(c) = hit.corrected.as_deref() {
            texts.push(c);
        }
        texts.extend(candidates.iter().map(|c| c.label.as_str()));
        let mut hints = derive_hints(texts);
        hints.extend(tokens.iter().flat_map(|t| t.hints.iter().cloned()));
        hints.extend(
            candidates
                .iter()
                .filter_map(|c| c.kind.and_then(hint_for_kind))
                .map(str::to_string),
        );

        mention.hints = hints;
        mention.normalized_surface = hit.corrected;
        mention.candidates = candidates;
        mention.state = MentionState::Unresolved.with_lexical();
        mention
    }
}

/// Maximal ranges of consecutive word tokens.
fn linkable_runs(tokens: &[Token]) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let mut start = None;
    for (i, token) in tokens.iter().enumerate() {
        match (token.is_linkable(), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                runs.push(s..i);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push(s..tokens.len());
    }
    runs
}

fn join_match_text(tokens: &[Token]) -> String {
    tokens.iter().map(Token::match_text).collect::<Vec<_>>().join(" ")
}
