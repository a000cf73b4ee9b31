//! Per-mention hybrid scoring.
//!
//! score_final = Σ(ŵ_i × s_i) over present components, with ŵ renormalized
//! to the present set, minus a flat penalty for alias-only candidates.

use odontolink_common::{Candidate, Mention, MentionState};
use odontolink_config::{ScoringConfig, WeightsConfig};
use tracing::debug;

use crate::context::NeighborContext;
use crate::weights::HybridWeights;

#[derive(Debug, Clone)]
pub struct HybridScorer {
    weights: HybridWeights,
    config: ScoringConfig,
    lexical_only: bool,
}

impl HybridScorer {
    pub fn new(weights: WeightsConfig, config: ScoringConfig) -> Self {
        Self {
            weights: weights.into(),
            config,
            lexical_only: false,
        }
    }

    /// Lexical-only fallback: `score_final` is the lexical score alone.
    pub fn lexical_only(mut self, on: bool) -> Self {
        self.lexical_only = on;
        self
    }

    pub fn is_lexical_only(&self) -> bool {
        self.lexical_only
    }

    pub fn weights(&self) -> &HybridWeights {
        &self.weights
    }

    /// Fused score for one candidate, penalty included, never below zero.
    ///
    /// In lexical-only mode the lexical score is returned untouched; alias-only
    /// candidates then rank below real ones through the sort tie-break.
    pub fn score_candidate(&self, candidate: &Candidate) -> f64 {
        if self.lexical_only {
            return candidate.lex();
        }
        let raw = self.weights.fuse(&candidate.scores);
        if candidate.iri_source.is_provisional() {
            (raw - self.config.placeholder_penalty).max(0.0)
        } else {
            raw
        }
    }

    /// Merge duplicate identifiers, attach context, score, sort, apply the
    /// confident-singleton rule and cut to top-k.
    pub fn score_mention(&self, mention: &mut Mention, context: Option<&NeighborContext>) {
        let mut merged: Vec<Candidate> = Vec::with_capacity(mention.candidates.len());
        for c in mention.candidates.drain(..) {
            match merged.iter().position(|m| m.iri == c.iri) {
                Some(i) => merged[i].merge_from(&c),
                None => merged.push(c),
            }
        }

        for c in merged.iter_mut() {
            c.scores.ctx = match context {
                Some(ctx) if !self.lexical_only && ctx.supports(c) => Some(self.config.context_boost),
                _ => None,
            };
            c.score_final = self.score_candidate(c);
        }

        merged.sort_by(|a, b| {
            b.score_final
                .total_cmp(&a.score_final)
                .then_with(|| b.iri_source.is_real().cmp(&a.iri_source.is_real()))
                .then_with(|| b.lex().total_cmp(&a.lex()))
                .then_with(|| a.iri.cmp(&b.iri))
        });

        let strong: Vec<usize> = merged
            .iter()
            .enumerate()
            .filter(|(_, c)| c.lex() >= self.config.confident_lex_threshold && c.iri_source.is_real())
            .map(|(i, _)| i)
            .collect();
        if let [only] = strong.as_slice() {
            let keep = merged.swap_remove(*only);
            debug!(
                "Confident singleton {} for '{}' ({} competitors dropped)",
                keep.iri,
                mention.surface,
                merged.len()
            );
            merged = vec![keep];
            mention.confident_singleton = true;
        }

        merged.truncate(self.config.topk_final.max(1));
        mention.candidates = merged;
        mention.state = MentionState::Scored;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odontolink_common::{ConceptKind, IriSource, Scores, Span};
    use pretty_assertions::assert_eq;

    fn scorer() -> HybridScorer {
        HybridScorer::new(WeightsConfig::default(), ScoringConfig::default())
    }

    fn mention(cands: Vec<Candidate>) -> Mention {
        let mut m = Mention::new("שתל", Span::new(0, 3), vec![0]);
        m.candidates = cands;
        m
    }

    fn lex(iri: &str, s: f64, src: IriSource) -> Candidate {
        Candidate::new(iri, iri, src).with_scores(Scores::lexical(s))
    }

    fn vec_only(iri: &str, s: f64) -> Candidate {
        Candidate::new(iri, iri, IriSource::OhdLabel).with_scores(Scores::vector(s))
    }

    #[test]
    fn test_lexical_only_final_equals_lex() {
        let s = scorer().lexical_only(true);
        let mut c = lex("A", 0.825, IriSource::OhdSynonym);
        c.scores.prior = Some(0.4);
        assert_eq!(s.score_candidate(&c), 0.825);
    }

    #[test]
    fn test_lexical_only_alias_keeps_lex_and_ranks_below_real() {
        let s = scorer().lexical_only(true);
        let alias = lex("ALIAS", 0.9, IriSource::AliasOnly);
        assert_eq!(s.score_candidate(&alias), 0.9);

        let mut m = mention(vec![alias, lex("REAL", 0.9, IriSource::OhdSynonym)]);
        s.score_mention(&mut m, None);
        assert_eq!(m.candidates[0].iri, "REAL");
        for c in &m.candidates {
            assert_eq!(c.score_final, c.lex());
        }
    }

    #[test]
    fn test_alias_only_penalty_is_floored() {
        let s = scorer();
        assert!((s.score_candidate(&lex("A", 0.9, IriSource::AliasOnly)) - 0.85).abs() < 1e-12);
        assert_eq!(s.score_candidate(&lex("A", 0.02, IriSource::AliasOnly)), 0.0);
    }

    #[test]
    fn test_confident_singleton_drops_vector_competitors() {
        let mut m = mention(vec![
            lex("OHD:implant", 1.0, IriSource::OhdLabel),
            vec_only("OHD:crown", 0.95),
            vec_only("OHD:screw", 0.5),
        ]);
        scorer().score_mention(&mut m, None);
        assert!(m.confident_singleton);
        assert_eq!(m.candidates.len(), 1);
        assert_eq!(m.top_iri(), Some("OHD:implant"));
        assert_eq!(m.state, MentionState::Scored);
    }

    #[test]
    fn test_two_strong_candidates_are_not_singleton() {
        let mut m = mention(vec![
            lex("A", 1.0, IriSource::OhdLabel),
            lex("B", 0.9, IriSource::OhdSynonym),
            lex("C", 0.95, IriSource::AliasOnly),
        ]);
        scorer().score_mention(&mut m, None);
        assert!(!m.confident_singleton);
        assert_eq!(m.candidates.len(), 3);
        assert_eq!(m.top_iri(), Some("A"));
    }

    #[test]
    fn test_duplicate_iris_merge_before_scoring() {
        let mut m = mention(vec![lex("A", 0.8, IriSource::OhdLabel), vec_only("A", 0.6)]);
        scorer().score_mention(&mut m, None);
        assert_eq!(m.candidates.len(), 1);
        let c = &m.candidates[0];
        assert_eq!(c.scores.vec, Some(0.6));
        assert!((c.score_final - (0.6 * 0.8 + 0.3 * 0.6) / 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_context_boost_and_topk() {
        let ctx = NeighborContext {
            hints: [odontolink_common::hints::DEVICE.to_string()].into_iter().collect(),
            texts: vec![],
        };
        let mut cands: Vec<Candidate> = (0..8).map(|i| vec_only(&format!("V{i}"), 0.3 + i as f64 * 0.05)).collect();
        cands.push(
            Candidate::new("D", "d", IriSource::OhdLabel)
                .with_scores(Scores::lexical(0.8))
                .with_kind(Some(ConceptKind::Device)),
        );
        let mut m = mention(cands);
        scorer().score_mention(&mut m, Some(&ctx));
        assert_eq!(m.candidates.len(), 5);
        let d = m.candidates.iter().find(|c| c.iri == "D").unwrap();
        assert_eq!(d.scores.ctx, Some(1.0));
        assert!((d.score_final - (0.6 * 0.8 + 0.04) / 0.64).abs() < 1e-12);
        assert!(m.candidates.windows(2).all(|w| w[0].score_final >= w[1].score_final));
    }
}
