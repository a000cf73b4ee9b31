//! Deduplication and pruning of scored mentions.
//!
//! Rules, applied in order until nothing changes:
//! 1. Drop provisional (placeholder/alias-only) candidates from a mention
//!    that also has a real-identifier candidate.
//! 2. Merge token-adjacent mentions whose top candidate has the same
//!    identifier into one mention with the covering span.
//! 3. Drop vector-only candidates scoring below the noise floor when a
//!    lexical hit covers an overlapping span.
//!
//! Mentions left without candidates are removed.

use odontolink_common::{Candidate, Mention, MentionState};
use odontolink_config::ScoringConfig;
use tracing::debug;

const MAX_PASSES: usize = 4;

#[derive(Debug, Clone)]
pub struct Deduplicator {
    noise_floor: f64,
}

impl Deduplicator {
    pub fn new(config: &ScoringConfig) -> Self {
        Self { noise_floor: config.vector_noise_floor }
    }

    pub fn dedup(&self, mut mentions: Vec<Mention>) -> Vec<Mention> {
        for _ in 0..MAX_PASSES {
            let before = mentions.clone();
            mentions = self.pass(mentions);
            if mentions == before {
                break;
            }
        }
        mentions
    }

    fn pass(&self, mut mentions: Vec<Mention>) -> Vec<Mention> {
        for m in mentions.iter_mut() {
            drop_provisional(m);
        }
        let mut mentions = merge_sequential(mentions);
        self.prune_vector_noise(&mut mentions);
        mentions.retain(|m| !m.candidates.is_empty());
        for m in mentions.iter_mut() {
            m.state = MentionState::Deduped;
        }
        mentions
    }

    fn prune_vector_noise(&self, mentions: &mut [Mention]) {
        let anchors: Vec<_> = mentions
            .iter()
            .filter(|m| m.candidates.iter().any(Candidate::has_lexical_support))
            .map(|m| m.span)
            .collect();
        for m in mentions.iter_mut() {
            if !anchors.iter().any(|a| a.overlaps(&m.span)) {
                continue;
            }
            let before = m.candidates.len();
            let floor = self.noise_floor;
            m.candidates.retain(|c| !(c.is_vector_only() && c.score_final < floor));
            if m.candidates.len() != before {
                debug!("Pruned {} vector-only candidates from {}", before - m.candidates.len(), m.mention_id);
            }
        }
    }
}

fn drop_provisional(mention: &mut Mention) {
    if mention.candidates.iter().any(|c| c.iri_source.is_real()) {
        mention.candidates.retain(|c| c.iri_source.is_real());
    }
}

fn merge_sequential(mut mentions: Vec<Mention>) -> Vec<Mention> {
    mentions.sort_by_key(|m| (m.span.start, m.span.end));
    let mut out: Vec<Mention> = Vec::with_capacity(mentions.len());
    for m in mentions {
        if let Some(last) = out.last_mut() {
            if is_adjacent(last, &m) && last.top_iri().is_some() && last.top_iri() == m.top_iri() {
                merge_into(last, m);
                continue;
            }
        }
        out.push(m);
    }
    out
}

fn is_adjacent(a: &Mention, b: &Mention) -> bool {
    match (a.covered_token_idxs.iter().max(), b.covered_token_idxs.iter().min()) {
        (Some(&end), Some(&start)) => end + 1 == start,
        _ => a.span.end == b.span.start,
    }
}

fn merge_into(target: &mut Mention, other: Mention) {
    target.absorb_adjacent(&other);
    if target.normalized_surface.is_none() {
        target.normalized_surface = other.normalized_surface.clone();
    }
    for c in other.candidates {
        match target.candidates.iter().position(|t| t.iri == c.iri) {
            Some(i) => {
                let keep = target.candidates[i].score_final.max(c.score_final);
                target.candidates[i].merge_from(&c);
                target.candidates[i].score_final = keep;
            }
            None => target.candidates.push(c),
        }
    }
    target.candidates.sort_by(|a, b| {
        b.score_final
            .total_cmp(&a.score_final)
            .then_with(|| a.iri.cmp(&b.iri))
    });
}
