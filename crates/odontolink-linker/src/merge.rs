//! Joining gazetteer mentions and vector hits into one mention list per line.

use std::collections::HashSet;

use odontolink_common::{Candidate, LineRecord, Mention, MentionState, Token};
use odontolink_embed::{VectorHit, VectorTarget};
use odontolink_lexicon::hints::{derive_hints, hint_for_kind};

/// Vector targets for one line: every gazetteer mention, then every word
/// token no mention covers. Line-level canonical terms apply to the
/// uncovered tokens only.
pub fn vector_targets(record: &LineRecord, gazetteer: &[Mention]) -> Vec<VectorTarget> {
    let covered: HashSet<usize> = gazetteer
        .iter()
        .flat_map(|m| m.covered_token_idxs.iter().copied())
        .collect();

    let mut targets: Vec<VectorTarget> = gazetteer.iter().map(VectorTarget::from_mention).collect();
    targets.extend(
        record
            .tokens
            .iter()
            .filter(|t| t.is_linkable() && !covered.contains(&t.idx))
            .map(|t| VectorTarget::from_token(t).with_canonical_terms(record.canonical_terms.clone())),
    );
    targets
}

/// Fold vector hits into the gazetteer mentions.
///
/// Targets without a gazetteer mention get an empty mention first, so a word
/// token that neither path matched is still visible to the rescue step.
pub fn merge_candidates(
    gazetteer: &[Mention],
    targets: &[VectorTarget],
    hits: &[VectorHit],
    tokens: &[Token],
) -> Vec<Mention> {
    let mut mentions: Vec<Mention> = gazetteer.to_vec();
    for target in targets {
        if !mentions.iter().any(|m| m.mention_id == target.mention_id) {
            mentions.push(shell_mention(target, tokens));
        }
    }

    for hit in hits.iter().filter(|h| !h.candidates.is_empty()) {
        let Some(mention) = mentions.iter_mut().find(|m| m.mention_id == hit.mention_id) else {
            continue;
        };
        absorb_candidates(mention, &hit.candidates);
        mention.state = mention.state.with_vector();
    }

    mentions.sort_by_key(|m| (m.span.start, m.span.end));
    mentions
}

/// Add candidates to a mention, folding duplicates by identifier, and
/// refresh the mention's hints from their concept kinds.
pub fn absorb_candidates(mention: &mut Mention, candidates: &[Candidate]) {
    for c in candidates {
        match mention.candidates.iter_mut().find(|m| m.iri == c.iri) {
            Some(existing) => existing.merge_from(c),
            None => mention.candidates.push(c.clone()),
        }
        if let Some(hint) = c.kind.and_then(hint_for_kind) {
            mention.hints.insert(hint.to_string());
        }
    }
}

fn shell_mention(target: &VectorTarget, tokens: &[Token]) -> Mention {
    let mut mention = Mention::new(target.surface.clone(), target.span, target.token_idxs.clone());
    mention.hints = derive_hints([target.surface.as_str()]);
    for token in tokens.iter().filter(|t| target.token_idxs.contains(&t.idx)) {
        mention.hints.extend(token.hints.iter().cloned());
    }
    mention.state = MentionState::Unresolved;
    mention
}

#[cfg(test)]
mod tests {
    use super::*;
    use odontolink_common::{ConceptKind, IriSource, Scores, Span, TokenKind};
    use pretty_assertions::assert_eq;

    fn line() -> LineRecord {
        LineRecord::from_tagged(
            "7",
            &[
                ("מולטיוניט", TokenKind::Word),
                ("על", TokenKind::Word),
                ("18/0", TokenKind::Pair),
                ("מ״מ", TokenKind::Unit),
            ],
        )
    }

    fn gazetteer_mention(record: &LineRecord) -> Mention {
        let t = &record.tokens[0];
        let mut m = Mention::new(t.text.clone(), t.span, vec![0]);
        m.candidates.push(
            Candidate::new("OHD:mua", "multi-unit abutment", IriSource::OhdSynonym)
                .with_scores(Scores::lexical(0.9)),
        );
        m.state = MentionState::LexicalMatched;
        m
    }

    #[test]
    fn test_targets_skip_measurements_and_covered_tokens() {
        let record = line();
        let gaz = vec![gazetteer_mention(&record)];
        let targets = vector_targets(&record, &gaz);
        let ids: Vec<_> = targets.iter().map(|t| t.token_idxs.clone()).collect();
        assert_eq!(ids, vec![vec![0], vec![1]]);
        assert!(targets.iter().all(|t| t.canonical_terms.is_empty()));
    }

    #[test]
    fn test_line_canonical_terms_go_to_uncovered_tokens() {
        let mut record = line();
        record.canonical_terms = vec!["abutment".to_string()];
        let gaz = vec![gazetteer_mention(&record)];
        let targets = vector_targets(&record, &gaz);
        assert!(targets[0].canonical_terms.is_empty());
        assert_eq!(targets[1].canonical_terms, vec!["abutment".to_string()]);
    }

    #[test]
    fn test_merge_folds_hits_and_creates_shells() {
        let record = line();
        let gaz = vec![gazetteer_mention(&record)];
        let targets = vector_targets(&record, &gaz);
        let mut vec_cand = Candidate::new("OHD:mua", "multi-unit abutment", IriSource::OhdLabel)
            .with_scores(Scores::vector(0.7))
            .with_kind(Some(ConceptKind::Device));
        vec_cand.evidence.vector = true;
        let hits = vec![VectorHit {
            mention_id: gaz[0].mention_id.clone(),
            surface: gaz[0].surface.clone(),
            query: "מולטיוניט על".to_string(),
            span: gaz[0].span,
            token_idxs: vec![0],
            candidates: vec![vec_cand],
        }];

        let merged = merge_candidates(&gaz, &targets, &hits, &record.tokens);
        assert_eq!(merged.len(), 2);
        let first = &merged[0];
        assert_eq!(first.state, MentionState::Both);
        assert_eq!(first.candidates.len(), 1);
        assert_eq!(first.candidates[0].scores.lex, Some(0.9));
        assert_eq!(first.candidates[0].scores.vec, Some(0.7));
        assert!(first.hints.contains(odontolink_common::hints::DEVICE));

        let shell = &merged[1];
        assert_eq!(shell.span, Span::new(10, 12));
        assert!(shell.candidates.is_empty());
        assert_eq!(shell.state, MentionState::Unresolved);
    }
}
