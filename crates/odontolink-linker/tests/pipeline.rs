//! End-to-end linking over an on-disk fixture: lexicon, alias map and a
//! hashing-encoder vector index, with the offline static oracle.

mod common;

use std::sync::Arc;

use common::{line, words, Fixture, CROWN, IMPLANT, LENGTH, MULTI_UNIT, SCREW};
use odontolink_common::{IriSource, LinkError, MentionState, TokenKind};
use odontolink_lexicon::load_artifacts;
use odontolink_linker::{Linker, RESCUE_NOTE};
use odontolink_llm::StaticOracle;
use odontolink_ranker::Deduplicator;
use pretty_assertions::assert_eq;

async fn linker(fixture: &Fixture) -> Linker {
    Linker::from_config(fixture.config.clone()).await.unwrap()
}

#[tokio::test]
async fn test_alias_and_typo_line_yields_two_mentions() {
    let fx = Fixture::new().await;
    let linker = linker(&fx).await;
    let record = line(
        "1",
        &[
            ("מולטיוניט", TokenKind::Word),
            ("שלת14", TokenKind::Word),
            ("18/0", TokenKind::Pair),
        ],
    );

    let out = linker.link_line(&record).await.unwrap();
    assert!(!out.lexical_only);
    assert_eq!(out.mentions.len(), 2, "{:#?}", out.mentions);

    let multi = &out.mentions[0];
    assert_eq!(multi.surface, "מולטיוניט");
    assert_eq!(multi.top_iri(), Some(MULTI_UNIT));
    assert!(matches!(
        multi.candidates[0].iri_source,
        IriSource::ResolvedAlias | IriSource::OhdSynonym
    ));
    assert!(multi.confident_singleton);
    assert_eq!(multi.candidates.len(), 1);

    let typo = &out.mentions[1];
    assert_eq!(typo.surface, "שלת14");
    assert_eq!(typo.normalized_surface.as_deref(), Some("שתל"));
    assert_eq!(typo.top_iri(), Some(IMPLANT));
    let lex = typo.candidates[0].scores.lex.unwrap();
    assert!((0.70..=0.85).contains(&lex), "fuzzy lex {lex}");

    for m in &out.mentions {
        assert_eq!(m.state, MentionState::Final);
        for c in &m.candidates {
            assert!(c.iri_source.is_real(), "{} is {:?}", c.iri, c.iri_source);
            assert!(!c.iri.is_empty());
        }
        assert!(m.candidates[0].score_final > 0.0);
    }
}

#[tokio::test]
async fn test_measurement_tokens_never_become_mentions() {
    let fx = Fixture::new().await;
    let linker = linker(&fx).await;
    let record = line(
        "2",
        &[
            ("18/0", TokenKind::Pair),
            ("14", TokenKind::Number),
            ("mm", TokenKind::Unit),
            ("שתל", TokenKind::Word),
            ("4.2", TokenKind::Number),
        ],
    );
    let out = linker.link_line(&record).await.unwrap();

    let word_idx = |i: &usize| record.tokens[*i].kind == TokenKind::Word;
    assert!(out.gazetteer.iter().all(|m| m.covered_token_idxs.iter().all(word_idx)));
    assert!(out.vector.iter().all(|h| h.token_idxs.iter().all(word_idx)));
    assert!(out.mentions.iter().all(|m| m.covered_token_idxs.iter().all(word_idx)));
    assert_eq!(out.mentions.len(), 1);
    assert_eq!(out.mentions[0].top_iri(), Some(IMPLANT));
}

#[tokio::test]
async fn test_vector_disabled_scores_are_lexical() {
    let mut fx = Fixture::new().await;
    fx.config.vector.enabled = false;
    let linker = linker(&fx).await;
    assert!(!linker.vector_available());

    let record = words("3", &["מולטיוניט", "שלת", "כתר"]);
    let out = linker.link_line(&record).await.unwrap();
    assert!(out.lexical_only);
    assert!(out.vector.is_empty());
    assert_eq!(out.mentions.len(), 3);
    for c in out.mentions.iter().flat_map(|m| m.candidates.iter()) {
        assert_eq!(c.score_final, c.scores.lex.unwrap_or(0.0), "{}", c.iri);
        assert!(c.scores.ctx.is_none());
    }
}

#[tokio::test]
async fn test_missing_index_is_fatal_unless_optional() {
    let mut fx = Fixture::new().await;
    fx.remove_index();

    match Linker::from_config(fx.config.clone()).await {
        Err(LinkError::IndexUnavailable(_)) => {}
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("missing index must fail startup"),
    }

    fx.config.vector.require_index = false;
    let linker = linker(&fx).await;
    assert!(!linker.vector_available());
    let out = linker.link_line(&words("4", &["שתל"])).await.unwrap();
    assert!(out.lexical_only);
    let c = &out.mentions[0].candidates[0];
    assert_eq!(c.score_final, c.scores.lex.unwrap());
}

#[tokio::test]
async fn test_rescue_feeds_second_vector_pass() {
    let fx = Fixture::new().await;
    let linker = linker(&fx).await;
    let out = linker.link_line(&words("5", &["ברגים"])).await.unwrap();

    assert_eq!(out.rescues.len(), 1);
    let rescue = &out.rescues[0];
    assert_eq!(rescue.outcome, "rescued");
    assert!((1..=3).contains(&rescue.terms.len()));
    assert_eq!(rescue.terms, vec!["abutment screw".to_string()]);
    assert!(rescue.audit.is_some());

    assert_eq!(out.mentions.len(), 1);
    let m = &out.mentions[0];
    assert!(m.has_note(RESCUE_NOTE));
    assert_eq!(m.top_iri(), Some(SCREW));
    assert!(m.candidates[0].evidence.rescue);
    assert!(m.candidates[0].scores.lex.is_none());
    assert!(m.candidates[0].score_final > 0.0);
}

#[tokio::test]
async fn test_failed_rescue_drops_the_mention() {
    let fx = Fixture::new().await;
    let lexicon = load_artifacts(&fx.config.artifacts).unwrap();
    let retriever = fx.retriever(&lexicon);
    let linker = Linker::builder(fx.config.clone(), lexicon)
        .retriever(retriever)
        .oracle(Arc::new(StaticOracle::new()))
        .build()
        .unwrap();

    let out = linker.link_line(&words("6", &["קפיץ"])).await.unwrap();
    assert!(out.mentions.is_empty());
    assert_eq!(out.rescues.len(), 1);
    assert_eq!(out.rescues[0].outcome, "rejected");
    assert!(out.rescues[0].reason.is_some());
    assert!(out.rescues[0].terms.is_empty());
}

#[tokio::test]
async fn test_device_dimension_bundle() {
    let fx = Fixture::new().await;
    let linker = linker(&fx).await;
    let record = line(
        "7",
        &[
            ("שתל", TokenKind::Word),
            ("4.2", TokenKind::Number),
            ("אורך", TokenKind::Word),
            ("10", TokenKind::Number),
        ],
    );
    let out = linker.link_line(&record).await.unwrap();
    assert_eq!(out.bundles.len(), 1);
    let b = &out.bundles[0];
    assert_eq!(b.device_iri, IMPLANT);
    assert_eq!(b.dimension_iri, LENGTH);
    assert_eq!(b.measurements, vec!["4.2".to_string(), "10".to_string()]);
}

#[tokio::test]
async fn test_batch_skips_invalid_lines_and_keeps_order() {
    let fx = Fixture::new().await;
    let linker = linker(&fx).await;

    let mut broken = words("bad", &["שתל", "כתר"]);
    broken.tokens[1].idx = 7;
    let records = vec![
        words("a", &["כתר"]),
        broken,
        words("b", &["שתל"]),
        words("c", &["מולטיוניט"]),
    ];

    let batch = linker.link_batch(records).await;
    let ids: Vec<_> = batch.outputs.iter().map(|o| o.line_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(batch.skipped.len(), 1);
    assert!(batch.skipped[0].is_line_local());
    assert_eq!(batch.outputs[0].mentions[0].top_iri(), Some(CROWN));

    let summary = batch.summary();
    assert_eq!(summary.lines, 3);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.mentions, 3);
}

#[tokio::test]
async fn test_final_mentions_are_dedup_fixpoint() {
    let fx = Fixture::new().await;
    let linker = linker(&fx).await;
    let out = linker
        .link_line(&words("8", &["מולטיוניט", "שלת", "כתר", "אורך"]))
        .await
        .unwrap();

    let dedup = Deduplicator::new(&fx.config.scoring);
    let once = dedup.dedup(out.mentions.clone());
    let twice = dedup.dedup(once.clone());
    assert_eq!(once, twice);
    assert_eq!(once.len(), out.mentions.len());
}
