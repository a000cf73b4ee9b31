//! Shared fixture: a small dental lexicon, alias map and hashing-encoder
//! vector index written to a temporary artifact directory.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use odontolink_common::{ConceptKind, LineRecord, TokenKind};
use odontolink_config::{ArtifactPaths, LinkerConfig, VectorConfig};
use odontolink_embed::{FlatVectorIndex, HashingEncoder, IndexRow, VectorRetriever};
use odontolink_lexicon::{LexiconEntry, LoadedLexicon};
use tempfile::TempDir;

pub const IMPLANT: &str = "http://purl.obolibrary.org/obo/OHD_0000012";
pub const MULTI_UNIT: &str = "http://purl.obolibrary.org/obo/OHD_0000034";
pub const CROWN: &str = "http://purl.obolibrary.org/obo/OHD_0000051";
pub const LENGTH: &str = "http://purl.obolibrary.org/obo/OHD_0000077";
pub const SCREW: &str = "http://purl.obolibrary.org/obo/OHD_0000090";
pub const HEALING: &str = "http://purl.obolibrary.org/obo/OHD_0000093";

pub fn entries() -> Vec<LexiconEntry> {
    vec![
        LexiconEntry::new(IMPLANT, "dental implant")
            .with_synonyms(["שתל", "implant"])
            .with_prior(0.8)
            .with_kind(ConceptKind::Implant)
            .with_material("titanium"),
        LexiconEntry::new(MULTI_UNIT, "multi-unit abutment")
            .with_prior(0.5)
            .with_kind(ConceptKind::Device),
        LexiconEntry::new(CROWN, "dental crown")
            .with_synonyms(["כתר"])
            .with_prior(0.6)
            .with_kind(ConceptKind::Device),
        LexiconEntry::new(LENGTH, "implant length")
            .with_synonyms(["אורך"])
            .with_kind(ConceptKind::Dimension),
        LexiconEntry::new(SCREW, "abutment screw").with_kind(ConceptKind::Device),
        LexiconEntry::new(HEALING, "healing abutment").with_kind(ConceptKind::Device),
    ]
}

pub struct Fixture {
    pub dir: TempDir,
    pub config: LinkerConfig,
}

impl Fixture {
    /// Artifacts on disk plus a config pointing at them.
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = |name: &str| -> PathBuf { dir.path().join(name) };

        let lexicon: String = entries()
            .iter()
            .map(|e| serde_json::to_string(e).unwrap() + "\n")
            .collect();
        std::fs::write(path("lexicon.jsonl"), lexicon).unwrap();
        std::fs::write(
            path("aliases.json"),
            r#"{"מולטיוניט": {"target": "MUA", "label": "multi-unit abutment"}}"#,
        )
        .unwrap();

        let vector = VectorConfig {
            hashing_dim: 1024,
            min_score: 0.5,
            ..VectorConfig::default()
        };
        let encoder = HashingEncoder::new(vector.hashing_dim).with_model_id(&vector.model_id);
        let index = FlatVectorIndex::from_texts(&encoder, IndexRow::for_entries(&entries()))
            .await
            .unwrap();
        index
            .save(&path("ohd_index.meta.json"), &path("ohd_index.f32"))
            .unwrap();

        let config = LinkerConfig {
            artifacts: ArtifactPaths {
                lexicon: path("lexicon.jsonl"),
                alias_map: Some(path("aliases.json")),
                vector_meta: path("ohd_index.meta.json"),
                vector_data: path("ohd_index.f32"),
                ..ArtifactPaths::default()
            },
            vector,
            ..LinkerConfig::default()
        };
        Self { dir, config }
    }

    /// Retriever over the on-disk index, for linkers built by hand.
    pub fn retriever(&self, lexicon: &LoadedLexicon) -> VectorRetriever {
        let vector = &self.config.vector;
        let encoder = HashingEncoder::new(vector.hashing_dim).with_model_id(&vector.model_id);
        let index = FlatVectorIndex::load(&self.config.artifacts.vector_meta, &self.config.artifacts.vector_data)
            .unwrap();
        VectorRetriever::new(vector.clone(), Arc::new(encoder), Some(Arc::new(index)))
            .unwrap()
            .with_lexicon(lexicon.index.clone())
    }

    pub fn remove_index(&self) {
        std::fs::remove_file(&self.config.artifacts.vector_data).unwrap();
    }
}

pub fn line(id: &str, pieces: &[(&str, TokenKind)]) -> LineRecord {
    LineRecord::from_tagged(id, pieces)
}

pub fn words(id: &str, words: &[&str]) -> LineRecord {
    let pieces: Vec<(&str, TokenKind)> = words.iter().map(|w| (*w, TokenKind::Word)).collect();
    LineRecord::from_tagged(id, &pieces)
}
