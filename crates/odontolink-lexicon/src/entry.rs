use odontolink_common::ConceptKind;
use serde::{Deserialize, Serialize};

/// One ontology concept as exported by the lexicon builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexiconEntry {
    pub iri: String,
    pub label: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub frequency_prior: Option<f64>,
    #[serde(default)]
    pub kind: Option<ConceptKind>,
    /// Material attribute, e.g. `titanium`, used by the context boost.
    #[serde(default)]
    pub material: Option<String>,
}

impl LexiconEntry {
    pub fn new(iri: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            iri: iri.into(),
            label: label.into(),
            synonyms: Vec::new(),
            frequency_prior: None,
            kind: None,
            material: None,
        }
    }

    pub fn with_synonyms<I, S>(mut self, synonyms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.synonyms = synonyms.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_prior(mut self, prior: f64) -> Self {
        self.frequency_prior = Some(prior);
        self
    }

    pub fn with_kind(mut self, kind: ConceptKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_material(mut self, material: impl Into<String>) -> Self {
        self.material = Some(material.into());
        self
    }

    /// Numeric-only or very short labels are never indexed.
    pub(crate) fn is_indexable_label(label: &str) -> bool {
        let trimmed = label.trim();
        trimmed.chars().count() > 2 && !trimmed.chars().all(|c| c.is_ascii_digit())
    }
}
