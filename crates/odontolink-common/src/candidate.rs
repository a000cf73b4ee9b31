//! Candidate identifiers and their score breakdown.

use serde::{Deserialize, Serialize};

/// Where a candidate's identifier came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IriSource {
    OhdLabel,
    OhdSynonym,
    ResolvedAlias,
    /// Alias that could not be resolved to a real identifier. Terminal, penalized.
    AliasOnly,
    /// Transient marker; must be resolved or downgraded before output.
    Placeholder,
}

impl IriSource {
    /// Backed by a real ontology identifier.
    pub fn is_real(self) -> bool {
        matches!(
            self,
            IriSource::OhdLabel | IriSource::OhdSynonym | IriSource::ResolvedAlias
        )
    }

    pub fn is_provisional(self) -> bool {
        !self.is_real()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IriSource::OhdLabel => "ohd_label",
            IriSource::OhdSynonym => "ohd_synonym",
            IriSource::ResolvedAlias => "resolved_alias",
            IriSource::AliasOnly => "alias_only",
            IriSource::Placeholder => "placeholder",
        }
    }
}

/// Broad concept category of a lexicon entry, used for context and bundling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConceptKind {
    Device,
    Implant,
    Material,
    Finding,
    Procedure,
    Dimension,
    Other,
}

impl ConceptKind {
    pub fn is_device_like(self) -> bool {
        matches!(self, ConceptKind::Device | ConceptKind::Implant)
    }
}

/// How the lexical score was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchKind {
    ExactLabel,
    ExactSynonym,
    Fuzzy { edit_distance: usize },
    Alias,
}

/// Per-component scores. Absent components are omitted, never null.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lex: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vec: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ctx: Option<f64>,
}

impl Scores {
    pub fn lexical(lex: f64) -> Self {
        Self {
            lex: Some(lex),
            ..Self::default()
        }
    }

    pub fn vector(vec: f64) -> Self {
        Self {
            vec: Some(vec),
            ..Self::default()
        }
    }

    /// Fill components absent here from `other`, keeping the larger value where both exist.
    pub fn absorb(&mut self, other: &Scores) {
        fn max_opt(a: Option<f64>, b: Option<f64>) -> Option<f64> {
            match (a, b) {
                (Some(x), Some(y)) => Some(x.max(y)),
                (x, None) => x,
                (None, y) => y,
            }
        }
        self.lex = max_opt(self.lex, other.lex);
        self.vec = max_opt(self.vec, other.vec);
        self.prior = max_opt(self.prior, other.prior);
        self.ctx = max_opt(self.ctx, other.ctx);
    }
}

/// Which evidence paths produced a candidate. Not part of the wire format.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evidence {
    pub lexical: Option<MatchKind>,
    pub vector: bool,
    pub rescue: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub iri: String,
    pub label: String,
    pub scores: Scores,
    pub score_final: f64,
    pub iri_source: IriSource,
    pub normalized_surface: Option<String>,

    #[serde(skip)]
    pub evidence: Evidence,
    #[serde(skip)]
    pub kind: Option<ConceptKind>,
    #[serde(skip)]
    pub material: Option<String>,
}

impl Candidate {
    pub fn new(iri: impl Into<String>, label: impl Into<String>, iri_source: IriSource) -> Self {
        Self {
            iri: iri.into(),
            label: label.into(),
            scores: Scores::default(),
            score_final: 0.0,
            iri_source,
            normalized_surface: None,
            evidence: Evidence::default(),
            kind: None,
            material: None,
        }
    }

    pub fn with_scores(mut self, scores: Scores) -> Self {
        self.scores = scores;
        self
    }

    pub fn with_kind(mut self, kind: Option<ConceptKind>) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_material(mut self, material: Option<String>) -> Self {
        self.material = material;
        self
    }

    pub fn with_normalized_surface(mut self, surface: Option<String>) -> Self {
        self.normalized_surface = surface;
        self
    }

    /// Lexical score, treating an absent component as zero.
    pub fn lex(&self) -> f64 {
        self.scores.lex.unwrap_or(0.0)
    }

    pub fn has_lexical_support(&self) -> bool {
        self.scores.lex.map(|s| s > 0.0).unwrap_or(false)
    }

    /// Found only by the vector path.
    pub fn is_vector_only(&self) -> bool {
        !self.has_lexical_support() && self.scores.vec.is_some()
    }

    /// Fold another candidate for the same identifier into this one.
    pub fn merge_from(&mut self, other: &Candidate) {
        self.scores.absorb(&other.scores);
        if other.iri_source.is_real() && !self.iri_source.is_real() {
            self.iri_source = other.iri_source;
        }
        if self.evidence.lexical.is_none() {
            self.evidence.lexical = other.evidence.lexical;
        }
        self.evidence.vector |= other.evidence.vector;
        self.evidence.rescue |= other.evidence.rescue;
        if self.normalized_surface.is_none() {
            self.normalized_surface = other.normalized_surface.clone();
        }
        if self.kind.is_none() {
            self.kind = other.kind;
        }
        if self.material.is_none() {
            self.material = other.material.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape_omits_absent_scores() {
        let c = Candidate::new("http://purl.obolibrary.org/obo/OHD_0000001", "dental implant", IriSource::OhdLabel)
            .with_scores(Scores::lexical(1.0));
        let v = serde_json::to_value(&c).unwrap();
        let obj = v.as_object().unwrap();
        let mut keys: Vec<_> = obj.keys().cloned().collect();
        keys.sort();
        assert_eq!(
            keys,
            vec!["iri", "iri_source", "label", "normalized_surface", "score_final", "scores"]
        );
        assert_eq!(v["scores"].as_object().unwrap().len(), 1);
        assert_eq!(v["iri_source"], "ohd_label");
    }

    #[test]
    fn test_merge_prefers_real_source() {
        let mut a = Candidate::new("X", "x", IriSource::AliasOnly).with_scores(Scores::lexical(0.9));
        let mut b = Candidate::new("X", "x", IriSource::OhdLabel).with_scores(Scores::vector(0.7));
        b.evidence.vector = true;
        a.merge_from(&b);
        assert_eq!(a.iri_source, IriSource::OhdLabel);
        assert_eq!(a.scores.lex, Some(0.9));
        assert_eq!(a.scores.vec, Some(0.7));
        assert!(a.evidence.vector);
    }

    #[test]
    fn test_vector_only() {
        let c = Candidate::new("X", "x", IriSource::OhdLabel).with_scores(Scores::vector(0.4));
        assert!(c.is_vector_only());
        let c = c.with_scores(Scores { lex: Some(0.8), vec: Some(0.4), ..Scores::default() });
        assert!(!c.is_vector_only());
    }
}
