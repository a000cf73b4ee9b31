//! Mentions, their lifecycle, and device/dimension bundles.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::candidate::{Candidate, ConceptKind};
use crate::hints;
use crate::tokens::Span;

/// Lifecycle of a mention within one resolution pass.
///
/// `Unresolved → {LexicalMatched, VectorMatched, Both} → [Rescued] → Scored
/// → Deduped → Final`, with `UnresolvedFinal` as the terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MentionState {
    #[default]
    Unresolved,
    LexicalMatched,
    VectorMatched,
    Both,
    Rescued,
    Scored,
    Deduped,
    Final,
    UnresolvedFinal,
}

impl MentionState {
    pub fn with_lexical(self) -> Self {
        match self {
            MentionState::Unresolved | MentionState::LexicalMatched => MentionState::LexicalMatched,
            MentionState::VectorMatched | MentionState::Both => MentionState::Both,
            other => other,
        }
    }

    pub fn with_vector(self) -> Self {
        match self {
            MentionState::Unresolved | MentionState::VectorMatched => MentionState::VectorMatched,
            MentionState::LexicalMatched | MentionState::Both => MentionState::Both,
            other => other,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, MentionState::Final | MentionState::UnresolvedFinal)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mention {
    pub mention_id: String,
    pub surface: String,
    pub span: Span,
    pub covered_token_idxs: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_surface: Option<String>,
    #[serde(default)]
    pub hints: BTreeSet<String>,
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub confident_singleton: bool,
    /// Provenance notes, e.g. `llm_rescue`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    #[serde(default)]
    pub state: MentionState,
}

impl Mention {
    pub fn new(surface: impl Into<String>, span: Span, covered_token_idxs: Vec<usize>) -> Self {
        Self {
            mention_id: Self::id_for(span),
            surface: surface.into(),
            span,
            covered_token_idxs,
            normalized_surface: None,
            hints: BTreeSet::new(),
            candidates: Vec::new(),
            confident_singleton: false,
            notes: Vec::new(),
            state: MentionState::Unresolved,
        }
    }

    pub fn id_for(span: Span) -> String {
        format!("m_{}_{}", span.start, span.end)
    }

    pub fn top(&self) -> Option<&Candidate> {
        self.candidates.first()
    }

    pub fn top_iri(&self) -> Option<&str> {
        self.top().map(|c| c.iri.as_str())
    }

    pub fn has_note(&self, note: &str) -> bool {
        self.notes.iter().any(|n| n == note)
    }

    pub fn add_note(&mut self, note: &str) {
        if !self.has_note(note) {
            self.notes.push(note.to_string());
        }
    }

    /// Concept kind of the best candidate, falling back to hints.
    pub fn concept_kind(&self) -> Option<ConceptKind> {
        if let Some(kind) = self.top().and_then(|c| c.kind) {
            return Some(kind);
        }
        if self.hints.iter().any(|h| hints::is_device_like(h)) {
            Some(ConceptKind::Device)
        } else if self.hints.contains(hints::DIMENSION) {
            Some(ConceptKind::Dimension)
        } else if self.hints.contains(hints::MATERIAL) {
            Some(ConceptKind::Material)
        } else {
            None
        }
    }

    /// Extend this mention to also cover `other`.
    pub fn absorb_adjacent(&mut self, other: &Mention) {
        self.span = self.span.cover(&other.span);
        self.mention_id = Self::id_for(self.span);
        self.surface = format!("{} {}", self.surface, other.surface);
        self.covered_token_idxs.extend(other.covered_token_idxs.iter().copied());
        self.covered_token_idxs.sort_unstable();
        self.covered_token_idxs.dedup();
        self.hints.extend(other.hints.iter().cloned());
        for note in &other.notes {
            self.add_note(note);
        }
        self.confident_singleton |= other.confident_singleton;
    }
}

/// A device-like mention grouped with an adjacent dimension mention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub bundle_id: String,
    pub device_mention: String,
    pub dimension_mention: String,
    pub device_iri: String,
    pub dimension_iri: String,
    pub span: Span,
    /// Raw text of number/pair/unit tokens inside or directly after the bundle.
    #[serde(default)]
    pub measurements: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::IriSource;

    #[test]
    fn test_state_transitions() {
        let s = MentionState::Unresolved.with_lexical();
        assert_eq!(s, MentionState::LexicalMatched);
        assert_eq!(s.with_vector(), MentionState::Both);
        assert_eq!(MentionState::Unresolved.with_vector().with_lexical(), MentionState::Both);
        assert!(MentionState::UnresolvedFinal.is_terminal());
        assert!(!MentionState::Scored.is_terminal());
    }

    #[test]
    fn test_absorb_adjacent_expands_span() {
        let mut a = Mention::new("מולטי", Span::new(0, 5), vec![0]);
        let b = Mention::new("יוניט", Span::new(5, 10), vec![1]);
        a.absorb_adjacent(&b);
        assert_eq!(a.span, Span::new(0, 10));
        assert_eq!(a.mention_id, "m_0_10");
        assert_eq!(a.covered_token_idxs, vec![0, 1]);
    }

    #[test]
    fn test_concept_kind_prefers_candidate() {
        let mut m = Mention::new("x", Span::new(0, 1), vec![0]);
        m.hints.insert(hints::DEVICE.to_string());
        assert_eq!(m.concept_kind(), Some(ConceptKind::Device));
        m.candidates
            .push(Candidate::new("I", "i", IriSource::OhdLabel).with_kind(Some(ConceptKind::Dimension)));
        assert_eq!(m.concept_kind(), Some(ConceptKind::Dimension));
    }
}
