//! Context boost from neighbouring tokens.

use std::collections::BTreeSet;

use odontolink_common::{hints, Candidate, Token};
use odontolink_lexicon::hints::derive_hints;
use odontolink_lexicon::normalize::normalize_surface;

/// Known materials and the surfaces that name them.
const MATERIAL_NAMES: &[(&str, &[&str])] = &[
    ("zirconia", &["zirconia", "זירקוניה", "זירקון"]),
    ("titanium", &["titanium", "טיטניום"]),
    ("ceramic", &["ceramic", "porcelain", "קרמי", "פורצלן"]),
];

/// Hints and texts of the tokens around a mention.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NeighborContext {
    pub hints: BTreeSet<String>,
    /// Normalized token texts.
    pub texts: Vec<String>,
}

impl NeighborContext {
    /// Linkable tokens within `window` positions of the covered range.
    pub fn around(tokens: &[Token], covered: &[usize], window: usize) -> Self {
        let (Some(first), Some(last)) = (covered.iter().min().copied(), covered.iter().max().copied()) else {
            return Self::default();
        };
        let mut ctx = Self::default();
        for t in tokens.iter().filter(|t| t.is_linkable()) {
            let near = (t.idx < first && first - t.idx <= window) || (t.idx > last && t.idx - last <= window);
            if !near {
                continue;
            }
            ctx.hints.extend(t.hints.iter().cloned());
            ctx.hints.extend(derive_hints([t.text.as_str(), t.match_text()]));
            ctx.texts.push(normalize_surface(t.match_text()));
        }
        ctx
    }

    pub fn is_empty(&self) -> bool {
        self.hints.is_empty() && self.texts.is_empty()
    }

    fn names_material(&self, material: &str) -> bool {
        let material = normalize_surface(material);
        let names: Vec<String> = MATERIAL_NAMES
            .iter()
            .find(|(m, _)| *m == material)
            .map(|(_, names)| names.iter().map(|n| normalize_surface(n)).collect())
            .unwrap_or_else(|| vec![material.clone()]);
        self.texts.iter().any(|t| names.iter().any(|n| t.contains(n.as_str())))
    }

    /// Whether a neighbour's hint agrees with the candidate's device kind or material.
    pub fn supports(&self, candidate: &Candidate) -> bool {
        let device = candidate.kind.map(|k| k.is_device_like()).unwrap_or(false)
            && self.hints.iter().any(|h| hints::is_device_like(h));
        let material = candidate
            .material
            .as_deref()
            .map(|m| self.hints.contains(hints::MATERIAL) && self.names_material(m))
            .unwrap_or(false);
        device || material
    }
}
