//! Keyword-derived hints for mentions.

use std::collections::BTreeSet;

use odontolink_common::{hints, ConceptKind};

use crate::normalize::normalize_surface;

const HINT_KEYWORDS: &[(&str, &[&str])] = &[
    (hints::DEVICE, &["abutment", "implant", "screw", "שתל", "מולטי", "יוניט", "אבטמנט"]),
    (hints::IMPLANT, &["implant", "fixture", "שתל"]),
    (hints::MATERIAL, &["zirconia", "titanium", "ceramic", "זירקוניה", "טיטניומ"]),
    (hints::FINDING, &["caries", "fracture", "עששת"]),
    (hints::DIMENSION, &["length", "diameter", "width", "height", "אורכ", "קוטר", "רוחב", "גובה"]),
];

/// Hints triggered by any of `texts` (surface, label, corrected surface).
pub fn derive_hints<'a, I>(texts: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let normalized: Vec<String> = texts.into_iter().map(normalize_surface).collect();
    HINT_KEYWORDS
        .iter()
        .filter(|(_, words)| {
            normalized
                .iter()
                .any(|text| words.iter().any(|w| text.contains(&normalize_surface(w))))
        })
        .map(|(hint, _)| hint.to_string())
        .collect()
}

/// Hint implied by a concept kind.
pub fn hint_for_kind(kind: ConceptKind) -> Option<&'static str> {
    match kind {
        ConceptKind::Device => Some(hints::DEVICE),
        ConceptKind::Implant => Some(hints::IMPLANT),
        ConceptKind::Material => Some(hints::MATERIAL),
        ConceptKind::Finding => Some(hints::FINDING),
        ConceptKind::Dimension => Some(hints::DIMENSION),
        ConceptKind::Procedure | ConceptKind::Other => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_implant_typo_correction_yields_implant_hints() {
        let h = derive_hints(["שלת", "dental implant", "שתל"]);
        assert!(h.contains(hints::IMPLANT));
        assert!(h.contains(hints::DEVICE));
        assert!(!h.contains(hints::MATERIAL));
    }

    #[test]
    fn test_dimension_hint_matches_final_letter_form() {
        let h = derive_hints(["אורך"]);
        assert!(h.contains(hints::DIMENSION));
    }

    #[test]
    fn test_no_hints_for_plain_text() {
        assert!(derive_hints(["hello"]).is_empty());
    }
}
