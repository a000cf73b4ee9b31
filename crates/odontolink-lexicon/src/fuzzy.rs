//! Edit-distance matching with a length-dependent acceptance band.
//!
//! Distance is optimal string alignment (adjacent transpositions count as one
//! edit), so the common typo `שלת` for `שתל` is a single edit.
//!
//! A candidate key is accepted when
//! - `edit_distance <= max_edit_distance` and both strings have at least
//!   `min_len` characters, and
//! - `similarity = 1 - ed / max_len` falls inside the active band. The band
//!   widens to `short_band` when `ed == 1` and the query has at most
//!   `short_max_len` characters.
//!
//! The score maps `q = 0.5 * length_ratio + 0.5 * similarity` linearly into
//! `score_range`. It rises with the length ratio and falls with the edit distance.

use odontolink_config::{Band, GazetteerConfig};

use crate::normalize::char_len;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuzzyAssessment {
    pub edit_distance: usize,
    pub similarity: f64,
    pub length_ratio: f64,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct FuzzyMatcher {
    max_edit_distance: usize,
    min_len: usize,
    band: Band,
    short_band: Band,
    short_max_len: usize,
    score_range: Band,
}

impl FuzzyMatcher {
    pub fn new(config: &GazetteerConfig) -> Self {
        Self {
            max_edit_distance: config.fuzzy_max_edit_distance,
            min_len: config.fuzzy_min_len,
            band: config.fuzzy_band,
            short_band: config.short_fuzzy_band,
            short_max_len: config.short_max_len,
            score_range: config.fuzzy_score_range,
        }
    }

    pub fn max_edit_distance(&self) -> usize {
        self.max_edit_distance
    }

    pub fn min_len(&self) -> usize {
        self.min_len
    }

    /// Band that applies to a query of `query_len` chars at distance `ed`.
    pub fn band_for(&self, ed: usize, query_len: usize) -> Band {
        if ed == 1 && query_len <= self.short_max_len {
            self.short_band
        } else {
            self.band
        }
    }

    /// Compare two compact forms. Identical strings are not fuzzy matches.
    pub fn assess(&self, query: &str, key: &str) -> Option<FuzzyAssessment> {
        let qlen = char_len(query);
        let klen = char_len(key);
        if qlen.min(klen) < self.min_len || qlen.abs_diff(klen) > self.max_edit_distance {
            return None;
        }

        let ed = strsim::osa_distance(query, key);
        if ed == 0 || ed > self.max_edit_distance {
            return None;
        }

        let max_len = qlen.max(klen) as f64;
        let similarity = 1.0 - ed as f64 / max_len;
        if !self.band_for(ed, qlen).contains(similarity) {
            return None;
        }

        let length_ratio = qlen.min(klen) as f64 / max_len;
        let q = 0.5 * length_ratio + 0.5 * similarity;
        let score = self.score_range.low + (self.score_range.high - self.score_range.low) * q;

        Some(FuzzyAssessment {
            edit_distance: ed,
            similarity,
            length_ratio,
            score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> FuzzyMatcher {
        FuzzyMatcher::new(&GazetteerConfig::default())
    }

    #[test]
    fn test_transposition_typo_accepted_in_short_band() {
        let a = matcher().assess("שלת", "שתל").unwrap();
        assert_eq!(a.edit_distance, 1);
        assert!((a.similarity - 2.0 / 3.0).abs() < 1e-9);
        assert!(a.score >= 0.70 && a.score <= 0.85, "score {}", a.score);
    }

    #[test]
    fn test_short_query_rejected_by_base_band() {
        let m = matcher();
        // similarity 0.667 is outside the base band [0.80, 1.0]
        assert!(!m.band_for(1, 6).contains(2.0 / 3.0));
        assert!(m.band_for(1, 3).contains(2.0 / 3.0));
    }

    #[test]
    fn test_longer_word_one_substitution() {
        let a = matcher().assess("abutmant", "abutment").unwrap();
        assert_eq!(a.edit_distance, 1);
        assert!(a.score > 0.80);
    }

    #[test]
    fn test_rejections() {
        let m = matcher();
        assert!(m.assess("שתל", "שתל").is_none(), "exact is not fuzzy");
        assert!(m.assess("ab", "ac").is_none(), "below min length");
        assert!(m.assess("implant", "implnta").is_none(), "distance 2");
        assert!(m.assess("abc", "abcde").is_none(), "length gap");
    }

    #[test]
    fn test_score_monotonic_in_length_ratio() {
        let m = matcher();
        let same_len = m.assess("abutmant", "abutment").unwrap();
        let insertion = m.assess("abutment", "abutments").unwrap();
        assert!(same_len.length_ratio > insertion.length_ratio);
        assert!(same_len.score > insertion.score);
    }
}
