//! In-memory lexicon index.
//!
//! Every label, synonym and auxiliary surface is stored under its normalized
//! form, with a secondary compact-form table for spacing/hyphen variants and
//! length buckets for fuzzy lookups. Real labels and synonyms also feed an
//! Aho-Corasick automaton used by containment resolution.

use ahash::AHashMap;
use aho_corasick::{AhoCorasick, MatchKind as AcMatchKind};
use odontolink_common::{ConceptKind, IriSource, MatchKind};
use tracing::info;

use crate::alias::AliasTarget;
use crate::entry::LexiconEntry;
use crate::fuzzy::{FuzzyAssessment, FuzzyMatcher};
use crate::normalize::{char_len, compact, normalize_surface};
use crate::{LexiconError, Result};

/// One way a surface maps onto an identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceMeta {
    /// Lexicon surface as written, lowercased.
    pub surface: String,
    pub iri: String,
    pub label: String,
    pub source: IriSource,
    pub match_kind: MatchKind,
    /// Backing lexicon entry, when the identifier is a real one.
    pub entry: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct LexiconStats {
    pub entries: usize,
    pub label_surfaces: usize,
    pub synonym_surfaces: usize,
    pub auxiliary_surfaces: usize,
    pub total_surfaces: usize,
    pub skipped_entries: usize,
}

fn match_rank(kind: MatchKind) -> u8 {
    match kind {
        MatchKind::ExactLabel => 0,
        MatchKind::ExactSynonym => 1,
        MatchKind::Alias => 2,
        MatchKind::Fuzzy { .. } => 3,
    }
}

pub struct LexiconIndex {
    entries: Vec<LexiconEntry>,
    by_iri: AHashMap<String, usize>,
    surfaces: AHashMap<String, Vec<SurfaceMeta>>,
    compact_keys: AHashMap<String, Vec<String>>,
    fuzzy_buckets: AHashMap<usize, Vec<String>>,
    containment: AhoCorasick,
    containment_patterns: Vec<(String, usize)>,
    stats: LexiconStats,
}

impl std::fmt::Debug for LexiconIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LexiconIndex").field("stats", &self.stats).finish()
    }
}

impl LexiconIndex {
    pub fn builder() -> LexiconBuilder {
        LexiconBuilder::default()
    }

    /// Convenience constructor for entries without auxiliary dictionaries.
    pub fn from_entries(entries: Vec<LexiconEntry>) -> Result<Self> {
        let mut builder = LexiconBuilder::default();
        for entry in entries {
            builder.add_entry(entry);
        }
        builder.build()
    }

    pub fn stats(&self) -> &LexiconStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LexiconEntry] {
        &self.entries
    }

    pub fn entry(&self, idx: usize) -> Option<&LexiconEntry> {
        self.entries.get(idx)
    }

    pub fn entry_index(&self, iri: &str) -> Option<usize> {
        self.by_iri.get(iri).copied()
    }

    pub fn entry_by_iri(&self, iri: &str) -> Option<&LexiconEntry> {
        self.entry_index(iri).and_then(|i| self.entries.get(i))
    }

    pub fn kind_of(&self, iri: &str) -> Option<ConceptKind> {
        self.entry_by_iri(iri).and_then(|e| e.kind)
    }

    /// Metas stored under an already-normalized surface.
    pub fn lookup(&self, normalized: &str) -> &[SurfaceMeta] {
        self.surfaces.get(normalized).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Metas whose compact form equals `compact_form`, in key order.
    pub fn lookup_compact(&self, compact_form: &str) -> Vec<&SurfaceMeta> {
        self.compact_keys
            .get(compact_form)
            .into_iter()
            .flatten()
            .flat_map(|key| self.lookup(key))
            .collect()
    }

    /// Best fuzzy key for a compact query: lowest distance, then highest score.
    pub fn fuzzy_lookup(
        &self,
        matcher: &FuzzyMatcher,
        query_compact: &str,
    ) -> Option<(Vec<&SurfaceMeta>, FuzzyAssessment)> {
        let qlen = char_len(query_compact);
        let max_ed = matcher.max_edit_distance();
        let mut best: Option<(&str, FuzzyAssessment)> = None;

        for len in qlen.saturating_sub(max_ed)..=qlen + max_ed {
            let Some(bucket) = self.fuzzy_buckets.get(&len) else { continue };
            for key in bucket {
                let Some(assessment) = matcher.assess(query_compact, key) else { continue };
                let better = match &best {
                    None => true,
                    Some((_, current)) => {
                        assessment.edit_distance < current.edit_distance
                            || (assessment.edit_distance == current.edit_distance
                                && assessment.score > current.score)
                    }
                };
                if better {
                    best = Some((key.as_str(), assessment));
                }
            }
        }

        best.map(|(key, assessment)| (self.lookup_compact(key), assessment))
    }

    /// Case-insensitive exact label/synonym match against real entries.
    pub fn find_exact(&self, text: &str) -> Option<&SurfaceMeta> {
        let key = normalize_surface(text);
        self.lookup(&key)
            .iter()
            .filter(|m| m.entry.is_some() && matches!(m.source, IriSource::OhdLabel | IriSource::OhdSynonym))
            .min_by_key(|m| (match_rank(m.match_kind), m.entry))
    }

    /// Entry whose label or synonym contains `text`, or is contained in it.
    /// The shortest label wins.
    pub fn find_containing(&self, text: &str) -> Option<usize> {
        let query = normalize_surface(text);
        if char_len(&query) < 3 {
            return None;
        }

        let mut hits: Vec<usize> = self
            .containment
            .find_overlapping_iter(&query)
            .map(|m| self.containment_patterns[m.pattern().as_usize()].1)
            .collect();
        hits.extend(
            self.containment_patterns
                .iter()
                .filter(|(pattern, _)| pattern.contains(&query))
                .map(|(_, idx)| *idx),
        );

        hits.into_iter()
            .min_by_key(|&idx| (char_len(&self.entries[idx].label), idx))
    }
}

/// Accumulates entries and auxiliary dictionaries, then freezes them into a [`LexiconIndex`].
#[derive(Debug, Default)]
pub struct LexiconBuilder {
    entries: Vec<LexiconEntry>,
    auxiliary: Vec<SurfaceMeta>,
    skipped: usize,
}

impl LexiconBuilder {
    pub fn add_entry(&mut self, entry: LexiconEntry) -> &mut Self {
        if entry.iri.trim().is_empty() || !LexiconEntry::is_indexable_label(&entry.label) {
            self.skipped += 1;
        } else {
            self.entries.push(entry);
        }
        self
    }

    /// Clinic abbreviation, indexed with a placeholder identifier until resolved.
    pub fn add_abbreviation(&mut self, abbreviation: &str, expansion: &str) -> &mut Self {
        self.auxiliary.push(SurfaceMeta {
            surface: abbreviation.to_lowercase(),
            iri: format!("ABBR:{abbreviation}"),
            label: expansion.to_string(),
            source: IriSource::Placeholder,
            match_kind: MatchKind::ExactLabel,
            entry: None,
        });
        self
    }

    pub fn add_brand(&mut self, brand: &str, alternates: &[String]) -> &mut Self {
        let iri = format!("BRAND:{brand}");
        let surfaces = std::iter::once((brand, MatchKind::ExactLabel))
            .chain(alternates.iter().map(|a| (a.as_str(), MatchKind::ExactSynonym)));
        for (surface, match_kind) in surfaces {
            self.auxiliary.push(SurfaceMeta {
                surface: surface.to_lowercase(),
                iri: iri.clone(),
                label: brand.to_string(),
                source: IriSource::Placeholder,
                match_kind,
                entry: None,
            });
        }
        self
    }

    /// Surface from the alias map. Resolved targets carry their identifier.
    pub fn add_alias(&mut self, surface: &str, target: &AliasTarget) -> &mut Self {
        let (iri, label, source) = match target {
            AliasTarget::Resolved { iri, label } => (iri.clone(), label.clone(), IriSource::ResolvedAlias),
            AliasTarget::Placeholder { token, label } => (token.clone(), label.clone(), IriSource::Placeholder),
        };
        self.auxiliary.push(SurfaceMeta {
            surface: surface.to_lowercase(),
            iri,
            label,
            source,
            match_kind: MatchKind::Alias,
            entry: None,
        });
        self
    }

    pub fn build(self) -> Result<LexiconIndex> {
        let mut by_iri = AHashMap::with_capacity(self.entries.len());
        for (idx, entry) in self.entries.iter().enumerate() {
            by_iri.entry(entry.iri.clone()).or_insert(idx);
        }

        let mut stats = LexiconStats {
            entries: self.entries.len(),
            skipped_entries: self.skipped,
            ..LexiconStats::default()
        };
        let mut surfaces: AHashMap<String, Vec<SurfaceMeta>> = AHashMap::new();
        let mut containment_patterns = Vec::new();

        for (idx, entry) in self.entries.iter().enumerate() {
            let label_meta = SurfaceMeta {
                surface: entry.label.to_lowercase(),
                iri: entry.iri.clone(),
                label: entry.label.clone(),
                source: IriSource::OhdLabel,
                match_kind: MatchKind::ExactLabel,
                entry: Some(idx),
            };
            if insert_meta(&mut surfaces, label_meta) {
                stats.label_surfaces += 1;
            }
            containment_patterns.push((normalize_surface(&entry.label), idx));

            for synonym in entry.synonyms.iter().filter(|s| !s.trim().is_empty()) {
                let meta = SurfaceMeta {
                    surface: synonym.to_lowercase(),
                    iri: entry.iri.clone(),
                    label: entry.label.clone(),
                    source: IriSource::OhdSynonym,
                    match_kind: MatchKind::ExactSynonym,
                    entry: Some(idx),
                };
                if insert_meta(&mut surfaces, meta) {
                    stats.synonym_surfaces += 1;
                }
                containment_patterns.push((normalize_surface(synonym), idx));
            }
        }

        for mut meta in self.auxiliary {
            meta.entry = by_iri.get(&meta.iri).copied();
            if insert_meta(&mut surfaces, meta) {
                stats.auxiliary_surfaces += 1;
            }
        }

        let mut keys: Vec<&String> = surfaces.keys().collect();
        keys.sort();
        let mut compact_keys: AHashMap<String, Vec<String>> = AHashMap::new();
        for key in keys {
            compact_keys.entry(compact(key)).or_default().push(key.clone());
        }
        let mut fuzzy_buckets: AHashMap<usize, Vec<String>> = AHashMap::new();
        for key in compact_keys.keys() {
            fuzzy_buckets.entry(char_len(key)).or_default().push(key.clone());
        }
        for bucket in fuzzy_buckets.values_mut() {
            bucket.sort();
        }

        containment_patterns.retain(|(p, _)| char_len(p) >= 3);
        containment_patterns.sort();
        containment_patterns.dedup();
        let containment = AhoCorasick::builder()
            .match_kind(AcMatchKind::Standard)
            .build(containment_patterns.iter().map(|(p, _)| p.as_str()))
            .map_err(|e| LexiconError::Automaton(e.to_string()))?;

        stats.total_surfaces = surfaces.len();
        info!(
            "Lexicon index built: {} entries, {} labels, {} synonyms, {} auxiliary surfaces ({} skipped)",
            stats.entries, stats.label_surfaces, stats.synonym_surfaces, stats.auxiliary_surfaces, stats.skipped_entries
        );

        Ok(LexiconIndex {
            entries: self.entries,
            by_iri,
            surfaces,
            compact_keys,
            fuzzy_buckets,
            containment,
            containment_patterns,
            stats,
        })
    }
}

/// Insert under the normalized key. Returns false when an equal-or-stronger
/// mapping to the same identifier already exists.
fn insert_meta(surfaces: &mut AHashMap<String, Vec<SurfaceMeta>>, meta: SurfaceMeta) -> bool {
    let key = normalize_surface(&meta.surface);
    if key.is_empty() {
        return false;
    }
    let metas = surfaces.entry(key).or_default();
    if let Some(existing) = metas.iter_mut().find(|m| m.iri == meta.iri) {
        if match_rank(meta.match_kind) < match_rank(existing.match_kind) {
            *existing = meta;
        }
        return false;
    }
    metas.push(meta);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use odontolink_config::GazetteerConfig;

    fn sample() -> LexiconIndex {
        let mut b = LexiconIndex::builder();
        b.add_entry(
            LexiconEntry::new("OHD:implant", "dental implant")
                .with_synonyms(["שתל", "implant"])
                .with_kind(ConceptKind::Implant),
        )
        .add_entry(
            LexiconEntry::new("OHD:mua", "multi-unit abutment")
                .with_synonyms(["מולטי יוניט"])
                .with_kind(ConceptKind::Device),
        )
        .add_entry(LexiconEntry::new("OHD:abutment", "abutment").with_kind(ConceptKind::Device))
        .add_entry(LexiconEntry::new("OHD:num", "12"))
        .add_abbreviation("MUA", "multi-unit abutment")
        .add_brand("Nobel", &["נובל".to_string()]);
        b.build().unwrap()
    }

    #[test]
    fn test_short_and_numeric_labels_skipped() {
        let idx = sample();
        assert_eq!(idx.len(), 3);
        assert_eq!(idx.stats().skipped_entries, 1);
    }

    #[test]
    fn test_lookup_by_normalized_and_compact() {
        let idx = sample();
        let metas = idx.lookup("שתל");
        assert_eq!(metas.len(), 1);
        assert_eq!(metas[0].source, IriSource::OhdSynonym);

        let compact_hits = idx.lookup_compact("מולטייוניט");
        assert_eq!(compact_hits.len(), 1);
        assert_eq!(compact_hits[0].iri, "OHD:mua");
    }

    #[test]
    fn test_auxiliary_surfaces_are_placeholders() {
        let idx = sample();
        let metas = idx.lookup("mua");
        assert_eq!(metas[0].iri, "ABBR:MUA");
        assert_eq!(metas[0].source, IriSource::Placeholder);
        assert_eq!(idx.lookup("נובל")[0].match_kind, MatchKind::ExactSynonym);
    }

    #[test]
    fn test_fuzzy_lookup_finds_transposition() {
        let idx = sample();
        let matcher = FuzzyMatcher::new(&GazetteerConfig::default());
        let (metas, a) = idx.fuzzy_lookup(&matcher, "שלת").unwrap();
        assert_eq!(metas[0].iri, "OHD:implant");
        assert_eq!(metas[0].surface, "שתל");
        assert_eq!(a.edit_distance, 1);
    }

    #[test]
    fn test_find_exact_and_containing() {
        let idx = sample();
        assert_eq!(idx.find_exact("Multi-Unit Abutment").unwrap().iri, "OHD:mua");
        assert!(idx.find_exact("mua").is_none(), "placeholders are not exact hits");
        // "abutment" is contained in the query and is the shortest label
        let hit = idx.find_containing("angled abutment").unwrap();
        assert_eq!(idx.entry(hit).unwrap().iri, "OHD:abutment");
    }
}
