//! Device + dimension bundles.
//!
//! A device-like mention and the dimension mention right next to it (no
//! other mention in between, at most `bundle_max_gap` tokens apart) form one
//! bundle. The following mention is preferred over the preceding one, and
//! each mention joins at most one bundle. Measurement tokens between the two
//! mentions, plus the run of measurement tokens right after them, are copied
//! into the bundle as raw text.

use odontolink_common::{Bundle, ConceptKind, Mention, Token};
use odontolink_config::PipelineConfig;

#[derive(Debug, Clone)]
pub struct BundleAggregator {
    max_gap: usize,
}

impl BundleAggregator {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            max_gap: config.bundle_max_gap,
        }
    }

    pub fn aggregate(&self, mentions: &[Mention], tokens: &[Token]) -> Vec<Bundle> {
        let mut order: Vec<&Mention> = mentions
            .iter()
            .filter(|m| !m.covered_token_idxs.is_empty() && m.top().is_some())
            .collect();
        order.sort_by_key(|m| first_idx(m));

        let mut used = vec![false; order.len()];
        let mut bundles = Vec::new();
        for i in 0..order.len() {
            if used[i] || !is_device(order[i]) {
                continue;
            }
            let next = (i + 1 < order.len()).then_some(i + 1);
            let prev = i.checked_sub(1);
            let partner = [next, prev]
                .into_iter()
                .flatten()
                .find(|&j| !used[j] && is_dimension(order[j]) && self.within_gap(order[i], order[j]));
            if let Some(j) = partner {
                used[i] = true;
                used[j] = true;
                bundles.push(build_bundle(order[i], order[j], tokens));
            }
        }
        bundles
    }

    fn within_gap(&self, a: &Mention, b: &Mention) -> bool {
        let (left, right) = if first_idx(a) <= first_idx(b) { (a, b) } else { (b, a) };
        let gap = first_idx(right).saturating_sub(last_idx(left) + 1);
        gap <= self.max_gap
    }
}

fn first_idx(m: &Mention) -> usize {
    m.covered_token_idxs.iter().min().copied().unwrap_or(0)
}

fn last_idx(m: &Mention) -> usize {
    m.covered_token_idxs.iter().max().copied().unwrap_or(0)
}

fn is_device(m: &Mention) -> bool {
    m.concept_kind().map(ConceptKind::is_device_like).unwrap_or(false)
}

fn is_dimension(m: &Mention) -> bool {
    m.concept_kind() == Some(ConceptKind::Dimension)
}

fn build_bundle(device: &Mention, dimension: &Mention, tokens: &[Token]) -> Bundle {
    let span = device.span.cover(&dimension.span);
    let lo = first_idx(device).min(first_idx(dimension));
    let hi = last_idx(device).max(last_idx(dimension));

    let mut measurements: Vec<String> = tokens
        .iter()
        .filter(|t| t.idx > lo && t.idx < hi && t.kind.is_measurement())
        .map(|t| t.text.clone())
        .collect();
    measurements.extend(
        tokens
            .iter()
            .skip_while(|t| t.idx <= hi)
            .take_while(|t| t.kind.is_measurement())
            .map(|t| t.text.clone()),
    );

    Bundle {
        bundle_id: format!("b_{}_{}", span.start, span.end),
        device_mention: device.mention_id.clone(),
        dimension_mention: dimension.mention_id.clone(),
        device_iri: device.top_iri().unwrap_or_default().to_string(),
        dimension_iri: dimension.top_iri().unwrap_or_default().to_string(),
        span,
        measurements,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odontolink_common::{Candidate, IriSource, LineRecord, TokenKind};
    use pretty_assertions::assert_eq;

    fn record() -> LineRecord {
        LineRecord::from_tagged(
            "1",
            &[
                ("שתל", TokenKind::Word),
                ("4.2", TokenKind::Number),
                ("אורך", TokenKind::Word),
                ("10", TokenKind::Number),
                ("מ״מ", TokenKind::Unit),
                ("כתר", TokenKind::Word),
            ],
        )
    }

    fn mention(record: &LineRecord, idx: usize, iri: &str, kind: ConceptKind) -> Mention {
        let t = &record.tokens[idx];
        let mut m = Mention::new(t.text.clone(), t.span, vec![idx]);
        m.candidates
            .push(Candidate::new(iri, iri, IriSource::OhdLabel).with_kind(Some(kind)));
        m
    }

    fn aggregator(max_gap: usize) -> BundleAggregator {
        BundleAggregator::new(&PipelineConfig {
            bundle_max_gap: max_gap,
            ..PipelineConfig::default()
        })
    }

    #[test]
    fn test_device_and_dimension_bundle_with_measurements() {
        let r = record();
        let mentions = vec![
            mention(&r, 0, "OHD:implant", ConceptKind::Implant),
            mention(&r, 2, "OHD:length", ConceptKind::Dimension),
            mention(&r, 5, "OHD:crown", ConceptKind::Device),
        ];
        let bundles = aggregator(2).aggregate(&mentions, &r.tokens);
        assert_eq!(bundles.len(), 1);
        let b = &bundles[0];
        assert_eq!(b.device_iri, "OHD:implant");
        assert_eq!(b.dimension_iri, "OHD:length");
        assert_eq!(b.device_mention, mentions[0].mention_id);
        assert_eq!(b.measurements, vec!["4.2", "10", "מ״מ"]);
        assert_eq!(b.span, mentions[0].span.cover(&mentions[1].span));
    }

    #[test]
    fn test_gap_limit_and_preceding_partner() {
        let r = record();
        let mentions = vec![
            mention(&r, 2, "OHD:length", ConceptKind::Dimension),
            mention(&r, 5, "OHD:crown", ConceptKind::Device),
        ];
        assert!(aggregator(1).aggregate(&mentions, &r.tokens).is_empty());
        let bundles = aggregator(2).aggregate(&mentions, &r.tokens);
        assert_eq!(bundles.len(), 1);
        assert_eq!(bundles[0].device_iri, "OHD:crown");
        assert_eq!(bundles[0].measurements, vec!["10", "מ״מ"]);
    }

    #[test]
    fn test_two_devices_never_bundle() {
        let r = record();
        let mentions = vec![
            mention(&r, 0, "OHD:implant", ConceptKind::Implant),
            mention(&r, 5, "OHD:crown", ConceptKind::Device),
        ];
        assert!(aggregator(10).aggregate(&mentions, &r.tokens).is_empty());
    }
}
