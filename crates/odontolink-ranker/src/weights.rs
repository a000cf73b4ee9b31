//! Hybrid weight vector and renormalized fusion.

use odontolink_common::Scores;
use odontolink_config::WeightsConfig;
use serde::{Deserialize, Serialize};

/// The 4-component weight vector W = (lex, vec, prior, ctx).
///
/// Only the components present on a candidate take part in fusion; their
/// weights are renormalized to sum to 1.0 first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HybridWeights {
    pub lex: f64,
    pub vec: f64,
    pub prior: f64,
    pub ctx: f64,
}

impl Default for HybridWeights {
    fn default() -> Self {
        WeightsConfig::default().into()
    }
}

impl From<WeightsConfig> for HybridWeights {
    fn from(c: WeightsConfig) -> Self {
        Self { lex: c.lex, vec: c.vec, prior: c.prior, ctx: c.ctx }
    }
}

impl HybridWeights {
    pub fn sum(&self) -> f64 {
        self.as_array().iter().sum()
    }

    /// Validate that all weights sum to ~1.0
    pub fn validate(&self) -> bool {
        (self.sum() - 1.0).abs() < 1e-6
    }

    /// Renormalise weights so they sum to 1.0
    pub fn normalise(&mut self) {
        let sum = self.sum();
        if sum > 0.0 {
            self.lex   /= sum;
            self.vec   /= sum;
            self.prior /= sum;
            self.ctx   /= sum;
        }
    }

    pub fn as_array(&self) -> [f64; 4] {
        [self.lex, self.vec, self.prior, self.ctx]
    }

    /// Weights of the components present in `scores`, renormalized; `None`
    /// where a component is absent. When every present weight is zero the
    /// present components share the weight equally.
    pub fn active(&self, scores: &Scores) -> [Option<f64>; 4] {
        let values = [scores.lex, scores.vec, scores.prior, scores.ctx];
        let w = self.as_array();
        let present = values.iter().filter(|v| v.is_some()).count();
        let z: f64 = (0..4).filter(|&i| values[i].is_some()).map(|i| w[i]).sum();
        let mut out = [None; 4];
        for i in 0..4 {
            if values[i].is_some() {
                out[i] = Some(if z > 0.0 { w[i] / z } else { 1.0 / present as f64 });
            }
        }
        out
    }

    /// Weighted sum over present components with renormalized weights.
    ///
    /// A single present component is therefore returned unchanged, whatever
    /// its weight.
    pub fn fuse(&self, scores: &Scores) -> f64 {
        let values = [scores.lex, scores.vec, scores.prior, scores.ctx];
        self.active(scores)
            .iter()
            .zip(values)
            .filter_map(|(w, v)| Some((*w)? * v?))
            .sum()
    }
}
