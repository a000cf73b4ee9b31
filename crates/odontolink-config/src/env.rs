//! Environment overrides, applied once after the file is loaded.

use std::str::FromStr;

use tracing::debug;

use crate::{ConfigError, LinkerConfig, Result};

/// An environment variable the linker honours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Override {
    KeepAllMetas,
    WeightLex,
    WeightVec,
    WeightPrior,
    WeightCtx,
    FuzzyMaxEd,
    NgramMax,
    TopkVec,
    TopkFinal,
    PlaceholderPenalty,
    RescueEnabled,
    RescueMaxRetries,
    EmbedCacheCapacity,
    RescueCacheCapacity,
}

impl Override {
    pub const ALL: [Override; 14] = [
        Override::KeepAllMetas,
        Override::WeightLex,
        Override::WeightVec,
        Override::WeightPrior,
        Override::WeightCtx,
        Override::FuzzyMaxEd,
        Override::NgramMax,
        Override::TopkVec,
        Override::TopkFinal,
        Override::PlaceholderPenalty,
        Override::RescueEnabled,
        Override::RescueMaxRetries,
        Override::EmbedCacheCapacity,
        Override::RescueCacheCapacity,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Override::KeepAllMetas => "KEEP_ALL_METAS",
            Override::WeightLex => "W_LEX",
            Override::WeightVec => "W_VEC",
            Override::WeightPrior => "W_PRIOR",
            Override::WeightCtx => "W_CTX",
            Override::FuzzyMaxEd => "LEX_FUZZY_MAX_ED",
            Override::NgramMax => "NGRAM_MAX",
            Override::TopkVec => "TOPK_VEC",
            Override::TopkFinal => "TOPK_FINAL",
            Override::PlaceholderPenalty => "PLACEHOLDER_PENALTY",
            Override::RescueEnabled => "RESCUE_ENABLED",
            Override::RescueMaxRetries => "RESCUE_MAX_RETRIES",
            Override::EmbedCacheCapacity => "EMBED_CACHE_CAPACITY",
            Override::RescueCacheCapacity => "RESCUE_CACHE_CAPACITY",
        }
    }

    fn apply(self, config: &mut LinkerConfig, value: &str) -> Result<()> {
        let name = self.name();
        match self {
            Override::KeepAllMetas => config.gazetteer.keep_all_metas = parse_flag(name, value)?,
            Override::WeightLex => config.weights.lex = parse(name, value)?,
            Override::WeightVec => config.weights.vec = parse(name, value)?,
            Override::WeightPrior => config.weights.prior = parse(name, value)?,
            Override::WeightCtx => config.weights.ctx = parse(name, value)?,
            Override::FuzzyMaxEd => config.gazetteer.fuzzy_max_edit_distance = parse(name, value)?,
            Override::NgramMax => config.gazetteer.ngram_max = parse(name, value)?,
            Override::TopkVec => config.vector.topk = parse(name, value)?,
            Override::TopkFinal => config.scoring.topk_final = parse(name, value)?,
            Override::PlaceholderPenalty => config.scoring.placeholder_penalty = parse(name, value)?,
            Override::RescueEnabled => config.rescue.enabled = parse_flag(name, value)?,
            Override::RescueMaxRetries => config.rescue.max_retries = parse(name, value)?,
            Override::EmbedCacheCapacity => config.vector.cache_capacity = parse(name, value)?,
            Override::RescueCacheCapacity => config.rescue.cache_capacity = parse(name, value)?,
        }
        Ok(())
    }
}

fn parse<T: FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| ConfigError::InvalidOverride {
        name: name.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidOverride {
            name: name.to_string(),
            value: value.to_string(),
            reason: "expected a boolean flag".to_string(),
        }),
    }
}

/// Apply overrides from `lookup`, which maps a variable name to its value.
///
/// Taking a lookup function keeps tests free of process-global state.
pub fn apply_overrides<F>(config: &mut LinkerConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    for key in Override::ALL {
        let Some(value) = lookup(key.name()) else { continue };
        debug!("Config override {}={}", key.name(), value);
        key.apply(config, &value)?;
    }
    Ok(())
}
