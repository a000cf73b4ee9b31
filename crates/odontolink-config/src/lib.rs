//! Configuration loading for OdontoLink.
//! Reads odontolink.toml from the current directory or the path in ODONTOLINK_CONFIG,
//! then applies the recognized environment overrides once.

mod env;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

pub use env::{apply_overrides, Override};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Environment override {name}={value} is not valid: {reason}")]
    InvalidOverride {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for odontolink_common::LinkError {
    fn from(err: ConfigError) -> Self {
        odontolink_common::LinkError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Every option the linker recognizes. Built once per run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkerConfig {
    #[serde(default)]
    pub artifacts: ArtifactPaths,
    #[serde(default)]
    pub gazetteer: GazetteerConfig,
    #[serde(default)]
    pub weights: WeightsConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub rescue: RescueConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

// ── Artifacts ──────────────────────────────────────────────────────────────

/// Locations of the pre-built, read-only artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactPaths {
    #[serde(default = "default_lexicon_path")]
    pub lexicon: PathBuf,
    #[serde(default)]
    pub alias_map: Option<PathBuf>,
    #[serde(default)]
    pub abbreviations: Option<PathBuf>,
    #[serde(default)]
    pub brands: Option<PathBuf>,
    #[serde(default)]
    pub translations: Option<PathBuf>,
    #[serde(default = "default_vector_meta")]
    pub vector_meta: PathBuf,
    #[serde(default = "default_vector_data")]
    pub vector_data: PathBuf,
}

fn default_lexicon_path() -> PathBuf { PathBuf::from("artifacts/lexicon/ohd_lexicon.jsonl") }
fn default_vector_meta()  -> PathBuf { PathBuf::from("artifacts/vector/ohd_index.meta.json") }
fn default_vector_data()  -> PathBuf { PathBuf::from("artifacts/vector/ohd_index.f32") }

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            lexicon: default_lexicon_path(),
            alias_map: None,
            abbreviations: None,
            brands: None,
            translations: None,
            vector_meta: default_vector_meta(),
            vector_data: default_vector_data(),
        }
    }
}

// ── Gazetteer ──────────────────────────────────────────────────────────────

/// Closed similarity interval `[low, high]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub low: f64,
    pub high: f64,
}

impl Band {
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GazetteerConfig {
    /// Keep every identifier sharing a surface instead of collapsing to the best one.
    #[serde(default)]
    pub keep_all_metas: bool,
    #[serde(default = "default_ngram_max")]
    pub ngram_max: usize,
    #[serde(default = "default_label_score")]
    pub label_score: f64,
    #[serde(default = "default_synonym_score")]
    pub synonym_score: f64,
    #[serde(default = "default_fuzzy_max_ed")]
    pub fuzzy_max_edit_distance: usize,
    #[serde(default = "default_fuzzy_min_len")]
    pub fuzzy_min_len: usize,
    #[serde(default = "default_fuzzy_band")]
    pub fuzzy_band: Band,
    /// Band used when the edit distance is exactly 1 and the surface is short.
    #[serde(default = "default_short_fuzzy_band")]
    pub short_fuzzy_band: Band,
    #[serde(default = "default_short_max_len")]
    pub short_max_len: usize,
    /// Output range of the fuzzy score.
    #[serde(default = "default_fuzzy_score_range")]
    pub fuzzy_score_range: Band,
}

fn default_ngram_max()          -> usize { 5 }
fn default_label_score()        -> f64   { 1.0 }
fn default_synonym_score()      -> f64   { 0.9 }
fn default_fuzzy_max_ed()       -> usize { 1 }
fn default_fuzzy_min_len()      -> usize { 3 }
fn default_fuzzy_band()         -> Band  { Band::new(0.80, 1.0) }
fn default_short_fuzzy_band()   -> Band  { Band::new(0.65, 0.88) }
fn default_short_max_len()      -> usize { 4 }
fn default_fuzzy_score_range()  -> Band  { Band::new(0.70, 0.85) }

impl Default for GazetteerConfig {
    fn default() -> Self {
        Self {
            keep_all_metas: false,
            ngram_max: default_ngram_max(),
            label_score: default_label_score(),
            synonym_score: default_synonym_score(),
            fuzzy_max_edit_distance: default_fuzzy_max_ed(),
            fuzzy_min_len: default_fuzzy_min_len(),
            fuzzy_band: default_fuzzy_band(),
            short_fuzzy_band: default_short_fuzzy_band(),
            short_max_len: default_short_max_len(),
            fuzzy_score_range: default_fuzzy_score_range(),
        }
    }
}

// ── Scoring ────────────────────────────────────────────────────────────────

/// Raw hybrid weights. Renormalized over the active components at scoring time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightsConfig {
    #[serde(default = "default_w_lex")]
    pub lex: f64,
    #[serde(default = "default_w_vec")]
    pub vec: f64,
    #[serde(default = "default_w_prior")]
    pub prior: f64,
    #[serde(default = "default_w_ctx")]
    pub ctx: f64,
}

fn default_w_lex()   -> f64 { 0.6 }
fn default_w_vec()   -> f64 { 0.3 }
fn default_w_prior() -> f64 { 0.06 }
fn default_w_ctx()   -> f64 { 0.04 }

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            lex: default_w_lex(),
            vec: default_w_vec(),
            prior: default_w_prior(),
            ctx: default_w_ctx(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Subtracted from `score_final` of every alias-only candidate.
    #[serde(default = "default_placeholder_penalty")]
    pub placeholder_penalty: f64,
    #[serde(default = "default_confident_lex")]
    pub confident_lex_threshold: f64,
    #[serde(default = "default_topk_final")]
    pub topk_final: usize,
    /// Vector-only candidates below this are dropped when a lexical hit overlaps.
    #[serde(default = "default_vector_noise_floor")]
    pub vector_noise_floor: f64,
    /// Context score given when a neighbouring hint agrees with the candidate.
    #[serde(default = "default_context_boost")]
    pub context_boost: f64,
}

fn default_placeholder_penalty() -> f64   { 0.05 }
fn default_confident_lex()       -> f64   { 0.9 }
fn default_topk_final()          -> usize { 5 }
fn default_vector_noise_floor()  -> f64   { 0.15 }
fn default_context_boost()       -> f64   { 1.0 }

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            placeholder_penalty: default_placeholder_penalty(),
            confident_lex_threshold: default_confident_lex(),
            topk_final: default_topk_final(),
            vector_noise_floor: default_vector_noise_floor(),
            context_boost: default_context_boost(),
        }
    }
}

// ── Vector retrieval ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// `hashing` (offline, deterministic) or `bert` (Candle, needs the `bert` feature).
    #[serde(default = "default_encoder")]
    pub encoder: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default = "default_hashing_dim")]
    pub hashing_dim: usize,
    #[serde(default = "default_topk_vec")]
    pub topk: usize,
    #[serde(default = "default_neighbor_window")]
    pub neighbor_window: usize,
    #[serde(default = "default_min_vec_score")]
    pub min_score: f64,
    #[serde(default = "default_alias_accept")]
    pub alias_accept_threshold: f64,
    #[serde(default = "default_alias_topk")]
    pub alias_topk: usize,
    #[serde(default = "default_embed_cache")]
    pub cache_capacity: usize,
    /// Abort startup when the index is missing or empty.
    #[serde(default = "default_true")]
    pub require_index: bool,
}

fn default_true()            -> bool   { true }
fn default_encoder()         -> String { "hashing".to_string() }
fn default_model_id()        -> String { "odontolink/char-ngram-hash".to_string() }
fn default_hashing_dim()     -> usize  { 256 }
fn default_topk_vec()        -> usize  { 10 }
fn default_neighbor_window() -> usize  { 2 }
fn default_min_vec_score()   -> f64    { 0.30 }
fn default_alias_accept()    -> f64    { 0.6 }
fn default_alias_topk()      -> usize  { 3 }
fn default_embed_cache()     -> usize  { 4096 }

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            encoder: default_encoder(),
            model_id: default_model_id(),
            hashing_dim: default_hashing_dim(),
            topk: default_topk_vec(),
            neighbor_window: default_neighbor_window(),
            min_score: default_min_vec_score(),
            alias_accept_threshold: default_alias_accept(),
            alias_topk: default_alias_topk(),
            cache_capacity: default_embed_cache(),
            require_index: true,
        }
    }
}

// ── LLM rescue ─────────────────────────────────────────────────────────────

/// Upper bound on network retries per rescue call.
pub const MAX_RESCUE_RETRIES: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescueConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// `static`, `ollama` or `openai_compatible`.
    #[serde(default = "default_rescue_backend")]
    pub backend: String,
    #[serde(default = "default_rescue_base_url")]
    pub base_url: String,
    #[serde(default = "default_rescue_model")]
    pub model: String,
    /// Name of the env var holding the API key, for `openai_compatible`.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Retries after the first oracle call, at most [`MAX_RESCUE_RETRIES`].
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_rescue_timeout_ms")]
    pub timeout_ms: u64,
    /// First wait after a transport failure; doubles per retry up to 8 s.
    #[serde(default = "default_rescue_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_rescue_cache")]
    pub cache_capacity: usize,
}

fn default_rescue_backend()    -> String { "static".to_string() }
fn default_rescue_base_url()   -> String { "http://localhost:11434".to_string() }
fn default_rescue_model()      -> String { "llama3:8b".to_string() }
fn default_max_retries()       -> u32    { 2 }
fn default_rescue_timeout_ms() -> u64    { 8_000 }
fn default_rescue_backoff_ms() -> u64    { 1_000 }
fn default_rescue_cache()      -> usize  { 1024 }

impl Default for RescueConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: default_rescue_backend(),
            base_url: default_rescue_base_url(),
            model: default_rescue_model(),
            api_key_env: None,
            max_retries: default_max_retries(),
            timeout_ms: default_rescue_timeout_ms(),
            backoff_ms: default_rescue_backoff_ms(),
            cache_capacity: default_rescue_cache(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Lines resolved concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Maximum token gap between a device mention and its dimension mention.
    #[serde(default = "default_bundle_gap")]
    pub bundle_max_gap: usize,
}

fn default_concurrency() -> usize { 8 }
fn default_bundle_gap()  -> usize { 2 }

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            bundle_max_gap: default_bundle_gap(),
        }
    }
}

// ── Loading ────────────────────────────────────────────────────────────────

impl LinkerConfig {
    /// Load from `path`, else `ODONTOLINK_CONFIG`, else `odontolink.toml`.
    ///
    /// A missing file yields the defaults. Environment overrides are applied
    /// exactly once, then the result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(|| {
            PathBuf::from(
                std::env::var("ODONTOLINK_CONFIG").unwrap_or_else(|_| "odontolink.toml".to_string()),
            )
        });

        let mut config = if path.exists() {
            info!("Loading configuration from {}", path.display());
            Self::from_toml_file(&path)?
        } else {
            info!("No config file at {}, using defaults", path.display());
            Self::default()
        };

        apply_overrides(&mut config, |name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<()> {
        let w = &self.weights;
        for (name, value) in [("lex", w.lex), ("vec", w.vec), ("prior", w.prior), ("ctx", w.ctx)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!("weight {name} must be finite and >= 0, got {value}")));
            }
        }
        if w.lex + w.vec + w.prior + w.ctx <= 0.0 {
            return Err(ConfigError::Invalid("at least one hybrid weight must be positive".into()));
        }

        let g = &self.gazetteer;
        for (name, band) in [
            ("fuzzy_band", g.fuzzy_band),
            ("short_fuzzy_band", g.short_fuzzy_band),
            ("fuzzy_score_range", g.fuzzy_score_range),
        ] {
            if band.low > band.high || band.low < 0.0 || band.high > 1.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must satisfy 0 <= low <= high <= 1, got [{}, {}]",
                    band.low, band.high
                )));
            }
        }
        if g.ngram_max == 0 {
            return Err(ConfigError::Invalid("gazetteer.ngram_max must be >= 1".into()));
        }

        if self.scoring.topk_final == 0 {
            return Err(ConfigError::Invalid("scoring.topk_final must be >= 1".into()));
        }
        if self.scoring.placeholder_penalty < 0.0 {
            return Err(ConfigError::Invalid("scoring.placeholder_penalty must be >= 0".into()));
        }
        if self.vector.cache_capacity == 0 || self.rescue.cache_capacity == 0 {
            return Err(ConfigError::Invalid("cache capacities must be >= 1".into()));
        }
        if self.vector.topk == 0 || self.vector.hashing_dim == 0 {
            return Err(ConfigError::Invalid("vector.topk and vector.hashing_dim must be >= 1".into()));
        }
        if self.rescue.max_retries > MAX_RESCUE_RETRIES {
            return Err(ConfigError::Invalid(format!(
                "rescue.max_retries must be <= {MAX_RESCUE_RETRIES}, got {}",
                self.rescue.max_retries
            )));
        }
        if self.pipeline.concurrency == 0 {
            return Err(ConfigError::Invalid("pipeline.concurrency must be >= 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
