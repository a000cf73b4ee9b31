//! Guarded rescue: bounded oracle calls, strict reply validation and a
//! success cache keyed by normalized surface. Concurrent misses on the same
//! surface are serialized, so only the first one reaches the oracle.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use lru::LruCache;
use odontolink_config::RescueConfig;
use odontolink_lexicon::normalize::normalize_surface;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::audit::RescueAuditEntry;
use crate::oracle::CanonicalOracle;
use crate::retry::{AttemptFailure, RetryOutcome, RetryPolicy};

pub const MAX_TERMS: usize = 3;

fn term_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z \-]{0,40}$").unwrap())
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RescueReply {
    canonical_terms: Vec<String>,
}

/// Parse and validate an oracle reply.
///
/// The reply must be a JSON object holding only `canonical_terms`, a list of
/// 1 to 3 strings each matching `^[A-Za-z][A-Za-z \-]{0,40}$` after trimming.
/// A surrounding markdown code fence is tolerated. Any violation rejects the
/// whole reply.
pub fn validate_reply(raw: &str) -> Result<Vec<String>, String> {
    let body = strip_code_fence(raw.trim());
    let reply: RescueReply =
        serde_json::from_str(body).map_err(|e| format!("not a canonical_terms object: {e}"))?;
    let n = reply.canonical_terms.len();
    if n == 0 || n > MAX_TERMS {
        return Err(format!("expected 1 to {MAX_TERMS} terms, got {n}"));
    }
    let mut terms = Vec::with_capacity(n);
    for term in reply.canonical_terms {
        let term = term.split_whitespace().collect::<Vec<_>>().join(" ");
        if !term_pattern().is_match(&term) {
            return Err(format!("term '{term}' has disallowed characters or length"));
        }
        if !terms.contains(&term) {
            terms.push(term);
        }
    }
    Ok(terms)
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

// ── Outcome ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum RescueOutcome {
    Rescued {
        terms: Vec<String>,
        attempts: u32,
        latency: Duration,
        cached: bool,
    },
    /// Replies arrived but none passed validation.
    Rejected { reason: String, attempts: u32 },
    /// Transport failures used up the retry budget.
    Exhausted { error: String, attempts: u32 },
    Disabled,
}

impl RescueOutcome {
    pub fn terms(&self) -> Option<&[String]> {
        match self {
            RescueOutcome::Rescued { terms, .. } => Some(terms),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RescueOutcome::Rescued { cached: true, .. } => "cached",
            RescueOutcome::Rescued { .. } => "rescued",
            RescueOutcome::Rejected { .. } => "rejected",
            RescueOutcome::Exhausted { .. } => "exhausted",
            RescueOutcome::Disabled => "disabled",
        }
    }

    /// Failure reason, if the rescue did not produce terms.
    pub fn failure_reason(&self) -> Option<String> {
        match self {
            RescueOutcome::Rejected { reason, .. } => Some(reason.clone()),
            RescueOutcome::Exhausted { error, .. } => Some(error.clone()),
            RescueOutcome::Disabled => Some("rescue disabled".to_string()),
            RescueOutcome::Rescued { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RescueReport {
    pub outcome: RescueOutcome,
    /// Absent for cache hits and when disabled.
    pub audit: Option<RescueAuditEntry>,
}

// ── Guard ──────────────────────────────────────────────────────────────────

pub struct RescueGuard {
    oracle: Arc<dyn CanonicalOracle>,
    policy: RetryPolicy,
    cache: Mutex<LruCache<String, Vec<String>>>,
    inflight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    enabled: bool,
}

impl RescueGuard {
    pub fn new(oracle: Arc<dyn CanonicalOracle>, config: &RescueConfig) -> Self {
        let capacity = NonZeroUsize::new(config.cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            oracle,
            policy: RetryPolicy::from_config(config),
            cache: Mutex::new(LruCache::new(capacity)),
            inflight: Mutex::new(HashMap::new()),
            enabled: config.enabled,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Ask the oracle for canonical terms for `surface`.
    ///
    /// Never fails: every failure mode is a typed outcome.
    pub async fn rescue(&self, surface: &str, context: &str) -> RescueReport {
        if !self.enabled {
            return RescueReport { outcome: RescueOutcome::Disabled, audit: None };
        }

        let key = normalize_surface(surface);
        if let Some(report) = self.cached_report(&key, surface) {
            return report;
        }

        let slot = self.key_lock(&key);
        let report = {
            let _held = slot.lock().await;
            match self.cached_report(&key, surface) {
                Some(report) => report,
                None => self.call_oracle(key.clone(), surface, context).await,
            }
        };
        self.release_key(&key, slot);
        report
    }

    /// Number of surfaces with a rescue currently in flight.
    pub fn inflight_len(&self) -> usize {
        self.inflight.lock().map(|m| m.len()).unwrap_or(0)
    }

    fn cached_report(&self, key: &str, surface: &str) -> Option<RescueReport> {
        let terms = self.cache.lock().ok().and_then(|mut c| c.get(key).cloned())?;
        debug!("Rescue cache hit for '{}'", surface);
        let outcome = RescueOutcome::Rescued {
            terms,
            attempts: 0,
            latency: Duration::ZERO,
            cached: true,
        };
        metrics::counter!("odontolink_rescue_outcomes_total", "outcome" => outcome.label()).increment(1);
        Some(RescueReport { outcome, audit: None })
    }

    fn key_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        match self.inflight.lock() {
            Ok(mut map) => map.entry(key.to_string()).or_default().clone(),
            Err(_) => Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Drop the per-key lock once no other caller is waiting on it.
    fn release_key(&self, key: &str, slot: Arc<tokio::sync::Mutex<()>>) {
        if let Ok(mut map) = self.inflight.lock() {
            // One reference in the map plus ours means nobody else is queued.
            if Arc::strong_count(&slot) <= 2 {
                map.remove(key);
            }
        }
    }

    async fn call_oracle(&self, key: String, surface: &str, context: &str) -> RescueReport {
        let last_raw: Mutex<Option<String>> = Mutex::new(None);
        let result = self
            .policy
            .run(|_| {
                let oracle = self.oracle.clone();
                let last_raw = &last_raw;
                async move {
                    let reply = oracle
                        .canonicalize(surface, context)
                        .await
                        .map_err(AttemptFailure::Transport)?;
                    if let Ok(mut slot) = last_raw.lock() {
                        *slot = Some(reply.raw.clone());
                    }
                    validate_reply(&reply.raw).map_err(AttemptFailure::Invalid)
                }
            })
            .await;

        let attempts = result.attempts();
        let latency = result.latency();
        metrics::histogram!("odontolink_rescue_latency_seconds").record(latency.as_secs_f64());

        let outcome = match result {
            RetryOutcome::Succeeded { value, .. } => {
                if let Ok(mut cache) = self.cache.lock() {
                    cache.put(key, value.clone());
                }
                info!("Rescued '{}' as {:?} after {} attempt(s)", surface, value, attempts);
                RescueOutcome::Rescued { terms: value, attempts, latency, cached: false }
            }
            RetryOutcome::Failed { last: AttemptFailure::Invalid(reason), .. } => {
                warn!("Rescue reply for '{}' rejected: {}", surface, reason);
                RescueOutcome::Rejected { reason, attempts }
            }
            RetryOutcome::Failed { last: AttemptFailure::Transport(e), .. } => {
                warn!("Rescue for '{}' failed after {} attempt(s): {}", surface, attempts, e);
                RescueOutcome::Exhausted { error: e.to_string(), attempts }
            }
        };
        metrics::counter!("odontolink_rescue_outcomes_total", "outcome" => outcome.label()).increment(1);

        let raw = last_raw.lock().ok().and_then(|mut s| s.take());
        let audit = RescueAuditEntry::new(
            surface,
            self.oracle.model_id(),
            self.oracle.backend_name(),
            attempts,
            outcome.label(),
            raw.as_deref(),
            latency.as_millis() as u64,
        );
        debug!(
            audit_id = %audit.id,
            output_hash = %audit.output_hash,
            "Rescue audit for '{}': {}",
            surface,
            audit.outcome
        );
        RescueReport { outcome, audit: Some(audit) }
    }
}
