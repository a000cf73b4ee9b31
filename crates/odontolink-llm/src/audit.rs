//! Audit entries for rescue calls.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RescueAuditEntry {
    pub id: Uuid,
    pub surface: String,
    pub model: String,
    pub backend: String,
    pub attempts: u32,
    pub outcome: String,
    /// SHA-256 of the last raw oracle reply; empty when none arrived.
    pub output_hash: String,
    pub latency_ms: u64,
    pub called_at: chrono::DateTime<Utc>,
}

impl RescueAuditEntry {
    pub fn new(
        surface: &str,
        model: &str,
        backend: &str,
        attempts: u32,
        outcome: &str,
        output: Option<&str>,
        latency_ms: u64,
    ) -> Self {
        let output_hash = output
            .map(|o| {
                let mut hasher = Sha256::new();
                hasher.update(o.as_bytes());
                format!("{:x}", hasher.finalize())
            })
            .unwrap_or_default();

        Self {
            id: Uuid::new_v4(),
            surface: surface.to_string(),
            model: model.to_string(),
            backend: backend.to_string(),
            attempts,
            outcome: outcome.to_string(),
            output_hash,
            latency_ms,
            called_at: Utc::now(),
        }
    }
}
