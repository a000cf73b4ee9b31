//! Canonicalization oracles.
//!
//! An oracle proposes English query text for a Hebrew surface it is given. It
//! never proposes identifiers. Replies are raw text; schema validation is the
//! guard's job.

use std::sync::Arc;

use async_trait::async_trait;
use odontolink_config::RescueConfig;
use tracing::info;

use crate::backend::{ChatBackend, LlmBackend, LlmError, LlmRequest, Message};

/// Unvalidated oracle output.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleReply {
    pub raw: String,
    pub model: String,
}

#[async_trait]
pub trait CanonicalOracle: Send + Sync {
    /// `context` is the surrounding line text, possibly empty.
    async fn canonicalize(&self, surface: &str, context: &str) -> Result<OracleReply, LlmError>;

    fn model_id(&self) -> &str;

    fn backend_name(&self) -> &'static str;
}

const SYSTEM_PROMPT: &str = "You are a dental terminology expert. \
Given a Hebrew dental term from a clinical note, reply with English canonical terms \
that a dental ontology would use for it. \
Reply with JSON only: {\"canonical_terms\": [\"term\", ...]}. \
Give 1 to 3 terms. Use letters, spaces and hyphens only. No digits, units or explanations.";

/// Oracle backed by a chat-completion LLM.
pub struct LlmOracle {
    backend: Arc<dyn LlmBackend>,
}

impl LlmOracle {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend }
    }

    fn request(surface: &str, context: &str) -> LlmRequest {
        let user = if context.trim().is_empty() {
            format!("Term: {surface}")
        } else {
            format!("Term: {surface}\nLine: {context}")
        };
        LlmRequest {
            messages: vec![Message::system(SYSTEM_PROMPT), Message::user(user)],
            max_tokens: 64,
        }
    }
}

#[async_trait]
impl CanonicalOracle for LlmOracle {
    async fn canonicalize(&self, surface: &str, context: &str) -> Result<OracleReply, LlmError> {
        let resp = self.backend.complete(Self::request(surface, context)).await?;
        Ok(OracleReply { raw: resp.content, model: resp.model })
    }

    fn model_id(&self) -> &str {
        self.backend.model_id()
    }

    fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }
}

/// Offline oracle: the first keyword contained in the surface wins.
pub struct StaticOracle {
    table: Vec<(String, Vec<String>)>,
}

impl StaticOracle {
    pub fn new() -> Self {
        Self { table: Vec::new() }
    }

    /// Built-in table for the common dental surfaces.
    pub fn dental() -> Self {
        Self::new()
            .with_rule("מולטי", &["multi-unit abutment"])
            .with_rule("multi", &["multi-unit abutment"])
            .with_rule("שתל", &["dental implant"])
            .with_rule("implant", &["dental implant"])
            .with_rule("כתר", &["dental crown"])
            .with_rule("גשר", &["dental bridge"])
            .with_rule("ברג", &["abutment screw"])
            .with_rule("עששת", &["dental caries"])
    }

    pub fn with_rule(mut self, keyword: &str, terms: &[&str]) -> Self {
        self.table.push((
            keyword.to_lowercase(),
            terms.iter().map(|t| t.to_string()).collect(),
        ));
        self
    }
}

impl Default for StaticOracle {
    fn default() -> Self {
        Self::dental()
    }
}

#[async_trait]
impl CanonicalOracle for StaticOracle {
    async fn canonicalize(&self, surface: &str, _context: &str) -> Result<OracleReply, LlmError> {
        let lowered = surface.to_lowercase();
        let terms: &[String] = self
            .table
            .iter()
            .find(|(k, _)| lowered.contains(k.as_str()))
            .map(|(_, t)| t.as_slice())
            .unwrap_or(&[]);
        Ok(OracleReply {
            raw: serde_json::json!({ "canonical_terms": terms }).to_string(),
            model: "static".to_string(),
        })
    }

    fn model_id(&self) -> &str {
        "static"
    }

    fn backend_name(&self) -> &'static str {
        "static"
    }
}

/// Build the oracle named by `config.backend`: `static`, `ollama` or `openai`.
pub fn build_oracle(config: &RescueConfig) -> Result<Arc<dyn CanonicalOracle>, LlmError> {
    let oracle: Arc<dyn CanonicalOracle> = match config.backend.as_str() {
        "static" => Arc::new(StaticOracle::dental()),
        "ollama" => Arc::new(LlmOracle::new(Arc::new(ChatBackend::ollama(
            &config.base_url,
            &config.model,
        )))),
        "openai" | "openai_compatible" => {
            let api_key = config
                .api_key_env
                .as_deref()
                .and_then(|name| std::env::var(name).ok());
            Arc::new(LlmOracle::new(Arc::new(ChatBackend::openai_compatible(
                &config.base_url,
                &config.model,
                api_key,
            ))))
        }
        other => {
            return Err(LlmError::Unavailable(format!("unknown rescue backend '{other}'")));
        }
    };
    info!(
        "Rescue oracle: {} ({})",
        oracle.backend_name(),
        oracle.model_id()
    );
    Ok(oracle)
}
