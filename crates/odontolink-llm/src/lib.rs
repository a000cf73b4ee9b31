//! odontolink-llm — LLM rescue for mentions with no evidence.
//!
//! A [`CanonicalOracle`] proposes English canonical terms for a Hebrew
//! surface; the [`RescueGuard`] bounds the call, validates the reply against a
//! strict schema and caches successes. The terms only ever feed a second
//! vector query, never an identifier.

pub mod audit;
pub mod backend;
pub mod guard;
pub mod oracle;
pub mod retry;

pub use audit::RescueAuditEntry;
pub use backend::{ChatBackend, ChatFlavor, LlmBackend, LlmError, LlmRequest, LlmResponse, Message};
pub use guard::{validate_reply, RescueGuard, RescueOutcome, RescueReport};
pub use oracle::{build_oracle, CanonicalOracle, LlmOracle, OracleReply, StaticOracle};
pub use retry::{AttemptFailure, RetryOutcome, RetryPolicy};
