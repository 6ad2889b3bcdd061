//! Multi-provider code review: prompt construction, response
//! normalization, orchestration, and consensus reduction.
//!
//! ## Architecture
//!
//! ```text
//! ReviewRequest ─▸ Orchestrator ─┬─▸ quota + duplicate checks (store)
//!                                ├─▸ build_prompt (pure)
//!                                ├─▸ ProviderGateway fan-out ─▸ raw text
//!                                ├─▸ normalize ─▸ ReviewResult
//!                                └─▸ reduce ─▸ ConsensusResult
//! ```
//!
//! Prompt building and consensus reduction are pure functions; the
//! normalizer is a parser with an explicit fallback chain; only the
//! orchestrator touches the store and the network.

pub mod consensus;
pub mod normalize;
pub mod orchestrator;
pub mod prompt;
pub mod types;

pub use consensus::reduce;
pub use normalize::normalize;
pub use orchestrator::{RateLimits, ReviewOrchestrator};
pub use prompt::{build_prompt, SubmissionContext};
pub use types::{
    ConsensusResult, Personality, Prompt, ProviderIdentity, ReviewRequest, ReviewResult,
    ReviewStatus, ReviewType, Severity, Suggestion, SuggestionCategory, UserLevel,
};
