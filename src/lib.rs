//! codecritic — multi-provider AI code review with consensus.
//!
//! Code goes in, several LLM providers each review it in a chosen
//! personality, and the results are normalized into one canonical
//! schema and optionally reduced to a consensus with an explicit
//! agreement/disagreement report.
//!
//! The crate ships a library (this), plus a `codecritic` binary with a
//! `serve` mode (HTTP gateway) and one-shot `review`/`compare` modes.

pub mod config;
pub mod error;
pub mod gateway;
pub mod providers;
pub mod review;
pub mod store;
pub mod tasks;
