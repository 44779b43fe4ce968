//! Iterative article generation: an automated writer drafts an article, an
//! automated evaluator grades it, and the draft is revised until it is
//! approved, rejected, or handed to a human for feedback.

pub mod anthropic;
pub mod config;
pub mod error;
pub mod export;
pub mod generation;
pub mod orchestrator;
pub mod server;
pub mod state_machine;
pub mod store;
