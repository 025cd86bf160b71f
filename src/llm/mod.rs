//! LLM integration module.
//!
//! Provides the completion-oracle capability used by the answer generator and
//! the judge, an OpenAI-compatible client implementing it, and the fixed
//! prompts both stages send.

mod client;
mod oracle;
mod prompts;

pub use client::{LlmClient, LlmResponse, Message, Role, TokenUsage};
pub use oracle::CompletionOracle;
pub use prompts::Prompts;
