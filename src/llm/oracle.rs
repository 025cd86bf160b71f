//! Completion oracle capability.

use super::Message;
use crate::error::Result;
use async_trait::async_trait;

/// A chat-completion service invoked with a request/response contract.
///
/// Both the generation oracle and the judge oracle have this shape; the judge's
/// restricted verdict vocabulary is imposed by its prompt, not by this interface.
/// Implementations are responsible for bounding each call with a timeout.
#[async_trait]
pub trait CompletionOracle: Send + Sync {
    /// Complete `messages` with `model` at `temperature`, returning the reply text.
    async fn complete(&self, messages: &[Message], model: &str, temperature: f32)
    -> Result<String>;
}
