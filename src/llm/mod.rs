//! LLM integration for scene reasoning and caption writing.
//!
//! Providers implement the [`LlmProvider`] trait; the OpenAI-compatible
//! implementation covers OpenAI, OpenRouter, vLLM and Ollama's
//! compatibility endpoint.

mod openai;
mod provider;
mod types;

pub use openai::{ApiKeySource, OpenAIProvider};
pub use provider::{CompletionOptions, LlmError, LlmProvider};
pub use types::{CompletionResponse, FinishReason, Message, MessageRole, TokenUsage};
