//! # mind-llm
//!
//! Abstraction over language-model providers. The reasoning loop only sees
//! [`LlmProvider`] and the typed [`StreamChunk`]s it yields.

pub mod anthropic;
pub mod mock;
pub mod provider;

pub use anthropic::AnthropicProvider;
pub use mock::{MockProvider, MockResponse};
pub use provider::{LlmProvider, LlmRequest, StopReason, StreamChunk, Usage};
