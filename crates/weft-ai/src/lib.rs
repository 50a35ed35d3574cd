//! Generation backends for the Weft agent fabric.
//!
//! Exposes the `LlmClient` contract, chat request/response types, and HTTP
//! clients for Google Gemini and OpenAI-compatible chat completion APIs.
mod google;
mod openai;
mod provider;
mod transport;
mod types;

pub use google::{GoogleClient, GoogleConfig};
pub use openai::{OpenAiClient, OpenAiConfig};
pub use provider::{ModelRef, ModelRefParseError, Provider};
pub use types::{
    ChatRequest, ChatResponse, ChatUsage, LlmClient, Message, MessageRole, WeftAiError,
};
