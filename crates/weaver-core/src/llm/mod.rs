//! LLM integration - OpenRouter API
//!
//! This module provides:
//! - OpenRouter HTTP client for chat completions
//! - Request/response types matching the OpenAI-compatible API
//! - Model fallback with automatic retry on rate limits

mod client;
mod types;

pub use client::{LlmClient, LlmClientBuilder};
pub use types::{
    ChatRequest, ChatResponse, Choice, FinishReason, LlmResponse, Message, MessageRole,
    ResponseFormat, Usage,
};
