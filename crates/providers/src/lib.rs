//! LLM client implementations for ferrocode.
//!
//! All clients implement the `ferrocode_core::LlmClient` trait.
//! The router selects the correct client based on configuration.

pub mod framing;
pub mod function_call;
pub mod http;
pub mod ollama;
pub mod openai_compat;
pub mod router;

pub use ollama::OllamaClient;
pub use openai_compat::OpenAiCompatClient;
pub use router::build_client;
