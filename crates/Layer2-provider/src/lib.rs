//! # orca-provider
//!
//! Reasoning service adapters for Orca.
//! `orca_foundation::Reasoner`를 구현해 한 스텝의 결정을 받아옵니다.
//!
//! ## Features
//! - OpenAI-compatible chat completions with tool calling
//! - Automatic retry with exponential backoff (429 / 5xx / network)

pub mod error;
pub mod providers;
pub mod retry;

// Error and retry
pub use error::ProviderError;
pub use retry::{with_retry, RetryConfig, RetryDecision, Retryable};

// Reasoner implementations
pub use providers::openai::OpenAiReasoner;
