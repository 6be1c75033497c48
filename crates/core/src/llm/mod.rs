//! LLM integration module
//!
//! - `capability`: request/result types shared by every backend
//! - `provider`: remote adapters (OpenAI, Gemini)
//! - `fallback`: offline keyword engine
//! - `orchestrator`: ordered failover across providers

pub mod capability;
pub mod fallback;
pub mod orchestrator;
pub mod provider;

pub use capability::*;
pub use fallback::KeywordFallbackEngine;
pub use orchestrator::{
    AssistError, Assisted, AttemptFailure, Invocation, ProviderOrchestrator, ResultSource,
};
pub use provider::{
    FailureReason, GeminiAdapter, OpenAiAdapter, ProviderAdapter, ProviderError, ProviderId,
    ProviderSettings,
};
