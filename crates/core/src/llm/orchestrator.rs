//! Provider Orchestrator
//!
//! Tries the configured providers in order for one capability request and
//! returns the first success. When every provider fails (or none is
//! configured) the keyword fallback engine answers instead, and the result
//! is marked degraded.
//!
//! Invocations share no mutable state, so one orchestrator can serve
//! concurrent callers behind an `Arc`. Dropping an invocation future aborts
//! the in-flight request and no further providers are tried.

use chrono::NaiveDateTime;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::capability::{
    Capability, CapabilityRequest, CapabilityResult, ParsedTaskDraft, PriorityRecommendation,
    SubtaskList, TagSuggestion,
};
use super::fallback::{KeywordFallbackEngine, priority_signal};
use super::provider::{FailureReason, ProviderAdapter, ProviderError, ProviderId};
use crate::config::LlmConfig;
use crate::task::TaskPriority;

/// Hard errors of the orchestrator; provider failures never surface here
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssistError {
    #[error("Nothing to {capability}: input is empty")]
    EmptyInput { capability: Capability },

    #[error("Expected a {expected} result, got {actual}")]
    CapabilityMismatch {
        expected: Capability,
        actual: Capability,
    },
}

/// Who produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "provider")]
pub enum ResultSource {
    Provider(ProviderId),
    Fallback,
}

impl fmt::Display for ResultSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultSource::Provider(id) => write!(f, "{id}"),
            ResultSource::Fallback => f.write_str("keyword fallback"),
        }
    }
}

/// One failed provider attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptFailure {
    pub provider: ProviderId,
    pub reason: FailureReason,
    pub message: String,
}

/// Result of one orchestrated invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub result: CapabilityResult,
    pub source: ResultSource,
    /// Failed attempts, in trial order
    pub failures: Vec<AttemptFailure>,
}

impl Invocation {
    /// True when the fallback engine produced the result
    pub fn is_degraded(&self) -> bool {
        self.source == ResultSource::Fallback
    }
}

/// Typed payload of a helper call plus its provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assisted<T> {
    pub value: T,
    pub source: ResultSource,
    pub failures: Vec<AttemptFailure>,
}

impl<T> Assisted<T> {
    pub fn is_degraded(&self) -> bool {
        self.source == ResultSource::Fallback
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Assisted<U> {
        Assisted {
            value: f(self.value),
            source: self.source,
            failures: self.failures,
        }
    }
}

/// Provider Orchestrator
#[derive(Debug, Clone, Default)]
pub struct ProviderOrchestrator {
    providers: Vec<ProviderAdapter>,
    fallback: KeywordFallbackEngine,
}

impl ProviderOrchestrator {
    /// Create an orchestrator over an explicit, ordered chain
    pub fn new(providers: Vec<ProviderAdapter>) -> Self {
        Self {
            providers,
            fallback: KeywordFallbackEngine::new(),
        }
    }

    /// Build the chain described by `config`, sharing one HTTP client
    pub fn from_config(config: &LlmConfig) -> Self {
        let client = Client::new();
        let providers: Vec<ProviderAdapter> = config
            .provider_chain()
            .into_iter()
            .map(|settings| ProviderAdapter::from_settings(settings, client.clone()))
            .collect();

        if providers.is_empty() {
            warn!(
                mode = %config.mode,
                "No AI provider configured, using keyword fallback only"
            );
        } else {
            debug!(
                providers = ?providers.iter().map(ProviderAdapter::id).collect::<Vec<_>>(),
                "Provider chain configured"
            );
        }
        Self::new(providers)
    }

    /// Provider ids in trial order
    pub fn providers(&self) -> Vec<ProviderId> {
        self.providers.iter().map(ProviderAdapter::id).collect()
    }

    pub fn fallback(&self) -> &KeywordFallbackEngine {
        &self.fallback
    }

    /// Run `request` through the chain.
    ///
    /// Never fails because of a provider: the only errors are requests
    /// with empty primary text.
    pub async fn invoke(&self, request: &CapabilityRequest) -> Result<Invocation, AssistError> {
        let capability = request.capability();
        if request.primary_text().trim().is_empty() {
            return Err(AssistError::EmptyInput { capability });
        }

        let mut failures = Vec::new();
        for provider in &self.providers {
            let id = provider.id();
            let timeout = provider.timeout();

            let outcome = match tokio::time::timeout(timeout, provider.invoke(request)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ProviderError::Timeout {
                    timeout_ms: provider.settings().timeout_ms,
                }),
            };

            match outcome {
                Ok(result) if result.capability() == capability => {
                    info!(
                        capability = %capability,
                        provider = %id,
                        outcome = "success",
                        "Provider attempt succeeded"
                    );
                    return Ok(Invocation {
                        result: reconcile(request, result),
                        source: ResultSource::Provider(id),
                        failures,
                    });
                }
                Ok(result) => {
                    let error = ProviderError::malformed(format!(
                        "answered {} instead of {capability}",
                        result.capability()
                    ));
                    failures.push(record_failure(capability, id, &error));
                }
                Err(error) => failures.push(record_failure(capability, id, &error)),
            }
        }

        info!(
            capability = %capability,
            failed_providers = failures.len(),
            "Using keyword fallback"
        );
        Ok(Invocation {
            result: self.fallback.invoke(request),
            source: ResultSource::Fallback,
            failures,
        })
    }

    pub async fn parse_text(
        &self,
        text: &str,
        now: NaiveDateTime,
    ) -> Result<Assisted<ParsedTaskDraft>, AssistError> {
        let request = CapabilityRequest::ParseText {
            text: text.to_string(),
            now,
        };
        let invocation = self.invoke(&request).await?;
        unpack(invocation, Capability::ParseText, |result| match result {
            CapabilityResult::Parsed(draft) => Ok(draft),
            other => Err(other),
        })
    }

    pub async fn suggest_tags(
        &self,
        title: &str,
        description: Option<&str>,
    ) -> Result<Assisted<TagSuggestion>, AssistError> {
        let request = CapabilityRequest::SuggestTags {
            title: title.to_string(),
            description: description.map(str::to_string),
        };
        let invocation = self.invoke(&request).await?;
        unpack(invocation, Capability::SuggestTags, |result| match result {
            CapabilityResult::Tags(tags) => Ok(tags),
            other => Err(other),
        })
    }

    pub async fn breakdown(&self, description: &str) -> Result<Assisted<SubtaskList>, AssistError> {
        let request = CapabilityRequest::Breakdown {
            description: description.to_string(),
        };
        let invocation = self.invoke(&request).await?;
        unpack(invocation, Capability::Breakdown, |result| match result {
            CapabilityResult::Subtasks(steps) => Ok(steps),
            other => Err(other),
        })
    }

    pub async fn recommend_priority(
        &self,
        title: &str,
        description: Option<&str>,
    ) -> Result<Assisted<PriorityRecommendation>, AssistError> {
        let request = CapabilityRequest::RecommendPriority {
            title: title.to_string(),
            description: description.map(str::to_string),
        };
        let invocation = self.invoke(&request).await?;
        unpack(invocation, Capability::RecommendPriority, |result| match result {
            CapabilityResult::Priority(rec) => Ok(rec),
            other => Err(other),
        })
    }
}

fn record_failure(
    capability: Capability,
    provider: ProviderId,
    error: &ProviderError,
) -> AttemptFailure {
    let reason = error.reason();
    warn!(
        capability = %capability,
        provider = %provider,
        outcome = "failure",
        reason = %reason,
        error = %error,
        "Provider attempt failed"
    );
    AttemptFailure {
        provider,
        reason,
        message: error.to_string(),
    }
}

/// An explicit high/low keyword in the input beats the model's priority
fn reconcile(request: &CapabilityRequest, result: CapabilityResult) -> CapabilityResult {
    match (request, result) {
        (CapabilityRequest::ParseText { text, .. }, CapabilityResult::Parsed(mut draft)) => {
            if let Some(explicit @ (TaskPriority::High | TaskPriority::Low)) = priority_signal(text)
            {
                if draft.priority != explicit {
                    debug!(
                        model = %draft.priority,
                        explicit = %explicit,
                        "Explicit priority keyword overrides model"
                    );
                    draft.priority = explicit;
                }
            }
            CapabilityResult::Parsed(draft)
        }
        (_, result) => result,
    }
}

fn unpack<T>(
    invocation: Invocation,
    expected: Capability,
    extract: impl FnOnce(CapabilityResult) -> Result<T, CapabilityResult>,
) -> Result<Assisted<T>, AssistError> {
    let Invocation {
        result,
        source,
        failures,
    } = invocation;
    let value = extract(result).map_err(|other| AssistError::CapabilityMismatch {
        expected,
        actual: other.capability(),
    })?;
    Ok(Assisted {
        value,
        source,
        failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 31)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn test_empty_input_is_rejected() {
        let orchestrator = ProviderOrchestrator::default();
        let err = orchestrator.parse_text("   ", now()).await.unwrap_err();
        assert_eq!(
            err,
            AssistError::EmptyInput {
                capability: Capability::ParseText
            }
        );
        assert!(orchestrator.breakdown("").await.is_err());
    }

    #[tokio::test]
    async fn test_no_providers_goes_straight_to_fallback() {
        let orchestrator = ProviderOrchestrator::new(Vec::new());
        assert!(orchestrator.providers().is_empty());

        let invocation = orchestrator
            .invoke(&CapabilityRequest::Breakdown {
                description: "Move house".to_string(),
            })
            .await
            .unwrap();
        assert!(invocation.is_degraded());
        assert!(invocation.failures.is_empty());
        assert_eq!(invocation.result.capability(), Capability::Breakdown);
    }

    #[test]
    fn test_reconcile_prefers_explicit_keyword() {
        let request = CapabilityRequest::ParseText {
            text: "Pay the invoice, it's urgent".to_string(),
            now: now(),
        };
        let draft = ParsedTaskDraft {
            title: "Pay the invoice".to_string(),
            description: None,
            priority: TaskPriority::Medium,
            due_date: None,
            tags: Default::default(),
        };
        let CapabilityResult::Parsed(draft) = reconcile(&request, CapabilityResult::Parsed(draft))
        else {
            panic!("expected parsed draft");
        };
        assert_eq!(draft.priority, TaskPriority::High);
    }

    #[test]
    fn test_result_source_serde() {
        let json = serde_json::to_string(&ResultSource::Provider(ProviderId::Gemini)).unwrap();
        assert_eq!(json, r#"{"type":"provider","provider":"gemini"}"#);
        let json = serde_json::to_string(&ResultSource::Fallback).unwrap();
        assert_eq!(json, r#"{"type":"fallback"}"#);
    }
}
