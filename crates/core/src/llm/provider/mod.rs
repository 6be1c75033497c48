//! Remote provider adapters
//!
//! Responsibilities:
//! - Uniform capability interface over heterogeneous LLM backends
//! - Mapping transport, auth, quota and parsing failures to [`ProviderError`]
//! - Provider settings (credentials, model, endpoint, timeout)
//!
//! Adapters perform exactly one HTTP call per invocation and never retry;
//! failover is the orchestrator's job.

pub mod gemini;
pub mod openai;
pub(crate) mod prompts;
pub(crate) mod reply;

pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use super::capability::{CapabilityRequest, CapabilityResult};

/// Default per-call timeout
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Provider-specific errors
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Quota exceeded: {message}")]
    QuotaExceeded { message: String },

    #[error("Authentication failed: {message}")]
    Auth { message: String },

    #[error("Malformed response: {message}")]
    MalformedResponse { message: String },

    #[error("Network error: {source}")]
    Network { source: reqwest::Error },

    #[error("API error: {message}")]
    Api {
        message: String,
        status_code: Option<u16>,
    },
}

impl ProviderError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        ProviderError::MalformedResponse {
            message: message.into(),
        }
    }

    /// Coarse failure category recorded by the orchestrator
    pub fn reason(&self) -> FailureReason {
        match self {
            ProviderError::Timeout { .. } => FailureReason::Timeout,
            ProviderError::QuotaExceeded { .. } => FailureReason::QuotaExceeded,
            ProviderError::Auth { .. } => FailureReason::AuthError,
            ProviderError::MalformedResponse { .. } => FailureReason::MalformedResponse,
            ProviderError::Network { .. } => FailureReason::NetworkError,
            ProviderError::Api { .. } => FailureReason::Unknown,
        }
    }
}

/// Why a provider attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Timeout,
    QuotaExceeded,
    AuthError,
    MalformedResponse,
    NetworkError,
    Unknown,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureReason::Timeout => "timeout",
            FailureReason::QuotaExceeded => "quota_exceeded",
            FailureReason::AuthError => "auth_error",
            FailureReason::MalformedResponse => "malformed_response",
            FailureReason::NetworkError => "network_error",
            FailureReason::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Outcome of one adapter invocation
pub type ProviderOutcome = Result<CapabilityResult, ProviderError>;

/// Identity of a remote backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderId {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "gemini", alias = "google")]
    Gemini,
}

impl ProviderId {
    pub const ALL: [ProviderId; 2] = [ProviderId::OpenAi, ProviderId::Gemini];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "openai",
            ProviderId::Gemini => "gemini",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => openai::DEFAULT_MODEL,
            ProviderId::Gemini => gemini::DEFAULT_MODEL,
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown provider: {0}")]
pub struct UnknownProvider(pub String);

impl FromStr for ProviderId {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(ProviderId::OpenAi),
            "gemini" | "google" => Ok(ProviderId::Gemini),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

/// Settings for one configured provider
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub provider: ProviderId,
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
    pub timeout_ms: u64,
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("provider", &self.provider)
            .field("api_key", &mask_key(&self.api_key))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

pub(crate) fn mask_key(key: &str) -> String {
    match key.get(..4) {
        Some(prefix) if key.len() > 8 => format!("{prefix}***"),
        _ => "***".to_string(),
    }
}

impl ProviderSettings {
    pub fn new(provider: ProviderId, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            api_key: api_key.into(),
            model: provider.default_model().to_string(),
            base_url: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// One remote backend.
///
/// The set of backends is closed so capability dispatch stays exhaustive.
#[derive(Debug, Clone)]
pub enum ProviderAdapter {
    OpenAi(OpenAiAdapter),
    Gemini(GeminiAdapter),
}

impl ProviderAdapter {
    /// Build the adapter for `settings`; credentials are only checked on first use
    pub fn from_settings(settings: ProviderSettings, client: Client) -> Self {
        match settings.provider {
            ProviderId::OpenAi => ProviderAdapter::OpenAi(OpenAiAdapter::new(settings, client)),
            ProviderId::Gemini => ProviderAdapter::Gemini(GeminiAdapter::new(settings, client)),
        }
    }

    pub fn id(&self) -> ProviderId {
        match self {
            ProviderAdapter::OpenAi(_) => ProviderId::OpenAi,
            ProviderAdapter::Gemini(_) => ProviderId::Gemini,
        }
    }

    pub fn settings(&self) -> &ProviderSettings {
        match self {
            ProviderAdapter::OpenAi(adapter) => adapter.settings(),
            ProviderAdapter::Gemini(adapter) => adapter.settings(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.settings().timeout()
    }

    pub async fn invoke(&self, request: &CapabilityRequest) -> ProviderOutcome {
        match self {
            ProviderAdapter::OpenAi(adapter) => adapter.invoke(request).await,
            ProviderAdapter::Gemini(adapter) => adapter.invoke(request).await,
        }
    }
}

/// Map a transport-level reqwest failure
pub(crate) fn map_transport_error(error: reqwest::Error, timeout_ms: u64) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout { timeout_ms }
    } else if error.is_decode() {
        ProviderError::malformed(error.to_string())
    } else {
        ProviderError::Network { source: error }
    }
}

/// Classify an API error by its wording.
///
/// Some APIs report invalid keys and exhausted quotas with generic statuses
/// (or inside a 200 body), so `detail` is searched for the usual phrases.
pub(crate) fn map_error_wording(
    message: String,
    detail: &str,
    status_code: Option<u16>,
) -> ProviderError {
    let lowered = detail.to_lowercase();
    if ["api key", "api_key", "unauthenticated", "permission_denied"]
        .iter()
        .any(|w| lowered.contains(w))
    {
        ProviderError::Auth { message }
    } else if ["quota", "resource_exhausted", "rate limit"]
        .iter()
        .any(|w| lowered.contains(w))
    {
        ProviderError::QuotaExceeded { message }
    } else {
        ProviderError::Api {
            message,
            status_code,
        }
    }
}

/// Map a non-success HTTP status plus its body
pub(crate) fn map_status_error(status: StatusCode, body: &str) -> ProviderError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| format!("API returned status {status}"));

    match status.as_u16() {
        401 | 403 => ProviderError::Auth { message },
        429 => ProviderError::QuotaExceeded { message },
        code => map_error_wording(message, body, Some(code)),
    }
}

/// Read the body of a response, turning error statuses into [`ProviderError`]
pub(crate) async fn read_body(
    response: reqwest::Response,
    timeout_ms: u64,
) -> Result<String, ProviderError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| map_transport_error(e, timeout_ms))?;

    if !status.is_success() {
        return Err(map_status_error(status, &body));
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err = map_status_error(StatusCode::UNAUTHORIZED, "{}");
        assert_eq!(err.reason(), FailureReason::AuthError);

        let err = map_status_error(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"error": {"message": "You exceeded your current quota"}}"#,
        );
        assert_eq!(err.reason(), FailureReason::QuotaExceeded);
        assert!(err.to_string().contains("exceeded your current quota"));

        let err = map_status_error(
            StatusCode::BAD_REQUEST,
            r#"{"error": {"message": "API key not valid. Please pass a valid API key."}}"#,
        );
        assert_eq!(err.reason(), FailureReason::AuthError);

        let err = map_status_error(StatusCode::INTERNAL_SERVER_ERROR, "oops");
        assert_eq!(err.reason(), FailureReason::Unknown);
    }

    #[test]
    fn test_error_wording_mapping() {
        let err = map_error_wording("denied".to_string(), "PERMISSION_DENIED", None);
        assert_eq!(err.reason(), FailureReason::AuthError);

        let err = map_error_wording(
            "Resource has been exhausted".to_string(),
            "RESOURCE_EXHAUSTED: check quota",
            None,
        );
        assert_eq!(err.reason(), FailureReason::QuotaExceeded);

        let err = map_error_wording("Internal error".to_string(), "INTERNAL", Some(200));
        assert!(matches!(
            err,
            ProviderError::Api {
                status_code: Some(200),
                ..
            }
        ));
    }

    #[test]
    fn test_provider_id_parse() {
        assert_eq!("OpenAI".parse::<ProviderId>().unwrap(), ProviderId::OpenAi);
        assert_eq!("google".parse::<ProviderId>().unwrap(), ProviderId::Gemini);
        assert!("claude".parse::<ProviderId>().is_err());
    }

    #[test]
    fn test_settings_debug_masks_key() {
        let settings = ProviderSettings::new(ProviderId::OpenAi, "sk-test-1234567890");
        let debug = format!("{settings:?}");
        assert!(debug.contains("sk-t***"));
        assert!(!debug.contains("1234567890"));
        assert_eq!(settings.model, openai::DEFAULT_MODEL);
    }
}
