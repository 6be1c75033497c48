//! Gemini Adapter
//!
//! Talks to Google's `generateContent` endpoint. Every capability asks for
//! a JSON reply (`responseMimeType`), which is still parsed defensively.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{
    ProviderError, ProviderOutcome, ProviderSettings, map_error_wording, map_transport_error,
    prompts, read_body, reply,
};
use crate::llm::capability::{CapabilityRequest, CapabilityResult};

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini Adapter
#[derive(Clone)]
pub struct GeminiAdapter {
    settings: ProviderSettings,
    client: Client,
}

impl std::fmt::Debug for GeminiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiAdapter")
            .field("model", &self.settings.model)
            .field("base_url", &self.base_url())
            .finish_non_exhaustive()
    }
}

// Gemini API request/response structures

#[derive(Debug, Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(rename = "systemInstruction")]
    system_instruction: GeminiSystemInstruction<'a>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiSystemInstruction<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContentResponse>,
}

#[derive(Debug, Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Debug, Deserialize)]
struct GeminiPartResponse {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

impl GeminiAdapter {
    pub fn new(settings: ProviderSettings, client: Client) -> Self {
        Self { settings, client }
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    fn base_url(&self) -> &str {
        self.settings
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
    }

    async fn generate(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> Result<String, ProviderError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url(),
            self.settings.model
        );
        let timeout_ms = self.settings.timeout_ms;

        let body = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user",
                parts: vec![GeminiPart { text: user }],
            }],
            system_instruction: GeminiSystemInstruction {
                parts: vec![GeminiPart { text: system }],
            },
            generation_config: GeminiGenerationConfig {
                temperature,
                response_mime_type: "application/json",
            },
        };

        let response = self
            .client
            .post(&url)
            .timeout(self.settings.timeout())
            .header(API_KEY_HEADER, &self.settings.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, timeout_ms))?;

        let text = read_body(response, timeout_ms).await?;
        let parsed: GeminiResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::malformed(format!("invalid Gemini payload: {e}")))?;

        if let Some(error) = parsed.error {
            let detail = format!("{} {}", error.status, error.message);
            return Err(map_error_wording(error.message, &detail, None));
        }

        let content: String = parsed
            .candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(ProviderError::malformed("no content in Gemini response"));
        }
        Ok(content)
    }

    pub async fn invoke(&self, request: &CapabilityRequest) -> ProviderOutcome {
        match request {
            CapabilityRequest::ParseText { text, now } => {
                let system = prompts::parse_system_json(*now);
                let reply_text = self.generate(&system, text, 0.1).await?;
                reply::parse_draft(&reply_text).map(CapabilityResult::Parsed)
            }
            CapabilityRequest::SuggestTags { title, description } => {
                let user = prompts::tags_user(title, description.as_deref());
                let reply_text = self.generate(prompts::TAGS_SYSTEM, &user, 0.3).await?;
                reply::parse_tags(&reply_text).map(CapabilityResult::Tags)
            }
            CapabilityRequest::Breakdown { description } => {
                let user = prompts::breakdown_user(description);
                let reply_text = self.generate(prompts::BREAKDOWN_SYSTEM, &user, 0.5).await?;
                reply::parse_subtasks(&reply_text).map(CapabilityResult::Subtasks)
            }
            CapabilityRequest::RecommendPriority { title, description } => {
                let user = prompts::priority_user(title, description.as_deref());
                let reply_text = self.generate(prompts::PRIORITY_SYSTEM, &user, 0.3).await?;
                reply::parse_priority(&reply_text).map(CapabilityResult::Priority)
            }
        }
    }
}
