//! OpenAI Adapter
//!
//! Supports:
//! - OpenAI Chat Completions API
//! - Compatible endpoints via `base_url`
//!
//! Natural-language parsing uses a forced `create_task` function call; the
//! other capabilities read the message content.

use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{
    ProviderError, ProviderOutcome, ProviderSettings, map_transport_error, prompts, read_body,
    reply,
};
use crate::llm::capability::{CapabilityRequest, CapabilityResult};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI Adapter
#[derive(Clone)]
pub struct OpenAiAdapter {
    settings: ProviderSettings,
    client: Client,
}

impl std::fmt::Debug for OpenAiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiAdapter")
            .field("model", &self.settings.model)
            .field("base_url", &self.base_url())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    function: ToolCallFunction,
}

#[derive(Debug, Deserialize)]
struct ToolCallFunction {
    arguments: String,
}

impl ChatResponse {
    fn into_message(self) -> Result<ChatMessage, ProviderError> {
        self.choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| ProviderError::malformed("completion has no choices"))
    }
}

impl ChatMessage {
    fn into_content(self) -> Result<String, ProviderError> {
        self.content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ProviderError::malformed("completion has no content"))
    }

    /// Arguments of the first tool call, or the content when the model answered inline
    fn into_tool_arguments(self) -> Result<String, ProviderError> {
        match self.tool_calls.and_then(|calls| calls.into_iter().next()) {
            Some(call) => Ok(call.function.arguments),
            None => self.content.filter(|c| !c.trim().is_empty()).ok_or_else(|| {
                ProviderError::malformed("completion has neither tool call nor content")
            }),
        }
    }
}

impl OpenAiAdapter {
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

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.settings.api_key)
    }

    fn messages(system: &str, user: &str) -> Value {
        json!([
            {"role": "system", "content": system},
            {"role": "user", "content": user},
        ])
    }

    async fn chat(&self, body: Value) -> Result<ChatMessage, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url());
        let timeout_ms = self.settings.timeout_ms;

        let response = self
            .client
            .post(&url)
            .timeout(self.settings.timeout())
            .header(AUTHORIZATION, self.auth_header())
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, timeout_ms))?;

        let text = read_body(response, timeout_ms).await?;
        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::malformed(format!("invalid completion payload: {e}")))?;
        parsed.into_message()
    }

    async fn complete_text(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> Result<String, ProviderError> {
        let body = json!({
            "model": self.settings.model,
            "messages": Self::messages(system, user),
            "temperature": temperature,
        });
        self.chat(body).await?.into_content()
    }

    pub async fn invoke(&self, request: &CapabilityRequest) -> ProviderOutcome {
        match request {
            CapabilityRequest::ParseText { text, now } => {
                let body = json!({
                    "model": self.settings.model,
                    "messages": Self::messages(&prompts::parse_system(*now), text),
                    "tools": [prompts::create_task_tool()],
                    "tool_choice": {"type": "function", "function": {"name": "create_task"}},
                    "temperature": 0.1,
                });
                let arguments = self.chat(body).await?.into_tool_arguments()?;
                reply::parse_draft(&arguments).map(CapabilityResult::Parsed)
            }
            CapabilityRequest::SuggestTags { title, description } => {
                let user = prompts::tags_user(title, description.as_deref());
                let text = self.complete_text(prompts::TAGS_SYSTEM, &user, 0.3).await?;
                reply::parse_tags(&text).map(CapabilityResult::Tags)
            }
            CapabilityRequest::Breakdown { description } => {
                let user = prompts::breakdown_user(description);
                let text = self
                    .complete_text(prompts::BREAKDOWN_SYSTEM, &user, 0.5)
                    .await?;
                reply::parse_subtasks(&text).map(CapabilityResult::Subtasks)
            }
            CapabilityRequest::RecommendPriority { title, description } => {
                let user = prompts::priority_user(title, description.as_deref());
                let text = self
                    .complete_text(prompts::PRIORITY_SYSTEM, &user, 0.3)
                    .await?;
                reply::parse_priority(&text).map(CapabilityResult::Priority)
            }
        }
    }
}
