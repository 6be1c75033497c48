use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use reqwest::Client;
use serde_json::json;
use taskmind_core::TaskPriority;
use taskmind_core::llm::{
    CapabilityRequest, CapabilityResult, FailureReason, ProviderAdapter, ProviderId,
    ProviderOrchestrator, ProviderSettings, ResultSource,
};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// An event emitted by the orchestrator, with its fields rendered as text
#[derive(Debug, Clone)]
struct LoggedEvent {
    level: Level,
    fields: BTreeMap<String, String>,
}

impl LoggedEvent {
    fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

#[derive(Default)]
struct FieldRecorder(BTreeMap<String, String>);

impl Visit for FieldRecorder {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }
}

/// Collects orchestrator events for the current thread's subscriber
#[derive(Clone, Default)]
struct EventLog(Arc<Mutex<Vec<LoggedEvent>>>);

impl EventLog {
    fn events(&self) -> Vec<LoggedEvent> {
        self.0.lock().unwrap().clone()
    }
}

impl<S: Subscriber> Layer<S> for EventLog {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if event.metadata().target() != "taskmind_core::llm::orchestrator" {
            return;
        }
        let mut recorder = FieldRecorder::default();
        event.record(&mut recorder);
        self.0.lock().unwrap().push(LoggedEvent {
            level: *event.metadata().level(),
            fields: recorder.0,
        });
    }
}

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 1, 31)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn openai(server: &MockServer, timeout_ms: u64) -> ProviderAdapter {
    let settings = ProviderSettings::new(ProviderId::OpenAi, "sk-test")
        .with_base_url(server.uri())
        .with_timeout_ms(timeout_ms);
    ProviderAdapter::from_settings(settings, Client::new())
}

fn gemini(server: &MockServer, timeout_ms: u64) -> ProviderAdapter {
    let settings = ProviderSettings::new(ProviderId::Gemini, "g-key")
        .with_base_url(server.uri())
        .with_timeout_ms(timeout_ms);
    ProviderAdapter::from_settings(settings, Client::new())
}

fn openai_content(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
    }))
}

fn gemini_text(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]
    }))
}

fn tags_request() -> CapabilityRequest {
    CapabilityRequest::SuggestTags {
        title: "Prepare the quarterly report".to_string(),
        description: None,
    }
}

#[tokio::test]
async fn test_fallback_answers_every_capability() {
    let orchestrator = ProviderOrchestrator::new(Vec::new());
    let requests = [
        CapabilityRequest::ParseText {
            text: "Call the dentist next monday".to_string(),
            now: now(),
        },
        tags_request(),
        CapabilityRequest::Breakdown {
            description: "Plan a team offsite".to_string(),
        },
        CapabilityRequest::RecommendPriority {
            title: "Renew car insurance".to_string(),
            description: Some("expires next week".to_string()),
        },
    ];

    for request in &requests {
        let invocation = orchestrator.invoke(request).await.unwrap();
        assert!(invocation.is_degraded());
        assert!(invocation.failures.is_empty());
        assert_eq!(invocation.result.capability(), request.capability());
    }
}

#[tokio::test]
async fn test_fallback_parses_reminder() {
    let orchestrator = ProviderOrchestrator::default();
    let parsed = orchestrator
        .parse_text(
            "Remind me to have a meeting tomorrow at 3pm, it's important",
            now(),
        )
        .await
        .unwrap();

    assert_eq!(parsed.source, ResultSource::Fallback);
    let draft = parsed.value;
    assert_eq!(draft.title, "Have a meeting");
    assert_eq!(draft.priority, TaskPriority::High);
    assert_eq!(
        draft.due_date,
        NaiveDate::from_ymd_opt(2026, 2, 1).unwrap().and_hms_opt(15, 0, 0)
    );
    assert!(draft.tags.contains("work"));
    assert!(draft.tags.contains("meeting"));
}

#[tokio::test]
async fn test_fallback_is_idempotent() {
    let orchestrator = ProviderOrchestrator::default();
    let request = CapabilityRequest::ParseText {
        text: "明天下午3点提醒我开会，很重要".to_string(),
        now: now(),
    };
    let first = orchestrator.invoke(&request).await.unwrap();
    let second = orchestrator.invoke(&request).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_auth_error_logs_one_failure_then_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key provided", "code": "invalid_api_key"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let log = EventLog::default();
    let subscriber = tracing_subscriber::registry().with(log.clone());
    let _guard = tracing::subscriber::set_default(subscriber);

    let orchestrator = ProviderOrchestrator::new(vec![openai(&server, 2_000)]);
    let invocation = orchestrator.invoke(&tags_request()).await.unwrap();
    assert!(invocation.is_degraded());

    let events = log.events();
    assert_eq!(events.len(), 2, "unexpected events: {events:?}");

    let failure = &events[0];
    assert_eq!(failure.level, Level::WARN);
    assert_eq!(failure.field("capability"), Some("suggest_tags"));
    assert_eq!(failure.field("provider"), Some("openai"));
    assert_eq!(failure.field("outcome"), Some("failure"));
    assert_eq!(failure.field("reason"), Some("auth_error"));

    let fallback = &events[1];
    assert_eq!(fallback.level, Level::INFO);
    assert_eq!(fallback.field("message"), Some("Using keyword fallback"));
    assert_eq!(fallback.field("failed_providers"), Some("1"));
}

#[tokio::test]
async fn test_auth_error_degrades_to_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key provided", "code": "invalid_api_key"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let orchestrator = ProviderOrchestrator::new(vec![openai(&server, 2_000)]);
    let invocation = orchestrator.invoke(&tags_request()).await.unwrap();

    assert!(invocation.is_degraded());
    assert_eq!(invocation.failures.len(), 1);
    assert_eq!(invocation.failures[0].provider, ProviderId::OpenAi);
    assert_eq!(invocation.failures[0].reason, FailureReason::AuthError);
    let CapabilityResult::Tags(tags) = invocation.result else {
        panic!("expected tags");
    };
    assert!(tags.contains("report"));
}

#[tokio::test]
async fn test_timeout_moves_to_next_provider() {
    let slow = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(openai_content("[\"late\"]").set_delay(Duration::from_secs(2)))
        .mount(&slow)
        .await;

    let fast = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(gemini_text("[\"work\", \"report\"]"))
        .expect(1)
        .mount(&fast)
        .await;

    let orchestrator =
        ProviderOrchestrator::new(vec![openai(&slow, 100), gemini(&fast, 2_000)]);
    let invocation = orchestrator.invoke(&tags_request()).await.unwrap();

    assert_eq!(invocation.source, ResultSource::Provider(ProviderId::Gemini));
    assert!(!invocation.is_degraded());
    assert_eq!(invocation.failures.len(), 1);
    assert_eq!(invocation.failures[0].provider, ProviderId::OpenAi);
    assert_eq!(invocation.failures[0].reason, FailureReason::Timeout);
}

#[tokio::test]
async fn test_first_success_short_circuits() {
    let first = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(openai_content("[\"Work\", \"Report\"]"))
        .expect(1)
        .mount(&first)
        .await;

    let second = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(gemini_text("[\"unused\"]"))
        .expect(0)
        .mount(&second)
        .await;

    let orchestrator =
        ProviderOrchestrator::new(vec![openai(&first, 2_000), gemini(&second, 2_000)]);
    let tags = orchestrator
        .suggest_tags("Prepare the quarterly report", None)
        .await
        .unwrap();

    assert_eq!(tags.source, ResultSource::Provider(ProviderId::OpenAi));
    assert!(tags.failures.is_empty());
    assert_eq!(tags.value.into_vec(), vec!["Work", "Report"]);
}

#[tokio::test]
async fn test_trial_order_is_stable_across_calls() {
    let first = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"message": "You exceeded your current quota"}
        })))
        .expect(2)
        .mount(&first)
        .await;

    let second = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(gemini_text("[\"Collect data\", \"Write summary\"]"))
        .expect(2)
        .mount(&second)
        .await;

    let orchestrator =
        ProviderOrchestrator::new(vec![openai(&first, 2_000), gemini(&second, 2_000)]);
    assert_eq!(
        orchestrator.providers(),
        vec![ProviderId::OpenAi, ProviderId::Gemini]
    );

    for _ in 0..2 {
        let steps = orchestrator.breakdown("Write the weekly summary").await.unwrap();
        assert_eq!(steps.source, ResultSource::Provider(ProviderId::Gemini));
        assert_eq!(steps.failures.len(), 1);
        assert_eq!(steps.failures[0].reason, FailureReason::QuotaExceeded);
        assert_eq!(steps.value.steps().len(), 2);
    }
}

#[tokio::test]
async fn test_malformed_reply_is_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(openai_content("Probably medium, I guess."))
        .mount(&server)
        .await;

    let orchestrator = ProviderOrchestrator::new(vec![openai(&server, 2_000)]);
    let rec = orchestrator
        .recommend_priority("Fix the login bug", Some("customers are blocked, urgent"))
        .await
        .unwrap();

    assert!(rec.is_degraded());
    assert_eq!(rec.failures[0].reason, FailureReason::MalformedResponse);
    assert_eq!(rec.value.priority, TaskPriority::High);
}

#[tokio::test]
async fn test_dropping_invocation_stops_the_chain() {
    let slow = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(openai_content("[\"late\"]").set_delay(Duration::from_secs(5)))
        .mount(&slow)
        .await;

    let next = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(gemini_text("[\"unused\"]"))
        .expect(0)
        .mount(&next)
        .await;

    let orchestrator =
        ProviderOrchestrator::new(vec![openai(&slow, 10_000), gemini(&next, 10_000)]);
    let request = tags_request();
    let outcome =
        tokio::time::timeout(Duration::from_millis(200), orchestrator.invoke(&request)).await;
    assert!(outcome.is_err());
}

#[tokio::test]
async fn test_explicit_keyword_overrides_model_priority() {
    let server = MockServer::start().await;
    let arguments = r#"{"title": "Submit the tax return", "priority": "low", "tags": ["finance", "Finance"]}"#;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": null, "tool_calls": [
                {"id": "call_1", "type": "function", "function": {"name": "create_task", "arguments": arguments}}
            ]}}]
        })))
        .mount(&server)
        .await;

    let orchestrator = ProviderOrchestrator::new(vec![openai(&server, 2_000)]);
    let parsed = orchestrator
        .parse_text("Submit the tax return, it's urgent", now())
        .await
        .unwrap();

    assert_eq!(parsed.source, ResultSource::Provider(ProviderId::OpenAi));
    assert_eq!(parsed.value.priority, TaskPriority::High);
    assert_eq!(parsed.value.tags.into_vec(), vec!["finance"]);
}

#[tokio::test]
async fn test_shared_orchestrator_serves_concurrent_calls() {
    let orchestrator = std::sync::Arc::new(ProviderOrchestrator::default());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .breakdown(&format!("Task number {i}"))
                    .await
                    .map(|steps| steps.value)
            })
        })
        .collect();

    for handle in handles {
        let steps = handle.await.unwrap().unwrap();
        assert!(!steps.is_empty());
    }
}
