//! Defensive parsing of free-form model replies
//!
//! Models wrap JSON in markdown fences, return numbered lists instead of
//! arrays, or drop fields. Anything that cannot produce a complete result
//! is a [`ProviderError::MalformedResponse`]; partial successes are never
//! returned.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use super::ProviderError;
use crate::llm::capability::{ParsedTaskDraft, PriorityRecommendation, SubtaskList, TagSet};
use crate::task::TaskPriority;

const MAX_QUOTED_TAGS: usize = 4;
const MAX_LINE_SUBTASKS: usize = 7;

static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)""#).expect("quoted-string pattern is valid"));

/// Remove a surrounding markdown code fence, if any
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the info string ("json", "JSON", ...) on the opening line
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}

fn parse_json(text: &str) -> Option<Value> {
    serde_json::from_str(strip_code_fence(text)).ok()
}

fn string_items(values: &[Value]) -> Vec<String> {
    values
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Accept `[..]` or `{"<key>": [..]}`; any other JSON shape is malformed
fn json_list(value: &Value, key: &str) -> Result<Vec<String>, ProviderError> {
    match value {
        Value::Array(items) => Ok(string_items(items)),
        Value::Object(map) => map
            .get(key)
            .and_then(Value::as_array)
            .map(|a| string_items(a))
            .ok_or_else(|| {
                ProviderError::malformed(format!("reply object has no \"{key}\" list"))
            }),
        other => Err(ProviderError::malformed(format!(
            "expected a JSON list of {key}, got {other}"
        ))),
    }
}

/// Parse a model-produced due date.
///
/// Accepts local ISO date-times, RFC 3339 with an offset (kept as the local
/// wall-clock time) and bare dates, which mean end of day.
pub(crate) fn parse_due_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    const FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];
    if let Some(parsed) = FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    {
        return Some(parsed);
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.naive_local());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(23, 59, 0))
}

/// Parse a task draft from a JSON object (tool-call arguments or reply text)
pub(crate) fn parse_draft(text: &str) -> Result<ParsedTaskDraft, ProviderError> {
    let value =
        parse_json(text).ok_or_else(|| ProviderError::malformed("task draft is not valid JSON"))?;
    let object = value
        .as_object()
        .ok_or_else(|| ProviderError::malformed("task draft is not a JSON object"))?;

    let title = object
        .get("title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ProviderError::malformed("task draft has no title"))?
        .to_string();

    let description = object
        .get("description")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);

    let priority = object
        .get("priority")
        .and_then(Value::as_str)
        .and_then(TaskPriority::normalize)
        .unwrap_or_default();

    let due_date = match object.get("due_date") {
        None | Some(Value::Null) => None,
        Some(Value::String(raw)) if raw.trim().is_empty() => None,
        Some(Value::String(raw)) => Some(
            parse_due_date(raw)
                .ok_or_else(|| ProviderError::malformed(format!("unparsable due_date: {raw}")))?,
        ),
        Some(other) => {
            return Err(ProviderError::malformed(format!(
                "due_date has unexpected type: {other}"
            )));
        }
    };

    let tags: TagSet = match object.get("tags") {
        Some(Value::Array(items)) => string_items(items).into_iter().collect(),
        Some(Value::String(joined)) => joined.split([',', '，']).collect(),
        _ => TagSet::new(),
    };

    Ok(ParsedTaskDraft {
        title,
        description,
        priority,
        due_date,
        tags,
    })
}

/// Parse suggested tags: JSON array first, then quoted strings
pub(crate) fn parse_tags(text: &str) -> Result<TagSet, ProviderError> {
    let tags: TagSet = match parse_json(text) {
        Some(value) => json_list(&value, "tags")?.into_iter().collect(),
        None => QUOTED
            .captures_iter(text)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str())
            .take(MAX_QUOTED_TAGS)
            .collect(),
    };

    if tags.is_empty() {
        return Err(ProviderError::malformed("no tags in reply"));
    }
    Ok(tags)
}

/// Parse subtasks: JSON array first, then one step per non-empty line
pub(crate) fn parse_subtasks(text: &str) -> Result<SubtaskList, ProviderError> {
    let steps = match parse_json(text) {
        Some(value) => json_list(&value, "subtasks")?,
        None => strip_code_fence(text)
            .lines()
            .map(|line| {
                line.trim()
                    .trim_start_matches(|c: char| {
                        c.is_ascii_digit() || matches!(c, '.' | '-' | ')' | '*' | '•' | ' ')
                    })
                    .trim()
            })
            .filter(|line| !line.is_empty())
            .take(MAX_LINE_SUBTASKS)
            .map(str::to_string)
            .collect(),
    };

    if steps.is_empty() {
        return Err(ProviderError::malformed("no subtasks in reply"));
    }
    Ok(SubtaskList(steps))
}

/// Parse `{"priority": .., "reasoning": ..}`
pub(crate) fn parse_priority(text: &str) -> Result<PriorityRecommendation, ProviderError> {
    let value = parse_json(text)
        .ok_or_else(|| ProviderError::malformed("priority reply is not valid JSON"))?;

    let raw = value["priority"]
        .as_str()
        .ok_or_else(|| ProviderError::malformed("priority reply has no priority"))?;
    let priority = TaskPriority::normalize(raw)
        .ok_or_else(|| ProviderError::malformed(format!("unrecognised priority: {raw}")))?;

    let rationale = value["reasoning"]
        .as_str()
        .or_else(|| value["rationale"].as_str())
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string);

    Ok(PriorityRecommendation {
        priority,
        rationale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::FailureReason;

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n[\"a\"]\n```"), "[\"a\"]");
        assert_eq!(strip_code_fence("  [\"a\"]  "), "[\"a\"]");
        assert_eq!(strip_code_fence("```\n{}\n```\n"), "{}");
    }

    #[test]
    fn test_parse_draft_full() {
        let draft = parse_draft(
            r#"{"title": "开会", "priority": "高", "due_date": "2026-02-01T15:00:00", "tags": ["工作", "会议", "工作"]}"#,
        )
        .unwrap();
        assert_eq!(draft.title, "开会");
        assert_eq!(draft.priority, TaskPriority::High);
        assert_eq!(
            draft.due_date,
            NaiveDate::from_ymd_opt(2026, 2, 1).unwrap().and_hms_opt(15, 0, 0)
        );
        assert_eq!(draft.tags.len(), 2);
        assert_eq!(draft.description, None);
    }

    #[test]
    fn test_parse_draft_defaults_priority() {
        let draft = parse_draft(r#"{"title": "Water plants", "priority": "whenever"}"#).unwrap();
        assert_eq!(draft.priority, TaskPriority::Medium);
        assert!(draft.tags.is_empty());
    }

    #[test]
    fn test_parse_draft_rejects_missing_title() {
        let err = parse_draft(r#"{"title": "  ", "priority": "high"}"#).unwrap_err();
        assert_eq!(err.reason(), FailureReason::MalformedResponse);
        let err = parse_draft("Sure! Here is your task").unwrap_err();
        assert_eq!(err.reason(), FailureReason::MalformedResponse);
    }

    #[test]
    fn test_parse_draft_rejects_bad_due_date() {
        let err = parse_draft(r#"{"title": "Call mom", "due_date": "next-ish"}"#).unwrap_err();
        assert_eq!(err.reason(), FailureReason::MalformedResponse);
    }

    #[test]
    fn test_parse_due_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap().and_hms_opt(15, 0, 0);
        assert_eq!(parse_due_date("2026-02-01T15:00:00"), expected);
        assert_eq!(parse_due_date("2026-02-01T15:00"), expected);
        assert_eq!(parse_due_date("2026-02-01T15:00:00+08:00"), expected);
        assert_eq!(
            parse_due_date("2026-02-01"),
            NaiveDate::from_ymd_opt(2026, 2, 1).unwrap().and_hms_opt(23, 59, 0)
        );
        assert_eq!(parse_due_date("soon"), None);
    }

    #[test]
    fn test_parse_tags_fallbacks() {
        let tags = parse_tags("```json\n[\"Work\", \"Meeting\"]\n```").unwrap();
        assert_eq!(tags.into_vec(), vec!["Work", "Meeting"]);

        let tags = parse_tags(r#"Tags: "a", "b", "c", "d", "e""#).unwrap();
        assert_eq!(tags.len(), 4);

        let err = parse_tags("[]").unwrap_err();
        assert_eq!(err.reason(), FailureReason::MalformedResponse);
    }

    #[test]
    fn test_parse_tags_rejects_object_without_tags() {
        let err = parse_tags(r#"{"labels": ["work", "meeting"]}"#).unwrap_err();
        assert_eq!(err.reason(), FailureReason::MalformedResponse);

        let tags = parse_tags(r#"{"tags": ["work", "meeting"]}"#).unwrap();
        assert_eq!(tags.into_vec(), vec!["work", "meeting"]);

        let err = parse_tags("42").unwrap_err();
        assert_eq!(err.reason(), FailureReason::MalformedResponse);
    }

    #[test]
    fn test_parse_subtasks_rejects_object_without_subtasks() {
        let err = parse_subtasks(r#"{"steps": ["Collect receipts", "Submit"]}"#).unwrap_err();
        assert_eq!(err.reason(), FailureReason::MalformedResponse);

        let err = parse_subtasks("```json\n{\"subtasks\": \"Collect receipts\"}\n```").unwrap_err();
        assert_eq!(err.reason(), FailureReason::MalformedResponse);

        let steps = parse_subtasks(r#"{"subtasks": ["Collect receipts", "Submit"]}"#).unwrap();
        assert_eq!(steps.steps(), ["Collect receipts", "Submit"]);
    }

    #[test]
    fn test_parse_subtasks_numbered_lines() {
        let steps = parse_subtasks("1. Gather requirements\n2) Draft design\n\n- Review").unwrap();
        assert_eq!(
            steps.steps(),
            ["Gather requirements", "Draft design", "Review"]
        );
    }

    #[test]
    fn test_parse_priority() {
        let rec = parse_priority(r#"{"priority": "HIGH", "reasoning": "deadline tomorrow"}"#).unwrap();
        assert_eq!(rec.priority, TaskPriority::High);
        assert_eq!(rec.rationale.as_deref(), Some("deadline tomorrow"));

        let err = parse_priority(r#"{"priority": "soonish"}"#).unwrap_err();
        assert_eq!(err.reason(), FailureReason::MalformedResponse);
    }
}
