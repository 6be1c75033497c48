//! Prompt text shared by the remote adapters

use chrono::NaiveDateTime;
use serde_json::{Value, json};

use crate::llm::capability::title_with_description;

pub(crate) const TAGS_SYSTEM: &str = "You are a task classification assistant. Suggest tags for the task.

Rules:
1. Return 2-4 of the most relevant tags
2. Tags are short (one or two words, or 1-4 Chinese characters)
3. Prefer common categories such as work, study, life, shopping, health, social, finance, family
4. Answer in the language of the task
5. Return only a JSON array, for example [\"work\", \"meeting\"]

Do not add any explanation.";

pub(crate) const BREAKDOWN_SYSTEM: &str = "You are a task planning assistant. Break a complex task into actionable subtasks.

Rules:
1. Every subtask is concrete and actionable, phrased as an imperative
2. Between 3 and 7 subtasks
3. Ordered by execution sequence
4. Answer in the language of the task
5. Return only a JSON array, for example [\"subtask 1\", \"subtask 2\"]

Do not add any explanation.";

pub(crate) const PRIORITY_SYSTEM: &str = "You are a task priority assistant. Recommend a priority for the task.

Criteria:
- high: urgent and important, has a firm deadline, affects other people, core work
- medium: important but not urgent, routine work, personal development
- low: neither urgent nor important, leisure, can be postponed

Return only JSON: {\"priority\": \"low|medium|high\", \"reasoning\": \"short justification\"}";

const PARSE_FORMAT: &str = "Return only JSON in this shape, without any explanation:
{
  \"title\": \"task title\",
  \"description\": \"task description (optional)\",
  \"priority\": \"low|medium|high\",
  \"due_date\": \"ISO 8601 local date-time (optional)\",
  \"tags\": [\"tag1\", \"tag2\"]
}";

/// System prompt for natural-language parsing, anchored at `now`
pub(crate) fn parse_system(now: NaiveDateTime) -> String {
    format!(
        "You are a task parsing assistant. Extract task information from the user's text.

The current local date-time is: {now} ({weekday})

Date rules (English or Chinese input):
- \"today\" / \"今天\" = the current date
- \"tomorrow\" / \"明天\" = current date + 1 day
- \"day after tomorrow\" / \"后天\" = current date + 2 days
- \"next monday\" / \"下周一\" = the next Monday
- \"3点\" = 15:00 (afternoon by default), \"上午9点\" = 09:00, \"3pm\" = 15:00
- due_date is a local ISO 8601 date-time without timezone, e.g. 2026-02-01T15:00:00

Priority rules:
- mentions urgent, important, critical, asap, 紧急, 重要, 高优先级, 尽快 -> high
- mentions low priority, whenever, 低优先级, 不急, 有空再 -> low
- otherwise -> medium

The title is the core action without reminders, dates or urgency words.
Extract only what the user said; do not invent details.",
        now = now.format("%Y-%m-%dT%H:%M:%S"),
        weekday = now.format("%A"),
    )
}

/// Parse prompt for backends without function calling
pub(crate) fn parse_system_json(now: NaiveDateTime) -> String {
    format!("{}\n\n{PARSE_FORMAT}", parse_system(now))
}

/// JSON schema of the `create_task` function used for forced tool calls
pub(crate) fn create_task_tool() -> Value {
    json!({
        "type": "function",
        "function": {
            "name": "create_task",
            "description": "Extract task information from a natural-language description",
            "parameters": {
                "type": "object",
                "properties": {
                    "title": {"type": "string", "description": "Task title"},
                    "description": {"type": "string", "description": "Task description"},
                    "priority": {"type": "string", "enum": ["low", "medium", "high"]},
                    "due_date": {"type": "string", "description": "Local ISO 8601 date-time"},
                    "tags": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["title"]
            }
        }
    })
}

pub(crate) fn tags_user(title: &str, description: Option<&str>) -> String {
    format!("Task: {}", title_with_description(title, description))
}

pub(crate) fn breakdown_user(description: &str) -> String {
    format!("Break down this task: {description}")
}

pub(crate) fn priority_user(title: &str, description: Option<&str>) -> String {
    format!("Task: {}", title_with_description(title, description))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_parse_system_carries_now() {
        let now = NaiveDate::from_ymd_opt(2026, 1, 31)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let prompt = parse_system(now);
        assert!(prompt.contains("2026-01-31T00:00:00"));
        assert!(prompt.contains("Saturday"));
        assert!(parse_system_json(now).contains("\"due_date\""));
    }
}
