//! Output rendering for CLI commands
//!
//! Every renderer returns a `String` so commands only decide where it goes.

use serde::Serialize;
use serde_json::json;
use taskmind_core::{Task, TaskId};
use taskmind_core::llm::{
    Assisted, AttemptFailure, ParsedTaskDraft, PriorityRecommendation, ResultSource, SubtaskList,
    TagSuggestion,
};
use taskmind_storage::CreatedTask;

use crate::cli::{CliError, OutputFormat};

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

fn to_json<T: Serialize>(value: &T) -> Result<String, CliError> {
    serde_json::to_string_pretty(value).map_err(|e| CliError::OutputError(e.to_string()))
}

/// One line explaining where a result came from, when it was not the first provider
fn provenance(source: ResultSource, failures: &[AttemptFailure]) -> Option<String> {
    let failed: Vec<String> = failures
        .iter()
        .map(|f| format!("{} ({})", f.provider, f.reason))
        .collect();
    match source {
        ResultSource::Fallback if failed.is_empty() => {
            Some("Note: no AI provider configured, used keyword fallback".to_string())
        }
        ResultSource::Fallback => Some(format!(
            "Note: AI providers failed [{}], used keyword fallback",
            failed.join(", ")
        )),
        ResultSource::Provider(id) if !failed.is_empty() => Some(format!(
            "Note: answered by {id} after [{}] failed",
            failed.join(", ")
        )),
        ResultSource::Provider(_) => None,
    }
}

fn with_provenance(mut body: String, source: ResultSource, failures: &[AttemptFailure]) -> String {
    if let Some(note) = provenance(source, failures) {
        body.push('\n');
        body.push_str(&note);
    }
    body
}

fn pretty_task(task: &Task) -> String {
    let mut lines = vec![
        format!("[{}] {}", task.id, task.title),
        format!("  Status:   {}", task.status),
        format!("  Priority: {}", task.priority),
    ];
    if let Some(description) = &task.description {
        lines.push(format!("  Description: {description}"));
    }
    if !task.tags.is_empty() {
        lines.push(format!("  Tags:     {}", task.tags.join(", ")));
    }
    if let Some(due) = task.due_date {
        lines.push(format!("  Due:      {}", due.format(DATE_FORMAT)));
    }
    lines.join("\n")
}

fn minimal_task(task: &Task) -> String {
    format!("{}\t{}\t{}\t{}", task.id, task.status, task.priority, task.title)
}

pub fn render_task(task: &Task, format: OutputFormat) -> Result<String, CliError> {
    match format {
        OutputFormat::Pretty => Ok(pretty_task(task)),
        OutputFormat::Json => to_json(task),
        OutputFormat::Minimal => Ok(minimal_task(task)),
    }
}

pub fn render_tasks(tasks: &[Task], total: usize, format: OutputFormat) -> Result<String, CliError> {
    match format {
        OutputFormat::Pretty if tasks.is_empty() => Ok("No tasks.".to_string()),
        OutputFormat::Pretty => {
            let mut blocks: Vec<String> = tasks.iter().map(pretty_task).collect();
            blocks.push(format!("{} of {total} task(s)", tasks.len()));
            Ok(blocks.join("\n\n"))
        }
        OutputFormat::Json => to_json(&json!({"total": total, "tasks": tasks})),
        OutputFormat::Minimal => Ok(tasks.iter().map(minimal_task).collect::<Vec<_>>().join("\n")),
    }
}

pub fn render_created(created: &CreatedTask, format: OutputFormat) -> Result<String, CliError> {
    match format {
        OutputFormat::Json => to_json(&json!({
            "task": created.task,
            "parse_source": created.parse_source,
            "tags_source": created.tags_source,
            "degraded": created.is_degraded(),
            "failures": created.failures,
        })),
        OutputFormat::Minimal => Ok(created.task.id.to_string()),
        OutputFormat::Pretty => {
            let body = format!("Created task\n{}", pretty_task(&created.task));
            let source = if created.is_degraded() {
                ResultSource::Fallback
            } else {
                created.parse_source
            };
            Ok(with_provenance(body, source, &created.failures))
        }
    }
}

pub fn render_deleted(id: &TaskId) -> Result<String, CliError> {
    to_json(&json!({"deleted": id}))
}

pub fn render_search(results: &[(Task, f32)], format: OutputFormat) -> Result<String, CliError> {
    match format {
        OutputFormat::Pretty if results.is_empty() => Ok("No matching tasks.".to_string()),
        OutputFormat::Pretty => Ok(results
            .iter()
            .map(|(task, score)| format!("{score:.2}  {}", pretty_task(task)))
            .collect::<Vec<_>>()
            .join("\n\n")),
        OutputFormat::Json => {
            let hits: Vec<_> = results
                .iter()
                .map(|(task, score)| json!({"score": score, "task": task}))
                .collect();
            to_json(&hits)
        }
        OutputFormat::Minimal => Ok(results
            .iter()
            .map(|(task, score)| format!("{score:.3}\t{}", minimal_task(task)))
            .collect::<Vec<_>>()
            .join("\n")),
    }
}

fn assisted_json<T: Serialize>(assisted: &Assisted<T>) -> Result<String, CliError> {
    to_json(&json!({
        "value": assisted.value,
        "source": assisted.source,
        "degraded": assisted.is_degraded(),
        "failures": assisted.failures,
    }))
}

pub fn render_draft(
    draft: &Assisted<ParsedTaskDraft>,
    format: OutputFormat,
) -> Result<String, CliError> {
    let value = &draft.value;
    match format {
        OutputFormat::Json => assisted_json(draft),
        OutputFormat::Minimal => Ok(value.title.clone()),
        OutputFormat::Pretty => {
            let mut lines = vec![
                format!("Title:    {}", value.title),
                format!("Priority: {}", value.priority),
            ];
            if let Some(description) = &value.description {
                lines.push(format!("Description: {description}"));
            }
            if let Some(due) = value.due_date {
                lines.push(format!("Due:      {}", due.format(DATE_FORMAT)));
            }
            if !value.tags.is_empty() {
                lines.push(format!("Tags:     {}", value.tags.iter().collect::<Vec<_>>().join(", ")));
            }
            Ok(with_provenance(lines.join("\n"), draft.source, &draft.failures))
        }
    }
}

pub fn render_tags(tags: &Assisted<TagSuggestion>, format: OutputFormat) -> Result<String, CliError> {
    let joined = tags.value.iter().collect::<Vec<_>>().join(", ");
    match format {
        OutputFormat::Json => assisted_json(tags),
        OutputFormat::Minimal => Ok(joined),
        OutputFormat::Pretty => Ok(with_provenance(
            format!("Tags: {joined}"),
            tags.source,
            &tags.failures,
        )),
    }
}

pub fn render_subtasks(
    steps: &Assisted<SubtaskList>,
    format: OutputFormat,
) -> Result<String, CliError> {
    match format {
        OutputFormat::Json => assisted_json(steps),
        OutputFormat::Minimal => Ok(steps.value.steps().join("\n")),
        OutputFormat::Pretty => {
            let body = steps
                .value
                .steps()
                .iter()
                .enumerate()
                .map(|(i, step)| format!("{}. {step}", i + 1))
                .collect::<Vec<_>>()
                .join("\n");
            Ok(with_provenance(body, steps.source, &steps.failures))
        }
    }
}

pub fn render_priority(
    rec: &Assisted<PriorityRecommendation>,
    format: OutputFormat,
) -> Result<String, CliError> {
    match format {
        OutputFormat::Json => assisted_json(rec),
        OutputFormat::Minimal => Ok(rec.value.priority.to_string()),
        OutputFormat::Pretty => {
            let mut body = format!("Priority: {}", rec.value.priority);
            if let Some(rationale) = &rec.value.rationale {
                body.push_str(&format!("\nReason:   {rationale}"));
            }
            Ok(with_provenance(body, rec.source, &rec.failures))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use taskmind_core::NewTask;
    use taskmind_core::llm::{FailureReason, ProviderId};

    fn failure(provider: ProviderId, reason: FailureReason) -> AttemptFailure {
        AttemptFailure {
            provider,
            reason,
            message: "boom".to_string(),
        }
    }

    #[test]
    fn test_provenance_notes() {
        assert_eq!(provenance(ResultSource::Provider(ProviderId::OpenAi), &[]), None);

        let note = provenance(ResultSource::Fallback, &[]).unwrap();
        assert!(note.contains("no AI provider configured"));

        let note = provenance(
            ResultSource::Fallback,
            &[failure(ProviderId::OpenAi, FailureReason::AuthError)],
        )
        .unwrap();
        assert!(note.contains("openai (auth_error)"));

        let note = provenance(
            ResultSource::Provider(ProviderId::Gemini),
            &[failure(ProviderId::OpenAi, FailureReason::Timeout)],
        )
        .unwrap();
        assert!(note.contains("answered by gemini"));
    }

    #[test]
    fn test_render_task_formats() {
        let mut input = NewTask::new("Pay rent");
        input.tags = vec!["finance".to_string()];
        let task = input.into_task(Utc::now()).unwrap();

        let pretty = render_task(&task, OutputFormat::Pretty).unwrap();
        assert!(pretty.contains("Pay rent"));
        assert!(pretty.contains("Tags:     finance"));

        let json: serde_json::Value =
            serde_json::from_str(&render_task(&task, OutputFormat::Json).unwrap()).unwrap();
        assert_eq!(json["title"], "Pay rent");
        assert_eq!(json["status"], "pending");

        let minimal = render_task(&task, OutputFormat::Minimal).unwrap();
        assert_eq!(minimal, format!("{}\tpending\tmedium\tPay rent", task.id));
    }

    #[test]
    fn test_render_subtasks_marks_fallback() {
        let steps = Assisted {
            value: SubtaskList(vec!["Plan: move".to_string(), "Execute: move".to_string()]),
            source: ResultSource::Fallback,
            failures: Vec::new(),
        };
        let pretty = render_subtasks(&steps, OutputFormat::Pretty).unwrap();
        assert!(pretty.starts_with("1. Plan: move\n2. Execute: move"));
        assert!(pretty.contains("keyword fallback"));

        let json: serde_json::Value =
            serde_json::from_str(&render_subtasks(&steps, OutputFormat::Json).unwrap()).unwrap();
        assert_eq!(json["degraded"], true);
        assert_eq!(json["value"][0], "Plan: move");
    }

    #[test]
    fn test_render_empty_list() {
        assert_eq!(
            render_tasks(&[], 0, OutputFormat::Pretty).unwrap(),
            "No tasks."
        );
        assert_eq!(render_tasks(&[], 0, OutputFormat::Minimal).unwrap(), "");
    }
}
