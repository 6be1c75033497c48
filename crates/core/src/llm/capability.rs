//! Capability requests and results shared by every backend
//!
//! A [`CapabilityRequest`] is what callers hand to the orchestrator; each
//! backend answers with the matching [`CapabilityResult`] variant.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::task::TaskPriority;

/// The AI-backed operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ParseText,
    SuggestTags,
    Breakdown,
    RecommendPriority,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ParseText => "parse_text",
            Capability::SuggestTags => "suggest_tags",
            Capability::Breakdown => "breakdown",
            Capability::RecommendPriority => "recommend_priority",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload for one capability invocation
#[derive(Debug, Clone, PartialEq)]
pub enum CapabilityRequest {
    /// Free text plus the ambient "now" used for relative dates
    ParseText { text: String, now: NaiveDateTime },
    SuggestTags {
        title: String,
        description: Option<String>,
    },
    Breakdown { description: String },
    RecommendPriority {
        title: String,
        description: Option<String>,
    },
}

impl CapabilityRequest {
    pub fn capability(&self) -> Capability {
        match self {
            CapabilityRequest::ParseText { .. } => Capability::ParseText,
            CapabilityRequest::SuggestTags { .. } => Capability::SuggestTags,
            CapabilityRequest::Breakdown { .. } => Capability::Breakdown,
            CapabilityRequest::RecommendPriority { .. } => Capability::RecommendPriority,
        }
    }

    /// The primary text of the request; empty means nothing to work with
    pub fn primary_text(&self) -> &str {
        match self {
            CapabilityRequest::ParseText { text, .. } => text,
            CapabilityRequest::SuggestTags { title, .. } => title,
            CapabilityRequest::Breakdown { description } => description,
            CapabilityRequest::RecommendPriority { title, .. } => title,
        }
    }
}

/// Join title and optional description the way every prompt expects them
pub(crate) fn title_with_description(title: &str, description: Option<&str>) -> String {
    match description.map(str::trim).filter(|d| !d.is_empty()) {
        Some(description) => format!("{title}. {description}"),
        None => title.to_string(),
    }
}

/// Ordered labels, deduplicated case-insensitively.
///
/// The first spelling of a label wins, so display casing is preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct TagSet(Vec<String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a label; returns false when it was blank or already present
    pub fn insert(&mut self, label: impl AsRef<str>) -> bool {
        let label = label.as_ref().trim();
        if label.is_empty() || self.contains(label) {
            return false;
        }
        self.0.push(label.to_string());
        true
    }

    pub fn contains(&self, label: &str) -> bool {
        let needle = label.trim().to_lowercase();
        self.0.iter().any(|existing| existing.to_lowercase() == needle)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl<S: AsRef<str>> FromIterator<S> for TagSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut tags = TagSet::new();
        for label in iter {
            tags.insert(label);
        }
        tags
    }
}

impl<S: AsRef<str>> Extend<S> for TagSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for label in iter {
            self.insert(label);
        }
    }
}

impl From<Vec<String>> for TagSet {
    fn from(labels: Vec<String>) -> Self {
        labels.into_iter().collect()
    }
}

impl From<TagSet> for Vec<String> {
    fn from(tags: TagSet) -> Self {
        tags.0
    }
}

/// Result of tag suggestion
pub type TagSuggestion = TagSet;

/// Result of ParseText
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedTaskDraft {
    /// Never empty
    pub title: String,
    pub description: Option<String>,
    pub priority: TaskPriority,
    pub due_date: Option<NaiveDateTime>,
    pub tags: TagSet,
}

/// Ordered decomposition of one parent task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubtaskList(pub Vec<String>);

impl SubtaskList {
    pub fn steps(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityRecommendation {
    pub priority: TaskPriority,
    pub rationale: Option<String>,
}

/// Payload produced by a backend, one variant per [`Capability`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CapabilityResult {
    Parsed(ParsedTaskDraft),
    Tags(TagSuggestion),
    Subtasks(SubtaskList),
    Priority(PriorityRecommendation),
}

impl CapabilityResult {
    pub fn capability(&self) -> Capability {
        match self {
            CapabilityResult::Parsed(_) => Capability::ParseText,
            CapabilityResult::Tags(_) => Capability::SuggestTags,
            CapabilityResult::Subtasks(_) => Capability::Breakdown,
            CapabilityResult::Priority(_) => Capability::RecommendPriority,
        }
    }
}
