//! Keyword Fallback Engine
//!
//! Deterministic, offline substitute for the remote providers. It answers
//! every capability from fixed English/Chinese phrase tables and never
//! fails, so the orchestrator always has a result to return. Outputs obey
//! the same invariants as provider outputs (non-empty title, deduplicated
//! tags, non-empty breakdown).
//!
//! Relative dates are resolved against the `now` carried by the request;
//! nothing here reads the system clock.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use regex::Regex;
use std::sync::LazyLock;

use super::capability::{
    CapabilityRequest, CapabilityResult, ParsedTaskDraft, PriorityRecommendation, SubtaskList,
    TagSet, TagSuggestion, title_with_description,
};
use crate::task::TaskPriority;

const UNTITLED: &str = "Untitled task";
const DEFAULT_TAG: &str = "work";

const HIGH_PRIORITY_KEYWORDS: &[&str] = &[
    "urgent",
    "important",
    "critical",
    "asap",
    "as soon as possible",
    "high priority",
    "priority high",
    "紧急",
    "重要",
    "很重要",
    "尽快",
    "立即",
    "必须",
    "优先级高",
    "高优先级",
];

const LOW_PRIORITY_KEYWORDS: &[&str] = &[
    "low priority",
    "priority low",
    "whenever",
    "optional",
    "leisure",
    "no rush",
    "不急",
    "有空",
    "随意",
    "休闲",
    "优先级低",
    "低优先级",
];

struct TagRule {
    keywords: &'static [&'static str],
    tags: &'static [&'static str],
}

const TAG_RULES: &[TagRule] = &[
    TagRule {
        keywords: &["meeting", "conference", "call", "会议", "开会"],
        tags: &["work", "meeting"],
    },
    TagRule {
        keywords: &["code", "coding", "programming", "program", "代码", "编程"],
        tags: &["work", "code"],
    },
    TagRule {
        keywords: &["review", "check", "审查", "检查"],
        tags: &["work", "review"],
    },
    TagRule {
        keywords: &["project", "项目"],
        tags: &["work", "project"],
    },
    TagRule {
        keywords: &["report", "报告"],
        tags: &["work", "report"],
    },
    TagRule {
        keywords: &[
            "work", "task", "develop", "design", "implement", "bug", "fix", "feature", "deploy",
            "testing", "document", "plan", "analysis", "工作", "任务", "开发", "设计",
        ],
        tags: &["work"],
    },
    TagRule {
        keywords: &[
            "learn", "study", "course", "homework", "exam", "training", "tutorial", "学习",
            "课程", "作业", "考试", "培训", "教程",
        ],
        tags: &["study"],
    },
    TagRule {
        keywords: &[
            "shopping", "buy", "purchase", "shop", "grocery", "groceries", "store", "购物", "买",
            "超市", "商店", "采购",
        ],
        tags: &["shopping"],
    },
    TagRule {
        keywords: &[
            "health", "exercise", "workout", "hospital", "doctor", "fitness", "gym", "健康",
            "运动", "锻炼", "医院", "医生", "健身",
        ],
        tags: &["health"],
    },
    TagRule {
        keywords: &[
            "personal", "life", "family", "friend", "social", "home", "个人", "生活", "家庭",
            "朋友", "社交",
        ],
        tags: &["personal"],
    },
    TagRule {
        keywords: &[
            "finance", "bill", "payment", "bank", "investment", "money", "财务", "账单", "支付",
            "银行", "投资",
        ],
        tags: &["finance"],
    },
    TagRule {
        keywords: &[
            "travel", "trip", "flight", "hotel", "vacation", "journey", "旅行", "旅游", "出差",
            "航班", "酒店",
        ],
        tags: &["travel"],
    },
];

const TRAILING_CONNECTORS: &[&str] = &["at", "in", "on", "for", "with", "by", "to", "and", "about"];

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static fallback pattern is valid")
}

// Applied in order; each match is replaced with a space.
static TITLE_CLEANUP: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b(please\s+)?(remind me to|remember to|don'?t forget to|make sure to|i need to|i have to)\b",
        r"(提醒我|记得|别忘了)",
        r"(?i)\b(it'?s|that'?s|this is)\s+(very\s+|really\s+|super\s+)?(important|urgent|critical)\b",
        r"(?i)\b(very\s+)?(urgent|important|critical|asap|high priority|low priority|priority (high|low)|no rush)\b",
        r"(优先级高|高优先级|很重要|重要|紧急|尽快|优先级低|低优先级|不急|有空再)",
        r"(?i)\b(at\s+|by\s+|around\s+)?\d{1,2}(:\d{2})?\s*[ap]\.?m\b\.?",
        r"(?i)\b(at\s+|by\s+|around\s+)?\d{1,2}:\d{2}\b",
        r"(上午|中午|下午|晚上)?\s*\d{1,2}点(\d{1,2}分|半)?",
        r"(?i)\b(on\s+|by\s+|due\s+)?(the day after tomorrow|day after tomorrow|today|tonight|tomorrow|next week|next (monday|tuesday|wednesday|thursday|friday|saturday|sunday|mon|tue|wed|thu|fri|sat|sun))\b",
        r"(今天|今晚|明天|后天|(本周|这周|下周)[一二三四五六日天]|下周)",
        r"[，,。.!！?？;；]",
    ]
    .into_iter()
    .map(compile)
    .collect()
});

static NEXT_WEEKDAY: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?i)\bnext\s+(monday|tuesday|wednesday|thursday|friday|saturday|sunday|mon|tue|wed|thu|fri|sat|sun)\b")
});

static CN_WEEKDAY: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(本周|这周|下周)([一二三四五六日天])"));

static MERIDIEM_TIME: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*([ap])\.?m\b"));

static CLOCK_TIME: LazyLock<Regex> = LazyLock::new(|| compile(r"\b(\d{1,2}):(\d{2})\b"));

static CN_TIME: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(上午|中午|下午|晚上)?\s*(\d{1,2})点(?:(\d{1,2})分|(半))?"));

/// Whether `keyword` occurs in the lowercased `haystack`.
///
/// ASCII keywords must start at a word boundary ("meetings" matches
/// "meeting", "recall" does not match "call"); CJK keywords match anywhere.
fn contains_keyword(haystack: &str, keyword: &str) -> bool {
    if !keyword.is_ascii() {
        return haystack.contains(keyword);
    }
    haystack.match_indices(keyword).any(|(idx, _)| {
        haystack[..idx]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_ascii_alphanumeric())
    })
}

fn contains_any(haystack: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| contains_keyword(haystack, k))
}

fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// Explicit priority signal in free text, if any
pub fn priority_signal(text: &str) -> Option<TaskPriority> {
    let content = text.to_lowercase();
    if contains_any(&content, HIGH_PRIORITY_KEYWORDS) {
        Some(TaskPriority::High)
    } else if contains_any(&content, LOW_PRIORITY_KEYWORDS) {
        Some(TaskPriority::Low)
    } else {
        None
    }
}

/// Tags from the vocabulary table, in table order
pub fn vocabulary_tags(text: &str) -> TagSet {
    let content = text.to_lowercase();
    TAG_RULES
        .iter()
        .filter(|rule| contains_any(&content, rule.keywords))
        .flat_map(|rule| rule.tags.iter().copied())
        .collect()
}

/// Strip reminders, urgency markers and date/time phrases to get a title
pub fn clean_title(text: &str) -> String {
    let mut title = text.to_string();
    for pattern in TITLE_CLEANUP.iter() {
        title = pattern.replace_all(&title, " ").into_owned();
    }

    let mut words: Vec<&str> = title.split_whitespace().collect();
    while words
        .last()
        .is_some_and(|w| TRAILING_CONNECTORS.contains(&w.to_lowercase().as_str()))
    {
        words.pop();
    }
    while words
        .first()
        .is_some_and(|w| matches!(w.to_lowercase().as_str(), "to" | "and"))
    {
        words.remove(0);
    }

    let joined = words.join(" ");
    let core = if joined.is_empty() {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    } else {
        joined
    };
    if core.is_empty() {
        return UNTITLED.to_string();
    }
    capitalize_first(&core)
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn weekday_from_name(name: &str) -> Option<Weekday> {
    match name.get(..3)?.to_lowercase().as_str() {
        "mon" => Some(Weekday::Mon),
        "tue" => Some(Weekday::Tue),
        "wed" => Some(Weekday::Wed),
        "thu" => Some(Weekday::Thu),
        "fri" => Some(Weekday::Fri),
        "sat" => Some(Weekday::Sat),
        "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

fn weekday_from_cn(c: &str) -> Option<Weekday> {
    match c {
        "一" => Some(Weekday::Mon),
        "二" => Some(Weekday::Tue),
        "三" => Some(Weekday::Wed),
        "四" => Some(Weekday::Thu),
        "五" => Some(Weekday::Fri),
        "六" => Some(Weekday::Sat),
        "日" | "天" => Some(Weekday::Sun),
        _ => None,
    }
}

fn relative_day(text: &str, lower: &str, today: NaiveDate) -> Option<NaiveDate> {
    let offset = |days: i64| today.checked_add_signed(Duration::days(days));
    let current = i64::from(today.weekday().num_days_from_monday());

    if contains_keyword(lower, "day after tomorrow") || text.contains("后天") {
        return offset(2);
    }
    if contains_keyword(lower, "tomorrow") || text.contains("明天") {
        return offset(1);
    }
    if contains_keyword(lower, "today")
        || contains_keyword(lower, "tonight")
        || text.contains("今天")
        || text.contains("今晚")
    {
        return offset(0);
    }
    if let Some(target) = NEXT_WEEKDAY
        .captures(lower)
        .and_then(|c| weekday_from_name(&c[1]))
    {
        let target = i64::from(target.num_days_from_monday());
        let delta = (target - current + 7) % 7;
        return offset(if delta == 0 { 7 } else { delta });
    }
    if contains_keyword(lower, "next week") {
        return offset(7);
    }
    if let Some(caps) = CN_WEEKDAY.captures(text) {
        if let Some(target) = weekday_from_cn(&caps[2]) {
            let target = i64::from(target.num_days_from_monday());
            let delta = if &caps[1] == "下周" {
                target - current + 7
            } else {
                (target - current).rem_euclid(7)
            };
            return offset(delta);
        }
    }
    if text.contains("下周") {
        return offset(7);
    }
    None
}

fn clock_time(text: &str, lower: &str) -> Option<NaiveTime> {
    if let Some(caps) = MERIDIEM_TIME.captures(lower) {
        let mut hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
        match &caps[3] {
            "p" if hour < 12 => hour += 12,
            "a" if hour == 12 => hour = 0,
            _ => {}
        }
        return NaiveTime::from_hms_opt(hour, minute, 0);
    }
    if let Some(caps) = CLOCK_TIME.captures(lower) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps[2].parse().ok()?;
        return NaiveTime::from_hms_opt(hour, minute, 0);
    }
    if let Some(caps) = CN_TIME.captures(text) {
        let mut hour: u32 = caps[2].parse().ok()?;
        let minute: u32 = match (caps.get(3), caps.get(4)) {
            (Some(m), _) => m.as_str().parse().ok()?,
            (None, Some(_)) => 30,
            (None, None) => 0,
        };
        // Bare hours default to the afternoon
        let morning = caps.get(1).is_some_and(|p| p.as_str() == "上午");
        if !morning && hour < 12 {
            hour += 12;
        }
        return NaiveTime::from_hms_opt(hour, minute, 0);
    }
    None
}

/// Resolve relative date and clock phrases against `now`.
///
/// A date without a time means end of day (23:59); a time without a date
/// means its next occurrence after `now`.
pub fn resolve_due_date(text: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let lower = text.to_lowercase();
    let date = relative_day(text, &lower, now.date());
    let time = clock_time(text, &lower);

    match (date, time) {
        (Some(date), Some(time)) => Some(date.and_time(time)),
        (Some(date), None) => date.and_hms_opt(23, 59, 0),
        (None, Some(time)) => {
            let today = now.date().and_time(time);
            if today > now {
                Some(today)
            } else {
                today.checked_add_signed(Duration::days(1))
            }
        }
        (None, None) => None,
    }
}

/// Offline rule-based engine used when every provider failed
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordFallbackEngine;

impl KeywordFallbackEngine {
    pub fn new() -> Self {
        Self
    }

    /// Answer any capability request; infallible by construction
    pub fn invoke(&self, request: &CapabilityRequest) -> CapabilityResult {
        match request {
            CapabilityRequest::ParseText { text, now } => {
                CapabilityResult::Parsed(self.parse_text(text, *now))
            }
            CapabilityRequest::SuggestTags { title, description } => {
                CapabilityResult::Tags(self.suggest_tags(title, description.as_deref()))
            }
            CapabilityRequest::Breakdown { description } => {
                CapabilityResult::Subtasks(self.breakdown(description))
            }
            CapabilityRequest::RecommendPriority { title, description } => {
                CapabilityResult::Priority(self.recommend_priority(title, description.as_deref()))
            }
        }
    }

    pub fn parse_text(&self, text: &str, now: NaiveDateTime) -> ParsedTaskDraft {
        ParsedTaskDraft {
            title: clean_title(text),
            description: None,
            priority: priority_signal(text).unwrap_or_default(),
            due_date: resolve_due_date(text, now),
            tags: vocabulary_tags(text),
        }
    }

    pub fn suggest_tags(&self, title: &str, description: Option<&str>) -> TagSuggestion {
        let tags = vocabulary_tags(&title_with_description(title, description));
        if tags.is_empty() {
            return [DEFAULT_TAG].into_iter().collect();
        }
        tags
    }

    /// Generic plan/execute/review steps; no real decomposition is possible offline
    pub fn breakdown(&self, description: &str) -> SubtaskList {
        let description = description.trim();
        let steps = if description.chars().any(is_cjk) {
            vec![
                format!("准备 {description}"),
                format!("执行 {description}"),
                format!("完成 {description}"),
            ]
        } else {
            vec![
                format!("Plan: {description}"),
                format!("Execute: {description}"),
                format!("Review: {description}"),
            ]
        };
        SubtaskList(steps)
    }

    pub fn recommend_priority(
        &self,
        title: &str,
        description: Option<&str>,
    ) -> PriorityRecommendation {
        let content = title_with_description(title, description);
        let (priority, rationale) = match priority_signal(&content) {
            Some(TaskPriority::High) => (
                TaskPriority::High,
                "Based on keywords: contains urgent/important words",
            ),
            Some(TaskPriority::Low) => (
                TaskPriority::Low,
                "Based on keywords: contains low priority words",
            ),
            _ => (
                TaskPriority::Medium,
                "Based on keywords: default medium priority",
            ),
        };
        PriorityRecommendation {
            priority,
            rationale: Some(rationale.to_string()),
        }
    }
}
