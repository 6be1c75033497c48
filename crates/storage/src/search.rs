//! Task search index
//!
//! [`SearchIndex`] is the seam for semantic search backends. The bundled
//! [`KeywordIndex`] ranks tasks by cosine similarity of term-frequency
//! vectors: ASCII words plus CJK unigrams and bigrams, so both English and
//! Chinese queries match.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use taskmind_core::{Task, TaskId};

use crate::trait_::{Result, StorageError};

/// One ranked match
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub task_id: TaskId,
    /// Similarity in (0, 1]
    pub score: f32,
}

/// Search index over task text
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Add or refresh a task
    async fn upsert(&self, task: &Task) -> Result<()>;
    async fn remove(&self, task_id: &TaskId) -> Result<()>;
    /// Best matches first, at most `top_k`
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>>;
}

type TermVector = HashMap<String, f32>;

fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// Split text into index terms
fn terms(text: &str) -> Vec<String> {
    let mut terms = Vec::new();
    let mut word = String::new();
    let mut previous_cjk: Option<char> = None;

    for c in text.chars().flat_map(char::to_lowercase) {
        if is_cjk(c) {
            if !word.is_empty() {
                terms.push(std::mem::take(&mut word));
            }
            terms.push(c.to_string());
            if let Some(prev) = previous_cjk {
                terms.push(format!("{prev}{c}"));
            }
            previous_cjk = Some(c);
            continue;
        }
        previous_cjk = None;
        if c.is_alphanumeric() {
            word.push(c);
        } else if !word.is_empty() {
            terms.push(std::mem::take(&mut word));
        }
    }
    if !word.is_empty() {
        terms.push(word);
    }
    terms
}

fn vectorize(text: &str) -> TermVector {
    let mut vector = TermVector::new();
    for term in terms(text) {
        *vector.entry(term).or_insert(0.0) += 1.0;
    }
    vector
}

fn norm(vector: &TermVector) -> f32 {
    vector.values().map(|w| w * w).sum::<f32>().sqrt()
}

fn cosine(a: &TermVector, b: &TermVector) -> f32 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let dot: f32 = small
        .iter()
        .filter_map(|(term, w)| large.get(term).map(|v| w * v))
        .sum();
    let denominator = norm(a) * norm(b);
    if denominator == 0.0 {
        0.0
    } else {
        dot / denominator
    }
}

/// In-process keyword index
#[derive(Debug, Default)]
pub struct KeywordIndex {
    vectors: RwLock<HashMap<TaskId, TermVector>>,
}

impl KeywordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.vectors.read().map(|v| v.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::LockFailed(e.to_string())
}

#[async_trait]
impl SearchIndex for KeywordIndex {
    async fn upsert(&self, task: &Task) -> Result<()> {
        let vector = vectorize(&task.searchable_text());
        self.vectors.write().map_err(poisoned)?.insert(task.id, vector);
        Ok(())
    }

    async fn remove(&self, task_id: &TaskId) -> Result<()> {
        self.vectors.write().map_err(poisoned)?.remove(task_id);
        Ok(())
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        let query = vectorize(query);
        if query.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let vectors = self.vectors.read().map_err(poisoned)?;
        let mut hits: Vec<SearchHit> = vectors
            .iter()
            .map(|(task_id, vector)| SearchHit {
                task_id: *task_id,
                score: cosine(&query, vector),
            })
            .filter(|hit| hit.score > 0.0)
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.task_id.0.cmp(&b.task_id.0))
        });
        hits.truncate(top_k);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use taskmind_core::NewTask;

    fn task(title: &str, description: Option<&str>) -> Task {
        let mut input = NewTask::new(title);
        input.description = description.map(str::to_string);
        input.into_task(Utc::now()).unwrap()
    }

    #[test]
    fn test_terms_mix_scripts() {
        assert_eq!(
            terms("Review 代码 now"),
            vec!["review", "代", "码", "代码", "now"]
        );
    }

    #[tokio::test]
    async fn test_ranks_best_match_first() {
        let index = KeywordIndex::new();
        let report = task("Write quarterly report", Some("finance numbers"));
        let groceries = task("Buy groceries", None);
        let review = task("Review the report draft", None);
        for t in [&report, &groceries, &review] {
            index.upsert(t).await.unwrap();
        }

        let hits = index.search("quarterly report", 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].task_id, report.id);
        assert!(hits[0].score > hits[1].score);

        let hits = index.search("report", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_chinese_query() {
        let index = KeywordIndex::new();
        let meeting = task("明天开会", Some("讨论项目进度"));
        index.upsert(&meeting).await.unwrap();
        index.upsert(&task("买菜", None)).await.unwrap();

        let hits = index.search("项目会议", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].task_id, meeting.id);
    }

    #[tokio::test]
    async fn test_remove_and_empty_query() {
        let index = KeywordIndex::new();
        let t = task("Call the bank", None);
        index.upsert(&t).await.unwrap();
        assert!(index.search("   ", 5).await.unwrap().is_empty());

        index.remove(&t.id).await.unwrap();
        assert!(index.is_empty());
        assert!(index.search("bank", 5).await.unwrap().is_empty());
    }
}
