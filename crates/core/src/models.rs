use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CorpusEntry {
    #[serde(default)]
    pub id: String,
    pub title: String,
    pub url: String,
    pub body: String,
    pub source: String,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoreBreakdown {
    pub keyword: f64,
    pub vector: f64,
    pub fusion: f64,
    pub freshness: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub source: String,
    /// Always within `[0.0, 1.0]`.
    pub relevance: f64,
    pub published_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explain: Option<ScoreBreakdown>,
}

impl Document {
    pub fn relevance_percent(&self) -> u8 {
        relevance_percent(self.relevance)
    }

    pub fn tier(&self) -> RelevanceTier {
        RelevanceTier::from_relevance(self.relevance)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultSet {
    pub query: String,
    pub page: usize,
    pub page_size: usize,
    pub total_candidates: usize,
    pub documents: Vec<Document>,
}

impl ResultSet {
    pub fn empty(query: impl Into<String>, page: usize, page_size: usize) -> Self {
        Self {
            query: query.into(),
            page,
            page_size,
            total_candidates: 0,
            documents: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn has_more(&self) -> bool {
        self.page.saturating_mul(self.page_size) < self.total_candidates
    }

    pub fn mean_relevance(&self) -> f64 {
        mean_relevance(&self.documents)
    }

    /// Distinct source names in rank order.
    pub fn sources(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.documents
            .iter()
            .filter(|doc| seen.insert(doc.source.as_str()))
            .map(|doc| doc.source.clone())
            .collect()
    }

    pub fn contains_source(&self, source: &str) -> bool {
        self.documents.iter().any(|doc| doc.source == source)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.documents.iter().map(|doc| doc.id.as_str()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Summary {
    pub text: String,
    /// Cited source names in first-cited order, without duplicates.
    pub sources: Vec<String>,
    pub confidence: f64,
    pub analyzed_count: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DialogueTurn {
    pub id: Uuid,
    pub role: Role,
    pub body: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
    /// Set on assistant turns that report a failed, retryable reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl DialogueTurn {
    pub fn user(body: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::User,
            body: body.into(),
            created_at,
            sources: None,
            failure: None,
        }
    }

    pub fn assistant(
        body: impl Into<String>,
        sources: Vec<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::Assistant,
            body: body.into(),
            created_at,
            sources: if sources.is_empty() { None } else { Some(sources) },
            failure: None,
        }
    }

    pub fn failed(reason: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        let reason = reason.into();
        Self {
            id: Uuid::new_v4(),
            role: Role::Assistant,
            body: format!("The reply could not be generated ({reason}). Send retry to try again."),
            created_at,
            sources: None,
            failure: Some(reason),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }

    pub fn cited_sources(&self) -> &[String] {
        self.sources.as_deref().unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportSnapshot {
    pub query: String,
    pub documents: Vec<Document>,
    pub summary: Option<Summary>,
    pub generated_at: DateTime<Utc>,
}

impl ExportSnapshot {
    pub fn mean_relevance(&self) -> f64 {
        mean_relevance(&self.documents)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RelevanceTier {
    High,
    Medium,
    Moderate,
}

impl RelevanceTier {
    pub fn from_relevance(relevance: f64) -> Self {
        if relevance >= 0.9 {
            RelevanceTier::High
        } else if relevance >= 0.8 {
            RelevanceTier::Medium
        } else {
            RelevanceTier::Moderate
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RelevanceTier::High => "highly relevant",
            RelevanceTier::Medium => "relevant",
            RelevanceTier::Moderate => "moderately relevant",
        }
    }
}

/// Relevance rendered as a whole percentage, shared by every output format.
pub fn relevance_percent(relevance: f64) -> u8 {
    (relevance.clamp(0.0, 1.0) * 100.0).round() as u8
}

pub fn mean_relevance(documents: &[Document]) -> f64 {
    if documents.is_empty() {
        return 0.0;
    }
    documents.iter().map(|doc| doc.relevance).sum::<f64>() / documents.len() as f64
}

#[derive(Debug, Clone)]
pub struct RankingOptions {
    pub page_size: usize,
    pub keyword_weight: f64,
    pub vector_weight: f64,
    pub freshness_weight: f64,
    pub rrf_k: f64,
    pub min_similarity: f64,
    pub freshness_half_life_days: f64,
    pub snippet_max_chars: usize,
    pub explain: bool,
}

impl Default for RankingOptions {
    fn default() -> Self {
        Self {
            page_size: 10,
            keyword_weight: 0.55,
            vector_weight: 0.35,
            freshness_weight: 0.10,
            rrf_k: 60.0,
            min_similarity: 0.2,
            freshness_half_life_days: 30.0,
            snippet_max_chars: 240,
            explain: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SummaryOptions {
    pub max_sources: usize,
    pub sentences_per_source: usize,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            max_sources: 5,
            sentences_per_source: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub reply_timeout: Duration,
    pub greeting: String,
    pub max_cited_documents: usize,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            reply_timeout: Duration::from_secs(30),
            greeting: "Hello! Ask me about your search results, or ask me to search for something new."
                .to_string(),
            max_cited_documents: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn doc(id: &str, source: &str, relevance: f64) -> Document {
        Document {
            id: id.to_string(),
            title: format!("title {id}"),
            url: format!("https://example.com/{id}"),
            snippet: String::new(),
            source: source.to_string(),
            relevance,
            published_at: Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap(),
            explain: None,
        }
    }

    #[test]
    fn relevance_tiers_follow_thresholds() {
        assert_eq!(RelevanceTier::from_relevance(0.95), RelevanceTier::High);
        assert_eq!(RelevanceTier::from_relevance(0.9), RelevanceTier::High);
        assert_eq!(RelevanceTier::from_relevance(0.85), RelevanceTier::Medium);
        assert_eq!(RelevanceTier::from_relevance(0.2), RelevanceTier::Moderate);
    }

    #[test]
    fn percent_rounds_half_up() {
        assert_eq!(relevance_percent(0.915), 92);
        assert_eq!(relevance_percent(0.0), 0);
        assert_eq!(relevance_percent(1.0), 100);
    }

    #[test]
    fn result_set_sources_are_distinct_and_ordered() {
        let set = ResultSet {
            query: "q".to_string(),
            page: 1,
            page_size: 10,
            total_candidates: 3,
            documents: vec![doc("a", "Journal", 0.9), doc("b", "Blog", 0.8), doc("c", "Journal", 0.7)],
        };
        assert_eq!(set.sources(), vec!["Journal".to_string(), "Blog".to_string()]);
        assert!(!set.has_more());
        assert!((set.mean_relevance() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn empty_mean_relevance_is_zero() {
        assert_eq!(mean_relevance(&[]), 0.0);
    }

    #[test]
    fn failed_turn_is_marked() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let turn = DialogueTurn::failed("timed out", now);
        assert!(turn.is_failure());
        assert_eq!(turn.role, Role::Assistant);
    }
}
