use crate::chunking::SentenceSplitter;
use crate::clock::Clock;
use crate::models::{mean_relevance, relevance_percent, Document, ResultSet};
use crate::orchestrator::freshness_factor;
use crate::query::{tokenize, NormalizedQuery};
use crate::SearchError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResearchStage {
    AnalyzingResults,
    IdentifyingTopics,
    CheckingSources,
    GeneratingInsights,
    Done,
}

impl ResearchStage {
    pub const ALL: [ResearchStage; 5] = [
        ResearchStage::AnalyzingResults,
        ResearchStage::IdentifyingTopics,
        ResearchStage::CheckingSources,
        ResearchStage::GeneratingInsights,
        ResearchStage::Done,
    ];

    pub fn percent(self) -> u8 {
        match self {
            ResearchStage::AnalyzingResults => 20,
            ResearchStage::IdentifyingTopics => 40,
            ResearchStage::CheckingSources => 60,
            ResearchStage::GeneratingInsights => 80,
            ResearchStage::Done => 100,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ResearchStage::AnalyzingResults => "Analyzing search results",
            ResearchStage::IdentifyingTopics => "Identifying related topics",
            ResearchStage::CheckingSources => "Checking source quality",
            ResearchStage::GeneratingInsights => "Generating insights",
            ResearchStage::Done => "Done",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResearchOptions {
    pub freshness_half_life_days: f64,
    pub max_topics: usize,
    pub max_insights: usize,
}

impl Default for ResearchOptions {
    fn default() -> Self {
        Self {
            freshness_half_life_days: 30.0,
            max_topics: 5,
            max_insights: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceQuality {
    pub trust: u8,
    pub freshness: u8,
    pub relevance: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceStat {
    pub source: String,
    pub count: usize,
    pub mean_relevance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedTopic {
    pub term: String,
    pub documents: usize,
    pub suggested_query: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub topic: String,
    pub statement: String,
    pub confidence: u8,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchReport {
    pub query: String,
    pub analyzed_count: usize,
    pub source_quality: SourceQuality,
    pub source_breakdown: Vec<SourceStat>,
    pub related_topics: Vec<RelatedTopic>,
    pub insights: Vec<Insight>,
    pub generated_at: DateTime<Utc>,
}

/// Runs every stage over `results`, reporting each one to `progress` as it
/// starts. An empty result set yields an empty report.
pub fn analyze<C, F>(
    query: &NormalizedQuery,
    results: &ResultSet,
    clock: &C,
    options: &ResearchOptions,
    mut progress: F,
) -> Result<ResearchReport, SearchError>
where
    C: Clock + ?Sized,
    F: FnMut(ResearchStage),
{
    let splitter =
        SentenceSplitter::new().map_err(|error| SearchError::Summarization(error.to_string()))?;
    let now = clock.now();
    let documents = &results.documents;

    progress(ResearchStage::AnalyzingResults);
    let tokens: Vec<HashSet<String>> = documents
        .iter()
        .map(|doc| tokenize(&format!("{} {}", doc.title, doc.snippet)).into_iter().collect())
        .collect();

    progress(ResearchStage::IdentifyingTopics);
    let related_topics = related_topics(query, &tokens, options.max_topics);

    progress(ResearchStage::CheckingSources);
    let source_quality = source_quality(documents, now, options.freshness_half_life_days);
    let source_breakdown = source_breakdown(documents);

    progress(ResearchStage::GeneratingInsights);
    let insights = related_topics
        .iter()
        .take(options.max_insights)
        .filter_map(|topic| insight(query, &topic.term, documents, &tokens, &splitter))
        .collect();

    progress(ResearchStage::Done);
    debug!(query = %query, documents = documents.len(), "research analysis finished");

    Ok(ResearchReport {
        query: query.as_str().to_string(),
        analyzed_count: documents.len(),
        source_quality,
        source_breakdown,
        related_topics,
        insights,
        generated_at: now,
    })
}

fn source_quality(documents: &[Document], now: DateTime<Utc>, half_life_days: f64) -> SourceQuality {
    if documents.is_empty() {
        return SourceQuality {
            trust: 0,
            freshness: 0,
            relevance: 0,
        };
    }

    let freshness = documents
        .iter()
        .map(|doc| freshness_factor(doc.published_at, now, half_life_days))
        .sum::<f64>()
        / documents.len() as f64;
    let top = documents
        .iter()
        .map(|doc| doc.relevance)
        .fold(0.0f64, f64::max);

    SourceQuality {
        trust: relevance_percent(mean_relevance(documents)),
        freshness: relevance_percent(freshness),
        relevance: relevance_percent(top),
    }
}

/// Per source, in order of first appearance in the ranking.
fn source_breakdown(documents: &[Document]) -> Vec<SourceStat> {
    let mut stats: Vec<SourceStat> = Vec::new();
    for doc in documents {
        match stats.iter_mut().find(|stat| stat.source == doc.source) {
            Some(stat) => {
                stat.mean_relevance =
                    (stat.mean_relevance * stat.count as f64 + doc.relevance) / (stat.count + 1) as f64;
                stat.count += 1;
            }
            None => stats.push(SourceStat {
                source: doc.source.clone(),
                count: 1,
                mean_relevance: doc.relevance,
            }),
        }
    }
    stats
}

/// Terms shared by at least two documents that the query does not already
/// contain, most widespread first.
fn related_topics(query: &NormalizedQuery, tokens: &[HashSet<String>], limit: usize) -> Vec<RelatedTopic> {
    let mut frequency: BTreeMap<&str, usize> = BTreeMap::new();
    for set in tokens {
        for token in set {
            if query.terms().contains(token) || query.excluded_terms().contains(token) {
                continue;
            }
            if token.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            *frequency.entry(token.as_str()).or_default() += 1;
        }
    }

    let mut ranked: Vec<(&str, usize)> = frequency.into_iter().filter(|(_, count)| *count >= 2).collect();
    ranked.sort_by(|left, right| right.1.cmp(&left.1).then(left.0.cmp(right.0)));

    ranked
        .into_iter()
        .take(limit)
        .map(|(term, documents)| RelatedTopic {
            term: term.to_string(),
            documents,
            suggested_query: format!("{} {term}", query.plain_text()).trim().to_string(),
        })
        .collect()
}

fn insight(
    query: &NormalizedQuery,
    topic: &str,
    documents: &[Document],
    tokens: &[HashSet<String>],
    splitter: &SentenceSplitter,
) -> Option<Insight> {
    let supporting: Vec<&Document> = documents
        .iter()
        .zip(tokens)
        .filter(|(_, set)| set.contains(topic))
        .map(|(doc, _)| doc)
        .collect();
    let lead = supporting.first()?;

    let mut terms = vec![topic.to_string()];
    terms.extend(query.terms().iter().cloned());
    let statement = splitter
        .best_sentence(&lead.snippet, &terms)
        .unwrap_or_else(|| lead.title.clone());

    let mut sources: Vec<String> = Vec::new();
    for doc in &supporting {
        if !sources.contains(&doc.source) {
            sources.push(doc.source.clone());
        }
    }
    let confidence =
        supporting.iter().map(|doc| doc.relevance).sum::<f64>() / supporting.len() as f64;

    Some(Insight {
        topic: topic.to_string(),
        statement,
        confidence: relevance_percent(confidence),
        sources,
    })
}
