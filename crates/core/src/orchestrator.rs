use crate::chunking::best_passage;
use crate::clock::Clock;
use crate::corpus::Corpus;
use crate::models::{CorpusEntry, Document, RankingOptions, ResultSet, ScoreBreakdown};
use crate::query::NormalizedQuery;
use crate::stores::{InMemoryKeywordIndex, InMemoryVectorIndex};
use crate::traits::{Candidate, KeywordIndex, Retriever, VectorIndex};
use crate::SearchError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;

/// Fuses keyword and vector candidates into one global ranking and serves
/// it in pages.
///
/// Relevance blends each signal's own score with its reciprocal-rank share,
/// weighted per signal, then mixes in a freshness factor that halves every
/// `freshness_half_life_days` relative to the injected clock.
pub struct SearchCoordinator<K, V, C>
where
    K: KeywordIndex,
    V: VectorIndex,
    C: Clock,
{
    corpus: Arc<Corpus>,
    keyword: K,
    vector: V,
    clock: C,
    options: RankingOptions,
}

impl<C: Clock> SearchCoordinator<InMemoryKeywordIndex, InMemoryVectorIndex, C> {
    pub async fn in_memory(
        corpus: Arc<Corpus>,
        clock: C,
        options: RankingOptions,
    ) -> Result<Self, SearchError> {
        let keyword = InMemoryKeywordIndex::new();
        let vector = InMemoryVectorIndex::new(options.min_similarity);
        keyword.index_keyword_entries(corpus.entries()).await?;
        vector.index_vector_entries(corpus.entries()).await?;
        debug!(entries = corpus.len(), "indexed corpus in memory");
        Ok(Self::new(corpus, keyword, vector, clock, options))
    }
}

impl<K, V, C> SearchCoordinator<K, V, C>
where
    K: KeywordIndex + Send + Sync,
    V: VectorIndex + Send + Sync,
    C: Clock,
{
    pub fn new(corpus: Arc<Corpus>, keyword: K, vector: V, clock: C, options: RankingOptions) -> Self {
        Self {
            corpus,
            keyword,
            vector,
            clock,
            options,
        }
    }

    pub fn options(&self) -> &RankingOptions {
        &self.options
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    /// Every matching document, best first, with no duplicate ids.
    pub async fn rank(&self, query: &NormalizedQuery) -> Result<Vec<Document>, SearchError> {
        let (keyword_hits, vector_hits) = tokio::try_join!(
            self.keyword.search_keyword(query),
            self.vector.search_vector(query)
        )?;

        let mut scored = HashMap::<String, ScoredHit>::new();
        apply_signal(&mut scored, &keyword_hits, Signal::Keyword, self.options.rrf_k);
        apply_signal(&mut scored, &vector_hits, Signal::Vector, self.options.rrf_k);

        let now = self.clock.now();
        let mut documents: Vec<Document> = scored
            .into_values()
            .filter_map(|hit| {
                let entry = self.corpus.get(&hit.document_id)?;
                Some(self.to_document(query, entry, &hit, now))
            })
            .collect();

        documents.sort_by(|left, right| {
            right
                .relevance
                .total_cmp(&left.relevance)
                .then_with(|| right.published_at.cmp(&left.published_at))
                .then_with(|| left.id.cmp(&right.id))
        });

        debug!(
            query = %query,
            keyword = keyword_hits.len(),
            vector = vector_hits.len(),
            ranked = documents.len(),
            "ranked candidates"
        );

        Ok(documents)
    }

    fn to_document(
        &self,
        query: &NormalizedQuery,
        entry: &CorpusEntry,
        hit: &ScoredHit,
        now: DateTime<Utc>,
    ) -> Document {
        let options = &self.options;
        let signal_weight = (options.keyword_weight + options.vector_weight).max(f64::EPSILON);
        let fusion = ((options.keyword_weight * hit.keyword.blended()
            + options.vector_weight * hit.vector.blended())
            / signal_weight)
            .clamp(0.0, 1.0);

        let freshness = freshness_factor(entry.published_at, now, options.freshness_half_life_days);
        let freshness_weight = options.freshness_weight.clamp(0.0, 1.0);
        let relevance = ((1.0 - freshness_weight) * fusion + freshness_weight * freshness).clamp(0.0, 1.0);

        Document {
            id: entry.id.clone(),
            title: entry.title.clone(),
            url: entry.url.clone(),
            snippet: best_passage(&entry.body, query.terms(), options.snippet_max_chars),
            source: entry.source.clone(),
            relevance,
            published_at: entry.published_at,
            explain: options.explain.then_some(ScoreBreakdown {
                keyword: hit.keyword.score,
                vector: hit.vector.score,
                fusion,
                freshness,
            }),
        }
    }
}

#[async_trait]
impl<K, V, C> Retriever for SearchCoordinator<K, V, C>
where
    K: KeywordIndex + Send + Sync,
    V: VectorIndex + Send + Sync,
    C: Clock,
{
    async fn retrieve(
        &self,
        query: &NormalizedQuery,
        page: NonZeroUsize,
    ) -> Result<ResultSet, SearchError> {
        let page_size = self.options.page_size.max(1);
        let ranked = self.rank(query).await?;
        let total = ranked.len();
        let start = (page.get() - 1).saturating_mul(page_size);

        let documents = ranked.into_iter().skip(start).take(page_size).collect();

        Ok(ResultSet {
            query: query.as_str().to_string(),
            page: page.get(),
            page_size,
            total_candidates: total,
            documents,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Keyword,
    Vector,
}

#[derive(Debug, Default, Clone, Copy)]
struct SignalScore {
    score: f64,
    rank_share: f64,
}

impl SignalScore {
    fn blended(&self) -> f64 {
        0.5 * self.score + 0.5 * self.rank_share
    }
}

#[derive(Debug)]
struct ScoredHit {
    document_id: String,
    keyword: SignalScore,
    vector: SignalScore,
}

/// Records each hit's score and its reciprocal-rank share, `(k + 1) / (k + rank)`,
/// which is 1.0 for the top hit of a signal.
fn apply_signal(target: &mut HashMap<String, ScoredHit>, hits: &[Candidate], signal: Signal, k: f64) {
    for (position, hit) in hits.iter().enumerate() {
        let rank_share = (k + 1.0) / (k + position as f64 + 1.0);
        let entry = target
            .entry(hit.document_id.clone())
            .or_insert_with(|| ScoredHit {
                document_id: hit.document_id.clone(),
                keyword: SignalScore::default(),
                vector: SignalScore::default(),
            });

        let slot = match signal {
            Signal::Keyword => &mut entry.keyword,
            Signal::Vector => &mut entry.vector,
        };
        // first occurrence is the best one, hits arrive sorted
        if slot.rank_share == 0.0 {
            *slot = SignalScore {
                score: hit.score.clamp(0.0, 1.0),
                rank_share,
            };
        }
    }
}

/// 1.0 for documents published at or after `now`, halving every `half_life_days`.
pub fn freshness_factor(published_at: DateTime<Utc>, now: DateTime<Utc>, half_life_days: f64) -> f64 {
    if half_life_days <= 0.0 {
        return 0.0;
    }
    let age_days = (now - published_at).num_seconds().max(0) as f64 / 86_400.0;
    0.5f64.powf(age_days / half_life_days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::corpus::sample_corpus;
    use crate::traits::{KeywordIndex, VectorIndex};
    use chrono::TimeZone;
    use std::collections::HashSet;

    #[derive(Default)]
    struct FakeKeywordIndex {
        hits: Vec<Candidate>,
    }

    #[derive(Default)]
    struct FakeVectorIndex {
        hits: Vec<Candidate>,
    }

    #[async_trait]
    impl KeywordIndex for FakeKeywordIndex {
        async fn index_keyword_entries(&self, _entries: &[CorpusEntry]) -> Result<(), SearchError> {
            Ok(())
        }

        async fn search_keyword(&self, _query: &NormalizedQuery) -> Result<Vec<Candidate>, SearchError> {
            Ok(self.hits.clone())
        }
    }

    #[async_trait]
    impl VectorIndex for FakeVectorIndex {
        async fn index_vector_entries(&self, _entries: &[CorpusEntry]) -> Result<(), SearchError> {
            Ok(())
        }

        async fn search_vector(&self, _query: &NormalizedQuery) -> Result<Vec<Candidate>, SearchError> {
            Ok(self.hits.clone())
        }
    }

    struct FailingVectorIndex;

    #[async_trait]
    impl VectorIndex for FailingVectorIndex {
        async fn index_vector_entries(&self, _entries: &[CorpusEntry]) -> Result<(), SearchError> {
            Ok(())
        }

        async fn search_vector(&self, _query: &NormalizedQuery) -> Result<Vec<Candidate>, SearchError> {
            Err(SearchError::Retrieval("vector backend unavailable".to_string()))
        }
    }

    fn clock() -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2024, 1, 20, 0, 0, 0).unwrap())
    }

    fn page(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn entry(id: &str, day: u32) -> CorpusEntry {
        CorpusEntry {
            id: id.to_string(),
            title: format!("Entry {id}"),
            url: format!("https://example.com/{id}"),
            body: "Hydraulic pump pressure notes.".to_string(),
            source: "Manual".to_string(),
            published_at: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
        }
    }

    fn candidate(id: &str, score: f64) -> Candidate {
        Candidate {
            document_id: id.to_string(),
            score,
        }
    }

    async fn sample_coordinator(
        page_size: usize,
    ) -> SearchCoordinator<InMemoryKeywordIndex, InMemoryVectorIndex, FixedClock> {
        let options = RankingOptions {
            page_size,
            ..RankingOptions::default()
        };
        let corpus = Arc::new(sample_corpus().unwrap());
        SearchCoordinator::in_memory(corpus, clock(), options)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn documents_found_by_both_signals_rank_first() {
        let corpus = Corpus::from_entries(vec![entry("both", 10), entry("keyword-only", 10)]).unwrap();
        let coordinator = SearchCoordinator::new(
            Arc::new(corpus),
            FakeKeywordIndex {
                hits: vec![candidate("keyword-only", 0.9), candidate("both", 0.8)],
            },
            FakeVectorIndex {
                hits: vec![candidate("both", 0.7)],
            },
            clock(),
            RankingOptions::default(),
        );

        let query = NormalizedQuery::parse("hydraulic pump").unwrap();
        let result = coordinator.retrieve(&query, page(1)).await.unwrap();

        assert_eq!(result.ids(), vec!["both", "keyword-only"]);
    }

    #[tokio::test]
    async fn ties_prefer_more_recent_documents() {
        let corpus = Corpus::from_entries(vec![entry("older", 1), entry("newer", 15)]).unwrap();
        let options = RankingOptions {
            freshness_weight: 0.0,
            ..RankingOptions::default()
        };
        let coordinator = SearchCoordinator::new(
            Arc::new(corpus),
            FakeKeywordIndex {
                hits: vec![candidate("older", 0.5)],
            },
            FakeVectorIndex {
                hits: vec![candidate("newer", 0.5)],
            },
            clock(),
            RankingOptions {
                keyword_weight: 0.5,
                vector_weight: 0.5,
                ..options
            },
        );

        let query = NormalizedQuery::parse("pump").unwrap();
        let result = coordinator.retrieve(&query, page(1)).await.unwrap();

        assert_eq!(result.documents[0].relevance, result.documents[1].relevance);
        assert_eq!(result.ids(), vec!["newer", "older"]);
    }

    #[tokio::test]
    async fn backend_failure_surfaces_as_retrieval_error() {
        let corpus = Corpus::from_entries(vec![entry("a", 1)]).unwrap();
        let coordinator = SearchCoordinator::new(
            Arc::new(corpus),
            FakeKeywordIndex::default(),
            FailingVectorIndex,
            clock(),
            RankingOptions::default(),
        );

        let query = NormalizedQuery::parse("pump").unwrap();
        let error = coordinator.retrieve(&query, page(1)).await.unwrap_err();
        assert!(error.is_retryable());
    }

    #[tokio::test]
    async fn blockchain_results_are_bounded_and_sorted() {
        let coordinator = sample_coordinator(10).await;
        let query = NormalizedQuery::parse("Blockchain").unwrap();
        let result = coordinator.retrieve(&query, page(1)).await.unwrap();

        assert!(!result.is_empty());
        assert!(result
            .documents
            .iter()
            .all(|doc| (0.0..=1.0).contains(&doc.relevance)));
        assert!(result
            .documents
            .windows(2)
            .all(|pair| pair[0].relevance >= pair[1].relevance));
        assert!(!result.documents[0].snippet.is_empty());
    }

    #[tokio::test]
    async fn retrieval_is_deterministic_with_a_fixed_clock() {
        let coordinator = sample_coordinator(3).await;
        let query = NormalizedQuery::parse("blockchain ledger").unwrap();

        let first = coordinator.retrieve(&query, page(1)).await.unwrap();
        let second = coordinator.retrieve(&query, page(1)).await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn pages_are_disjoint_and_non_increasing() {
        let coordinator = sample_coordinator(2).await;
        let query = NormalizedQuery::parse("blockchain").unwrap();

        let mut seen = HashSet::new();
        let mut previous_min = f64::INFINITY;
        let mut page_number = 1;

        loop {
            let result = coordinator.retrieve(&query, page(page_number)).await.unwrap();
            if result.is_empty() {
                break;
            }
            for doc in &result.documents {
                assert!(seen.insert(doc.id.clone()), "duplicate id {}", doc.id);
                assert!(doc.relevance <= previous_min);
            }
            previous_min = result
                .documents
                .iter()
                .map(|doc| doc.relevance)
                .fold(f64::INFINITY, f64::min);
            page_number += 1;
        }

        assert!(page_number > 2, "expected more than one page of results");
        assert_eq!(seen.len(), coordinator.rank(&query).await.unwrap().len());
    }

    #[tokio::test]
    async fn unmatched_query_returns_empty_set() {
        let coordinator = sample_coordinator(10).await;
        let query = NormalizedQuery::parse("xylophone zeppelin").unwrap();
        let result = coordinator.retrieve(&query, page(1)).await.unwrap();

        assert!(result.is_empty());
        assert_eq!(result.total_candidates, 0);
        assert!(!result.has_more());
    }

    #[tokio::test]
    async fn page_past_the_end_is_empty() {
        let coordinator = sample_coordinator(10).await;
        let query = NormalizedQuery::parse("climate").unwrap();
        let result = coordinator.retrieve(&query, page(50)).await.unwrap();
        assert!(result.is_empty());
        assert!(result.total_candidates > 0);
    }

    #[test]
    fn freshness_halves_per_half_life() {
        let now = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
        let published = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!((freshness_factor(published, now, 30.0) - 0.5).abs() < 1e-9);
        assert_eq!(freshness_factor(now, published, 30.0), 1.0);
    }
}
