use crate::error::{HistoryError, SearchError};
use crate::models::{CorpusEntry, DialogueTurn, ResultSet, Summary};
use crate::query::NormalizedQuery;
use crate::history::HistoryEntry;
use async_trait::async_trait;
use std::num::NonZeroUsize;

/// A scored reference to a corpus entry produced by one retrieval signal.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub document_id: String,
    /// Signal-specific score already mapped into `[0, 1]`.
    pub score: f64,
}

#[async_trait]
pub trait KeywordIndex {
    async fn index_keyword_entries(&self, entries: &[CorpusEntry]) -> Result<(), SearchError>;

    async fn search_keyword(&self, query: &NormalizedQuery) -> Result<Vec<Candidate>, SearchError>;
}

#[async_trait]
pub trait VectorIndex {
    async fn index_vector_entries(&self, entries: &[CorpusEntry]) -> Result<(), SearchError>;

    async fn search_vector(&self, query: &NormalizedQuery) -> Result<Vec<Candidate>, SearchError>;
}

#[async_trait]
pub trait Retriever {
    /// Page `n` is the `n`-th disjoint slice of one global ranking. No
    /// matches yields an empty set, never an error.
    async fn retrieve(
        &self,
        query: &NormalizedQuery,
        page: NonZeroUsize,
    ) -> Result<ResultSet, SearchError>;
}

#[async_trait]
pub trait Summarizer {
    async fn summarize(
        &self,
        query: &NormalizedQuery,
        results: &ResultSet,
    ) -> Result<Summary, SearchError>;
}

#[async_trait]
pub trait Responder {
    async fn respond(
        &self,
        history: &[DialogueTurn],
        results: &ResultSet,
        turn: &DialogueTurn,
    ) -> Result<DialogueTurn, SearchError>;
}

#[async_trait]
pub trait HistoryStore {
    /// Entries, most recent first.
    async fn load(&self) -> Result<Vec<HistoryEntry>, HistoryError>;

    /// Inserts at the front and evicts the oldest entries beyond the bound.
    async fn append_bounded(&self, entry: HistoryEntry) -> Result<Vec<HistoryEntry>, HistoryError>;

    async fn clear(&self) -> Result<(), HistoryError>;
}
