use super::poisoned;
use crate::embeddings::{cosine_similarity, Embedder, TrigramEmbedder};
use crate::models::CorpusEntry;
use crate::query::{tokenize, NormalizedQuery};
use crate::traits::{Candidate, VectorIndex};
use crate::SearchError;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::RwLock;

struct StoredVector {
    id: String,
    vector: Vec<f32>,
    tokens: HashSet<String>,
}

/// Embeds entry titles and compares them to the query by cosine similarity.
/// Candidates below `min_similarity` are dropped.
pub struct InMemoryVectorIndex<E: Embedder = TrigramEmbedder> {
    embedder: E,
    min_similarity: f64,
    vectors: RwLock<Vec<StoredVector>>,
}

impl InMemoryVectorIndex<TrigramEmbedder> {
    pub fn new(min_similarity: f64) -> Self {
        Self::with_embedder(TrigramEmbedder::default(), min_similarity)
    }
}

impl<E: Embedder> InMemoryVectorIndex<E> {
    pub fn with_embedder(embedder: E, min_similarity: f64) -> Self {
        Self {
            embedder,
            min_similarity,
            vectors: RwLock::new(Vec::new()),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.embedder.dimensions()
    }
}

#[async_trait]
impl<E: Embedder> VectorIndex for InMemoryVectorIndex<E> {
    async fn index_vector_entries(&self, entries: &[CorpusEntry]) -> Result<(), SearchError> {
        let incoming: HashSet<&str> = entries.iter().map(|entry| entry.id.as_str()).collect();
        let embedded: Vec<StoredVector> = entries
            .iter()
            .map(|entry| StoredVector {
                id: entry.id.clone(),
                vector: self.embedder.embed(&entry.title),
                tokens: tokenize(&entry.title)
                    .into_iter()
                    .chain(tokenize(&entry.body))
                    .collect(),
            })
            .collect();

        let mut vectors = self.vectors.write().map_err(poisoned)?;
        vectors.retain(|stored| !incoming.contains(stored.id.as_str()));
        vectors.extend(embedded);
        Ok(())
    }

    async fn search_vector(&self, query: &NormalizedQuery) -> Result<Vec<Candidate>, SearchError> {
        if query.terms().is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(&query.plain_text());
        let vectors = self.vectors.read().map_err(poisoned)?;

        let mut candidates: Vec<Candidate> = vectors
            .iter()
            .filter(|stored| query.admits(&stored.tokens))
            .map(|stored| Candidate {
                document_id: stored.id.clone(),
                score: cosine_similarity(&query_vector, &stored.vector),
            })
            .filter(|candidate| candidate.score >= self.min_similarity)
            .collect();

        candidates.sort_by(|left, right| {
            right
                .score
                .total_cmp(&left.score)
                .then_with(|| left.document_id.cmp(&right.document_id))
        });

        Ok(candidates)
    }
}
