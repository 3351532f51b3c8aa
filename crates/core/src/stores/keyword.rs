use super::poisoned;
use crate::models::CorpusEntry;
use crate::query::{tokenize, NormalizedQuery};
use crate::traits::{Candidate, KeywordIndex};
use crate::SearchError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

const K1: f64 = 1.2;
const B: f64 = 0.75;

struct IndexedEntry {
    id: String,
    term_freqs: HashMap<String, usize>,
    tokens: HashSet<String>,
    length: usize,
}

#[derive(Default)]
struct KeywordState {
    entries: Vec<IndexedEntry>,
    doc_freqs: HashMap<String, usize>,
}

impl KeywordState {
    fn rebuild_doc_freqs(&mut self) {
        self.doc_freqs.clear();
        for entry in &self.entries {
            for term in &entry.tokens {
                *self.doc_freqs.entry(term.clone()).or_default() += 1;
            }
        }
    }

    fn average_length(&self) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        self.entries.iter().map(|entry| entry.length).sum::<usize>() as f64
            / self.entries.len() as f64
    }

    fn idf(&self, term: &str) -> f64 {
        let total = self.entries.len() as f64;
        let df = self.doc_freqs.get(term).copied().unwrap_or(0) as f64;
        (1.0 + (total - df + 0.5) / (df + 0.5)).ln()
    }
}

/// Titles count twice so a term in the title outweighs one in the body.
#[derive(Default)]
pub struct InMemoryKeywordIndex {
    state: RwLock<KeywordState>,
}

impl InMemoryKeywordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.state.read().map(|state| state.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn index_entry(entry: &CorpusEntry) -> IndexedEntry {
    let title_tokens = tokenize(&entry.title);
    let body_tokens = tokenize(&entry.body);

    let mut term_freqs = HashMap::new();
    for token in title_tokens.iter().chain(&title_tokens).chain(&body_tokens) {
        *term_freqs.entry(token.clone()).or_default() += 1;
    }

    IndexedEntry {
        id: entry.id.clone(),
        tokens: term_freqs.keys().cloned().collect(),
        length: title_tokens.len() * 2 + body_tokens.len(),
        term_freqs,
    }
}

#[async_trait]
impl KeywordIndex for InMemoryKeywordIndex {
    async fn index_keyword_entries(&self, entries: &[CorpusEntry]) -> Result<(), SearchError> {
        let incoming: HashSet<&str> = entries.iter().map(|entry| entry.id.as_str()).collect();
        let mut state = self.state.write().map_err(poisoned)?;
        state.entries.retain(|indexed| !incoming.contains(indexed.id.as_str()));
        state.entries.extend(entries.iter().map(index_entry));
        state.rebuild_doc_freqs();
        Ok(())
    }

    async fn search_keyword(&self, query: &NormalizedQuery) -> Result<Vec<Candidate>, SearchError> {
        if query.terms().is_empty() {
            return Ok(Vec::new());
        }

        let state = self.state.read().map_err(poisoned)?;
        let average_length = state.average_length().max(1.0);

        let mut candidates: Vec<Candidate> = state
            .entries
            .iter()
            .filter(|entry| query.admits(&entry.tokens))
            .filter_map(|entry| {
                let raw: f64 = query
                    .terms()
                    .iter()
                    .filter_map(|term| {
                        let tf = *entry.term_freqs.get(term)? as f64;
                        let norm = K1 * (1.0 - B + B * entry.length as f64 / average_length);
                        Some(state.idf(term) * tf * (K1 + 1.0) / (tf + norm))
                    })
                    .sum();

                (raw > 0.0).then(|| Candidate {
                    document_id: entry.id.clone(),
                    score: raw / (raw + 1.0),
                })
            })
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
