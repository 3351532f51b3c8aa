//! Chat replies grounded in the current result set.
//!
//! Every reply is built from documents of the result set passed in, so the
//! sources it cites always exist there. Which documents are used depends on
//! the classified [`Intent`] and, for follow-ups, on what the history has
//! already cited.

use crate::chunking::{term_hits, SentenceSplitter};
use crate::clock::Clock;
use crate::intent::{classify, Intent};
use crate::models::{relevance_percent, ChatOptions, DialogueTurn, Document, ResultSet, Role};
use crate::query::tokenize;
use crate::traits::Responder;
use crate::SearchError;
use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt::Write;

pub struct GroundedResponder<C: Clock> {
    clock: C,
    options: ChatOptions,
    splitter: SentenceSplitter,
}

impl<C: Clock> GroundedResponder<C> {
    pub fn new(clock: C, options: ChatOptions) -> Result<Self, SearchError> {
        let splitter =
            SentenceSplitter::new().map_err(|error| SearchError::Responder(error.to_string()))?;
        Ok(Self {
            clock,
            options,
            splitter,
        })
    }

    fn key_sentence(&self, doc: &Document, terms: &[String]) -> String {
        self.splitter
            .best_sentence(&doc.snippet, terms)
            .unwrap_or_else(|| doc.title.clone())
    }

    fn compose(&self, intent: &Intent, history: &[DialogueTurn], results: &ResultSet) -> (String, Vec<String>) {
        let limit = self.options.max_cited_documents.max(1);

        match intent {
            Intent::Search { query } => (
                format!(
                    "I can look into \"{query}\" for you. Run it as a new search and I will answer from those results."
                ),
                Vec::new(),
            ),
            _ if results.is_empty() => (
                "There are no search results yet. Run a search first, or ask me to \"search for\" a topic."
                    .to_string(),
                Vec::new(),
            ),
            Intent::Summarize => {
                let docs: Vec<&Document> = results.documents.iter().take(limit).collect();
                let terms = tokenize(&results.query);
                let mut body = format!(
                    "Here are the key points from the current results for \"{}\":\n",
                    results.query
                );
                for doc in &docs {
                    let _ = writeln!(body, "- {} [{}]", self.key_sentence(doc, &terms), doc.source);
                }
                body.push_str("\nWould you like me to go deeper into one of these aspects?");
                (body, sources_of(&docs))
            }
            Intent::Sources => {
                let mut body = String::from("The current results come from these sources:\n");
                let sources = results.sources();
                for source in &sources {
                    let docs: Vec<&Document> = results
                        .documents
                        .iter()
                        .filter(|doc| &doc.source == source)
                        .collect();
                    let mean = docs.iter().map(|doc| doc.relevance).sum::<f64>() / docs.len() as f64;
                    let _ = writeln!(
                        body,
                        "- {source}: {} result(s), mean relevance {}%",
                        docs.len(),
                        relevance_percent(mean)
                    );
                }
                let _ = write!(
                    body,
                    "\nOverall mean relevance is {}%.",
                    relevance_percent(results.mean_relevance())
                );
                (body, sources)
            }
            Intent::Compare {
                left: Some(left),
                right: Some(right),
            } => {
                let mut body = format!("Comparing {left} and {right}:\n");
                let mut used = Vec::new();
                for subject in [left, right] {
                    let terms = tokenize(subject);
                    match best_match(results, &terms, &[]) {
                        Some(doc) => {
                            let _ = writeln!(
                                body,
                                "- On {subject}: {} [{}]",
                                self.key_sentence(doc, &terms),
                                doc.source
                            );
                            used.push(doc);
                        }
                        None => {
                            let _ = writeln!(
                                body,
                                "- The current results say nothing specific about {subject}."
                            );
                        }
                    }
                }
                (body, sources_of(&used))
            }
            Intent::Compare { .. } => {
                let docs: Vec<&Document> = results.documents.iter().take(2).collect();
                let terms = tokenize(&results.query);
                let mut body = String::from("Comparing the two strongest results:\n");
                for doc in &docs {
                    let _ = writeln!(
                        body,
                        "- {} ({}, {}% relevant): {}",
                        doc.title,
                        doc.source,
                        doc.relevance_percent(),
                        self.key_sentence(doc, &terms)
                    );
                }
                (body, sources_of(&docs))
            }
            Intent::Elaborate => {
                let cited: HashSet<&str> = history
                    .iter()
                    .filter(|turn| turn.role == Role::Assistant)
                    .flat_map(|turn| turn.cited_sources().iter().map(String::as_str))
                    .collect();
                let fresh: Vec<&Document> = results
                    .documents
                    .iter()
                    .filter(|doc| !cited.contains(doc.source.as_str()))
                    .take(limit)
                    .collect();

                if fresh.is_empty() {
                    return (
                        "I have already covered every source in the current results. A new search could bring in more material."
                            .to_string(),
                        Vec::new(),
                    );
                }

                let terms = tokenize(&results.query);
                let mut body = String::from("Going further, other sources add:\n");
                for doc in &fresh {
                    let _ = writeln!(body, "- {} [{}]", self.key_sentence(doc, &terms), doc.source);
                }
                (body, sources_of(&fresh))
            }
            Intent::General { terms } => {
                let mut docs: Vec<&Document> = Vec::new();
                while docs.len() < limit {
                    match best_match(results, terms, &docs) {
                        Some(doc) => docs.push(doc),
                        None => break,
                    }
                }
                if docs.is_empty() {
                    docs = results.documents.iter().take(limit).collect();
                }

                let mut body = String::from("Here is what the current results say:\n");
                for doc in &docs {
                    let _ = writeln!(body, "- {} [{}]", self.key_sentence(doc, terms), doc.source);
                }
                body.push_str("\nAsk me to compare, summarize or list the sources for more.");
                (body, sources_of(&docs))
            }
        }
    }
}

#[async_trait]
impl<C: Clock> Responder for GroundedResponder<C> {
    async fn respond(
        &self,
        history: &[DialogueTurn],
        results: &ResultSet,
        turn: &DialogueTurn,
    ) -> Result<DialogueTurn, SearchError> {
        if turn.role != Role::User {
            return Err(SearchError::Responder(
                "replies are only generated for user turns".to_string(),
            ));
        }

        let intent = classify(&turn.body);
        let (body, sources) = self.compose(&intent, history, results);
        Ok(DialogueTurn::assistant(body.trim_end(), sources, self.clock.now()))
    }
}

/// The highest-ranked document with the most hits for `terms`, skipping
/// `exclude`. Documents without any hit never match.
fn best_match<'a>(results: &'a ResultSet, terms: &[String], exclude: &[&Document]) -> Option<&'a Document> {
    results
        .documents
        .iter()
        .filter(|doc| !exclude.iter().any(|used| used.id == doc.id))
        .map(|doc| (term_hits(&format!("{} {}", doc.title, doc.snippet), terms), doc))
        .filter(|(hits, _)| *hits > 0)
        .fold(None, |best: Option<(usize, &Document)>, (hits, doc)| match best {
            Some((best_hits, _)) if best_hits >= hits => best,
            _ => Some((hits, doc)),
        })
        .map(|(_, doc)| doc)
}

fn sources_of(docs: &[&Document]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for doc in docs {
        if !sources.contains(&doc.source) {
            sources.push(doc.source.clone());
        }
    }
    sources
}
