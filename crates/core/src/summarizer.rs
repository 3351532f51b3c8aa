use crate::chunking::SentenceSplitter;
use crate::models::{relevance_percent, ResultSet, Summary, SummaryOptions};
use crate::query::NormalizedQuery;
use crate::traits::Summarizer;
use crate::SearchError;
use async_trait::async_trait;
use std::fmt::Write;

pub struct ExtractiveSummarizer {
    options: SummaryOptions,
    splitter: SentenceSplitter,
}

impl ExtractiveSummarizer {
    pub fn new(options: SummaryOptions) -> Result<Self, SearchError> {
        let splitter = SentenceSplitter::new()
            .map_err(|error| SearchError::Summarization(error.to_string()))?;
        Ok(Self { options, splitter })
    }

    /// Key sentences for the top documents, paired with their source.
    fn key_points(&self, query: &NormalizedQuery, results: &ResultSet) -> Vec<(String, String)> {
        let per_source = self.options.sentences_per_source.max(1);
        let mut points: Vec<(String, String)> = Vec::new();

        for doc in results.documents.iter().take(self.options.max_sources.max(1)) {
            let mut sentences = self.splitter.split(&doc.snippet);
            sentences.sort_by_key(|sentence| {
                std::cmp::Reverse(crate::chunking::term_hits(sentence, query.terms()))
            });

            let mut taken = 0;
            for sentence in sentences {
                if taken == per_source {
                    break;
                }
                if points.iter().any(|(existing, _)| existing == &sentence) {
                    continue;
                }
                points.push((sentence, doc.source.clone()));
                taken += 1;
            }

            if taken == 0 {
                points.push((doc.title.clone(), doc.source.clone()));
            }
        }

        points
    }
}

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    async fn summarize(
        &self,
        query: &NormalizedQuery,
        results: &ResultSet,
    ) -> Result<Summary, SearchError> {
        if results.is_empty() {
            return Err(SearchError::Summarization(
                "cannot summarize an empty result set".to_string(),
            ));
        }

        let points = self.key_points(query, results);
        let mut sources: Vec<String> = Vec::new();
        for (_, source) in &points {
            if !sources.contains(source) {
                sources.push(source.clone());
            }
        }

        let confidence = results.mean_relevance();
        let mut text = format!(
            "Based on the analyzed sources for \"{}\", these are the key points:\n",
            query.as_str()
        );
        for (sentence, source) in &points {
            let _ = writeln!(text, "- {sentence} [{source}]");
        }
        let _ = write!(
            text,
            "\n{} sources analyzed, {} cited, mean relevance {}%.",
            results.len(),
            sources.len(),
            relevance_percent(confidence)
        );

        Ok(Summary {
            text,
            sources,
            confidence,
            analyzed_count: results.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;
    use chrono::{TimeZone, Utc};

    fn doc(id: &str, source: &str, snippet: &str, relevance: f64) -> Document {
        Document {
            id: id.to_string(),
            title: format!("Title {id}"),
            url: format!("https://example.com/{id}"),
            snippet: snippet.to_string(),
            source: source.to_string(),
            relevance,
            published_at: Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap(),
            explain: None,
        }
    }

    fn results(documents: Vec<Document>) -> ResultSet {
        ResultSet {
            query: "blockchain".to_string(),
            page: 1,
            page_size: 10,
            total_candidates: documents.len(),
            documents,
        }
    }

    #[tokio::test]
    async fn summary_cites_only_result_sources() {
        let summarizer = ExtractiveSummarizer::new(SummaryOptions::default()).unwrap();
        let query = NormalizedQuery::parse("blockchain").unwrap();
        let set = results(vec![
            doc("a", "CryptoJournal", "Blockchain ledgers are append-only. They are shared.", 0.9),
            doc("b", "Logistics Today", "Retailers trace goods with blockchain records.", 0.8),
            doc("c", "CryptoJournal", "Consensus decides the next block.", 0.7),
        ]);

        let summary = summarizer.summarize(&query, &set).await.unwrap();

        assert!(!summary.sources.is_empty());
        assert!(summary.sources.iter().all(|source| set.contains_source(source)));
        assert_eq!(summary.sources, vec!["CryptoJournal".to_string(), "Logistics Today".to_string()]);
        assert!(summary.text.contains("Blockchain ledgers are append-only."));
        assert!(summary.text.contains("mean relevance 80%"));
        assert_eq!(summary.analyzed_count, 3);
    }

    #[tokio::test]
    async fn summary_is_deterministic() {
        let summarizer = ExtractiveSummarizer::new(SummaryOptions::default()).unwrap();
        let query = NormalizedQuery::parse("climate").unwrap();
        let set = results(vec![
            doc("a", "Climate Research", "Temperatures rise. Climate models warn.", 0.9),
            doc("b", "Urban Review", "Cities adapt to climate change.", 0.85),
        ]);

        let first = summarizer.summarize(&query, &set).await.unwrap();
        let second = summarizer.summarize(&query, &set).await.unwrap();
        assert_eq!(first, second);
        assert!(first.text.contains("Climate models warn."));
    }

    #[tokio::test]
    async fn empty_snippet_falls_back_to_title() {
        let summarizer = ExtractiveSummarizer::new(SummaryOptions::default()).unwrap();
        let query = NormalizedQuery::parse("energy").unwrap();
        let set = results(vec![doc("a", "Energy Watch", "", 0.6)]);

        let summary = summarizer.summarize(&query, &set).await.unwrap();
        assert!(summary.text.contains("- Title a [Energy Watch]"));
    }

    #[tokio::test]
    async fn empty_result_set_is_refused() {
        let summarizer = ExtractiveSummarizer::new(SummaryOptions::default()).unwrap();
        let query = NormalizedQuery::parse("anything").unwrap();
        let error = summarizer.summarize(&query, &results(Vec::new())).await.unwrap_err();
        assert!(matches!(error, SearchError::Summarization(_)));
    }
}
