use crate::chunking::normalize_whitespace;
use crate::error::SearchError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "how", "in", "is", "it", "of",
    "on", "or", "the", "to", "what", "which", "who", "why", "with", "about", "me", "tell",
    "der", "die", "das", "und", "ist", "ein", "eine", "von", "zu", "mit", "im", "den",
    "wie", "was",
];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedQuery {
    text: String,
    terms: Vec<String>,
    required: Vec<String>,
    excluded: Vec<String>,
}

impl NormalizedQuery {
    pub fn parse(raw: &str) -> Result<Self, SearchError> {
        let text = normalize_whitespace(raw).to_lowercase();
        if text.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let mut terms = Vec::new();
        let mut required = Vec::new();
        let mut excluded = Vec::new();

        for word in text.split(' ') {
            if let Some(rest) = word.strip_prefix('-').filter(|rest| !rest.is_empty()) {
                push_unique(&mut excluded, tokenize(rest));
            } else if let Some(rest) = word.strip_prefix('+').filter(|rest| !rest.is_empty()) {
                let tokens = tokenize(rest);
                push_unique(&mut required, tokens.clone());
                push_unique(&mut terms, tokens);
            } else {
                push_unique(&mut terms, tokenize(word));
            }
        }

        terms.retain(|term| !excluded.contains(term));

        Ok(Self {
            text,
            terms,
            required,
            excluded,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Positive search terms, required ones included, in query order.
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn required_terms(&self) -> &[String] {
        &self.required
    }

    pub fn excluded_terms(&self) -> &[String] {
        &self.excluded
    }

    /// The query text without `+`/`-` operators, used for similarity scoring.
    pub fn plain_text(&self) -> String {
        self.terms.join(" ")
    }

    /// Whether a document with these tokens passes the operator filters.
    pub fn admits(&self, tokens: &HashSet<String>) -> bool {
        self.required.iter().all(|term| tokens.contains(term))
            && !self.excluded.iter().any(|term| tokens.contains(term))
    }
}

impl fmt::Display for NormalizedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

pub fn normalize_query(raw: &str) -> Result<NormalizedQuery, SearchError> {
    NormalizedQuery::parse(raw)
}

/// Lower-cased alphanumeric tokens of at least two characters, stop words removed.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() >= 2)
        .map(str::to_lowercase)
        .filter(|token| !STOP_WORDS.contains(&token.as_str()))
        .collect()
}

fn push_unique(target: &mut Vec<String>, tokens: Vec<String>) {
    for token in tokens {
        if !target.contains(&token) {
            target.push(token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_is_lowercased_collapsed_and_trimmed() {
        let query = normalize_query("  Künstliche   Intelligenz \n").unwrap();
        assert_eq!(query.as_str(), "künstliche intelligenz");
        assert_eq!(query.terms(), &["künstliche".to_string(), "intelligenz".to_string()]);
    }

    #[test]
    fn blank_query_is_rejected() {
        assert!(matches!(normalize_query("   \t "), Err(SearchError::EmptyQuery)));
        assert!(matches!(normalize_query(""), Err(SearchError::EmptyQuery)));
    }

    #[test]
    fn operators_become_filters() {
        let query = normalize_query("blockchain +ledger -bitcoin").unwrap();
        assert_eq!(query.required_terms(), &["ledger".to_string()]);
        assert_eq!(query.excluded_terms(), &["bitcoin".to_string()]);
        assert_eq!(query.terms(), &["blockchain".to_string(), "ledger".to_string()]);

        let tokens: HashSet<String> = ["blockchain", "ledger"].iter().map(|t| t.to_string()).collect();
        assert!(query.admits(&tokens));

        let blocked: HashSet<String> = ["ledger", "bitcoin"].iter().map(|t| t.to_string()).collect();
        assert!(!query.admits(&blocked));
    }

    #[test]
    fn tokenizer_drops_stop_words_and_punctuation() {
        assert_eq!(
            tokenize("What is the Blockchain? A ledger, of course!"),
            vec!["blockchain".to_string(), "ledger".to_string(), "course".to_string()]
        );
    }
}
