use regex::Regex;

pub fn normalize_whitespace(text: &str) -> String {
    text.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Cuts `text` to at most `max_chars` characters on a word boundary when
/// possible, appending an ellipsis when anything was dropped.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let budget = max_chars.saturating_sub(1);
    let cut: String = text.chars().take(budget).collect();
    let trimmed = match cut.rfind(' ') {
        Some(index) if index > budget / 2 => &cut[..index],
        _ => cut.as_str(),
    };
    format!("{}…", trimmed.trim_end())
}

/// Splits a body into paragraph passages, merging short paragraphs until
/// `max_chars` is reached.
pub fn split_passages(body: &str, max_chars: usize) -> Vec<String> {
    let paragraphs = body
        .split("\n\n")
        .map(normalize_whitespace)
        .filter(|paragraph| !paragraph.is_empty())
        .collect::<Vec<_>>();

    let mut passages = Vec::new();
    let mut current = String::new();

    for paragraph in paragraphs {
        if current.is_empty() {
            current.push_str(&paragraph);
            continue;
        }

        if current.len() + paragraph.len() + 1 <= max_chars {
            current.push(' ');
            current.push_str(&paragraph);
        } else {
            passages.push(std::mem::take(&mut current));
            current.push_str(&paragraph);
        }
    }

    if !current.is_empty() {
        passages.push(current);
    }

    passages
}

pub fn term_hits(text: &str, terms: &[String]) -> usize {
    let tokens = crate::query::tokenize(text);
    terms
        .iter()
        .filter(|term| tokens.iter().any(|token| token == *term))
        .count()
}

/// The passage with the most query-term hits, earliest first on ties,
/// bounded to `max_chars`.
pub fn best_passage(body: &str, terms: &[String], max_chars: usize) -> String {
    let passages = split_passages(body, max_chars);
    let best = passages
        .iter()
        .enumerate()
        .max_by(|(left_index, left), (right_index, right)| {
            term_hits(left, terms)
                .cmp(&term_hits(right, terms))
                .then(right_index.cmp(left_index))
        })
        .map(|(_, passage)| passage.as_str())
        .unwrap_or_default();

    truncate_chars(best, max_chars)
}

#[derive(Debug, Clone)]
pub struct SentenceSplitter {
    pattern: Regex,
}

impl SentenceSplitter {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(r"[^.!?…]+(?:[.!?…]+|$)")?,
        })
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        let normalized = normalize_whitespace(text);
        self.pattern
            .find_iter(&normalized)
            .map(|found| found.as_str().trim().to_string())
            .filter(|sentence| sentence.chars().any(char::is_alphanumeric))
            .collect()
    }

    /// The sentence sharing the most terms with the query, earliest first on ties.
    pub fn best_sentence(&self, text: &str, terms: &[String]) -> Option<String> {
        self.split(text)
            .into_iter()
            .enumerate()
            .max_by(|(left_index, left), (right_index, right)| {
                term_hits(left, terms)
                    .cmp(&term_hits(right, terms))
                    .then(right_index.cmp(left_index))
            })
            .map(|(_, sentence)| sentence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_is_normalized() {
        let input = "A  \t  lot\nof \u{a0} spacing";
        assert_eq!(normalize_whitespace(input), "A lot of spacing");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "Künstliche Intelligenz verändert die Suche grundlegend";
        let cut = truncate_chars(text, 20);
        assert!(cut.chars().count() <= 20);
        assert!(cut.ends_with('…'));
        assert_eq!(truncate_chars("short", 20), "short");
    }

    #[test]
    fn passages_merge_short_paragraphs() {
        let body = "First para.\n\nSecond para.\n\nA much longer third paragraph that will not fit.";
        let passages = split_passages(body, 30);
        assert_eq!(passages[0], "First para. Second para.");
        assert_eq!(passages.len(), 2);
    }

    #[test]
    fn best_passage_prefers_term_hits() {
        let body = "Weather is mild today.\n\nLedger technology underpins blockchain networks.";
        let terms = vec!["blockchain".to_string()];
        let passage = best_passage(body, &terms, 30);
        assert!(passage.starts_with("Ledger"));
    }

    #[test]
    fn sentences_are_split_and_ranked() -> Result<(), regex::Error> {
        let splitter = SentenceSplitter::new()?;
        let text = "Climate data is growing. Temperatures rise faster! What about oceans?";
        let sentences = splitter.split(text);
        assert_eq!(sentences.len(), 3);

        let best = splitter.best_sentence(text, &["temperatures".to_string()]);
        assert_eq!(best.as_deref(), Some("Temperatures rise faster!"));
        Ok(())
    }
}
