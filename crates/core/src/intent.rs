use crate::chunking::normalize_whitespace;
use crate::query::tokenize;
use serde::{Deserialize, Serialize};

/// What a chat message asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intent {
    Summarize,
    Sources,
    Compare {
        left: Option<String>,
        right: Option<String>,
    },
    Elaborate,
    Search {
        query: String,
    },
    General {
        terms: Vec<String>,
    },
}

const SEARCH_COMMANDS: &[&str] = &[
    "search for ",
    "search ",
    "look up ",
    "find ",
    "suche nach ",
    "suche ",
    "recherchiere ",
];
const SUMMARIZE_PREFIXES: &[&str] = &["summar", "zusammenfass", "overview", "tldr", "überblick"];
const SOURCES_PREFIXES: &[&str] = &["source", "quelle", "referenz", "reference", "cite", "citation"];
const COMPARE_PREFIXES: &[&str] = &["compar", "vergleich", "unterschied", "differ", "versus"];
const ELABORATE_WORDS: &[&str] = &["more", "elaborate", "continue", "details", "mehr", "weiter", "ausführlicher"];
const PAIR_SEPARATORS: &[&str] = &[" vs. ", " vs ", " versus ", " and ", " und ", " or ", " oder "];

pub fn classify(message: &str) -> Intent {
    let lowered = normalize_whitespace(message).to_lowercase();
    let words: Vec<String> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect();

    if let Some(query) = search_command(&lowered) {
        return Intent::Search { query };
    }
    if has_prefix(&words, SUMMARIZE_PREFIXES) {
        return Intent::Summarize;
    }
    if has_prefix(&words, SOURCES_PREFIXES) {
        return Intent::Sources;
    }
    if has_prefix(&words, COMPARE_PREFIXES) || words.iter().any(|word| word == "vs") {
        let (left, right) = comparison_subjects(&lowered);
        return Intent::Compare { left, right };
    }
    if words.iter().any(|word| ELABORATE_WORDS.contains(&word.as_str())) {
        return Intent::Elaborate;
    }

    Intent::General {
        terms: tokenize(&lowered),
    }
}

fn search_command(lowered: &str) -> Option<String> {
    SEARCH_COMMANDS.iter().find_map(|command| {
        let rest = lowered.strip_prefix(command)?.trim();
        let rest = rest.trim_matches(|c: char| c == '"' || c == '\'' || c == '?' || c == '.');
        (!rest.is_empty()).then(|| rest.to_string())
    })
}

fn has_prefix(words: &[String], prefixes: &[&str]) -> bool {
    words
        .iter()
        .any(|word| prefixes.iter().any(|prefix| word.starts_with(prefix)))
}

fn comparison_subjects(lowered: &str) -> (Option<String>, Option<String>) {
    let Some((before, after)) = PAIR_SEPARATORS
        .iter()
        .find_map(|separator| lowered.split_once(separator))
    else {
        return (None, None);
    };

    (subject(before), subject(after))
}

fn subject(segment: &str) -> Option<String> {
    let terms: Vec<String> = tokenize(segment)
        .into_iter()
        .filter(|term| !COMPARE_PREFIXES.iter().any(|prefix| term.starts_with(prefix)))
        .filter(|term| !matches!(term.as_str(), "between" | "zwischen" | "vs"))
        .collect();
    (!terms.is_empty()).then(|| terms.join(" "))
}
