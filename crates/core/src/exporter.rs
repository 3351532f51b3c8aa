//! Serializes an [`ExportSnapshot`] as JSON, plain text or Markdown.
//!
//! Exports are pure: the same snapshot and format always produce the same
//! bytes. Only JSON is meant to be read back; the text formats are reports.

use crate::error::ExportError;
use crate::models::{relevance_percent, Document, ExportSnapshot, Summary};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::{self, Write};
use std::str::FromStr;

pub const EXPORTED_BY: &str = "Lumen Search";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    Json,
    PlainText,
    Markdown,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::PlainText => "txt",
            ExportFormat::Markdown => "md",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportFormat::Json => "json",
            ExportFormat::PlainText => "text",
            ExportFormat::Markdown => "markdown",
        };
        f.write_str(name)
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "text" | "txt" | "plain" | "plaintext" => Ok(ExportFormat::PlainText),
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            other => Err(ExportError::UnsupportedFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonExport {
    query: String,
    generated_at: DateTime<Utc>,
    results: Vec<JsonResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    summary: Option<Summary>,
    metadata: JsonMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonResult {
    id: String,
    title: String,
    url: String,
    snippet: String,
    source: String,
    relevance: f64,
    relevance_percent: u8,
    published_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonMetadata {
    total_results: usize,
    mean_relevance: f64,
    mean_relevance_percent: u8,
    exported_by: String,
}

pub fn export(snapshot: &ExportSnapshot, format: ExportFormat) -> Result<Vec<u8>, ExportError> {
    validate(snapshot)?;
    match format {
        ExportFormat::Json => to_json(snapshot),
        ExportFormat::PlainText => Ok(to_plain_text(snapshot).into_bytes()),
        ExportFormat::Markdown => Ok(to_markdown(snapshot).into_bytes()),
    }
}

/// Reads back a JSON export.
pub fn parse_json_export(bytes: &[u8]) -> Result<ExportSnapshot, ExportError> {
    let raw = String::from_utf8(bytes.to_vec())?;
    let parsed: JsonExport = serde_json::from_str(&raw)?;

    let snapshot = ExportSnapshot {
        query: parsed.query,
        documents: parsed
            .results
            .into_iter()
            .map(|result| Document {
                id: result.id,
                title: result.title,
                url: result.url,
                snippet: result.snippet,
                source: result.source,
                relevance: result.relevance,
                published_at: result.published_at,
                explain: None,
            })
            .collect(),
        summary: parsed.summary,
        generated_at: parsed.generated_at,
    };
    validate(&snapshot)?;
    Ok(snapshot)
}

/// `search-<slug>-<YYYY-MM-DD>.<ext>`, where the slug is the lower-cased
/// query with every run of other characters replaced by one dash.
pub fn export_filename(query: &str, date: NaiveDate, format: ExportFormat) -> String {
    let mut slug = String::new();
    for ch in query.trim().to_lowercase().chars() {
        if ch.is_alphanumeric() {
            slug.push(ch);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    let slug = if slug.is_empty() { "query" } else { slug };

    format!("search-{slug}-{}.{}", date.format("%Y-%m-%d"), format.extension())
}

fn validate(snapshot: &ExportSnapshot) -> Result<(), ExportError> {
    let mut seen = HashSet::new();
    for doc in &snapshot.documents {
        if !(0.0..=1.0).contains(&doc.relevance) {
            return Err(ExportError::MalformedSnapshot(format!(
                "document {} has relevance {} outside [0, 1]",
                doc.id, doc.relevance
            )));
        }
        if !seen.insert(doc.id.as_str()) {
            return Err(ExportError::MalformedSnapshot(format!(
                "document id {} appears more than once",
                doc.id
            )));
        }
    }
    Ok(())
}

fn to_json(snapshot: &ExportSnapshot) -> Result<Vec<u8>, ExportError> {
    let mean = snapshot.mean_relevance();
    let export = JsonExport {
        query: snapshot.query.clone(),
        generated_at: snapshot.generated_at,
        results: snapshot
            .documents
            .iter()
            .map(|doc| JsonResult {
                id: doc.id.clone(),
                title: doc.title.clone(),
                url: doc.url.clone(),
                snippet: doc.snippet.clone(),
                source: doc.source.clone(),
                relevance: doc.relevance,
                relevance_percent: doc.relevance_percent(),
                published_at: doc.published_at,
            })
            .collect(),
        summary: snapshot.summary.clone(),
        metadata: JsonMetadata {
            total_results: snapshot.documents.len(),
            mean_relevance: mean,
            mean_relevance_percent: relevance_percent(mean),
            exported_by: EXPORTED_BY.to_string(),
        },
    };

    let mut bytes = serde_json::to_vec_pretty(&export)?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn timestamp(value: DateTime<Utc>) -> String {
    value.format("%Y-%m-%d %H:%M UTC").to_string()
}

fn to_plain_text(snapshot: &ExportSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "SEARCH RESULTS - {}", snapshot.query);
    let _ = writeln!(out, "Generated: {}", timestamp(snapshot.generated_at));
    let _ = writeln!(out, "Results: {}", snapshot.documents.len());
    let _ = writeln!(out, "Mean relevance: {}%", relevance_percent(snapshot.mean_relevance()));
    out.push('\n');

    if let Some(summary) = &snapshot.summary {
        let _ = writeln!(out, "SUMMARY:\n{}\n", summary.text.trim_end());
    }

    out.push_str("DETAILED RESULTS:\n");
    for (index, doc) in snapshot.documents.iter().enumerate() {
        let _ = writeln!(out, "\n{}. {}", index + 1, doc.title);
        let _ = writeln!(out, "   URL: {}", doc.url);
        let _ = writeln!(out, "   Source: {}", doc.source);
        let _ = writeln!(
            out,
            "   Relevance: {}% ({})",
            doc.relevance_percent(),
            doc.tier().label()
        );
        let _ = writeln!(out, "   Description: {}", doc.snippet);
        let _ = writeln!(out, "   Published: {}", timestamp(doc.published_at));
    }

    let _ = write!(out, "\n---\nExported by: {EXPORTED_BY}\n");
    out
}

fn to_markdown(snapshot: &ExportSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Search results: {}\n", snapshot.query);
    let _ = writeln!(out, "**Generated:** {}  ", timestamp(snapshot.generated_at));
    let _ = writeln!(out, "**Results:** {}  ", snapshot.documents.len());
    let _ = writeln!(
        out,
        "**Mean relevance:** {}%\n",
        relevance_percent(snapshot.mean_relevance())
    );

    if let Some(summary) = &snapshot.summary {
        let _ = writeln!(out, "## Summary\n\n{}\n", summary.text.trim_end());
    }

    out.push_str("## Detailed results\n");
    for (index, doc) in snapshot.documents.iter().enumerate() {
        let _ = writeln!(out, "\n### {}. {}\n", index + 1, doc.title);
        let _ = writeln!(out, "- **URL:** [{}]({})", doc.url, doc.url);
        let _ = writeln!(out, "- **Source:** {}", doc.source);
        let _ = writeln!(out, "- **Relevance:** {}%", doc.relevance_percent());
        let _ = writeln!(out, "- **Date:** {}\n", doc.published_at.format("%Y-%m-%d"));
        let _ = writeln!(out, "{}", doc.snippet);
    }

    let _ = write!(out, "\n---\n*Exported by: {EXPORTED_BY}*\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn doc(id: &str, relevance: f64) -> Document {
        Document {
            id: id.to_string(),
            title: format!("Blockchain {id}"),
            url: format!("https://example.com/{id}"),
            snippet: "Ledgers shared across many nodes.".to_string(),
            source: "CryptoJournal".to_string(),
            relevance,
            published_at: Utc.with_ymd_and_hms(2024, 1, 15, 8, 30, 0).unwrap(),
            explain: None,
        }
    }

    fn snapshot(documents: Vec<Document>) -> ExportSnapshot {
        ExportSnapshot {
            query: "blockchain".to_string(),
            documents,
            summary: Some(Summary {
                text: "Blockchains are shared ledgers. [CryptoJournal]".to_string(),
                sources: vec!["CryptoJournal".to_string()],
                confidence: 0.85,
                analyzed_count: 2,
            }),
            generated_at: Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn json_round_trip_keeps_query_documents_and_relevance() {
        let original = snapshot(vec![doc("a", 0.934), doc("b", 0.8)]);
        let bytes = export(&original, ExportFormat::Json).unwrap();
        let parsed = parse_json_export(&bytes).unwrap();

        assert_eq!(parsed.query, original.query);
        assert_eq!(parsed.documents.len(), original.documents.len());
        for (left, right) in parsed.documents.iter().zip(&original.documents) {
            assert!((left.relevance - right.relevance).abs() < 1e-9);
            assert_eq!(left.title, right.title);
            assert_eq!(left.url, right.url);
            assert_eq!(left.source, right.source);
            assert_eq!(left.published_at, right.published_at);
        }
        assert_eq!(
            parsed.summary.map(|summary| summary.text),
            original.summary.map(|summary| summary.text)
        );
    }

    #[test]
    fn exports_are_byte_identical_for_the_same_snapshot() {
        let snapshot = snapshot(vec![doc("a", 0.9)]);
        for format in [ExportFormat::Json, ExportFormat::PlainText, ExportFormat::Markdown] {
            assert_eq!(export(&snapshot, format).unwrap(), export(&snapshot, format).unwrap());
        }
    }

    #[test]
    fn empty_result_set_still_exports_valid_json() {
        let mut empty = snapshot(Vec::new());
        empty.summary = None;
        let bytes = export(&empty, ExportFormat::Json).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["results"].as_array().map(Vec::len), Some(0));
        assert_eq!(value["metadata"]["total_results"], 0);
        assert_eq!(value["metadata"]["mean_relevance"], 0.0);
        assert!(parse_json_export(&bytes).unwrap().documents.is_empty());
    }

    #[test]
    fn percentages_agree_across_formats() {
        let snapshot = snapshot(vec![doc("a", 0.876)]);
        let json: serde_json::Value =
            serde_json::from_slice(&export(&snapshot, ExportFormat::Json).unwrap()).unwrap();
        let text = String::from_utf8(export(&snapshot, ExportFormat::PlainText).unwrap()).unwrap();
        let markdown = String::from_utf8(export(&snapshot, ExportFormat::Markdown).unwrap()).unwrap();

        assert_eq!(json["results"][0]["relevance_percent"], 88);
        assert!(text.contains("Relevance: 88% (relevant)"));
        assert!(markdown.contains("- **Relevance:** 88%"));
        assert!(markdown.contains("[https://example.com/a](https://example.com/a)"));
        assert!(text.contains("SUMMARY:\nBlockchains are shared ledgers."));
    }

    #[test]
    fn malformed_snapshots_are_rejected() {
        let out_of_range = snapshot(vec![doc("a", 1.2)]);
        assert!(matches!(
            export(&out_of_range, ExportFormat::Json),
            Err(ExportError::MalformedSnapshot(_))
        ));

        let not_a_number = snapshot(vec![doc("a", f64::NAN)]);
        assert!(matches!(
            export(&not_a_number, ExportFormat::Markdown),
            Err(ExportError::MalformedSnapshot(_))
        ));

        let duplicated = snapshot(vec![doc("a", 0.9), doc("a", 0.8)]);
        assert!(matches!(
            export(&duplicated, ExportFormat::PlainText),
            Err(ExportError::MalformedSnapshot(_))
        ));
    }

    #[test]
    fn filenames_are_derived_from_query_and_date() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        assert_eq!(
            export_filename("  Renewable   Energy ", date, ExportFormat::Markdown),
            "search-renewable-energy-2024-02-01.md"
        );
        assert_eq!(
            export_filename("AI & ethics?", date, ExportFormat::Json),
            "search-ai-ethics-2024-02-01.json"
        );
        assert_eq!(export_filename("!!!", date, ExportFormat::PlainText), "search-query-2024-02-01.txt");
    }

    #[test]
    fn formats_parse_from_names() {
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert_eq!("md".parse::<ExportFormat>().unwrap(), ExportFormat::Markdown);
        assert_eq!("text".parse::<ExportFormat>().unwrap(), ExportFormat::PlainText);
        assert!(matches!("pdf".parse::<ExportFormat>(), Err(ExportError::UnsupportedFormat(_))));
    }
}
