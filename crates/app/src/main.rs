use chrono::Utc;
use clap::{Parser, Subcommand};
use lumen_search_core::{
    analyze, classify, export, export_filename, load_corpus, sample_corpus, share_with_fallback,
    ChatOptions, ChatSession, Corpus, DialogueTurn, ExportFormat, ExtractiveSummarizer,
    GroundedResponder, HistoryEntry, HistoryStore, InMemoryClipboard, InMemoryKeywordIndex,
    InMemoryVectorIndex, Intent, JsonFileHistoryStore, RankingOptions, ResearchOptions,
    ResearchReport, ResultSet, SearchCoordinator, SearchSession, SharePayload, ShareOutcome,
    Summary, SummaryOptions, SystemClock,
};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

type Coordinator = SearchCoordinator<InMemoryKeywordIndex, InMemoryVectorIndex, SystemClock>;

#[derive(Parser)]
#[command(name = "lumen-search", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Corpus JSON file or folder of JSON files. The bundled sample corpus is used when unset.
    #[arg(long, env = "LUMEN_CORPUS", global = true)]
    corpus: Option<PathBuf>,

    /// File that keeps the last searches.
    #[arg(long, env = "LUMEN_HISTORY_FILE", default_value = ".lumen/history.json", global = true)]
    history_file: PathBuf,

    /// Results per page.
    #[arg(long, env = "LUMEN_PAGE_SIZE", default_value = "10", global = true)]
    page_size: NonZeroUsize,

    /// Seconds to wait for a chat reply.
    #[arg(long, env = "LUMEN_REPLY_TIMEOUT_SECS", default_value = "30", global = true)]
    reply_timeout_secs: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Search the corpus and print one page of ranked results.
    Search {
        #[arg(long)]
        query: String,
        /// Page to print, starting at 1.
        #[arg(long, default_value = "1")]
        page: NonZeroUsize,
        /// Also print a summary of the results.
        #[arg(long, default_value_t = false)]
        summary: bool,
        /// Print the score breakdown for each result.
        #[arg(long, default_value_t = false)]
        explain: bool,
        /// Record the search in the history file.
        #[arg(long, default_value_t = false)]
        save: bool,
    },
    /// Summarize the first page of results.
    Summarize {
        #[arg(long)]
        query: String,
    },
    /// Chat about the results, one message per line on stdin.
    Chat {
        /// Search to run before the first message.
        #[arg(long)]
        query: Option<String>,
    },
    /// Source quality, related topics and key insights for a query.
    Research {
        #[arg(long)]
        query: String,
    },
    /// Write the results of a query to a file.
    Export {
        #[arg(long)]
        query: String,
        /// json, text or markdown.
        #[arg(long, default_value = "json")]
        format: ExportFormat,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Show or clear the search history.
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Produce the short share text for a query.
    Share {
        #[arg(long)]
        query: String,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    List,
    Clear,
}

fn fail(error: impl std::fmt::Display) -> anyhow::Error {
    anyhow::anyhow!(error.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "lumen-search boot"
    );

    let history = JsonFileHistoryStore::new(&cli.history_file);

    if let Command::History { action } = &cli.command {
        match action {
            HistoryAction::List => {
                let entries = history.load().await.map_err(fail)?;
                if entries.is_empty() {
                    println!("history is empty");
                }
                for entry in entries {
                    println!(
                        "{}  {}  ({} results)",
                        entry.timestamp.format("%Y-%m-%d %H:%M"),
                        entry.query,
                        entry.result_count
                    );
                    println!("   {}", entry.summary_excerpt);
                }
            }
            HistoryAction::Clear => {
                history.clear().await.map_err(fail)?;
                println!("history cleared");
            }
        }
        return Ok(());
    }

    let corpus = Arc::new(open_corpus(cli.corpus.as_deref())?);
    let ranking = RankingOptions {
        page_size: cli.page_size.get(),
        explain: matches!(cli.command, Command::Search { explain: true, .. }),
        ..RankingOptions::default()
    };
    let coordinator = SearchCoordinator::in_memory(corpus, SystemClock, ranking)
        .await
        .map_err(fail)?;
    let summarizer = ExtractiveSummarizer::new(SummaryOptions::default()).map_err(fail)?;
    let mut session = SearchSession::new();

    match cli.command {
        Command::Search {
            query,
            page,
            summary,
            explain,
            save,
        } => {
            let results = fetch_page(&mut session, &coordinator, &query, page).await?;
            print_results(&results, page, explain);

            if summary {
                let summary = session.summary(&summarizer).await.map_err(fail)?;
                print_summary(summary);
            }
            if save {
                let excerpt = session.current_summary().map(|summary| summary.text.as_str());
                let entry = HistoryEntry::new(query.trim(), results.total_candidates, excerpt, Utc::now());
                let entries = history.append_bounded(entry).await.map_err(fail)?;
                println!("saved to history ({} entries)", entries.len());
            }
        }
        Command::Summarize { query } => {
            session.search(&coordinator, &query).await.map_err(fail)?;
            let summary = session.summary(&summarizer).await.map_err(fail)?;
            print_summary(summary);
        }
        Command::Chat { query } => {
            let options = ChatOptions {
                reply_timeout: Duration::from_secs(cli.reply_timeout_secs),
                ..ChatOptions::default()
            };
            run_chat(&mut session, &coordinator, options, query.as_deref()).await?;
        }
        Command::Research { query } => {
            session.search(&coordinator, &query).await.map_err(fail)?;
            let (Some(normalized), Some(results)) = (session.query(), session.results()) else {
                return Err(anyhow::anyhow!("no results to analyze"));
            };
            let options = ResearchOptions {
                freshness_half_life_days: coordinator.options().freshness_half_life_days,
                ..ResearchOptions::default()
            };
            let report = analyze(normalized, results, &SystemClock, &options, |stage| {
                println!("[{:>3}%] {}", stage.percent(), stage.label());
            })
            .map_err(fail)?;
            print_research(&report);
        }
        Command::Export {
            query,
            format,
            out_dir,
        } => {
            let results = session.search(&coordinator, &query).await.map_err(fail)?;
            if !results.is_empty() {
                session.summary(&summarizer).await.map_err(fail)?;
            }
            let snapshot = session.snapshot(&SystemClock).map_err(fail)?;
            let bytes = export(&snapshot, format).map_err(fail)?;
            let filename = export_filename(&snapshot.query, snapshot.generated_at.date_naive(), format);
            let path = write_export(&out_dir, &filename, &bytes).await?;
            println!("exported {} results to {}", snapshot.documents.len(), path.display());
        }
        Command::Share { query } => {
            let results = session.search(&coordinator, &query).await.map_err(fail)?;
            let payload = SharePayload::for_results(&query, results.total_candidates).map_err(fail)?;
            let clipboard = InMemoryClipboard::new();
            match share_with_fallback(None, &clipboard, &payload).await.map_err(fail)? {
                ShareOutcome::Native { target } => println!("shared via {target}"),
                ShareOutcome::Fallback { target, reason } => {
                    println!("copied to {target} ({reason}):");
                    println!("{}", clipboard.contents().unwrap_or_default());
                }
            }
        }
        Command::History { .. } => {}
    }

    Ok(())
}

fn open_corpus(path: Option<&Path>) -> anyhow::Result<Corpus> {
    let Some(path) = path else {
        return sample_corpus().map_err(fail);
    };

    let report = load_corpus(path).map_err(fail)?;
    if !report.skipped_files.is_empty() {
        warn!(
            "skipped_files={} for corpus={}",
            report.skipped_files.len(),
            path.display()
        );
        for skipped in &report.skipped_files {
            warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped corpus file");
        }
    }
    info!(path = %path.display(), entries = report.corpus.len(), "corpus loaded");
    Ok(report.corpus)
}

/// Runs the query and loads pages until `page` is available.
async fn fetch_page(
    session: &mut SearchSession,
    coordinator: &Coordinator,
    query: &str,
    page: NonZeroUsize,
) -> anyhow::Result<ResultSet> {
    let mut results = session.search(coordinator, query).await.map_err(fail)?.clone();
    while results.page < page.get() && results.has_more() {
        results = session.load_more(coordinator).await.map_err(fail)?.clone();
    }
    Ok(results)
}

fn print_results(results: &ResultSet, page: NonZeroUsize, explain: bool) {
    println!("query: {}", results.query);
    if results.is_empty() {
        println!("No results for \"{}\". Try different or more general terms.", results.query);
        return;
    }

    let start = (page.get() - 1) * results.page_size;
    let shown: Vec<_> = results.documents.iter().enumerate().skip(start).collect();
    if shown.is_empty() {
        println!("page {page} is past the last result ({} total)", results.total_candidates);
        return;
    }

    for (index, doc) in shown {
        println!(
            "{}. {} [{}% {}]",
            index + 1,
            doc.title,
            doc.relevance_percent(),
            doc.tier().label()
        );
        println!(
            "   source={} published={} url={}",
            doc.source,
            doc.published_at.format("%Y-%m-%d"),
            doc.url
        );
        println!("   {}", doc.snippet);
        if let (true, Some(breakdown)) = (explain, doc.explain) {
            println!(
                "   explain: keyword={:.4} vector={:.4} fusion={:.4} freshness={:.4}",
                breakdown.keyword, breakdown.vector, breakdown.fusion, breakdown.freshness
            );
        }
    }
    if results.has_more() {
        println!("more results available: --page {}", page.get() + 1);
    }
}

fn print_summary(summary: Option<&Summary>) {
    match summary {
        Some(summary) => {
            println!("\n{}", summary.text);
            println!("sources: {}", summary.sources.join(", "));
        }
        None => println!("Run a search with results first to get a summary."),
    }
}

fn print_research(report: &ResearchReport) {
    println!("\nresearch: {} ({} results)", report.query, report.analyzed_count);
    println!(
        "source quality: trust={}% freshness={}% relevance={}%",
        report.source_quality.trust, report.source_quality.freshness, report.source_quality.relevance
    );
    for stat in &report.source_breakdown {
        println!(
            "  {}: {} result(s), mean relevance {}%",
            stat.source,
            stat.count,
            lumen_search_core::models::relevance_percent(stat.mean_relevance)
        );
    }
    if !report.insights.is_empty() {
        println!("key insights:");
        for insight in &report.insights {
            println!(
                "  [{}] {} ({}% confidence; {})",
                insight.topic,
                insight.statement,
                insight.confidence,
                insight.sources.join(", ")
            );
        }
    }
    if !report.related_topics.is_empty() {
        println!("research further:");
        for topic in &report.related_topics {
            println!("  {} ({} documents)", topic.suggested_query, topic.documents);
        }
    }
}

fn format_turn(turn: &DialogueTurn) -> String {
    let mut out = format!("assistant> {}", turn.body);
    if !turn.cited_sources().is_empty() {
        out.push_str(&format!("\nsources: {}", turn.cited_sources().join(", ")));
    }
    out
}

async fn run_chat(
    session: &mut SearchSession,
    coordinator: &Coordinator,
    options: ChatOptions,
    query: Option<&str>,
) -> anyhow::Result<()> {
    let responder = GroundedResponder::new(SystemClock, options.clone()).map_err(fail)?;
    let mut chat = ChatSession::new(SystemClock, options);
    for turn in chat.history() {
        println!("{}", format_turn(turn));
    }

    if let Some(query) = query {
        let results = session.search(coordinator, query).await.map_err(fail)?;
        println!("searched \"{}\": {} results", results.query, results.total_candidates);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if matches!(line, "exit" | "quit") {
            break;
        }
        if line.is_empty() {
            continue;
        }

        let empty = ResultSet::empty("", 1, coordinator.options().page_size);
        let results = session.results().unwrap_or(&empty);
        let reply = if line == "retry" {
            chat.retry(&responder, results).await
        } else {
            chat.send(&responder, results, line).await
        };

        match reply {
            Ok(turn) => println!("{}", format_turn(&turn)),
            Err(error) => {
                println!("error: {error}");
                continue;
            }
        }

        if let Intent::Search { query } = classify(line) {
            match session.search(coordinator, &query).await {
                Ok(results) => println!("searched \"{}\": {} results", results.query, results.total_candidates),
                Err(error) => println!("search failed: {error}"),
            }
        }
    }

    Ok(())
}

async fn write_export(out_dir: &Path, filename: &str, bytes: &[u8]) -> anyhow::Result<PathBuf> {
    tokio::fs::create_dir_all(out_dir).await?;
    let path = out_dir.join(filename);
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn export_format_is_parsed_from_flag() {
        let cli = Cli::try_parse_from([
            "lumen-search",
            "export",
            "--query",
            "blockchain",
            "--format",
            "markdown",
        ])
        .unwrap();
        match cli.command {
            Command::Export { format, .. } => assert_eq!(format, ExportFormat::Markdown),
            _ => panic!("expected export command"),
        }
        assert!(Cli::try_parse_from(["lumen-search", "export", "--query", "x", "--format", "pdf"]).is_err());
    }

    #[test]
    fn assistant_turns_list_their_sources() {
        let turn = DialogueTurn::assistant("Ledgers are shared.", vec!["CryptoJournal".to_string()], Utc::now());
        assert_eq!(format_turn(&turn), "assistant> Ledgers are shared.\nsources: CryptoJournal");
    }

    #[tokio::test]
    async fn export_is_written_under_out_dir() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let out_dir = dir.path().join("reports");
        let path = write_export(&out_dir, "search-ai-2024-01-01.json", b"{}").await?;
        assert_eq!(path, out_dir.join("search-ai-2024-01-01.json"));
        assert_eq!(std::fs::read(&path)?, b"{}");
        Ok(())
    }

    #[tokio::test]
    async fn later_pages_are_loaded_in_order() -> Result<(), Box<dyn std::error::Error>> {
        let corpus = Arc::new(sample_corpus()?);
        let options = RankingOptions {
            page_size: 2,
            ..RankingOptions::default()
        };
        let coordinator = SearchCoordinator::in_memory(corpus, SystemClock, options).await?;
        let mut session = SearchSession::new();

        let results = fetch_page(&mut session, &coordinator, "blockchain", NonZeroUsize::new(2).unwrap())
            .await
            .map_err(|error| error.to_string())?;
        assert_eq!(results.page, 2);
        assert_eq!(results.len(), 4);
        Ok(())
    }
}
