pub mod chunking;
pub mod clock;
pub mod corpus;
pub mod embeddings;
pub mod error;
pub mod exporter;
pub mod history;
pub mod intent;
pub mod models;
pub mod orchestrator;
pub mod query;
pub mod research;
pub mod responder;
pub mod session;
pub mod share;
pub mod stores;
pub mod summarizer;
pub mod traits;

pub use chunking::{normalize_whitespace, truncate_chars, SentenceSplitter};
pub use clock::{Clock, FixedClock, SystemClock};
pub use corpus::{
    derive_entry_id, discover_corpus_files, load_corpus, load_corpus_dir_best_effort,
    load_corpus_file, sample_corpus, Corpus, CorpusReport, SkippedFile,
};
pub use embeddings::{Embedder, TrigramEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{CorpusError, ExportError, HistoryError, SearchError, ShareError};
pub use exporter::{export, export_filename, parse_json_export, ExportFormat};
pub use history::{HistoryEntry, InMemoryHistoryStore, JsonFileHistoryStore, HISTORY_LIMIT};
pub use intent::{classify, Intent};
pub use models::{
    ChatOptions, CorpusEntry, DialogueTurn, Document, ExportSnapshot, RankingOptions,
    RelevanceTier, ResultSet, Role, ScoreBreakdown, Summary, SummaryOptions,
};
pub use orchestrator::{freshness_factor, SearchCoordinator};
pub use query::{normalize_query, tokenize, NormalizedQuery};
pub use research::{analyze, ResearchOptions, ResearchReport, ResearchStage};
pub use responder::GroundedResponder;
pub use session::{ChatSession, ChatState, PendingReply, QueryTicket, SearchSession};
pub use share::{share_with_fallback, InMemoryClipboard, SharePayload, ShareOutcome, ShareTarget};
pub use stores::{InMemoryKeywordIndex, InMemoryVectorIndex};
pub use summarizer::ExtractiveSummarizer;
pub use traits::{Candidate, HistoryStore, KeywordIndex, Responder, Retriever, Summarizer, VectorIndex};
