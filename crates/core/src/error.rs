use thiserror::Error;

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("invalid corpus entry: {0}")]
    InvalidEntry(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("query is empty")]
    EmptyQuery,

    #[error("retrieval failed: {0}")]
    Retrieval(String),

    #[error("summarization failed: {0}")]
    Summarization(String),

    #[error("responder failed: {0}")]
    Responder(String),

    #[error("a reply is already pending for this session")]
    TurnInFlight,

    #[error("results belong to query version {issued}, current version is {current}")]
    StaleTicket { issued: u64, current: u64 },

    #[error("page {0} is out of order for the current query")]
    InvalidPage(usize),

    #[error("operation timed out: {0}")]
    Timeout(String),
}

impl SearchError {
    /// Failures the caller may retry with the same input.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SearchError::Retrieval(_)
                | SearchError::Summarization(_)
                | SearchError::Responder(_)
                | SearchError::Timeout(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("export is not valid utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("unsupported export format: {0}")]
    UnsupportedFormat(String),
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ShareError {
    #[error("nothing to share: {0}")]
    NothingToShare(String),

    #[error("share target {target} failed: {reason}")]
    TargetFailed { target: String, reason: String },
}

pub type Result<T, E = SearchError> = std::result::Result<T, E>;
