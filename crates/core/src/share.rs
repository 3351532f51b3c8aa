use crate::error::ShareError;
use async_trait::async_trait;
use std::sync::Mutex;
use tracing::{debug, warn};

pub const SHARE_TITLE: &str = "Lumen Search - Results";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharePayload {
    pub title: String,
    pub text: String,
}

impl SharePayload {
    /// Refuses to build a payload for an empty query or an empty result set.
    pub fn for_results(query: &str, result_count: usize) -> Result<Self, ShareError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ShareError::NothingToShare("no query".to_string()));
        }
        if result_count == 0 {
            return Err(ShareError::NothingToShare("no results".to_string()));
        }

        let noun = if result_count == 1 { "result" } else { "results" };
        Ok(Self {
            title: SHARE_TITLE.to_string(),
            text: format!("Search results for \"{query}\" - {result_count} {noun} found"),
        })
    }
}

#[async_trait]
pub trait ShareTarget: Send + Sync {
    fn name(&self) -> &str;

    async fn share(&self, payload: &SharePayload) -> Result<(), ShareError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareOutcome {
    Native { target: String },
    Fallback { target: String, reason: String },
}

/// Tries `native` first and uses `fallback` when it is absent or fails.
pub async fn share_with_fallback(
    native: Option<&dyn ShareTarget>,
    fallback: &dyn ShareTarget,
    payload: &SharePayload,
) -> Result<ShareOutcome, ShareError> {
    let reason = match native {
        Some(target) => match target.share(payload).await {
            Ok(()) => {
                debug!(target = target.name(), "shared natively");
                return Ok(ShareOutcome::Native {
                    target: target.name().to_string(),
                });
            }
            Err(error) => {
                warn!(target = target.name(), %error, "native share failed, falling back");
                error.to_string()
            }
        },
        None => "no native share target".to_string(),
    };

    fallback.share(payload).await?;
    Ok(ShareOutcome::Fallback {
        target: fallback.name().to_string(),
        reason,
    })
}

/// Clipboard stand-in that keeps the last shared text.
#[derive(Debug, Default)]
pub struct InMemoryClipboard {
    contents: Mutex<Option<String>>,
}

impl InMemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Option<String> {
        self.contents
            .lock()
            .map(|contents| contents.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl ShareTarget for InMemoryClipboard {
    fn name(&self) -> &str {
        "clipboard"
    }

    async fn share(&self, payload: &SharePayload) -> Result<(), ShareError> {
        let mut contents = self.contents.lock().map_err(|_| ShareError::TargetFailed {
            target: self.name().to_string(),
            reason: "clipboard lock poisoned".to_string(),
        })?;
        *contents = Some(payload.text.clone());
        Ok(())
    }
}
