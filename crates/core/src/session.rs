use crate::clock::Clock;
use crate::models::{ChatOptions, DialogueTurn, ExportSnapshot, ResultSet, Summary};
use crate::query::{normalize_query, NormalizedQuery};
use crate::traits::{Responder, Retriever, Summarizer};
use crate::SearchError;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    Idle,
    AwaitingReply { turn_id: Uuid },
}

#[derive(Debug)]
pub struct PendingReply {
    turn_id: Uuid,
    position: usize,
}

impl PendingReply {
    pub fn turn_id(&self) -> Uuid {
        self.turn_id
    }
}

pub struct ChatSession<C: Clock> {
    clock: C,
    options: ChatOptions,
    turns: Vec<DialogueTurn>,
    state: ChatState,
}

impl<C: Clock> ChatSession<C> {
    pub fn new(clock: C, options: ChatOptions) -> Self {
        let greeting = DialogueTurn::assistant(options.greeting.clone(), Vec::new(), clock.now());
        Self {
            clock,
            options,
            turns: vec![greeting],
            state: ChatState::Idle,
        }
    }

    pub fn history(&self) -> &[DialogueTurn] {
        &self.turns
    }

    pub fn state(&self) -> ChatState {
        self.state
    }

    pub fn begin_turn(&mut self, body: &str) -> Result<PendingReply, SearchError> {
        if let ChatState::AwaitingReply { .. } = self.state {
            return Err(SearchError::TurnInFlight);
        }
        let body = body.trim();
        if body.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let turn = DialogueTurn::user(body, self.clock.now());
        let ticket = PendingReply {
            turn_id: turn.id,
            position: self.turns.len(),
        };
        self.turns.push(turn);
        self.state = ChatState::AwaitingReply {
            turn_id: ticket.turn_id,
        };
        Ok(ticket)
    }

    pub fn resolve(
        &mut self,
        ticket: PendingReply,
        outcome: Result<DialogueTurn, SearchError>,
    ) -> Result<&DialogueTurn, SearchError> {
        if self.state != (ChatState::AwaitingReply { turn_id: ticket.turn_id }) {
            return Err(SearchError::Responder(
                "reply does not belong to the pending turn".to_string(),
            ));
        }

        let turn = match outcome {
            Ok(turn) => turn,
            Err(error) => {
                warn!(turn_id = %ticket.turn_id, %error, "chat reply failed");
                DialogueTurn::failed(error.to_string(), self.clock.now())
            }
        };
        self.turns.push(turn);
        self.state = ChatState::Idle;

        self.turns
            .last()
            .ok_or_else(|| SearchError::Responder("dialogue history is empty".to_string()))
    }

    /// Failed or late replies come back as error turns, not as `Err`.
    pub async fn send<R>(
        &mut self,
        responder: &R,
        results: &ResultSet,
        body: &str,
    ) -> Result<DialogueTurn, SearchError>
    where
        R: Responder + ?Sized,
    {
        let ticket = self.begin_turn(body)?;
        self.await_reply(responder, results, ticket).await
    }

    pub async fn retry<R>(&mut self, responder: &R, results: &ResultSet) -> Result<DialogueTurn, SearchError>
    where
        R: Responder + ?Sized,
    {
        if let ChatState::AwaitingReply { .. } = self.state {
            return Err(SearchError::TurnInFlight);
        }
        if !self.turns.last().is_some_and(DialogueTurn::is_failure) {
            return Err(SearchError::Responder("there is no failed reply to retry".to_string()));
        }
        let Some(position) = self
            .turns
            .iter()
            .rposition(|turn| turn.role == crate::models::Role::User)
        else {
            return Err(SearchError::Responder("there is no user turn to retry".to_string()));
        };

        let ticket = PendingReply {
            turn_id: self.turns[position].id,
            position,
        };
        self.state = ChatState::AwaitingReply {
            turn_id: ticket.turn_id,
        };
        debug!(turn_id = %ticket.turn_id, "retrying chat reply");

        self.await_reply(responder, results, ticket).await
    }

    /// Gives up on the pending reply, recording a retryable error turn.
    /// Returns `false` when nothing was pending.
    pub fn abandon_pending(&mut self) -> bool {
        let ChatState::AwaitingReply { turn_id } = self.state else {
            return false;
        };
        warn!(%turn_id, "chat reply abandoned");
        self.turns
            .push(DialogueTurn::failed("the reply was abandoned before it arrived", self.clock.now()));
        self.state = ChatState::Idle;
        true
    }

    async fn await_reply<R>(
        &mut self,
        responder: &R,
        results: &ResultSet,
        ticket: PendingReply,
    ) -> Result<DialogueTurn, SearchError>
    where
        R: Responder + ?Sized,
    {
        let mut guard = InFlight {
            session: self,
            armed: true,
        };
        let outcome = guard.session.dispatch(responder, results, &ticket).await;
        guard.armed = false;
        let reply = guard.session.resolve(ticket, outcome).cloned();
        reply
    }

    async fn dispatch<R>(
        &self,
        responder: &R,
        results: &ResultSet,
        ticket: &PendingReply,
    ) -> Result<DialogueTurn, SearchError>
    where
        R: Responder + ?Sized,
    {
        let (history, rest) = self.turns.split_at(ticket.position);
        let turn = rest
            .first()
            .ok_or_else(|| SearchError::Responder("pending turn is missing".to_string()))?;

        let timeout = self.options.reply_timeout;
        tokio::time::timeout(timeout, responder.respond(history, results, turn))
            .await
            .map_err(|_| SearchError::Timeout(format!("no reply within {}s", timeout.as_secs_f64())))?
    }
}

// Abandons the pending reply if the owning future is dropped mid-await.
struct InFlight<'a, C: Clock> {
    session: &'a mut ChatSession<C>,
    armed: bool,
}

impl<C: Clock> Drop for InFlight<'_, C> {
    fn drop(&mut self) {
        if self.armed {
            self.session.abandon_pending();
        }
    }
}

// Results are only applied while `version` is still the session's current one.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryTicket {
    version: u64,
    query: NormalizedQuery,
    page: NonZeroUsize,
}

impl QueryTicket {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn query(&self) -> &NormalizedQuery {
        &self.query
    }

    pub fn page(&self) -> NonZeroUsize {
        self.page
    }
}

#[derive(Debug, Default)]
pub struct SearchSession {
    version: u64,
    query: Option<NormalizedQuery>,
    results: Option<ResultSet>,
    summary: Option<Summary>,
}

impl SearchSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn query(&self) -> Option<&NormalizedQuery> {
        self.query.as_ref()
    }

    pub fn results(&self) -> Option<&ResultSet> {
        self.results.as_ref()
    }

    pub fn current_summary(&self) -> Option<&Summary> {
        self.summary.as_ref()
    }

    pub fn begin(&mut self, raw: &str) -> Result<QueryTicket, SearchError> {
        let query = normalize_query(raw)?;
        self.version += 1;
        self.query = Some(query.clone());
        self.results = None;
        self.summary = None;
        debug!(version = self.version, query = %query, "search started");

        Ok(QueryTicket {
            version: self.version,
            query,
            page: NonZeroUsize::MIN,
        })
    }

    pub fn next_page(&self) -> Option<QueryTicket> {
        let query = self.query.as_ref()?;
        let results = self.results.as_ref()?;
        if !results.has_more() {
            return None;
        }
        Some(QueryTicket {
            version: self.version,
            query: query.clone(),
            page: NonZeroUsize::new(results.page + 1)?,
        })
    }

    /// Page 1 replaces the results and the next page is appended. Either way
    /// the summary is cleared.
    pub fn accept(&mut self, ticket: QueryTicket, set: ResultSet) -> Result<&ResultSet, SearchError> {
        if ticket.version != self.version {
            warn!(
                issued = ticket.version,
                current = self.version,
                "discarding results for a stale query"
            );
            return Err(SearchError::StaleTicket {
                issued: ticket.version,
                current: self.version,
            });
        }

        let page = ticket.page.get();
        let merged = match self.results.take() {
            _ if page == 1 => {
                self.summary = None;
                set
            }
            Some(current) if page == current.page + 1 => {
                let seen: HashSet<String> = current.documents.iter().map(|doc| doc.id.clone()).collect();
                let mut merged = current;
                merged
                    .documents
                    .extend(set.documents.into_iter().filter(|doc| !seen.contains(&doc.id)));
                merged.page = page;
                merged.total_candidates = set.total_candidates;
                self.summary = None;
                merged
            }
            current => {
                self.results = current;
                return Err(SearchError::InvalidPage(page));
            }
        };

        let merged: &ResultSet = self.results.insert(merged);
        Ok(merged)
    }

    pub async fn search<R>(&mut self, retriever: &R, raw: &str) -> Result<&ResultSet, SearchError>
    where
        R: Retriever + ?Sized,
    {
        let ticket = self.begin(raw)?;
        let set = retriever.retrieve(&ticket.query, ticket.page).await?;
        self.accept(ticket, set)
    }

    pub async fn load_more<R>(&mut self, retriever: &R) -> Result<&ResultSet, SearchError>
    where
        R: Retriever + ?Sized,
    {
        let Some(ticket) = self.next_page() else {
            let next = self.results.as_ref().map_or(1, |results| results.page + 1);
            return Err(SearchError::InvalidPage(next));
        };
        let set = retriever.retrieve(&ticket.query, ticket.page).await?;
        self.accept(ticket, set)
    }

    /// `None` for an empty result set; the summarizer is not called then.
    pub async fn summary<S>(&mut self, summarizer: &S) -> Result<Option<&Summary>, SearchError>
    where
        S: Summarizer + ?Sized,
    {
        let (Some(query), Some(results)) = (self.query.as_ref(), self.results.as_ref()) else {
            return Ok(None);
        };
        if results.is_empty() {
            return Ok(None);
        }

        let summary = summarizer.summarize(query, results).await?;
        let summary: &Summary = self.summary.insert(summary);
        Ok(Some(summary))
    }

    pub fn snapshot<C: Clock + ?Sized>(&self, clock: &C) -> Result<ExportSnapshot, SearchError> {
        let query = self.query.as_ref().ok_or(SearchError::EmptyQuery)?;
        Ok(ExportSnapshot {
            query: query.as_str().to_string(),
            documents: self
                .results
                .as_ref()
                .map(|results| results.documents.clone())
                .unwrap_or_default(),
            summary: self.summary.clone(),
            generated_at: clock.now(),
        })
    }
}
