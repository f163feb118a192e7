//! Per-turn decision protocol.
//!
//! A turn either polls work that is already in flight for the session, or
//! starts a new backend query and waits a short, fixed bound for it. Answers
//! that miss the bound stay parked on the session and are handed out by a
//! later turn.

use crate::oracle::{Oracle, OracleError, Reply};
use crate::pending::PendingReply;
use crate::session::{InFlight, SessionStore};
use alice_common::config::Config;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::Instrument;

/// Characters allowed between the wake word and the question.
const WAKE_SEPARATORS: &[char] = &[',', '.', '!', '?', ':', ';', '-', '—'];

/// Trim `raw` and strip a leading `wake_word`, ignoring case.
///
/// The wake word only counts as a whole word: "Алиса, привет" loses it,
/// "Алисандр" does not.
pub fn normalize_utterance(raw: &str, wake_word: &str) -> String {
    let trimmed = raw.trim();
    let wake_word = wake_word.trim();
    if wake_word.is_empty() {
        return trimmed.to_string();
    }

    match strip_prefix_ignore_case(trimmed, wake_word) {
        Some(rest) if !rest.chars().next().is_some_and(char::is_alphanumeric) => rest
            .trim_start_matches(|c: char| c.is_whitespace() || WAKE_SEPARATORS.contains(&c))
            .to_string(),
        _ => trimmed.to_string(),
    }
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let mut chars = text.char_indices();
    let mut end = 0;
    for expected in prefix.chars() {
        let (idx, actual) = chars.next()?;
        if actual != expected && !actual.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
        end = idx + actual.len_utf8();
    }
    Some(&text[end..])
}

/// What a turn produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnReply {
    /// The utterance was empty; ask for a question.
    Prompt(String),
    /// A backend answer (or failure message) for the main text channel.
    Answer(String),
    /// A new question missed the wait bound.
    Thinking(String),
    /// Work is still in flight from an earlier turn.
    NotReady(String),
}

impl TurnReply {
    /// Main text channel.
    pub fn text(&self) -> &str {
        match self {
            Self::Prompt(text) | Self::Answer(text) => text,
            Self::Thinking(_) | Self::NotReady(_) => "",
        }
    }

    /// Spoken-hint channel.
    pub fn tts(&self) -> &str {
        match self {
            Self::Thinking(hint) | Self::NotReady(hint) => hint,
            Self::Prompt(_) | Self::Answer(_) => "",
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Prompt(_) => "prompt",
            Self::Answer(_) => "answer",
            Self::Thinking(_) => "thinking",
            Self::NotReady(_) => "not_ready",
        }
    }
}

/// Stateless turn handler over a shared [`SessionStore`] and [`Oracle`].
pub struct TurnOrchestrator {
    store: Arc<SessionStore>,
    oracle: Arc<dyn Oracle>,
    answer_timeout: Duration,
    oracle_timeout: Duration,
    wake_word: String,
    prompt_text: String,
    thinking_text: String,
    not_ready_text: String,
    failure_prefix: String,
}

impl TurnOrchestrator {
    pub fn new(store: Arc<SessionStore>, oracle: Arc<dyn Oracle>, config: &Config) -> Self {
        let dialog = &config.dialog;
        Self {
            store,
            oracle,
            answer_timeout: dialog.answer_timeout(),
            oracle_timeout: config.oracle.timeout().max(dialog.answer_timeout()),
            wake_word: dialog.wake_word.clone(),
            prompt_text: dialog.prompt_text.clone(),
            thinking_text: dialog.thinking_text.clone(),
            not_ready_text: dialog.not_ready_text.clone(),
            failure_prefix: dialog.failure_prefix.clone(),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Run one turn for `session_id`.
    pub async fn handle_turn(&self, session_id: &str, utterance: &str) -> TurnReply {
        let question = normalize_utterance(utterance, &self.wake_word);
        let reply = if question.is_empty() {
            self.handle_empty(session_id)
        } else {
            self.handle_question(session_id, question).await
        };

        tracing::debug!(kind = reply.kind(), "Turn finished");
        reply
    }

    /// An empty utterance never creates a session and only extends its
    /// lifetime when it delivers an answer that was in flight.
    fn handle_empty(&self, session_id: &str) -> TurnReply {
        let Some(session) = self.store.peek(session_id) else {
            return self.prompt();
        };
        let Some(mut state) = session.try_claim() else {
            return self.not_ready();
        };

        match state.poll_in_flight() {
            InFlight::Ready(reply) => {
                self.store.touch(&session);
                TurnReply::Answer(reply.text)
            }
            InFlight::Pending => self.not_ready(),
            InFlight::Idle => self.prompt(),
        }
    }

    async fn handle_question(&self, session_id: &str, question: String) -> TurnReply {
        let session = self.store.get_or_create(session_id);
        let Some(mut state) = session.try_claim() else {
            tracing::debug!("Session is held by another turn");
            return self.not_ready();
        };

        match state.poll_in_flight() {
            InFlight::Ready(reply) => return TurnReply::Answer(reply.text),
            InFlight::Pending => return self.not_ready(),
            InFlight::Idle => {}
        }

        let pending = self.spawn_query(question, state.continuation_token().to_string());
        if state.register(pending).is_err() {
            return self.not_ready();
        }

        match state.wait_in_flight(self.answer_timeout).await {
            InFlight::Ready(reply) => TurnReply::Answer(reply.text),
            InFlight::Pending | InFlight::Idle => {
                tracing::info!(
                    bound_ms = self.answer_timeout.as_millis() as u64,
                    "Answer deferred to a later turn"
                );
                TurnReply::Thinking(self.thinking_text.clone())
            }
        }
    }

    fn spawn_query(&self, question: String, continuation_token: String) -> PendingReply {
        let (sender, pending) = PendingReply::channel(self.failure_prefix.clone());
        let oracle = self.oracle.clone();
        let deadline = Instant::now() + self.oracle_timeout;
        let failure_prefix = self.failure_prefix.clone();

        tokio::spawn(
            async move {
                let reply = run_query(
                    oracle.as_ref(),
                    deadline,
                    &question,
                    &continuation_token,
                    &failure_prefix,
                )
                .await;
                if !sender.send(reply) {
                    tracing::debug!("Reply discarded, session no longer tracks it");
                }
            }
            .instrument(tracing::Span::current()),
        );

        pending
    }

    fn prompt(&self) -> TurnReply {
        TurnReply::Prompt(self.prompt_text.clone())
    }

    fn not_ready(&self) -> TurnReply {
        TurnReply::NotReady(self.not_ready_text.clone())
    }
}

/// Query the backend, folding every failure into a failure [`Reply`].
async fn run_query(
    oracle: &dyn Oracle,
    deadline: Instant,
    question: &str,
    continuation_token: &str,
    failure_prefix: &str,
) -> Reply {
    let started = Instant::now();
    let result = tokio::time::timeout_at(deadline, oracle.query(deadline, question, continuation_token))
        .await
        .unwrap_or_else(|_| Err(OracleError::Timeout(deadline.saturating_duration_since(started))));
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(reply) => {
            tracing::info!(oracle = oracle.name(), elapsed_ms, "Oracle answered");
            reply
        }
        Err(e) => {
            tracing::warn!(oracle = oracle.name(), elapsed_ms, error = %e, "Oracle query failed");
            Reply::failure(failure_prefix, e)
        }
    }
}
