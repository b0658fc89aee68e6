//! The per-turn streaming state machine.
//!
//! A turn moves `Idle -> Sending -> Streaming` and ends in exactly one of
//! `Completed`, `Cancelled` or `Failed`. The accumulator folds every delta
//! into the transcript's open message and publishes each state change on a
//! watch channel so observers can track whether a reply is in flight.

use std::fmt;
use std::time::Instant;

use futures::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::observability::{
    STREAM_FIRST_DELTA, TURN_DELTAS, TURN_DURATION, TURNS_CANCELLED, TURNS_COMPLETED,
    TURNS_FAILED, TURNS_STARTED,
};
use crate::provider::Session;
use crate::render::Renderer;
use crate::transcript::Transcript;
use crate::{Error, Result};

/// Shown in place of a reply that could not be produced.
pub const ERROR_REPLY: &str =
    "Sorry, I couldn't get a response. Please check your connection or try again later.";

/// Where the current or most recent turn stands.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum StreamState {
    /// No turn has run yet.
    Idle,
    /// The message was submitted and no delta has arrived.
    Sending,
    /// At least one delta has been folded.
    Streaming,
    /// The reply ended normally.
    Completed,
    /// The student stopped the reply.
    Cancelled,
    /// The provider failed.
    Failed,
}

impl StreamState {
    /// True while a reply is in flight.
    pub fn is_busy(&self) -> bool {
        matches!(self, StreamState::Sending | StreamState::Streaming)
    }

    /// True for the three states a turn ends in.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamState::Completed | StreamState::Cancelled | StreamState::Failed
        )
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StreamState::Idle => "idle",
            StreamState::Sending => "sending",
            StreamState::Streaming => "streaming",
            StreamState::Completed => "completed",
            StreamState::Cancelled => "cancelled",
            StreamState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// How a turn ended.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TurnOutcome {
    /// The reply was received in full.
    Completed,
    /// The reply was stopped; partial text is kept.
    Cancelled,
    /// The reply was replaced by [`ERROR_REPLY`].
    Failed,
}

impl From<TurnOutcome> for StreamState {
    fn from(outcome: TurnOutcome) -> Self {
        match outcome {
            TurnOutcome::Completed => StreamState::Completed,
            TurnOutcome::Cancelled => StreamState::Cancelled,
            TurnOutcome::Failed => StreamState::Failed,
        }
    }
}

/// Runs turns and owns the published [`StreamState`].
#[derive(Debug)]
pub struct Accumulator {
    status: watch::Sender<StreamState>,
}

impl Accumulator {
    /// Creates an accumulator in the `Idle` state.
    pub fn new() -> Self {
        let (status, _) = watch::channel(StreamState::Idle);
        Self { status }
    }

    /// The current state.
    pub fn state(&self) -> StreamState {
        *self.status.borrow()
    }

    /// True while a reply is in flight.
    pub fn is_busy(&self) -> bool {
        self.state().is_busy()
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<StreamState> {
        self.status.subscribe()
    }

    /// Return to `Idle`, as for a fresh conversation. Has no effect mid-turn.
    pub fn reset(&self) {
        if !self.is_busy() {
            self.publish(StreamState::Idle);
        }
    }

    fn publish(&self, state: StreamState) {
        tracing::trace!(%state, "turn state");
        self.status.send_replace(state);
    }

    /// Stream the reply to `message` into the open message of `transcript`.
    ///
    /// The caller must already have appended the user turn and its placeholder,
    /// and `token` must be fresh for this turn. Cancelling `token` stops folding
    /// at the next suspension point and drops the provider's stream. A delta
    /// that arrives after cancellation is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if a turn is already in flight. Provider
    /// failures are not errors; they end the turn as [`TurnOutcome::Failed`].
    pub async fn run(
        &self,
        session: &mut dyn Session,
        message: &str,
        transcript: &mut Transcript,
        token: &CancellationToken,
        renderer: &mut dyn Renderer,
    ) -> Result<TurnOutcome> {
        if self.is_busy() {
            return Err(Error::Busy);
        }
        let start = Instant::now();
        TURNS_STARTED.click();
        self.publish(StreamState::Sending);
        // Publishes Cancelled if this future is dropped mid-turn.
        let _abandoned = AbandonGuard { status: &self.status };
        renderer.start_response();

        let sent = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            sent = session.send_stream(message) => Some(sent),
        };
        let end = match sent {
            None => TurnEnd::Cancelled,
            Some(Err(err)) => TurnEnd::Failed(err),
            Some(Ok(mut stream)) => {
                let mut deltas = 0u64;
                loop {
                    let next = tokio::select! {
                        biased;
                        _ = token.cancelled() => break TurnEnd::Cancelled,
                        next = stream.next() => next,
                    };
                    match next {
                        None => break TurnEnd::Ended(deltas),
                        Some(Err(err)) => break TurnEnd::Failed(err),
                        Some(Ok(delta)) => {
                            if token.is_cancelled() {
                                break TurnEnd::Cancelled;
                            }
                            if deltas == 0 {
                                STREAM_FIRST_DELTA.add(start.elapsed().as_secs_f64());
                                self.publish(StreamState::Streaming);
                            }
                            deltas += 1;
                            TURN_DELTAS.click();
                            transcript.fold_delta(&delta.text);
                            renderer.print_text(&delta.text);
                        }
                    }
                }
            }
        };

        // Decided by why the loop stopped, not by the token's later state.
        let outcome = match end {
            TurnEnd::Ended(deltas) => {
                TURNS_COMPLETED.click();
                tracing::debug!(deltas, "reply complete");
                transcript.close_open();
                renderer.finish_response();
                TurnOutcome::Completed
            }
            TurnEnd::Cancelled => {
                TURNS_CANCELLED.click();
                transcript.close_open();
                renderer.print_interrupted();
                TurnOutcome::Cancelled
            }
            TurnEnd::Failed(err) => {
                TURNS_FAILED.click();
                tracing::warn!(error = %err, "reply failed");
                token.cancel();
                transcript.replace_open_with_error(ERROR_REPLY);
                renderer.print_failure(ERROR_REPLY);
                TurnOutcome::Failed
            }
        };
        TURN_DURATION.add(start.elapsed().as_secs_f64());
        self.publish(outcome.into());
        Ok(outcome)
    }
}

impl Default for Accumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Why the delta loop stopped.
enum TurnEnd {
    Ended(u64),
    Cancelled,
    Failed(Error),
}

struct AbandonGuard<'a> {
    status: &'a watch::Sender<StreamState>,
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if self.status.borrow().is_busy() {
            TURNS_CANCELLED.click();
            tracing::debug!("turn abandoned mid-stream");
            self.status.send_replace(StreamState::Cancelled);
        }
    }
}
