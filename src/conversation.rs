//! The conversation controller.
//!
//! A [`Conversation`] owns everything one chat needs: the live session, the
//! transcript, the turn state and the cancellation handle. There is no global
//! state; callers hold the controller and drive it with `send`, `cancel` and
//! `clear`.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::accumulator::{Accumulator, StreamState, TurnOutcome};
use crate::provider::{Session, SessionId, SessionProvider};
use crate::render::Renderer;
use crate::transcript::Transcript;
use crate::types::Model;
use crate::{Error, Result};

//////////////////////////////////////////// CancelHandle ///////////////////////////////////////////

/// Cancels whichever turn is in flight.
///
/// Handles are cheap to clone and may be used from other threads, such as a
/// signal handler. Each turn installs its own token, so a cancel never leaks
/// into the next turn.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    current: Arc<Mutex<Option<CancellationToken>>>,
}

impl CancelHandle {
    /// Cancel the in-flight turn. Returns false if no turn was in flight.
    pub fn cancel(&self) -> bool {
        match self.lock().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// True while a turn has a token installed.
    pub fn is_armed(&self) -> bool {
        self.lock().is_some()
    }

    fn install(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.lock() = Some(token.clone());
        token
    }

    fn release(&self) {
        self.lock().take();
    }

    fn lock(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Keeps a turn's token installed; releases it on drop, even if the turn is abandoned.
struct ArmedTurn<'a> {
    handle: &'a CancelHandle,
    token: CancellationToken,
}

impl<'a> ArmedTurn<'a> {
    fn install(handle: &'a CancelHandle) -> Self {
        let token = handle.install();
        Self { handle, token }
    }
}

impl Drop for ArmedTurn<'_> {
    fn drop(&mut self) {
        self.handle.release();
    }
}

//////////////////////////////////////////// Conversation ///////////////////////////////////////////

/// Aggregated stats for a conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationStats {
    /// The live session.
    pub session_id: SessionId,
    /// The model of the live session.
    pub model: Model,
    /// The model the next session will use.
    pub next_model: Model,
    /// The number of messages in the transcript.
    pub message_count: usize,
    /// Turns that completed.
    pub turns_completed: u64,
    /// Turns the student stopped.
    pub turns_cancelled: u64,
    /// Turns that failed.
    pub turns_failed: u64,
    /// The state of the current or last turn.
    pub state: StreamState,
}

#[derive(Debug, Default)]
struct TurnCounts {
    completed: u64,
    cancelled: u64,
    failed: u64,
}

/// One chat between a student and the tutor.
pub struct Conversation {
    provider: Arc<dyn SessionProvider>,
    model: Model,
    system_instruction: String,
    session: Box<dyn Session>,
    transcript: Transcript,
    accumulator: Accumulator,
    cancel: CancelHandle,
    counts: TurnCounts,
}

impl Conversation {
    /// Start a conversation with a fresh session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionCreation`] if the provider cannot create a
    /// session. Nothing can be sent without one, so callers usually treat this
    /// as fatal.
    pub async fn start(
        provider: Arc<dyn SessionProvider>,
        model: Model,
        system_instruction: impl Into<String>,
    ) -> Result<Self> {
        let system_instruction = system_instruction.into();
        let session = start_session(provider.as_ref(), &model, &system_instruction).await?;
        tracing::info!(session = %session.id(), %model, "conversation started");
        Ok(Self {
            provider,
            model,
            system_instruction,
            session,
            transcript: Transcript::new(),
            accumulator: Accumulator::new(),
            cancel: CancelHandle::default(),
            counts: TurnCounts::default(),
        })
    }

    /// Send the student's message and stream the reply into the transcript.
    ///
    /// Input that is empty or only whitespace is ignored and returns
    /// `Ok(None)`. Otherwise the turn runs to one of its terminal states.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if a turn is already in flight; the transcript
    /// is left untouched.
    pub async fn send(
        &mut self,
        text: &str,
        renderer: &mut dyn Renderer,
    ) -> Result<Option<TurnOutcome>> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        if self.accumulator.is_busy() {
            return Err(Error::Busy);
        }
        self.transcript.append_user_turn(text);
        let armed = ArmedTurn::install(&self.cancel);
        let outcome = self
            .accumulator
            .run(
                self.session.as_mut(),
                text,
                &mut self.transcript,
                &armed.token,
                renderer,
            )
            .await;
        drop(armed);
        let outcome = outcome?;
        match outcome {
            TurnOutcome::Completed => self.counts.completed += 1,
            TurnOutcome::Cancelled => self.counts.cancelled += 1,
            TurnOutcome::Failed => self.counts.failed += 1,
        }
        tracing::debug!(session = %self.session.id(), ?outcome, "turn finished");
        Ok(Some(outcome))
    }

    /// Cancel the in-flight turn, if any.
    pub fn cancel(&self) -> bool {
        self.cancel.cancel()
    }

    /// A handle that cancels this conversation's in-flight turn.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Start over with a fresh session and an empty transcript.
    ///
    /// The new session uses the model and persona most recently set with
    /// [`Conversation::set_model`] and [`Conversation::set_system_instruction`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionCreation`] if the provider cannot create a
    /// session, in which case the current session and transcript are kept.
    pub async fn clear(&mut self) -> Result<()> {
        let session =
            start_session(self.provider.as_ref(), &self.model, &self.system_instruction).await?;
        tracing::info!(
            old = %self.session.id(),
            new = %session.id(),
            "conversation cleared"
        );
        self.session = session;
        self.transcript = Transcript::new();
        self.counts = TurnCounts::default();
        self.accumulator.reset();
        Ok(())
    }

    /// Use `model` for the next session.
    pub fn set_model(&mut self, model: Model) {
        self.model = model;
    }

    /// Use `instruction` as the persona of the next session.
    pub fn set_system_instruction(&mut self, instruction: impl Into<String>) {
        self.system_instruction = instruction.into();
    }

    /// The persona the next session will use.
    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    /// The transcript, oldest message first.
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// True while a reply is in flight.
    pub fn is_busy(&self) -> bool {
        self.accumulator.is_busy()
    }

    /// The state of the current or last turn.
    pub fn state(&self) -> StreamState {
        self.accumulator.state()
    }

    /// Watch the turn state.
    pub fn status(&self) -> watch::Receiver<StreamState> {
        self.accumulator.subscribe()
    }

    /// The live session's id.
    pub fn session_id(&self) -> SessionId {
        self.session.id()
    }

    /// The live session's model.
    pub fn model(&self) -> &Model {
        self.session.model()
    }

    /// Returns stats for this conversation.
    pub fn stats(&self) -> ConversationStats {
        ConversationStats {
            session_id: self.session.id(),
            model: self.session.model().clone(),
            next_model: self.model.clone(),
            message_count: self.transcript.len(),
            turns_completed: self.counts.completed,
            turns_cancelled: self.counts.cancelled,
            turns_failed: self.counts.failed,
            state: self.accumulator.state(),
        }
    }
}

async fn start_session(
    provider: &dyn SessionProvider,
    model: &Model,
    system_instruction: &str,
) -> Result<Box<dyn Session>> {
    match provider.create_session(model, system_instruction).await {
        Ok(session) => Ok(session),
        Err(err) if err.is_session_creation() => Err(err),
        Err(err) => Err(Error::session_creation(
            format!("could not start a session with {model}: {err}"),
            Some(Box::new(err)),
        )),
    }
}
