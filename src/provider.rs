//! Session provider boundary and its Gemini implementation.
//!
//! A [`SessionProvider`] creates [`Session`]s bound to a model and a system
//! instruction. A session turns one user message into a [`DeltaStream`]: a
//! finite, single-consumer stream of text increments that ends or fails.

use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::Stream;
use tokio::sync::oneshot;

use crate::accumulating_stream::AccumulatingStream;
use crate::client::Gemini;
use crate::observability::{SESSION_CREATION_ERRORS, SESSIONS_CREATED};
use crate::types::{Content, GenerateContentRequest, GenerationConfig, Model, TextDelta};
use crate::{Error, Result};

/// A lazy sequence of reply increments for one message.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<TextDelta>> + Send>>;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a session.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Allocate a fresh, never before used id.
    pub fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// A conversational context with a remote model.
#[async_trait::async_trait]
pub trait Session: Send {
    /// The identity of this session.
    fn id(&self) -> SessionId;

    /// The model this session talks to.
    fn model(&self) -> &Model;

    /// Send `message` and obtain the stream of reply increments.
    ///
    /// # Errors
    ///
    /// Returns an error if the request could not be started. Failures after
    /// the first increment surface as `Err` items on the stream.
    async fn send_stream(&mut self, message: &str) -> Result<DeltaStream>;
}

/// Factory for sessions.
#[async_trait::async_trait]
pub trait SessionProvider: Send + Sync {
    /// Create a fresh session with empty history.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionCreation`] if the session cannot be constructed.
    async fn create_session(
        &self,
        model: &Model,
        system_instruction: &str,
    ) -> Result<Box<dyn Session>>;
}

///////////////////////////////////////////// Gemini ////////////////////////////////////////////

/// Creates [`GeminiSession`]s that share one HTTP client.
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: Gemini,
    generation_config: GenerationConfig,
}

impl GeminiProvider {
    /// Creates a provider around a client.
    pub fn new(client: Gemini) -> Self {
        Self {
            client,
            generation_config: GenerationConfig::default(),
        }
    }

    /// Sets the sampling options used by every session.
    pub fn with_generation_config(mut self, generation_config: GenerationConfig) -> Self {
        self.generation_config = generation_config;
        self
    }
}

#[async_trait::async_trait]
impl SessionProvider for GeminiProvider {
    async fn create_session(
        &self,
        model: &Model,
        system_instruction: &str,
    ) -> Result<Box<dyn Session>> {
        let name = model.to_string();
        if name.trim().is_empty() || name.contains(char::is_whitespace) {
            SESSION_CREATION_ERRORS.click();
            return Err(Error::session_creation(
                format!("invalid model name {name:?}"),
                None,
            ));
        }
        let session = GeminiSession {
            id: SessionId::next(),
            client: self.client.clone(),
            model: model.clone(),
            system_instruction: system_instruction.to_string(),
            generation_config: self.generation_config.clone(),
            history: History::default(),
        };
        SESSIONS_CREATED.click();
        tracing::debug!(session = %session.id, %model, "created session");
        Ok(Box::new(session))
    }
}

/// A multi-turn Gemini chat.
///
/// The full history is sent with every request. A turn joins the history only
/// once its reply stream has been drained to the end.
pub struct GeminiSession {
    id: SessionId,
    client: Gemini,
    model: Model,
    system_instruction: String,
    generation_config: GenerationConfig,
    history: History,
}

#[async_trait::async_trait]
impl Session for GeminiSession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn model(&self) -> &Model {
        &self.model
    }

    async fn send_stream(&mut self, message: &str) -> Result<DeltaStream> {
        let user = Content::user(message);
        let request = GenerateContentRequest::new(self.history.contents_with(&user))
            .with_system_instruction(&self.system_instruction)
            .with_generation_config(self.generation_config.clone());
        let chunks = self
            .client
            .stream_generate_content(&self.model, &request)
            .await?;
        let (stream, reply) = AccumulatingStream::new(chunks);
        self.history.begin(user, reply);
        Ok(Box::pin(stream))
    }
}

/// Committed turns plus the one turn whose reply may still be streaming.
#[derive(Default)]
struct History {
    committed: Vec<Content>,
    pending: Option<(Content, oneshot::Receiver<String>)>,
}

impl History {
    /// Settle the pending turn: commit it if its reply completed, drop it otherwise.
    fn settle(&mut self) {
        let Some((user, mut reply)) = self.pending.take() else {
            return;
        };
        match reply.try_recv() {
            Ok(text) => {
                self.committed.push(user);
                self.committed.push(Content::model(text));
            }
            Err(_) => {
                tracing::debug!("previous turn did not complete; leaving it out of history");
            }
        }
    }

    /// The request contents for a new user turn.
    fn contents_with(&mut self, user: &Content) -> Vec<Content> {
        self.settle();
        let mut contents = self.committed.clone();
        contents.push(user.clone());
        contents
    }

    fn begin(&mut self, user: Content, reply: oneshot::Receiver<String>) {
        self.settle();
        self.pending = Some((user, reply));
    }

    #[cfg(test)]
    fn committed(&mut self) -> &[Content] {
        self.settle();
        &self.committed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    #[test]
    fn session_ids_are_unique() {
        let a = SessionId::next();
        let b = SessionId::next();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("session-"));
    }

    #[test]
    fn completed_turn_is_committed() {
        let mut history = History::default();
        let (tx, rx) = oneshot::channel();
        history.begin(Content::user("2+2?"), rx);
        tx.send("4".to_string()).unwrap();

        let contents = history.contents_with(&Content::user("and 3+3?"));
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0], Content::user("2+2?"));
        assert_eq!(contents[1].role, Some(Role::Model));
        assert_eq!(contents[1].text(), "4");
        assert_eq!(contents[2], Content::user("and 3+3?"));
    }

    #[test]
    fn abandoned_turn_is_dropped() {
        let mut history = History::default();
        let (tx, rx) = oneshot::channel::<String>();
        history.begin(Content::user("long answer"), rx);
        drop(tx);

        assert!(history.committed().is_empty());
        let contents = history.contents_with(&Content::user("next"));
        assert_eq!(contents, vec![Content::user("next")]);
    }

    #[test]
    fn unfinished_turn_is_dropped_on_next_send() {
        let mut history = History::default();
        let (_tx, rx) = oneshot::channel::<String>();
        history.begin(Content::user("still streaming"), rx);

        let contents = history.contents_with(&Content::user("impatient"));
        assert_eq!(contents, vec![Content::user("impatient")]);
    }

    #[tokio::test]
    async fn provider_creates_distinct_sessions() {
        let provider = GeminiProvider::new(Gemini::new(Some("k".to_string())).unwrap());
        let model = Model::default();
        let a = provider.create_session(&model, "Be kind.").await.unwrap();
        let b = provider.create_session(&model, "Be kind.").await.unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.model(), &model);
    }

    #[tokio::test]
    async fn provider_rejects_blank_model() {
        let provider = GeminiProvider::new(Gemini::new(Some("k".to_string())).unwrap());
        let err = provider
            .create_session(&Model::Custom(String::new()), "")
            .await
            .err()
            .unwrap();
        assert!(err.is_session_creation());
    }
}
