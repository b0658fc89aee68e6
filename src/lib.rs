// Public modules
pub mod accumulating_stream;
pub mod accumulator;
pub mod chat;
pub mod client;
pub mod conversation;
pub mod error;
pub mod provider;
pub mod render;
pub mod transcript;
pub mod types;

// Internal modules
mod observability;
mod sse;

// Re-exports
pub use accumulating_stream::AccumulatingStream;
pub use accumulator::{Accumulator, ERROR_REPLY, StreamState, TurnOutcome};
pub use client::{API_KEY_ENV, Gemini};
pub use conversation::{CancelHandle, Conversation, ConversationStats};
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use provider::{DeltaStream, GeminiProvider, GeminiSession, Session, SessionId, SessionProvider};
pub use render::{CodeStyler, PlainTextRenderer, Renderer, Segment, Style};
pub use transcript::{Author, Message, Transcript};
pub use types::*;
