//! The in-memory transcript of one conversation.

use std::fmt;

/// Who wrote a message.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Author {
    /// The student.
    User,
    /// The tutor model.
    Bot,
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Author::User => f.write_str("user"),
            Author::Bot => f.write_str("bot"),
        }
    }
}

/// One turn of the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Who wrote the message.
    pub author: Author,
    /// The message text.
    pub text: String,
    /// Set on the apology that replaces a failed reply.
    pub is_error: bool,
}

impl Message {
    /// A message written by the student.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            author: Author::User,
            text: text.into(),
            is_error: false,
        }
    }

    /// A message written by the tutor.
    pub fn bot(text: impl Into<String>) -> Self {
        Self {
            author: Author::Bot,
            text: text.into(),
            is_error: false,
        }
    }

    /// An error message shown in place of a bot reply.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            author: Author::Bot,
            text: text.into(),
            is_error: true,
        }
    }
}

/// Ordered messages of a conversation, oldest first.
///
/// At most one message is open for appending. When one is, it is the last
/// message and it is bot-authored.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
    open: bool,
}

impl Transcript {
    /// Creates an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the student's message and an empty, open bot placeholder.
    ///
    /// A message left open by an abandoned turn is closed first.
    pub fn append_user_turn(&mut self, text: impl Into<String>) {
        self.close_open();
        self.messages.push(Message::user(text));
        self.messages.push(Message::bot(""));
        self.open = true;
    }

    /// Appends `delta` to the open bot message.
    ///
    /// Does nothing when no bot message is open.
    pub fn fold_delta(&mut self, delta: &str) {
        if let Some(message) = self.open_message_mut() {
            message.text.push_str(delta);
        }
    }

    /// Replaces the open bot message with a closed error message, or appends
    /// one if nothing is open.
    pub fn replace_open_with_error(&mut self, text: impl Into<String>) {
        let error = Message::error(text);
        match self.open_message_mut() {
            Some(message) => *message = error,
            None => self.messages.push(error),
        }
        self.open = false;
    }

    /// Closes the open message, keeping whatever text it holds.
    pub fn close_open(&mut self) {
        self.open = false;
    }

    /// Removes every message.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.open = false;
    }

    /// The message currently being appended to, if any.
    pub fn open_message(&self) -> Option<&Message> {
        if self.open {
            self.messages.last().filter(|m| m.author == Author::Bot)
        } else {
            None
        }
    }

    fn open_message_mut(&mut self) -> Option<&mut Message> {
        if self.open {
            self.messages
                .last_mut()
                .filter(|m| m.author == Author::Bot)
        } else {
            None
        }
    }

    /// All messages, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The most recent message.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// The number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if the transcript holds no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_turn_opens_placeholder() {
        let mut transcript = Transcript::new();
        transcript.append_user_turn("2+2?");

        assert_eq!(
            transcript.messages(),
            &[Message::user("2+2?"), Message::bot("")]
        );
        assert_eq!(transcript.open_message(), Some(&Message::bot("")));
    }

    #[test]
    fn deltas_concatenate_in_order() {
        let mut transcript = Transcript::new();
        transcript.append_user_turn("count");
        for delta in ["one", ", two", ", three"] {
            transcript.fold_delta(delta);
        }
        transcript.close_open();

        assert_eq!(transcript.last(), Some(&Message::bot("one, two, three")));
        assert!(transcript.open_message().is_none());
    }

    #[test]
    fn fold_without_open_message_is_a_no_op() {
        let mut transcript = Transcript::new();
        transcript.fold_delta("stray");
        assert!(transcript.is_empty());

        transcript.append_user_turn("hi");
        transcript.fold_delta("hello");
        transcript.close_open();
        transcript.fold_delta(" again");
        assert_eq!(transcript.last(), Some(&Message::bot("hello")));
    }

    #[test]
    fn error_replaces_partial_text() {
        let mut transcript = Transcript::new();
        transcript.append_user_turn("hi");
        transcript.fold_delta("partial");
        transcript.replace_open_with_error("Sorry");

        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.last(), Some(&Message::error("Sorry")));
        assert!(transcript.open_message().is_none());
    }

    #[test]
    fn error_without_open_message_is_appended() {
        let mut transcript = Transcript::new();
        transcript.replace_open_with_error("Sorry");
        assert_eq!(transcript.messages(), &[Message::error("Sorry")]);
    }

    #[test]
    fn new_turn_closes_abandoned_placeholder() {
        let mut transcript = Transcript::new();
        transcript.append_user_turn("first");
        transcript.fold_delta("half");
        transcript.append_user_turn("second");
        transcript.fold_delta("whole");

        assert_eq!(
            transcript.messages(),
            &[
                Message::user("first"),
                Message::bot("half"),
                Message::user("second"),
                Message::bot("whole"),
            ]
        );
    }

    #[test]
    fn clear_empties() {
        let mut transcript = Transcript::new();
        transcript.append_user_turn("hi");
        transcript.clear();
        assert!(transcript.is_empty());
        assert!(transcript.open_message().is_none());
    }
}
