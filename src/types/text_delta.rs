use std::fmt;

/// A non-overlapping increment of reply text produced by a session stream.
///
/// Deltas are appended to the open bot message in the order they arrive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextDelta {
    /// The text to append.
    pub text: String,
}

impl TextDelta {
    /// Create a new `TextDelta` with the given text.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Returns true if the delta would not change the transcript.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

impl From<&str> for TextDelta {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for TextDelta {
    fn from(text: String) -> Self {
        Self { text }
    }
}

impl fmt::Display for TextDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
