//! Output rendering for the chat REPL.
//!
//! This module provides the renderer trait the conversation reports to, a
//! plain-text implementation with optional ANSI styling, and a streaming
//! styler that picks out fenced code blocks and inline code spans.

use std::io::{self, Stdout, Write};

use crate::transcript::{Author, Message};

/// ANSI escape code for dim text (used for code fences and the thinking indicator).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for bold text (used for speaker labels).
const ANSI_BOLD: &str = "\x1b[1m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for code block bodies).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for yellow text (used for inline code).
const ANSI_YELLOW: &str = "\x1b[33m";

/// ANSI escape code for red text (used for error messages).
const ANSI_RED: &str = "\x1b[31m";

/// ANSI escape code for blue text (used for the tutor label).
const ANSI_BLUE: &str = "\x1b[34m";

/// Return to column zero and erase the line.
const ANSI_CLEAR_LINE: &str = "\r\x1b[2K";

const WARNING_SIGN: &str = "\u{26a0}";

/// Trait for rendering a conversation.
///
/// The conversation calls these hooks as a turn progresses: `start_response`
/// once the placeholder exists, `print_text` for every folded delta, then
/// exactly one of `finish_response`, `print_interrupted` or `print_failure`.
pub trait Renderer: Send {
    /// Called when the bot placeholder is appended, before any delta arrives.
    fn start_response(&mut self) {}

    /// Print a chunk of reply text.
    ///
    /// This is called incrementally as deltas are folded into the transcript.
    fn print_text(&mut self, text: &str);

    /// Called when a reply completes.
    fn finish_response(&mut self);

    /// Called when the student cancels a reply.
    fn print_interrupted(&mut self);

    /// Print the error message that replaced a failed reply.
    fn print_failure(&mut self, message: &str);

    /// Print an error that is not part of the transcript (bad command, etc.).
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Print a complete transcript message, as when replaying history.
    fn print_message(&mut self, message: &Message) {
        if message.is_error {
            self.print_failure(&message.text);
            return;
        }
        match message.author {
            Author::User => self.print_info(&format!("You: {}", message.text)),
            Author::Bot => {
                self.print_text(&message.text);
                self.finish_response();
            }
        }
    }
}

/////////////////////////////////////////// CodeStyler //////////////////////////////////////////

/// How a run of reply text should be displayed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Style {
    /// Ordinary prose.
    Text,
    /// A ```` ``` ```` fence line, including any language tag.
    Fence,
    /// The body of a fenced code block.
    Code,
    /// A `` `span` `` of inline code, backticks included.
    InlineCode,
}

/// A run of text sharing one style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// The style of the run.
    pub style: Style,
    /// The text of the run.
    pub text: String,
}

/// Incrementally classifies markdown text arriving in arbitrary chunks.
///
/// Leading whitespace and backticks at the start of a line are held back
/// until it is clear whether the line is a fence, so a fence split across
/// chunks is still recognized.
#[derive(Debug)]
pub struct CodeStyler {
    deciding: bool,
    held: String,
    fence_line: bool,
    in_block: bool,
    in_inline: bool,
}

impl Default for CodeStyler {
    fn default() -> Self {
        Self {
            deciding: true,
            held: String::new(),
            fence_line: false,
            in_block: false,
            in_inline: false,
        }
    }
}

impl CodeStyler {
    /// Creates a styler positioned at the start of a message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true while inside a fenced code block.
    pub fn in_code_block(&self) -> bool {
        self.in_block
    }

    /// Classify the next chunk of text.
    pub fn push(&mut self, chunk: &str) -> Vec<Segment> {
        let mut out = Vec::new();
        for c in chunk.chars() {
            if !self.deciding {
                self.emit(c, &mut out);
                continue;
            }
            self.held.push(c);
            if c == '\n' {
                self.deciding = false;
                self.flush_held(&mut out);
                continue;
            }
            let lead = self.held.trim_start_matches([' ', '\t']);
            if lead == "```" {
                self.deciding = false;
                self.fence_line = true;
                let held = std::mem::take(&mut self.held);
                push_segment(&mut out, Style::Fence, &held);
            } else if !"```".starts_with(lead) {
                self.deciding = false;
                self.flush_held(&mut out);
            }
        }
        out
    }

    /// Flush held text and reset for the next message.
    pub fn finish(&mut self) -> Vec<Segment> {
        let mut out = Vec::new();
        self.deciding = false;
        self.flush_held(&mut out);
        *self = Self::default();
        out
    }

    fn flush_held(&mut self, out: &mut Vec<Segment>) {
        let held = std::mem::take(&mut self.held);
        for c in held.chars() {
            self.emit(c, out);
        }
    }

    fn emit(&mut self, c: char, out: &mut Vec<Segment>) {
        let style = if self.fence_line {
            Style::Fence
        } else if self.in_block {
            Style::Code
        } else if c == '`' {
            self.in_inline = !self.in_inline;
            Style::InlineCode
        } else if self.in_inline {
            Style::InlineCode
        } else {
            Style::Text
        };
        let mut buf = [0u8; 4];
        push_segment(out, style, c.encode_utf8(&mut buf));
        if c == '\n' {
            if self.fence_line {
                self.fence_line = false;
                self.in_block = !self.in_block;
            }
            self.in_inline = false;
            self.deciding = true;
        }
    }
}

fn push_segment(out: &mut Vec<Segment>, style: Style, text: &str) {
    match out.last_mut() {
        Some(last) if last.style == style => last.text.push_str(text),
        _ => out.push(Segment {
            style,
            text: text.to_string(),
        }),
    }
}

//////////////////////////////////////// PlainTextRenderer ///////////////////////////////////////

/// Plain text renderer with optional ANSI styling.
///
/// This renderer outputs text directly to stdout. With color enabled, code
/// blocks and inline code are highlighted, errors are red with a warning
/// sign, and a dim indicator shows while waiting for the first delta.
pub struct PlainTextRenderer {
    stdout: Stdout,
    use_color: bool,
    styler: CodeStyler,
    waiting: bool,
    line_start: bool,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
            styler: CodeStyler::new(),
            waiting: false,
            line_start: true,
        }
    }

    /// Flushes stdout to ensure immediate display of streamed content.
    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }

    fn clear_waiting(&mut self) {
        if self.waiting {
            if self.use_color {
                print!("{ANSI_CLEAR_LINE}");
            }
            self.waiting = false;
        }
    }

    fn write_segments(&mut self, segments: Vec<Segment>) {
        for segment in segments {
            if segment.text.is_empty() {
                continue;
            }
            self.line_start = segment.text.ends_with('\n');
            if !self.use_color {
                print!("{}", segment.text);
                continue;
            }
            match segment.style {
                Style::Text => print!("{}", segment.text),
                Style::Fence => print!("{ANSI_DIM}{}{ANSI_RESET}", segment.text),
                Style::Code => print!("{ANSI_CYAN}{}{ANSI_RESET}", segment.text),
                Style::InlineCode => print!("{ANSI_YELLOW}{}{ANSI_RESET}", segment.text),
            }
        }
        self.flush();
    }

    fn end_reply(&mut self) {
        let rest = self.styler.finish();
        self.write_segments(rest);
        if !self.line_start {
            println!();
        }
        self.line_start = true;
        self.flush();
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn start_response(&mut self) {
        self.styler = CodeStyler::new();
        self.line_start = true;
        if self.use_color {
            print!("{ANSI_DIM}thinking\u{2026}{ANSI_RESET}");
            self.waiting = true;
            self.flush();
        }
    }

    fn print_text(&mut self, text: &str) {
        self.clear_waiting();
        let segments = self.styler.push(text);
        self.write_segments(segments);
    }

    fn finish_response(&mut self) {
        self.clear_waiting();
        self.end_reply();
    }

    fn print_interrupted(&mut self) {
        self.clear_waiting();
        self.end_reply();
        if self.use_color {
            println!("{ANSI_DIM}[stopped]{ANSI_RESET}");
        } else {
            println!("[stopped]");
        }
        self.flush();
    }

    fn print_failure(&mut self, message: &str) {
        self.clear_waiting();
        self.styler = CodeStyler::new();
        if !self.line_start {
            println!();
        }
        if self.use_color {
            println!("{ANSI_RED}{WARNING_SIGN} {message}{ANSI_RESET}");
        } else {
            println!("{WARNING_SIGN} {message}");
        }
        self.line_start = true;
        self.flush();
    }

    fn print_error(&mut self, error: &str) {
        self.clear_waiting();
        if self.use_color {
            eprintln!("{ANSI_RED}Error: {error}{ANSI_RESET}");
        } else {
            eprintln!("Error: {error}");
        }
    }

    fn print_info(&mut self, info: &str) {
        self.clear_waiting();
        println!("{info}");
        self.line_start = true;
        self.flush();
    }

    fn print_message(&mut self, message: &Message) {
        if message.is_error {
            self.print_failure(&message.text);
            return;
        }
        let (label, color) = match message.author {
            Author::User => ("You", ANSI_BOLD),
            Author::Bot => ("Tutor", ANSI_BLUE),
        };
        if self.use_color {
            println!("{color}{label}:{ANSI_RESET}");
        } else {
            println!("{label}:");
        }
        match message.author {
            Author::User => self.print_info(&message.text),
            Author::Bot => {
                self.styler = CodeStyler::new();
                self.print_text(&message.text);
                self.finish_response();
            }
        }
    }
}

/// The label printed before a reply starts streaming.
pub fn tutor_label(use_color: bool) -> String {
    if use_color {
        format!("{ANSI_BLUE}Tutor:{ANSI_RESET}")
    } else {
        "Tutor:".to_string()
    }
}
