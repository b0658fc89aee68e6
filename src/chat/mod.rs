//! Chat application module for studying with a Gemini tutor.
//!
//! This module provides the pieces of the streaming REPL built on top of the
//! tutorchat library:
//!
//! - Slash commands for conversation control
//! - Configurable model, persona, and sampling parameters
//!
//! # Architecture
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`commands`]: Slash command parsing
//!
//! Turn handling lives in [`crate::conversation`] and output in [`crate::render`].

mod commands;
mod config;

pub use crate::render::{PlainTextRenderer, Renderer, tutor_label};
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig, DEFAULT_SYSTEM_INSTRUCTION};
