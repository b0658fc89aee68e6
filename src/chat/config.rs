//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and configuration
//! structures for controlling chat behavior.

use std::time::Duration;

use arrrg_derive::CommandLine;

use crate::types::{GenerationConfig, Model};
use crate::{Error, Result};

/// The tutor persona every session is created with unless overridden.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a friendly and helpful chatbot designed to assist students with their questions. Provide clear, concise, and accurate answers. Be encouraging and supportive.";

/// Command-line arguments for the tutorchat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Model to use for chat.
    #[arrrg(optional, "Model to use (default: gemini-2.5-flash)", "MODEL")]
    pub model: Option<String>,

    /// Persona for the conversation.
    #[arrrg(optional, "System instruction (default: supportive student tutor)", "TEXT")]
    pub system: Option<String>,

    /// Override the API endpoint.
    #[arrrg(optional, "Base URL of the Gemini API", "URL")]
    pub base_url: Option<String>,

    /// Seconds allowed for establishing a connection.
    #[arrrg(optional, "Connect timeout in seconds (default: 30)", "SECONDS")]
    pub connect_timeout: Option<u64>,

    /// Sampling temperature, kept as text so the struct stays `Eq`.
    #[arrrg(optional, "Sampling temperature 0.0-2.0", "TEMP")]
    pub temperature: Option<String>,

    /// Maximum tokens per reply.
    #[arrrg(optional, "Max output tokens per reply", "TOKENS")]
    pub max_output_tokens: Option<u32>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,

    /// Log at debug level.
    #[arrrg(flag, "Verbose logging to stderr")]
    pub verbose: bool,
}

/// Configuration for a chat session.
///
/// This struct holds the resolved configuration values after processing
/// command-line arguments with appropriate defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    /// The model sessions are bound to.
    pub model: Model,

    /// The persona sessions are created with.
    pub system_instruction: String,

    /// Optional API base URL.
    pub base_url: Option<String>,

    /// Optional connect timeout.
    pub connect_timeout: Option<Duration>,

    /// Optional sampling temperature.
    pub temperature: Option<f32>,

    /// Optional cap on reply length.
    pub max_output_tokens: Option<u32>,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,

    /// Whether to log at debug level.
    pub verbose: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - Model: gemini-2.5-flash
    /// - System instruction: the supportive tutor persona
    /// - Color: enabled
    pub fn new() -> Self {
        Self {
            model: Model::default(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            base_url: None,
            connect_timeout: None,
            temperature: None,
            max_output_tokens: None,
            use_color: true,
            verbose: false,
        }
    }

    /// Sets the model to use.
    pub fn with_model(mut self, model: Model) -> Self {
        self.model = model;
        self
    }

    /// Sets the system instruction. A blank instruction restores the default.
    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        let instruction = instruction.into();
        self.system_instruction = if instruction.trim().is_empty() {
            DEFAULT_SYSTEM_INSTRUCTION.to_string()
        } else {
            instruction
        };
        self
    }

    /// Sets the API base URL.
    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        self.base_url = base_url;
        self
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the sampling temperature.
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the maximum output tokens.
    pub fn with_max_output_tokens(mut self, max_output_tokens: Option<u32>) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Enables debug logging.
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    /// The sampling options sent with every request.
    pub fn generation_config(&self) -> GenerationConfig {
        GenerationConfig::default()
            .with_temperature(self.temperature)
            .with_max_output_tokens(self.max_output_tokens)
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<ChatArgs> for ChatConfig {
    type Error = Error;

    fn try_from(args: ChatArgs) -> Result<Self> {
        let temperature = args
            .temperature
            .as_deref()
            .map(parse_temperature)
            .transpose()?;
        if args.max_output_tokens == Some(0) {
            return Err(Error::configuration(
                "--max-output-tokens must be positive",
            ));
        }
        let mut config = ChatConfig::new()
            .with_base_url(args.base_url)
            .with_connect_timeout(args.connect_timeout.map(Duration::from_secs))
            .with_temperature(temperature)
            .with_max_output_tokens(args.max_output_tokens);
        if let Some(model) = args.model {
            config = config.with_model(model.as_str().into());
        }
        if let Some(system) = args.system {
            config = config.with_system_instruction(system);
        }
        config.use_color = !args.no_color;
        config.verbose = args.verbose;
        Ok(config)
    }
}

fn parse_temperature(value: &str) -> Result<f32> {
    let parsed: f32 = value
        .trim()
        .parse()
        .map_err(|_| Error::configuration(format!("temperature {value:?} is not a number")))?;
    if parsed.is_finite() && (0.0..=2.0).contains(&parsed) {
        Ok(parsed)
    } else {
        Err(Error::configuration(
            "temperature expects a value between 0.0 and 2.0",
        ))
    }
}
