//! Slash command parsing for the chat application.
//!
//! This module handles parsing of special commands that start with `/`,
//! allowing the student to control the conversation without sending
//! messages to the model.

/// A parsed chat command.
///
/// These commands control the conversation and are not sent to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Clear the transcript and start a fresh session.
    Clear,

    /// Replay the transcript.
    History,

    /// Change the model used by the next session.
    Model(String),

    /// Set the persona used by the next session.
    /// `None` restores the default tutor persona.
    System(Option<String>),

    /// Display conversation statistics.
    Stats,

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a command, or `None` if it
/// should be sent to the model as a regular message.
///
/// # Examples
///
/// ```
/// # use tutorchat::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/model gemini-2.5-pro").is_some());
/// assert!(parse_command("What is a prime number?").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "clear" | "new" => ChatCommand::Clear,
        "history" => ChatCommand::History,
        "model" => match argument {
            Some(model) if model.contains(char::is_whitespace) => {
                ChatCommand::Invalid("/model expects a single model name".to_string())
            }
            Some(model) => ChatCommand::Model(model.to_string()),
            None => ChatCommand::Invalid("/model requires a model name".to_string()),
        },
        "system" => ChatCommand::System(argument.map(|s| s.to_string())),
        "stats" | "status" => ChatCommand::Stats,
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        _ => ChatCommand::Invalid(format!("Unknown command: /{command}")),
    };

    Some(result)
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /clear                 Start over with an empty conversation
  /history               Show the conversation so far
  /model <name>          Use another model from the next /clear (e.g., /model gemini-2.5-pro)
  /system [persona]      Set the tutor persona from the next /clear (no argument restores the default)
  /stats                 Show conversation statistics
  /help                  Show this help message
  /quit                  Exit the chat

Press Ctrl-C while a reply is streaming to stop it."#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_quit_commands() {
        assert_eq!(parse_command("/quit"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/exit"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/q"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("  /quit  "), Some(ChatCommand::Quit));
    }

    #[test]
    fn parse_clear() {
        assert_eq!(parse_command("/clear"), Some(ChatCommand::Clear));
        assert_eq!(parse_command("/CLEAR"), Some(ChatCommand::Clear));
        assert_eq!(parse_command("/new"), Some(ChatCommand::Clear));
    }

    #[test]
    fn parse_model() {
        assert_eq!(
            parse_command("/model gemini-2.5-pro"),
            Some(ChatCommand::Model("gemini-2.5-pro".to_string()))
        );
        assert_eq!(
            parse_command("/model   gemini-2.0-flash  "),
            Some(ChatCommand::Model("gemini-2.0-flash".to_string()))
        );
        assert_eq!(
            parse_command("/model"),
            Some(ChatCommand::Invalid(
                "/model requires a model name".to_string()
            ))
        );
        assert!(matches!(
            parse_command("/model two words"),
            Some(ChatCommand::Invalid(msg)) if msg.contains("single")
        ));
    }

    #[test]
    fn parse_system() {
        assert_eq!(
            parse_command("/system You are a patient chemistry tutor."),
            Some(ChatCommand::System(Some(
                "You are a patient chemistry tutor.".to_string()
            )))
        );
        assert_eq!(parse_command("/system"), Some(ChatCommand::System(None)));
        assert_eq!(parse_command("/system   "), Some(ChatCommand::System(None)));
    }

    #[test]
    fn parse_history_and_stats() {
        assert_eq!(parse_command("/history"), Some(ChatCommand::History));
        assert_eq!(parse_command("/stats"), Some(ChatCommand::Stats));
        assert_eq!(parse_command("/status"), Some(ChatCommand::Stats));
        assert_eq!(parse_command("/help"), Some(ChatCommand::Help));
        assert_eq!(parse_command("/?"), Some(ChatCommand::Help));
    }

    #[test]
    fn unknown_command() {
        assert_eq!(
            parse_command("/teleport"),
            Some(ChatCommand::Invalid("Unknown command: /teleport".to_string()))
        );
    }

    #[test]
    fn non_commands() {
        assert_eq!(parse_command("What is 2+2?"), None);
        assert_eq!(parse_command("a/b"), None);
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("  "), None);
    }

    #[test]
    fn help_text_not_empty() {
        let help = help_text();
        assert!(help.contains("/quit"));
        assert!(help.contains("/clear"));
        assert!(help.contains("/history"));
        assert!(help.contains("/model"));
        assert!(help.contains("Ctrl-C"));
    }
}
