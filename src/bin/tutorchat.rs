//! Interactive study companion backed by Gemini.
//!
//! This binary provides a streaming REPL for asking a tutor persona
//! questions via the Gemini API.
//!
//! # Usage
//!
//! ```bash
//! # Basic usage; the key is read from GEMINI_API_KEY
//! tutorchat
//!
//! # Specify a model
//! tutorchat --model gemini-2.5-pro
//!
//! # Give the tutor a different persona
//! tutorchat --system "You are a patient algebra tutor"
//!
//! # Disable colors (useful for piping output)
//! tutorchat --no-color
//! ```
//!
//! # Commands
//!
//! While chatting, you can use slash commands:
//! - `/help` - Show available commands
//! - `/clear` - Start over with a fresh session
//! - `/history` - Show the conversation so far
//! - `/model <name>` - Change the model for the next session
//! - `/system [persona]` - Change the persona for the next session
//! - `/stats` - Show conversation statistics
//! - `/quit` - Exit the application
//!
//! Ctrl-C while a reply is streaming stops the reply.

use std::process::ExitCode;
use std::sync::Arc;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

use tutorchat::chat::{
    ChatArgs, ChatCommand, ChatConfig, DEFAULT_SYSTEM_INSTRUCTION, PlainTextRenderer, Renderer,
    help_text, parse_command, tutor_label,
};
use tutorchat::{Conversation, Gemini, GeminiProvider, Model};

/// Main entry point for the tutorchat application.
#[tokio::main]
async fn main() -> ExitCode {
    let (args, _) = ChatArgs::from_command_line_relaxed("tutorchat [OPTIONS]");
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("tutorchat: {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: ChatArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = ChatConfig::try_from(args)?;
    init_tracing(config.verbose);
    let use_color = config.use_color;

    let client = Gemini::with_options(None, config.base_url.clone(), config.connect_timeout)?;
    let provider =
        Arc::new(GeminiProvider::new(client).with_generation_config(config.generation_config()));
    let mut conversation = Conversation::start(
        provider,
        config.model.clone(),
        config.system_instruction.clone(),
    )
    .await?;
    let mut renderer = PlainTextRenderer::with_color(use_color);
    let mut rl = DefaultEditor::new()?;

    // Ctrl+C stops the reply in flight; at the prompt rustyline sees it instead.
    let cancel = conversation.cancel_handle();
    ctrlc::set_handler(move || {
        if !cancel.cancel() {
            tracing::debug!("interrupt with no reply in flight");
        }
    })?;

    print_banner(conversation.model());

    loop {
        let readline = rl.readline("You: ");

        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                if let Some(cmd) = parse_command(line) {
                    match cmd {
                        ChatCommand::Quit => {
                            println!("Goodbye!");
                            break;
                        }
                        ChatCommand::Clear => match conversation.clear().await {
                            Ok(()) => renderer.print_info("Conversation cleared."),
                            Err(err) => {
                                tracing::warn!(error = %err, "could not start a new session");
                                renderer.print_error(
                                    "Couldn't start a new conversation; keeping the current one.",
                                );
                            }
                        },
                        ChatCommand::History => {
                            if conversation.transcript().is_empty() {
                                renderer.print_info("(no messages yet)");
                            }
                            for message in conversation.transcript().messages() {
                                renderer.print_message(message);
                            }
                        }
                        ChatCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {}", line);
                            }
                        }
                        ChatCommand::Model(model_name) => {
                            conversation.set_model(Model::from(model_name.as_str()));
                            renderer.print_info(&format!(
                                "Model set to {model_name}; /clear to start using it."
                            ));
                        }
                        ChatCommand::System(persona) => match persona {
                            Some(persona) => {
                                conversation.set_system_instruction(persona.clone());
                                renderer.print_info(&format!(
                                    "Persona set to: {persona}\n/clear to start using it."
                                ));
                            }
                            None => {
                                conversation.set_system_instruction(DEFAULT_SYSTEM_INSTRUCTION);
                                renderer.print_info(
                                    "Persona reset to the default tutor; /clear to start using it.",
                                );
                            }
                        },
                        ChatCommand::Stats => {
                            print_stats(&conversation);
                        }
                        ChatCommand::Invalid(message) => {
                            renderer.print_error(&message);
                        }
                    }
                    continue;
                }

                println!("{}", tutor_label(use_color));
                if let Err(e) = conversation.send(line, &mut renderer).await {
                    renderer.print_error(&e.to_string());
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at prompt - soft interrupt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D - exit
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {}", err));
                break;
            }
        }
    }

    Ok(())
}

fn print_banner(model: &Model) {
    println!("Gemini Student Chatbot");
    println!(
        "Your personal study partner. Ask anything from complex calculus to literary analysis."
    );
    println!("(model: {model}) Type /help for commands, /quit to exit\n");
}

fn print_stats(conversation: &Conversation) {
    let stats = conversation.stats();
    println!("    Conversation Statistics:");
    println!("      Session: {}", stats.session_id);
    println!("      Model: {}", stats.model);
    if stats.next_model != stats.model {
        println!("      Next model: {} (after /clear)", stats.next_model);
    }
    if conversation.system_instruction() == DEFAULT_SYSTEM_INSTRUCTION {
        println!("      Persona: default tutor");
    } else {
        println!("      Persona: {}", conversation.system_instruction());
    }
    println!("      Messages: {}", stats.message_count);
    println!(
        "      Replies: {} completed, {} stopped, {} failed",
        stats.turns_completed, stats.turns_cancelled, stats.turns_failed
    );
    println!("      Last turn: {}", stats.state);
}
