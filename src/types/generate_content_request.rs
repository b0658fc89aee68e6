use serde::{Deserialize, Serialize};

use crate::types::{Content, GenerationConfig};

/// Request body for `models/{model}:streamGenerateContent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    /// The conversation so far, oldest first, ending with the new user turn.
    pub contents: Vec<Content>,

    /// Persona and behavior instructions for the model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,

    /// Sampling options.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

impl GenerateContentRequest {
    /// Create a request from conversation contents.
    pub fn new(contents: Vec<Content>) -> Self {
        Self {
            contents,
            system_instruction: None,
            generation_config: None,
        }
    }

    /// Set the system instruction; blank instructions are omitted.
    pub fn with_system_instruction(mut self, instruction: &str) -> Self {
        self.system_instruction = if instruction.trim().is_empty() {
            None
        } else {
            Some(Content::instruction(instruction))
        };
        self
    }

    /// Set the generation config; empty configs are omitted.
    pub fn with_generation_config(mut self, config: GenerationConfig) -> Self {
        self.generation_config = if config.is_empty() {
            None
        } else {
            Some(config)
        };
        self
    }
}
