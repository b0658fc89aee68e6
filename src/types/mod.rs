// Public modules
pub mod api_error;
pub mod content;
pub mod finish_reason;
pub mod generate_content_request;
pub mod generate_content_response;
pub mod generation_config;
pub mod model;
pub mod text_delta;

// Re-exports
pub use api_error::{ApiErrorDetail, ApiErrorResponse};
pub use content::{Content, Part, Role};
pub use finish_reason::FinishReason;
pub use generate_content_request::GenerateContentRequest;
pub use generate_content_response::{
    Candidate, GenerateContentResponse, PromptFeedback, UsageMetadata,
};
pub use generation_config::GenerationConfig;
pub use model::{KnownModel, Model};
pub use text_delta::TextDelta;
