//! External collaborators
//!
//! The engine talks to the outside world only through the traits declared
//! here. Production adapters live next to them; test doubles live in
//! `testing`.

mod bundle;
mod error;
pub mod feedback;
pub mod openai;
pub mod prompts;
pub mod search;
pub mod text;
pub mod weaviate;

pub use bundle::{Collections, HandlerSettings, ServiceBundle};
pub use error::{ServiceError, ServiceErrorKind};
pub use feedback::{FeedbackSink, MemoryFeedbackSink, SqliteFeedbackSink};
pub use openai::OpenAiTextGenerator;
pub use prompts::{validate_prompts, PromptCatalog, PromptError, PromptKey, PromptProvider};
pub use search::{SearchHit, VectorSearch};
pub use text::{Classification, CompletionRequest, GenerationParams, TextGenerator};
pub use weaviate::WeaviateSearch;
