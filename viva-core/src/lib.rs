pub mod config;
pub mod error;
pub mod ipc;
pub mod model;
pub mod models;
pub mod parser;
pub mod score;
pub mod store;

pub use config::VivaConfig;
pub use error::VivaError;
pub use model::{
    GeminiTransport, GenerateOptions, ModelError, ModelTransport, ResilientModelClient,
    TextGenerator,
};
pub use models::{
    FeedbackRecord, InterviewSummary, InterviewTriple, Role, SessionPatch, SessionRecord, Stage,
    Turn,
};
pub use parser::{FeedbackOutcome, ReplySplit, COMPLETION_TOKEN};
pub use score::{score, summary_score};
pub use store::{MemoryStore, SessionStore, StoreError};
