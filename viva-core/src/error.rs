use thiserror::Error;

use crate::model::ModelError;
use crate::store::StoreError;

/// Errors surfaced to callers of the interview service.
///
/// Parse problems never appear here — the parser reports tagged outcomes
/// and the orchestrator repairs or defaults them internally.
#[derive(Error, Debug)]
pub enum VivaError {
    #[error("no resume is staged for this identity — upload one before starting")]
    PrecursorMissing,

    #[error("no active interview session for this identity")]
    SessionNotFound,

    #[error("the one-time interview reset has already been used")]
    ResetExhausted,

    #[error("{0}")]
    Validation(String),

    #[error("the interview service is busy — please wait about {retry_after_secs} seconds and try again")]
    RateLimited { retry_after_secs: u64 },

    #[error("the interview model is temporarily unavailable — please try again shortly ({0})")]
    ModelUnavailable(String),

    #[error("a temporary upstream problem interrupted the interview — please retry in a moment")]
    TransientUpstream(String),

    #[error("session storage is unavailable — no interview progress was saved")]
    StoreUnavailable(String),
}

impl From<StoreError> for VivaError {
    fn from(e: StoreError) -> Self {
        VivaError::StoreUnavailable(e.to_string())
    }
}

impl From<ModelError> for VivaError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::RateLimited(_) => VivaError::RateLimited {
                retry_after_secs: 30,
            },
            ModelError::ModelUnavailable(msg) => VivaError::ModelUnavailable(msg),
            ModelError::MissingApiKey => {
                VivaError::ModelUnavailable("model client has no API key configured".to_string())
            }
            ModelError::Transient(msg) | ModelError::Fatal(msg) => {
                VivaError::TransientUpstream(msg)
            }
            ModelError::Exhausted { source, .. } => VivaError::from(*source),
        }
    }
}
