//! Error taxonomy for the generation pipeline.
//!
//! Per-chunk failures (`TransportExhausted`, `ValidationMismatch`) are recovered
//! by the orchestrator into skipped chunks. Everything else that reaches the
//! run coordinator is turned into a failed `RunResult` there.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    /// The topic pool cannot cover one chunk per requested chunk.
    #[error("Not enough unique topics to generate the requested number of questions. Topics available: {available}, Questions requested: {requested}")]
    Capacity { available: usize, requested: u64 },

    #[error("Chunk size must be a positive integer")]
    InvalidChunkSize,

    /// Capacity validation let through a plan the pool cannot serve.
    #[error("Topic index out of bounds (cursor {cursor} + {chunk_size} > {len}). This indicates a logic error in topic validation.")]
    TopicCursorOverrun { cursor: usize, chunk_size: usize, len: usize },

    #[error("No prompt template registered for question type '{0}'")]
    EmptyTemplate(String),

    #[error("OPENAI_API_KEY environment variable not set.")]
    ModelUnavailable,

    #[error("All model API retries failed after {attempts} attempt(s): {last_error}")]
    TransportExhausted { attempts: u32, last_error: String },

    #[error("Model returned {got} questions instead of {expected}")]
    ValidationMismatch { expected: usize, got: usize },

    #[error("No questions were successfully generated. Check logs for API errors or response format issues.")]
    NothingGenerated,

    #[error("Cannot write {path}. Details: {reason}")]
    ArtifactWrite { path: String, reason: String },

    #[error("Upload of {public_id} failed: {reason}")]
    Upload { public_id: String, reason: String },

    #[error("Audit log write failed: {0}")]
    Audit(String),
}

pub type GenerationResult<T> = Result<T, GenerationError>;
