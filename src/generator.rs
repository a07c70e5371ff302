//! Generation client: one chunk prompt in, raw model text out.
//!
//! Live mode retries transport/provider failures under a fixed-backoff policy.
//! Testing mode never touches the network and always returns a well-formed chunk.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::domain::{Prompt, QUESTION_DELIMITER};
use crate::error::{GenerationError, GenerationResult};
use crate::openai::{ChatModel, CompletionParams};
use crate::retry::{RetryPolicy, Sleeper};

/// Raw model output together with the system prompt that produced it.
#[derive(Clone, Debug)]
pub struct ModelReply {
    pub content: String,
    pub system_prompt: String,
}

pub fn system_prompt(exam_name: &str) -> String {
    format!("You are a {} paper setter.", exam_name)
}

/// Deterministic stand-in for the model: `chunk_size` delimited pseudo-questions.
pub fn testing_reply(prompt: &Prompt, chunk_size: usize) -> String {
    (0..chunk_size)
        .map(|i| {
            format!(
                "{QUESTION_DELIMITER}\nQ{}. This is a sample test question for type {}.\nAnswer: A\nExplanation: This is a test explanation.",
                i + 1,
                prompt.question_type
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[derive(Clone)]
pub struct GenerationClient {
    model: Option<Arc<dyn ChatModel>>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
    params: CompletionParams,
    testing_delay: Duration,
}

impl GenerationClient {
    pub fn new(
        model: Option<Arc<dyn ChatModel>>,
        sleeper: Arc<dyn Sleeper>,
        policy: RetryPolicy,
        params: CompletionParams,
        testing_delay: Duration,
    ) -> Self {
        Self { model, sleeper, policy, params, testing_delay }
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Model identifier recorded in audit entries.
    pub fn model_name(&self) -> &str {
        self.model.as_deref().map(|m| m.model_name()).unwrap_or("testing")
    }

    /// Call the model for one chunk.
    #[instrument(level = "debug", skip_all, fields(question_type = %prompt.question_type, %exam_name, chunk_size = chunk_size, testing = testing))]
    pub async fn call(
        &self,
        prompt: &Prompt,
        exam_name: &str,
        chunk_size: usize,
        testing: bool,
    ) -> GenerationResult<ModelReply> {
        let system = system_prompt(exam_name);

        if testing {
            self.sleeper.sleep(self.testing_delay).await;
            return Ok(ModelReply { content: testing_reply(prompt, chunk_size), system_prompt: system });
        }

        let model = self.model.as_ref().ok_or(GenerationError::ModelUnavailable)?;
        let mut last_error = String::new();
        for attempt in 0..self.policy.max_attempts {
            match model.complete(&system, &prompt.text, self.params).await {
                Ok(content) => {
                    info!(target: "generation", attempt = attempt + 1, response_len = content.len(), "Model call succeeded");
                    return Ok(ModelReply { content, system_prompt: system });
                }
                Err(e) => {
                    warn!(target: "generation", attempt = attempt + 1, max_attempts = self.policy.max_attempts, error = %e, "Model attempt failed");
                    last_error = e;
                    if self.policy.has_next(attempt) {
                        self.sleeper.sleep(self.policy.backoff).await;
                    }
                }
            }
        }

        Err(GenerationError::TransportExhausted { attempts: self.policy.max_attempts, last_error })
    }
}
