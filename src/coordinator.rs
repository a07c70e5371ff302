//! Run coordinator: one request in, one `RunResult` out.
//!
//! Composes topic pool -> prompt builder -> orchestrator -> artifact writer.
//! This is the only place errors are reported: every failure below becomes a
//! failed `RunResult`, nothing propagates to the caller.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::artifacts::ArtifactWriter;
use crate::config::PromptTemplates;
use crate::domain::{GenerationRun, OutputFormat, Prompt, QuestionPlan, RunResult};
use crate::error::{GenerationError, GenerationResult};
use crate::orchestrator::BatchOrchestrator;
use crate::prompts::build_prompt;
use crate::topics::TopicPool;

/// Inputs of one generation run.
#[derive(Clone, Debug)]
pub struct RunRequest {
    pub plan: QuestionPlan,
    pub testing_mode: bool,
    pub exam_name: String,
    pub output_format: OutputFormat,
    pub chunk_size: usize,
    pub topics: Vec<String>,
}

/// 8 hex chars; namespaces output filenames. Collisions are not guarded.
pub fn new_run_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Base message states the accepted count; a skip clause is appended, never substituted.
pub fn compose_message(accepted: usize, skipped: usize) -> String {
    if accepted > 0 {
        let mut message = format!("Successfully generated {} questions.", accepted);
        if skipped > 0 {
            message.push_str(&format!(
                " Failed to generate {} chunk(s), which have been saved separately.",
                skipped
            ));
        }
        message
    } else {
        format!("Failed to generate questions, but {} skipped chunk(s) were saved.", skipped)
    }
}

/// Independent random sources for topic shuffling and answer keys.
fn run_rngs(seed: Option<u64>) -> (StdRng, StdRng) {
    match seed {
        Some(s) => (StdRng::seed_from_u64(s), StdRng::seed_from_u64(s.rotate_left(32) ^ 0x5eed)),
        None => (StdRng::from_entropy(), StdRng::from_entropy()),
    }
}

#[derive(Clone)]
pub struct RunCoordinator {
    templates: Arc<PromptTemplates>,
    orchestrator: BatchOrchestrator,
    writer: ArtifactWriter,
    seed: Option<u64>,
}

impl RunCoordinator {
    pub fn new(
        templates: Arc<PromptTemplates>,
        orchestrator: BatchOrchestrator,
        writer: ArtifactWriter,
        seed: Option<u64>,
    ) -> Self {
        Self { templates, orchestrator, writer, seed }
    }

    pub fn templates(&self) -> &PromptTemplates {
        &self.templates
    }

    pub fn writer(&self) -> &ArtifactWriter {
        &self.writer
    }

    /// Chunk the pool and render one prompt per chunk, in plan order.
    pub fn build_prompts(&self, request: &RunRequest) -> GenerationResult<Vec<Prompt>> {
        let (mut topic_rng, mut key_rng) = run_rngs(self.seed);
        let mut pool = TopicPool::prepare(&request.plan, &request.topics, request.chunk_size, &mut topic_rng)?;
        let chunks = pool.assign(&request.plan)?;

        chunks
            .iter()
            .map(|chunk| {
                let prompt = build_prompt(&self.templates, chunk, request.chunk_size, &request.exam_name, &mut key_rng);
                if !self.templates.contains(&chunk.question_type) || prompt.is_degenerate() {
                    return Err(GenerationError::EmptyTemplate(chunk.question_type.clone()));
                }
                debug!(target: "generation", question_type = %prompt.question_type, answer_key = %prompt.answer_key, "Prompt built");
                Ok(prompt)
            })
            .collect()
    }

    async fn execute(&self, request: &RunRequest, run_id: &str) -> GenerationResult<RunResult> {
        let prompts = self.build_prompts(request)?;
        if !request.testing_mode && !self.orchestrator.client().has_model() && !prompts.is_empty() {
            return Err(GenerationError::ModelUnavailable);
        }

        let GenerationRun { questions, skipped } = self
            .orchestrator
            .generate(&prompts, &request.exam_name, request.chunk_size, request.testing_mode)
            .await?;

        let mut files = BTreeMap::new();
        if !questions.is_empty() {
            let location = self.writer.write_questions(&questions, run_id, request.output_format).await?;
            info!(target: "generation", %run_id, remote = location.is_remote(), "Questions document ready");
            files.insert("questions".to_string(), location);
        }
        if let Some(location) = self.writer.write_skipped(&skipped, run_id, request.output_format).await? {
            files.insert("skipped".to_string(), location);
        }

        Ok(RunResult { success: true, message: compose_message(questions.len(), skipped.len()), files })
    }

    /// Run the whole pipeline. Never fails: errors come back as `success: false`.
    #[instrument(
        level = "info",
        skip_all,
        fields(exam = %request.exam_name, testing = request.testing_mode, format = ?request.output_format, chunk_size = request.chunk_size, topics = request.topics.len())
    )]
    pub async fn run(&self, request: RunRequest) -> RunResult {
        let run_id = new_run_id();
        info!(target: "generation", %run_id, plan = ?request.plan, "Starting generation");

        match self.execute(&request, &run_id).await {
            Ok(result) => {
                info!(target: "generation", %run_id, message = %result.message, "Mock test generation completed");
                result
            }
            Err(e) => {
                let message = format!("Question generation failed: {}", e);
                error!(target: "generation", %run_id, error = %e, "Run failed");
                RunResult::failed(message)
            }
        }
    }
}
