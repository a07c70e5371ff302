//! Batch orchestrator: drives chunk prompts through the generation client.
//!
//! Per chunk: Pending -> Attempting -> {Validated | Retrying | Exhausted}.
//! Chunks run one at a time in prompt order. A chunk is validated when the
//! response splits into exactly `chunk_size` questions; otherwise it is retried
//! until `max_retries_per_chunk` attempts are used, then recorded as skipped.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use crate::audit::{AuditRecord, AuditSink, RawResponseStore};
use crate::domain::{GenerationRun, Prompt, SkippedChunk, QUESTION_DELIMITER};
use crate::error::{GenerationError, GenerationResult};
use crate::generator::{GenerationClient, ModelReply};
use crate::retry::Sleeper;
use crate::util::trunc_for_log;

/// Split raw model text on the delimiter, trim, drop empty segments.
pub fn parse_questions(text: &str) -> Vec<String> {
    text.split(QUESTION_DELIMITER)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Result of one generation attempt for one chunk.
#[derive(Debug)]
enum AttemptOutcome {
    Success { questions: Vec<String>, reply: ModelReply },
    Malformed { questions: Vec<String> },
    TransportFailure(GenerationError),
}

/// Terminal state of a chunk.
#[derive(Debug, PartialEq, Eq)]
pub enum ChunkOutcome {
    Validated(Vec<String>),
    /// Carries the segments of the last response seen, possibly none.
    Exhausted(Vec<String>),
}

#[derive(Clone, Debug)]
pub struct OrchestratorSettings {
    pub max_retries_per_chunk: u32,
    /// Pause after a response with the wrong question count.
    pub validation_retry_delay: Duration,
    /// Pause after a chunk attempt that failed in transport.
    pub transport_retry_delay: Duration,
    pub audit_enabled: bool,
}

#[derive(Clone)]
pub struct BatchOrchestrator {
    client: GenerationClient,
    sleeper: Arc<dyn Sleeper>,
    audit: Arc<dyn AuditSink>,
    raw_responses: Option<RawResponseStore>,
    settings: OrchestratorSettings,
}

impl BatchOrchestrator {
    pub fn new(
        client: GenerationClient,
        sleeper: Arc<dyn Sleeper>,
        audit: Arc<dyn AuditSink>,
        raw_responses: Option<RawResponseStore>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self { client, sleeper, audit, raw_responses, settings }
    }

    pub fn client(&self) -> &GenerationClient {
        &self.client
    }

    async fn attempt(&self, prompt: &Prompt, exam_name: &str, chunk_size: usize, testing: bool) -> AttemptOutcome {
        let reply = match self.client.call(prompt, exam_name, chunk_size, testing).await {
            Ok(reply) => reply,
            Err(e) => return AttemptOutcome::TransportFailure(e),
        };
        if !testing {
            if let Some(store) = &self.raw_responses {
                store.save(&reply.content).await;
            }
        }
        let questions = parse_questions(&reply.content);
        if questions.len() == chunk_size {
            AttemptOutcome::Success { questions, reply }
        } else {
            AttemptOutcome::Malformed { questions }
        }
    }

    /// Resolve one chunk to Validated or Exhausted.
    #[instrument(level = "info", skip_all, fields(question_type = %prompt.question_type, chunk_size = chunk_size))]
    pub async fn run_chunk(&self, prompt: &Prompt, exam_name: &str, chunk_size: usize, testing: bool) -> ChunkOutcome {
        let max_attempts = self.settings.max_retries_per_chunk.max(1);
        let mut last_seen: Vec<String> = Vec::new();

        for attempt in 0..max_attempts {
            info!(target: "generation", attempt = attempt + 1, "Attempting chunk");
            let has_next = attempt + 1 < max_attempts;
            match self.attempt(prompt, exam_name, chunk_size, testing).await {
                AttemptOutcome::Success { questions, reply } => {
                    info!(target: "generation", count = questions.len(), "Chunk validated");
                    if !testing {
                        self.emit_audit(prompt, &reply, exam_name).await;
                    }
                    return ChunkOutcome::Validated(questions);
                }
                AttemptOutcome::Malformed { questions } => {
                    let err = GenerationError::ValidationMismatch { expected: chunk_size, got: questions.len() };
                    warn!(target: "generation", attempt = attempt + 1, error = %err, "Chunk failed validation");
                    last_seen = questions;
                    if has_next {
                        self.sleeper.sleep(self.settings.validation_retry_delay).await;
                    }
                }
                AttemptOutcome::TransportFailure(e) => {
                    error!(target: "generation", attempt = attempt + 1, error = %e, "Model call failed for chunk");
                    if has_next {
                        self.sleeper.sleep(self.settings.transport_retry_delay).await;
                    }
                }
            }
        }

        error!(target: "generation", attempts = max_attempts, "No valid chunk within retry budget; skipping");
        ChunkOutcome::Exhausted(last_seen)
    }

    /// Best-effort; a failing sink never affects the chunk.
    async fn emit_audit(&self, prompt: &Prompt, reply: &ModelReply, exam_name: &str) {
        if !self.settings.audit_enabled {
            return;
        }
        let record = AuditRecord {
            system: reply.system_prompt.clone(),
            prompt: prompt.text.clone(),
            response: reply.content.clone(),
            exam: exam_name.to_string(),
            model: self.client.model_name().to_string(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.audit.record(&record).await {
            warn!(target: "audit", error = %e, "Failed to log generation pair");
        }
    }

    /// Run every prompt in order. Fails only when nothing at all came back.
    #[instrument(level = "info", skip_all, fields(chunks = prompts.len(), %exam_name, testing = testing))]
    pub async fn generate(
        &self,
        prompts: &[Prompt],
        exam_name: &str,
        chunk_size: usize,
        testing: bool,
    ) -> GenerationResult<GenerationRun> {
        let mut run = GenerationRun::default();
        for prompt in prompts {
            info!(target: "generation", question_type = %prompt.question_type, preview = %trunc_for_log(&prompt.text, 80), "Generating chunk");
            match self.run_chunk(prompt, exam_name, chunk_size, testing).await {
                ChunkOutcome::Validated(questions) => run.questions.extend(questions),
                ChunkOutcome::Exhausted(last_segments) => run.skipped.push(SkippedChunk {
                    question_type: prompt.question_type.clone(),
                    last_segments,
                }),
            }
        }

        if run.is_empty() {
            return Err(GenerationError::NothingGenerated);
        }
        info!(target: "generation", accepted = run.questions.len(), skipped = run.skipped.len(), "Generation finished");
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::testing::MemoryAuditSink;
    use crate::generator::testing::{params, questions, ScriptedModel};
    use crate::openai::ChatModel;
    use crate::retry::testing::RecordingSleeper;
    use crate::retry::RetryPolicy;

    struct Fixture {
        orchestrator: BatchOrchestrator,
        model: Arc<ScriptedModel>,
        sleeper: Arc<RecordingSleeper>,
        audit: Arc<MemoryAuditSink>,
    }

    fn fixture_with(script: Vec<Result<String, String>>, audit: MemoryAuditSink, audit_enabled: bool) -> Fixture {
        let model = Arc::new(ScriptedModel::new(script));
        let sleeper = Arc::new(RecordingSleeper::default());
        let audit = Arc::new(audit);
        let chat: Arc<dyn ChatModel> = model.clone();
        let client = GenerationClient::new(
            Some(chat),
            sleeper.clone(),
            RetryPolicy::new(3, Duration::from_secs(2)),
            params(),
            Duration::from_millis(1000),
        );
        let orchestrator = BatchOrchestrator::new(
            client,
            sleeper.clone(),
            audit.clone(),
            None,
            OrchestratorSettings {
                max_retries_per_chunk: 3,
                validation_retry_delay: Duration::from_secs(1),
                transport_retry_delay: Duration::from_secs(2),
                audit_enabled,
            },
        );
        Fixture { orchestrator, model, sleeper, audit }
    }

    fn fixture(script: Vec<Result<String, String>>) -> Fixture {
        fixture_with(script, MemoryAuditSink::default(), true)
    }

    fn prompt(code: &str) -> Prompt {
        Prompt { question_type: code.into(), text: format!("Write 3 {code}"), answer_key: "1, 2, 3".into() }
    }

    #[test]
    fn parse_trims_and_drops_empty_segments() {
        let text = "  preamble\n--Question Starting--\n Q1 \n--Question Starting--\n\n--Question Starting--Q2";
        assert_eq!(parse_questions(text), vec!["preamble", "Q1", "Q2"]);
        assert!(parse_questions("").is_empty());
    }

    #[tokio::test]
    async fn first_valid_response_is_accepted_and_audited() {
        let f = fixture(vec![Ok(questions(3))]);
        let outcome = f.orchestrator.run_chunk(&prompt("MCQ"), "UPSC", 3, false).await;

        match outcome {
            ChunkOutcome::Validated(qs) => assert_eq!(qs.len(), 3),
            other => panic!("unexpected outcome: {other:?}"),
        }
        let records = f.audit.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].system, "You are a UPSC paper setter.");
        assert_eq!(records[0].prompt, "Write 3 MCQ");
        assert_eq!(records[0].model, "scripted-model");
        assert!(f.sleeper.calls().is_empty());
    }

    #[tokio::test]
    async fn wrong_count_is_retried_then_validated() {
        let f = fixture(vec![Ok(questions(2)), Ok(questions(3))]);
        let outcome = f.orchestrator.run_chunk(&prompt("MCQ"), "UPSC", 3, false).await;

        assert!(matches!(outcome, ChunkOutcome::Validated(_)));
        assert_eq!(f.model.call_count(), 2);
        assert_eq!(f.sleeper.calls(), vec![Duration::from_secs(1)]);
    }

    #[tokio::test]
    async fn persistent_wrong_count_exhausts_with_last_segments() {
        let f = fixture(vec![Ok(questions(1)), Ok(questions(4)), Ok(questions(2))]);
        let outcome = f.orchestrator.run_chunk(&prompt("MCQ"), "UPSC", 3, false).await;

        match outcome {
            ChunkOutcome::Exhausted(last) => assert_eq!(last.len(), 2),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(f.model.call_count(), 3);
        // Two pauses between three attempts; none after the last.
        assert_eq!(f.sleeper.calls(), vec![Duration::from_secs(1); 2]);
        assert!(f.audit.records().is_empty());
    }

    #[tokio::test]
    async fn empty_reply_is_retried_as_a_count_mismatch() {
        let f = fixture(vec![Ok(String::new())]);
        let outcome = f.orchestrator.run_chunk(&prompt("MCQ"), "UPSC", 3, false).await;

        assert_eq!(outcome, ChunkOutcome::Exhausted(vec![]));
        assert_eq!(f.model.call_count(), 3);
        assert_eq!(f.sleeper.calls(), vec![Duration::from_secs(1); 2]);
    }

    #[tokio::test]
    async fn transport_exhaustion_skips_chunk_with_no_segments() {
        let f = fixture(vec![Err("connection refused".into())]);
        let outcome = f.orchestrator.run_chunk(&prompt("MCQ"), "UPSC", 3, false).await;

        assert_eq!(outcome, ChunkOutcome::Exhausted(vec![]));
        // 3 chunk attempts x 3 transport attempts.
        assert_eq!(f.model.call_count(), 9);
    }

    #[tokio::test]
    async fn failing_audit_sink_does_not_fail_chunk() {
        let f = fixture_with(vec![Ok(questions(3))], MemoryAuditSink::failing(), true);
        let outcome = f.orchestrator.run_chunk(&prompt("MCQ"), "UPSC", 3, false).await;
        assert!(matches!(outcome, ChunkOutcome::Validated(_)));
    }

    #[tokio::test]
    async fn audit_respects_master_flag() {
        let f = fixture_with(vec![Ok(questions(3))], MemoryAuditSink::default(), false);
        f.orchestrator.run_chunk(&prompt("MCQ"), "UPSC", 3, false).await;
        assert!(f.audit.records().is_empty());
    }

    #[tokio::test]
    async fn testing_mode_validates_first_try_without_audit() {
        let f = fixture(vec![]);
        let run = f.orchestrator.generate(&[prompt("MCQ"), prompt("NU")], "UPSC", 3, true).await.unwrap();

        assert_eq!(run.questions.len(), 6);
        assert!(run.skipped.is_empty());
        assert_eq!(f.model.call_count(), 0);
        assert!(f.audit.records().is_empty());
    }

    #[tokio::test]
    async fn skipped_chunk_leaves_other_chunks_intact() {
        // Chunk 1 ok, chunk 2 three malformed replies, chunk 3 ok.
        let f = fixture(vec![
            Ok(questions(3)),
            Ok(questions(1)),
            Ok(questions(1)),
            Ok(questions(1)),
            Ok(questions(3)),
        ]);
        let run = f
            .orchestrator
            .generate(&[prompt("MCQ"), prompt("AR"), prompt("NU")], "UPSC", 3, false)
            .await
            .unwrap();

        assert_eq!(run.questions.len(), 6);
        assert_eq!(run.skipped, vec![SkippedChunk { question_type: "AR".into(), last_segments: vec!["Q1. Which statement is correct?\nAnswer: 2".into()] }]);
    }

    #[tokio::test]
    async fn no_prompts_is_nothing_generated() {
        let f = fixture(vec![]);
        let err = f.orchestrator.generate(&[], "UPSC", 3, true).await.unwrap_err();
        assert!(matches!(err, GenerationError::NothingGenerated));
    }
}
