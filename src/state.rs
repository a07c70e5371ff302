//! Application state: the run coordinator and its collaborators, built once at startup.
//!
//! This module owns:
//!   - the resolved `AppConfig`
//!   - the run coordinator (templates, model client, audit sink, artifact writer)
//!   - the optional syllabus provider used when a request carries no topics
//!
//! Shared resources are opened once per process and reused by every run.

use std::sync::Arc;

use tracing::{error, info, instrument};

use crate::artifacts::{ArtifactWriter, HttpObjectStore, ObjectStore};
use crate::audit::{AuditSink, JsonlAuditSink, NoopAuditSink, RawResponseStore};
use crate::config::{AppConfig, PromptTemplates};
use crate::coordinator::RunCoordinator;
use crate::generator::GenerationClient;
use crate::openai::{ChatModel, CompletionParams, OpenAI};
use crate::orchestrator::{BatchOrchestrator, OrchestratorSettings};
use crate::retry::{Sleeper, TokioSleeper};
use crate::syllabus::{FileSyllabus, SyllabusProvider};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub coordinator: RunCoordinator,
    pub syllabus: Option<Arc<dyn SyllabusProvider>>,
}

impl AppState {
    /// Build state from config: templates, model client, audit sink, storage, syllabus.
    #[instrument(level = "info", skip_all)]
    pub fn new(config: AppConfig) -> Self {
        let templates = Arc::new(PromptTemplates::resolve(config.prompts_config_path.as_deref()));
        info!(target: "mocktest_backend", count = templates.templates.len(), "Prompt templates ready");

        let model: Option<Arc<dyn ChatModel>> = match &config.openai {
            Some(settings) => match OpenAI::new(settings) {
                Ok(oa) => {
                    info!(target: "mocktest_backend", base_url = %oa.base_url, model = %oa.model, "OpenAI enabled.");
                    Some(Arc::new(oa) as Arc<dyn ChatModel>)
                }
                Err(e) => {
                    error!(target: "mocktest_backend", error = %e, "Failed to build OpenAI client; only testing mode available");
                    None
                }
            },
            None => {
                info!(target: "mocktest_backend", "OpenAI disabled (no OPENAI_API_KEY). Only testing mode available.");
                None
            }
        };

        let audit: Arc<dyn AuditSink> = match (&config.audit.path, config.audit.enabled) {
            (Some(path), true) => {
                info!(target: "audit", path = %path.display(), "Generation logging enabled");
                Arc::new(JsonlAuditSink::new(path)) as Arc<dyn AuditSink>
            }
            _ => {
                info!(target: "audit", "Generation logging disabled");
                Arc::new(NoopAuditSink)
            }
        };

        let store: Option<Arc<dyn ObjectStore>> = config.storage.as_ref().and_then(|s| match HttpObjectStore::new(s) {
            Ok(store) => {
                info!(target: "artifacts", upload_url = %s.upload_url, prefix = %s.prefix, "Object storage enabled");
                Some(Arc::new(store) as Arc<dyn ObjectStore>)
            }
            Err(e) => {
                error!(target: "artifacts", error = %e, "Failed to build storage client; artifacts stay local");
                None
            }
        });
        let prefix = config.storage.as_ref().map(|s| s.prefix.clone()).unwrap_or_else(|| "mock_tests".into());

        let settings = &config.generation;
        let sleeper: Arc<dyn Sleeper> = Arc::new(TokioSleeper);
        let client = GenerationClient::new(
            model,
            sleeper.clone(),
            settings.transport_retry,
            CompletionParams { temperature: settings.temperature, max_tokens: settings.max_tokens },
            settings.testing_delay,
        );
        let orchestrator = BatchOrchestrator::new(
            client,
            sleeper,
            audit,
            Some(RawResponseStore::new(&config.raw_responses_dir)),
            OrchestratorSettings {
                max_retries_per_chunk: settings.max_retries_per_chunk,
                validation_retry_delay: settings.validation_retry_delay,
                transport_retry_delay: settings.transport_retry.backoff,
                audit_enabled: config.audit.enabled,
            },
        );
        let writer = ArtifactWriter::new(&config.output_dir, store, prefix);
        let coordinator = RunCoordinator::new(templates, orchestrator, writer, settings.seed);

        let syllabus = config.syllabus_path.as_ref().map(|p| {
            info!(target: "mocktest_backend", path = %p.display(), "Syllabus file configured");
            Arc::new(FileSyllabus::new(p)) as Arc<dyn SyllabusProvider>
        });

        Self { config, coordinator, syllabus }
    }
}
