//! Mock Test Generation Backend
//!
//! - Axum HTTP API for question-type catalogue, generation runs and downloads
//! - OpenAI-backed question generation with a deterministic testing mode
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                : u16 (default 3000)
//!   OPENAI_API_KEY      : enables live generation if present
//!   OPENAI_BASE_URL     : default "https://api.openai.com/v1"
//!   OPENAI_MODEL        : default "gpt-4-turbo"
//!   QUESTIONS_PER_CHUNK : topics (and questions) per model call, default 3
//!   OUTPUT_DIR          : where question documents are written
//!   AUDIT_LOG_PATH      : JSON-lines generation log (with SAVE_GENERATIONS=true)
//!   STORAGE_UPLOAD_URL  : remote object storage endpoint for finished documents
//!   SYLLABUS_PATH       : topic file used when a request carries no topics
//!   PROMPTS_CONFIG_PATH : path to TOML prompt templates
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

mod artifacts;
mod audit;
mod config;
mod coordinator;
mod domain;
mod error;
mod generator;
mod openai;
mod orchestrator;
mod prompts;
mod protocol;
mod retry;
mod routes;
mod state;
mod syllabus;
mod telemetry;
mod topics;
mod util;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;

use crate::config::AppConfig;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Resolve configuration once; everything downstream receives it explicitly.
  let config = AppConfig::from_env();
  let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

  // Build shared application state (model client, audit sink, storage, templates).
  let state = Arc::new(AppState::new(config));

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  let listener = TcpListener::bind(addr).await?;
  info!(target: "mocktest_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}
