//! HTTP endpoint handlers. These are thin wrappers that forward to the run coordinator.
//! Each handler is instrumented and logs parameters and basic result info.

use std::path::Path as FsPath;
use std::sync::Arc;

use axum::{
  extract::{Path, State},
  http::{header, StatusCode},
  response::{IntoResponse, Response},
  Json,
};
use tracing::{error, info, instrument, warn};

use crate::coordinator::RunRequest;
use crate::domain::{OutputFormat, RunResult};
use crate::protocol::*;
use crate::state::AppState;
use crate::util::is_safe_filename;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info")]
pub async fn http_wakeup() -> impl IntoResponse { Json(WakeupOut { mssg: "I am ready" }) }

#[instrument(level = "info", skip(state))]
pub async fn http_question_types(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let types: Vec<QuestionTypeOut> = state
    .coordinator
    .templates()
    .templates
    .iter()
    .map(|t| QuestionTypeOut {
      name: t.code.clone(),
      description: if t.description.is_empty() { format!("Generate {} questions.", t.code) } else { t.description.clone() },
    })
    .collect();
  Json(types)
}

fn error_out(status: StatusCode, detail: impl Into<String>) -> Response {
  (status, Json(ErrorOut { detail: detail.into() })).into_response()
}

#[instrument(level = "info", skip(state, body), fields(exam = %body.exam_name, testing = body.testing_mode, format = ?body.output_format))]
pub async fn http_generate_questions(
  State(state): State<Arc<AppState>>,
  Json(body): Json<GenerateIn>,
) -> Response {
  let topics = match body.topics {
    Some(topics) => topics,
    None => match &state.syllabus {
      Some(provider) => match provider.topics().await {
        Ok(topics) => topics,
        Err(e) => {
          error!(target: "mocktest_backend", error = %e, "Syllabus provider failed");
          let result = RunResult::failed(format!("Question generation failed: {}", e));
          return (StatusCode::INTERNAL_SERVER_ERROR, Json(result)).into_response();
        }
      },
      None => return error_out(StatusCode::BAD_REQUEST, "No topics supplied and no syllabus configured."),
    },
  };

  let request = RunRequest {
    plan: body.question_plan,
    testing_mode: body.testing_mode,
    exam_name: body.exam_name,
    output_format: body.output_format,
    chunk_size: state.config.generation.questions_per_chunk,
    topics,
  };
  let result = state.coordinator.run(request).await;
  info!(target: "mocktest_backend", success = result.success, files = result.files.len(), "HTTP generate_questions finished");

  let status = if result.success { StatusCode::OK } else { StatusCode::INTERNAL_SERVER_ERROR };
  (status, Json(result)).into_response()
}

#[instrument(level = "info", skip(state), fields(%filename))]
pub async fn http_download(
  State(state): State<Arc<AppState>>,
  Path(filename): Path<String>,
) -> Response {
  if !is_safe_filename(&filename) {
    warn!(target: "mocktest_backend", %filename, "Rejected download filename");
    return error_out(StatusCode::BAD_REQUEST, "Invalid filename.");
  }
  let content_type = FsPath::new(&filename)
    .extension()
    .and_then(|e| e.to_str())
    .and_then(OutputFormat::from_extension)
    .map(OutputFormat::content_type)
    .unwrap_or("application/octet-stream");

  let path = state.coordinator.writer().output_dir().join(&filename);
  match tokio::fs::read(&path).await {
    Ok(bytes) => {
      info!(target: "mocktest_backend", %filename, size = bytes.len(), "Serving generated file");
      let disposition = format!("attachment; filename=\"{}\"", filename);
      ([(header::CONTENT_TYPE, content_type.to_string()), (header::CONTENT_DISPOSITION, disposition)], bytes).into_response()
    }
    Err(_) => error_out(StatusCode::NOT_FOUND, format!("File not found: {}", filename)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::AppConfig;
  use axum::body::to_bytes;

  fn state(dir: &std::path::Path) -> Arc<AppState> {
    Arc::new(AppState::new(AppConfig::for_tests(dir)))
  }

  fn generate_body(json: &str) -> GenerateIn {
    serde_json::from_str(json).unwrap()
  }

  #[tokio::test]
  async fn generate_then_download() {
    let dir = tempfile::tempdir().unwrap();
    let st = state(dir.path());
    let topics: Vec<String> = (0..20).map(|i| format!("\"Topic {i}\"")).collect();
    let body = generate_body(&format!(
      r#"{{"question_plan": {{"MCQ": 6}}, "testing_mode": true, "exam_name": "UPSC", "output_format": "docx", "topics": [{}]}}"#,
      topics.join(",")
    ));

    let res = http_generate_questions(State(st.clone()), Json(body)).await;
    assert_eq!(res.status(), StatusCode::OK);
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(v["success"], true);
    let name = v["files"]["questions"].as_str().unwrap().to_string();
    assert!(name.ends_with(".docx"));

    let res = http_download(State(st), Path(name)).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
      res.headers()[header::CONTENT_TYPE],
      "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
    );
  }

  #[tokio::test]
  async fn failed_run_is_a_server_error_with_message() {
    let dir = tempfile::tempdir().unwrap();
    let body = generate_body(r#"{"question_plan": {"MCQ": 6}, "testing_mode": true, "exam_name": "UPSC", "topics": []}"#);

    let res = http_generate_questions(State(state(dir.path())), Json(body)).await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(v["success"], false);
    assert!(v["message"].as_str().unwrap().contains("Not enough unique topics"));
  }

  #[tokio::test]
  async fn missing_topics_without_syllabus_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let body = generate_body(r#"{"question_plan": {"MCQ": 3}, "exam_name": "UPSC"}"#);
    let res = http_generate_questions(State(state(dir.path())), Json(body)).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn download_rejects_traversal_and_unknown_files() {
    let dir = tempfile::tempdir().unwrap();
    let st = state(dir.path());
    let res = http_download(State(st.clone()), Path("../Cargo.toml".to_string())).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let res = http_download(State(st), Path("Questions_00000000.pdf".to_string())).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn question_types_lists_registry() {
    let dir = tempfile::tempdir().unwrap();
    let res = http_question_types(State(state(dir.path()))).await.into_response();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(v.as_array().unwrap().len(), 12);
    assert_eq!(v[0]["name"], "MTF");
  }
}
