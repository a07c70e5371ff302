//! Process configuration, resolved once at startup.
//!
//! `AppConfig::from_env` reads every knob the pipeline uses; the result is
//! passed explicitly to the run coordinator. Prompt templates load from an
//! optional TOML file (`PROMPTS_CONFIG_PATH`), falling back to built-ins.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::retry::RetryPolicy;

/// Everything the generation pipeline needs, with defaults resolved.
#[derive(Clone, Debug)]
pub struct AppConfig {
  pub port: u16,
  pub openai: Option<OpenAISettings>,
  pub generation: GenerationSettings,
  pub output_dir: PathBuf,
  pub raw_responses_dir: PathBuf,
  pub audit: AuditSettings,
  pub storage: Option<StorageSettings>,
  pub syllabus_path: Option<PathBuf>,
  pub prompts_config_path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct OpenAISettings {
  pub api_key: String,
  pub base_url: String,
  pub model: String,
}

const DEFAULT_MODEL: &str = "gpt-4-turbo";

#[derive(Clone, Debug)]
pub struct GenerationSettings {
  pub questions_per_chunk: usize,
  pub max_retries_per_chunk: u32,
  /// Transport-level retries inside a single chunk attempt.
  pub transport_retry: RetryPolicy,
  /// Pause before re-asking after a response with the wrong question count.
  pub validation_retry_delay: Duration,
  pub testing_delay: Duration,
  pub temperature: f32,
  pub max_tokens: u32,
  /// Fixed seed for topic shuffling and answer keys; entropy when absent.
  pub seed: Option<u64>,
}

impl Default for GenerationSettings {
  fn default() -> Self {
    Self {
      questions_per_chunk: 3,
      max_retries_per_chunk: 3,
      transport_retry: RetryPolicy::new(3, Duration::from_secs(2)),
      validation_retry_delay: Duration::from_secs(1),
      testing_delay: Duration::from_millis(1000),
      temperature: 0.7,
      max_tokens: 4000,
      seed: None,
    }
  }
}

#[derive(Clone, Debug)]
pub struct AuditSettings {
  /// Master switch for generation logging.
  pub enabled: bool,
  pub path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct StorageSettings {
  pub upload_url: String,
  pub api_key: Option<String>,
  pub prefix: String,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
  match std::env::var(key) {
    Ok(raw) => match raw.trim().parse::<T>() {
      Ok(v) => v,
      Err(_) => {
        warn!(target: "mocktest_backend", %key, %raw, "Unparsable value; using default");
        default
      }
    },
    Err(_) => default,
  }
}

fn env_path(key: &str) -> Option<PathBuf> {
  std::env::var(key).ok().filter(|s| !s.trim().is_empty()).map(PathBuf::from)
}

impl AppConfig {
  /// Read configuration from the process environment.
  pub fn from_env() -> Self {
    let defaults = GenerationSettings::default();
    let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into());

    let openai = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()).map(|api_key| OpenAISettings {
      api_key,
      base_url: std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into()),
      model,
    });

    let generation = GenerationSettings {
      questions_per_chunk: env_or("QUESTIONS_PER_CHUNK", defaults.questions_per_chunk),
      max_retries_per_chunk: env_or("MAX_RETRIES_PER_CHUNK", defaults.max_retries_per_chunk).max(1),
      transport_retry: RetryPolicy::new(
        env_or("MODEL_MAX_ATTEMPTS", defaults.transport_retry.max_attempts).max(1),
        Duration::from_secs(env_or("MODEL_BACKOFF_SECS", 2u64)),
      ),
      validation_retry_delay: Duration::from_secs(env_or("VALIDATION_RETRY_DELAY_SECS", 1u64)),
      testing_delay: Duration::from_millis(env_or("TESTING_DELAY_MS", 1000u64)),
      seed: std::env::var("GENERATION_SEED").ok().and_then(|s| s.trim().parse().ok()),
      ..defaults
    };

    let storage = std::env::var("STORAGE_UPLOAD_URL").ok().filter(|u| !u.is_empty()).map(|upload_url| StorageSettings {
      upload_url,
      api_key: std::env::var("STORAGE_API_KEY").ok(),
      prefix: std::env::var("STORAGE_PREFIX").unwrap_or_else(|_| "mock_tests".into()),
    });

    Self {
      port: env_or("PORT", 3000u16),
      openai,
      generation,
      output_dir: env_path("OUTPUT_DIR").unwrap_or_else(|| PathBuf::from("data/generated_files")),
      raw_responses_dir: env_path("RAW_RESPONSES_DIR").unwrap_or_else(|| PathBuf::from("data/raw_responses")),
      audit: AuditSettings {
        enabled: env_or("SAVE_GENERATIONS", true),
        path: env_path("AUDIT_LOG_PATH"),
      },
      storage,
      syllabus_path: env_path("SYLLABUS_PATH"),
      prompts_config_path: env_path("PROMPTS_CONFIG_PATH"),
    }
  }
}

/// One question type: its code, a human description and the prompt template.
/// Templates use `{topics}`, `{answer_key}`, `{num}` and `{exam}` placeholders.
#[derive(Clone, Debug, Deserialize)]
pub struct TemplateEntry {
  pub code: String,
  #[serde(default)]
  pub description: String,
  pub template: String,
}

/// Template registry accepted in TOML as `[[templates]]` entries.
#[derive(Clone, Debug, Deserialize)]
pub struct PromptTemplates {
  pub templates: Vec<TemplateEntry>,
}

const OUTPUT_RULES: &str = "Start every question with the line \"--Question Starting--\". \
After each question give \"Answer:\" and a short \"Explanation:\". \
Use this sequence of correct option numbers, one per question, in order: {answer_key}.";

fn entry(code: &str, description: &str, body: &str) -> TemplateEntry {
  TemplateEntry {
    code: code.into(),
    description: description.into(),
    template: format!(
      "Write {{num}} {body} for the {{exam}} exam, one question per topic below.\n\nTopics:\n{{topics}}\n\n{OUTPUT_RULES}"
    ),
  }
}

impl Default for PromptTemplates {
  fn default() -> Self {
    Self {
      templates: vec![
        entry("MTF", "Match the Following questions.", "match-the-following questions with two lists of four items and four coded options"),
        entry("2S", "Two-statement reasoning questions.", "two-statement questions asking which statements are correct, with four options"),
        entry("3S", "Three-statement analysis questions.", "three-statement questions asking how many statements are correct, with four options"),
        entry("4S", "Four-statement analysis questions.", "four-statement questions asking which statements are correct, with four options"),
        entry("5S", "Five-statement, highly analytical questions.", "five-statement analytical questions with four options"),
        entry("SL", "Single-liner scenario-based questions.", "single-line scenario-based multiple choice questions with four options"),
        entry("AR", "Assertion and Reasoning questions.", "assertion and reasoning questions with the four standard A/R options"),
        entry("CS", "Case study comprehension questions.", "case study questions, each a short passage followed by one four-option question"),
        entry("CH", "Chronological ordering questions.", "chronological ordering questions with four events and four ordering options"),
        entry("FU", "Fill in the Blanks questions.", "fill-in-the-blank questions with four options"),
        entry("MCQ", "Multiple choice questions.", "multiple choice questions with four options"),
        entry("NU", "Numerical answer type questions.", "numerical questions with four numeric options"),
      ],
    }
  }
}

impl PromptTemplates {
  /// Template text for a code; unknown codes yield an empty template.
  pub fn template(&self, code: &str) -> &str {
    self.templates.iter().find(|t| t.code == code).map(|t| t.template.as_str()).unwrap_or("")
  }

  pub fn contains(&self, code: &str) -> bool {
    self.templates.iter().any(|t| t.code == code)
  }

  /// Load templates from a TOML file. On any parsing/IO error, returns None.
  pub fn load(path: &std::path::Path) -> Option<Self> {
    match std::fs::read_to_string(path) {
      Ok(s) => match toml::from_str::<PromptTemplates>(&s) {
        Ok(cfg) => {
          info!(target: "mocktest_backend", path = %path.display(), count = cfg.templates.len(), "Loaded prompt templates (TOML)");
          Some(cfg)
        }
        Err(e) => {
          error!(target: "mocktest_backend", path = %path.display(), error = %e, "Failed to parse TOML templates");
          None
        }
      },
      Err(e) => {
        error!(target: "mocktest_backend", path = %path.display(), error = %e, "Failed to read TOML templates file");
        None
      }
    }
  }

  /// Templates from the configured path, or the built-in set.
  pub fn resolve(path: Option<&std::path::Path>) -> Self {
    path.and_then(Self::load).unwrap_or_default()
  }
}

#[cfg(test)]
impl AppConfig {
  /// Offline configuration rooted in `dir`: no model, no storage, no pauses.
  pub fn for_tests(dir: &std::path::Path) -> Self {
    Self {
      port: 0,
      openai: None,
      generation: GenerationSettings {
        testing_delay: Duration::ZERO,
        seed: Some(7),
        ..GenerationSettings::default()
      },
      output_dir: dir.join("generated_files"),
      raw_responses_dir: dir.join("raw_responses"),
      audit: AuditSettings { enabled: false, path: None },
      storage: None,
      syllabus_path: None,
      prompts_config_path: None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn builtin_templates_cover_all_codes() {
    let t = PromptTemplates::default();
    for code in ["MTF", "2S", "3S", "4S", "5S", "SL", "AR", "CS", "CH", "FU", "MCQ", "NU"] {
      let tpl = t.template(code);
      assert!(tpl.contains("{topics}") && tpl.contains("{answer_key}"), "{code}");
      assert!(tpl.contains("{num}") && tpl.contains("{exam}"), "{code}");
    }
    assert_eq!(t.template("XYZ"), "");
  }

  #[test]
  fn loads_templates_from_toml() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    writeln!(
      f,
      r#"
[[templates]]
code = "MCQ"
description = "Custom"
template = "{{num}} for {{exam}}: {{topics}} / {{answer_key}}"
"#
    )
    .unwrap();
    let t = PromptTemplates::resolve(Some(f.path()));
    assert_eq!(t.templates.len(), 1);
    assert_eq!(t.template("MCQ"), "{num} for {exam}: {topics} / {answer_key}");
  }

  #[test]
  fn broken_toml_falls_back_to_builtins() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    writeln!(f, "templates = 5").unwrap();
    let t = PromptTemplates::resolve(Some(f.path()));
    assert!(t.contains("NU"));
  }
}
