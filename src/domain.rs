//! Domain models: question plan, chunks, prompts, generation run and its outputs.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Literal marker the model is told to put in front of every question.
pub const QUESTION_DELIMITER: &str = "--Question Starting--";

/// Requested question counts per question-type code.
/// Keeps the order in which the caller listed the types; chunks are generated in that order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuestionPlan {
  entries: Vec<(String, u32)>,
}

impl QuestionPlan {
  pub fn new() -> Self { Self::default() }

  /// Add (or overwrite) the count for a question type, keeping first-seen order.
  #[cfg(test)]
  pub fn with(mut self, code: impl Into<String>, count: u32) -> Self {
    self.insert(code.into(), count);
    self
  }

  pub fn insert(&mut self, code: String, count: u32) {
    match self.entries.iter_mut().find(|(c, _)| *c == code) {
      Some(entry) => entry.1 = count,
      None => self.entries.push((code, count)),
    }
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
    self.entries.iter().map(|(c, n)| (c.as_str(), *n))
  }

  /// Sum of all requested counts, before any floor division.
  pub fn total_requested(&self) -> u64 {
    self.entries.iter().map(|(_, n)| u64::from(*n)).sum()
  }

  /// Number of whole chunks requested for one type; the remainder is dropped.
  pub fn chunks_for(count: u32, chunk_size: usize) -> usize {
    if chunk_size == 0 { 0 } else { count as usize / chunk_size }
  }

  /// Σ floor(count / chunk_size) over every type.
  pub fn total_chunks(&self, chunk_size: usize) -> usize {
    self.entries.iter().map(|(_, n)| Self::chunks_for(*n, chunk_size)).sum()
  }
}

impl Serialize for QuestionPlan {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_map(self.entries.iter().map(|(c, n)| (c, n)))
  }
}

impl<'de> Deserialize<'de> for QuestionPlan {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    struct PlanVisitor;

    impl<'de> Visitor<'de> for PlanVisitor {
      type Value = QuestionPlan;

      fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of question-type code to non-negative count")
      }

      fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut plan = QuestionPlan::new();
        while let Some((code, count)) = map.next_entry::<String, u32>()? {
          plan.insert(code, count);
        }
        Ok(plan)
      }
    }

    deserializer.deserialize_map(PlanVisitor)
  }
}

/// Output document format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
  #[default]
  Pdf,
  Docx,
}

impl OutputFormat {
  pub fn extension(self) -> &'static str {
    match self {
      OutputFormat::Pdf => "pdf",
      OutputFormat::Docx => "docx",
    }
  }

  pub fn content_type(self) -> &'static str {
    match self {
      OutputFormat::Pdf => "application/pdf",
      OutputFormat::Docx => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    }
  }

  pub fn from_extension(ext: &str) -> Option<Self> {
    match ext.to_ascii_lowercase().as_str() {
      "pdf" => Some(OutputFormat::Pdf),
      "docx" => Some(OutputFormat::Docx),
      _ => None,
    }
  }
}

/// Fixed-size batch of topics for one prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
  pub question_type: String,
  pub topics: Vec<String>,
}

/// Rendered user prompt for one chunk.
#[derive(Clone, Debug)]
pub struct Prompt {
  pub question_type: String,
  pub text: String,
  pub answer_key: String,
}

impl Prompt {
  /// Unknown question types render against an empty template.
  pub fn is_degenerate(&self) -> bool { self.text.trim().is_empty() }
}

/// A chunk that could not be validated within its retry budget.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SkippedChunk {
  pub question_type: String,
  /// Segments parsed from the last response seen; empty when every attempt failed in transport.
  pub last_segments: Vec<String>,
}

/// Aggregate output of the batch orchestrator.
#[derive(Clone, Debug, Default)]
pub struct GenerationRun {
  pub questions: Vec<String>,
  pub skipped: Vec<SkippedChunk>,
}

impl GenerationRun {
  pub fn is_empty(&self) -> bool { self.questions.is_empty() && self.skipped.is_empty() }
}

/// Where a persisted artifact can be fetched from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArtifactLocation {
  /// Durable URL returned by object storage.
  Remote(String),
  /// Bare filename inside the local output directory (upload failed or storage disabled).
  Local(String),
}

impl ArtifactLocation {
  pub fn as_str(&self) -> &str {
    match self {
      ArtifactLocation::Remote(s) | ArtifactLocation::Local(s) => s,
    }
  }

  pub fn is_remote(&self) -> bool { matches!(self, ArtifactLocation::Remote(_)) }
}

impl Serialize for ArtifactLocation {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(self.as_str())
  }
}

/// Structured result of one run, returned to the caller as-is.
#[derive(Clone, Debug, Serialize)]
pub struct RunResult {
  pub success: bool,
  pub message: String,
  pub files: BTreeMap<String, ArtifactLocation>,
}

impl RunResult {
  pub fn failed(message: impl Into<String>) -> Self {
    Self { success: false, message: message.into(), files: BTreeMap::new() }
  }
}
