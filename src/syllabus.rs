//! Syllabus provider: where a run's topic list comes from when the request has none.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{info, instrument};

#[async_trait]
pub trait SyllabusProvider: Send + Sync {
    async fn topics(&self) -> Result<Vec<String>, String>;
}

/// Topics from a local file.
///
/// `.csv` files: first column, first row is a header. Anything else: one topic per non-empty line.
#[derive(Clone, Debug)]
pub struct FileSyllabus {
    path: PathBuf,
}

impl FileSyllabus {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn is_csv(&self) -> bool {
        self.path.extension().map(|e| e.eq_ignore_ascii_case("csv")).unwrap_or(false)
    }
}

/// First cell of every record after the header row; quoted cells keep their commas.
fn first_csv_column(body: &str) -> Result<Vec<String>, String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());
    let mut topics = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| format!("Malformed syllabus CSV: {}", e))?;
        if let Some(cell) = record.get(0).filter(|c| !c.is_empty()) {
            topics.push(cell.to_string());
        }
    }
    Ok(topics)
}

#[async_trait]
impl SyllabusProvider for FileSyllabus {
    #[instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    async fn topics(&self) -> Result<Vec<String>, String> {
        let body = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| format!("Syllabus file not found at the expected path: {}. Details: {}", self.path.display(), e))?;

        let topics: Vec<String> = if self.is_csv() {
            first_csv_column(&body)?
        } else {
            body.lines().map(str::trim).filter(|t| !t.is_empty()).map(str::to_string).collect()
        };

        if topics.is_empty() {
            return Err(format!("Syllabus file {} is empty or has no topics.", self.path.display()));
        }
        info!(target: "mocktest_backend", count = topics.len(), "Loaded syllabus topics");
        Ok(topics)
    }
}
