//! Artifact writer: question documents (PDF or DOCX) and their remote copies.
//!
//! Local writes are fatal on failure. Uploads are not: when storage is missing
//! or rejects the file, the artifact is exposed by its local filename.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use docx_rs::{Docx, Paragraph, Run};
use printpdf::{BuiltinFont, Mm, PdfDocument};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::config::StorageSettings;
use crate::domain::{ArtifactLocation, OutputFormat, SkippedChunk};
use crate::error::{GenerationError, GenerationResult};

// A4 portrait, Helvetica 11pt.
const PAGE_W: f32 = 210.0;
const PAGE_H: f32 = 297.0;
const MARGIN: f32 = 10.0;
const FONT_SIZE: f32 = 11.0;
const LINE_HEIGHT: f32 = 5.0;
const MAX_LINE_CHARS: usize = 95;

/// Separator between questions in the output document.
pub const QUESTION_SEPARATOR: &str = "\n\n";

pub fn questions_text(questions: &[String]) -> String {
    questions.join(QUESTION_SEPARATOR)
}

/// One `--- Skipped Chunk N ---` section per chunk, N starting at 1.
pub fn skipped_text(skipped: &[SkippedChunk]) -> String {
    skipped
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let body = if chunk.last_segments.is_empty() {
                "(no parsable questions were returned)".to_string()
            } else {
                chunk.last_segments.join(QUESTION_SEPARATOR)
            };
            format!("--- Skipped Chunk {} ---:\nType: {}\n{}", i + 1, chunk.question_type, body)
        })
        .collect::<Vec<_>>()
        .join(QUESTION_SEPARATOR)
}

/// Built-in PDF fonts only cover Latin-1; anything else becomes '?'.
fn latin1(line: &str) -> String {
    line.chars()
        .map(|c| match c {
            '\t' => ' ',
            c if (c as u32) <= 0xFF && !c.is_control() => c,
            _ => '?',
        })
        .collect()
}

/// Greedy word wrap; words longer than a line are hard-split.
fn wrap_line(line: &str, width: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for word in line.split(' ') {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > width {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            out.push(word.drain(..width).collect());
        }
        let word: String = word.into_iter().collect();
        let needed = if current.is_empty() { word.chars().count() } else { current.chars().count() + 1 + word.chars().count() };
        if needed > width && !current.is_empty() {
            out.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    out.push(current);
    out
}

fn pdf_lines(text: &str) -> Vec<String> {
    text.lines().flat_map(|l| wrap_line(&latin1(l), MAX_LINE_CHARS)).collect()
}

fn write_pdf(path: &Path, text: &str) -> Result<(), String> {
    let (doc, page, layer) = PdfDocument::new("Mock Test", Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
    let font = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(|e| e.to_string())?;
    let mut current = doc.get_page(page).get_layer(layer);
    let mut y = PAGE_H - MARGIN;

    for line in pdf_lines(text) {
        if y < MARGIN {
            let (page, layer) = doc.add_page(Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
            current = doc.get_page(page).get_layer(layer);
            y = PAGE_H - MARGIN;
        }
        if !line.is_empty() {
            current.use_text(line, FONT_SIZE, Mm(MARGIN), Mm(y), &font);
        }
        y -= LINE_HEIGHT;
    }

    let file = File::create(path).map_err(|e| e.to_string())?;
    doc.save(&mut BufWriter::new(file)).map_err(|e| e.to_string())
}

fn write_docx(path: &Path, text: &str) -> Result<(), String> {
    let docx = text
        .lines()
        .fold(Docx::new(), |docx, line| docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(line))));
    let file = File::create(path).map_err(|e| e.to_string())?;
    docx.build().pack(file).map_err(|e| e.to_string())?;
    Ok(())
}

/// Write `text` to `path` in the requested format.
pub fn write_document(path: &Path, text: &str, format: OutputFormat) -> GenerationResult<()> {
    let result = match format {
        OutputFormat::Pdf => write_pdf(path, text),
        OutputFormat::Docx => write_docx(path, text),
    };
    result.map_err(|reason| GenerationError::ArtifactWrite { path: path.display().to_string(), reason })
}

/// Remote durable storage for finished artifacts.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload the file and return its durable URL.
    async fn upload(&self, local_path: &Path, public_id: &str) -> GenerationResult<String>;
}

/// Multipart HTTP uploader (Cloudinary-style: `file` + `public_id`, URL in the JSON reply).
pub struct HttpObjectStore {
    client: reqwest::Client,
    upload_url: String,
    api_key: Option<String>,
}

impl HttpObjectStore {
    pub fn new(settings: &StorageSettings) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| e.to_string())?;
        Ok(Self { client, upload_url: settings.upload_url.clone(), api_key: settings.api_key.clone() })
    }
}

#[derive(Deserialize)]
struct UploadReply {
    #[serde(default)]
    secure_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    #[instrument(level = "info", skip(self, local_path), fields(%public_id))]
    async fn upload(&self, local_path: &Path, public_id: &str) -> GenerationResult<String> {
        let fail = |reason: String| GenerationError::Upload { public_id: public_id.to_string(), reason };

        let bytes = tokio::fs::read(local_path).await.map_err(|e| fail(e.to_string()))?;
        let file_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| public_id.to_string());
        let form = Form::new()
            .text("public_id", public_id.to_string())
            .text("resource_type", "raw")
            .part("file", Part::bytes(bytes).file_name(file_name));

        let mut req = self.client.post(&self.upload_url).multipart(form);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let res = req.send().await.map_err(|e| fail(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(fail(format!("HTTP {}: {}", status, crate::util::trunc_for_log(&body, 200))));
        }
        let reply: UploadReply = res.json().await.map_err(|e| fail(e.to_string()))?;
        reply.secure_url.or(reply.url).ok_or_else(|| fail("upload reply carried no URL".into()))
    }
}

/// Writes run artifacts under the output directory and mirrors them to storage.
#[derive(Clone)]
pub struct ArtifactWriter {
    output_dir: PathBuf,
    store: Option<Arc<dyn ObjectStore>>,
    prefix: String,
}

impl ArtifactWriter {
    pub fn new(output_dir: impl Into<PathBuf>, store: Option<Arc<dyn ObjectStore>>, prefix: impl Into<String>) -> Self {
        Self { output_dir: output_dir.into(), store, prefix: prefix.into() }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write locally (fatal on failure), then try to upload (falls back to the filename).
    #[instrument(level = "info", skip(self, text), fields(%filename, ?format, text_len = text.len()))]
    pub async fn persist(&self, filename: &str, text: &str, format: OutputFormat) -> GenerationResult<ArtifactLocation> {
        let path = self.output_dir.join(filename);
        let (dir, target, body) = (self.output_dir.clone(), path.clone(), text.to_string());
        tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&dir).map_err(|e| GenerationError::ArtifactWrite {
                path: dir.display().to_string(),
                reason: e.to_string(),
            })?;
            write_document(&target, &body, format)
        })
        .await
        .map_err(|e| GenerationError::ArtifactWrite { path: path.display().to_string(), reason: e.to_string() })??;
        info!(target: "artifacts", path = %path.display(), "Artifact written");

        let Some(store) = &self.store else {
            return Ok(ArtifactLocation::Local(filename.to_string()));
        };
        let public_id = format!("{}/{}", self.prefix.trim_end_matches('/'), filename);
        match store.upload(&path, &public_id).await {
            Ok(url) => {
                info!(target: "artifacts", %public_id, %url, "Artifact uploaded");
                Ok(ArtifactLocation::Remote(url))
            }
            Err(e) => {
                warn!(target: "artifacts", %public_id, error = %e, "Upload failed; exposing local filename");
                Ok(ArtifactLocation::Local(filename.to_string()))
            }
        }
    }

    pub async fn write_questions(&self, questions: &[String], run_id: &str, format: OutputFormat) -> GenerationResult<ArtifactLocation> {
        let filename = format!("Questions_{}.{}", run_id, format.extension());
        self.persist(&filename, &questions_text(questions), format).await
    }

    /// Nothing is written when no chunk was skipped.
    pub async fn write_skipped(&self, skipped: &[SkippedChunk], run_id: &str, format: OutputFormat) -> GenerationResult<Option<ArtifactLocation>> {
        if skipped.is_empty() {
            return Ok(None);
        }
        let filename = format!("Skipped_{}.{}", run_id, format.extension());
        self.persist(&filename, &skipped_text(skipped), format).await.map(Some)
    }
}
