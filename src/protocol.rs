//! Public protocol structs for HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{OutputFormat, QuestionPlan};

#[derive(Debug, Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct WakeupOut {
    pub mssg: &'static str,
}

/// One entry of the question-type catalogue.
#[derive(Debug, Serialize)]
pub struct QuestionTypeOut {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct GenerateIn {
    pub question_plan: QuestionPlan,
    #[serde(default)]
    pub testing_mode: bool,
    pub exam_name: String,
    #[serde(default)]
    pub output_format: OutputFormat,
    /// Topics for this run; the configured syllabus is used when absent.
    #[serde(default)]
    pub topics: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_request_defaults() {
        let body: GenerateIn =
            serde_json::from_str(r#"{"question_plan": {"MCQ": 6, "AR": 3}, "exam_name": "UPSC"}"#).unwrap();
        assert!(!body.testing_mode);
        assert_eq!(body.output_format, OutputFormat::Pdf);
        assert!(body.topics.is_none());
        assert_eq!(body.question_plan.iter().next(), Some(("MCQ", 6)));
    }
}
