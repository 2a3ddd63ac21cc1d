//! OCR Types
//!
//! Request and response types shared by the `/ocr` route, the invocation shim
//! and the worker subcommand.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// OCR request naming an image on the local filesystem
#[derive(Debug, Clone, Deserialize)]
pub struct OcrRequest {
    /// Path readable by the worker process
    pub image_path: PathBuf,
}

/// Normalized OCR result
///
/// `rec_texts[i]` and `rec_scores[i]` always describe the same recognized line.
/// Both vectors are private and only grow through [`OcrResult::push`], so the
/// lengths cannot drift apart.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OcrResult {
    rec_texts: Vec<String>,
    rec_scores: Vec<f64>,
}

impl OcrResult {
    /// The empty result returned for every backend failure
    pub fn empty() -> Self {
        Self::default()
    }

    /// Append one recognized line
    pub fn push(&mut self, text: impl Into<String>, score: f64) {
        self.rec_texts.push(text.into());
        self.rec_scores.push(score);
    }

    pub fn texts(&self) -> &[String] {
        &self.rec_texts
    }

    pub fn scores(&self) -> &[f64] {
        &self.rec_scores
    }

    pub fn len(&self) -> usize {
        self.rec_texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rec_texts.is_empty()
    }
}

/// Recognition backend selected for the worker process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Tesseract CLI with TSV output
    Tesseract,
    /// External recognizer program writing its raw result to a file
    Script,
}

impl Default for BackendKind {
    fn default() -> Self {
        Self::Tesseract
    }
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tesseract => "tesseract",
            Self::Script => "script",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tesseract" => Some(Self::Tesseract),
            "script" => Some(Self::Script),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_result_serializes_both_keys() {
        let json = serde_json::to_value(OcrResult::empty()).unwrap();
        assert_eq!(json, serde_json::json!({ "rec_texts": [], "rec_scores": [] }));
    }

    #[test]
    fn test_push_keeps_pairs_aligned() {
        let mut result = OcrResult::empty();
        result.push("Hello", 0.95);
        result.push("World", 0.5);

        assert_eq!(result.len(), 2);
        assert_eq!(result.texts(), ["Hello", "World"]);
        assert_eq!(result.scores(), [0.95, 0.5]);
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!(BackendKind::parse("Tesseract"), Some(BackendKind::Tesseract));
        assert_eq!(BackendKind::parse(" script "), Some(BackendKind::Script));
        assert_eq!(BackendKind::parse("paddle"), None);
    }
}
