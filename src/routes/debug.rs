//! Diagnostic OCR dump
//!
//! `GET /_debug_ocr` runs the worker on the configured sample image and shows
//! what came back before normalization. Not part of the stable API.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::ocr::{normalize, parse_output, OcrResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/_debug_ocr", get(debug_ocr))
}

#[derive(Debug, Serialize)]
pub struct DebugOcrResponse {
    pub image_path: String,
    pub exit_code: Option<i32>,
    /// Worker stdout as parsed JSON, `null` if it did not parse
    pub raw: Value,
    pub normalized: OcrResult,
    pub stderr: String,
    pub error: Option<String>,
}

async fn debug_ocr(State(state): State<AppState>) -> Result<Json<DebugOcrResponse>> {
    let sample = state
        .config()
        .ocr
        .debug_sample
        .clone()
        .ok_or_else(|| AppError::NotFound("OCR_DEBUG_SAMPLE is not configured".to_string()))?;

    let image_path = sample.display().to_string();
    let response = match state.ocr().run_exclusive(&sample).await {
        Ok(output) => {
            let exit_code = output.status.code();
            let stderr = output.stderr.clone();
            match parse_output(output) {
                Ok(raw) => DebugOcrResponse {
                    image_path,
                    exit_code,
                    normalized: normalize(&raw),
                    raw,
                    stderr,
                    error: None,
                },
                Err(e) => DebugOcrResponse {
                    image_path,
                    exit_code,
                    raw: Value::Null,
                    normalized: OcrResult::empty(),
                    stderr,
                    error: Some(e.to_string()),
                },
            }
        }
        Err(e) => DebugOcrResponse {
            image_path,
            exit_code: None,
            raw: Value::Null,
            normalized: OcrResult::empty(),
            stderr: e.stderr().unwrap_or_default().to_string(),
            error: Some(e.to_string()),
        },
    };

    Ok(Json(response))
}
