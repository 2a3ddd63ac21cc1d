//! OCR routes
//!
//! `POST /ocr` takes `{"image_path": "..."}` or a multipart upload and always
//! answers `{"rec_texts": [...], "rec_scores": [...]}`. Backend and upload
//! spooling failures come back as empty lists with status 200; only a
//! malformed request is rejected.

use std::path::Path;

use axum::{
    extract::{FromRequest, Request, State},
    routing::post,
    Json, Router,
};
use tempfile::NamedTempFile;

use super::upload::{read_image_field, BodyKind};
use crate::error::{AppError, Result};
use crate::ocr::{OcrRequest, OcrResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/ocr", post(ocr))
}

async fn ocr(State(state): State<AppState>, request: Request) -> Result<Json<OcrResult>> {
    if BodyKind::of(request.headers()) == BodyKind::Multipart {
        let data = read_image_field(request, &state).await?;
        return Ok(Json(
            recognize_upload(&state, &std::env::temp_dir(), &data).await,
        ));
    }

    let Json(body) = Json::<OcrRequest>::from_request(request, &state)
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?;

    tracing::debug!(image_path = %body.image_path.display(), "OCR request");
    Ok(Json(state.ocr().recognize(&body.image_path).await))
}

/// Recognize an upload spooled into `spool_dir`.
///
/// A spool failure is reported like any other backend failure: logged, and
/// answered with the empty result.
async fn recognize_upload(state: &AppState, spool_dir: &Path, data: &[u8]) -> OcrResult {
    let file = match spool_upload(spool_dir, data).await {
        Ok(file) => file,
        Err(e) => {
            tracing::warn!(spool_dir = %spool_dir.display(), "Failed to spool OCR upload: {}", e);
            return OcrResult::empty();
        }
    };

    tracing::debug!(upload = %file.path().display(), bytes = data.len(), "OCR upload spooled");
    state.ocr().recognize(file.path()).await
}

/// Write an upload to a temporary file that is removed when dropped
async fn spool_upload(spool_dir: &Path, data: &[u8]) -> std::io::Result<NamedTempFile> {
    let extension = image::guess_format(data)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("img");

    let file = tempfile::Builder::new()
        .prefix("ocr-upload-")
        .suffix(&format!(".{}", extension))
        .tempfile_in(spool_dir)?;
    tokio::fs::write(file.path(), data).await?;
    Ok(file)
}
