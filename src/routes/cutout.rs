//! Cutout routes
//!
//! `POST /cutout` accepts the image three ways:
//! - multipart upload (`file` or `image` field)
//! - JSON `{"image_path": "..."}` naming a local file
//! - the raw image as the request body
//!
//! The response is `{"output_path": "..."}` pointing at a new PNG, or the PNG
//! itself with `?format=png` / `Accept: image/png`.

use std::path::PathBuf;

use axum::{
    extract::{FromRequest, Query, Request, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use axum::body::Bytes;
use serde::{Deserialize, Serialize};

use super::upload::{read_image_field, BodyKind};
use crate::error::{AppError, Result};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/cutout", post(cutout))
}

#[derive(Debug, Default, Deserialize)]
pub struct CutoutQuery {
    /// `png` to get the image bytes back instead of a path
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CutoutPathRequest {
    pub image_path: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct CutoutResponse {
    pub output_path: String,
}

async fn cutout(
    State(state): State<AppState>,
    Query(query): Query<CutoutQuery>,
    request: Request,
) -> Result<Response> {
    let wants_png = query.format.as_deref() == Some("png") || accepts_png(request.headers());

    let cutout = match BodyKind::of(request.headers()) {
        BodyKind::Multipart => {
            let data = read_image_field(request, &state).await?;
            state.cutout().cutout(data).await?
        }
        BodyKind::Json => {
            let Json(body) = Json::<CutoutPathRequest>::from_request(request, &state)
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            tracing::debug!(image_path = %body.image_path.display(), "Cutout from path");
            state.cutout().cutout_file(&body.image_path).await?
        }
        BodyKind::Raw => {
            let data = Bytes::from_request(request, &state)
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            state.cutout().cutout(data.to_vec()).await?
        }
    };

    if wants_png {
        return Ok(([(header::CONTENT_TYPE, "image/png")], cutout.png).into_response());
    }

    let output_path = state.cutout().persist(&cutout).await?;
    Ok(Json(CutoutResponse {
        output_path: output_path.display().to_string(),
    })
    .into_response())
}

fn accepts_png(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.contains("image/png"))
}
