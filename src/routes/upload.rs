//! Shared handling for image uploads

use axum::extract::{FromRequest, Multipart, Request};
use axum::http::{header, HeaderMap};

use crate::error::{AppError, Result};
use crate::state::AppState;

/// Form fields accepted as the uploaded image
const IMAGE_FIELDS: [&str; 2] = ["file", "image"];

/// How the request body carries its input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Multipart,
    Json,
    Raw,
}

impl BodyKind {
    pub fn of(headers: &HeaderMap) -> Self {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            BodyKind::Multipart
        } else if content_type.starts_with("application/json") {
            BodyKind::Json
        } else {
            BodyKind::Raw
        }
    }
}

/// Read the image field from a multipart request
pub async fn read_image_field(request: Request, state: &AppState) -> Result<Vec<u8>> {
    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::debug!("Failed to read multipart field: {}", e);
        AppError::BadRequest(format!("Failed to read upload: {}", e))
    })? {
        let name = field.name().unwrap_or("").to_string();
        if !IMAGE_FIELDS.contains(&name.as_str()) {
            tracing::debug!("Skipping multipart field '{}'", name);
            continue;
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read file data: {}", e)))?;
        tracing::debug!("Read {} bytes from field '{}'", data.len(), name);
        return Ok(data.to_vec());
    }

    Err(AppError::BadRequest(
        "Missing image upload (expected a 'file' or 'image' field)".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(content_type: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        headers
    }

    #[test]
    fn test_body_kind() {
        assert_eq!(
            BodyKind::of(&headers("multipart/form-data; boundary=abc")),
            BodyKind::Multipart
        );
        assert_eq!(
            BodyKind::of(&headers("application/json; charset=utf-8")),
            BodyKind::Json
        );
        assert_eq!(BodyKind::of(&headers("image/jpeg")), BodyKind::Raw);
        assert_eq!(BodyKind::of(&HeaderMap::new()), BodyKind::Raw);
    }
}
