//! Route modules for the cutout service

pub mod cutout;
pub mod debug;
pub mod health;
pub mod ocr;
mod upload;

use axum::{extract::DefaultBodyLimit, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the application router
pub fn app(state: AppState) -> Router {
    // The desktop front-end calls from a webview origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = state.config().cutout.max_upload_bytes;

    Router::new()
        .merge(health::router())
        .merge(cutout::router())
        .merge(ocr::router())
        .merge(debug::router())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(all(test, unix))]
mod tests {
    use std::ffi::OsString;
    use std::io::Cursor;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum_test::TestServer;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::cutout::{CutoutService, PassthroughRemover};
    use crate::ocr::{OcrShim, WorkerCommand};

    const BOUNDARY: &str = "cutout-test-boundary";

    /// Stands in for the worker: reports the file name when the image exists
    const FAKE_WORKER: &str = r#"
if [ -f "$1" ]; then
  printf '[{"rec_texts": ["%s", "  "], "rec_scores": [0.9, 0.1]}]' "$(basename "$1" | cut -c1-10)"
else
  echo '[]'
fi"#;

    fn test_app(worker_script: &str, dir: &TempDir, debug_sample: Option<PathBuf>) -> Router {
        let mut config = Config::default();
        config.ocr.debug_sample = debug_sample;
        config.cutout.output_dir = dir.path().to_path_buf();

        let worker = WorkerCommand {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), worker_script.to_string(), "worker".to_string()],
            env: vec![("PATH".to_string(), OsString::from("/usr/bin:/bin"))],
        };
        let ocr = OcrShim::new(worker, Duration::from_secs(10));
        let cutout = CutoutService::new(Arc::new(PassthroughRemover), dir.path().to_path_buf());

        app(AppState::with_services(config, ocr, cutout))
    }

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(3, 2, Rgb([200, 10, 10])));
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    fn multipart_request(uri: &str, field: &str, data: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{field}\"; filename=\"photo.png\"\r\n\
                 Content-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let dir = TempDir::new().unwrap();
        let server = TestServer::new(test_app(FAKE_WORKER, &dir, None)).unwrap();

        let response = server.get("/health").await;

        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(response.json::<Value>(), json!({ "ok": true }));
    }

    #[tokio::test]
    async fn test_ocr_missing_image_is_empty_success() {
        let dir = TempDir::new().unwrap();
        let server = TestServer::new(test_app(FAKE_WORKER, &dir, None)).unwrap();

        let response = server
            .post("/ocr")
            .json(&json!({ "image_path": "/tmp/blank.png" }))
            .await;

        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(
            response.json::<Value>(),
            json!({ "rec_texts": [], "rec_scores": [] })
        );
    }

    #[tokio::test]
    async fn test_ocr_existing_image() {
        let dir = TempDir::new().unwrap();
        let image_path = dir.path().join("label.png");
        std::fs::write(&image_path, png_bytes()).unwrap();
        let server = TestServer::new(test_app(FAKE_WORKER, &dir, None)).unwrap();

        let response = server
            .post("/ocr")
            .json(&json!({ "image_path": image_path }))
            .await;

        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(
            response.json::<Value>(),
            json!({ "rec_texts": ["label.png"], "rec_scores": [0.9] })
        );
    }

    #[tokio::test]
    async fn test_ocr_worker_crash_is_empty_success() {
        let dir = TempDir::new().unwrap();
        let server =
            TestServer::new(test_app("echo 'Segmentation fault' >&2; exit 139", &dir, None)).unwrap();

        let response = server
            .post("/ocr")
            .json(&json!({ "image_path": "/tmp/blank.png" }))
            .await;

        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(
            response.json::<Value>(),
            json!({ "rec_texts": [], "rec_scores": [] })
        );
    }

    #[tokio::test]
    async fn test_ocr_rejects_malformed_request() {
        let dir = TempDir::new().unwrap();
        let server = TestServer::new(test_app(FAKE_WORKER, &dir, None)).unwrap();

        let response = server.post("/ocr").json(&json!({ "path": 5 })).await;

        assert!(response.status_code().is_client_error());
        assert!(response.json::<Value>()["error"].is_string());
    }

    #[tokio::test]
    async fn test_ocr_multipart_upload() {
        let dir = TempDir::new().unwrap();
        let app = test_app(FAKE_WORKER, &dir, None);

        let response = app
            .oneshot(multipart_request("/ocr", "image", &png_bytes()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        // Spooled as ocr-upload-*.png; the fake worker echoes the name prefix
        assert_eq!(body["rec_texts"], json!(["ocr-upload"]));
        assert_eq!(body["rec_scores"], json!([0.9]));
    }

    #[tokio::test]
    async fn test_cutout_rejects_non_image() {
        let dir = TempDir::new().unwrap();
        let app = test_app(FAKE_WORKER, &dir, None);

        let response = app
            .oneshot(multipart_request("/cutout", "file", b"this is not an image"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("Invalid image"));
        assert_eq!(body["code"], "invalid_image");
    }

    #[tokio::test]
    async fn test_cutout_missing_field() {
        let dir = TempDir::new().unwrap();
        let app = test_app(FAKE_WORKER, &dir, None);

        let response = app
            .oneshot(multipart_request("/cutout", "attachment", &png_bytes()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_cutout_upload_returns_output_path() {
        let dir = TempDir::new().unwrap();
        let app = test_app(FAKE_WORKER, &dir, None);

        let response = app
            .oneshot(multipart_request("/cutout", "file", &png_bytes()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let output_path = PathBuf::from(body["output_path"].as_str().unwrap());
        assert!(output_path.starts_with(dir.path()));

        let written = image::open(&output_path).unwrap();
        assert_eq!((written.width(), written.height()), (3, 2));
    }

    #[tokio::test]
    async fn test_cutout_raw_body_as_png() {
        let dir = TempDir::new().unwrap();
        let app = test_app(FAKE_WORKER, &dir, None);

        let request = Request::builder()
            .method("POST")
            .uri("/cutout?format=png")
            .header(header::CONTENT_TYPE, "image/png")
            .body(Body::from(png_bytes()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Png);
    }

    #[tokio::test]
    async fn test_cutout_from_missing_path() {
        let dir = TempDir::new().unwrap();
        let server = TestServer::new(test_app(FAKE_WORKER, &dir, None)).unwrap();

        let response = server
            .post("/cutout")
            .json(&json!({ "image_path": "/nonexistent/photo.jpg" }))
            .await;

        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        assert!(response.json::<Value>()["error"].is_string());
    }

    #[tokio::test]
    async fn test_debug_ocr_requires_sample() {
        let dir = TempDir::new().unwrap();
        let server = TestServer::new(test_app(FAKE_WORKER, &dir, None)).unwrap();

        let response = server.get("/_debug_ocr").await;

        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_debug_ocr_dumps_raw_output() {
        let dir = TempDir::new().unwrap();
        let sample = dir.path().join("sample.png");
        std::fs::write(&sample, png_bytes()).unwrap();
        let server = TestServer::new(test_app(FAKE_WORKER, &dir, Some(sample))).unwrap();

        let response = server.get("/_debug_ocr").await;

        assert_eq!(response.status_code(), StatusCode::OK);
        let body = response.json::<Value>();
        assert_eq!(body["exit_code"], 0);
        assert_eq!(
            body["raw"],
            json!([{ "rec_texts": ["sample.png", "  "], "rec_scores": [0.9, 0.1] }])
        );
        assert_eq!(body["normalized"]["rec_texts"], json!(["sample.png"]));
        assert!(body["error"].is_null());
    }
}
