//! Background removal collaborators
//!
//! The pixel work is done elsewhere; these wrappers only move bytes in and
//! out of a `rembg`-compatible tool.

use async_trait::async_trait;
use tokio::process::Command;

use super::CutoutError;

/// Background remover trait
#[async_trait]
pub trait BackgroundRemover: Send + Sync {
    /// Remover name, for logs
    fn name(&self) -> &'static str;

    /// Take an encoded image and return the encoded cutout (PNG with alpha)
    async fn remove(&self, image_data: &[u8]) -> Result<Vec<u8>, CutoutError>;
}

/// Runs a CLI as `program args... <input> <output>` on temporary files
pub struct CommandRemover {
    program: String,
    args: Vec<String>,
}

impl CommandRemover {
    pub fn new(program: &str, args: Vec<String>) -> Self {
        Self {
            program: program.to_string(),
            args,
        }
    }
}

#[async_trait]
impl BackgroundRemover for CommandRemover {
    fn name(&self) -> &'static str {
        "command"
    }

    async fn remove(&self, image_data: &[u8]) -> Result<Vec<u8>, CutoutError> {
        let work_dir = tempfile::Builder::new().prefix("cutout-").tempdir()?;
        let input_path = work_dir.path().join("input.png");
        let output_path = work_dir.path().join("output.png");

        tokio::fs::write(&input_path, image_data).await?;

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(&input_path)
            .arg(&output_path)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CutoutError::Remover(format!("Failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CutoutError::Remover(format!(
                "{} failed ({}): {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        tokio::fs::read(&output_path).await.map_err(|e| {
            CutoutError::Remover(format!("{} produced no output: {}", self.program, e))
        })
    }
}

/// Posts the image to a running `rembg s` server
pub struct HttpRemover {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemover {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl BackgroundRemover for HttpRemover {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn remove(&self, image_data: &[u8]) -> Result<Vec<u8>, CutoutError> {
        let url = format!("{}/api/remove", self.base_url);

        let part = reqwest::multipart::Part::bytes(image_data.to_vec())
            .file_name("input.png")
            .mime_str("image/png")
            .map_err(|e| CutoutError::Remover(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| CutoutError::Remover(format!("Failed to call {}: {}", url, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CutoutError::Remover(format!(
                "Remover returned {}: {}",
                status, body
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CutoutError::Remover(format!("Failed to read response: {}", e)))?;
        Ok(bytes.to_vec())
    }
}

/// Remover that hands the input straight back
#[cfg(test)]
pub struct PassthroughRemover;

#[cfg(test)]
#[async_trait]
impl BackgroundRemover for PassthroughRemover {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    async fn remove(&self, image_data: &[u8]) -> Result<Vec<u8>, CutoutError> {
        Ok(image_data.to_vec())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_command_remover_round_trips_files() {
        let remover = CommandRemover::new("/bin/cp", Vec::new());

        let out = remover.remove(b"pixels").await.unwrap();
        assert_eq!(out, b"pixels");
    }

    #[tokio::test]
    async fn test_command_remover_failure() {
        let remover = CommandRemover::new(
            "/bin/sh",
            vec!["-c".to_string(), "echo 'model missing' >&2; exit 1".to_string(), "rembg".to_string()],
        );

        let err = remover.remove(b"pixels").await.unwrap_err();
        assert!(matches!(err, CutoutError::Remover(ref msg) if msg.contains("model missing")));
    }

    #[tokio::test]
    async fn test_command_remover_missing_program() {
        let remover = CommandRemover::new("/nonexistent/rembg", vec!["i".to_string()]);
        assert!(matches!(remover.remove(b"pixels").await, Err(CutoutError::Remover(_))));
    }
}
