//! Cutout Service

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use image::{DynamicImage, ImageFormat};

use super::orientation::normalize_orientation;
use super::remover::{BackgroundRemover, CommandRemover, HttpRemover};
use super::CutoutError;
use crate::config::{CutoutConfig, RemoverKind};

/// Finished cutout, PNG encoded
#[derive(Debug, Clone)]
pub struct Cutout {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Orchestrates validation, background removal and orientation
pub struct CutoutService {
    remover: Arc<dyn BackgroundRemover>,
    output_dir: PathBuf,
}

impl CutoutService {
    pub fn new(remover: Arc<dyn BackgroundRemover>, output_dir: PathBuf) -> Self {
        Self {
            remover,
            output_dir,
        }
    }

    pub fn from_config(config: &CutoutConfig) -> Self {
        let remover: Arc<dyn BackgroundRemover> = match config.remover {
            RemoverKind::Command => Arc::new(CommandRemover::new(
                &config.command,
                config.command_args.clone(),
            )),
            RemoverKind::Http => Arc::new(HttpRemover::new(&config.http_url)),
        };
        Self::new(remover, config.output_dir.clone())
    }

    pub fn remover_name(&self) -> &'static str {
        self.remover.name()
    }

    /// Cut the subject out of an encoded image.
    ///
    /// The input must decode as an image; it is re-encoded as PNG before it
    /// reaches the remover. The orientation recorded in the input's EXIF data
    /// is applied to the result.
    pub async fn cutout(&self, image_data: Vec<u8>) -> Result<Cutout, CutoutError> {
        let started = Instant::now();
        let image_data = Arc::new(image_data);

        let source = image_data.clone();
        let normalized = blocking(move || to_png(&decode(&source)?)).await?;

        let removed = self.remover.remove(&normalized).await?;

        let cutout = blocking(move || {
            let img = image::load_from_memory(&removed).map_err(|e| {
                CutoutError::Remover(format!("Remover returned an unreadable image: {}", e))
            })?;
            let img = normalize_orientation(&image_data, img);
            Ok(Cutout {
                width: img.width(),
                height: img.height(),
                png: to_png(&img)?,
            })
        })
        .await?;

        tracing::info!(
            remover = self.remover.name(),
            width = cutout.width,
            height = cutout.height,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Cutout complete"
        );

        Ok(cutout)
    }

    /// Cut out an image read from the local filesystem
    pub async fn cutout_file(&self, path: &Path) -> Result<Cutout, CutoutError> {
        let data = tokio::fs::read(path).await.map_err(|e| {
            CutoutError::InvalidImage(format!("Cannot read {}: {}", path.display(), e))
        })?;
        self.cutout(data).await
    }

    /// Write a cutout to a new file in the output directory and return its path
    pub async fn persist(&self, cutout: &Cutout) -> Result<PathBuf, CutoutError> {
        let file = tempfile::Builder::new()
            .prefix("cutout-")
            .suffix(".png")
            .tempfile_in(&self.output_dir)?;
        let (_, path) = file.keep().map_err(|e| CutoutError::Io(e.error))?;

        tokio::fs::write(&path, &cutout.png).await?;
        tracing::debug!(output_path = %path.display(), bytes = cutout.png.len(), "Cutout written");
        Ok(path)
    }
}

fn decode(data: &[u8]) -> Result<DynamicImage, CutoutError> {
    if data.is_empty() {
        return Err(CutoutError::InvalidImage("Empty upload".to_string()));
    }
    image::load_from_memory(data).map_err(|e| CutoutError::InvalidImage(e.to_string()))
}

fn to_png(img: &DynamicImage) -> Result<Vec<u8>, CutoutError> {
    let mut buffer = Vec::new();
    img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|e| CutoutError::Encode(e.to_string()))?;
    Ok(buffer)
}

async fn blocking<T, F>(f: F) -> Result<T, CutoutError>
where
    F: FnOnce() -> Result<T, CutoutError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CutoutError::Encode(format!("Image task failed: {}", e)))?
}
