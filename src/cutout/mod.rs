//! Cutout Module
//!
//! Background removal for uploaded images. The remover collaborator does the
//! segmentation; this module validates the input, normalizes it to PNG,
//! corrects orientation and writes the result.

mod orientation;
mod remover;
mod service;

pub use orientation::{normalize_orientation, read_orientation, Rotation};
pub use remover::{BackgroundRemover, CommandRemover, HttpRemover};
pub use service::{Cutout, CutoutService};

#[cfg(test)]
pub use remover::PassthroughRemover;

/// Cutout error types
#[derive(Debug, thiserror::Error)]
pub enum CutoutError {
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Background removal failed: {0}")]
    Remover(String),

    #[error("Failed to encode cutout: {0}")]
    Encode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CutoutError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::InvalidImage(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidImage(_) => "invalid_image",
            Self::Remover(_) => "remover_error",
            Self::Encode(_) => "encode_error",
            Self::Io(_) => "io_error",
        }
    }
}
