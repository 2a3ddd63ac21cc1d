//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::cutout::CutoutService;
use crate::ocr::OcrShim;

/// Error type for state initialization
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Failed to resolve OCR worker: {0}")]
    OcrWorker(#[from] std::io::Error),
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    ocr: OcrShim,
    cutout: CutoutService,
}

impl AppState {
    /// Create the application state from configuration
    pub fn new(config: Config) -> Result<Self, StateError> {
        let ocr = OcrShim::from_config(&config.ocr)?;
        let cutout = CutoutService::from_config(&config.cutout);
        Ok(Self::with_services(config, ocr, cutout))
    }

    /// Create the application state around prepared services
    pub fn with_services(config: Config, ocr: OcrShim, cutout: CutoutService) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                ocr,
                cutout,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the OCR shim
    pub fn ocr(&self) -> &OcrShim {
        &self.inner.ocr
    }

    /// Get the cutout service
    pub fn cutout(&self) -> &CutoutService {
        &self.inner.cutout
    }
}
