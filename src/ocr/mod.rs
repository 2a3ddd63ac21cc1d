//! OCR Module
//!
//! Text recognition for the desktop app, isolated from the server process.
//!
//! - `shim`: single-flight gate and worker process invocation (server side)
//! - `worker`: the `ocr-worker` subcommand (child side)
//! - `backend`: recognition backends used by the worker
//! - `normalize`: folds backend output into [`OcrResult`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cutout_service::ocr::OcrShim;
//!
//! let shim = OcrShim::from_config(&config.ocr)?;
//! let result = shim.recognize(Path::new("/tmp/flyer.png")).await;
//! // result is {"rec_texts": [...], "rec_scores": [...]}, possibly empty
//! ```

pub mod backend;
mod normalize;
mod shim;
mod types;
pub mod worker;

pub use backend::{BackendError, BackendSettings, RecognitionBackend};
pub use normalize::normalize;
pub use shim::{
    parse_output, GatePermit, InvocationError, OcrGate, OcrShim, WorkerCommand, WorkerOutput,
};
pub use types::{BackendKind, OcrRequest, OcrResult};
pub use worker::WorkerArgs;
