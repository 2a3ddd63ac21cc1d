//! `ocr-worker` subcommand
//!
//! One process per recognition. stdout carries exactly one JSON document, the
//! backend raw result; logs and backend chatter go to stderr. Any failure is a
//! non-zero exit.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use serde_json::{json, Value};

use super::backend::{self, BackendError, BackendSettings};
use super::types::BackendKind;

/// Arguments of the worker subcommand.
///
/// Everything except the image path normally arrives through the environment
/// prepared by the server.
#[derive(Debug, Clone, clap::Args)]
pub struct WorkerArgs {
    /// Image to recognize
    pub image_path: PathBuf,

    #[arg(long, env = "OCR_BACKEND", value_enum, default_value = "tesseract")]
    pub backend: BackendKind,

    /// Search path for backend data
    #[arg(long, env = "OCR_BACKEND_PATH")]
    pub backend_path: Option<PathBuf>,

    #[arg(long, env = "OCR_LANGUAGE", default_value = "eng")]
    pub language: String,

    #[arg(long, env = "OCR_SCRIPT_PROGRAM")]
    pub script_program: Option<String>,

    #[arg(long, env = "OCR_SCRIPT_ARGS", value_delimiter = ' ', allow_hyphen_values = true)]
    pub script_args: Vec<String>,
}

impl From<&WorkerArgs> for BackendSettings {
    fn from(args: &WorkerArgs) -> Self {
        Self {
            kind: args.backend,
            backend_path: args.backend_path.clone(),
            language: args.language.clone(),
            script_program: args.script_program.clone(),
            script_args: args.script_args.clone(),
        }
    }
}

/// Worker entry point
pub fn run(args: WorkerArgs) -> ExitCode {
    init_tracing();

    let raw = match recognize(&args) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::error!(image_path = %args.image_path.display(), "Recognition failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match write_document(&raw) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Failed to write result: {}", e);
            ExitCode::from(3)
        }
    }
}

/// Recognize the image named in `args` with the process-wide backend
pub fn recognize(args: &WorkerArgs) -> Result<Value, BackendError> {
    if !args.image_path.is_file() {
        tracing::warn!(image_path = %args.image_path.display(), "Image not found, no text to report");
        return Ok(json!([]));
    }

    let backend = backend::backend(&BackendSettings::from(args))?;
    tracing::debug!(
        backend = backend.name(),
        image_path = %args.image_path.display(),
        "Running recognition"
    );
    backend.recognize(&args.image_path)
}

fn write_document(raw: &Value) -> std::io::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer(&mut out, raw)?;
    out.write_all(b"\n")?;
    out.flush()
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cutout_service=info".into());

    // stdout is reserved for the result document
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct WorkerCli {
        #[command(flatten)]
        args: WorkerArgs,
    }

    #[test]
    fn test_worker_args_parse() {
        let cli = WorkerCli::try_parse_from([
            "ocr-worker",
            "/tmp/flyer.png",
            "--backend",
            "script",
            "--backend-path",
            "/opt/ocr",
            "--script-program",
            "python3",
            "--script-args=-u run_ocr.py",
        ])
        .unwrap();

        assert_eq!(cli.args.image_path, PathBuf::from("/tmp/flyer.png"));
        assert_eq!(cli.args.backend, BackendKind::Script);
        assert_eq!(cli.args.backend_path, Some(PathBuf::from("/opt/ocr")));
        assert_eq!(cli.args.script_program.as_deref(), Some("python3"));
        assert_eq!(cli.args.script_args, ["-u", "run_ocr.py"]);
    }

    #[test]
    fn test_missing_image_is_reported_as_no_text() {
        let args = WorkerArgs {
            image_path: PathBuf::from("/nonexistent/blank.png"),
            backend: BackendKind::Tesseract,
            backend_path: None,
            language: "eng".to_string(),
            script_program: None,
            script_args: Vec::new(),
        };

        assert_eq!(recognize(&args).unwrap(), json!([]));
    }
}
