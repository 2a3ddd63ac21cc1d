//! Recognition backends
//!
//! Backends run inside the `ocr-worker` process only. Each one turns an image
//! path into a raw JSON document; shaping that document is left to the server
//! side normalizer.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use serde_json::{json, Value};

use super::types::BackendKind;

/// Backend error types
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Recognition backend not available: {0}")]
    Unavailable(String),

    #[error("Recognition failed: {0}")]
    RecognitionFailed(String),

    #[error("Backend produced unreadable output: {0}")]
    InvalidOutput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Recognition backend trait
pub trait RecognitionBackend: Send + Sync {
    /// Backend name, for logs
    fn name(&self) -> &'static str;

    /// Run recognition on one image and return the backend-native result
    fn recognize(&self, image_path: &Path) -> Result<Value, BackendError>;
}

/// Settings handed to the worker through its environment
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub kind: BackendKind,
    /// Search path for backend data (tessdata dir, model dir, ...)
    pub backend_path: Option<PathBuf>,
    pub language: String,
    pub script_program: Option<String>,
    pub script_args: Vec<String>,
}

impl BackendSettings {
    /// Build the backend these settings describe
    pub fn initialize(&self) -> Result<Arc<dyn RecognitionBackend>, BackendError> {
        match self.kind {
            BackendKind::Tesseract => Ok(Arc::new(TesseractBackend::initialize(
                &self.language,
                self.backend_path.clone(),
            )?)),
            BackendKind::Script => {
                let program = self
                    .script_program
                    .clone()
                    .filter(|program| !program.trim().is_empty())
                    .ok_or_else(|| {
                        BackendError::Unavailable("OCR_SCRIPT_PROGRAM is not set".to_string())
                    })?;
                Ok(Arc::new(ScriptBackend::new(
                    program,
                    self.script_args.clone(),
                    self.backend_path.clone(),
                )))
            }
        }
    }
}

// ============================================================================
// Process-wide handle
// ============================================================================

/// Lazily initialized backend handle.
///
/// Initialization is expensive, so it runs at most once per process. The
/// `OnceLock` serves the fast path; the mutex serializes first-time
/// initialization and the slot is checked again once the lock is held. A failed
/// initialization leaves the slot empty.
pub struct SharedBackend {
    cell: OnceLock<Arc<dyn RecognitionBackend>>,
    init_lock: Mutex<()>,
}

impl SharedBackend {
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
            init_lock: parking_lot::const_mutex(()),
        }
    }

    pub fn get_or_try_init<F>(&self, init: F) -> Result<Arc<dyn RecognitionBackend>, BackendError>
    where
        F: FnOnce() -> Result<Arc<dyn RecognitionBackend>, BackendError>,
    {
        if let Some(backend) = self.cell.get() {
            return Ok(backend.clone());
        }

        let _guard = self.init_lock.lock();
        if let Some(backend) = self.cell.get() {
            return Ok(backend.clone());
        }

        let backend = init()?;
        tracing::debug!(backend = backend.name(), "Recognition backend initialized");
        Ok(self.cell.get_or_init(|| backend).clone())
    }
}

impl Default for SharedBackend {
    fn default() -> Self {
        Self::new()
    }
}

static BACKEND: SharedBackend = SharedBackend::new();

/// Get the process-wide backend, creating it from `settings` on first use.
///
/// Later calls return the same handle regardless of the settings passed.
pub fn backend(settings: &BackendSettings) -> Result<Arc<dyn RecognitionBackend>, BackendError> {
    BACKEND.get_or_try_init(|| settings.initialize())
}

// ============================================================================
// Tesseract
// ============================================================================

/// Tesseract CLI backend
pub struct TesseractBackend {
    language: String,
    tessdata_dir: Option<PathBuf>,
}

impl TesseractBackend {
    /// Check the binary is installed and remember the invocation settings
    pub fn initialize(language: &str, tessdata_dir: Option<PathBuf>) -> Result<Self, BackendError> {
        let output = Command::new("tesseract")
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| BackendError::Unavailable(format!("Failed to run tesseract: {}", e)))?;

        if !output.status.success() {
            return Err(BackendError::Unavailable(format!(
                "tesseract --version exited with {}",
                output.status
            )));
        }

        let version = String::from_utf8_lossy(&output.stdout);
        tracing::debug!(
            version = %version.lines().next().unwrap_or("unknown"),
            "Found tesseract"
        );

        Ok(Self {
            language: language.to_string(),
            tessdata_dir,
        })
    }
}

impl RecognitionBackend for TesseractBackend {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn recognize(&self, image_path: &Path) -> Result<Value, BackendError> {
        let mut command = Command::new("tesseract");
        command
            .arg(image_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.language);
        if let Some(dir) = &self.tessdata_dir {
            command.arg("--tessdata-dir").arg(dir);
        }
        let output = command
            .arg("tsv")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| BackendError::RecognitionFailed(format!("Failed to run tesseract: {}", e)))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(BackendError::RecognitionFailed(format!(
                "Tesseract failed: {}",
                stderr.trim()
            )));
        }
        if !stderr.trim().is_empty() {
            tracing::debug!(stderr = %stderr.trim(), "tesseract diagnostics");
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        let (texts, scores): (Vec<_>, Vec<_>) = parse_tsv_lines(&tsv).into_iter().unzip();

        Ok(json!([{ "rec_texts": texts, "rec_scores": scores }]))
    }
}

/// Group TSV word rows into lines of `(text, score)`.
///
/// Scores are the mean word confidence scaled to 0-1. Lines come out in
/// page/block/paragraph/line order.
pub fn parse_tsv_lines(tsv: &str) -> Vec<(String, f64)> {
    let mut lines: BTreeMap<(u32, u32, u32, u32), Vec<(String, f64)>> = BTreeMap::new();

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 {
            continue;
        }
        // Level 5 rows are words
        if cols[0].parse::<u32>().unwrap_or(0) != 5 {
            continue;
        }
        let conf: f64 = cols[10].parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if text.is_empty() || conf < 0.0 {
            continue;
        }

        let key = (
            cols[1].parse().unwrap_or(0),
            cols[2].parse().unwrap_or(0),
            cols[3].parse().unwrap_or(0),
            cols[4].parse().unwrap_or(0),
        );
        lines.entry(key).or_default().push((text.to_string(), conf));
    }

    lines
        .into_values()
        .map(|words| {
            let mean = words.iter().map(|(_, conf)| conf).sum::<f64>() / words.len() as f64;
            let text = words
                .into_iter()
                .map(|(word, _)| word)
                .collect::<Vec<_>>()
                .join(" ");
            (text, (mean / 100.0).clamp(0.0, 1.0))
        })
        .collect()
}

// ============================================================================
// External script
// ============================================================================

/// Backend that delegates to an external recognizer program.
///
/// The program is called as `program args... <image> <result.json>` and must
/// write its raw result to the result file. Anything it prints goes to stderr.
pub struct ScriptBackend {
    program: String,
    args: Vec<String>,
    backend_path: Option<PathBuf>,
}

impl ScriptBackend {
    pub fn new(program: String, args: Vec<String>, backend_path: Option<PathBuf>) -> Self {
        Self {
            program,
            args,
            backend_path,
        }
    }
}

impl RecognitionBackend for ScriptBackend {
    fn name(&self) -> &'static str {
        "script"
    }

    fn recognize(&self, image_path: &Path) -> Result<Value, BackendError> {
        let result_file = tempfile::Builder::new()
            .prefix("ocr-result-")
            .suffix(".json")
            .tempfile()?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(image_path)
            .arg(result_file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::from(std::io::stderr()))
            .stderr(Stdio::inherit());
        if let Some(dir) = &self.backend_path {
            command.env("OCR_BACKEND_PATH", dir);
        }

        let status = command.status().map_err(|e| {
            BackendError::RecognitionFailed(format!("Failed to run {}: {}", self.program, e))
        })?;
        if !status.success() {
            return Err(BackendError::RecognitionFailed(format!(
                "{} exited with {}",
                self.program, status
            )));
        }

        let contents = std::fs::read_to_string(result_file.path())?;
        if contents.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&contents).map_err(|e| BackendError::InvalidOutput(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedBackend(Value);

    impl RecognitionBackend for FixedBackend {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn recognize(&self, _image_path: &Path) -> Result<Value, BackendError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_shared_backend_initializes_once() {
        let shared = Arc::new(SharedBackend::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let shared = shared.clone();
                let calls = calls.clone();
                std::thread::spawn(move || {
                    shared
                        .get_or_try_init(|| {
                            calls.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(std::time::Duration::from_millis(20));
                            Ok(Arc::new(FixedBackend(Value::Null)))
                        })
                        .map(|backend| backend.name())
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), "fixed");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_init_is_retried() {
        let shared = SharedBackend::new();

        let first = shared.get_or_try_init(|| Err(BackendError::Unavailable("missing".into())));
        assert!(matches!(first, Err(BackendError::Unavailable(_))));

        let second = shared
            .get_or_try_init(|| Ok(Arc::new(FixedBackend(json!(["ok"])))))
            .unwrap();
        assert_eq!(second.recognize(Path::new("x.png")).unwrap(), json!(["ok"]));
    }

    #[test]
    fn test_parse_tsv_groups_words_into_lines() {
        let tsv = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
1\t1\t0\t0\t0\t0\t0\t0\t100\t100\t-1\t\n\
4\t1\t1\t1\t1\t0\t0\t0\t50\t10\t-1\t\n\
5\t1\t1\t1\t1\t1\t0\t0\t20\t10\t90\tFresh\n\
5\t1\t1\t1\t1\t2\t25\t0\t20\t10\t70\tBread\n\
5\t1\t1\t1\t2\t1\t0\t12\t20\t10\t95.5\t$2.99\n\
5\t1\t1\t1\t2\t2\t25\t12\t20\t10\t-1\t \n";

        let lines = parse_tsv_lines(tsv);

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].0, "Fresh Bread");
        assert!((lines[0].1 - 0.8).abs() < 1e-9);
        assert_eq!(lines[1].0, "$2.99");
        assert!((lines[1].1 - 0.955).abs() < 1e-9);
    }

    #[test]
    fn test_parse_tsv_ignores_garbage() {
        assert!(parse_tsv_lines("").is_empty());
        assert!(parse_tsv_lines("header only\nnot\ttsv").is_empty());
    }

    #[test]
    fn test_script_backend_requires_program() {
        let settings = BackendSettings {
            kind: BackendKind::Script,
            backend_path: None,
            language: "eng".to_string(),
            script_program: None,
            script_args: Vec::new(),
        };

        assert!(matches!(settings.initialize(), Err(BackendError::Unavailable(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_script_backend_reads_result_file() {
        let backend = ScriptBackend::new(
            "/bin/sh".to_string(),
            vec![
                "-c".to_string(),
                r#"echo noisy; printf '{"rec_texts":["%s"],"rec_scores":[0.5]}' "$(basename "$1")" > "$2""#
                    .to_string(),
                "script".to_string(),
            ],
            None,
        );

        let raw = backend.recognize(Path::new("/tmp/label.png")).unwrap();
        assert_eq!(raw, json!({ "rec_texts": ["label.png"], "rec_scores": [0.5] }));
    }

    #[cfg(unix)]
    #[test]
    fn test_script_backend_failure_is_an_error() {
        let backend = ScriptBackend::new(
            "/bin/sh".to_string(),
            vec!["-c".to_string(), "exit 4".to_string(), "script".to_string()],
            None,
        );

        assert!(matches!(
            backend.recognize(Path::new("/tmp/label.png")),
            Err(BackendError::RecognitionFailed(_))
        ));
    }
}
