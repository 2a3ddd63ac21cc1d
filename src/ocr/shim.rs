//! OCR invocation shim
//!
//! Runs one recognition per request in a separate worker process, behind a
//! single-flight gate, and turns whatever comes back into an [`OcrResult`].

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::process::Command;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::normalize::normalize;
use super::types::OcrResult;
use crate::config::OcrConfig;

/// Admits one OCR invocation at a time, in arrival order.
#[derive(Debug, Default)]
pub struct OcrGate {
    lock: Mutex<()>,
}

/// Held for the duration of one invocation. Dropping it releases the gate.
pub type GatePermit<'a> = MutexGuard<'a, ()>;

impl OcrGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self) -> GatePermit<'_> {
        self.lock.lock().await
    }
}

/// Invocation error types
///
/// None of these reach the HTTP layer; they are logged and replaced by the
/// empty result.
#[derive(Debug, thiserror::Error)]
pub enum InvocationError {
    #[error("Failed to spawn OCR worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Failed to wait for OCR worker: {0}")]
    Wait(#[source] std::io::Error),

    #[error("OCR worker timed out after {0:?}")]
    TimedOut(Duration),

    #[error("OCR worker exited with {status}")]
    Exited { status: ExitStatus, stderr: String },

    #[error("OCR worker output is not JSON: {source}")]
    MalformedOutput {
        #[source]
        source: serde_json::Error,
        stdout: String,
        stderr: String,
    },
}

impl InvocationError {
    /// Worker diagnostics captured before the failure, if any
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::Exited { stderr, .. } | Self::MalformedOutput { stderr, .. } => {
                Some(stderr.as_str())
            }
            _ => None,
        }
    }
}

/// How to start a worker process
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: PathBuf,
    /// Arguments placed before the image path
    pub args: Vec<String>,
    /// The worker's whole environment; nothing is inherited
    pub env: Vec<(String, OsString)>,
}

impl WorkerCommand {
    /// Worker command described by the OCR configuration.
    ///
    /// Without an explicit program the current executable is re-run with the
    /// `ocr-worker` subcommand.
    pub fn from_config(config: &OcrConfig) -> std::io::Result<Self> {
        let (program, args) = match &config.worker_program {
            Some(program) => (program.clone(), config.worker_args.clone()),
            None => (std::env::current_exe()?, vec!["ocr-worker".to_string()]),
        };

        let mut env: Vec<(String, OsString)> = vec![
            ("OCR_BACKEND".to_string(), config.backend.as_str().into()),
            ("OCR_LANGUAGE".to_string(), config.language.clone().into()),
        ];
        if let Some(path) = std::env::var_os("PATH") {
            env.push(("PATH".to_string(), path));
        }
        if let Some(dir) = &config.backend_path {
            env.push(("OCR_BACKEND_PATH".to_string(), dir.clone().into_os_string()));
        }
        if let Some(program) = &config.script_program {
            env.push(("OCR_SCRIPT_PROGRAM".to_string(), program.clone().into()));
        }
        if !config.script_args.is_empty() {
            env.push(("OCR_SCRIPT_ARGS".to_string(), config.script_args.join(" ").into()));
        }
        if let Some(filter) = std::env::var_os("RUST_LOG") {
            env.push(("RUST_LOG".to_string(), filter));
        }
        #[cfg(windows)]
        if let Some(root) = std::env::var_os("SYSTEMROOT") {
            env.push(("SYSTEMROOT".to_string(), root));
        }

        Ok(Self { program, args, env })
    }
}

/// Captured result of one worker run
#[derive(Debug)]
pub struct WorkerOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Gate plus isolated worker invocation
#[derive(Debug)]
pub struct OcrShim {
    gate: OcrGate,
    worker: WorkerCommand,
    timeout: Duration,
}

impl OcrShim {
    pub fn new(worker: WorkerCommand, timeout: Duration) -> Self {
        Self {
            gate: OcrGate::new(),
            worker,
            timeout,
        }
    }

    pub fn from_config(config: &OcrConfig) -> std::io::Result<Self> {
        Ok(Self::new(
            WorkerCommand::from_config(config)?,
            Duration::from_secs(config.timeout_secs),
        ))
    }

    /// Recognize text in one image.
    ///
    /// Waits for any in-flight invocation first. Every worker failure is logged
    /// and reported as the empty result.
    pub async fn recognize(&self, image_path: &Path) -> OcrResult {
        let invocation_id = Uuid::new_v4();
        tracing::debug!(%invocation_id, image_path = %image_path.display(), "Waiting for OCR gate");
        let _permit = self.gate.acquire().await;
        let started = Instant::now();

        match self.invoke(image_path).await {
            Ok(raw) => {
                let result = normalize(&raw);
                tracing::info!(
                    %invocation_id,
                    image_path = %image_path.display(),
                    lines = result.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "OCR complete"
                );
                result
            }
            Err(e) => {
                tracing::warn!(
                    %invocation_id,
                    image_path = %image_path.display(),
                    stderr = e.stderr().unwrap_or(""),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "OCR invocation failed: {}",
                    e
                );
                OcrResult::empty()
            }
        }
    }

    /// Run the worker behind the gate and return its raw output, unparsed.
    pub async fn run_exclusive(&self, image_path: &Path) -> Result<WorkerOutput, InvocationError> {
        let _permit = self.gate.acquire().await;
        self.run_worker(image_path).await
    }

    /// Run the worker and parse its stdout as the backend raw result.
    ///
    /// The caller must hold the gate.
    async fn invoke(&self, image_path: &Path) -> Result<Value, InvocationError> {
        parse_output(self.run_worker(image_path).await?)
    }

    async fn run_worker(&self, image_path: &Path) -> Result<WorkerOutput, InvocationError> {
        let mut command = Command::new(&self.worker.program);
        command
            .args(&self.worker.args)
            .arg(image_path)
            .env_clear()
            .envs(self.worker.env.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // The worker leads its own process group so the backend processes it
        // starts can be killed along with it.
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().map_err(InvocationError::Spawn)?;
        let _group = ProcessGroup::new(child.id());

        tracing::debug!(
            image_path = %image_path.display(),
            pid = child.id(),
            "Spawned OCR worker"
        );

        // On timeout the child is dropped (killed) and `_group` takes down
        // anything the worker left behind before the gate is released.
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| InvocationError::TimedOut(self.timeout))?
            .map_err(InvocationError::Wait)?;

        Ok(WorkerOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Kills the worker's process group when dropped.
///
/// Covers timeouts, cancelled requests and stragglers a finished worker left
/// running. Without unix process groups only the worker itself is killed.
struct ProcessGroup {
    #[cfg_attr(not(unix), allow(dead_code))]
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn new(leader: Option<u32>) -> Self {
        Self { pgid: leader }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(pgid) = self.pgid.and_then(|pgid| i32::try_from(pgid).ok()) {
            use nix::errno::Errno;
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
                Ok(()) => tracing::debug!(pgid, "Killed OCR worker process group"),
                Err(Errno::ESRCH) => {}
                Err(e) => tracing::warn!(pgid, "Failed to kill OCR worker process group: {}", e),
            }
        }
    }
}

/// Check the exit status and parse stdout as one JSON document
pub fn parse_output(output: WorkerOutput) -> Result<Value, InvocationError> {
    if !output.status.success() {
        return Err(InvocationError::Exited {
            status: output.status,
            stderr: output.stderr,
        });
    }

    match serde_json::from_str(&output.stdout) {
        Ok(raw) => {
            if !output.stderr.trim().is_empty() {
                tracing::debug!(stderr = %output.stderr.trim(), "OCR worker diagnostics");
            }
            Ok(raw)
        }
        Err(source) => Err(InvocationError::MalformedOutput {
            source,
            stdout: output.stdout,
            stderr: output.stderr,
        }),
    }
}
