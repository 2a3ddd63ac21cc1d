//! Configuration management for the cutout service

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

use crate::ocr::BackendKind;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub ocr: OcrConfig,
    pub cutout: CutoutConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OcrConfig {
    /// Worker program; `None` re-runs this executable as `ocr-worker`
    pub worker_program: Option<PathBuf>,
    pub worker_args: Vec<String>,
    pub timeout_secs: u64,
    pub backend: BackendKind,
    /// Search path handed to the backend (tessdata dir, model dir, ...)
    pub backend_path: Option<PathBuf>,
    pub language: String,
    pub script_program: Option<String>,
    pub script_args: Vec<String>,
    /// Sample image for `GET /_debug_ocr`
    pub debug_sample: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CutoutConfig {
    pub remover: RemoverKind,
    pub command: String,
    pub command_args: Vec<String>,
    pub http_url: String,
    pub output_dir: PathBuf,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoverKind {
    /// CLI such as `rembg i <in> <out>`
    Command,
    /// Running `rembg s` server
    Http,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 17890,
        }
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        OcrConfig {
            worker_program: None,
            worker_args: Vec::new(),
            timeout_secs: 120,
            backend: BackendKind::Tesseract,
            backend_path: None,
            language: "eng".to_string(),
            script_program: None,
            script_args: Vec::new(),
            debug_sample: None,
        }
    }
}

impl Default for CutoutConfig {
    fn default() -> Self {
        CutoutConfig {
            remover: RemoverKind::Command,
            command: "rembg".to_string(),
            command_args: vec!["i".to_string()],
            http_url: "http://127.0.0.1:7000".to_string(),
            output_dir: env::temp_dir(),
            max_upload_bytes: 25 * 1024 * 1024,
        }
    }
}

impl Config {
    pub fn from_env() -> Config {
        let defaults = Config::default();

        Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_var("SERVER_PORT", defaults.server.port),
            },
            ocr: OcrConfig {
                worker_program: path_var("OCR_WORKER_PROGRAM"),
                worker_args: list_var("OCR_WORKER_ARGS").unwrap_or(defaults.ocr.worker_args),
                timeout_secs: parse_var("OCR_TIMEOUT_SECS", defaults.ocr.timeout_secs),
                backend: match env::var("OCR_BACKEND") {
                    Ok(value) => BackendKind::parse(&value).unwrap_or_else(|| {
                        tracing::warn!("Unknown OCR_BACKEND '{}', using tesseract", value);
                        BackendKind::Tesseract
                    }),
                    Err(_) => defaults.ocr.backend,
                },
                backend_path: path_var("OCR_BACKEND_PATH"),
                language: env::var("OCR_LANGUAGE").unwrap_or(defaults.ocr.language),
                script_program: env::var("OCR_SCRIPT_PROGRAM").ok().filter(|v| !v.is_empty()),
                script_args: list_var("OCR_SCRIPT_ARGS").unwrap_or_default(),
                debug_sample: path_var("OCR_DEBUG_SAMPLE"),
            },
            cutout: CutoutConfig {
                remover: match env::var("CUTOUT_REMOVER").unwrap_or_default().as_str() {
                    "http" => RemoverKind::Http,
                    _ => RemoverKind::Command,
                },
                command: env::var("CUTOUT_COMMAND").unwrap_or(defaults.cutout.command),
                command_args: list_var("CUTOUT_COMMAND_ARGS").unwrap_or(defaults.cutout.command_args),
                http_url: env::var("CUTOUT_HTTP_URL").unwrap_or(defaults.cutout.http_url),
                output_dir: path_var("CUTOUT_OUTPUT_DIR").unwrap_or(defaults.cutout.output_dir),
                max_upload_bytes: parse_var("CUTOUT_MAX_UPLOAD_BYTES", defaults.cutout.max_upload_bytes),
            },
        }
    }
}

fn parse_var<T: FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(value) => value.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid value '{}' for {}, using {}", value, key, default);
            default
        }),
        Err(_) => default,
    }
}

fn path_var(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Whitespace separated list
fn list_var(key: &str) -> Option<Vec<String>> {
    env::var(key)
        .ok()
        .map(|value| value.split_whitespace().map(str::to_string).collect())
}
