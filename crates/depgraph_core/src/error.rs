//! The error taxonomy from spec §7: a tagged enum of error kinds plus a
//! context payload per occurrence. Only [`AnalyzerError::Fatal`] aborts a
//! run; every other variant is collected into
//! [`crate::model::AnalysisMetadata::errors`] and the analysis continues.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A single recorded error, attached to the file (if any) it occurred on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub file: Option<String>,
    pub kind: ErrorKind,
    pub message: String,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub timestamp_ms: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Validation,
    Io,
    Parse,
    Resolve,
    Cache,
    Fatal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Io => "io",
            ErrorKind::Parse => "parse",
            ErrorKind::Resolve => "resolve",
            ErrorKind::Cache => "cache",
            ErrorKind::Fatal => "fatal",
        };
        write!(f, "{s}")
    }
}

/// Top-level error type returned by fallible entry points. Only the `Fatal`
/// variant is ever surfaced as an `Err`; everything else is downgraded to an
/// [`ErrorRecord`] by the caller before continuing.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("validation failed for {path}: {reason}")]
    Validation { path: String, reason: String },

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error in {file}: {message}")]
    Parse {
        file: String,
        message: String,
        line: Option<usize>,
        column: Option<usize>,
    },

    #[error("could not resolve reference {module:?} from {file}")]
    Resolve { file: String, module: String },

    #[error("cache error: {message}")]
    Cache { message: String },

    #[error("fatal: {0}")]
    Fatal(String),
}

impl AnalyzerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalyzerError::Validation { .. } => ErrorKind::Validation,
            AnalyzerError::Io { .. } => ErrorKind::Io,
            AnalyzerError::Parse { .. } => ErrorKind::Parse,
            AnalyzerError::Resolve { .. } => ErrorKind::Resolve,
            AnalyzerError::Cache { .. } => ErrorKind::Cache,
            AnalyzerError::Fatal(_) => ErrorKind::Fatal,
        }
    }

    pub fn into_record(self, now_ms: u128) -> ErrorRecord {
        match self {
            AnalyzerError::Validation { path, reason } => ErrorRecord {
                file: Some(path),
                kind: ErrorKind::Validation,
                message: reason,
                line: None,
                column: None,
                timestamp_ms: now_ms,
            },
            AnalyzerError::Io { path, source } => ErrorRecord {
                file: Some(path.to_string_lossy().to_string()),
                kind: ErrorKind::Io,
                message: source.to_string(),
                line: None,
                column: None,
                timestamp_ms: now_ms,
            },
            AnalyzerError::Parse {
                file,
                message,
                line,
                column,
            } => ErrorRecord {
                file: Some(file),
                kind: ErrorKind::Parse,
                message,
                line,
                column,
                timestamp_ms: now_ms,
            },
            AnalyzerError::Resolve { file, module } => ErrorRecord {
                file: Some(file),
                kind: ErrorKind::Resolve,
                message: format!("unresolved reference: {module}"),
                line: None,
                column: None,
                timestamp_ms: now_ms,
            },
            AnalyzerError::Cache { message } => ErrorRecord {
                file: None,
                kind: ErrorKind::Cache,
                message,
                line: None,
                column: None,
                timestamp_ms: now_ms,
            },
            AnalyzerError::Fatal(message) => ErrorRecord {
                file: None,
                kind: ErrorKind::Fatal,
                message,
                line: None,
                column: None,
                timestamp_ms: now_ms,
            },
        }
    }
}

pub fn now_ms() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}
