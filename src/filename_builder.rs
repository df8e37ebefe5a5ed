// Copyright 2024-2025 Irreducible Inc.

//! Builder for generated memory trace log file names.
//!
//! The default layout is
//! `<YYYYmmdd_HHMMSS>_<pid>_<P|T>_<depth>_<runtime version>.log`.
//! Timestamps only have one second resolution, so sessions opened within
//! the same second are told apart by process id and nesting depth.

use std::path::PathBuf;
use thiserror::Error;

use crate::env_utils::get_optional_env_var;
use crate::filename_utils::{get_formatted_time, sanitize_filename, FILE_NAME_MAX_LENGTH};
use crate::session::SessionKind;

/// Overrides the directory generated log files are written to.
pub const LOG_DIR_ENV: &str = "MEMTRACE_LOG_DIR";

const EXTENSION: &str = "log";

/// Errors that can occur when building log file names.
#[derive(Debug, Clone, Error)]
pub enum FilenameBuilderError {
    #[error("I/O error: {0}")]
    IoError(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Builder for constructing log file names.
///
/// # Example
/// ```rust,no_run
/// use rss_trace::{LogFilenameBuilder, SessionKind};
///
/// let path = LogFilenameBuilder::new()
///     .timestamp()
///     .pid()
///     .kind(SessionKind::Profile)
///     .depth(1)
///     .runtime_version("3.12.1")
///     .build()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct LogFilenameBuilder {
    timestamp: Option<String>,
    pid: Option<u32>,
    kind: Option<SessionKind>,
    depth: Option<usize>,
    runtime_version: Option<String>,
    output_dir: Option<PathBuf>,
    separator: String,
}

impl LogFilenameBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            separator: "_".to_string(),
            ..Default::default()
        }
    }

    /// The full default layout for a session of `kind` at nesting `depth`.
    pub fn for_session(kind: SessionKind, depth: usize, runtime_version: impl Into<String>) -> Self {
        Self::new()
            .timestamp()
            .pid()
            .kind(kind)
            .depth(depth)
            .runtime_version(runtime_version)
    }

    /// Add current UTC time (YYYYmmdd_HHMMSS).
    pub fn timestamp(mut self) -> Self {
        self.timestamp = Some(get_formatted_time());
        self
    }

    /// Add a fixed timestamp string.
    pub fn timestamp_custom(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    /// Add the id of the current process.
    pub fn pid(mut self) -> Self {
        self.pid = Some(std::process::id());
        self
    }

    /// Add the session kind letter.
    pub fn kind(mut self, kind: SessionKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Add the nesting depth of the session.
    pub fn depth(mut self, depth: usize) -> Self {
        self.depth = Some(depth);
        self
    }

    /// Add the host runtime version (sanitized).
    pub fn runtime_version(mut self, version: impl Into<String>) -> Self {
        self.runtime_version = Some(sanitize_filename(&version.into()));
        self
    }

    /// Set output directory. Without one the name is relative to the working directory.
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Set custom separator (default is "_").
    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Build the log file path.
    ///
    /// `MEMTRACE_LOG_DIR` takes precedence over `output_dir`. The chosen
    /// directory is created if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file name exceeds the length limit or the
    /// directory can not be created.
    pub fn build(self) -> Result<PathBuf, FilenameBuilderError> {
        let mut parts = Vec::new();
        if let Some(timestamp) = &self.timestamp {
            parts.push(timestamp.clone());
        }
        if let Some(pid) = self.pid {
            parts.push(pid.to_string());
        }
        if let Some(kind) = self.kind {
            parts.push(kind.letter().to_string());
        }
        if let Some(depth) = self.depth {
            parts.push(depth.to_string());
        }
        if let Some(version) = &self.runtime_version {
            if !version.is_empty() {
                parts.push(version.clone());
            }
        }

        let filename = if parts.is_empty() {
            format!("memtrace.{EXTENSION}")
        } else {
            format!("{}.{EXTENSION}", parts.join(&self.separator))
        };
        if filename.len() > FILE_NAME_MAX_LENGTH {
            return Err(FilenameBuilderError::InvalidConfig(format!(
                "file name is {} bytes, the limit is {FILE_NAME_MAX_LENGTH}",
                filename.len()
            )));
        }

        let Some(dir) = get_optional_env_var(LOG_DIR_ENV)
            .map(PathBuf::from)
            .or(self.output_dir)
        else {
            return Ok(PathBuf::from(filename));
        };

        std::fs::create_dir_all(&dir).map_err(|e| {
            FilenameBuilderError::IoError(format!("Failed to create directory {dir:?}: {e}"))
        })?;

        Ok(dir.join(filename))
    }
}
