// Copyright 2024-2025 Irreducible Inc.

use std::path::{Path, PathBuf};

use crate::env_utils::{get_env_var, get_optional_env_var};
use crate::errors::Error;
use crate::filename_utils::PATH_NAME_MAX_LENGTH;
use crate::probe::page_size;

/// Options accepted when a session starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Minimum absolute RSS change, in bytes, for an event to be logged.
    /// Negative means one memory page, zero logs every event.
    /// Corresponds to the `MEMTRACE_D_RSS_TRIGGER` environment variable.
    pub d_rss_trigger: i64,

    /// Written verbatim at the top of the log file.
    /// Corresponds to the `MEMTRACE_MESSAGE` environment variable.
    pub message: Option<String>,

    /// Explicit log file path. A name is generated when absent.
    /// Corresponds to the `MEMTRACE_LOG_FILE` environment variable.
    pub filepath: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            d_rss_trigger: -1,
            message: None,
            filepath: None,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        Self {
            d_rss_trigger: get_env_var("MEMTRACE_D_RSS_TRIGGER", -1),
            message: get_optional_env_var("MEMTRACE_MESSAGE"),
            filepath: get_optional_env_var("MEMTRACE_LOG_FILE").map(PathBuf::from),
        }
    }

    #[must_use]
    pub fn d_rss_trigger(mut self, trigger: i64) -> Self {
        self.d_rss_trigger = trigger;
        self
    }

    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn filepath(mut self, path: impl Into<PathBuf>) -> Self {
        self.filepath = Some(path.into());
        self
    }

    /// The trigger threshold in bytes, with the negative sentinel resolved.
    pub fn resolved_trigger(&self) -> u64 {
        u64::try_from(self.d_rss_trigger).unwrap_or_else(|_| page_size())
    }

    /// Reject option values a session can not start with.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` for an empty or over-long explicit path.
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(path) = &self.filepath {
            validate_filepath(path)?;
        }
        Ok(())
    }
}

fn validate_filepath(path: &Path) -> Result<(), Error> {
    let len = path.as_os_str().len();
    if len == 0 {
        return Err(Error::InvalidConfig("log file path is empty".to_string()));
    }
    if len > PATH_NAME_MAX_LENGTH {
        return Err(Error::InvalidConfig(format!(
            "log file path is {len} bytes, the limit is {PATH_NAME_MAX_LENGTH}"
        )));
    }
    Ok(())
}
