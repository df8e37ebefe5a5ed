// Copyright 2024-2025 Irreducible Inc.

use std::path::PathBuf;

use thiserror::Error;

use crate::filename_builder::FilenameBuilderError;
use crate::session::SessionKind;

// use this instead of eprintln! on paths that must not fail
macro_rules! err_msg {
    ($($arg:tt)*) => {{
        tracing::warn!($($arg)*);
        assert!(cfg!(not(feature = "panic")))
    }};
}

pub(crate) use err_msg;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("can not open log file {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to build log file name: {0}")]
    Filename(#[from] FilenameBuilderError),
    #[error("no active {0} session")]
    EmptyStack(SessionKind),
    #[error("{kind} session at depth {depth} ended while depth {top} is still active")]
    OutOfOrder {
        kind: SessionKind,
        depth: usize,
        top: usize,
    },
    #[error("log file is closed")]
    Closed,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
