// Copyright 2024-2025 Irreducible Inc.

//! An RSS change-triggered memory tracer for managed-language runtimes.
//!
//! # Overview
//! The host runtime calls a hook for every call, line, return and exception
//! event. For each event this crate samples the process resident set size
//! and writes a record to a text log only when RSS moved by at least a
//! configurable number of bytes since the previous event. The event right
//! before a logged one is written as well when it was skipped, so every jump
//! in memory can be tied to the code that ran just before it.
//!
//! Two independent session kinds exist, matching the two hook points a host
//! exposes:
//!     `SessionKind::Profile`: calls, returns and exceptions, including native functions.
//!     `SessionKind::Trace`: calls, returns, exceptions, lines and opcodes of bytecode functions.
//!
//! Sessions nest. Starting one pushes a writer onto the kind's stack and
//! points the host hook at that stack; ending one pops and closes it.
//!
//! ```no_run
//! use std::sync::Arc;
//! use rss_trace::{Frame, HookFn, Host, Session, SessionConfig, SessionKind};
//!
//! struct Runtime;
//!
//! impl Host for Runtime {
//!     fn runtime_version(&self) -> String {
//!         "3.12.1".to_string()
//!     }
//!
//!     fn current_frame(&self) -> Option<Frame<'static>> {
//!         None
//!     }
//!
//!     fn install_hook(&self, _kind: SessionKind, _hook: Option<HookFn>) {
//!         // hand the hook to the runtime's profiling API
//!     }
//! }
//!
//! let config = SessionConfig::new().d_rss_trigger(0).message("populate list");
//! let mut session = Session::start(SessionKind::Profile, &config, Arc::new(Runtime)).unwrap();
//! // ... the runtime executes and calls the hook ...
//! session.end().unwrap();
//! println!("log written to {:?}", session.log_file_path());
//! ```
//!
//! # Features
//! The `panic` feature turns errors swallowed on the event path into panics,
//! halting the program on the first failed write.

mod env_utils;
mod errors;
mod event;
mod filename_builder;
mod filename_utils;
mod logging;
mod probe;
mod session;
#[doc(hidden)]
pub mod test_utils;
mod writer;

pub use errors::Error;
pub use event::{EventKind, Frame, TraceEvent, UnknownEventKind};
pub use filename_builder::{FilenameBuilderError, LogFilenameBuilder, LOG_DIR_ENV};
pub use filename_utils::{FILE_NAME_MAX_LENGTH, PATH_NAME_MAX_LENGTH};
pub use logging::init_logging;
pub use probe::{page_size, Probe, ProcessProbe};
pub use session::{
    depth, end_top, log_file_path, log_file_path_profile, log_file_path_trace, profile_depth,
    trace_depth, EntryId, HookFn, Host, Session, SessionConfig, SessionKind, SessionStack,
};
pub use writer::{LogRow, RecordTag, Writer, END_MARKER, START_MARKER};

/// Current resident set size of this process in bytes.
pub fn rss() -> u64 {
    probe::current_rss()
}

/// Peak resident set size of this process in bytes.
pub fn rss_peak() -> u64 {
    probe::peak_rss()
}
