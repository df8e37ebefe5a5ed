// Copyright 2024-2025 Irreducible Inc.

//! Fixed-width text records.
//!
//! Column order and widths are read by downstream log parsers and must not
//! change:
//! ```text
//!       Event        dEvent   Clock        What     File ... line Function ... RSS dRSS
//! NEXT: 42           +3       0.532180     CALL     app.py ...   12 work     ... 10522624 4096
//! ```
//! Every record line starts with a six character tag (`FRST: `, `NEXT: `,
//! `PREV: `, `LAST: `) followed by the row text.

use std::fmt;

use crate::event::{EventKind, Frame};

const TAG_WIDTH: usize = 6;
const SEQ_WIDTH: usize = 12;
const D_SEQ_WIDTH: usize = 6;
const CLOCK_WIDTH: usize = 12;
const WHAT_WIDTH: usize = 8;
const FILE_WIDTH: usize = 80;
const LINE_WIDTH: usize = 4;
const FUNCTION_WIDTH: usize = 32;
const RSS_WIDTH: usize = 12;

pub const START_MARKER: &str = "SOF";
pub const END_MARKER: &str = "EOF";

/// Why a record was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordTag {
    /// Baseline written when the log is opened.
    First,
    /// Event that crossed the trigger threshold.
    Next,
    /// Unlogged event immediately preceding a `Next`.
    Previous,
    /// Final record written when the log is closed.
    Last,
}

impl RecordTag {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::First => "FRST:",
            Self::Next => "NEXT:",
            Self::Previous => "PREV:",
            Self::Last => "LAST:",
        }
    }
}

impl fmt::Display for RecordTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<TAG_WIDTH$}", self.as_str())
    }
}

/// One sampled event, ready to be rendered.
#[derive(Debug, Clone)]
pub struct LogRow<'a> {
    pub seq: u64,
    /// Distance to the previously logged event.
    pub d_seq: u64,
    /// CPU seconds since process start.
    pub clock: f64,
    pub what: EventKind,
    /// A missing frame renders as empty file and function, line 0.
    pub frame: Option<&'a Frame<'a>>,
    pub rss: u64,
    pub d_rss: i64,
}

impl LogRow<'_> {
    /// The column header row, aligned with `Display` output.
    pub fn header() -> String {
        format!(
            "{:TAG_WIDTH$}{:<SEQ_WIDTH$} {:<D_SEQ_WIDTH$}   {:<CLOCK_WIDTH$} {:<WHAT_WIDTH$} {:<FILE_WIDTH$} {:>LINE_WIDTH$} {:<FUNCTION_WIDTH$} {:>RSS_WIDTH$} {:>RSS_WIDTH$}",
            "", "Event", "dEvent", "Clock", "What", "File", "line", "Function", "RSS", "dRSS"
        )
    }
}

impl fmt::Display for LogRow<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (file, line, function) = match self.frame {
            Some(frame) => (frame.file.as_ref(), frame.line, frame.function.as_ref()),
            None => ("", 0, ""),
        };
        write!(
            f,
            "{:<SEQ_WIDTH$} +{:<D_SEQ_WIDTH$}  {:<CLOCK_WIDTH$.6} {:<WHAT_WIDTH$} {:<FILE_WIDTH$} {:>LINE_WIDTH$} {:<FUNCTION_WIDTH$} {:>RSS_WIDTH$} {:>RSS_WIDTH$}",
            self.seq, self.d_seq, self.clock, self.what, file, line, function, self.rss, self.d_rss
        )
    }
}
