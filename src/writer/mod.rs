// Copyright 2024-2025 Irreducible Inc.

//! Change-triggered log writer.
//!
//! A [`Writer`] samples RSS for every host event and only persists the
//! events whose RSS moved by at least the trigger threshold since the
//! previous event. When a logged event follows a run of unlogged ones, the
//! event immediately before it is written first (tagged `PREV:`), so the
//! log shows where the jump started. Only the most recent formatted event
//! is kept in memory, whatever the length of the event stream.

mod row;

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use row::{LogRow, RecordTag, END_MARKER, START_MARKER};

use crate::errors::{err_msg, Error};
use crate::event::{EventKind, Frame, TraceEvent};
use crate::filename_utils::resolve_for_reporting;
use crate::probe::Probe;
use crate::session::SessionConfig;

pub struct Writer {
    /// `None` once closed.
    file: Option<BufWriter<File>>,
    log_file_path: PathBuf,
    d_rss_trigger: u64,
    event_number: u64,
    previous_event_number: u64,
    rss: u64,
    event_text: String,
    probe: Box<dyn Probe>,
}

impl Writer {
    /// Create the log file at `path` and write the preamble: the optional
    /// message, the start marker, the column header and a `FRST:` record
    /// for `frame`.
    ///
    /// The `FRST:` record takes sequence number 0, so host events are
    /// numbered from 1. RSS deltas of the first host event are measured
    /// from 0, which makes the start of a session visible in the log.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid or the file can not be
    /// created or written. The preamble is flushed before returning, so a
    /// full device is reported here.
    pub fn open(
        path: &Path,
        config: &SessionConfig,
        frame: Option<&Frame<'_>>,
        probe: Box<dyn Probe>,
    ) -> Result<Self, Error> {
        config.validate()?;

        let file = File::create(path).map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let mut writer = Self {
            file: Some(BufWriter::new(file)),
            log_file_path: resolve_for_reporting(path),
            d_rss_trigger: config.resolved_trigger(),
            event_number: 0,
            previous_event_number: 0,
            rss: 0,
            event_text: String::new(),
            probe,
        };
        if let Err(e) = writer.write_preamble(config.message.as_deref(), frame) {
            // no closing records for a log that never started
            writer.file = None;
            return Err(e);
        }

        Ok(writer)
    }

    fn write_preamble(&mut self, message: Option<&str>, frame: Option<&Frame<'_>>) -> Result<(), Error> {
        let rss = self.probe.rss();
        let clock = self.probe.cpu_time();
        self.format_event(EventKind::Call, frame, clock, rss);

        let Some(file) = self.file.as_mut() else {
            return Err(Error::Closed);
        };
        if let Some(message) = message {
            file.write_all(message.as_bytes())?;
            if !message.ends_with('\n') {
                file.write_all(b"\n")?;
            }
        }
        writeln!(file, "{START_MARKER}")?;
        writeln!(file, "{}", LogRow::header())?;
        writeln!(file, "{}{}", RecordTag::First, self.event_text)?;
        file.flush()?;

        self.previous_event_number = self.event_number;
        self.event_number += 1;
        Ok(())
    }

    /// Sample RSS for one host event and log it if it is significant.
    ///
    /// Never fails: write errors are reported through the diagnostics log
    /// and the record is dropped. Logged records are flushed to the file
    /// before returning. Events received after `close` are ignored.
    pub fn on_event(&mut self, event: &TraceEvent<'_>) {
        if self.file.is_none() {
            return;
        }

        let rss = self.probe.rss();
        let d_rss = signed_delta(rss, self.rss);
        let triggered = d_rss.unsigned_abs() >= self.d_rss_trigger;

        // the buffered text still holds the previous, unlogged event
        if triggered
            && self.event_number > 0
            && self.event_number - self.previous_event_number > 1
        {
            self.write_record(RecordTag::Previous);
        }

        let clock = event.timestamp.unwrap_or_else(|| self.probe.cpu_time());
        self.format_event(event.kind, event.frame.as_ref(), clock, rss);

        if triggered {
            self.write_record(RecordTag::Next);
            self.previous_event_number = self.event_number;
        }

        self.rss = rss;
        self.event_number += 1;
    }

    /// Write caller supplied text verbatim between records.
    ///
    /// # Errors
    ///
    /// Fails if the writer is closed or the write fails.
    pub fn write_to_log(&mut self, message: &str) -> Result<(), Error> {
        let Some(file) = self.file.as_mut() else {
            return Err(Error::Closed);
        };
        file.write_all(message.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Write the `LAST:` record for `frame` and the end marker, then flush
    /// and close the file. Does nothing if already closed.
    ///
    /// # Errors
    ///
    /// Fails if the final records can not be written or flushed. The file
    /// is closed either way.
    pub fn close(&mut self, frame: Option<&Frame<'_>>) -> Result<(), Error> {
        if self.file.is_none() {
            return Ok(());
        }

        let rss = self.probe.rss();
        let clock = self.probe.cpu_time();
        self.format_event(EventKind::Return, frame, clock, rss);

        let Some(mut file) = self.file.take() else {
            return Ok(());
        };
        writeln!(file, "{}{}", RecordTag::Last, self.event_text)?;
        writeln!(file, "{END_MARKER}")?;
        file.flush()?;
        file.get_ref().sync_all()?;

        self.previous_event_number = self.event_number;
        self.event_number += 1;
        self.rss = rss;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Path of the log file, absolute when it could be resolved.
    pub fn log_file_path(&self) -> &Path {
        &self.log_file_path
    }

    /// Trigger threshold in bytes.
    pub fn d_rss_trigger(&self) -> u64 {
        self.d_rss_trigger
    }

    /// Sequence number the next event will get.
    pub fn event_number(&self) -> u64 {
        self.event_number
    }

    /// Sequence number of the last logged record.
    pub fn previous_event_number(&self) -> u64 {
        self.previous_event_number
    }

    /// Most recently formatted record, without its tag.
    pub fn event_text(&self) -> &str {
        &self.event_text
    }

    /// RSS sampled at the last event.
    pub fn rss(&self) -> u64 {
        self.rss
    }

    fn format_event(&mut self, what: EventKind, frame: Option<&Frame<'_>>, clock: Duration, rss: u64) {
        let row = LogRow {
            seq: self.event_number,
            d_seq: self.event_number - self.previous_event_number,
            clock: clock.as_secs_f64(),
            what,
            frame,
            rss,
            d_rss: signed_delta(rss, self.rss),
        };
        self.event_text.clear();
        // writing to a String only fails if Display does
        let _ = write!(self.event_text, "{row}");
    }

    fn write_record(&mut self, tag: RecordTag) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        // records reach the file one at a time; an open log outlives the
        // process when its session is never ended
        if let Err(e) = writeln!(file, "{tag}{}", self.event_text).and_then(|()| file.flush()) {
            err_msg!(
                "failed to write {} record to {:?}: {e}",
                tag.as_str(),
                self.log_file_path
            );
        }
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        if let Err(e) = self.close(None) {
            err_msg!("failed to close {:?}: {e}", self.log_file_path);
        }
    }
}

fn signed_delta(current: u64, previous: u64) -> i64 {
    let delta = i128::from(current) - i128::from(previous);
    i64::try_from(delta).unwrap_or(if delta < 0 { i64::MIN } else { i64::MAX })
}
