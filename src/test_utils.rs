// Copyright 2024-2025 Irreducible Inc.

//! Doubles for the host runtime and the RSS probe, plus a reader for the
//! records of a finished log. Used by the crate's own tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::event::{Frame, TraceEvent};
use crate::probe::Probe;
use crate::session::{HookFn, Host, SessionKind};

/// Probe whose readings are set by the test. Clones share readings.
#[derive(Debug, Clone, Default)]
pub struct ScriptedProbe {
    rss: Arc<AtomicU64>,
    peak: Arc<AtomicU64>,
    cpu_nanos: Arc<AtomicU64>,
}

impl ScriptedProbe {
    pub fn new(rss: u64) -> Self {
        let probe = Self::default();
        probe.set_rss(rss);
        probe
    }

    pub fn set_rss(&self, rss: u64) {
        self.rss.store(rss, Ordering::Relaxed);
        self.peak.fetch_max(rss, Ordering::Relaxed);
    }

    pub fn advance_clock(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.cpu_nanos.fetch_add(nanos, Ordering::Relaxed);
    }
}

impl Probe for ScriptedProbe {
    fn rss(&self) -> u64 {
        self.rss.load(Ordering::Relaxed)
    }

    fn peak_rss(&self) -> u64 {
        self.peak.load(Ordering::Relaxed)
    }

    fn cpu_time(&self) -> Duration {
        Duration::from_nanos(self.cpu_nanos.load(Ordering::Relaxed))
    }
}

#[derive(Default)]
struct HostState {
    frame: Option<Frame<'static>>,
    profile_hook: Option<HookFn>,
    trace_hook: Option<HookFn>,
    installs: Vec<(SessionKind, bool)>,
}

/// Host that remembers its installed hooks and can fire events through them.
pub struct RecordingHost {
    version: String,
    state: Mutex<HostState>,
}

impl RecordingHost {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            state: Mutex::default(),
        }
    }

    pub fn set_frame(&self, frame: Option<Frame<'_>>) {
        let frame = frame.map(Frame::into_owned);
        self.with_state(|state| state.frame = frame);
    }

    pub fn is_hooked(&self, kind: SessionKind) -> bool {
        self.with_state(|state| match kind {
            SessionKind::Profile => state.profile_hook.is_some(),
            SessionKind::Trace => state.trace_hook.is_some(),
        })
    }

    /// Every `install_hook` call so far, `true` for installs.
    pub fn installs(&self) -> Vec<(SessionKind, bool)> {
        self.with_state(|state| state.installs.clone())
    }

    /// Deliver `event` through the hook installed for `kind`.
    /// Returns false if no hook is installed.
    pub fn fire(&self, kind: SessionKind, event: &TraceEvent<'_>) -> bool {
        let hook = self.with_state(|state| match kind {
            SessionKind::Profile => state.profile_hook,
            SessionKind::Trace => state.trace_hook,
        });
        match hook {
            Some(hook) => {
                hook(event);
                true
            }
            None => false,
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut HostState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }
}

impl Host for RecordingHost {
    fn runtime_version(&self) -> String {
        self.version.clone()
    }

    fn current_frame(&self) -> Option<Frame<'static>> {
        self.with_state(|state| state.frame.clone())
    }

    fn install_hook(&self, kind: SessionKind, hook: Option<HookFn>) {
        self.with_state(|state| {
            state.installs.push((kind, hook.is_some()));
            match kind {
                SessionKind::Profile => state.profile_hook = hook,
                SessionKind::Trace => state.trace_hook = hook,
            }
        });
    }
}

/// One record line of a log, split on whitespace.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRecord {
    pub tag: String,
    pub seq: u64,
    pub d_seq: u64,
    pub clock: f64,
    pub what: String,
    pub file: String,
    pub line: u32,
    pub function: String,
    pub rss: u64,
    pub d_rss: i64,
}

/// Records of a log, skipping markers, headers and inline messages.
///
/// File and function names must not contain whitespace. Records without
/// a frame parse with empty names.
pub fn parse_records(text: &str) -> Vec<ParsedRecord> {
    text.lines().filter_map(parse_record).collect()
}

fn parse_record(line: &str) -> Option<ParsedRecord> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let tag = *fields.first()?;
    if !matches!(tag, "FRST:" | "NEXT:" | "PREV:" | "LAST:") {
        return None;
    }
    let (file, line_no, function) = match fields.len() {
        10 => (fields[5], fields[6], fields[7]),
        8 => ("", fields[5], ""),
        _ => return None,
    };
    let (rss, d_rss) = (fields[fields.len() - 2], fields[fields.len() - 1]);

    Some(ParsedRecord {
        tag: tag.to_string(),
        seq: fields[1].parse().ok()?,
        d_seq: fields[2].strip_prefix('+')?.parse().ok()?,
        clock: fields[3].parse().ok()?,
        what: fields[4].to_string(),
        file: file.to_string(),
        line: line_no.parse().ok()?,
        function: function.to_string(),
        rss: rss.parse().ok()?,
        d_rss: d_rss.parse().ok()?,
    })
}
