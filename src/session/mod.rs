// Copyright 2024-2025 Irreducible Inc.

//! Profile and trace sessions.
//!
//! Each session kind has one process-wide [`SessionStack`]. Starting a
//! session opens a writer and pushes it; ending pops and closes it. The host
//! hook of a kind is a trampoline that forwards events to the top of that
//! kind's stack, so nested sessions only ever feed the innermost log.
//!
//! The stacks are guarded by mutexes but events are only delivered
//! correctly from a host that raises them on one thread at a time. An event
//! arriving while the stack is locked elsewhere is dropped.

mod config;
mod stack;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

pub use config::SessionConfig;
pub use stack::{EntryId, SessionStack};

use crate::errors::{err_msg, Error};
use crate::event::{EventKind, Frame, TraceEvent};
use crate::filename_builder::LogFilenameBuilder;
use crate::probe::{ProcessProbe, Probe};
use crate::writer::Writer;

/// Callback the host runtime invokes for every event of a hook kind.
pub type HookFn = fn(&TraceEvent<'_>);

/// The embedding runtime, as seen by sessions.
pub trait Host: Send + Sync {
    /// Version string of the runtime, used in generated log file names.
    fn runtime_version(&self) -> String;

    /// The frame executing right now, `None` if there is no call stack.
    fn current_frame(&self) -> Option<Frame<'static>>;

    /// Register `hook` for `kind`, or clear the registration with `None`.
    fn install_hook(&self, kind: SessionKind, hook: Option<HookFn>);
}

/// The two host instrumentation entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKind {
    /// Call, return and exception events, including native functions.
    Profile,
    /// Call, line, opcode, return and exception events of bytecode functions.
    Trace,
}

impl SessionKind {
    /// Letter used in generated file names.
    pub const fn letter(self) -> char {
        match self {
            Self::Profile => 'P',
            Self::Trace => 'T',
        }
    }

    /// Whether the host delivers `event` to hooks of this kind.
    pub const fn accepts(self, event: EventKind) -> bool {
        match self {
            Self::Profile => !matches!(event, EventKind::Line | EventKind::Opcode),
            Self::Trace => !event.is_native(),
        }
    }

    /// The trampoline to register with the host.
    pub fn hook(self) -> HookFn {
        match self {
            Self::Profile => profile_hook,
            Self::Trace => trace_hook,
        }
    }

    fn stack(self) -> &'static Mutex<SessionStack> {
        match self {
            Self::Profile => &PROFILE_SESSIONS,
            Self::Trace => &TRACE_SESSIONS,
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Profile => "profile",
            Self::Trace => "trace",
        })
    }
}

static PROFILE_SESSIONS: Mutex<SessionStack> = Mutex::new(SessionStack::new(SessionKind::Profile));
static TRACE_SESSIONS: Mutex<SessionStack> = Mutex::new(SessionStack::new(SessionKind::Trace));

fn lock(kind: SessionKind) -> MutexGuard<'static, SessionStack> {
    kind.stack().lock().unwrap_or_else(PoisonError::into_inner)
}

fn profile_hook(event: &TraceEvent<'_>) {
    dispatch(SessionKind::Profile, event);
}

fn trace_hook(event: &TraceEvent<'_>) {
    dispatch(SessionKind::Trace, event);
}

fn dispatch(kind: SessionKind, event: &TraceEvent<'_>) {
    if !kind.accepts(event.kind) {
        return;
    }
    let mut stack = match kind.stack().try_lock() {
        Ok(stack) => stack,
        Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        Err(TryLockError::WouldBlock) => return,
    };
    if let Some(writer) = stack.peek_mut() {
        writer.on_event(event);
    }
}

/// Point the host hook of `kind` at the trampoline while sessions remain,
/// clear it otherwise.
fn sync_hook(kind: SessionKind, host: &dyn Host, depth: usize) {
    host.install_hook(kind, (depth > 0).then(|| kind.hook()));
}

/// Handle of one open session.
///
/// Dropping the handle ends the session if [`Session::end`] was not called.
pub struct Session {
    kind: SessionKind,
    id: EntryId,
    depth: usize,
    log_file_path: PathBuf,
    host: Arc<dyn Host>,
    ended: bool,
}

impl Session {
    /// Start a session sampling this process's RSS.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration or if the log file can not be created.
    /// Nothing is pushed and no hook is installed in that case.
    pub fn start(kind: SessionKind, config: &SessionConfig, host: Arc<dyn Host>) -> Result<Self, Error> {
        Self::start_with_probe(kind, config, host, Box::new(ProcessProbe))
    }

    /// Start a session reading RSS from `probe`.
    ///
    /// # Errors
    ///
    /// See [`Session::start`].
    pub fn start_with_probe(
        kind: SessionKind,
        config: &SessionConfig,
        host: Arc<dyn Host>,
        probe: Box<dyn Probe>,
    ) -> Result<Self, Error> {
        config.validate()?;

        let depth = lock(kind).depth() + 1;
        let path = match &config.filepath {
            Some(path) => path.clone(),
            None => {
                let path = LogFilenameBuilder::for_session(kind, depth, host.runtime_version()).build()?;
                tracing::info!(?path, %kind, "created log file name");
                path
            }
        };

        let frame = host.current_frame();
        let writer = Writer::open(&path, config, frame.as_ref(), probe)?;
        let log_file_path = writer.log_file_path().to_path_buf();

        let (id, depth) = lock(kind).push(writer);
        sync_hook(kind, host.as_ref(), depth);
        tracing::debug!(?log_file_path, %kind, depth, "session started");

        Ok(Self {
            kind,
            id,
            depth,
            log_file_path,
            host,
            ended: false,
        })
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    /// Nesting depth the session started at, 1 for the outermost.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn log_file_path(&self) -> &Path {
        &self.log_file_path
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// End the session: close its log and unregister the hook if it was
    /// the last session of its kind. Ending an ended session does nothing.
    ///
    /// # Errors
    ///
    /// Returns `Error::OutOfOrder` if a session started later is still
    /// open; the session stays open and can be ended after that one. The
    /// hook stays registered in that case, still feeding the innermost
    /// session. Dropping the handle instead closes this session's log out
    /// of order. Also fails if the final records can not be written.
    pub fn end(&mut self) -> Result<(), Error> {
        if self.ended {
            return Ok(());
        }

        let mut stack = lock(self.kind);
        let top = stack.depth();
        let Some(depth) = stack.depth_of(self.id) else {
            // popped through `end_top`
            self.ended = true;
            return Ok(());
        };
        if depth != top {
            drop(stack);
            sync_hook(self.kind, self.host.as_ref(), top);
            return Err(Error::OutOfOrder {
                kind: self.kind,
                depth,
                top,
            });
        }

        let mut writer = stack.pop()?;
        let remaining = stack.depth();
        drop(stack);

        self.ended = true;
        sync_hook(self.kind, self.host.as_ref(), remaining);
        tracing::debug!(log_file_path = ?self.log_file_path, kind = %self.kind, depth, "session ended");

        writer.close(self.host.current_frame().as_ref())
    }

    /// Write `message` verbatim into this session's log.
    ///
    /// # Errors
    ///
    /// Returns `Error::Closed` if the session has ended.
    pub fn write_to_log(&self, message: &str) -> Result<(), Error> {
        self.with_writer(|writer| writer.write_to_log(message))
            .unwrap_or(Err(Error::Closed))
    }

    /// Run `f` on this session's writer, `None` if the session has ended.
    pub fn with_writer<R>(&self, f: impl FnOnce(&mut Writer) -> R) -> Option<R> {
        if self.ended {
            return None;
        }
        lock(self.kind).get_mut(self.id).map(f)
    }
}

impl Session {
    /// Close this session's writer wherever it sits in the stack. Sessions
    /// started later stay open.
    fn abandon(&mut self) -> Result<(), Error> {
        let mut stack = lock(self.kind);
        let writer = stack.remove(self.id);
        let remaining = stack.depth();
        drop(stack);

        self.ended = true;
        sync_hook(self.kind, self.host.as_ref(), remaining);
        match writer {
            Some(mut writer) => writer.close(self.host.current_frame().as_ref()),
            None => Ok(()),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let result = match self.end() {
            // no handle is left to end it in order
            Err(Error::OutOfOrder { .. }) => self.abandon(),
            result => result,
        };
        if let Err(e) = result {
            err_msg!("failed to end {} session {:?}: {e}", self.kind, self.log_file_path);
        }
    }
}

/// End the most recent session of `kind` without its handle.
///
/// Returns the path of the closed log.
///
/// # Errors
///
/// Returns `Error::EmptyStack` if no session of `kind` is open. The host
/// hook is cleared in that case too.
pub fn end_top(kind: SessionKind, host: &dyn Host) -> Result<PathBuf, Error> {
    let mut stack = lock(kind);
    let popped = stack.pop();
    let remaining = stack.depth();
    drop(stack);

    sync_hook(kind, host, remaining);
    let mut writer = popped?;
    writer.close(host.current_frame().as_ref())?;
    Ok(writer.log_file_path().to_path_buf())
}

/// Number of open sessions of `kind`.
pub fn depth(kind: SessionKind) -> usize {
    lock(kind).depth()
}

pub fn profile_depth() -> usize {
    depth(SessionKind::Profile)
}

pub fn trace_depth() -> usize {
    depth(SessionKind::Trace)
}

/// Log file of the innermost open session of `kind`.
pub fn log_file_path(kind: SessionKind) -> Option<PathBuf> {
    lock(kind)
        .peek()
        .map(|writer| writer.log_file_path().to_path_buf())
}

pub fn log_file_path_profile() -> Option<PathBuf> {
    log_file_path(SessionKind::Profile)
}

pub fn log_file_path_trace() -> Option<PathBuf> {
    log_file_path(SessionKind::Trace)
}
