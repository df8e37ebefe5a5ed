// Copyright 2024-2025 Irreducible Inc.

use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

/// Execution events a host runtime reports through its profile/trace hooks.
///
/// The discriminants match the raw event codes the host passes to its hook
/// functions, so `EventKind::try_from(code)` accepts them directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Call = 0,
    Exception = 1,
    Line = 2,
    Return = 3,
    CCall = 4,
    CException = 5,
    CReturn = 6,
    Opcode = 7,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        Self::Call,
        Self::Exception,
        Self::Line,
        Self::Return,
        Self::CCall,
        Self::CException,
        Self::CReturn,
        Self::Opcode,
    ];

    /// Label written to the `What` column. At most 8 characters.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Call => "CALL",
            Self::Exception => "EXCEPT",
            Self::Line => "LINE",
            Self::Return => "RETURN",
            Self::CCall => "C_CALL",
            Self::CException => "C_EXCEPT",
            Self::CReturn => "C_RETURN",
            Self::Opcode => "OPCODE",
        }
    }

    /// Events raised for native (non-bytecode) functions.
    pub const fn is_native(self) -> bool {
        matches!(self, Self::CCall | Self::CException | Self::CReturn)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // pad, not write_str: the formatter relies on width specifiers
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownEventKind(pub i32);

impl fmt::Display for UnknownEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event code {}", self.0)
    }
}

impl std::error::Error for UnknownEventKind {}

impl TryFrom<i32> for EventKind {
    type Error = UnknownEventKind;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        usize::try_from(code)
            .ok()
            .and_then(|idx| Self::ALL.get(idx).copied())
            .ok_or(UnknownEventKind(code))
    }
}

/// Source location of the code that raised an event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame<'a> {
    pub file: Cow<'a, str>,
    pub line: u32,
    pub function: Cow<'a, str>,
}

impl<'a> Frame<'a> {
    pub fn new(file: impl Into<Cow<'a, str>>, line: u32, function: impl Into<Cow<'a, str>>) -> Self {
        Self {
            file: file.into(),
            line,
            function: function.into(),
        }
    }

    pub fn into_owned(self) -> Frame<'static> {
        Frame {
            file: Cow::Owned(self.file.into_owned()),
            line: self.line,
            function: Cow::Owned(self.function.into_owned()),
        }
    }
}

/// One host callback. Borrowed for the duration of the hook call only.
#[derive(Debug, Clone)]
pub struct TraceEvent<'a> {
    pub kind: EventKind,
    /// `None` when the host has no current frame.
    pub frame: Option<Frame<'a>>,
    /// CPU time since process start. Sampled by the writer when absent.
    pub timestamp: Option<Duration>,
}

impl<'a> TraceEvent<'a> {
    pub fn new(kind: EventKind, frame: Frame<'a>) -> Self {
        Self {
            kind,
            frame: Some(frame),
            timestamp: None,
        }
    }

    pub fn without_frame(kind: EventKind) -> Self {
        Self {
            kind,
            frame: None,
            timestamp: None,
        }
    }

    #[must_use]
    pub fn timestamp(mut self, timestamp: Duration) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}
