// Copyright 2024-2025 Irreducible Inc.

use crate::errors::Error;
use crate::session::SessionKind;
use crate::writer::Writer;

/// Identifies one push onto a [`SessionStack`].
pub type EntryId = u64;

struct Entry {
    id: EntryId,
    writer: Writer,
}

/// LIFO of the open writers of one session kind.
///
/// Writers are owned by the stack; pushing and popping moves them. Only
/// the top writer receives events.
pub struct SessionStack {
    kind: SessionKind,
    entries: Vec<Entry>,
    next_id: EntryId,
}

impl SessionStack {
    pub const fn new(kind: SessionKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
            next_id: 0,
        }
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    /// Push `writer` on top. Returns its id and the new depth.
    pub fn push(&mut self, writer: Writer) -> (EntryId, usize) {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(Entry { id, writer });
        (id, self.entries.len())
    }

    /// Remove the top writer.
    ///
    /// # Errors
    ///
    /// Returns `Error::EmptyStack` if there is none.
    pub fn pop(&mut self) -> Result<Writer, Error> {
        self.entries
            .pop()
            .map(|entry| entry.writer)
            .ok_or(Error::EmptyStack(self.kind))
    }

    pub fn peek(&self) -> Option<&Writer> {
        self.entries.last().map(|entry| &entry.writer)
    }

    pub fn peek_mut(&mut self) -> Option<&mut Writer> {
        self.entries.last_mut().map(|entry| &mut entry.writer)
    }

    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 1-based depth of the entry pushed with `id`, if it is still on the stack.
    pub fn depth_of(&self, id: EntryId) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.id == id)
            .map(|idx| idx + 1)
    }

    /// Take the entry pushed with `id` out of the stack, wherever it is.
    pub fn remove(&mut self, id: EntryId) -> Option<Writer> {
        let idx = self.entries.iter().position(|entry| entry.id == id)?;
        Some(self.entries.remove(idx).writer)
    }

    pub fn get_mut(&mut self, id: EntryId) -> Option<&mut Writer> {
        self.entries
            .iter_mut()
            .find(|entry| entry.id == id)
            .map(|entry| &mut entry.writer)
    }
}
