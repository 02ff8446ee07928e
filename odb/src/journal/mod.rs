//! The ECO journal.
//!
//! A [`Journal`] is an append-only byte log of actions. Each action is laid
//! out as
//!
//! ```text
//! [kind: u8] [object type] [params ...] [END_MARKER: u8] [start: u32]
//! ```
//!
//! where every parameter after the kind carries a one-byte type tag, and
//! `start` is the offset of the action's first byte. The trailer lets the log
//! be walked backward for undo as well as forward for replay.

use std::io::Cursor;

use dbtable::{DbReader, DbWriter};

use crate::block::persist::{SCHEMA_CURRENT, SCHEMA_INITIAL};
use crate::error::{InvariantError, OdbError, Result};
use crate::log::error;

mod codec;
pub mod entry;
mod replay;

pub use codec::{ParamReader, ParamWriter};
pub use entry::{ActionKind, JournalEntry, ObjectType};
pub use replay::ReplaySummary;

/// Closes every action.
pub const END_MARKER: u8 = 0xEE;

/// Size of the trailer that closes an action.
const TRAILER_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct Journal {
    log: Vec<u8>,
    recording: bool,
    actions: usize,
    schema: u32,
}

impl Default for Journal {
    fn default() -> Self {
        Self::new()
    }
}

impl Journal {
    pub fn new() -> Self {
        Self {
            log: Vec::new(),
            recording: false,
            actions: 0,
            schema: SCHEMA_CURRENT,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.actions == 0
    }

    /// Number of complete actions.
    #[inline]
    pub fn len(&self) -> usize {
        self.actions
    }

    #[inline]
    pub fn byte_len(&self) -> usize {
        self.log.len()
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.log
    }

    pub fn clear(&mut self) {
        self.log.clear();
        self.actions = 0;
        self.recording = false;
    }

    /// Opens a new action.
    ///
    /// Fails if an earlier action was never closed. Dropping the returned
    /// scope without calling [`ActionScope::end_action`] discards the
    /// partially written action.
    pub fn begin_action(&mut self, kind: ActionKind, object: ObjectType) -> Result<ActionScope<'_>> {
        if self.recording {
            return Err(InvariantError::NestedAction.into());
        }
        let start = self.log.len();
        self.recording = true;
        let mut scope = ActionScope {
            journal: self,
            start,
            done: false,
        };
        {
            let mut w = scope.params();
            w.raw_u8(kind as u8)?;
            w.u8(object as u8)?;
        }
        Ok(scope)
    }

    /// Appends `entry` as one complete action.
    pub fn record(&mut self, entry: &JournalEntry) -> Result<()> {
        let mut scope = self.begin_action(entry.kind(), entry.object_type())?;
        entry.encode(&mut scope.params())?;
        scope.end_action()
    }

    /// Actions in the order they were recorded, with their start offsets.
    pub fn entries(&self) -> Entries<'_> {
        Entries {
            journal: self,
            pos: 0,
            failed: false,
        }
    }

    /// Actions from the most recent to the oldest, with their start offsets.
    pub fn entries_rev(&self) -> EntriesRev<'_> {
        EntriesRev {
            journal: self,
            end: self.log.len(),
            failed: false,
        }
    }

    fn corrupt(offset: usize, reason: impl Into<String>) -> OdbError {
        InvariantError::CorruptLog {
            offset,
            reason: reason.into(),
        }
        .into()
    }

    /// Decodes the action starting at `start`, returning it and the offset
    /// just past its trailer.
    fn decode_at(&self, start: usize) -> Result<(JournalEntry, usize)> {
        let mut r = ParamReader::new(&self.log, start, self.schema);
        let code = r.raw_u8()?;
        let kind = ActionKind::from_code(code)
            .ok_or_else(|| r.corrupt(format!("unknown action kind {code}")))?;
        let code = r.u8()?;
        let object = ObjectType::from_code(code)
            .ok_or_else(|| r.corrupt(format!("unknown object type {code}")))?;
        let entry = JournalEntry::decode(kind, object, &mut r)?;
        if r.raw_u8()? != END_MARKER {
            return Err(r.corrupt("missing end marker"));
        }
        let recorded = r.raw_u32()? as usize;
        if recorded != start {
            return Err(r.corrupt(format!(
                "action starting at {start} records start offset {recorded}"
            )));
        }
        Ok((entry, r.position()))
    }

    /// Serializes the complete actions of this journal.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut w = DbWriter::new(Vec::new(), self.schema);
        w.write_header()?;
        w.write_len(self.actions)?;
        w.write_bytes(&self.log)?;
        Ok(w.into_inner())
    }

    /// Reads a journal written by [`Journal::to_bytes`], checking that every
    /// action in it decodes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut r = DbReader::open(Cursor::new(bytes), SCHEMA_INITIAL..=SCHEMA_CURRENT)?;
        let actions = r.read_len()?;
        let log = r.read_bytes()?;
        let journal = Self {
            log,
            recording: false,
            actions,
            schema: r.schema(),
        };
        let mut found = 0;
        for entry in journal.entries() {
            entry?;
            found += 1;
        }
        if found != actions {
            return Err(Self::corrupt(
                journal.log.len(),
                format!("header claims {actions} actions, log holds {found}"),
            ));
        }
        Ok(journal)
    }
}

/// An action being written.
pub struct ActionScope<'a> {
    journal: &'a mut Journal,
    start: usize,
    done: bool,
}

impl<'a> ActionScope<'a> {
    /// Offset of the action's first byte.
    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    pub fn params(&mut self) -> ParamWriter<'_> {
        ParamWriter::new(&mut self.journal.log, self.journal.schema)
    }

    /// Writes the trailer and closes the action.
    pub fn end_action(mut self) -> Result<()> {
        let start = self.start as u32;
        {
            let mut w = self.params();
            w.raw_u8(END_MARKER)?;
            w.raw_u32(start)?;
        }
        self.journal.recording = false;
        self.journal.actions += 1;
        self.done = true;
        Ok(())
    }
}

impl Drop for ActionScope<'_> {
    fn drop(&mut self) {
        if !self.done {
            error!(
                "discarding unfinished journal action at offset {}",
                self.start
            );
            self.journal.log.truncate(self.start);
            self.journal.recording = false;
        }
    }
}

pub struct Entries<'a> {
    journal: &'a Journal,
    pos: usize,
    failed: bool,
}

impl Iterator for Entries<'_> {
    type Item = Result<(usize, JournalEntry)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.journal.log.len() {
            return None;
        }
        let start = self.pos;
        match self.journal.decode_at(start) {
            Ok((entry, end)) => {
                self.pos = end;
                Some(Ok((start, entry)))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

pub struct EntriesRev<'a> {
    journal: &'a Journal,
    end: usize,
    failed: bool,
}

impl EntriesRev<'_> {
    fn step(&mut self) -> Result<(usize, JournalEntry)> {
        let log = &self.journal.log;
        let end = self.end;
        if end < TRAILER_LEN {
            return Err(Journal::corrupt(end, "truncated action trailer"));
        }
        let mut r = ParamReader::new(log, end - TRAILER_LEN, self.journal.schema);
        if r.raw_u8()? != END_MARKER {
            return Err(Journal::corrupt(end - TRAILER_LEN, "missing end marker"));
        }
        let start = r.raw_u32()? as usize;
        if start >= end - TRAILER_LEN {
            return Err(Journal::corrupt(
                end - TRAILER_LEN,
                format!("action start offset {start} is out of range"),
            ));
        }
        let (entry, decoded_end) = self.journal.decode_at(start)?;
        if decoded_end != end {
            return Err(Journal::corrupt(
                start,
                format!("action ends at {decoded_end}, trailer sits at {end}"),
            ));
        }
        self.end = start;
        Ok((start, entry))
    }
}

impl Iterator for EntriesRev<'_> {
    type Item = Result<(usize, JournalEntry)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.end == 0 {
            return None;
        }
        let item = self.step();
        self.failed = item.is_err();
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockageValue, NetId};
    use crate::geom::{Point, Rect};

    fn sample() -> Journal {
        let mut journal = Journal::new();
        journal
            .record(&JournalEntry::SetDieArea {
                old: Rect::default(),
                new: Rect::new(Point::new(0, 0), Point::new(100, 50)),
            })
            .unwrap();
        journal
            .record(&JournalEntry::AdjustCc {
                net: NetId::from_raw(3).unwrap(),
                order: 2,
                factor: 0.5,
                threshold: 1e-15,
            })
            .unwrap();
        journal
            .record(&JournalEntry::UpdateBlockage {
                blockage: dbtable::Id::from_raw(1).unwrap(),
                old: BlockageValue::MaxDensity(100.0),
                new: BlockageValue::MaxDensity(40.0),
            })
            .unwrap();
        journal
    }

    #[test]
    fn walks_both_directions() {
        let journal = sample();
        assert_eq!(journal.len(), 3);
        let forward: Vec<_> = journal.entries().map(|e| e.unwrap()).collect();
        let mut backward: Vec<_> = journal.entries_rev().map(|e| e.unwrap()).collect();
        backward.reverse();
        assert_eq!(forward, backward);
        assert_eq!(forward[0].0, 0);
        assert!(matches!(forward[1].1, JournalEntry::AdjustCc { order: 2, .. }));
    }

    #[test]
    fn abandoned_action_is_discarded() {
        let mut journal = sample();
        let len = journal.byte_len();
        {
            let mut scope = journal
                .begin_action(ActionKind::UpdateField, ObjectType::Net)
                .unwrap();
            scope.params().u32(9).unwrap();
        }
        assert_eq!(journal.byte_len(), len);
        assert_eq!(journal.len(), 3);
        assert!(journal.begin_action(ActionKind::UpdateField, ObjectType::Net).is_ok());
    }

    #[test]
    fn unclosed_action_blocks_the_next() {
        let mut journal = Journal::new();
        let scope = journal
            .begin_action(ActionKind::CreateObject, ObjectType::Net)
            .unwrap();
        std::mem::forget(scope);
        let err = journal
            .begin_action(ActionKind::CreateObject, ObjectType::Net)
            .err()
            .unwrap();
        assert!(err.is_internal_invariant());
    }

    #[test]
    fn bytes_round_trip_and_reject_damage() {
        let journal = sample();
        let bytes = journal.to_bytes().unwrap();
        assert_eq!(Journal::from_bytes(&bytes).unwrap(), journal);

        let mut damaged = bytes.clone();
        let last = damaged.len() - TRAILER_LEN;
        damaged[last] = 0;
        assert!(Journal::from_bytes(&damaged).unwrap_err().is_internal_invariant());

        // Header, action count, then the log length.
        let mut oversized = bytes.clone();
        oversized[12..16].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(Journal::from_bytes(&oversized).is_err());
    }
}
