//! Error types for tables, value pages and streams.

use thiserror::Error;

/// An error accessing a [`Table`](crate::Table).
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum TableError {
    #[error("invalid {kind} handle {id}")]
    InvalidHandle { kind: &'static str, id: u32 },

    #[error("{kind} slot {id} is already occupied")]
    Occupied { kind: &'static str, id: u32 },

    #[error("{kind} table is full")]
    Full { kind: &'static str },
}

/// An error accessing a [`PagedValues`](crate::PagedValues) table.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum ValueError {
    /// A freshly appended block of slots did not land where the index formula
    /// says it must.
    #[error("value slots misaligned: expected index {expected}, got {got}")]
    Misaligned { expected: usize, got: usize },

    #[error("no value slot allocated for record {id} at corner {corner}")]
    Unallocated { id: u32, corner: usize },
}

/// An error reading or writing a binary database stream.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a database stream (bad magic number)")]
    BadMagic,

    #[error("unsupported schema version {found} (supported {min}..={max})")]
    UnsupportedSchema { found: u32, min: u32, max: u32 },

    #[error("invalid utf-8 in stored string: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("invalid {what} tag {tag}")]
    InvalidTag { what: &'static str, tag: u8 },

    #[error("invalid {what}: {value}")]
    InvalidValue { what: &'static str, value: u64 },

    #[error("null handle where a handle is required")]
    NullHandle,

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Value(#[from] ValueError),
}
