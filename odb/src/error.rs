use std::fmt::{Debug, Display};
use std::path::PathBuf;

use arcstr::ArcStr;
use dbtable::{StreamError, TableError, ValueError};
use thiserror::Error;

use crate::config::DbConfigBuilderError;

pub type Result<T> = std::result::Result<T, OdbError>;

pub struct OdbError {
    pub(crate) source: ErrorSource,
    pub(crate) context: Vec<ErrorContext>,
}

impl OdbError {
    pub fn source(&self) -> &ErrorSource {
        &self.source
    }

    /// What was being done when the error occurred, innermost first.
    pub fn context(&self) -> &[ErrorContext] {
        &self.context
    }

    /// Whether this error reports a broken internal invariant rather than an
    /// expected domain condition.
    pub fn is_internal_invariant(&self) -> bool {
        matches!(self.source, ErrorSource::InternalInvariant(_))
    }
}

impl std::error::Error for OdbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl Display for OdbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Error:\n{}", self.source)?;
        if !self.context.is_empty() {
            writeln!(f, "\nError occurred:")?;
            for item in self.context.iter() {
                writeln!(f, "\twhile {}", item)?;
            }
        }
        Ok(())
    }
}

impl Debug for OdbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.source)?;
        if !self.context.is_empty() {
            writeln!(f, "\nError occurred:")?;
            for (i, item) in self.context.iter().enumerate() {
                writeln!(f, "\t{}: {:?}", i, item)?;
            }
        }
        Ok(())
    }
}

impl<T> From<T> for OdbError
where
    T: Into<ErrorSource>,
{
    fn from(value: T) -> Self {
        Self {
            source: value.into(),
            context: Vec::new(),
        }
    }
}

impl OdbError {
    pub fn new(source: impl Into<ErrorSource>) -> Self {
        Self {
            source: source.into(),
            context: Vec::new(),
        }
    }

    pub fn from_context(source: impl Into<ErrorSource>, ctx: impl Into<ErrorContext>) -> Self {
        Self {
            source: source.into(),
            context: vec![ctx.into()],
        }
    }

    pub fn with_context(mut self, ctx: impl Into<ErrorContext>) -> Self {
        self.context.push(ctx.into());
        self
    }

    #[inline]
    pub fn into_inner(self) -> ErrorSource {
        self.source
    }
}

#[inline]
pub fn with_err_context<T, E, C>(result: std::result::Result<T, E>, ctx: C) -> Result<T>
where
    C: FnOnce() -> ErrorContext,
    E: Into<OdbError>,
{
    result.map_err(|err| err.into().with_context(ctx()))
}

#[derive(Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum ErrorContext {
    CreateFile(PathBuf),
    ReadFile(PathBuf),
    /// Replaying the journal action that starts at `offset`.
    Replay {
        offset: usize,
        action: &'static str,
    },
    Block(ArcStr),
    Task(ArcStr),
}

impl Display for ErrorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use ErrorContext::*;
        match self {
            CreateFile(path) => write!(f, "creating file {path:?}"),
            ReadFile(path) => write!(f, "reading file {path:?}"),
            Replay { offset, action } => {
                write!(f, "replaying journal action {action} at offset {offset}")
            }
            Block(name) => write!(f, "operating on block {name}"),
            Task(task) => write!(f, "{task}"),
        }
    }
}

/// A broken internal invariant.
///
/// These never describe an expected condition of the design; they indicate a
/// programming error or corrupted data and must not be silently recovered.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum InvariantError {
    #[error("a journal action is already being recorded")]
    NestedAction,

    #[error("corrupt journal at offset {offset}: {reason}")]
    CorruptLog { offset: usize, reason: String },

    #[error("undo is not supported for journal action {0}")]
    UnsupportedUndo(&'static str),

    #[error("{kind} {id} is still referenced by {by}")]
    StillReferenced {
        kind: &'static str,
        id: u32,
        by: &'static str,
    },

    #[error("resistance segments do not form a single path: {0}")]
    BrokenPath(String),

    #[error("{0}")]
    Other(String),
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorSource {
    #[error("{0}")]
    Table(#[from] TableError),

    #[error("error accessing corner values: {0}")]
    Value(#[from] ValueError),

    #[error("error reading or writing database stream: {0}")]
    Stream(#[from] StreamError),

    #[error("internal invariant violated: {0}")]
    InternalInvariant(#[from] InvariantError),

    #[error("{kind} named `{name}` already exists")]
    NameConflict { kind: &'static str, name: ArcStr },

    #[error("no {kind} named `{name}`")]
    NotFound { kind: &'static str, name: ArcStr },

    #[error("no such block")]
    BlockNotFound,

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("error parsing TOML: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("invalid name pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("incomplete configuration: {0}")]
    Config(#[from] DbConfigBuilderError),
}
