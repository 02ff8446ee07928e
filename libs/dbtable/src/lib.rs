//! Storage primitives for the design database.
//!
//! Every database object lives in a [`Table`] and is addressed by a typed,
//! 1-based [`Id`]. Per-corner scalar data (resistance, capacitance) lives in
//! [`PagedValues`], named objects are found through a [`NameIndex`], and all
//! of it can be written to and read from a versioned binary stream
//! ([`DbWriter`]/[`DbReader`]).

pub mod error;
pub mod id;
pub mod name_index;
pub mod paged;
pub mod stream;
pub mod table;

pub use error::{StreamError, TableError, ValueError};
pub use id::Id;
pub use name_index::NameIndex;
pub use paged::PagedValues;
pub use stream::{DbReader, DbWriter, Persist};
pub use table::{Record, Table};
