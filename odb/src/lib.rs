pub mod block;
pub mod config;
pub mod database;
pub mod error;
pub mod geom;
pub mod io;
pub mod journal;
pub mod log;
pub mod parasitics;
pub mod tech;

pub use dbtable::Id;
