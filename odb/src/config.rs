//! Database configuration.

use std::path::Path;

use arcstr::ArcStr;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::block::persist::SCHEMA_CURRENT;
use crate::error::Result;
use crate::io::read_to_string;

/// Settings applied to every block a [`Database`](crate::database::Database) creates.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(default)]
#[serde(default)]
pub struct DbConfig {
    /// Number of parallel RC corners modeled per block.
    pub corner_count: usize,
    /// Number of extraction databases backing those corners.
    pub ext_db_count: usize,
    /// Optional names for the corners, in corner order.
    #[builder(setter(into))]
    pub corner_names: Vec<ArcStr>,
    /// Start every new block with an active journal.
    pub journal: bool,
    /// Fold parallel coupling segments together when they are created.
    pub merge_parallel_cc: bool,
    /// Schema version emitted when writing databases.
    pub schema: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            corner_count: 1,
            ext_db_count: 1,
            corner_names: Vec::new(),
            journal: false,
            merge_parallel_cc: true,
            schema: SCHEMA_CURRENT,
        }
    }
}

impl DbConfig {
    #[inline]
    pub fn builder() -> DbConfigBuilder {
        DbConfigBuilder::default()
    }

    pub fn from_toml(input: &str) -> Result<Self> {
        let value = toml::from_str(input)?;
        Ok(value)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let input = read_to_string(path)?;
        Self::from_toml(&input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_fills_missing_fields_with_defaults() {
        let cfg = DbConfig::from_toml(
            r#"
            corner_count = 3
            corner_names = ["ss", "tt", "ff"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.corner_count, 3);
        assert_eq!(cfg.corner_names.len(), 3);
        assert!(cfg.merge_parallel_cc);
        assert_eq!(cfg.schema, SCHEMA_CURRENT);
    }

    #[test]
    fn builder_defaults_match_default() {
        let cfg = DbConfig::builder().journal(true).build().unwrap();
        assert!(cfg.journal);
        assert_eq!(cfg.corner_count, DbConfig::default().corner_count);
    }
}
