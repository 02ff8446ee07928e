use arcstr::ArcStr;

use super::Block;
use crate::config::DbConfig;
use crate::error::{ErrorSource, Result};
use crate::journal::JournalEntry;
use crate::log::info;

/// How many RC corners a block carries and what they are called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CornerInfo {
    pub(crate) count: usize,
    pub(crate) ext_db_count: usize,
    pub(crate) names: Vec<ArcStr>,
}

impl Default for CornerInfo {
    fn default() -> Self {
        Self {
            count: 1,
            ext_db_count: 1,
            names: Vec::new(),
        }
    }
}

impl CornerInfo {
    pub fn new(count: usize, ext_db_count: usize, names: Vec<ArcStr>) -> Result<Self> {
        if count == 0 {
            return Err(ErrorSource::InvalidArgs("a block needs at least one corner".to_string()).into());
        }
        if !names.is_empty() && names.len() != count {
            return Err(ErrorSource::InvalidArgs(format!(
                "{} corner names for {count} corners",
                names.len()
            ))
            .into());
        }
        Ok(Self {
            count,
            ext_db_count: ext_db_count.max(1),
            names,
        })
    }

    /// Falls back to a single corner when the config is inconsistent.
    pub(crate) fn from_config(config: &DbConfig) -> Self {
        Self::new(
            config.corner_count,
            config.ext_db_count,
            config.corner_names.clone(),
        )
        .unwrap_or_default()
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn ext_db_count(&self) -> usize {
        self.ext_db_count
    }

    #[inline]
    pub fn names(&self) -> &[ArcStr] {
        &self.names
    }

    /// Index of the corner called `name`.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

impl Block {
    #[inline]
    pub fn corners(&self) -> &CornerInfo {
        &self.corners
    }

    #[inline]
    pub fn corner_count(&self) -> usize {
        self.corners.count
    }

    pub(crate) fn check_corner(&self, corner: usize) -> Result<()> {
        if corner >= self.corners.count {
            return Err(ErrorSource::InvalidArgs(format!(
                "corner {corner} out of range for block {} with {} corners",
                self.name(),
                self.corners.count
            ))
            .into());
        }
        Ok(())
    }

    /// Changes the number of corners.
    ///
    /// Every resistance, capacitance and coupling value of the block is reset
    /// to zero. The change is journaled but cannot be undone.
    pub fn set_corner_count(
        &mut self,
        count: usize,
        ext_db_count: usize,
        names: Vec<ArcStr>,
    ) -> Result<()> {
        let info = CornerInfo::new(count, ext_db_count, names)?;
        let old = self.apply_corners(info.clone())?;
        self.record(|| JournalEntry::SetCorners { old, new: info })
    }

    pub(crate) fn apply_corners(&mut self, info: CornerInfo) -> Result<CornerInfo> {
        let count = info.count;
        for values in [
            &mut self.res_values,
            &mut self.cap_values,
            &mut self.cc_values,
            &mut self.node_values,
        ] {
            values.reinit(count);
        }
        for id in self.rsegs.ids() {
            self.res_values.alloc(id.raw(), 0.0)?;
            self.cap_values.alloc(id.raw(), 0.0)?;
        }
        for id in self.cc_segs.ids() {
            self.cc_values.alloc(id.raw(), 0.0)?;
        }
        for id in self.cap_nodes.ids() {
            self.node_values.alloc(id.raw(), 0.0)?;
        }
        info!("block {} now has {count} corners", self.name());
        Ok(std::mem::replace(&mut self.corners, info))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corner_names_must_match_count() {
        assert!(CornerInfo::new(2, 1, vec!["ss".into()]).is_err());
        assert!(CornerInfo::new(0, 1, Vec::new()).is_err());
        let info = CornerInfo::new(2, 0, vec!["ss".into(), "ff".into()]).unwrap();
        assert_eq!(info.find("ff"), Some(1));
        assert_eq!(info.ext_db_count(), 1);
    }
}
