use dbtable::{Id, Record};

use super::{Block, InstId};
use crate::error::{ErrorSource, Result};
use crate::geom::Rect;
use crate::journal::JournalEntry;

pub type BlockageId = Id<Blockage>;

/// A placement blockage.
#[derive(Debug, Clone, PartialEq)]
pub struct Blockage {
    pub(crate) rect: Rect,
    pub(crate) inst: Option<InstId>,
    pub(crate) soft: bool,
    /// Maximum placement density inside the blockage, in percent.
    pub(crate) max_density: f64,
}

impl Record for Blockage {
    const KIND: &'static str = "blockage";
}

impl Blockage {
    pub(crate) fn new(rect: Rect, inst: Option<InstId>) -> Self {
        Self {
            rect,
            inst,
            soft: false,
            max_density: 0.0,
        }
    }

    #[inline]
    pub fn rect(&self) -> Rect {
        self.rect
    }

    /// The instance the blockage belongs to, if any.
    #[inline]
    pub fn inst(&self) -> Option<InstId> {
        self.inst
    }

    #[inline]
    pub fn is_soft(&self) -> bool {
        self.soft
    }

    #[inline]
    pub fn max_density(&self) -> f64 {
        self.max_density
    }
}

/// A journaled blockage attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockageValue {
    Soft(bool),
    MaxDensity(f64),
}

impl Block {
    pub fn create_blockage(&mut self, rect: Rect, inst: Option<InstId>) -> Result<BlockageId> {
        let record = Blockage::new(rect, inst);
        let blockage = self.insert_blockage(None, record.clone())?;
        self.record(|| JournalEntry::CreateBlockage { blockage, record })?;
        Ok(blockage)
    }

    pub(crate) fn insert_blockage(&mut self, id: Option<BlockageId>, record: Blockage) -> Result<BlockageId> {
        if let Some(inst) = record.inst {
            self.insts.get(inst)?;
        }
        Ok(match id {
            Some(id) => {
                self.blockages.create_at(id, record)?;
                id
            }
            None => self.blockages.create(record)?,
        })
    }

    pub fn destroy_blockage(&mut self, blockage: BlockageId) -> Result<()> {
        let record = self.blockages.destroy(blockage)?;
        self.record(|| JournalEntry::DestroyBlockage { blockage, record })
    }

    #[inline]
    pub fn blockage(&self, blockage: BlockageId) -> Result<&Blockage> {
        Ok(self.blockages.get(blockage)?)
    }

    pub fn blockages(&self) -> impl Iterator<Item = (BlockageId, &Blockage)> + '_ {
        self.blockages.iter()
    }

    pub fn set_blockage_soft(&mut self, blockage: BlockageId, soft: bool) -> Result<()> {
        self.update_blockage(blockage, BlockageValue::Soft(soft))
    }

    pub fn set_blockage_max_density(&mut self, blockage: BlockageId, density: f64) -> Result<()> {
        if !(0.0..=100.0).contains(&density) {
            return Err(ErrorSource::InvalidArgs(format!(
                "blockage density must be between 0 and 100 percent, got {density}"
            ))
            .into());
        }
        self.update_blockage(blockage, BlockageValue::MaxDensity(density))
    }

    fn update_blockage(&mut self, blockage: BlockageId, value: BlockageValue) -> Result<()> {
        let new = value.clone();
        let old = self.apply_blockage_value(blockage, value)?;
        self.record(|| JournalEntry::UpdateBlockage { blockage, old, new })
    }

    pub(crate) fn apply_blockage_value(
        &mut self,
        blockage: BlockageId,
        value: BlockageValue,
    ) -> Result<BlockageValue> {
        let record = self.blockages.get_mut(blockage)?;
        Ok(match value {
            BlockageValue::Soft(soft) => BlockageValue::Soft(std::mem::replace(&mut record.soft, soft)),
            BlockageValue::MaxDensity(density) => {
                BlockageValue::MaxDensity(std::mem::replace(&mut record.max_density, density))
            }
        })
    }
}
