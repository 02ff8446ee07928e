use arcstr::ArcStr;
use dbtable::{Id, Record};

use super::{Block, NetId};
use crate::error::{ErrorSource, InvariantError, Result};
use crate::journal::JournalEntry;
use crate::tech::{IoType, SigType};

pub type BTermId = Id<BTerm>;

/// A terminal of the block itself.
#[derive(Debug, Clone, PartialEq)]
pub struct BTerm {
    pub(crate) name: ArcStr,
    pub(crate) net: Option<NetId>,
    pub(crate) io_type: IoType,
    pub(crate) sig_type: SigType,
}

impl Record for BTerm {
    const KIND: &'static str = "block terminal";

    fn clear_links(&mut self) {
        self.net = None;
    }
}

impl BTerm {
    pub(crate) fn new(name: ArcStr) -> Self {
        Self {
            name,
            net: None,
            io_type: IoType::InOut,
            sig_type: SigType::Signal,
        }
    }

    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    #[inline]
    pub fn net(&self) -> Option<NetId> {
        self.net
    }

    #[inline]
    pub fn io_type(&self) -> IoType {
        self.io_type
    }

    #[inline]
    pub fn sig_type(&self) -> SigType {
        self.sig_type
    }
}

/// A journaled block terminal attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum BTermValue {
    IoType(IoType),
    SigType(SigType),
}

impl Block {
    /// Creates a terminal named `name` and connects it to `net`.
    pub fn create_bterm(&mut self, net: NetId, name: impl Into<ArcStr>) -> Result<BTermId> {
        self.nets.get(net)?;
        let record = BTerm::new(name.into());
        let bterm = self.insert_bterm(None, record.clone())?;
        self.record(|| JournalEntry::CreateBTerm { bterm, record })?;
        self.connect_bterm(bterm, net)?;
        Ok(bterm)
    }

    pub(crate) fn insert_bterm(&mut self, id: Option<BTermId>, mut record: BTerm) -> Result<BTermId> {
        if self.bterm_names.contains(&record.name) {
            return Err(ErrorSource::NameConflict {
                kind: BTerm::KIND,
                name: record.name,
            }
            .into());
        }
        record.net = None;
        let name = record.name.clone();
        let bterm = match id {
            Some(id) => {
                self.bterms.create_at(id, record)?;
                id
            }
            None => self.bterms.create(record)?,
        };
        self.bterm_names
            .insert(name.clone(), bterm)
            .map_err(|_| ErrorSource::NameConflict { kind: BTerm::KIND, name })?;
        Ok(bterm)
    }

    pub fn destroy_bterm(&mut self, bterm: BTermId) -> Result<()> {
        self.disconnect_bterm(bterm)?;
        let record = self.remove_bterm(bterm)?;
        self.record(|| JournalEntry::DestroyBTerm { bterm, record })
    }

    pub(crate) fn remove_bterm(&mut self, bterm: BTermId) -> Result<BTerm> {
        let record = self.bterms.get(bterm)?;
        if record.net.is_some() {
            return Err(InvariantError::StillReferenced {
                kind: BTerm::KIND,
                id: bterm.raw(),
                by: "a net",
            }
            .into());
        }
        self.bterm_names.remove(&record.name, bterm);
        Ok(self.bterms.destroy(bterm)?)
    }

    #[inline]
    pub fn bterm(&self, bterm: BTermId) -> Result<&BTerm> {
        Ok(self.bterms.get(bterm)?)
    }

    #[inline]
    pub fn find_bterm(&self, name: &str) -> Option<BTermId> {
        self.bterm_names.get(name)
    }

    pub fn bterms(&self) -> impl Iterator<Item = (BTermId, &BTerm)> + '_ {
        self.bterms.iter()
    }

    pub fn connect_bterm(&mut self, bterm: BTermId, net: NetId) -> Result<()> {
        match self.bterms.get(bterm)?.net {
            Some(current) if current == net => return Ok(()),
            Some(_) => self.disconnect_bterm(bterm)?,
            None => {}
        }
        self.attach_bterm(bterm, net)?;
        self.record(|| JournalEntry::ConnectBTerm { bterm, net })
    }

    pub fn disconnect_bterm(&mut self, bterm: BTermId) -> Result<()> {
        if let Some(net) = self.detach_bterm(bterm)? {
            self.record(|| JournalEntry::DisconnectBTerm { bterm, net })?;
        }
        Ok(())
    }

    pub(crate) fn attach_bterm(&mut self, bterm: BTermId, net: NetId) -> Result<()> {
        self.nets.get(net)?;
        let record = self.bterms.get_mut(bterm)?;
        if let Some(current) = record.net {
            return Err(ErrorSource::InvalidArgs(format!(
                "{bterm:?} is already connected to {current:?}"
            ))
            .into());
        }
        record.net = Some(net);
        self.nets.get_mut(net)?.bterms.push(bterm);
        Ok(())
    }

    pub(crate) fn detach_bterm(&mut self, bterm: BTermId) -> Result<Option<NetId>> {
        let Some(net) = self.bterms.get_mut(bterm)?.net.take() else {
            return Ok(None);
        };
        self.nets.get_mut(net)?.bterms.retain(|b| *b != bterm);
        Ok(Some(net))
    }

    pub fn set_bterm_io_type(&mut self, bterm: BTermId, io_type: IoType) -> Result<()> {
        self.update_bterm(bterm, BTermValue::IoType(io_type))
    }

    pub fn set_bterm_sig_type(&mut self, bterm: BTermId, sig_type: SigType) -> Result<()> {
        self.update_bterm(bterm, BTermValue::SigType(sig_type))
    }

    fn update_bterm(&mut self, bterm: BTermId, value: BTermValue) -> Result<()> {
        let new = value.clone();
        let old = self.apply_bterm_value(bterm, value)?;
        self.record(|| JournalEntry::UpdateBTerm { bterm, old, new })
    }

    pub(crate) fn apply_bterm_value(&mut self, bterm: BTermId, value: BTermValue) -> Result<BTermValue> {
        let record = self.bterms.get_mut(bterm)?;
        Ok(match value {
            BTermValue::IoType(io) => BTermValue::IoType(std::mem::replace(&mut record.io_type, io)),
            BTermValue::SigType(sig) => {
                BTermValue::SigType(std::mem::replace(&mut record.sig_type, sig))
            }
        })
    }
}
