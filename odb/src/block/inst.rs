use std::sync::Arc;

use arcstr::ArcStr;
use dbtable::{Id, Record};

use super::{BlockageId, Block, NetId};
use crate::error::{ErrorSource, InvariantError, Result};
use crate::geom::{Orientation, Point};
use crate::journal::JournalEntry;
use crate::tech::{MTerm, Master};

pub type InstId = Id<Inst>;
pub type ITermId = Id<ITerm>;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum PlacementStatus {
    #[default]
    None,
    Unplaced,
    Suggested,
    Placed,
    Locked,
    Firm,
    Cover,
}

impl PlacementStatus {
    const ALL: [PlacementStatus; 7] = [
        Self::None,
        Self::Unplaced,
        Self::Suggested,
        Self::Placed,
        Self::Locked,
        Self::Firm,
        Self::Cover,
    ];

    #[inline]
    pub(crate) fn code(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// Whether the instance has a location.
    #[inline]
    pub fn is_placed(self) -> bool {
        !matches!(self, Self::None | Self::Unplaced)
    }
}

/// An instance of a library [`Master`].
#[derive(Debug, Clone, PartialEq)]
pub struct Inst {
    pub(crate) name: ArcStr,
    pub(crate) master: ArcStr,
    pub(crate) location: Point,
    pub(crate) orientation: Orientation,
    pub(crate) status: PlacementStatus,
    pub(crate) dont_touch: bool,
    /// One terminal per pin of the master, in pin order.
    pub(crate) iterms: Vec<ITermId>,
}

impl Record for Inst {
    const KIND: &'static str = "instance";

    fn clear_links(&mut self) {
        self.iterms.clear();
    }
}

impl Inst {
    pub(crate) fn new(name: ArcStr, master: ArcStr) -> Self {
        Self {
            name,
            master,
            location: Point::zero(),
            orientation: Orientation::R0,
            status: PlacementStatus::None,
            dont_touch: false,
            iterms: Vec::new(),
        }
    }

    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    #[inline]
    pub fn master_name(&self) -> &ArcStr {
        &self.master
    }

    #[inline]
    pub fn location(&self) -> Point {
        self.location
    }

    #[inline]
    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    #[inline]
    pub fn status(&self) -> PlacementStatus {
        self.status
    }

    #[inline]
    pub fn is_dont_touch(&self) -> bool {
        self.dont_touch
    }

    #[inline]
    pub fn iterms(&self) -> &[ITermId] {
        &self.iterms
    }

    fn field(&self, like: &InstValue) -> InstValue {
        match like {
            InstValue::Name(_) => InstValue::Name(self.name.clone()),
            InstValue::Location(_) => InstValue::Location(self.location),
            InstValue::Orientation(_) => InstValue::Orientation(self.orientation),
            InstValue::Status(_) => InstValue::Status(self.status),
            InstValue::DontTouch(_) => InstValue::DontTouch(self.dont_touch),
        }
    }

    fn set_field(&mut self, value: InstValue) {
        match value {
            InstValue::Name(name) => self.name = name,
            InstValue::Location(location) => self.location = location,
            InstValue::Orientation(orientation) => self.orientation = orientation,
            InstValue::Status(status) => self.status = status,
            InstValue::DontTouch(dont_touch) => self.dont_touch = dont_touch,
        }
    }
}

/// A journaled instance attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum InstValue {
    Name(ArcStr),
    Location(Point),
    Orientation(Orientation),
    Status(PlacementStatus),
    DontTouch(bool),
}

/// A pin of an instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ITerm {
    pub(crate) inst: InstId,
    pub(crate) mterm: u32,
    pub(crate) net: Option<NetId>,
}

impl Record for ITerm {
    const KIND: &'static str = "instance terminal";

    fn clear_links(&mut self) {
        self.net = None;
    }
}

impl ITerm {
    #[inline]
    pub fn inst(&self) -> InstId {
        self.inst
    }

    /// Index of the pin in the master's pin list.
    #[inline]
    pub fn mterm_index(&self) -> usize {
        self.mterm as usize
    }

    #[inline]
    pub fn net(&self) -> Option<NetId> {
        self.net
    }
}

impl Block {
    /// Places a new instance of `master`, with one unconnected terminal per pin.
    pub fn create_inst(&mut self, master: &Arc<Master>, name: impl Into<ArcStr>) -> Result<InstId> {
        self.register_master(master);
        let inst = self.insert_inst(None, Inst::new(name.into(), master.name().clone()))?;
        let record = self.insts.get(inst)?.clone();
        self.record(|| JournalEntry::CreateInst { inst, record })?;
        Ok(inst)
    }

    /// Inserts an instance and its terminals.
    ///
    /// If `record` lists terminal handles they are reused, otherwise fresh
    /// ones are allocated.
    pub(crate) fn insert_inst(&mut self, id: Option<InstId>, mut record: Inst) -> Result<InstId> {
        if self.inst_names.contains(&record.name) {
            return Err(ErrorSource::NameConflict {
                kind: Inst::KIND,
                name: record.name,
            }
            .into());
        }
        let pins = self.master(&record.master)?.mterms().len();
        let wanted: Vec<Option<ITermId>> = match record.iterms.len() {
            0 => vec![None; pins],
            n if n == pins => record.iterms.iter().copied().map(Some).collect(),
            n => {
                return Err(ErrorSource::InvalidArgs(format!(
                    "instance {} lists {n} terminals but its master has {pins} pins",
                    record.name
                ))
                .into());
            }
        };
        if let Some(id) = id {
            if self.insts.contains(id) {
                return Err(dbtable::TableError::Occupied {
                    kind: Inst::KIND,
                    id: id.raw(),
                }
                .into());
            }
        }
        if let Some(taken) = wanted.iter().flatten().find(|id| self.iterms.contains(**id)) {
            return Err(dbtable::TableError::Occupied {
                kind: ITerm::KIND,
                id: taken.raw(),
            }
            .into());
        }

        record.iterms.clear();
        let name = record.name.clone();
        let inst = match id {
            Some(id) => {
                self.insts.create_at(id, record)?;
                id
            }
            None => self.insts.create(record)?,
        };
        let mut iterms = Vec::with_capacity(pins);
        for (mterm, slot) in wanted.into_iter().enumerate() {
            let iterm = ITerm {
                inst,
                mterm: mterm as u32,
                net: None,
            };
            let iterm = match slot {
                Some(id) => {
                    self.iterms.create_at(id, iterm)?;
                    id
                }
                None => self.iterms.create(iterm)?,
            };
            iterms.push(iterm);
        }
        self.insts.get_mut(inst)?.iterms = iterms;
        self.inst_names
            .insert(name.clone(), inst)
            .map_err(|_| ErrorSource::NameConflict { kind: Inst::KIND, name })?;
        self.global_connect.invalidate();
        Ok(inst)
    }

    /// Disconnects the terminals of `inst`, destroys the blockages attached
    /// to it, then destroys the instance and its terminals.
    pub fn destroy_inst(&mut self, inst: InstId) -> Result<()> {
        let iterms = self.insts.get(inst)?.iterms.clone();
        for iterm in iterms {
            self.disconnect_iterm(iterm)?;
        }
        let attached: Vec<BlockageId> = self
            .blockages
            .iter()
            .filter(|(_, b)| b.inst() == Some(inst))
            .map(|(id, _)| id)
            .collect();
        for blockage in attached {
            self.destroy_blockage(blockage)?;
        }
        let record = self.remove_inst(inst)?;
        self.record(|| JournalEntry::DestroyInst { inst, record })
    }

    /// Frees an instance whose terminals are all disconnected. The returned
    /// record keeps its terminal handles.
    pub(crate) fn remove_inst(&mut self, inst: InstId) -> Result<Inst> {
        let record = self.insts.get(inst)?;
        for iterm in record.iterms.iter() {
            if self.iterms.get(*iterm)?.net.is_some() {
                return Err(InvariantError::StillReferenced {
                    kind: ITerm::KIND,
                    id: iterm.raw(),
                    by: "a net",
                }
                .into());
            }
        }
        for iterm in record.iterms.iter() {
            self.iterms.destroy(*iterm)?;
        }
        self.inst_names.remove(&record.name, inst);
        let record = self.insts.destroy(inst)?;
        self.global_connect.invalidate();
        Ok(record)
    }

    #[inline]
    pub fn inst(&self, inst: InstId) -> Result<&Inst> {
        Ok(self.insts.get(inst)?)
    }

    #[inline]
    pub fn find_inst(&self, name: &str) -> Option<InstId> {
        self.inst_names.get(name)
    }

    /// Instances in handle order.
    pub fn insts(&self) -> impl Iterator<Item = (InstId, &Inst)> + '_ {
        self.insts.iter()
    }

    #[inline]
    pub fn inst_count(&self) -> usize {
        self.insts.len()
    }

    pub fn inst_master(&self, inst: InstId) -> Result<&Arc<Master>> {
        let record = self.insts.get(inst)?;
        self.master(&record.master)
    }

    pub fn rename_inst(&mut self, inst: InstId, name: impl Into<ArcStr>) -> Result<()> {
        self.update_inst(inst, InstValue::Name(name.into()))
    }

    pub fn set_inst_location(&mut self, inst: InstId, location: Point) -> Result<()> {
        self.update_inst(inst, InstValue::Location(location))
    }

    pub fn set_inst_orientation(&mut self, inst: InstId, orientation: Orientation) -> Result<()> {
        self.update_inst(inst, InstValue::Orientation(orientation))
    }

    pub fn set_inst_status(&mut self, inst: InstId, status: PlacementStatus) -> Result<()> {
        self.update_inst(inst, InstValue::Status(status))
    }

    pub fn set_inst_dont_touch(&mut self, inst: InstId, dont_touch: bool) -> Result<()> {
        self.update_inst(inst, InstValue::DontTouch(dont_touch))
    }

    fn update_inst(&mut self, inst: InstId, value: InstValue) -> Result<()> {
        let new = value.clone();
        let old = self.apply_inst_value(inst, value)?;
        self.record(|| JournalEntry::UpdateInst { inst, old, new })
    }

    pub(crate) fn apply_inst_value(&mut self, inst: InstId, value: InstValue) -> Result<InstValue> {
        let record = self.insts.get(inst)?;
        let old = record.field(&value);
        if let InstValue::Name(name) = &value {
            self.inst_names
                .rename(&record.name, name.clone(), inst)
                .map_err(|_| ErrorSource::NameConflict {
                    kind: Inst::KIND,
                    name: name.clone(),
                })?;
        }
        if matches!(value, InstValue::Name(_) | InstValue::Location(_)) {
            self.global_connect.invalidate();
        }
        self.insts.get_mut(inst)?.set_field(value);
        Ok(old)
    }

    #[inline]
    pub fn iterm(&self, iterm: ITermId) -> Result<&ITerm> {
        Ok(self.iterms.get(iterm)?)
    }

    /// The library pin behind an instance terminal.
    pub fn iterm_mterm(&self, iterm: ITermId) -> Result<&MTerm> {
        let record = self.iterms.get(iterm)?;
        let master = self.inst_master(record.inst)?;
        master.mterms().get(record.mterm as usize).ok_or_else(|| {
            InvariantError::Other(format!(
                "{iterm:?} refers to pin {} of master {} with {} pins",
                record.mterm,
                master.name(),
                master.mterms().len()
            ))
            .into()
        })
    }

    /// The terminal of `inst` for the pin named `pin`.
    pub fn find_iterm(&self, inst: InstId, pin: &str) -> Result<Option<ITermId>> {
        let record = self.insts.get(inst)?;
        let index = self.master(&record.master)?.mterm_index(pin);
        Ok(index.and_then(|i| record.iterms.get(i).copied()))
    }

    /// Connects `iterm` to `net`, first disconnecting it from any other net.
    pub fn connect_iterm(&mut self, iterm: ITermId, net: NetId) -> Result<()> {
        match self.iterms.get(iterm)?.net {
            Some(current) if current == net => return Ok(()),
            Some(_) => self.disconnect_iterm(iterm)?,
            None => {}
        }
        self.attach_iterm(iterm, net)?;
        self.record(|| JournalEntry::ConnectITerm { iterm, net })
    }

    pub fn disconnect_iterm(&mut self, iterm: ITermId) -> Result<()> {
        if let Some(net) = self.detach_iterm(iterm)? {
            self.record(|| JournalEntry::DisconnectITerm { iterm, net })?;
        }
        Ok(())
    }

    pub(crate) fn attach_iterm(&mut self, iterm: ITermId, net: NetId) -> Result<()> {
        self.nets.get(net)?;
        let record = self.iterms.get_mut(iterm)?;
        if let Some(current) = record.net {
            return Err(ErrorSource::InvalidArgs(format!(
                "{iterm:?} is already connected to {current:?}"
            ))
            .into());
        }
        record.net = Some(net);
        self.nets.get_mut(net)?.iterms.push(iterm);
        Ok(())
    }

    pub(crate) fn detach_iterm(&mut self, iterm: ITermId) -> Result<Option<NetId>> {
        let Some(net) = self.iterms.get_mut(iterm)?.net.take() else {
            return Ok(None);
        };
        self.nets.get_mut(net)?.iterms.retain(|i| *i != iterm);
        Ok(Some(net))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placement_status_codes() {
        for s in PlacementStatus::ALL {
            assert_eq!(PlacementStatus::from_code(s.code()), Some(s));
        }
        assert!(PlacementStatus::Firm.is_placed());
        assert!(!PlacementStatus::Unplaced.is_placed());
    }
}
