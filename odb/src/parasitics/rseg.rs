use dbtable::{Id, Record};

use super::CapNodeId;
use crate::block::{Block, NetId};
use crate::error::{ErrorSource, InvariantError, Result};
use crate::geom::Point;
use crate::journal::JournalEntry;

pub type RSegId = Id<RSeg>;

/// A resistance segment between two cap-nodes of a net.
#[derive(Debug, Clone, PartialEq)]
pub struct RSeg {
    pub(crate) net: NetId,
    pub(crate) next: Option<RSegId>,
    pub(crate) source: Option<CapNodeId>,
    pub(crate) target: Option<CapNodeId>,
    pub(crate) coords: Point,
    pub(crate) path_dir: bool,
    pub(crate) allocated_cap: bool,
}

impl Record for RSeg {
    const KIND: &'static str = "resistance segment";

    fn clear_links(&mut self) {
        self.next = None;
    }
}

impl RSeg {
    pub(crate) fn new(
        net: NetId,
        source: Option<CapNodeId>,
        target: Option<CapNodeId>,
        coords: Point,
        allocated_cap: bool,
    ) -> Self {
        Self {
            net,
            next: None,
            source,
            target,
            coords,
            path_dir: false,
            allocated_cap,
        }
    }

    #[inline]
    pub fn net(&self) -> NetId {
        self.net
    }

    #[inline]
    pub fn next(&self) -> Option<RSegId> {
        self.next
    }

    #[inline]
    pub fn source(&self) -> Option<CapNodeId> {
        self.source
    }

    #[inline]
    pub fn target(&self) -> Option<CapNodeId> {
        self.target
    }

    #[inline]
    pub fn coords(&self) -> Point {
        self.coords
    }

    #[inline]
    pub fn path_dir(&self) -> bool {
        self.path_dir
    }

    /// Whether the segment stores its own capacitance. When it does not, its
    /// capacitance is that of its target cap-node.
    #[inline]
    pub fn allocated_cap(&self) -> bool {
        self.allocated_cap
    }
}

/// A journaled resistance segment attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum RSegValue {
    Source(Option<CapNodeId>),
    Target(Option<CapNodeId>),
    Coords(Point),
    PathDir(bool),
    Res { corner: usize, value: f64 },
    /// Locally allocated capacitance.
    Cap { corner: usize, value: f64 },
}

impl Block {
    /// Creates a resistance segment at the front of `net`'s chain.
    pub fn create_rseg(
        &mut self,
        net: NetId,
        source: Option<CapNodeId>,
        target: Option<CapNodeId>,
        coords: Point,
        allocate_cap: bool,
    ) -> Result<RSegId> {
        let record = RSeg::new(net, source, target, coords, allocate_cap);
        let rseg = self.insert_rseg(None, record.clone(), None)?;
        self.record(|| JournalEntry::CreateRSeg { rseg, record })?;
        Ok(rseg)
    }

    pub(crate) fn insert_rseg(
        &mut self,
        id: Option<RSegId>,
        mut record: RSeg,
        values: Option<(&[f64], &[f64])>,
    ) -> Result<RSegId> {
        let net = record.net;
        for node in [record.source, record.target].into_iter().flatten() {
            self.check_node_on_net(node, net)?;
        }
        record.next = self.nets.get(net)?.first_rseg;
        let rseg = match id {
            Some(id) => {
                self.rsegs.create_at(id, record)?;
                id
            }
            None => self.rsegs.create(record)?,
        };
        self.res_values.alloc(rseg.raw(), 0.0)?;
        self.cap_values.alloc(rseg.raw(), 0.0)?;
        if let Some((res, cap)) = values {
            self.res_values.set_record(rseg.raw(), res)?;
            self.cap_values.set_record(rseg.raw(), cap)?;
        }
        self.nets.get_mut(net)?.first_rseg = Some(rseg);
        Ok(rseg)
    }

    pub fn destroy_rseg(&mut self, rseg: RSegId) -> Result<()> {
        let (record, res, cap) = self.remove_rseg(rseg)?;
        self.record(|| JournalEntry::DestroyRSeg {
            rseg,
            record,
            res,
            cap,
        })
    }

    pub(crate) fn remove_rseg(&mut self, rseg: RSegId) -> Result<(RSeg, Vec<f64>, Vec<f64>)> {
        let record = self.rsegs.get(rseg)?;
        let (net, next) = (record.net, record.next);
        self.unlink_rseg(net, rseg, next)?;
        let res = self.res_values.record(rseg.raw());
        let cap = self.cap_values.record(rseg.raw());
        let mut record = self.rsegs.destroy(rseg)?;
        record.clear_links();
        Ok((record, res, cap))
    }

    fn unlink_rseg(&mut self, net: NetId, rseg: RSegId, next: Option<RSegId>) -> Result<()> {
        let head = self.nets.get(net)?.first_rseg;
        if head == Some(rseg) {
            self.nets.get_mut(net)?.first_rseg = next;
            return Ok(());
        }
        let mut cursor = head;
        while let Some(cur) = cursor {
            let cur_next = self.rsegs.get(cur)?.next;
            if cur_next == Some(rseg) {
                self.rsegs.get_mut(cur)?.next = next;
                return Ok(());
            }
            cursor = cur_next;
        }
        Err(InvariantError::Other(format!("{rseg:?} is not in the chain of {net:?}")).into())
    }

    fn check_node_on_net(&self, node: CapNodeId, net: NetId) -> Result<()> {
        if self.cap_nodes.get(node)?.net != net {
            return Err(ErrorSource::InvalidArgs(format!(
                "{node:?} does not belong to {net:?}"
            ))
            .into());
        }
        Ok(())
    }

    #[inline]
    pub fn rseg(&self, rseg: RSegId) -> Result<&RSeg> {
        Ok(self.rsegs.get(rseg)?)
    }

    pub fn rseg_res(&self, rseg: RSegId, corner: usize) -> Result<f64> {
        self.check_corner(corner)?;
        self.rsegs.get(rseg)?;
        Ok(self.res_values.get(rseg.raw(), corner))
    }

    pub fn set_rseg_res(&mut self, rseg: RSegId, corner: usize, value: f64) -> Result<()> {
        self.update_rseg(rseg, RSegValue::Res { corner, value })
    }

    pub fn add_rseg_res(&mut self, rseg: RSegId, corner: usize, delta: f64) -> Result<()> {
        let value = self.rseg_res(rseg, corner)? + delta;
        self.set_rseg_res(rseg, corner, value)
    }

    /// Capacitance of the segment, forwarded to the target cap-node when the
    /// segment does not allocate its own.
    pub fn rseg_cap(&self, rseg: RSegId, corner: usize) -> Result<f64> {
        self.check_corner(corner)?;
        let record = self.rsegs.get(rseg)?;
        if record.allocated_cap {
            return Ok(self.cap_values.get(rseg.raw(), corner));
        }
        match record.target {
            Some(target) => self.cap_node_cap(target, corner),
            None => Ok(0.0),
        }
    }

    pub fn set_rseg_cap(&mut self, rseg: RSegId, corner: usize, value: f64) -> Result<()> {
        let record = self.rsegs.get(rseg)?;
        let (allocated, target) = (record.allocated_cap, record.target);
        if allocated {
            return self.update_rseg(rseg, RSegValue::Cap { corner, value });
        }
        match target {
            Some(target) => self.set_cap_node_cap(target, corner, value),
            None => Err(ErrorSource::InvalidArgs(format!(
                "{rseg:?} has neither allocated capacitance nor a target node"
            ))
            .into()),
        }
    }

    pub fn add_rseg_cap(&mut self, rseg: RSegId, corner: usize, delta: f64) -> Result<()> {
        let value = self.rseg_cap(rseg, corner)? + delta;
        self.set_rseg_cap(rseg, corner, value)
    }

    pub fn set_rseg_source(&mut self, rseg: RSegId, source: Option<CapNodeId>) -> Result<()> {
        self.update_rseg(rseg, RSegValue::Source(source))
    }

    pub fn set_rseg_target(&mut self, rseg: RSegId, target: Option<CapNodeId>) -> Result<()> {
        self.update_rseg(rseg, RSegValue::Target(target))
    }

    pub fn set_rseg_coords(&mut self, rseg: RSegId, coords: Point) -> Result<()> {
        self.update_rseg(rseg, RSegValue::Coords(coords))
    }

    pub fn set_rseg_path_dir(&mut self, rseg: RSegId, path_dir: bool) -> Result<()> {
        self.update_rseg(rseg, RSegValue::PathDir(path_dir))
    }

    fn update_rseg(&mut self, rseg: RSegId, value: RSegValue) -> Result<()> {
        let new = value.clone();
        let old = self.apply_rseg_value(rseg, value)?;
        self.record(|| JournalEntry::UpdateRSeg { rseg, old, new })
    }

    pub(crate) fn apply_rseg_value(&mut self, rseg: RSegId, value: RSegValue) -> Result<RSegValue> {
        let net = self.rsegs.get(rseg)?.net;
        if let RSegValue::Source(Some(node)) | RSegValue::Target(Some(node)) = value {
            self.check_node_on_net(node, net)?;
        }
        if let RSegValue::Res { corner, .. } | RSegValue::Cap { corner, .. } = value {
            self.check_corner(corner)?;
        }
        let id = rseg.raw();
        let record = self.rsegs.get_mut(rseg)?;
        Ok(match value {
            RSegValue::Source(source) => {
                RSegValue::Source(std::mem::replace(&mut record.source, source))
            }
            RSegValue::Target(target) => {
                RSegValue::Target(std::mem::replace(&mut record.target, target))
            }
            RSegValue::Coords(coords) => {
                RSegValue::Coords(std::mem::replace(&mut record.coords, coords))
            }
            RSegValue::PathDir(dir) => RSegValue::PathDir(std::mem::replace(&mut record.path_dir, dir)),
            RSegValue::Res { corner, value } => {
                let old = self.res_values.get(id, corner);
                self.res_values.set(id, corner, value)?;
                RSegValue::Res { corner, value: old }
            }
            RSegValue::Cap { corner, value } => {
                let old = self.cap_values.get(id, corner);
                self.cap_values.set(id, corner, value)?;
                RSegValue::Cap { corner, value: old }
            }
        })
    }
}
