use dbtable::{Id, Record};

use itertools::Itertools;

use super::{CapNodeId, Flags};
use crate::block::{Block, NetId};
use crate::error::{ErrorSource, InvariantError, Result};
use crate::journal::JournalEntry;
use crate::log::debug;

pub type CcSegId = Id<CcSeg>;

const MARK: usize = 0;
const SPEF_MARK_1: usize = 1;

/// A coupling capacitor between two cap-nodes.
///
/// The segment is linked into the chains of both endpoints: `next[i]`
/// continues the chain of `nodes[i]`. Slot 0 holds the endpoint whose net
/// has the smaller handle (ties broken by cap-node handle).
#[derive(Debug, Clone, PartialEq)]
pub struct CcSeg {
    pub(crate) nodes: [CapNodeId; 2],
    pub(crate) next: [Option<CcSegId>; 2],
    pub(crate) flags: Flags,
    pub(crate) infile_count: u32,
}

impl Record for CcSeg {
    const KIND: &'static str = "coupling segment";

    fn clear_links(&mut self) {
        self.next = [None, None];
    }
}

impl CcSeg {
    pub(crate) fn new(nodes: [CapNodeId; 2]) -> Self {
        Self {
            nodes,
            next: [None, None],
            flags: Flags::ZERO,
            infile_count: 0,
        }
    }

    #[inline]
    pub fn nodes(&self) -> [CapNodeId; 2] {
        self.nodes
    }

    #[inline]
    pub fn source(&self) -> CapNodeId {
        self.nodes[0]
    }

    #[inline]
    pub fn target(&self) -> CapNodeId {
        self.nodes[1]
    }

    /// The chain slot used by `node`, if it is an endpoint.
    #[inline]
    pub fn slot_of(&self, node: CapNodeId) -> Option<usize> {
        self.nodes.iter().position(|n| *n == node)
    }

    /// The endpoint opposite `node`.
    pub fn other_node(&self, node: CapNodeId) -> Option<CapNodeId> {
        self.slot_of(node).map(|slot| self.nodes[1 - slot])
    }

    /// Whether the segment connects `a` and `b`, in either order.
    #[inline]
    pub fn connects(&self, a: CapNodeId, b: CapNodeId) -> bool {
        self.nodes == [a, b] || self.nodes == [b, a]
    }

    /// The next segment in `node`'s chain.
    pub fn next_for(&self, node: CapNodeId) -> Option<CcSegId> {
        self.slot_of(node).and_then(|slot| self.next[slot])
    }

    #[inline]
    pub fn is_marked(&self) -> bool {
        self.flags[MARK]
    }

    #[inline]
    pub fn is_spef_marked_1(&self) -> bool {
        self.flags[SPEF_MARK_1]
    }

    #[inline]
    pub fn infile_count(&self) -> u32 {
        self.infile_count
    }
}

/// A journaled coupling segment attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum CcSegValue {
    Cap { corner: usize, value: f64 },
}

impl Block {
    /// Ordering key of an endpoint: owning net first, then the node itself.
    fn endpoint_key(&self, node: CapNodeId) -> Result<(u32, u32)> {
        Ok((self.cap_nodes.get(node)?.net.raw(), node.raw()))
    }

    fn canonical_pair(&self, a: CapNodeId, b: CapNodeId) -> Result<[CapNodeId; 2]> {
        Ok(if self.endpoint_key(a)? <= self.endpoint_key(b)? {
            [a, b]
        } else {
            [b, a]
        })
    }

    /// Creates a coupling segment between `src` and `tgt`.
    ///
    /// With `merge_parallel`, an existing segment between the same two nodes
    /// is returned instead, after moving it to the front of `tgt`'s chain.
    pub fn create_cc_seg(
        &mut self,
        src: CapNodeId,
        tgt: CapNodeId,
        merge_parallel: bool,
    ) -> Result<CcSegId> {
        if src == tgt {
            return Err(ErrorSource::InvalidArgs(format!(
                "cannot couple {src:?} to itself"
            ))
            .into());
        }
        let nodes = self.canonical_pair(src, tgt)?;
        if merge_parallel {
            if let Some(seg) = self.find_cc_seg(src, tgt)? {
                self.promote_cc_seg(tgt, seg)?;
                return Ok(seg);
            }
        }
        let seg = self.insert_cc_seg(None, nodes, None)?;
        self.record(|| JournalEntry::CreateCcSeg { seg, nodes })?;
        Ok(seg)
    }

    /// Creates or merges a coupling segment and adds `caps[c]` to it at every corner `c`.
    pub fn couple(
        &mut self,
        src: CapNodeId,
        tgt: CapNodeId,
        caps: &[f64],
        merge_parallel: bool,
    ) -> Result<CcSegId> {
        if caps.len() > self.corners.count() {
            return Err(ErrorSource::InvalidArgs(format!(
                "{} capacitance values for {} corners",
                caps.len(),
                self.corners.count()
            ))
            .into());
        }
        let seg = self.create_cc_seg(src, tgt, merge_parallel)?;
        for (corner, cap) in caps.iter().enumerate() {
            self.add_cc_seg_cap(seg, corner, *cap)?;
        }
        Ok(seg)
    }

    /// [`Block::couple`] using the block's configured merge setting.
    pub fn couple_default(&mut self, src: CapNodeId, tgt: CapNodeId, caps: &[f64]) -> Result<CcSegId> {
        let merge = self.merge_parallel_cc;
        self.couple(src, tgt, caps, merge)
    }

    pub(crate) fn insert_cc_seg(
        &mut self,
        id: Option<CcSegId>,
        nodes: [CapNodeId; 2],
        values: Option<&[f64]>,
    ) -> Result<CcSegId> {
        if nodes[0] == nodes[1] {
            return Err(ErrorSource::InvalidArgs(format!(
                "cannot couple {:?} to itself",
                nodes[0]
            ))
            .into());
        }
        let heads = [
            self.cap_nodes.get(nodes[0])?.cc_segs,
            self.cap_nodes.get(nodes[1])?.cc_segs,
        ];
        let mut record = CcSeg::new(nodes);
        record.next = heads;
        let seg = match id {
            Some(id) => {
                self.cc_segs.create_at(id, record)?;
                id
            }
            None => self.cc_segs.create(record)?,
        };
        self.cc_values.alloc(seg.raw(), 0.0)?;
        if let Some(values) = values {
            self.cc_values.set_record(seg.raw(), values)?;
        }
        for node in nodes {
            self.cap_nodes.get_mut(node)?.cc_segs = Some(seg);
        }
        Ok(seg)
    }

    pub fn destroy_cc_seg(&mut self, seg: CcSegId) -> Result<()> {
        let (record, values, adjusted) = self.remove_cc_seg(seg)?;
        self.record(|| JournalEntry::DestroyCcSeg {
            seg,
            record,
            values,
            adjusted,
        })
    }

    /// Unlinks and frees `seg`.
    ///
    /// Returns the detached record, its values, and each `(net, index)`
    /// adjustment it was scaled by.
    pub(crate) fn remove_cc_seg(
        &mut self,
        seg: CcSegId,
    ) -> Result<(CcSeg, Vec<f64>, Vec<(NetId, u32)>)> {
        let nodes = self.cc_segs.get(seg)?.nodes;
        for node in nodes {
            self.unlink_cc_seg(node, seg)?;
        }
        let mut adjusted = Vec::new();
        let nets = [
            self.cap_nodes.get(nodes[0])?.net,
            self.cap_nodes.get(nodes[1])?.net,
        ];
        for net in nets.into_iter().dedup() {
            let adjustments = &mut self.nets.get_mut(net)?.cc_adjustments;
            for (index, adjustment) in adjustments.iter_mut().enumerate() {
                let before = adjustment.segs.len();
                adjustment.segs.retain(|s| *s != seg);
                if adjustment.segs.len() != before {
                    adjusted.push((net, index as u32));
                }
            }
        }
        let values = self.cc_values.record(seg.raw());
        let mut record = self.cc_segs.destroy(seg)?;
        record.clear_links();
        Ok((record, values, adjusted))
    }

    /// Puts back a segment freed by [`Block::remove_cc_seg`].
    pub(crate) fn restore_cc_seg(
        &mut self,
        seg: CcSegId,
        record: CcSeg,
        values: &[f64],
        adjusted: &[(NetId, u32)],
    ) -> Result<()> {
        self.insert_cc_seg(Some(seg), record.nodes, Some(values))?;
        let restored = self.cc_segs.get_mut(seg)?;
        restored.flags = record.flags;
        restored.infile_count = record.infile_count;
        for (net, index) in adjusted.iter() {
            let adjustments = &mut self.nets.get_mut(*net)?.cc_adjustments;
            let adjustment = adjustments.get_mut(*index as usize).ok_or_else(|| {
                InvariantError::Other(format!(
                    "{net:?} has no coupling adjustment {index} to restore {seg:?} into"
                ))
            })?;
            adjustment.segs.push(seg);
        }
        Ok(())
    }

    /// Removes `seg` from `node`'s chain. The segment keeps its endpoints.
    fn unlink_cc_seg(&mut self, node: CapNodeId, seg: CcSegId) -> Result<()> {
        let record = self.cc_segs.get(seg)?;
        let slot = record.slot_of(node).ok_or_else(|| not_an_endpoint(seg, node))?;
        let next = record.next[slot];
        let head = self.cap_nodes.get(node)?.cc_segs;
        if head == Some(seg) {
            self.cap_nodes.get_mut(node)?.cc_segs = next;
            return Ok(());
        }
        let mut cursor = head;
        while let Some(cur) = cursor {
            let record = self.cc_segs.get(cur)?;
            let slot = record.slot_of(node).ok_or_else(|| not_an_endpoint(cur, node))?;
            if record.next[slot] == Some(seg) {
                self.cc_segs.get_mut(cur)?.next[slot] = next;
                return Ok(());
            }
            cursor = record.next[slot];
        }
        Err(InvariantError::Other(format!("{seg:?} is not in the chain of {node:?}")).into())
    }

    fn link_cc_seg_front(&mut self, node: CapNodeId, seg: CcSegId) -> Result<()> {
        let head = self.cap_nodes.get(node)?.cc_segs;
        let record = self.cc_segs.get_mut(seg)?;
        let slot = record.slot_of(node).ok_or_else(|| not_an_endpoint(seg, node))?;
        record.next[slot] = head;
        self.cap_nodes.get_mut(node)?.cc_segs = Some(seg);
        Ok(())
    }

    /// Moves `seg` to the front of `node`'s chain.
    fn promote_cc_seg(&mut self, node: CapNodeId, seg: CcSegId) -> Result<()> {
        if self.cap_nodes.get(node)?.cc_segs == Some(seg) {
            return Ok(());
        }
        self.unlink_cc_seg(node, seg)?;
        self.link_cc_seg_front(node, seg)
    }

    /// Finds a segment connecting `a` and `b`, searching `b`'s chain.
    pub fn find_cc_seg(&self, a: CapNodeId, b: CapNodeId) -> Result<Option<CcSegId>> {
        Ok(self
            .cap_node_cc_segs(b)?
            .find(|(_, seg)| seg.connects(a, b))
            .map(|(id, _)| id))
    }

    /// Moves the `from` endpoint of `seg` to `to`.
    ///
    /// The segment leaves `from`'s chain, joins the front of `to`'s chain, and
    /// its endpoints are put back in canonical order.
    pub fn retarget_cc_seg(&mut self, seg: CcSegId, from: CapNodeId, to: CapNodeId) -> Result<()> {
        self.apply_retarget(seg, from, to)?;
        self.record(|| JournalEntry::RetargetCcSeg { seg, from, to })
    }

    pub(crate) fn apply_retarget(&mut self, seg: CcSegId, from: CapNodeId, to: CapNodeId) -> Result<()> {
        let record = self.cc_segs.get(seg)?;
        let other = record.other_node(from).ok_or_else(|| not_an_endpoint(seg, from))?;
        if other == to {
            return Err(ErrorSource::InvalidArgs(format!(
                "retargeting {seg:?} onto {to:?} would couple the node to itself"
            ))
            .into());
        }
        self.cap_nodes.get(to)?;
        let nodes = self.canonical_pair(other, to)?;

        self.unlink_cc_seg(from, seg)?;
        let record = self.cc_segs.get_mut(seg)?;
        let slot = record.slot_of(from).ok_or_else(|| not_an_endpoint(seg, from))?;
        record.nodes[slot] = to;
        record.next[slot] = None;
        if record.nodes != nodes {
            record.nodes.swap(0, 1);
            record.next.swap(0, 1);
        }
        self.link_cc_seg_front(to, seg)?;
        debug!("moved {seg:?} from {from:?} to {to:?}");
        Ok(())
    }

    #[inline]
    pub fn cc_seg(&self, seg: CcSegId) -> Result<&CcSeg> {
        Ok(self.cc_segs.get(seg)?)
    }

    pub fn cc_seg_cap(&self, seg: CcSegId, corner: usize) -> Result<f64> {
        self.check_corner(corner)?;
        self.cc_segs.get(seg)?;
        Ok(self.cc_values.get(seg.raw(), corner))
    }

    /// All corner values of a coupling segment.
    pub fn cc_seg_caps(&self, seg: CcSegId) -> Result<Vec<f64>> {
        self.cc_segs.get(seg)?;
        Ok(self.cc_values.record(seg.raw()))
    }

    pub fn set_cc_seg_cap(&mut self, seg: CcSegId, corner: usize, value: f64) -> Result<()> {
        let new = CcSegValue::Cap { corner, value };
        let old = self.apply_cc_seg_value(seg, new.clone())?;
        self.record(|| JournalEntry::UpdateCcSeg { seg, old, new })
    }

    pub fn add_cc_seg_cap(&mut self, seg: CcSegId, corner: usize, delta: f64) -> Result<()> {
        let value = self.cc_seg_cap(seg, corner)? + delta;
        self.set_cc_seg_cap(seg, corner, value)
    }

    pub(crate) fn apply_cc_seg_value(&mut self, seg: CcSegId, value: CcSegValue) -> Result<CcSegValue> {
        self.cc_segs.get(seg)?;
        match value {
            CcSegValue::Cap { corner, value } => {
                self.check_corner(corner)?;
                let old = self.cc_values.get(seg.raw(), corner);
                self.cc_values.set(seg.raw(), corner, value)?;
                Ok(CcSegValue::Cap { corner, value: old })
            }
        }
    }

    /// Multiplies every corner value of `seg` by `factor` without journaling.
    pub(crate) fn scale_cc_seg(&mut self, seg: CcSegId, factor: f64) -> Result<()> {
        for corner in 0..self.corners.count() {
            let value = self.cc_values.get(seg.raw(), corner) * factor;
            self.cc_values.set(seg.raw(), corner, value)?;
        }
        Ok(())
    }

    pub fn set_cc_seg_mark(&mut self, seg: CcSegId, value: bool) -> Result<()> {
        self.cc_segs.get_mut(seg)?.flags.set(MARK, value);
        Ok(())
    }

    pub fn set_cc_seg_spef_mark_1(&mut self, seg: CcSegId, value: bool) -> Result<()> {
        self.cc_segs.get_mut(seg)?.flags.set(SPEF_MARK_1, value);
        Ok(())
    }

    pub fn set_cc_seg_infile_count(&mut self, seg: CcSegId, count: u32) -> Result<()> {
        self.cc_segs.get_mut(seg)?.infile_count = count;
        Ok(())
    }
}

fn not_an_endpoint(seg: CcSegId, node: CapNodeId) -> crate::error::OdbError {
    InvariantError::Other(format!("{node:?} is not an endpoint of {seg:?}")).into()
}
