//! The extracted RC network of a block.
//!
//! Each [`Net`](crate::block::Net) owns two intrusive chains: its
//! [`CapNode`]s and its [`RSeg`]s. Each cap-node in turn heads a chain of the
//! [`CcSeg`]s incident on it; a coupling segment sits in the chains of both of
//! its endpoints at once. Per-corner values live in the block's
//! [`PagedValues`](dbtable::PagedValues) tables, keyed by record handle.

use bitvec::prelude::*;

use crate::block::{Block, NetId};
use crate::error::Result;

mod adjust;
mod cap_node;
mod cc_seg;
mod chain;
mod ground;
mod merge;
mod rseg;

pub use adjust::CcAdjustment;
pub use cap_node::{CapNode, CapNodeId, CapNodeValue, NodeRef};
pub use cc_seg::{CcSeg, CcSegId, CcSegValue};
pub use chain::{CapNodes, CcSegs, RSegs};
pub use rseg::{RSeg, RSegId, RSegValue};

/// Boolean attributes packed into one byte.
pub(crate) type Flags = BitArr!(for 8, in u8, Lsb0);

#[inline]
pub(crate) fn flags_from_byte(byte: u8) -> Flags {
    Flags::new([byte])
}

#[inline]
pub(crate) fn flags_to_byte(flags: &Flags) -> u8 {
    flags.as_raw_slice()[0]
}

/// Where a net's parasitics are in their lifecycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ParasiticState {
    Unextracted,
    Extracted,
    /// At least one coupling adjustment is in effect.
    Adjusted,
}

impl Block {
    pub fn parasitic_state(&self, net: NetId) -> Result<ParasiticState> {
        let net = self.nets.get(net)?;
        Ok(if !net.has_parasitics() {
            ParasiticState::Unextracted
        } else if net.cc_adjustments().is_empty() {
            ParasiticState::Extracted
        } else {
            ParasiticState::Adjusted
        })
    }

    /// Ground capacitance of `net` at `corner`: every cap-node's capacitance
    /// plus the locally allocated capacitance of its resistance segments.
    pub fn total_capacitance(&self, net: NetId, corner: usize) -> Result<f64> {
        self.check_corner(corner)?;
        let mut total = 0.0;
        for (node, _) in self.net_cap_nodes(net)? {
            total += self.node_values.get(node.raw(), corner);
        }
        for (rseg, record) in self.net_rsegs(net)? {
            if record.allocated_cap() {
                total += self.cap_values.get(rseg.raw(), corner);
            }
        }
        Ok(total)
    }

    pub fn total_resistance(&self, net: NetId, corner: usize) -> Result<f64> {
        self.check_corner(corner)?;
        Ok(self
            .net_rsegs(net)?
            .map(|(rseg, _)| self.res_values.get(rseg.raw(), corner))
            .sum())
    }

    /// Coupling capacitance on `net` at `corner`.
    ///
    /// An edge between two cap-nodes of the same net is counted once.
    pub fn total_coupling_cap(&self, net: NetId, corner: usize) -> Result<f64> {
        self.check_corner(corner)?;
        let mut total = 0.0;
        for (node, _) in self.net_cap_nodes(net)? {
            for (seg, record) in self.cap_node_cc_segs(node)? {
                let other = record.other_node(node).unwrap_or(node);
                let same_net = self.cap_nodes.get(other)?.net() == net;
                if same_net && record.nodes()[0] != node {
                    continue;
                }
                total += self.cc_values.get(seg.raw(), corner);
            }
        }
        Ok(total)
    }

    /// Removes every cap-node, resistance segment and coupling segment of `net`.
    ///
    /// Adjustments still in effect are undone first so that coupling
    /// segments shared with other nets are left unscaled.
    pub fn destroy_parasitics(&mut self, net: NetId) -> Result<()> {
        while !self.nets.get(net)?.cc_adjustments().is_empty() {
            self.undo_adjusted_cc(net)?;
        }
        let nodes: Vec<CapNodeId> = self.net_cap_nodes(net)?.map(|(id, _)| id).collect();
        for node in nodes.iter() {
            let segs: Vec<CcSegId> = self.cap_node_cc_segs(*node)?.map(|(id, _)| id).collect();
            for seg in segs {
                // Same-net segments show up in two chains.
                if self.cc_segs.contains(seg) {
                    self.destroy_cc_seg(seg)?;
                }
            }
        }
        let rsegs: Vec<RSegId> = self.net_rsegs(net)?.map(|(id, _)| id).collect();
        for rseg in rsegs {
            self.destroy_rseg(rseg)?;
        }
        for node in nodes {
            self.destroy_cap_node(node)?;
        }
        Ok(())
    }
}
