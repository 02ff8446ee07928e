//! Borrowing iterators over the intrusive chains.

use dbtable::Table;

use super::{CapNode, CapNodeId, CcSeg, CcSegId, RSeg, RSegId};
use crate::block::{Block, NetId};
use crate::error::Result;

/// The cap-nodes of a net, most recently created first.
pub struct CapNodes<'a> {
    table: &'a Table<CapNode>,
    next: Option<CapNodeId>,
}

impl<'a> Iterator for CapNodes<'a> {
    type Item = (CapNodeId, &'a CapNode);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        let node = self.table.try_get(id)?;
        self.next = node.next;
        Some((id, node))
    }
}

/// The resistance segments of a net, most recently created first.
pub struct RSegs<'a> {
    table: &'a Table<RSeg>,
    next: Option<RSegId>,
}

impl<'a> Iterator for RSegs<'a> {
    type Item = (RSegId, &'a RSeg);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        let rseg = self.table.try_get(id)?;
        self.next = rseg.next;
        Some((id, rseg))
    }
}

/// The coupling segments incident on one cap-node.
pub struct CcSegs<'a> {
    table: &'a Table<CcSeg>,
    node: CapNodeId,
    next: Option<CcSegId>,
}

impl<'a> Iterator for CcSegs<'a> {
    type Item = (CcSegId, &'a CcSeg);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        let seg = self.table.try_get(id)?;
        self.next = seg.next_for(self.node);
        Some((id, seg))
    }
}

impl Block {
    pub fn net_cap_nodes(&self, net: NetId) -> Result<CapNodes<'_>> {
        Ok(CapNodes {
            table: &self.cap_nodes,
            next: self.nets.get(net)?.first_cap_node(),
        })
    }

    pub fn net_rsegs(&self, net: NetId) -> Result<RSegs<'_>> {
        Ok(RSegs {
            table: &self.rsegs,
            next: self.nets.get(net)?.first_rseg(),
        })
    }

    pub fn cap_node_cc_segs(&self, node: CapNodeId) -> Result<CcSegs<'_>> {
        Ok(CcSegs {
            table: &self.cc_segs,
            node,
            next: self.cap_nodes.get(node)?.cc_segs,
        })
    }
}
