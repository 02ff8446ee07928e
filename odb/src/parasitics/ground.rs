use super::{CapNodeId, CcSegId};
use crate::block::{Block, NetId};
use crate::error::Result;
use crate::log::warn;

impl Block {
    /// Adds `factor` times the coupling capacitance of every edge on `net` to
    /// the ground capacitance of both endpoints, at every corner.
    ///
    /// Each edge is visited from the net with the smaller handle only. The
    /// coupling values themselves are left in place. Returns whether any edge
    /// was grounded.
    pub fn ground_cc(&mut self, net: NetId, factor: f64) -> Result<bool> {
        let nodes: Vec<CapNodeId> = self.net_cap_nodes(net)?.map(|(id, _)| id).collect();
        if factor == 0.0 {
            return Ok(false);
        }
        let mut grounded = false;
        for node in nodes {
            let segs: Vec<(CcSegId, CapNodeId, bool)> = self
                .cap_node_cc_segs(node)?
                .filter_map(|(id, seg)| {
                    let other = seg.other_node(node)?;
                    Some((id, other, seg.source() == node))
                })
                .collect();
            for (seg, other, is_source) in segs {
                let other_net = self.cap_nodes.get(other)?.net();
                if other_net == net {
                    if is_source {
                        warn!(
                            "coupling segment {seg:?} joins two nodes of net {}; not grounded",
                            self.nets.get(net)?.name()
                        );
                    }
                    continue;
                }
                if other_net < net {
                    continue;
                }
                for corner in 0..self.corners.count() {
                    let cap = self.cc_values.get(seg.raw(), corner) * factor;
                    self.add_cap_node_cap(node, corner, cap)?;
                    self.add_cap_node_cap(other, corner, cap)?;
                }
                grounded = true;
            }
        }
        Ok(grounded)
    }
}
