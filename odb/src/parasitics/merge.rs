use std::collections::HashSet;

use super::{CapNodeId, CcSegId, RSegId};
use crate::block::{Block, NetId};
use crate::error::{ErrorSource, InvariantError, Result};
use crate::log::{debug, warn};

impl Block {
    /// Collapses a path of resistance segments of `net` into its last segment.
    ///
    /// `path[i]` must end on the node where `path[i + 1]` starts, and those
    /// intermediate nodes must not be used by any other segment. The surviving
    /// segment takes the source of `path[0]`, the summed resistance and the
    /// summed capacitance of the path. Coupling segments of the intermediate
    /// nodes move to the final node, or are added into a parallel segment the
    /// final node already has. Intermediate segments and nodes are destroyed.
    ///
    /// All checks run before anything is modified.
    pub fn merge_rcs(&mut self, net: NetId, path: &[RSegId]) -> Result<RSegId> {
        let (first, last) = match (path.first(), path.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => {
                return Err(ErrorSource::InvalidArgs("empty resistance path".to_string()).into());
            }
        };
        let intermediate = self.check_merge_path(net, path)?;
        if path.len() == 1 {
            return Ok(last);
        }
        let final_node = self.rsegs.get(last)?.target().ok_or_else(|| {
            InvariantError::BrokenPath(format!("last segment {last:?} has no target node"))
        })?;

        let corners = self.corners.count();
        let mut res = vec![0.0; corners];
        let mut cap = vec![0.0; corners];
        for rseg in path.iter() {
            for (corner, r) in res.iter_mut().enumerate() {
                *r += self.res_values.get(rseg.raw(), corner);
            }
        }
        for (rseg, node) in path.iter().zip(intermediate.iter()) {
            let allocated = self.rsegs.get(*rseg)?.allocated_cap();
            for (corner, c) in cap.iter_mut().enumerate() {
                *c += self.node_values.get(node.raw(), corner);
                if allocated {
                    *c += self.cap_values.get(rseg.raw(), corner);
                }
            }
        }

        let mut touched = Vec::new();
        let result = self.promote_coupling(final_node, &intermediate, &mut touched);
        for node in touched {
            if let Ok(record) = self.cap_nodes.get_mut(node) {
                record.sort_index = 0;
            }
        }
        result?;

        let source = self.rsegs.get(first)?.source();
        self.set_rseg_source(last, source)?;
        for corner in 0..corners {
            self.set_rseg_res(last, corner, res[corner])?;
            self.add_rseg_cap(last, corner, cap[corner])?;
        }
        for rseg in path[..path.len() - 1].iter() {
            self.destroy_rseg(*rseg)?;
        }
        for node in intermediate.iter() {
            self.destroy_cap_node(*node)?;
        }
        debug!(
            "merged {} resistance segments of {net:?} into {last:?}",
            path.len()
        );
        Ok(last)
    }

    /// Validates `path` and returns its intermediate nodes in path order.
    fn check_merge_path(&self, net: NetId, path: &[RSegId]) -> Result<Vec<CapNodeId>> {
        let mut intermediate = Vec::with_capacity(path.len().saturating_sub(1));
        for rseg in path.iter() {
            if self.rsegs.get(*rseg)?.net() != net {
                return Err(ErrorSource::InvalidArgs(format!(
                    "{rseg:?} does not belong to {net:?}"
                ))
                .into());
            }
        }
        for pair in path.windows(2) {
            let node = self.rsegs.get(pair[0])?.target();
            let next_source = self.rsegs.get(pair[1])?.source();
            match node {
                Some(node) if next_source == Some(node) => intermediate.push(node),
                _ => {
                    return Err(InvariantError::BrokenPath(format!(
                        "{:?} does not end where {:?} starts",
                        pair[0], pair[1]
                    ))
                    .into());
                }
            }
        }
        let unique: HashSet<CapNodeId> = intermediate.iter().copied().collect();
        if unique.len() != intermediate.len() {
            return Err(InvariantError::BrokenPath("path visits a node twice".to_string()).into());
        }
        let members: HashSet<RSegId> = path.iter().copied().collect();
        if members.len() != path.len() {
            return Err(InvariantError::BrokenPath("path repeats a segment".to_string()).into());
        }
        for (rseg, record) in self.net_rsegs(net)? {
            if members.contains(&rseg) {
                continue;
            }
            for end in [record.source(), record.target()].into_iter().flatten() {
                if unique.contains(&end) {
                    return Err(InvariantError::BrokenPath(format!(
                        "intermediate node {end:?} is also used by {rseg:?}"
                    ))
                    .into());
                }
            }
        }
        if let Some(last) = path.last() {
            if let Some(target) = self.rsegs.get(*last)?.target() {
                if unique.contains(&target) {
                    return Err(InvariantError::BrokenPath(
                        "path ends on one of its own nodes".to_string(),
                    )
                    .into());
                }
            }
        }
        Ok(intermediate)
    }

    /// Moves the coupling segments of `intermediate` onto `final_node`.
    ///
    /// The sort index of each neighbor of `final_node` holds the raw handle of
    /// the segment connecting them. Every node whose sort index is written is
    /// pushed to `touched`.
    fn promote_coupling(
        &mut self,
        final_node: CapNodeId,
        intermediate: &[CapNodeId],
        touched: &mut Vec<CapNodeId>,
    ) -> Result<()> {
        let existing: Vec<(CcSegId, CapNodeId)> = self
            .cap_node_cc_segs(final_node)?
            .filter_map(|(id, seg)| seg.other_node(final_node).map(|other| (id, other)))
            .collect();
        for (seg, other) in existing {
            self.cap_nodes.get_mut(other)?.sort_index = seg.raw();
            touched.push(other);
        }

        for node in intermediate.iter().copied() {
            let segs: Vec<(CcSegId, CapNodeId)> = self
                .cap_node_cc_segs(node)?
                .filter_map(|(id, seg)| seg.other_node(node).map(|other| (id, other)))
                .collect();
            for (seg, other) in segs {
                if !self.cc_segs.contains(seg) {
                    continue;
                }
                if other == final_node || intermediate.contains(&other) {
                    warn!("dropping coupling segment {seg:?} that would couple {final_node:?} to itself");
                    self.destroy_cc_seg(seg)?;
                    continue;
                }
                let parallel = self.cap_nodes.get(other)?.sort_index;
                match CcSegId::from_raw(parallel) {
                    Some(parallel) => {
                        for corner in 0..self.corners.count() {
                            let cap = self.cc_values.get(seg.raw(), corner);
                            self.add_cc_seg_cap(parallel, corner, cap)?;
                        }
                        self.destroy_cc_seg(seg)?;
                    }
                    None => {
                        self.retarget_cc_seg(seg, node, final_node)?;
                        self.cap_nodes.get_mut(other)?.sort_index = seg.raw();
                        touched.push(other);
                    }
                }
            }
        }
        Ok(())
    }
}
