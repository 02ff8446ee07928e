use super::{CapNodeId, CcSegId};
use crate::block::{Block, NetId};
use crate::error::{ErrorSource, Result};
use crate::journal::JournalEntry;
use crate::log::{debug, warn};

/// One coupling adjustment applied to a net.
///
/// Remembers exactly which segments were scaled and which neighbor nets
/// they reached so that the adjustment can be reversed.
#[derive(Debug, Clone, PartialEq)]
pub struct CcAdjustment {
    pub(crate) order: u32,
    pub(crate) factor: f64,
    pub(crate) threshold: f64,
    pub(crate) segs: Vec<CcSegId>,
    pub(crate) halo: Vec<NetId>,
}

impl CcAdjustment {
    #[inline]
    pub fn order(&self) -> u32 {
        self.order
    }

    #[inline]
    pub fn factor(&self) -> f64 {
        self.factor
    }

    #[inline]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Segments scaled by this adjustment.
    #[inline]
    pub fn segs(&self) -> &[CcSegId] {
        &self.segs
    }

    /// Neighbor nets reached by the scaled segments.
    #[inline]
    pub fn halo_nets(&self) -> &[NetId] {
        &self.halo
    }
}

impl Block {
    /// Scales by `factor` every coupling segment of `net` whose capacitance
    /// reaches `threshold` at some corner.
    ///
    /// Segments already scaled by an earlier adjustment and segments to nets
    /// adjusted at a higher order are left alone. Returns `false` without
    /// changing anything when `net` is already adjusted at `order` or above,
    /// or when no segment qualifies.
    pub fn adjust_cc(&mut self, net: NetId, order: u32, factor: f64, threshold: f64) -> Result<bool> {
        if !(factor > 0.0 && factor.is_finite()) {
            return Err(ErrorSource::InvalidArgs(format!(
                "coupling adjustment factor must be positive, got {factor}"
            ))
            .into());
        }
        let record = self.nets.get(net)?;
        if let Some(current) = record.cc_adjust_order() {
            if order <= current {
                warn!(
                    "net {} is already adjusted at order {current}; undo it before adjusting at order {order}",
                    record.name()
                );
                return Ok(false);
            }
        }

        let mut segs = Vec::new();
        let mut halo = Vec::new();
        let nodes: Vec<CapNodeId> = self.net_cap_nodes(net)?.map(|(id, _)| id).collect();
        for node in nodes {
            let incident: Vec<CcSegId> = self.cap_node_cc_segs(node)?.map(|(id, _)| id).collect();
            for seg in incident {
                let record = self.cc_segs.get(seg)?;
                if record.is_marked() {
                    continue;
                }
                let Some(other) = record.other_node(node) else {
                    continue;
                };
                let other_net = self.cap_nodes.get(other)?.net();
                if other_net == net {
                    continue;
                }
                if let Some(neighbor) = self.nets.get(other_net)?.cc_adjust_order() {
                    if neighbor > order {
                        continue;
                    }
                }
                let over = (0..self.corners.count())
                    .any(|corner| self.cc_values.get(seg.raw(), corner) >= threshold);
                if !over {
                    continue;
                }
                self.scale_cc_seg(seg, factor)?;
                self.set_cc_seg_mark(seg, true)?;
                segs.push(seg);
                if !halo.contains(&other_net) {
                    halo.push(other_net);
                }
            }
        }

        if segs.is_empty() {
            debug!("no coupling segment of {net:?} reaches {threshold}");
            return Ok(false);
        }
        debug!(
            "adjusted {} coupling segments of {net:?} by {factor} at order {order}",
            segs.len()
        );
        self.nets.get_mut(net)?.cc_adjustments.push(CcAdjustment {
            order,
            factor,
            threshold,
            segs,
            halo,
        });
        self.record(|| JournalEntry::AdjustCc {
            net,
            order,
            factor,
            threshold,
        })?;
        Ok(true)
    }

    /// Reverses the most recent adjustment of `net`.
    ///
    /// Returns `false` if the net has no adjustment in effect.
    pub fn undo_adjusted_cc(&mut self, net: NetId) -> Result<bool> {
        let Some(adjustment) = self.nets.get_mut(net)?.cc_adjustments.pop() else {
            warn!("net {net:?} has no coupling adjustment to undo");
            return Ok(false);
        };
        for seg in adjustment.segs.iter() {
            if self.cc_segs.contains(*seg) {
                self.scale_cc_seg(*seg, 1.0 / adjustment.factor)?;
                self.set_cc_seg_mark(*seg, false)?;
            }
        }
        self.record(|| JournalEntry::UndoAdjustCc {
            net,
            order: adjustment.order,
            factor: adjustment.factor,
            threshold: adjustment.threshold,
        })?;
        Ok(true)
    }

    /// Nets reached by the adjustments currently in effect on `net`.
    pub fn cc_halo_nets(&self, net: NetId) -> Result<Vec<NetId>> {
        let mut halo: Vec<NetId> = Vec::new();
        for adjustment in self.nets.get(net)?.cc_adjustments() {
            for other in adjustment.halo_nets() {
                if !halo.contains(other) {
                    halo.push(*other);
                }
            }
        }
        Ok(halo)
    }
}
