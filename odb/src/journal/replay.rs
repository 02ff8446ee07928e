use super::{ActionKind, Journal, JournalEntry};
use crate::block::Block;
use crate::error::{ErrorContext, ErrorSource, InvariantError, Result};
use crate::log::{debug, info, Log};

/// Counts of the actions a replay or undo applied, by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub created: usize,
    pub deleted: usize,
    pub connected: usize,
    pub disconnected: usize,
    pub updated: usize,
    pub algorithms: usize,
}

impl ReplaySummary {
    pub fn total(&self) -> usize {
        self.created
            + self.deleted
            + self.connected
            + self.disconnected
            + self.updated
            + self.algorithms
    }

    fn count(&mut self, entry: &JournalEntry) {
        let slot = match entry.kind() {
            ActionKind::CreateObject => &mut self.created,
            ActionKind::DeleteObject => &mut self.deleted,
            ActionKind::ConnectObject => &mut self.connected,
            ActionKind::DisconnectObject => &mut self.disconnected,
            ActionKind::UpdateField => &mut self.updated,
            ActionKind::Algorithm => &mut self.algorithms,
        };
        *slot += 1;
    }
}

impl Log for ReplaySummary {
    fn summary(&self) -> String {
        format!(
            "journal actions: {} created, {} deleted, {} connected, {} disconnected, {} updated, {} algorithms",
            self.created,
            self.deleted,
            self.connected,
            self.disconnected,
            self.updated,
            self.algorithms
        )
    }
}

fn replay_failed(what: &str, entry: &JournalEntry) -> crate::error::OdbError {
    InvariantError::Other(format!("{what} of {} did not take effect", entry.name())).into()
}

impl Block {
    /// Applies every action of `journal` to this block, in recording order.
    ///
    /// The whole log is decoded before the block is touched, so a corrupt
    /// journal leaves the block unchanged. Replayed actions are not recorded
    /// in this block's own journal.
    pub fn apply_eco(&mut self, journal: &Journal) -> Result<ReplaySummary> {
        let entries = journal.entries().collect::<Result<Vec<_>>>()?;
        info!(
            "replaying {} journal actions onto block {}",
            entries.len(),
            self.name()
        );
        let summary = self.without_journal(|block| {
            let mut summary = ReplaySummary::default();
            for (offset, entry) in entries {
                debug!("redo {} at offset {offset}", entry.name());
                block.redo_entry(&entry).map_err(|err| {
                    err.with_context(ErrorContext::Replay {
                        offset,
                        action: entry.name(),
                    })
                })?;
                summary.count(&entry);
            }
            Ok::<_, crate::error::OdbError>(summary)
        })?;
        summary.log();
        Ok(summary)
    }

    /// Ends the active ECO and reverses every change it recorded, most
    /// recent first.
    pub fn undo_eco(&mut self) -> Result<ReplaySummary> {
        let journal = self.journal.take().ok_or_else(|| {
            ErrorSource::InvalidArgs(format!("block {} has no active journal", self.name()))
        })?;
        let entries = match journal.entries_rev().collect::<Result<Vec<_>>>() {
            Ok(entries) => entries,
            Err(err) => {
                self.journal = Some(journal);
                return Err(err);
            }
        };
        info!(
            "undoing {} journal actions on block {}",
            entries.len(),
            self.name()
        );
        let mut summary = ReplaySummary::default();
        for (offset, entry) in entries {
            debug!("undo {} at offset {offset}", entry.name());
            self.undo_entry(&entry).map_err(|err| {
                err.with_context(ErrorContext::Replay {
                    offset,
                    action: entry.name(),
                })
            })?;
            summary.count(&entry);
        }
        summary.log();
        Ok(summary)
    }

    /// Performs `entry` again.
    pub(crate) fn redo_entry(&mut self, entry: &JournalEntry) -> Result<()> {
        use JournalEntry::*;
        match entry.clone() {
            CreateNet { net, record } => {
                self.insert_net(Some(net), record)?;
            }
            DestroyNet { net, .. } => {
                self.remove_net(net)?;
            }
            UpdateNet { net, new, .. } => {
                self.apply_net_value(net, new)?;
            }
            CreateInst { inst, record } => {
                self.insert_inst(Some(inst), record)?;
            }
            DestroyInst { inst, .. } => {
                self.remove_inst(inst)?;
            }
            UpdateInst { inst, new, .. } => {
                self.apply_inst_value(inst, new)?;
            }
            ConnectITerm { iterm, net } => self.attach_iterm(iterm, net)?,
            DisconnectITerm { iterm, .. } => {
                self.detach_iterm(iterm)?;
            }
            CreateBTerm { bterm, record } => {
                self.insert_bterm(Some(bterm), record)?;
            }
            DestroyBTerm { bterm, .. } => {
                self.remove_bterm(bterm)?;
            }
            ConnectBTerm { bterm, net } => self.attach_bterm(bterm, net)?,
            DisconnectBTerm { bterm, .. } => {
                self.detach_bterm(bterm)?;
            }
            UpdateBTerm { bterm, new, .. } => {
                self.apply_bterm_value(bterm, new)?;
            }
            CreateBlockage { blockage, record } => {
                self.insert_blockage(Some(blockage), record)?;
            }
            DestroyBlockage { blockage, .. } => {
                self.blockages.destroy(blockage)?;
            }
            UpdateBlockage { blockage, new, .. } => {
                self.apply_blockage_value(blockage, new)?;
            }
            CreateCapNode { node, record } => {
                self.insert_cap_node(Some(node), record, None)?;
            }
            DestroyCapNode { node, .. } => {
                self.remove_cap_node(node)?;
            }
            UpdateCapNode { node, new, .. } => {
                self.apply_cap_node_value(node, new)?;
            }
            CreateRSeg { rseg, record } => {
                self.insert_rseg(Some(rseg), record, None)?;
            }
            DestroyRSeg { rseg, .. } => {
                self.remove_rseg(rseg)?;
            }
            UpdateRSeg { rseg, new, .. } => {
                self.apply_rseg_value(rseg, new)?;
            }
            CreateCcSeg { seg, nodes } => {
                self.insert_cc_seg(Some(seg), nodes, None)?;
            }
            DestroyCcSeg { seg, .. } => {
                self.remove_cc_seg(seg)?;
            }
            UpdateCcSeg { seg, new, .. } => {
                self.apply_cc_seg_value(seg, new)?;
            }
            RetargetCcSeg { seg, from, to } => self.apply_retarget(seg, from, to)?,
            AdjustCc {
                net,
                order,
                factor,
                threshold,
            } => {
                if !self.adjust_cc(net, order, factor, threshold)? {
                    return Err(replay_failed("redo", entry));
                }
            }
            UndoAdjustCc { net, .. } => {
                if !self.undo_adjusted_cc(net)? {
                    return Err(replay_failed("redo", entry));
                }
            }
            SetDieArea { new, .. } => self.die_area = new,
            SetCorners { new, .. } => {
                self.apply_corners(new)?;
            }
        }
        Ok(())
    }

    /// Reverses `entry`.
    pub(crate) fn undo_entry(&mut self, entry: &JournalEntry) -> Result<()> {
        use JournalEntry::*;
        match entry.clone() {
            CreateNet { net, .. } => {
                self.remove_net(net)?;
            }
            DestroyNet { net, record } => {
                self.insert_net(Some(net), record)?;
            }
            UpdateNet { net, old, .. } => {
                self.apply_net_value(net, old)?;
            }
            CreateInst { inst, .. } => {
                self.remove_inst(inst)?;
            }
            DestroyInst { inst, record } => {
                self.insert_inst(Some(inst), record)?;
            }
            UpdateInst { inst, old, .. } => {
                self.apply_inst_value(inst, old)?;
            }
            ConnectITerm { iterm, .. } => {
                self.detach_iterm(iterm)?;
            }
            DisconnectITerm { iterm, net } => self.attach_iterm(iterm, net)?,
            CreateBTerm { bterm, .. } => {
                self.remove_bterm(bterm)?;
            }
            DestroyBTerm { bterm, record } => {
                self.insert_bterm(Some(bterm), record)?;
            }
            ConnectBTerm { bterm, .. } => {
                self.detach_bterm(bterm)?;
            }
            DisconnectBTerm { bterm, net } => self.attach_bterm(bterm, net)?,
            UpdateBTerm { bterm, old, .. } => {
                self.apply_bterm_value(bterm, old)?;
            }
            CreateBlockage { blockage, .. } => {
                self.blockages.destroy(blockage)?;
            }
            DestroyBlockage { blockage, record } => {
                self.insert_blockage(Some(blockage), record)?;
            }
            UpdateBlockage { blockage, old, .. } => {
                self.apply_blockage_value(blockage, old)?;
            }
            CreateCapNode { node, .. } => {
                self.remove_cap_node(node)?;
            }
            DestroyCapNode {
                node,
                record,
                values,
            } => {
                self.insert_cap_node(Some(node), record, Some(&values))?;
            }
            UpdateCapNode { node, old, .. } => {
                self.apply_cap_node_value(node, old)?;
            }
            CreateRSeg { rseg, .. } => {
                self.remove_rseg(rseg)?;
            }
            DestroyRSeg {
                rseg,
                record,
                res,
                cap,
            } => {
                self.insert_rseg(Some(rseg), record, Some((&res, &cap)))?;
            }
            UpdateRSeg { rseg, old, .. } => {
                self.apply_rseg_value(rseg, old)?;
            }
            CreateCcSeg { seg, .. } => {
                self.remove_cc_seg(seg)?;
            }
            DestroyCcSeg {
                seg,
                record,
                values,
                adjusted,
            } => self.restore_cc_seg(seg, record, &values, &adjusted)?,
            UpdateCcSeg { seg, old, .. } => {
                self.apply_cc_seg_value(seg, old)?;
            }
            RetargetCcSeg { seg, from, to } => self.apply_retarget(seg, to, from)?,
            AdjustCc { net, .. } => {
                if !self.undo_adjusted_cc(net)? {
                    return Err(replay_failed("undo", entry));
                }
            }
            UndoAdjustCc {
                net,
                order,
                factor,
                threshold,
            } => {
                if !self.adjust_cc(net, order, factor, threshold)? {
                    return Err(replay_failed("undo", entry));
                }
            }
            SetDieArea { old, .. } => self.die_area = old,
            SetCorners { .. } => {
                return Err(InvariantError::UnsupportedUndo(entry.name()).into());
            }
        }
        Ok(())
    }
}
