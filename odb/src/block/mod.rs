//! The design container.
//!
//! A [`Block`] owns one arena and name index per object kind, the parasitic
//! network with its per-corner value tables, and an optional
//! [`Journal`]. Blocks live in a [`Database`](crate::database::Database),
//! which also maintains their parent/child links.
//!
//! Every mutator follows the same shape: a crate-private `insert_*`,
//! `remove_*` or `apply_*_value` performs the change, and the public method
//! wraps it and appends the matching [`JournalEntry`] when a journal is
//! active. Journal replay calls the same private functions.

use std::cell::Cell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use arcstr::ArcStr;
use dbtable::{NameIndex, PagedValues, Table};

use crate::config::DbConfig;
use crate::database::BlockKey;
use crate::error::{ErrorSource, Result};
use crate::geom::Rect;
use crate::journal::{Journal, JournalEntry};
use crate::log::info;
use crate::parasitics::{CapNode, CcSeg, RSeg};
use crate::tech::{Master, Tech};

mod blockage;
mod bterm;
mod corners;
mod global_connect;
mod inst;
mod net;
pub(crate) mod persist;

pub use blockage::{Blockage, BlockageId, BlockageValue};
pub use bterm::{BTerm, BTermId, BTermValue};
pub use corners::CornerInfo;
pub use global_connect::{GlobalConnectReport, GlobalConnectRule, GlobalConnection};
pub use inst::{ITerm, ITermId, Inst, InstId, InstValue, PlacementStatus};
pub use net::{Net, NetId, NetValue};
pub use persist::{
    SCHEMA_BLOCKAGE_DENSITY, SCHEMA_CURRENT, SCHEMA_INITIAL, SCHEMA_NET_CALIBRATION,
    SUPPORTED_SCHEMAS,
};

use global_connect::GlobalConnect;

pub struct Block {
    pub(crate) key: BlockKey,
    name: ArcStr,
    parent: Option<BlockKey>,
    pub(crate) children: Vec<BlockKey>,
    tech: Arc<Tech>,
    /// Masters used by instances of this block, by name.
    pub(crate) masters: HashMap<ArcStr, Arc<Master>>,
    pub(crate) die_area: Rect,
    pub(crate) corners: CornerInfo,
    /// The corner this block carries values for, if it is a per-corner child.
    pub(crate) ext_corner: Option<usize>,
    pub(crate) merge_parallel_cc: bool,

    pub(crate) nets: Table<Net>,
    pub(crate) net_names: NameIndex<Net>,
    pub(crate) insts: Table<Inst>,
    pub(crate) inst_names: NameIndex<Inst>,
    pub(crate) iterms: Table<ITerm>,
    pub(crate) bterms: Table<BTerm>,
    pub(crate) bterm_names: NameIndex<BTerm>,
    pub(crate) blockages: Table<Blockage>,

    pub(crate) cap_nodes: Table<CapNode>,
    pub(crate) rsegs: Table<RSeg>,
    pub(crate) cc_segs: Table<CcSeg>,
    /// Resistance of each [`RSeg`].
    pub(crate) res_values: PagedValues,
    /// Locally allocated capacitance of each [`RSeg`].
    pub(crate) cap_values: PagedValues,
    /// Capacitance of each [`CcSeg`].
    pub(crate) cc_values: PagedValues,
    /// Ground capacitance of each [`CapNode`].
    pub(crate) node_values: PagedValues,

    pub(crate) journal: Option<Journal>,
    pub(crate) global_connect: GlobalConnect,

    /// Blocks are mutated from one thread at a time.
    _not_sync: PhantomData<Cell<()>>,
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("name", &self.name)
            .field("nets", &self.nets.len())
            .field("insts", &self.insts.len())
            .field("cap_nodes", &self.cap_nodes.len())
            .field("rsegs", &self.rsegs.len())
            .field("cc_segs", &self.cc_segs.len())
            .field("corners", &self.corners.count())
            .finish()
    }
}

impl Block {
    pub(crate) fn new(
        key: BlockKey,
        name: ArcStr,
        parent: Option<BlockKey>,
        tech: Arc<Tech>,
        config: &DbConfig,
    ) -> Self {
        let corners = CornerInfo::from_config(config);
        let count = corners.count();
        Self {
            key,
            name,
            parent,
            children: Vec::new(),
            tech,
            masters: HashMap::new(),
            die_area: Rect::default(),
            corners,
            ext_corner: None,
            merge_parallel_cc: config.merge_parallel_cc,
            nets: Table::new(),
            net_names: NameIndex::new(),
            insts: Table::new(),
            inst_names: NameIndex::new(),
            iterms: Table::new(),
            bterms: Table::new(),
            bterm_names: NameIndex::new(),
            blockages: Table::new(),
            cap_nodes: Table::new(),
            rsegs: Table::new(),
            cc_segs: Table::new(),
            res_values: PagedValues::new(count),
            cap_values: PagedValues::new(count),
            cc_values: PagedValues::new(count),
            node_values: PagedValues::new(count),
            journal: config.journal.then(Journal::new),
            global_connect: GlobalConnect::default(),
            _not_sync: PhantomData,
        }
    }

    #[inline]
    pub fn key(&self) -> BlockKey {
        self.key
    }

    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    #[inline]
    pub fn parent(&self) -> Option<BlockKey> {
        self.parent
    }

    #[inline]
    pub fn children(&self) -> &[BlockKey] {
        &self.children
    }

    #[inline]
    pub fn tech(&self) -> &Arc<Tech> {
        &self.tech
    }

    /// The per-corner child this is, if any.
    #[inline]
    pub fn ext_corner(&self) -> Option<usize> {
        self.ext_corner
    }

    /// Whether coupling segments created through [`Block::couple_default`]
    /// fold into parallel segments.
    #[inline]
    pub fn merge_parallel_cc(&self) -> bool {
        self.merge_parallel_cc
    }

    #[inline]
    pub fn die_area(&self) -> Rect {
        self.die_area
    }

    pub fn set_die_area(&mut self, area: Rect) -> Result<()> {
        let old = std::mem::replace(&mut self.die_area, area);
        self.record(|| JournalEntry::SetDieArea { old, new: area })
    }

    pub(crate) fn master(&self, name: &str) -> Result<&Arc<Master>> {
        self.masters.get(name).ok_or_else(|| {
            ErrorSource::NotFound {
                kind: "master",
                name: name.into(),
            }
            .into()
        })
    }

    /// Makes `master` available to instances of this block.
    pub(crate) fn register_master(&mut self, master: &Arc<Master>) {
        self.masters
            .entry(master.name().clone())
            .or_insert_with(|| master.clone());
    }

    /// Masters referenced by this block's instances.
    pub fn masters(&self) -> impl Iterator<Item = &Arc<Master>> + '_ {
        self.masters.values()
    }

    /// Starts recording changes to this block.
    pub fn begin_eco(&mut self) -> Result<()> {
        if self.journal.is_some() {
            return Err(ErrorSource::InvalidArgs(format!(
                "block {} already has an active journal",
                self.name
            ))
            .into());
        }
        info!("starting ECO on block {}", self.name);
        self.journal = Some(Journal::new());
        Ok(())
    }

    /// Stops recording and returns what was recorded.
    pub fn end_eco(&mut self) -> Option<Journal> {
        let journal = self.journal.take();
        if let Some(journal) = journal.as_ref() {
            info!(
                "ended ECO on block {} with {} actions",
                self.name,
                journal.len()
            );
        }
        journal
    }

    #[inline]
    pub fn is_journaling(&self) -> bool {
        self.journal.is_some()
    }

    #[inline]
    pub fn journal(&self) -> Option<&Journal> {
        self.journal.as_ref()
    }

    /// Appends an entry to the active journal, if any.
    pub(crate) fn record(&mut self, entry: impl FnOnce() -> JournalEntry) -> Result<()> {
        if let Some(journal) = self.journal.as_mut() {
            journal.record(&entry())?;
        }
        Ok(())
    }

    /// Runs `f` with journaling suspended.
    pub(crate) fn without_journal<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        let journal = self.journal.take();
        let out = f(self);
        self.journal = journal;
        out
    }
}
