use dbtable::{Id, Record};

use super::{CcSegId, Flags};
use crate::block::{BTermId, Block, ITermId, NetId};
use crate::error::{ErrorSource, InvariantError, Result};
use crate::journal::JournalEntry;

pub type CapNodeId = Id<CapNode>;

const FOREIGN: usize = 0;
const SELECT: usize = 1;
const MARK: usize = 2;
const MARK_1: usize = 3;

/// What a cap-node stands for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum NodeRef {
    /// An internal node, numbered by the extractor.
    Internal(u32),
    ITerm(ITermId),
    BTerm(BTermId),
    Branch(u32),
    /// A node referenced by name index in a parasitics file.
    Name(u32),
}

impl NodeRef {
    /// The number carried by the node: the terminal handle for terminal
    /// nodes, the extractor's number otherwise.
    pub fn node_num(self) -> u32 {
        match self {
            Self::Internal(n) | Self::Branch(n) | Self::Name(n) => n,
            Self::ITerm(id) => id.raw(),
            Self::BTerm(id) => id.raw(),
        }
    }

    pub(crate) fn tag(self) -> u8 {
        match self {
            Self::Internal(_) => 0,
            Self::ITerm(_) => 1,
            Self::BTerm(_) => 2,
            Self::Branch(_) => 3,
            Self::Name(_) => 4,
        }
    }

    pub(crate) fn from_parts(tag: u8, num: u32) -> Option<Self> {
        match tag {
            0 => Some(Self::Internal(num)),
            1 => Id::from_raw(num).map(Self::ITerm),
            2 => Id::from_raw(num).map(Self::BTerm),
            3 => Some(Self::Branch(num)),
            4 => Some(Self::Name(num)),
            _ => None,
        }
    }
}

/// A node of a net's RC graph.
#[derive(Debug, Clone, PartialEq)]
pub struct CapNode {
    pub(crate) net: NetId,
    pub(crate) next: Option<CapNodeId>,
    pub(crate) kind: NodeRef,
    pub(crate) cc_segs: Option<CcSegId>,
    pub(crate) flags: Flags,
    pub(crate) child_count: u32,
    pub(crate) sort_index: u32,
}

impl Record for CapNode {
    const KIND: &'static str = "cap node";

    fn clear_links(&mut self) {
        self.next = None;
        self.cc_segs = None;
        self.sort_index = 0;
    }
}

impl CapNode {
    pub(crate) fn new(net: NetId, kind: NodeRef, foreign: bool) -> Self {
        let mut flags = Flags::ZERO;
        flags.set(FOREIGN, foreign);
        Self {
            net,
            next: None,
            kind,
            cc_segs: None,
            flags,
            child_count: 0,
            sort_index: 0,
        }
    }

    #[inline]
    pub fn net(&self) -> NetId {
        self.net
    }

    #[inline]
    pub fn next(&self) -> Option<CapNodeId> {
        self.next
    }

    #[inline]
    pub fn kind(&self) -> NodeRef {
        self.kind
    }

    #[inline]
    pub fn node_num(&self) -> u32 {
        self.kind.node_num()
    }

    #[inline]
    pub fn first_cc_seg(&self) -> Option<CcSegId> {
        self.cc_segs
    }

    /// Whether the capacitance was computed outside the extractor.
    #[inline]
    pub fn is_foreign(&self) -> bool {
        self.flags[FOREIGN]
    }

    #[inline]
    pub fn is_selected(&self) -> bool {
        self.flags[SELECT]
    }

    #[inline]
    pub fn is_marked(&self) -> bool {
        self.flags[MARK]
    }

    #[inline]
    pub fn is_marked_1(&self) -> bool {
        self.flags[MARK_1]
    }

    #[inline]
    pub fn child_count(&self) -> u32 {
        self.child_count
    }

    #[inline]
    pub fn sort_index(&self) -> u32 {
        self.sort_index
    }
}

/// A journaled cap-node attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum CapNodeValue {
    Kind(NodeRef),
    Foreign(bool),
    Cap { corner: usize, value: f64 },
}

impl Block {
    /// Creates a cap-node at the front of `net`'s chain.
    pub fn create_cap_node(&mut self, net: NetId, kind: NodeRef, foreign: bool) -> Result<CapNodeId> {
        let record = CapNode::new(net, kind, foreign);
        let node = self.insert_cap_node(None, record.clone(), None)?;
        self.record(|| JournalEntry::CreateCapNode { node, record })?;
        Ok(node)
    }

    pub(crate) fn insert_cap_node(
        &mut self,
        id: Option<CapNodeId>,
        mut record: CapNode,
        values: Option<&[f64]>,
    ) -> Result<CapNodeId> {
        let net = record.net;
        record.next = self.nets.get(net)?.first_cap_node;
        record.cc_segs = None;
        let node = match id {
            Some(id) => {
                self.cap_nodes.create_at(id, record)?;
                id
            }
            None => self.cap_nodes.create(record)?,
        };
        self.node_values.alloc(node.raw(), 0.0)?;
        if let Some(values) = values {
            self.node_values.set_record(node.raw(), values)?;
        }
        self.nets.get_mut(net)?.first_cap_node = Some(node);
        Ok(node)
    }

    /// Destroys a cap-node together with every coupling segment incident on it.
    ///
    /// Fails if a resistance segment of the net still ends on the node.
    pub fn destroy_cap_node(&mut self, node: CapNodeId) -> Result<()> {
        let net = self.cap_nodes.get(node)?.net;
        self.check_no_rseg_refs(net, node)?;
        let segs: Vec<CcSegId> = self.cap_node_cc_segs(node)?.map(|(id, _)| id).collect();
        for seg in segs {
            if self.cc_segs.contains(seg) {
                self.destroy_cc_seg(seg)?;
            }
        }
        let (record, values) = self.remove_cap_node(node)?;
        self.record(|| JournalEntry::DestroyCapNode {
            node,
            record,
            values,
        })
    }

    /// Unlinks and frees a cap-node that has no coupling segments left.
    pub(crate) fn remove_cap_node(&mut self, node: CapNodeId) -> Result<(CapNode, Vec<f64>)> {
        let record = self.cap_nodes.get(node)?;
        if record.cc_segs.is_some() {
            return Err(InvariantError::StillReferenced {
                kind: CapNode::KIND,
                id: node.raw(),
                by: "coupling segments",
            }
            .into());
        }
        let net = record.net;
        let next = record.next;
        self.unlink_cap_node(net, node, next)?;
        let values = self.node_values.record(node.raw());
        let mut record = self.cap_nodes.destroy(node)?;
        record.clear_links();
        Ok((record, values))
    }

    fn unlink_cap_node(&mut self, net: NetId, node: CapNodeId, next: Option<CapNodeId>) -> Result<()> {
        let head = self.nets.get(net)?.first_cap_node;
        if head == Some(node) {
            self.nets.get_mut(net)?.first_cap_node = next;
            return Ok(());
        }
        let mut cursor = head;
        while let Some(cur) = cursor {
            let cur_next = self.cap_nodes.get(cur)?.next;
            if cur_next == Some(node) {
                self.cap_nodes.get_mut(cur)?.next = next;
                return Ok(());
            }
            cursor = cur_next;
        }
        Err(InvariantError::Other(format!("{node:?} is not in the chain of {net:?}")).into())
    }

    fn check_no_rseg_refs(&self, net: NetId, node: CapNodeId) -> Result<()> {
        let referenced = self
            .net_rsegs(net)?
            .any(|(_, r)| r.source() == Some(node) || r.target() == Some(node));
        if referenced {
            return Err(InvariantError::StillReferenced {
                kind: CapNode::KIND,
                id: node.raw(),
                by: "resistance segments",
            }
            .into());
        }
        Ok(())
    }

    #[inline]
    pub fn cap_node(&self, node: CapNodeId) -> Result<&CapNode> {
        Ok(self.cap_nodes.get(node)?)
    }

    pub fn cap_node_cap(&self, node: CapNodeId, corner: usize) -> Result<f64> {
        self.check_corner(corner)?;
        self.cap_nodes.get(node)?;
        Ok(self.node_values.get(node.raw(), corner))
    }

    /// All corner values of a cap-node.
    pub fn cap_node_caps(&self, node: CapNodeId) -> Result<Vec<f64>> {
        self.cap_nodes.get(node)?;
        Ok(self.node_values.record(node.raw()))
    }

    pub fn set_cap_node_cap(&mut self, node: CapNodeId, corner: usize, value: f64) -> Result<()> {
        self.update_cap_node(node, CapNodeValue::Cap { corner, value })
    }

    pub fn add_cap_node_cap(&mut self, node: CapNodeId, corner: usize, delta: f64) -> Result<()> {
        let value = self.cap_node_cap(node, corner)? + delta;
        self.set_cap_node_cap(node, corner, value)
    }

    pub fn set_cap_node_kind(&mut self, node: CapNodeId, kind: NodeRef) -> Result<()> {
        self.update_cap_node(node, CapNodeValue::Kind(kind))
    }

    pub fn set_cap_node_foreign(&mut self, node: CapNodeId, foreign: bool) -> Result<()> {
        self.update_cap_node(node, CapNodeValue::Foreign(foreign))
    }

    fn update_cap_node(&mut self, node: CapNodeId, value: CapNodeValue) -> Result<()> {
        let new = value.clone();
        let old = self.apply_cap_node_value(node, value)?;
        self.record(|| JournalEntry::UpdateCapNode { node, old, new })
    }

    /// Stores `value` and returns the value it replaced.
    pub(crate) fn apply_cap_node_value(
        &mut self,
        node: CapNodeId,
        value: CapNodeValue,
    ) -> Result<CapNodeValue> {
        let record = self.cap_nodes.get_mut(node)?;
        Ok(match value {
            CapNodeValue::Kind(kind) => CapNodeValue::Kind(std::mem::replace(&mut record.kind, kind)),
            CapNodeValue::Foreign(foreign) => {
                let old = record.flags[FOREIGN];
                record.flags.set(FOREIGN, foreign);
                CapNodeValue::Foreign(old)
            }
            CapNodeValue::Cap { corner, value } => {
                if corner >= self.corners.count() {
                    return Err(ErrorSource::InvalidArgs(format!(
                        "corner {corner} out of range for {} corners",
                        self.corners.count()
                    ))
                    .into());
                }
                let old = self.node_values.get(node.raw(), corner);
                self.node_values.set(node.raw(), corner, value)?;
                CapNodeValue::Cap { corner, value: old }
            }
        })
    }

    pub fn set_cap_node_selected(&mut self, node: CapNodeId, value: bool) -> Result<()> {
        self.cap_nodes.get_mut(node)?.flags.set(SELECT, value);
        Ok(())
    }

    pub fn set_cap_node_mark(&mut self, node: CapNodeId, value: bool) -> Result<()> {
        self.cap_nodes.get_mut(node)?.flags.set(MARK, value);
        Ok(())
    }

    pub fn set_cap_node_mark_1(&mut self, node: CapNodeId, value: bool) -> Result<()> {
        self.cap_nodes.get_mut(node)?.flags.set(MARK_1, value);
        Ok(())
    }

    pub fn set_cap_node_child_count(&mut self, node: CapNodeId, count: u32) -> Result<()> {
        self.cap_nodes.get_mut(node)?.child_count = count;
        Ok(())
    }

    /// Finds the cap-node of `net` standing for `kind`.
    pub fn find_cap_node(&self, net: NetId, kind: NodeRef) -> Result<Option<CapNodeId>> {
        Ok(self
            .net_cap_nodes(net)?
            .find(|(_, node)| node.kind == kind)
            .map(|(id, _)| id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_refs_keep_their_discriminant() {
        let iterm = NodeRef::ITerm(Id::from_raw(7).unwrap());
        assert_eq!(iterm.node_num(), 7);
        assert_eq!(NodeRef::from_parts(iterm.tag(), 7), Some(iterm));
        assert_eq!(NodeRef::from_parts(1, 0), None);
        assert_eq!(NodeRef::from_parts(4, 0), Some(NodeRef::Name(0)));
        assert_eq!(NodeRef::from_parts(9, 1), None);
    }

    #[test]
    fn flags_are_independent() {
        let net = Id::from_raw(1).unwrap();
        let mut node = CapNode::new(net, NodeRef::Internal(3), true);
        assert!(node.is_foreign());
        assert!(!node.is_marked());
        node.flags.set(MARK, true);
        assert!(node.is_marked());
        assert!(node.is_foreign());
        assert!(!node.is_marked_1());
    }
}
