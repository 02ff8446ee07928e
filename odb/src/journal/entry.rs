use arcstr::ArcStr;

use super::codec::{ParamReader, ParamWriter};
use crate::block::{
    BTerm, BTermId, BTermValue, Blockage, BlockageId, BlockageValue, CornerInfo, ITermId, Inst,
    InstId, InstValue, Net, NetId, NetValue, PlacementStatus,
};
use crate::error::Result;
use crate::geom::{Orientation, Rect};
use crate::parasitics::{
    CapNode, CapNodeId, CapNodeValue, CcSeg, CcSegId, CcSegValue, NodeRef, RSeg, RSegId, RSegValue,
};
use crate::tech::{IoType, SigType};

/// The first byte of every journal action.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ActionKind {
    CreateObject = 1,
    DeleteObject = 2,
    ConnectObject = 3,
    DisconnectObject = 4,
    UpdateField = 5,
    /// A parasitic algorithm replayed as a whole.
    Algorithm = 6,
}

impl ActionKind {
    pub(crate) fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => Self::CreateObject,
            2 => Self::DeleteObject,
            3 => Self::ConnectObject,
            4 => Self::DisconnectObject,
            5 => Self::UpdateField,
            6 => Self::Algorithm,
            _ => return None,
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Block = 0,
    Net = 1,
    Inst = 2,
    ITerm = 3,
    BTerm = 4,
    Blockage = 5,
    CapNode = 6,
    RSeg = 7,
    CcSeg = 8,
}

impl ObjectType {
    pub(crate) fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Block,
            1 => Self::Net,
            2 => Self::Inst,
            3 => Self::ITerm,
            4 => Self::BTerm,
            5 => Self::Blockage,
            6 => Self::CapNode,
            7 => Self::RSeg,
            8 => Self::CcSeg,
            _ => return None,
        })
    }
}

const BLOCK_DIE_AREA: u8 = 0;
const BLOCK_CORNERS: u8 = 1;
const CC_SEG_ENDPOINT: u8 = 0x80;
const ALGO_ADJUST_CC: u8 = 0;
const ALGO_UNDO_ADJUST_CC: u8 = 1;

/// One recorded change.
///
/// Deletions and updates carry everything needed to reverse them: the
/// removed record with its corner values, or the value an update replaced.
#[derive(Debug, Clone, PartialEq)]
pub enum JournalEntry {
    CreateNet { net: NetId, record: Net },
    DestroyNet { net: NetId, record: Net },
    UpdateNet { net: NetId, old: NetValue, new: NetValue },

    /// `record` lists the handles of the instance's terminals.
    CreateInst { inst: InstId, record: Inst },
    DestroyInst { inst: InstId, record: Inst },
    UpdateInst { inst: InstId, old: InstValue, new: InstValue },
    ConnectITerm { iterm: ITermId, net: NetId },
    DisconnectITerm { iterm: ITermId, net: NetId },

    CreateBTerm { bterm: BTermId, record: BTerm },
    DestroyBTerm { bterm: BTermId, record: BTerm },
    ConnectBTerm { bterm: BTermId, net: NetId },
    DisconnectBTerm { bterm: BTermId, net: NetId },
    UpdateBTerm { bterm: BTermId, old: BTermValue, new: BTermValue },

    CreateBlockage { blockage: BlockageId, record: Blockage },
    DestroyBlockage { blockage: BlockageId, record: Blockage },
    UpdateBlockage {
        blockage: BlockageId,
        old: BlockageValue,
        new: BlockageValue,
    },

    CreateCapNode { node: CapNodeId, record: CapNode },
    DestroyCapNode {
        node: CapNodeId,
        record: CapNode,
        values: Vec<f64>,
    },
    UpdateCapNode {
        node: CapNodeId,
        old: CapNodeValue,
        new: CapNodeValue,
    },

    CreateRSeg { rseg: RSegId, record: RSeg },
    DestroyRSeg {
        rseg: RSegId,
        record: RSeg,
        res: Vec<f64>,
        cap: Vec<f64>,
    },
    UpdateRSeg { rseg: RSegId, old: RSegValue, new: RSegValue },

    CreateCcSeg { seg: CcSegId, nodes: [CapNodeId; 2] },
    DestroyCcSeg {
        seg: CcSegId,
        record: CcSeg,
        values: Vec<f64>,
        /// Adjustments that had scaled the segment, as `(net, index)`.
        adjusted: Vec<(NetId, u32)>,
    },
    UpdateCcSeg { seg: CcSegId, old: CcSegValue, new: CcSegValue },
    RetargetCcSeg {
        seg: CcSegId,
        from: CapNodeId,
        to: CapNodeId,
    },

    AdjustCc {
        net: NetId,
        order: u32,
        factor: f64,
        threshold: f64,
    },
    UndoAdjustCc {
        net: NetId,
        order: u32,
        factor: f64,
        threshold: f64,
    },

    SetDieArea { old: Rect, new: Rect },
    SetCorners { old: CornerInfo, new: CornerInfo },
}

impl JournalEntry {
    pub fn kind(&self) -> ActionKind {
        use JournalEntry::*;
        match self {
            CreateNet { .. } | CreateInst { .. } | CreateBTerm { .. } | CreateBlockage { .. }
            | CreateCapNode { .. } | CreateRSeg { .. } | CreateCcSeg { .. } => {
                ActionKind::CreateObject
            }
            DestroyNet { .. } | DestroyInst { .. } | DestroyBTerm { .. }
            | DestroyBlockage { .. } | DestroyCapNode { .. } | DestroyRSeg { .. }
            | DestroyCcSeg { .. } => ActionKind::DeleteObject,
            ConnectITerm { .. } | ConnectBTerm { .. } => ActionKind::ConnectObject,
            DisconnectITerm { .. } | DisconnectBTerm { .. } => ActionKind::DisconnectObject,
            UpdateNet { .. } | UpdateInst { .. } | UpdateBTerm { .. } | UpdateBlockage { .. }
            | UpdateCapNode { .. } | UpdateRSeg { .. } | UpdateCcSeg { .. }
            | RetargetCcSeg { .. } | SetDieArea { .. } | SetCorners { .. } => {
                ActionKind::UpdateField
            }
            AdjustCc { .. } | UndoAdjustCc { .. } => ActionKind::Algorithm,
        }
    }

    pub fn object_type(&self) -> ObjectType {
        use JournalEntry::*;
        match self {
            CreateNet { .. } | DestroyNet { .. } | UpdateNet { .. } | AdjustCc { .. }
            | UndoAdjustCc { .. } => ObjectType::Net,
            CreateInst { .. } | DestroyInst { .. } | UpdateInst { .. } => ObjectType::Inst,
            ConnectITerm { .. } | DisconnectITerm { .. } => ObjectType::ITerm,
            CreateBTerm { .. } | DestroyBTerm { .. } | ConnectBTerm { .. }
            | DisconnectBTerm { .. } | UpdateBTerm { .. } => ObjectType::BTerm,
            CreateBlockage { .. } | DestroyBlockage { .. } | UpdateBlockage { .. } => {
                ObjectType::Blockage
            }
            CreateCapNode { .. } | DestroyCapNode { .. } | UpdateCapNode { .. } => {
                ObjectType::CapNode
            }
            CreateRSeg { .. } | DestroyRSeg { .. } | UpdateRSeg { .. } => ObjectType::RSeg,
            CreateCcSeg { .. } | DestroyCcSeg { .. } | UpdateCcSeg { .. }
            | RetargetCcSeg { .. } => ObjectType::CcSeg,
            SetDieArea { .. } | SetCorners { .. } => ObjectType::Block,
        }
    }

    /// Short name used in error context and logs.
    pub fn name(&self) -> &'static str {
        use JournalEntry::*;
        match self {
            CreateNet { .. } => "create net",
            DestroyNet { .. } => "destroy net",
            UpdateNet { .. } => "update net",
            CreateInst { .. } => "create instance",
            DestroyInst { .. } => "destroy instance",
            UpdateInst { .. } => "update instance",
            ConnectITerm { .. } => "connect instance terminal",
            DisconnectITerm { .. } => "disconnect instance terminal",
            CreateBTerm { .. } => "create block terminal",
            DestroyBTerm { .. } => "destroy block terminal",
            ConnectBTerm { .. } => "connect block terminal",
            DisconnectBTerm { .. } => "disconnect block terminal",
            UpdateBTerm { .. } => "update block terminal",
            CreateBlockage { .. } => "create blockage",
            DestroyBlockage { .. } => "destroy blockage",
            UpdateBlockage { .. } => "update blockage",
            CreateCapNode { .. } => "create cap node",
            DestroyCapNode { .. } => "destroy cap node",
            UpdateCapNode { .. } => "update cap node",
            CreateRSeg { .. } => "create resistance segment",
            DestroyRSeg { .. } => "destroy resistance segment",
            UpdateRSeg { .. } => "update resistance segment",
            CreateCcSeg { .. } => "create coupling segment",
            DestroyCcSeg { .. } => "destroy coupling segment",
            UpdateCcSeg { .. } => "update coupling segment",
            RetargetCcSeg { .. } => "retarget coupling segment",
            AdjustCc { .. } => "adjust coupling",
            UndoAdjustCc { .. } => "undo coupling adjustment",
            SetDieArea { .. } => "set die area",
            SetCorners { .. } => "set corner count",
        }
    }

    /// Writes the parameters that follow the action kind and object type.
    pub(crate) fn encode(&self, w: &mut ParamWriter<'_>) -> Result<()> {
        use JournalEntry::*;
        match self {
            CreateNet { net, record } | DestroyNet { net, record } => {
                w.id(Some(*net))?;
                w.record(record)
            }
            UpdateNet { net, old, new } => {
                w.id(Some(*net))?;
                write_update(w, old, new)
            }
            CreateInst { inst, record } | DestroyInst { inst, record } => {
                w.id(Some(*inst))?;
                w.record(record)
            }
            UpdateInst { inst, old, new } => {
                w.id(Some(*inst))?;
                write_update(w, old, new)
            }
            ConnectITerm { iterm, net } | DisconnectITerm { iterm, net } => {
                w.id(Some(*iterm))?;
                w.id(Some(*net))
            }
            CreateBTerm { bterm, record } | DestroyBTerm { bterm, record } => {
                w.id(Some(*bterm))?;
                w.record(record)
            }
            ConnectBTerm { bterm, net } | DisconnectBTerm { bterm, net } => {
                w.id(Some(*bterm))?;
                w.id(Some(*net))
            }
            UpdateBTerm { bterm, old, new } => {
                w.id(Some(*bterm))?;
                write_update(w, old, new)
            }
            CreateBlockage { blockage, record } | DestroyBlockage { blockage, record } => {
                w.id(Some(*blockage))?;
                w.record(record)
            }
            UpdateBlockage { blockage, old, new } => {
                w.id(Some(*blockage))?;
                write_update(w, old, new)
            }
            CreateCapNode { node, record } => {
                w.id(Some(*node))?;
                w.record(record)
            }
            DestroyCapNode {
                node,
                record,
                values,
            } => {
                w.id(Some(*node))?;
                w.record(record)?;
                w.f64s(values)
            }
            UpdateCapNode { node, old, new } => {
                w.id(Some(*node))?;
                write_update(w, old, new)
            }
            CreateRSeg { rseg, record } => {
                w.id(Some(*rseg))?;
                w.record(record)
            }
            DestroyRSeg {
                rseg,
                record,
                res,
                cap,
            } => {
                w.id(Some(*rseg))?;
                w.record(record)?;
                w.f64s(res)?;
                w.f64s(cap)
            }
            UpdateRSeg { rseg, old, new } => {
                w.id(Some(*rseg))?;
                write_update(w, old, new)
            }
            CreateCcSeg { seg, nodes } => {
                w.id(Some(*seg))?;
                w.id(Some(nodes[0]))?;
                w.id(Some(nodes[1]))
            }
            DestroyCcSeg {
                seg,
                record,
                values,
                adjusted,
            } => {
                w.id(Some(*seg))?;
                w.record(record)?;
                w.f64s(values)?;
                w.u32(adjusted.len() as u32)?;
                for (net, index) in adjusted.iter() {
                    w.id(Some(*net))?;
                    w.u32(*index)?;
                }
                Ok(())
            }
            UpdateCcSeg { seg, old, new } => {
                w.id(Some(*seg))?;
                write_update(w, old, new)
            }
            RetargetCcSeg { seg, from, to } => {
                w.id(Some(*seg))?;
                w.u8(CC_SEG_ENDPOINT)?;
                w.id(Some(*from))?;
                w.id(Some(*to))
            }
            AdjustCc {
                net,
                order,
                factor,
                threshold,
            } => write_adjust(w, ALGO_ADJUST_CC, *net, *order, *factor, *threshold),
            UndoAdjustCc {
                net,
                order,
                factor,
                threshold,
            } => write_adjust(w, ALGO_UNDO_ADJUST_CC, *net, *order, *factor, *threshold),
            SetDieArea { old, new } => {
                w.u8(BLOCK_DIE_AREA)?;
                w.rect(*old)?;
                w.rect(*new)
            }
            SetCorners { old, new } => {
                w.u8(BLOCK_CORNERS)?;
                write_corners(w, old)?;
                write_corners(w, new)
            }
        }
    }

    /// Reads the parameters of an action whose kind and object type are known.
    pub(crate) fn decode(
        kind: ActionKind,
        object: ObjectType,
        r: &mut ParamReader<'_>,
    ) -> Result<Self> {
        use ActionKind as K;
        use ObjectType as O;
        Ok(match (kind, object) {
            (K::CreateObject, O::Net) => Self::CreateNet {
                net: r.required_id()?,
                record: r.record()?,
            },
            (K::DeleteObject, O::Net) => Self::DestroyNet {
                net: r.required_id()?,
                record: r.record()?,
            },
            (K::UpdateField, O::Net) => {
                let net = r.required_id()?;
                let (old, new) = read_update(r)?;
                Self::UpdateNet { net, old, new }
            }
            (K::Algorithm, O::Net) => {
                let net = r.required_id()?;
                let algorithm = r.u8()?;
                let order = r.u32()?;
                let factor = r.f64()?;
                let threshold = r.f64()?;
                match algorithm {
                    ALGO_ADJUST_CC => Self::AdjustCc {
                        net,
                        order,
                        factor,
                        threshold,
                    },
                    ALGO_UNDO_ADJUST_CC => Self::UndoAdjustCc {
                        net,
                        order,
                        factor,
                        threshold,
                    },
                    other => return Err(r.corrupt(format!("unknown algorithm {other}"))),
                }
            }
            (K::CreateObject, O::Inst) => Self::CreateInst {
                inst: r.required_id()?,
                record: r.record()?,
            },
            (K::DeleteObject, O::Inst) => Self::DestroyInst {
                inst: r.required_id()?,
                record: r.record()?,
            },
            (K::UpdateField, O::Inst) => {
                let inst = r.required_id()?;
                let (old, new) = read_update(r)?;
                Self::UpdateInst { inst, old, new }
            }
            (K::ConnectObject, O::ITerm) => Self::ConnectITerm {
                iterm: r.required_id()?,
                net: r.required_id()?,
            },
            (K::DisconnectObject, O::ITerm) => Self::DisconnectITerm {
                iterm: r.required_id()?,
                net: r.required_id()?,
            },
            (K::CreateObject, O::BTerm) => Self::CreateBTerm {
                bterm: r.required_id()?,
                record: r.record()?,
            },
            (K::DeleteObject, O::BTerm) => Self::DestroyBTerm {
                bterm: r.required_id()?,
                record: r.record()?,
            },
            (K::ConnectObject, O::BTerm) => Self::ConnectBTerm {
                bterm: r.required_id()?,
                net: r.required_id()?,
            },
            (K::DisconnectObject, O::BTerm) => Self::DisconnectBTerm {
                bterm: r.required_id()?,
                net: r.required_id()?,
            },
            (K::UpdateField, O::BTerm) => {
                let bterm = r.required_id()?;
                let (old, new) = read_update(r)?;
                Self::UpdateBTerm { bterm, old, new }
            }
            (K::CreateObject, O::Blockage) => Self::CreateBlockage {
                blockage: r.required_id()?,
                record: r.record()?,
            },
            (K::DeleteObject, O::Blockage) => Self::DestroyBlockage {
                blockage: r.required_id()?,
                record: r.record()?,
            },
            (K::UpdateField, O::Blockage) => {
                let blockage = r.required_id()?;
                let (old, new) = read_update(r)?;
                Self::UpdateBlockage { blockage, old, new }
            }
            (K::CreateObject, O::CapNode) => Self::CreateCapNode {
                node: r.required_id()?,
                record: r.record()?,
            },
            (K::DeleteObject, O::CapNode) => Self::DestroyCapNode {
                node: r.required_id()?,
                record: r.record()?,
                values: r.f64s()?,
            },
            (K::UpdateField, O::CapNode) => {
                let node = r.required_id()?;
                let (old, new) = read_update(r)?;
                Self::UpdateCapNode { node, old, new }
            }
            (K::CreateObject, O::RSeg) => Self::CreateRSeg {
                rseg: r.required_id()?,
                record: r.record()?,
            },
            (K::DeleteObject, O::RSeg) => Self::DestroyRSeg {
                rseg: r.required_id()?,
                record: r.record()?,
                res: r.f64s()?,
                cap: r.f64s()?,
            },
            (K::UpdateField, O::RSeg) => {
                let rseg = r.required_id()?;
                let (old, new) = read_update(r)?;
                Self::UpdateRSeg { rseg, old, new }
            }
            (K::CreateObject, O::CcSeg) => Self::CreateCcSeg {
                seg: r.required_id()?,
                nodes: [r.required_id()?, r.required_id()?],
            },
            (K::DeleteObject, O::CcSeg) => {
                let seg = r.required_id()?;
                let record = r.record()?;
                let values = r.f64s()?;
                let count = r.u32()?;
                let adjusted = (0..count)
                    .map(|_| Ok((r.required_id()?, r.u32()?)))
                    .collect::<Result<Vec<_>>>()?;
                Self::DestroyCcSeg {
                    seg,
                    record,
                    values,
                    adjusted,
                }
            }
            (K::UpdateField, O::CcSeg) => {
                let seg = r.required_id()?;
                let field = r.u8()?;
                if field == CC_SEG_ENDPOINT {
                    Self::RetargetCcSeg {
                        seg,
                        from: r.required_id()?,
                        to: r.required_id()?,
                    }
                } else {
                    let old = CcSegValue::read_payload(field, r)?;
                    let new = CcSegValue::read_payload(field, r)?;
                    Self::UpdateCcSeg { seg, old, new }
                }
            }
            (K::UpdateField, O::Block) => match r.u8()? {
                BLOCK_DIE_AREA => Self::SetDieArea {
                    old: r.rect()?,
                    new: r.rect()?,
                },
                BLOCK_CORNERS => Self::SetCorners {
                    old: read_corners(r)?,
                    new: read_corners(r)?,
                },
                other => return Err(r.corrupt(format!("unknown block field {other}"))),
            },
            (kind, object) => {
                return Err(r.corrupt(format!("no {kind:?} action for {object:?}")));
            }
        })
    }
}

fn write_adjust(
    w: &mut ParamWriter<'_>,
    algorithm: u8,
    net: NetId,
    order: u32,
    factor: f64,
    threshold: f64,
) -> Result<()> {
    w.id(Some(net))?;
    w.u8(algorithm)?;
    w.u32(order)?;
    w.f64(factor)?;
    w.f64(threshold)
}

fn write_corners(w: &mut ParamWriter<'_>, info: &CornerInfo) -> Result<()> {
    w.u32(info.count() as u32)?;
    w.u32(info.ext_db_count() as u32)?;
    w.u32(info.names().len() as u32)?;
    for name in info.names() {
        w.str(name)?;
    }
    Ok(())
}

fn read_corners(r: &mut ParamReader<'_>) -> Result<CornerInfo> {
    let count = r.u32()? as usize;
    let ext_db_count = r.u32()? as usize;
    let n = r.u32()? as usize;
    let names = (0..n).map(|_| r.str()).collect::<Result<Vec<ArcStr>>>()?;
    CornerInfo::new(count, ext_db_count, names).map_err(|err| r.corrupt(err.to_string()))
}

/// An attribute value that update actions carry twice: before and after.
trait FieldValue: Sized {
    fn tag(&self) -> u8;
    fn write_payload(&self, w: &mut ParamWriter<'_>) -> Result<()>;
    fn read_payload(tag: u8, r: &mut ParamReader<'_>) -> Result<Self>;
}

fn write_update<V: FieldValue>(w: &mut ParamWriter<'_>, old: &V, new: &V) -> Result<()> {
    debug_assert_eq!(old.tag(), new.tag());
    w.u8(new.tag())?;
    old.write_payload(w)?;
    new.write_payload(w)
}

fn read_update<V: FieldValue>(r: &mut ParamReader<'_>) -> Result<(V, V)> {
    let tag = r.u8()?;
    let old = V::read_payload(tag, r)?;
    let new = V::read_payload(tag, r)?;
    Ok((old, new))
}

fn sig_type(r: &mut ParamReader<'_>) -> Result<SigType> {
    let code = r.u8()?;
    SigType::from_code(code).ok_or_else(|| r.corrupt(format!("invalid signal type {code}")))
}

fn io_type(r: &mut ParamReader<'_>) -> Result<IoType> {
    let code = r.u8()?;
    IoType::from_code(code).ok_or_else(|| r.corrupt(format!("invalid io type {code}")))
}

fn unknown_field(r: &ParamReader<'_>, what: &str, tag: u8) -> crate::error::OdbError {
    r.corrupt(format!("unknown {what} field {tag}"))
}

impl FieldValue for NetValue {
    fn tag(&self) -> u8 {
        match self {
            Self::Name(_) => 0,
            Self::SigType(_) => 1,
            Self::Special(_) => 2,
            Self::DontTouch(_) => 3,
            Self::Weight(_) => 4,
            Self::GndcCalibration(_) => 5,
            Self::CcCalibration(_) => 6,
            Self::NonDefaultRule(_) => 7,
        }
    }

    fn write_payload(&self, w: &mut ParamWriter<'_>) -> Result<()> {
        match self {
            Self::Name(name) => w.str(name),
            Self::SigType(sig) => w.u8(sig.code()),
            Self::Special(v) | Self::DontTouch(v) => w.bool(*v),
            Self::Weight(v) => w.u32(*v),
            Self::GndcCalibration(v) | Self::CcCalibration(v) => w.f64(*v),
            Self::NonDefaultRule(rule) => w.opt_str(rule.as_ref()),
        }
    }

    fn read_payload(tag: u8, r: &mut ParamReader<'_>) -> Result<Self> {
        Ok(match tag {
            0 => Self::Name(r.str()?),
            1 => Self::SigType(sig_type(r)?),
            2 => Self::Special(r.bool()?),
            3 => Self::DontTouch(r.bool()?),
            4 => Self::Weight(r.u32()?),
            5 => Self::GndcCalibration(r.f64()?),
            6 => Self::CcCalibration(r.f64()?),
            7 => Self::NonDefaultRule(r.opt_str()?),
            tag => return Err(unknown_field(r, "net", tag)),
        })
    }
}

impl FieldValue for InstValue {
    fn tag(&self) -> u8 {
        match self {
            Self::Name(_) => 0,
            Self::Location(_) => 1,
            Self::Orientation(_) => 2,
            Self::Status(_) => 3,
            Self::DontTouch(_) => 4,
        }
    }

    fn write_payload(&self, w: &mut ParamWriter<'_>) -> Result<()> {
        match self {
            Self::Name(name) => w.str(name),
            Self::Location(p) => w.point(*p),
            Self::Orientation(o) => w.u8(o.code()),
            Self::Status(s) => w.u8(s.code()),
            Self::DontTouch(v) => w.bool(*v),
        }
    }

    fn read_payload(tag: u8, r: &mut ParamReader<'_>) -> Result<Self> {
        Ok(match tag {
            0 => Self::Name(r.str()?),
            1 => Self::Location(r.point()?),
            2 => {
                let code = r.u8()?;
                Self::Orientation(
                    Orientation::from_code(code)
                        .ok_or_else(|| r.corrupt(format!("invalid orientation {code}")))?,
                )
            }
            3 => {
                let code = r.u8()?;
                Self::Status(
                    PlacementStatus::from_code(code)
                        .ok_or_else(|| r.corrupt(format!("invalid placement status {code}")))?,
                )
            }
            4 => Self::DontTouch(r.bool()?),
            tag => return Err(unknown_field(r, "instance", tag)),
        })
    }
}

impl FieldValue for BTermValue {
    fn tag(&self) -> u8 {
        match self {
            Self::IoType(_) => 0,
            Self::SigType(_) => 1,
        }
    }

    fn write_payload(&self, w: &mut ParamWriter<'_>) -> Result<()> {
        match self {
            Self::IoType(io) => w.u8(io.code()),
            Self::SigType(sig) => w.u8(sig.code()),
        }
    }

    fn read_payload(tag: u8, r: &mut ParamReader<'_>) -> Result<Self> {
        Ok(match tag {
            0 => Self::IoType(io_type(r)?),
            1 => Self::SigType(sig_type(r)?),
            tag => return Err(unknown_field(r, "block terminal", tag)),
        })
    }
}

impl FieldValue for BlockageValue {
    fn tag(&self) -> u8 {
        match self {
            Self::Soft(_) => 0,
            Self::MaxDensity(_) => 1,
        }
    }

    fn write_payload(&self, w: &mut ParamWriter<'_>) -> Result<()> {
        match self {
            Self::Soft(v) => w.bool(*v),
            Self::MaxDensity(v) => w.f64(*v),
        }
    }

    fn read_payload(tag: u8, r: &mut ParamReader<'_>) -> Result<Self> {
        Ok(match tag {
            0 => Self::Soft(r.bool()?),
            1 => Self::MaxDensity(r.f64()?),
            tag => return Err(unknown_field(r, "blockage", tag)),
        })
    }
}

impl FieldValue for CapNodeValue {
    fn tag(&self) -> u8 {
        match self {
            Self::Kind(_) => 0,
            Self::Foreign(_) => 1,
            Self::Cap { .. } => 2,
        }
    }

    fn write_payload(&self, w: &mut ParamWriter<'_>) -> Result<()> {
        match self {
            Self::Kind(kind) => {
                w.u8(kind.tag())?;
                w.u32(kind.node_num())
            }
            Self::Foreign(v) => w.bool(*v),
            Self::Cap { corner, value } => {
                w.u32(*corner as u32)?;
                w.f64(*value)
            }
        }
    }

    fn read_payload(tag: u8, r: &mut ParamReader<'_>) -> Result<Self> {
        Ok(match tag {
            0 => {
                let kind = r.u8()?;
                let num = r.u32()?;
                Self::Kind(
                    NodeRef::from_parts(kind, num)
                        .ok_or_else(|| r.corrupt(format!("invalid node kind {kind}/{num}")))?,
                )
            }
            1 => Self::Foreign(r.bool()?),
            2 => Self::Cap {
                corner: r.u32()? as usize,
                value: r.f64()?,
            },
            tag => return Err(unknown_field(r, "cap node", tag)),
        })
    }
}

impl FieldValue for RSegValue {
    fn tag(&self) -> u8 {
        match self {
            Self::Source(_) => 0,
            Self::Target(_) => 1,
            Self::Coords(_) => 2,
            Self::PathDir(_) => 3,
            Self::Res { .. } => 4,
            Self::Cap { .. } => 5,
        }
    }

    fn write_payload(&self, w: &mut ParamWriter<'_>) -> Result<()> {
        match self {
            Self::Source(node) | Self::Target(node) => w.id(*node),
            Self::Coords(p) => w.point(*p),
            Self::PathDir(v) => w.bool(*v),
            Self::Res { corner, value } | Self::Cap { corner, value } => {
                w.u32(*corner as u32)?;
                w.f64(*value)
            }
        }
    }

    fn read_payload(tag: u8, r: &mut ParamReader<'_>) -> Result<Self> {
        Ok(match tag {
            0 => Self::Source(r.id()?),
            1 => Self::Target(r.id()?),
            2 => Self::Coords(r.point()?),
            3 => Self::PathDir(r.bool()?),
            4 => Self::Res {
                corner: r.u32()? as usize,
                value: r.f64()?,
            },
            5 => Self::Cap {
                corner: r.u32()? as usize,
                value: r.f64()?,
            },
            tag => return Err(unknown_field(r, "resistance segment", tag)),
        })
    }
}

impl FieldValue for CcSegValue {
    fn tag(&self) -> u8 {
        match self {
            Self::Cap { .. } => 0,
        }
    }

    fn write_payload(&self, w: &mut ParamWriter<'_>) -> Result<()> {
        match self {
            Self::Cap { corner, value } => {
                w.u32(*corner as u32)?;
                w.f64(*value)
            }
        }
    }

    fn read_payload(tag: u8, r: &mut ParamReader<'_>) -> Result<Self> {
        Ok(match tag {
            0 => Self::Cap {
                corner: r.u32()? as usize,
                value: r.f64()?,
            },
            tag => return Err(unknown_field(r, "coupling segment", tag)),
        })
    }
}
