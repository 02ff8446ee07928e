//! Binary layout of blocks and their records.
//!
//! Fields added after the first schema are guarded on both the write and
//! the read side, so a database written with an older schema still reads,
//! with the newer fields at their defaults.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::ops::RangeInclusive;
use std::sync::Arc;

use arcstr::ArcStr;
use dbtable::{DbReader, DbWriter, NameIndex, PagedValues, Persist, StreamError, Table};

use super::{Block, BTerm, Blockage, CornerInfo, GlobalConnect, ITerm, Inst, Net, PlacementStatus};
use crate::database::BlockKey;
use crate::error::{ErrorSource, Result};
use crate::geom::{Orientation, Point, Rect};
use crate::parasitics::{flags_from_byte, flags_to_byte, CapNode, CcAdjustment, CcSeg, NodeRef, RSeg};
use crate::tech::{read_code, IoType, Master, SigType, Tech};

pub const SCHEMA_INITIAL: u32 = 1;
/// Nets carry calibration factors and coupling adjustments.
pub const SCHEMA_NET_CALIBRATION: u32 = 2;
/// Blockages carry a maximum placement density.
pub const SCHEMA_BLOCKAGE_DENSITY: u32 = 3;
pub const SCHEMA_CURRENT: u32 = SCHEMA_BLOCKAGE_DENSITY;

pub const SUPPORTED_SCHEMAS: RangeInclusive<u32> = SCHEMA_INITIAL..=SCHEMA_CURRENT;

type StreamResult<T> = std::result::Result<T, StreamError>;

fn write_opt_str<W: Write>(w: &mut DbWriter<W>, v: Option<&ArcStr>) -> StreamResult<()> {
    w.write_bool(v.is_some())?;
    match v {
        Some(s) => w.write_str(s),
        None => Ok(()),
    }
}

fn read_opt_str<R: Read>(r: &mut DbReader<R>) -> StreamResult<Option<ArcStr>> {
    Ok(if r.read_bool()? {
        Some(r.read_arcstr()?)
    } else {
        None
    })
}

impl Persist for Point {
    fn write<W: Write>(&self, w: &mut DbWriter<W>) -> StreamResult<()> {
        w.write_i64(self.x)?;
        w.write_i64(self.y)
    }

    fn read<R: Read>(r: &mut DbReader<R>) -> StreamResult<Self> {
        Ok(Point::new(r.read_i64()?, r.read_i64()?))
    }
}

impl Persist for Rect {
    fn write<W: Write>(&self, w: &mut DbWriter<W>) -> StreamResult<()> {
        self.p0().write(w)?;
        self.p1().write(w)
    }

    fn read<R: Read>(r: &mut DbReader<R>) -> StreamResult<Self> {
        Ok(Rect::new(Point::read(r)?, Point::read(r)?))
    }
}

impl Persist for CornerInfo {
    fn write<W: Write>(&self, w: &mut DbWriter<W>) -> StreamResult<()> {
        w.write_u32(self.count as u32)?;
        w.write_u32(self.ext_db_count as u32)?;
        self.names.write(w)
    }

    fn read<R: Read>(r: &mut DbReader<R>) -> StreamResult<Self> {
        let count = r.read_u32()? as usize;
        let ext_db_count = r.read_u32()? as usize;
        let names = Vec::<ArcStr>::read(r)?;
        if count == 0 || (!names.is_empty() && names.len() != count) {
            return Err(StreamError::InvalidValue {
                what: "corner count",
                value: count as u64,
            });
        }
        Ok(CornerInfo {
            count,
            ext_db_count,
            names,
        })
    }
}

impl Persist for CcAdjustment {
    fn write<W: Write>(&self, w: &mut DbWriter<W>) -> StreamResult<()> {
        w.write_u32(self.order)?;
        w.write_f64(self.factor)?;
        w.write_f64(self.threshold)?;
        self.segs.write(w)?;
        self.halo.write(w)
    }

    fn read<R: Read>(r: &mut DbReader<R>) -> StreamResult<Self> {
        Ok(CcAdjustment {
            order: r.read_u32()?,
            factor: r.read_f64()?,
            threshold: r.read_f64()?,
            segs: r.read()?,
            halo: r.read()?,
        })
    }
}

impl Persist for Net {
    fn write<W: Write>(&self, w: &mut DbWriter<W>) -> StreamResult<()> {
        w.write_str(&self.name)?;
        w.write_u8(self.sig_type.code())?;
        w.write_bool(self.special)?;
        w.write_bool(self.dont_touch)?;
        w.write_u32(self.weight)?;
        if w.has_schema(SCHEMA_NET_CALIBRATION) {
            w.write_f64(self.gndc_calibration)?;
            w.write_f64(self.cc_calibration)?;
        }
        write_opt_str(w, self.non_default_rule.as_ref())?;
        w.write_id(self.first_cap_node)?;
        w.write_id(self.first_rseg)?;
        self.iterms.write(w)?;
        self.bterms.write(w)?;
        if w.has_schema(SCHEMA_NET_CALIBRATION) {
            self.cc_adjustments.write(w)?;
        }
        Ok(())
    }

    fn read<R: Read>(r: &mut DbReader<R>) -> StreamResult<Self> {
        let mut net = Net::new(r.read_arcstr()?);
        net.sig_type = read_code(r, "signal type", SigType::from_code)?;
        net.special = r.read_bool()?;
        net.dont_touch = r.read_bool()?;
        net.weight = r.read_u32()?;
        if r.has_schema(SCHEMA_NET_CALIBRATION) {
            net.gndc_calibration = r.read_f64()?;
            net.cc_calibration = r.read_f64()?;
        }
        net.non_default_rule = read_opt_str(r)?;
        net.first_cap_node = r.read_id()?;
        net.first_rseg = r.read_id()?;
        net.iterms = r.read()?;
        net.bterms = r.read()?;
        if r.has_schema(SCHEMA_NET_CALIBRATION) {
            net.cc_adjustments = r.read()?;
        }
        Ok(net)
    }
}

impl Persist for Inst {
    fn write<W: Write>(&self, w: &mut DbWriter<W>) -> StreamResult<()> {
        w.write_str(&self.name)?;
        w.write_str(&self.master)?;
        self.location.write(w)?;
        w.write_u8(self.orientation.code())?;
        w.write_u8(self.status.code())?;
        w.write_bool(self.dont_touch)?;
        self.iterms.write(w)
    }

    fn read<R: Read>(r: &mut DbReader<R>) -> StreamResult<Self> {
        let name = r.read_arcstr()?;
        let master = r.read_arcstr()?;
        let mut inst = Inst::new(name, master);
        inst.location = Point::read(r)?;
        inst.orientation = read_code(r, "orientation", Orientation::from_code)?;
        inst.status = read_code(r, "placement status", PlacementStatus::from_code)?;
        inst.dont_touch = r.read_bool()?;
        inst.iterms = r.read()?;
        Ok(inst)
    }
}

impl Persist for ITerm {
    fn write<W: Write>(&self, w: &mut DbWriter<W>) -> StreamResult<()> {
        w.write_id(Some(self.inst))?;
        w.write_u32(self.mterm)?;
        w.write_id(self.net)
    }

    fn read<R: Read>(r: &mut DbReader<R>) -> StreamResult<Self> {
        Ok(ITerm {
            inst: r.read_required_id()?,
            mterm: r.read_u32()?,
            net: r.read_id()?,
        })
    }
}

impl Persist for BTerm {
    fn write<W: Write>(&self, w: &mut DbWriter<W>) -> StreamResult<()> {
        w.write_str(&self.name)?;
        w.write_id(self.net)?;
        w.write_u8(self.io_type.code())?;
        w.write_u8(self.sig_type.code())
    }

    fn read<R: Read>(r: &mut DbReader<R>) -> StreamResult<Self> {
        let mut bterm = BTerm::new(r.read_arcstr()?);
        bterm.net = r.read_id()?;
        bterm.io_type = read_code(r, "io type", IoType::from_code)?;
        bterm.sig_type = read_code(r, "signal type", SigType::from_code)?;
        Ok(bterm)
    }
}

impl Persist for Blockage {
    fn write<W: Write>(&self, w: &mut DbWriter<W>) -> StreamResult<()> {
        self.rect.write(w)?;
        w.write_id(self.inst)?;
        w.write_bool(self.soft)?;
        if w.has_schema(SCHEMA_BLOCKAGE_DENSITY) {
            w.write_f64(self.max_density)?;
        }
        Ok(())
    }

    fn read<R: Read>(r: &mut DbReader<R>) -> StreamResult<Self> {
        let mut blockage = Blockage::new(Rect::read(r)?, r.read_id()?);
        blockage.soft = r.read_bool()?;
        if r.has_schema(SCHEMA_BLOCKAGE_DENSITY) {
            blockage.max_density = r.read_f64()?;
        }
        Ok(blockage)
    }
}

impl Persist for CapNode {
    fn write<W: Write>(&self, w: &mut DbWriter<W>) -> StreamResult<()> {
        w.write_id(Some(self.net))?;
        w.write_id(self.next)?;
        w.write_u8(self.kind.tag())?;
        w.write_u32(self.kind.node_num())?;
        w.write_id(self.cc_segs)?;
        w.write_u8(flags_to_byte(&self.flags))?;
        w.write_u32(self.child_count)
    }

    fn read<R: Read>(r: &mut DbReader<R>) -> StreamResult<Self> {
        let net = r.read_required_id()?;
        let next = r.read_id()?;
        let tag = r.read_u8()?;
        let num = r.read_u32()?;
        let kind = NodeRef::from_parts(tag, num).ok_or(StreamError::InvalidTag {
            what: "cap node kind",
            tag,
        })?;
        Ok(CapNode {
            net,
            next,
            kind,
            cc_segs: r.read_id()?,
            flags: flags_from_byte(r.read_u8()?),
            child_count: r.read_u32()?,
            sort_index: 0,
        })
    }
}

impl Persist for RSeg {
    fn write<W: Write>(&self, w: &mut DbWriter<W>) -> StreamResult<()> {
        w.write_id(Some(self.net))?;
        w.write_id(self.next)?;
        w.write_id(self.source)?;
        w.write_id(self.target)?;
        self.coords.write(w)?;
        w.write_bool(self.path_dir)?;
        w.write_bool(self.allocated_cap)
    }

    fn read<R: Read>(r: &mut DbReader<R>) -> StreamResult<Self> {
        Ok(RSeg {
            net: r.read_required_id()?,
            next: r.read_id()?,
            source: r.read_id()?,
            target: r.read_id()?,
            coords: Point::read(r)?,
            path_dir: r.read_bool()?,
            allocated_cap: r.read_bool()?,
        })
    }
}

impl Persist for CcSeg {
    fn write<W: Write>(&self, w: &mut DbWriter<W>) -> StreamResult<()> {
        for node in self.nodes {
            w.write_id(Some(node))?;
        }
        for next in self.next {
            w.write_id(next)?;
        }
        w.write_u8(flags_to_byte(&self.flags))?;
        w.write_u32(self.infile_count)
    }

    fn read<R: Read>(r: &mut DbReader<R>) -> StreamResult<Self> {
        Ok(CcSeg {
            nodes: [r.read_required_id()?, r.read_required_id()?],
            next: [r.read_id()?, r.read_id()?],
            flags: flags_from_byte(r.read_u8()?),
            infile_count: r.read_u32()?,
        })
    }
}

fn build_index<T: dbtable::Record>(
    table: &Table<T>,
    name: impl Fn(&T) -> &ArcStr,
) -> Result<NameIndex<T>> {
    let mut index = NameIndex::new();
    for (id, record) in table.iter() {
        let name = name(record).clone();
        index
            .insert(name.clone(), id)
            .map_err(|_| ErrorSource::NameConflict { kind: T::KIND, name })?;
    }
    Ok(index)
}

impl Block {
    /// Writes everything but the block's position in the hierarchy.
    pub(crate) fn write_body<W: Write>(&self, w: &mut DbWriter<W>) -> StreamResult<()> {
        w.write_str(&self.name)?;
        self.die_area.write(w)?;
        self.corners.write(w)?;
        w.write_bool(self.ext_corner.is_some())?;
        w.write_u32(self.ext_corner.unwrap_or_default() as u32)?;
        w.write_bool(self.merge_parallel_cc)?;

        let mut masters: Vec<&ArcStr> = self.masters.keys().collect();
        masters.sort();
        w.write_len(masters.len())?;
        for name in masters {
            w.write_str(name)?;
        }

        self.nets.write(w)?;
        self.insts.write(w)?;
        self.iterms.write(w)?;
        self.bterms.write(w)?;
        self.blockages.write(w)?;
        self.cap_nodes.write(w)?;
        self.rsegs.write(w)?;
        self.cc_segs.write(w)?;
        self.res_values.write(w)?;
        self.cap_values.write(w)?;
        self.cc_values.write(w)?;
        self.node_values.write(w)?;

        let rules = self.global_connect_rules();
        w.write_len(rules.len())?;
        for rule in rules {
            w.write_bool(rule.region().is_some())?;
            rule.region().unwrap_or_default().write(w)?;
            w.write_str(rule.inst_pattern())?;
            w.write_str(rule.pin_pattern())?;
            w.write_id(Some(rule.net()))?;
            w.write_bool(rule.do_connect())?;
        }
        Ok(())
    }

    /// Reads a block written by [`Block::write_body`].
    ///
    /// Masters are resolved by name through `find_master`.
    pub(crate) fn read_body<R: Read>(
        r: &mut DbReader<R>,
        key: BlockKey,
        parent: Option<BlockKey>,
        tech: Arc<Tech>,
        find_master: impl Fn(&str) -> Option<Arc<Master>>,
    ) -> Result<Self> {
        let name = r.read_arcstr()?;
        let die_area = Rect::read(r)?;
        let corners = CornerInfo::read(r)?;
        let has_ext_corner = r.read_bool()?;
        let ext_corner = r.read_u32()? as usize;
        let merge_parallel_cc = r.read_bool()?;

        let nmasters = r.read_len()?;
        let mut masters = HashMap::new();
        for _ in 0..nmasters {
            let master_name = r.read_arcstr()?;
            let master = find_master(&master_name).ok_or_else(|| ErrorSource::NotFound {
                kind: "master",
                name: master_name.clone(),
            })?;
            masters.insert(master_name, master);
        }

        let nets: Table<Net> = r.read()?;
        let insts: Table<Inst> = r.read()?;
        let iterms = r.read()?;
        let bterms: Table<BTerm> = r.read()?;
        let blockages = r.read()?;
        let cap_nodes = r.read()?;
        let rsegs = r.read()?;
        let cc_segs = r.read()?;
        let res_values: PagedValues = r.read()?;
        let cap_values: PagedValues = r.read()?;
        let cc_values: PagedValues = r.read()?;
        let node_values: PagedValues = r.read()?;
        for values in [&res_values, &cap_values, &cc_values, &node_values] {
            if values.corners() != corners.count() {
                return Err(ErrorSource::InvalidArgs(format!(
                    "block {name} stores values for {} corners but declares {}",
                    values.corners(),
                    corners.count()
                ))
                .into());
            }
        }

        let mut block = Block {
            key,
            net_names: build_index(&nets, |n: &Net| &n.name)?,
            inst_names: build_index(&insts, |i: &Inst| &i.name)?,
            bterm_names: build_index(&bterms, |b: &BTerm| &b.name)?,
            name,
            parent,
            children: Vec::new(),
            tech,
            masters,
            die_area,
            corners,
            ext_corner: has_ext_corner.then_some(ext_corner),
            merge_parallel_cc,
            nets,
            insts,
            iterms,
            bterms,
            blockages,
            cap_nodes,
            rsegs,
            cc_segs,
            res_values,
            cap_values,
            cc_values,
            node_values,
            journal: None,
            global_connect: GlobalConnect::default(),
            _not_sync: Default::default(),
        };

        let nrules = r.read_len()?;
        for _ in 0..nrules {
            let has_region = r.read_bool()?;
            let region = Rect::read(r)?;
            let inst_pattern = r.read_string()?;
            let pin_pattern = r.read_string()?;
            let net = r.read_required_id()?;
            let do_connect = r.read_bool()?;
            block.add_global_connect(
                has_region.then_some(region),
                &inst_pattern,
                &pin_pattern,
                net,
                do_connect,
            )?;
        }
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::NetId;
    use crate::parasitics::{CapNodeId, CcSegId, RSegId};

    fn round_trip<P: Persist>(value: &P, schema: u32) -> P {
        let mut w = DbWriter::new(Vec::new(), schema);
        value.write(&mut w).unwrap();
        let bytes = w.into_inner();
        let mut r = DbReader::new(bytes.as_slice(), schema);
        P::read(&mut r).unwrap()
    }

    #[test]
    fn old_schema_drops_net_calibration() {
        let mut net = Net::new("clk".into());
        net.gndc_calibration = 0.8;
        net.non_default_rule = Some("wide".into());
        assert_eq!(round_trip(&net, SCHEMA_CURRENT), net);

        let old = round_trip(&net, SCHEMA_INITIAL);
        assert_eq!(old.gndc_calibration, 1.0);
        assert_eq!(old.non_default_rule.as_deref(), Some("wide"));
    }

    #[test]
    fn blockage_density_needs_schema_3() {
        let mut blockage = Blockage::new(Rect::from_coords(0, 0, 10, 10), None);
        blockage.max_density = 60.0;
        assert_eq!(round_trip(&blockage, SCHEMA_BLOCKAGE_DENSITY).max_density, 60.0);
        assert_eq!(round_trip(&blockage, SCHEMA_NET_CALIBRATION).max_density, 0.0);
    }

    #[test]
    fn parasitic_records_survive_every_schema() {
        let net = NetId::from_raw(3).unwrap();
        let (a, b) = (CapNodeId::from_raw(4).unwrap(), CapNodeId::from_raw(9).unwrap());

        let mut rseg = RSeg::new(net, Some(a), Some(b), Point::new(-20, 35), false);
        rseg.next = RSegId::from_raw(2);
        rseg.path_dir = true;

        let mut seg = CcSeg::new([a, b]);
        seg.next = [CcSegId::from_raw(1), None];
        seg.flags.set(0, true);
        seg.infile_count = 6;

        let adjustment = CcAdjustment {
            order: 2,
            factor: 0.5,
            threshold: 1e-15,
            segs: vec![CcSegId::from_raw(1).unwrap(), CcSegId::from_raw(7).unwrap()],
            halo: vec![NetId::from_raw(5).unwrap()],
        };

        for schema in SUPPORTED_SCHEMAS {
            assert_eq!(round_trip(&rseg, schema), rseg);
            let back = round_trip(&seg, schema);
            assert_eq!(back, seg);
            assert!(back.is_marked());
            assert_eq!(round_trip(&adjustment, schema), adjustment);
        }
    }

    #[test]
    fn cap_node_keeps_kind_and_flags() {
        let net = NetId::from_raw(2).unwrap();
        let mut node = CapNode::new(net, NodeRef::Branch(17), true);
        node.sort_index = 5;
        let back = round_trip(&node, SCHEMA_CURRENT);
        assert_eq!(back.kind(), NodeRef::Branch(17));
        assert!(back.is_foreign());
        assert_eq!(back.sort_index, 0);
    }
}
