use std::sync::Arc;

use odb::block::Block;
use odb::database::{BlockKey, Database};
use odb::error::{ErrorContext, ErrorSource, InvariantError};
use odb::geom::{Point, Rect};
use odb::journal::{Journal, JournalEntry};
use odb::parasitics::NodeRef;
use odb::tech::{Master, Tech};

mod common;
use common::{config, master, stdcells, CORNERS};

/// Everything observable about a block's nets and parasitics, ordered by
/// handle so chain order does not matter.
#[derive(Debug, PartialEq)]
struct Snapshot {
    nets: Vec<(u32, String, Vec<u32>, usize)>,
    nodes: Vec<(u32, u32, Vec<f64>)>,
    cc_segs: Vec<(u32, [u32; 2], Vec<f64>)>,
    rsegs: Vec<(u32, Option<u32>, Option<u32>, Vec<f64>, Vec<f64>)>,
    insts: Vec<(u32, String, Point)>,
}

fn snapshot(block: &Block) -> Snapshot {
    let mut snap = Snapshot {
        nets: Vec::new(),
        nodes: Vec::new(),
        cc_segs: Vec::new(),
        rsegs: Vec::new(),
        insts: Vec::new(),
    };
    for (id, net) in block.nets() {
        let mut iterms: Vec<u32> = net.iterms().iter().map(|t| t.raw()).collect();
        iterms.sort();
        snap.nets.push((
            id.raw(),
            net.name().to_string(),
            iterms,
            net.cc_adjustments().len(),
        ));
        for (node, record) in block.net_cap_nodes(id).unwrap() {
            snap.nodes
                .push((node.raw(), record.node_num(), block.cap_node_caps(node).unwrap()));
            for (seg, record) in block.cap_node_cc_segs(node).unwrap() {
                if record.source() == node {
                    let nodes = record.nodes().map(|n| n.raw());
                    snap.cc_segs
                        .push((seg.raw(), nodes, block.cc_seg_caps(seg).unwrap()));
                }
            }
        }
        for (rseg, record) in block.net_rsegs(id).unwrap() {
            let res = (0..block.corner_count())
                .map(|c| block.rseg_res(rseg, c).unwrap())
                .collect();
            let cap = (0..block.corner_count())
                .map(|c| block.rseg_cap(rseg, c).unwrap())
                .collect();
            snap.rsegs.push((
                rseg.raw(),
                record.source().map(|n| n.raw()),
                record.target().map(|n| n.raw()),
                res,
                cap,
            ));
        }
    }
    for (id, inst) in block.insts() {
        snap.insts
            .push((id.raw(), inst.name().to_string(), inst.location()));
    }
    snap.nets.sort_by_key(|n| n.0);
    snap.nodes.sort_by_key(|n| n.0);
    snap.cc_segs.sort_by_key(|s| s.0);
    snap.rsegs.sort_by_key(|r| r.0);
    snap.insts.sort_by_key(|i| i.0);
    snap
}

/// A small extracted design: an inverter driving `mid`, which has a
/// three-node RC path coupled to `out`.
fn build_base(block: &mut Block, inv: &Arc<Master>) {
    let input = block.create_net("in").unwrap();
    let mid = block.create_net("mid").unwrap();
    let out = block.create_net("out").unwrap();
    let u1 = block.create_inst(inv, "u1").unwrap();
    let a = block.find_iterm(u1, "A").unwrap().unwrap();
    let y = block.find_iterm(u1, "Y").unwrap().unwrap();
    block.connect_iterm(a, input).unwrap();
    block.connect_iterm(y, mid).unwrap();

    let nodes: Vec<_> = (0..3)
        .map(|n| block.create_cap_node(mid, NodeRef::Internal(n), false).unwrap())
        .collect();
    for i in 0..2 {
        let rseg = block
            .create_rseg(mid, Some(nodes[i]), Some(nodes[i + 1]), Point::new(10 * i as i64, 0), true)
            .unwrap();
        for corner in 0..CORNERS {
            block.set_rseg_res(rseg, corner, 5.0 + corner as f64).unwrap();
            block.set_rseg_cap(rseg, corner, 0.25).unwrap();
        }
    }
    let victim = block.create_cap_node(out, NodeRef::Internal(0), false).unwrap();
    block
        .couple(nodes[1], victim, &[2.0, 4.0, 8.0], true)
        .unwrap();
    block
        .couple(nodes[2], victim, &[0.5, 0.5, 0.5], true)
        .unwrap();
    block.set_cap_node_cap(victim, 0, 1.5).unwrap();
}

/// An ECO touching every kind of action.
fn run_eco(block: &mut Block, buf: &Arc<Master>) {
    let mid = block.find_net("mid").unwrap();
    let out = block.find_net("out").unwrap();
    let spare = block.create_net("spare").unwrap();
    block.set_net_weight(spare, 3).unwrap();

    let u2 = block.create_inst(buf, "u2").unwrap();
    block.set_inst_location(u2, Point::new(2000, 0)).unwrap();
    let x = block.find_iterm(u2, "X").unwrap().unwrap();
    block.connect_iterm(x, out).unwrap();
    let u1 = block.find_inst("u1").unwrap();
    let y = block.find_iterm(u1, "Y").unwrap().unwrap();
    block.connect_iterm(y, spare).unwrap();

    block.adjust_cc(mid, 1, 0.5, 1.0).unwrap();
    let path: Vec<_> = block.net_rsegs(mid).unwrap().map(|(id, _)| id).collect();
    // Segments are chained newest first.
    let path: Vec<_> = path.into_iter().rev().collect();
    block.merge_rcs(mid, &path).unwrap();

    let victim = block.net_cap_nodes(out).unwrap().next().unwrap().0;
    block.add_cap_node_cap(victim, 2, 0.75).unwrap();
    block.rename_net(out, "out_eco").unwrap();
    block
        .set_die_area(Rect::from_coords(0, 0, 4000, 4000))
        .unwrap();
    let blockage = block.create_blockage(Rect::from_coords(0, 0, 10, 10), None).unwrap();
    block.set_blockage_max_density(blockage, 25.0).unwrap();
}

/// Two identical top blocks in one database.
fn twin_blocks() -> (Database, BlockKey, BlockKey) {
    let mut db = Database::new(Tech::new("test18", 1000), config(CORNERS));
    db.add_library(stdcells()).unwrap();
    let inv = master(&db, "INV");
    let golden = db.create_block("golden", None).unwrap();
    let copy = db.create_block("copy", None).unwrap();
    for key in [golden, copy] {
        build_base(db.block_mut(key).unwrap(), &inv);
    }
    (db, golden, copy)
}

#[test]
fn test_replay_reproduces_eco() {
    let (mut db, golden, copy) = twin_blocks();
    let buf = master(&db, "BUF");
    {
        let block = db.block_mut(golden).unwrap();
        block.begin_eco().unwrap();
        run_eco(block, &buf);
    }
    let journal = db.block_mut(golden).unwrap().end_eco().unwrap();
    assert!(!journal.is_empty());

    let summary = db.apply_eco(copy, &journal).unwrap();
    assert_eq!(summary.total(), journal.len());
    assert_eq!(summary.algorithms, 1);

    let [golden, copy] = db.block_pair_mut(golden, copy).unwrap();
    assert_eq!(snapshot(golden), snapshot(copy));
    assert_eq!(golden.die_area(), copy.die_area());
    assert!(!copy.is_journaling());
    assert_eq!(copy.blockages().count(), 1);
}

#[test]
fn test_journal_survives_serialization() {
    let (mut db, golden, copy) = twin_blocks();
    let buf = master(&db, "BUF");
    let block = db.block_mut(golden).unwrap();
    block.begin_eco().unwrap();
    run_eco(block, &buf);
    let journal = block.end_eco().unwrap();

    let bytes = journal.to_bytes().unwrap();
    let restored = Journal::from_bytes(&bytes).unwrap();
    assert_eq!(restored.len(), journal.len());
    db.apply_eco(copy, &restored).unwrap();
    assert_eq!(
        snapshot(db.block(golden).unwrap()),
        snapshot(db.block(copy).unwrap())
    );
}

#[test]
fn test_undo_eco_restores_block() {
    let (mut db, golden, _) = twin_blocks();
    let buf = master(&db, "BUF");
    let block = db.block_mut(golden).unwrap();
    let before = snapshot(block);
    let die = block.die_area();

    block.begin_eco().unwrap();
    run_eco(block, &buf);
    assert_ne!(snapshot(block), before);

    let summary = block.undo_eco().unwrap();
    assert!(summary.total() > 0);
    assert!(!block.is_journaling());
    assert_eq!(snapshot(block), before);
    assert_eq!(block.die_area(), die);
    assert_eq!(block.find_net("spare"), None);
    assert_eq!(block.blockages().count(), 0);

    assert!(block.undo_eco().is_err());
}

#[test]
fn test_corner_changes_cannot_be_undone() {
    let (mut db, golden, _) = twin_blocks();
    let block = db.block_mut(golden).unwrap();
    block.begin_eco().unwrap();
    block.set_corner_count(1, 1, Vec::new()).unwrap();
    let err = block.undo_eco().unwrap_err();
    assert!(matches!(
        err.source(),
        ErrorSource::InternalInvariant(InvariantError::UnsupportedUndo(_))
    ));
}

#[test]
fn test_corrupt_journals_are_rejected() {
    let (mut db, golden, copy) = twin_blocks();
    let block = db.block_mut(golden).unwrap();
    block.begin_eco().unwrap();
    let net = block.create_net("extra").unwrap();
    block.set_net_weight(net, 7).unwrap();
    let journal = block.end_eco().unwrap();

    let bytes = journal.to_bytes().unwrap();
    assert!(Journal::from_bytes(&bytes[..bytes.len() - 1]).is_err());
    let mut damaged = bytes.clone();
    let last = damaged.len() - 5;
    damaged[last] ^= 0xFF;
    assert!(Journal::from_bytes(&damaged).is_err());

    // A well-formed journal whose handles do not exist in the target fails
    // with the offending action named.
    let target = db.create_block("empty", None).unwrap();
    let mut bad = Journal::new();
    bad.record(&JournalEntry::DestroyNet {
        net,
        record: db.block(golden).unwrap().net(net).unwrap().clone(),
    })
    .unwrap();
    let err = db.apply_eco(target, &bad).unwrap_err();
    assert!(err
        .context()
        .iter()
        .any(|ctx| matches!(ctx, ErrorContext::Replay { offset: 0, .. })));
    assert_eq!(db.block(target).unwrap().net_count(), 0);
    assert_eq!(db.block(copy).unwrap().find_net("extra"), None);
}
