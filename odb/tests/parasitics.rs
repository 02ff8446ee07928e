use float_eq::assert_float_eq;
use odb::error::ErrorSource;
use odb::geom::Point;
use odb::parasitics::{NodeRef, ParasiticState};

mod common;
use common::{coupled_pair, net_with_nodes, setup_db, CORNERS};

#[test]
fn test_ground_cc_splits_coupling_to_both_nets() {
    let (mut db, top) = setup_db(1);
    let block = db.block_mut(top).unwrap();
    let (n1, nodes) = net_with_nodes(block, "n1", &[1]);
    let n2 = block.create_net("n2").unwrap();
    let foreign = block.create_cap_node(n2, NodeRef::Internal(7), true).unwrap();
    let seg = block.couple(nodes[0], foreign, &[2.0], true).unwrap();

    assert_float_eq!(block.total_coupling_cap(n1, 0).unwrap(), 2.0, abs <= 1e-12);
    assert!(block.ground_cc(n1, 0.5).unwrap());
    assert_float_eq!(block.cap_node_cap(nodes[0], 0).unwrap(), 1.0, abs <= 1e-12);
    assert_float_eq!(block.cap_node_cap(foreign, 0).unwrap(), 1.0, abs <= 1e-12);
    assert_float_eq!(block.cc_seg_cap(seg, 0).unwrap(), 2.0, abs <= 1e-12);
}

#[test]
fn test_ground_cc_limits() {
    let (mut db, top) = setup_db(CORNERS);
    let block = db.block_mut(top).unwrap();
    let (a, b, na, nb) = coupled_pair(block, &[1.0, 2.0, 3.0]);

    assert!(!block.ground_cc(a, 0.0).unwrap());
    for corner in 0..CORNERS {
        assert_float_eq!(block.cap_node_cap(na, corner).unwrap(), 0.0, abs <= 1e-12);
    }

    // Only the net with the smaller handle grounds a shared edge.
    assert!(!block.ground_cc(b, 1.0).unwrap());
    assert!(block.ground_cc(a, 1.0).unwrap());
    for (corner, cap) in [1.0, 2.0, 3.0].into_iter().enumerate() {
        assert_float_eq!(block.cap_node_cap(na, corner).unwrap(), cap, abs <= 1e-12);
        assert_float_eq!(block.cap_node_cap(nb, corner).unwrap(), cap, abs <= 1e-12);
    }
}

#[test]
fn test_parallel_coupling_merges() {
    let (mut db, top) = setup_db(2);
    let block = db.block_mut(top).unwrap();
    let (a, b, na, nb) = coupled_pair(block, &[1.0, 0.5]);

    let merged = block.couple(nb, na, &[0.25, 0.25], true).unwrap();
    assert_eq!(block.find_cc_seg(na, nb).unwrap(), Some(merged));
    assert_float_eq!(block.cc_seg_cap(merged, 0).unwrap(), 1.25, abs <= 1e-12);
    assert_float_eq!(block.cc_seg_cap(merged, 1).unwrap(), 0.75, abs <= 1e-12);
    assert_eq!(block.cap_node_cc_segs(na).unwrap().count(), 1);

    let separate = block.couple(na, nb, &[1.0], false).unwrap();
    assert_ne!(separate, merged);
    assert_eq!(block.cap_node_cc_segs(nb).unwrap().count(), 2);
    assert_float_eq!(block.total_coupling_cap(a, 0).unwrap(), 2.25, abs <= 1e-12);
    assert_float_eq!(block.total_coupling_cap(b, 1).unwrap(), 0.75, abs <= 1e-12);
}

#[test]
fn test_self_coupling_is_rejected() {
    let (mut db, top) = setup_db(1);
    let block = db.block_mut(top).unwrap();
    let (_, nodes) = net_with_nodes(block, "a", &[1]);
    assert!(block.couple(nodes[0], nodes[0], &[1.0], true).is_err());
}

#[test]
fn test_merge_rcs_collapses_a_path() {
    let (mut db, top) = setup_db(2);
    let block = db.block_mut(top).unwrap();
    let (net, n) = net_with_nodes(block, "n", &[0, 1, 2, 3]);
    let (_, other) = net_with_nodes(block, "aggressor", &[1]);

    let mut path = Vec::new();
    for i in 0..3 {
        let rseg = block
            .create_rseg(net, Some(n[i]), Some(n[i + 1]), Point::new(i as i64, 0), true)
            .unwrap();
        for corner in 0..2 {
            block.set_rseg_res(rseg, corner, 10.0 * (corner + 1) as f64).unwrap();
            block.set_rseg_cap(rseg, corner, 1.0).unwrap();
        }
        path.push(rseg);
    }
    block.set_cap_node_cap(n[1], 0, 0.5).unwrap();
    block.couple(n[1], other[0], &[0.2, 0.4], true).unwrap();
    block.couple(n[3], other[0], &[0.1, 0.1], true).unwrap();

    let survivor = block.merge_rcs(net, &path).unwrap();
    assert_eq!(survivor, path[2]);
    assert_eq!(block.net_rsegs(net).unwrap().count(), 1);
    assert_eq!(block.net_cap_nodes(net).unwrap().count(), 2);

    let rseg = block.rseg(survivor).unwrap();
    assert_eq!(rseg.source(), Some(n[0]));
    assert_eq!(rseg.target(), Some(n[3]));
    assert_float_eq!(block.rseg_res(survivor, 0).unwrap(), 30.0, abs <= 1e-12);
    assert_float_eq!(block.rseg_res(survivor, 1).unwrap(), 60.0, abs <= 1e-12);
    assert_float_eq!(block.rseg_cap(survivor, 0).unwrap(), 3.5, abs <= 1e-12);
    assert_float_eq!(block.rseg_cap(survivor, 1).unwrap(), 3.0, abs <= 1e-12);

    // The intermediate coupling folded into the segment the final node had.
    let seg = block.find_cc_seg(n[3], other[0]).unwrap().unwrap();
    assert_float_eq!(block.cc_seg_cap(seg, 0).unwrap(), 0.3, abs <= 1e-12);
    assert_float_eq!(block.cc_seg_cap(seg, 1).unwrap(), 0.5, abs <= 1e-12);
    assert_float_eq!(block.total_coupling_cap(net, 0).unwrap(), 0.3, abs <= 1e-12);
}

#[test]
fn test_merge_rcs_rejects_broken_paths() {
    let (mut db, top) = setup_db(1);
    let block = db.block_mut(top).unwrap();
    let (net, n) = net_with_nodes(block, "n", &[0, 1, 2, 3]);
    let r0 = block
        .create_rseg(net, Some(n[0]), Some(n[1]), Point::zero(), false)
        .unwrap();
    let r2 = block
        .create_rseg(net, Some(n[2]), Some(n[3]), Point::zero(), false)
        .unwrap();

    let err = block.merge_rcs(net, &[r0, r2]).unwrap_err();
    assert!(err.is_internal_invariant());
    assert_eq!(block.net_rsegs(net).unwrap().count(), 2);
    assert!(block.merge_rcs(net, &[]).is_err());
    assert_eq!(block.merge_rcs(net, &[r0]).unwrap(), r0);
}

#[test]
fn test_adjust_and_undo_restore_values() {
    let (mut db, top) = setup_db(2);
    let block = db.block_mut(top).unwrap();
    let (a, b, na, nb) = coupled_pair(block, &[4.0, 0.5]);
    let (_, c) = net_with_nodes(block, "c", &[1]);
    let small = block.couple(na, c[0], &[0.1, 0.1], true).unwrap();
    let big = block.find_cc_seg(na, nb).unwrap().unwrap();

    assert_eq!(block.parasitic_state(a).unwrap(), ParasiticState::Extracted);
    assert!(block.adjust_cc(a, 1, 0.5, 1.0).unwrap());
    assert_eq!(block.parasitic_state(a).unwrap(), ParasiticState::Adjusted);
    assert_float_eq!(block.cc_seg_cap(big, 0).unwrap(), 2.0, abs <= 1e-12);
    assert_float_eq!(block.cc_seg_cap(big, 1).unwrap(), 0.25, abs <= 1e-12);
    assert_float_eq!(block.cc_seg_cap(small, 0).unwrap(), 0.1, abs <= 1e-12);
    assert_eq!(block.cc_halo_nets(a).unwrap(), vec![b]);

    // Same order again is refused.
    assert!(!block.adjust_cc(a, 1, 0.5, 1.0).unwrap());
    assert!(block.adjust_cc(a, 0, 0.0, 1.0).is_err());

    assert!(block.undo_adjusted_cc(a).unwrap());
    assert_float_eq!(block.cc_seg_cap(big, 0).unwrap(), 4.0, abs <= 1e-12);
    assert_float_eq!(block.cc_seg_cap(big, 1).unwrap(), 0.5, abs <= 1e-12);
    assert!(!block.cc_seg(big).unwrap().is_marked());
    assert!(!block.undo_adjusted_cc(a).unwrap());
    assert_eq!(block.parasitic_state(a).unwrap(), ParasiticState::Extracted);
}

#[test]
fn test_higher_order_adjusts_an_adjusted_net() {
    let (mut db, top) = setup_db(1);
    let block = db.block_mut(top).unwrap();
    let (a, _, na, nb) = coupled_pair(block, &[4.0]);
    let first = block.find_cc_seg(na, nb).unwrap().unwrap();
    assert!(block.adjust_cc(a, 1, 0.5, 1.0).unwrap());

    let (d, nd) = net_with_nodes(block, "d", &[1]);
    let late = block.couple(na, nd[0], &[5.0], true).unwrap();
    // Order 1 again is refused; order 2 moves the net to a second adjustment.
    assert!(!block.adjust_cc(a, 1, 0.5, 1.0).unwrap());
    assert!(block.adjust_cc(a, 2, 0.5, 1.0).unwrap());
    assert_eq!(block.parasitic_state(a).unwrap(), ParasiticState::Adjusted);
    assert_eq!(block.net(a).unwrap().cc_adjust_order(), Some(2));
    assert_eq!(block.net(a).unwrap().cc_adjustments().len(), 2);
    // Segments scaled at order 1 are not scaled again.
    assert_float_eq!(block.cc_seg_cap(first, 0).unwrap(), 2.0, abs <= 1e-12);
    assert_float_eq!(block.cc_seg_cap(late, 0).unwrap(), 2.5, abs <= 1e-12);
    assert!(block.cc_halo_nets(a).unwrap().contains(&d));

    assert!(block.undo_adjusted_cc(a).unwrap());
    assert_eq!(block.net(a).unwrap().cc_adjust_order(), Some(1));
    assert_float_eq!(block.cc_seg_cap(late, 0).unwrap(), 5.0, abs <= 1e-12);
    assert_float_eq!(block.cc_seg_cap(first, 0).unwrap(), 2.0, abs <= 1e-12);
    assert!(block.undo_adjusted_cc(a).unwrap());
    assert_float_eq!(block.cc_seg_cap(first, 0).unwrap(), 4.0, abs <= 1e-12);
}

#[test]
fn test_adjust_skips_neighbors_adjusted_at_higher_order() {
    let (mut db, top) = setup_db(1);
    let block = db.block_mut(top).unwrap();
    let (a, na) = net_with_nodes(block, "a", &[1]);
    let (b, nb) = net_with_nodes(block, "b", &[1]);
    let (_, nc) = net_with_nodes(block, "c", &[1]);
    let (d, nd) = net_with_nodes(block, "d", &[1]);
    let ab = block.couple(na[0], nb[0], &[0.5], true).unwrap();
    let bc = block.couple(nb[0], nc[0], &[4.0], true).unwrap();
    let ad = block.couple(na[0], nd[0], &[1.0], true).unwrap();

    // `b` is adjusted through `bc` only; `ab` stays below the threshold.
    assert!(block.adjust_cc(b, 3, 0.5, 1.0).unwrap());
    assert_float_eq!(block.cc_seg_cap(bc, 0).unwrap(), 2.0, abs <= 1e-12);
    assert!(!block.cc_seg(ab).unwrap().is_marked());

    assert!(block.adjust_cc(a, 1, 0.5, 0.1).unwrap());
    assert_float_eq!(block.cc_seg_cap(ab, 0).unwrap(), 0.5, abs <= 1e-12);
    assert_float_eq!(block.cc_seg_cap(ad, 0).unwrap(), 0.5, abs <= 1e-12);
    assert_eq!(block.cc_halo_nets(a).unwrap(), vec![d]);

    // A neighbor at the same or a lower order is adjusted.
    assert!(block.undo_adjusted_cc(a).unwrap());
    assert!(block.adjust_cc(a, 3, 0.5, 0.1).unwrap());
    assert_float_eq!(block.cc_seg_cap(ab, 0).unwrap(), 0.25, abs <= 1e-12);
}

#[test]
fn test_duplicate_net_copies_attributes_only() {
    let (mut db, top) = setup_db(1);
    let block = db.block_mut(top).unwrap();
    let (a, _, _, _) = coupled_pair(block, &[1.0]);
    block.set_net_weight(a, 4).unwrap();
    block.set_net_gndc_calibration(a, 1.5).unwrap();

    let dup = block.duplicate_net(a, "a_dup").unwrap();
    assert_ne!(dup, a);
    assert_eq!(block.find_net("a_dup"), Some(dup));
    let record = block.net(dup).unwrap();
    assert_eq!(record.weight(), 4);
    assert_float_eq!(record.gndc_calibration(), 1.5, abs <= 1e-12);
    assert!(!record.has_parasitics());
    assert_eq!(block.parasitic_state(dup).unwrap(), ParasiticState::Unextracted);
    assert_eq!(block.parasitic_state(a).unwrap(), ParasiticState::Extracted);

    let err = block.duplicate_net(a, "b").unwrap_err();
    assert!(matches!(err.source(), ErrorSource::NameConflict { .. }));
    assert_eq!(block.net_count(), 3);
}

#[test]
fn test_destroy_parasitics_clears_both_sides() {
    let (mut db, top) = setup_db(1);
    let block = db.block_mut(top).unwrap();
    let (a, b, _, nb) = coupled_pair(block, &[1.0]);

    block.destroy_parasitics(a).unwrap();
    assert_eq!(block.parasitic_state(a).unwrap(), ParasiticState::Unextracted);
    assert_eq!(block.cap_node_cc_segs(nb).unwrap().count(), 0);
    assert_float_eq!(block.total_coupling_cap(b, 0).unwrap(), 0.0, abs <= 1e-12);
    block.destroy_net(a).unwrap();
}
