use odb::block::PlacementStatus;
use odb::error::ErrorSource;
use odb::geom::{Orientation, Point, Rect};

mod common;
use common::{master, setup_db, TOP};

#[test]
fn test_block_hierarchy() {
    let (mut db, top) = setup_db(1);
    let alu = db.create_block("alu", Some(top)).unwrap();
    let adder = db.create_block("adder", Some(alu)).unwrap();
    db.create_block("regs", Some(top)).unwrap();

    assert_eq!(db.top_block(), Some(top));
    assert_eq!(db.block(top).unwrap().children().len(), 2);
    assert_eq!(db.block(adder).unwrap().parent(), Some(alu));
    assert_eq!(db.find_child(Some(top), "alu"), Some(alu));
    assert_eq!(db.find_child(None, TOP), Some(top));
    assert_eq!(db.block_count(), 4);

    let err = db.create_block("alu", Some(top)).unwrap_err();
    assert!(matches!(err.source(), ErrorSource::NameConflict { kind: "block", .. }));
    // Names only need to be unique among siblings.
    db.create_block("alu", Some(alu)).unwrap();

    db.destroy_block(alu).unwrap();
    assert_eq!(db.block_count(), 2);
    assert!(db.block(adder).is_err());
    assert_eq!(db.find_child(Some(top), "alu"), None);
}

#[test]
fn test_net_names_and_handle_reuse() {
    let (mut db, top) = setup_db(1);
    let block = db.block_mut(top).unwrap();

    let a = block.create_net("a").unwrap();
    let b = block.create_net("b").unwrap();
    assert_eq!(block.find_net("a"), Some(a));
    assert!(block.create_net("a").is_err());

    block.destroy_net(b).unwrap();
    assert_eq!(block.find_net("b"), None);
    let c = block.create_net("c").unwrap();
    assert_eq!(c, b);

    block.rename_net(a, "alpha").unwrap();
    assert_eq!(block.find_net("a"), None);
    assert_eq!(block.find_net("alpha"), Some(a));
    assert!(block.rename_net(c, "alpha").is_err());
    assert_eq!(block.net_count(), 2);
}

#[test]
fn test_instances_and_terminals() {
    let (mut db, top) = setup_db(1);
    let inv = master(&db, "INV");
    let block = db.block_mut(top).unwrap();

    let u1 = block.create_inst(&inv, "u1").unwrap();
    assert_eq!(block.inst(u1).unwrap().iterms().len(), 4);
    assert!(block.create_inst(&inv, "u1").is_err());

    let n1 = block.create_net("n1").unwrap();
    let n2 = block.create_net("n2").unwrap();
    let y = block.find_iterm(u1, "Y").unwrap().unwrap();
    block.connect_iterm(y, n1).unwrap();
    assert_eq!(block.net(n1).unwrap().iterms(), &[y]);

    // Reconnecting moves the terminal.
    block.connect_iterm(y, n2).unwrap();
    assert!(block.net(n1).unwrap().iterms().is_empty());
    assert_eq!(block.iterm(y).unwrap().net(), Some(n2));

    block
        .set_inst_location(u1, Point::new(1000, 2400))
        .unwrap();
    block.set_inst_orientation(u1, Orientation::MX).unwrap();
    block.set_inst_status(u1, PlacementStatus::Placed).unwrap();
    let record = block.inst(u1).unwrap();
    assert_eq!(record.location(), Point::new(1000, 2400));
    assert!(record.status().is_placed());

    block.destroy_inst(u1).unwrap();
    assert!(block.net(n2).unwrap().iterms().is_empty());
    assert!(block.iterm(y).is_err());
}

#[test]
fn test_block_terminals_and_blockages() {
    let (mut db, top) = setup_db(1);
    let block = db.block_mut(top).unwrap();
    let vdd = block.create_net("VDD").unwrap();
    let gnd = block.create_net("VSS").unwrap();

    let pin = block.create_bterm(vdd, "VDD").unwrap();
    assert_eq!(block.find_bterm("VDD"), Some(pin));
    assert!(block.create_bterm(gnd, "VDD").is_err());
    block.connect_bterm(pin, gnd).unwrap();
    assert!(block.net(vdd).unwrap().bterms().is_empty());
    assert_eq!(block.net(gnd).unwrap().bterms(), &[pin]);

    let area = Rect::from_coords(0, 0, 500, 500);
    let blockage = block.create_blockage(area, None).unwrap();
    block.set_blockage_soft(blockage, true).unwrap();
    block.set_blockage_max_density(blockage, 60.0).unwrap();
    let record = block.blockage(blockage).unwrap();
    assert!(record.is_soft());
    assert_eq!(record.rect(), area);
    assert_eq!(record.max_density(), 60.0);

    block.destroy_bterm(pin).unwrap();
    assert!(block.net(gnd).unwrap().bterms().is_empty());
}
