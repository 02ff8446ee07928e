use float_eq::assert_float_eq;
use odb::block::SCHEMA_INITIAL;
use odb::config::DbConfig;
use odb::database::Database;
use odb::error::ErrorSource;
use odb::geom::Rect;
use odb::parasitics::NodeRef;
use tempdir::TempDir;

mod common;
use common::{config, coupled_pair, master, setup_db, TOP};

#[test]
fn test_database_round_trip() {
    let dir = TempDir::new("odb").unwrap();
    let path = dir.path().join("design.odb");

    let (mut db, top) = setup_db(2);
    let inv = master(&db, "INV");
    let child = db.create_block("child", Some(top)).unwrap();
    db.create_block("grandchild", Some(child)).unwrap();
    {
        let block = db.block_mut(top).unwrap();
        let (a, _, na, nb) = coupled_pair(block, &[1.0, 2.0]);
        block.set_net_gndc_calibration(a, 1.25).unwrap();
        block.set_cap_node_cap(na, 1, 0.5).unwrap();
        block.set_cap_node_foreign(nb, true).unwrap();
        let u1 = block.create_inst(&inv, "u1").unwrap();
        let y = block.find_iterm(u1, "Y").unwrap().unwrap();
        block.connect_iterm(y, a).unwrap();
        block
            .set_die_area(Rect::from_coords(0, 0, 1000, 2000))
            .unwrap();
        let blockage = block
            .create_blockage(Rect::from_coords(0, 0, 10, 10), Some(u1))
            .unwrap();
        block.set_blockage_max_density(blockage, 70.0).unwrap();
        block
            .add_global_connect(None, "u.*", "VDD", a, true)
            .unwrap();
    }
    db.write_file(&path).unwrap();

    let read = Database::read_file(&path, DbConfig::default()).unwrap();
    assert_eq!(read.block_count(), 3);
    assert_eq!(read.libraries().len(), 1);
    assert!(read.find_master("BUF").is_some());
    let top = read.find_child(None, TOP).unwrap();
    let child = read.find_child(Some(top), "child").unwrap();
    assert!(read.find_child(Some(child), "grandchild").is_some());

    let block = read.block(top).unwrap();
    assert_eq!(block.corner_count(), 2);
    assert_eq!(block.die_area(), Rect::from_coords(0, 0, 1000, 2000));
    let a = block.find_net("a").unwrap();
    let b = block.find_net("b").unwrap();
    assert_float_eq!(block.net(a).unwrap().gndc_calibration(), 1.25, abs <= 1e-12);
    assert_float_eq!(block.total_coupling_cap(b, 1).unwrap(), 2.0, abs <= 1e-12);
    assert_float_eq!(block.total_capacitance(a, 1).unwrap(), 0.5, abs <= 1e-12);
    let nb = block
        .find_cap_node(b, NodeRef::Internal(1))
        .unwrap()
        .unwrap();
    assert!(block.cap_node(nb).unwrap().is_foreign());

    let u1 = block.find_inst("u1").unwrap();
    assert_eq!(block.inst_master(u1).unwrap().name().as_str(), "INV");
    assert_eq!(block.net(a).unwrap().iterms().len(), 1);
    let (_, blockage) = block.blockages().next().unwrap();
    assert_eq!(blockage.inst(), Some(u1));
    assert_float_eq!(blockage.max_density(), 70.0, abs <= 1e-12);
    assert_eq!(block.global_connect_rules().len(), 1);
    assert_eq!(block.global_connect_rules()[0].inst_pattern(), "u.*");
    assert!(!block.is_journaling());
}

#[test]
fn test_read_blocks_accept_new_objects() {
    let mut buf = Vec::new();
    let (mut db, top) = setup_db(1);
    {
        let block = db.block_mut(top).unwrap();
        let gone = block.create_net("gone").unwrap();
        block.create_net("kept").unwrap();
        block.destroy_net(gone).unwrap();
    }
    db.write(&mut buf).unwrap();

    let mut read = Database::read(buf.as_slice(), config(1)).unwrap();
    let top = read.top_block().unwrap();
    let block = read.block_mut(top).unwrap();
    let fresh = block.create_net("fresh").unwrap();
    assert_ne!(Some(fresh), block.find_net("kept"));
    assert!(block.create_net("kept").is_err());
    assert_eq!(block.net_count(), 2);
    read.create_block("other", None).unwrap();
    assert!(read.create_block(TOP, None).is_err());
}

#[test]
fn test_old_schema_drops_newer_fields() {
    let (mut db, top) = setup_db(1);
    {
        let block = db.block_mut(top).unwrap();
        let (a, _, _, _) = coupled_pair(block, &[3.0]);
        block.set_net_cc_calibration(a, 0.8).unwrap();
        let blockage = block
            .create_blockage(Rect::from_coords(0, 0, 5, 5), None)
            .unwrap();
        block.set_blockage_max_density(blockage, 40.0).unwrap();
    }
    let mut current = Vec::new();
    db.write(&mut current).unwrap();

    let old_config = DbConfig {
        schema: SCHEMA_INITIAL,
        ..config(1)
    };
    let mut old = Database::new(common::tech(), old_config.clone());
    old.add_library(common::stdcells()).unwrap();
    let key = old.create_block(TOP, None).unwrap();
    {
        let block = old.block_mut(key).unwrap();
        let (a, _, _, _) = coupled_pair(block, &[3.0]);
        block.set_net_cc_calibration(a, 0.8).unwrap();
        let blockage = block
            .create_blockage(Rect::from_coords(0, 0, 5, 5), None)
            .unwrap();
        block.set_blockage_max_density(blockage, 40.0).unwrap();
    }
    let mut legacy = Vec::new();
    old.write(&mut legacy).unwrap();
    assert!(legacy.len() < current.len());

    let read = Database::read(legacy.as_slice(), old_config).unwrap();
    let block = read.block(read.top_block().unwrap()).unwrap();
    let a = block.find_net("a").unwrap();
    assert_float_eq!(block.net(a).unwrap().cc_calibration(), 1.0, abs <= 1e-12);
    assert_float_eq!(block.total_coupling_cap(a, 0).unwrap(), 3.0, abs <= 1e-12);
    let (_, blockage) = block.blockages().next().unwrap();
    assert_float_eq!(blockage.max_density(), 0.0, abs <= 1e-12);
}

#[test]
fn test_unsupported_schemas_are_rejected() {
    let (db, _) = setup_db(1);
    let mut buf = Vec::new();
    db.write(&mut buf).unwrap();
    assert!(Database::read(&buf[..4], config(1)).is_err());

    let bad = Database::new(
        common::tech(),
        DbConfig {
            schema: 99,
            ..config(1)
        },
    );
    assert!(bad.write(Vec::new()).is_err());
}

#[test]
fn test_damaged_lengths_are_errors() {
    let (mut db, top) = setup_db(1);
    db.block_mut(top).unwrap().create_net("a").unwrap();
    let mut buf = Vec::new();
    db.write(&mut buf).unwrap();

    // The technology name length follows the 8-byte header.
    let mut damaged = buf.clone();
    damaged[8..12].copy_from_slice(&u32::MAX.to_le_bytes());
    let err = Database::read(damaged.as_slice(), config(1)).unwrap_err();
    assert!(matches!(err.source(), ErrorSource::Stream(_)));
}

#[test]
fn test_config_from_toml_file() {
    let dir = TempDir::new("odb").unwrap();
    let path = dir.path().join("odb.toml");
    std::fs::write(
        &path,
        r#"
corner_count = 2
corner_names = ["slow", "fast"]
journal = true
"#,
    )
    .unwrap();
    let cfg = DbConfig::from_toml_file(&path).unwrap();
    assert_eq!(cfg.corner_count, 2);
    assert!(cfg.merge_parallel_cc);

    let mut db = Database::new(common::tech(), cfg);
    let top = db.create_block(TOP, None).unwrap();
    let block = db.block(top).unwrap();
    assert!(block.is_journaling());
    assert_eq!(block.corners().find("fast"), Some(1));

    assert!(DbConfig::from_toml_file(dir.path().join("missing.toml")).is_err());
}
