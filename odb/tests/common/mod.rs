#![allow(dead_code)]

use std::sync::Arc;

use odb::block::{Block, NetId};
use odb::config::DbConfig;
use odb::database::{BlockKey, Database};
use odb::parasitics::{CapNodeId, NodeRef};
use odb::tech::{IoType, Library, MTerm, Master, Tech};

pub const TOP: &str = "top";
pub const CORNERS: usize = 3;

pub fn tech() -> Tech {
    Tech::new("test18", 1000)
}

pub fn stdcells() -> Library {
    let mut lib = Library::new("stdcells");
    lib.add_master(
        Master::builder()
            .name("INV")
            .width(400)
            .height(1200)
            .mterm(MTerm::new("A", IoType::Input))
            .mterm(MTerm::new("Y", IoType::Output))
            .mterm(MTerm::new("VDD", IoType::InOut))
            .mterm(MTerm::new("VSS", IoType::InOut))
            .build()
            .unwrap(),
    )
    .unwrap();
    lib.add_master(
        Master::builder()
            .name("BUF")
            .width(600)
            .height(1200)
            .mterm(MTerm::new("A", IoType::Input))
            .mterm(MTerm::new("X", IoType::Output))
            .mterm(MTerm::new("VDD", IoType::InOut))
            .mterm(MTerm::new("VSS", IoType::InOut))
            .build()
            .unwrap(),
    )
    .unwrap();
    lib
}

pub fn config(corners: usize) -> DbConfig {
    DbConfig::builder()
        .corner_count(corners)
        .ext_db_count(corners)
        .build()
        .unwrap()
}

/// A database with the standard cell library and one empty top block.
pub fn setup_db(corners: usize) -> (Database, BlockKey) {
    let mut db = Database::new(tech(), config(corners));
    db.add_library(stdcells()).unwrap();
    let top = db.create_block(TOP, None).unwrap();
    (db, top)
}

pub fn master(db: &Database, name: &str) -> Arc<Master> {
    db.find_master(name).unwrap()
}

/// Creates `name` with one internal cap-node per entry of `nums`.
pub fn net_with_nodes(block: &mut Block, name: &str, nums: &[u32]) -> (NetId, Vec<CapNodeId>) {
    let net = block.create_net(name).unwrap();
    let nodes = nums
        .iter()
        .map(|n| block.create_cap_node(net, NodeRef::Internal(*n), false).unwrap())
        .collect();
    (net, nodes)
}

/// Two nets `a` and `b` with one node each and a coupling segment carrying
/// `caps` between them.
pub fn coupled_pair(block: &mut Block, caps: &[f64]) -> (NetId, NetId, CapNodeId, CapNodeId) {
    let (a, na) = net_with_nodes(block, "a", &[1]);
    let (b, nb) = net_with_nodes(block, "b", &[1]);
    block.couple(na[0], nb[0], caps, true).unwrap();
    (a, b, na[0], nb[0])
}
