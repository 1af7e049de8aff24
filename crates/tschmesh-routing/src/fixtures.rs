//! Shared test meshes
//!
//! The ladder is an eight-mote, two-rail mesh rooted at ED9:
//!
//! ```text
//!        ED9
//!       /   \
//!     F4A - F02
//!      |     |
//!     ED8 - EC7
//!      |     |
//!     EF6 - EEC
//!       \   /
//!        EC3
//! ```

use crate::topology::{NeighborReport, TopologyGraph};
use tschmesh_protocol::{Edge, Eui64};

pub fn node(id: u8) -> Eui64 {
    Eui64::from_bytes([0, 18, 75, 0, 6, 13, 158, id])
}

fn ladder_node(prefix: u8, id: u8) -> Eui64 {
    Eui64::from_bytes([0, 18, 75, 0, 6, 13, prefix, id])
}

pub fn ed9() -> Eui64 {
    ladder_node(158, 0xd9)
}
pub fn f4a() -> Eui64 {
    ladder_node(159, 0x4a)
}
pub fn f02() -> Eui64 {
    ladder_node(159, 0x02)
}
pub fn ed8() -> Eui64 {
    ladder_node(158, 0xd8)
}
pub fn ec7() -> Eui64 {
    ladder_node(158, 0xc7)
}
pub fn eec() -> Eui64 {
    ladder_node(158, 0xec)
}
pub fn ef6() -> Eui64 {
    ladder_node(158, 0xf6)
}
pub fn ec3() -> Eui64 {
    ladder_node(158, 0xc3)
}

/// Neighbor reports of every ladder mote, rail-side parent ranked first
pub fn ladder_reports() -> Vec<NeighborReport> {
    vec![
        NeighborReport::new(ed9(), vec![], vec![f4a(), f02()]),
        NeighborReport::new(f4a(), vec![(0, ed9()), (1, f02())], vec![ed8()]),
        NeighborReport::new(f02(), vec![(0, ed9()), (1, f4a())], vec![ec7()]),
        NeighborReport::new(ed8(), vec![(0, f4a()), (1, ec7())], vec![ef6()]),
        NeighborReport::new(ec7(), vec![(0, f02()), (1, ed8())], vec![eec()]),
        NeighborReport::new(ef6(), vec![(0, ed8()), (1, eec())], vec![ec3()]),
        NeighborReport::new(eec(), vec![(0, ec7()), (1, ef6())], vec![ec3()]),
        NeighborReport::new(ec3(), vec![(0, ef6()), (1, eec())], vec![]),
    ]
}

pub fn ladder_topology() -> TopologyGraph {
    let mut topology = TopologyGraph::new();
    for report in ladder_reports() {
        topology.apply_report(&report);
    }
    topology
}

/// Default route EC3 -> EF6 -> ED8 -> F4A -> ED9
pub fn ladder_route() -> Vec<Eui64> {
    vec![ec3(), ef6(), ed8(), f4a(), ed9()]
}

/// Expected bit index of every ladder track edge
pub fn ladder_bit_assignment() -> Vec<(Edge, usize)> {
    vec![
        (Edge::new(ed9(), f02()), 0),
        (Edge::new(f02(), f4a()), 1),
        (Edge::new(f4a(), f02()), 1),
        (Edge::new(ed9(), f4a()), 2),
        (Edge::new(f02(), ec7()), 3),
        (Edge::new(ec7(), ed8()), 4),
        (Edge::new(ed8(), ec7()), 4),
        (Edge::new(f4a(), ed8()), 5),
        (Edge::new(ec7(), eec()), 6),
        (Edge::new(eec(), ef6()), 7),
        (Edge::new(ef6(), eec()), 7),
        (Edge::new(ed8(), ef6()), 8),
        (Edge::new(eec(), ec3()), 9),
        (Edge::new(ef6(), ec3()), 10),
    ]
}
