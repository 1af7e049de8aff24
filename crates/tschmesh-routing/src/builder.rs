//! Track construction
//!
//! The builder walks the default route from the root towards the
//! destination. Each step embeds the next route node (the frontier) with an
//! arc: an alternate chain from an existing track node down to the frontier,
//! the direct hop from the committed route node, and the reverse of the
//! alternate chain. The direct continuation reuses the alternate chain's bit
//! indices, so one flag selects between the two branches of a segment.

use crate::error::{Result, RoutingError};
use crate::paths::{Adjacency, SimplePaths};
use crate::topology::TopologyGraph;
use crate::track::{ArcKind, Track, TrackArc};
use tracing::{debug, info};
use tschmesh_protocol::{Edge, Eui64};

/// Default cap on alternate paths examined per arc
pub const DEFAULT_MAX_ALTERNATE_PATHS: usize = 64;

/// Builds tracks against one topology snapshot
pub struct TrackBuilder<'a> {
    topology: &'a TopologyGraph,
    adjacency: Adjacency,
    max_alternate_paths: usize,
}

impl<'a> TrackBuilder<'a> {
    pub fn new(topology: &'a TopologyGraph, max_alternate_paths: usize) -> Self {
        TrackBuilder {
            topology,
            adjacency: topology.undirected_adjacency(),
            max_alternate_paths,
        }
    }

    /// Check that every consecutive route hop is a topology link
    pub fn validate_route(&self, route: &[Eui64]) -> Result<()> {
        let destination = *route
            .first()
            .ok_or_else(|| RoutingError::TrackBuild("empty route".to_string()))?;
        for hop in route.windows(2) {
            if !self.topology.adjacent(&hop[0], &hop[1]) {
                debug!(
                    "Route to {} broken between {} and {}",
                    destination, hop[0], hop[1]
                );
                return Err(RoutingError::NoRoute(destination));
            }
        }
        Ok(())
    }

    /// Grow `track` until it embeds its destination
    ///
    /// Returns the arcs added, in build order. The track is left in the
    /// building state; the caller finalizes it.
    pub fn build(&self, track: &mut Track) -> Result<Vec<TrackArc>> {
        if track.is_active() {
            return Err(RoutingError::TrackBuild(format!(
                "{} is already active",
                track.id()
            )));
        }
        let route = track.route().to_vec();
        self.validate_route(&route)?;

        let destination = track.destination();
        let mut arcs = Vec::new();
        // Every arc embeds one more route node
        for _ in 0..route.len() {
            if track.contains(&destination) {
                break;
            }
            let arc = self.next_arc(track, &route)?;
            debug!(
                "{}: {:?} arc {} -> {} via {:?} (bits {:?})",
                track.id(),
                arc.kind,
                arc.committed,
                arc.frontier,
                arc.alt_path,
                arc.bits()
            );
            track.commit_arc(arc.clone())?;
            arcs.push(arc);
        }

        if !track.contains(&destination) {
            return Err(RoutingError::TrackBuild(format!(
                "{} not embedded after {} arcs",
                destination,
                arcs.len()
            )));
        }

        info!(
            "Built {} to {}: {} arcs, {} edges, {} bits",
            track.id(),
            destination,
            arcs.len(),
            track.edge_count(),
            track.bit_len()
        );
        Ok(arcs)
    }

    fn next_arc(&self, track: &mut Track, route: &[Eui64]) -> Result<TrackArc> {
        let committed_pos = route
            .iter()
            .position(|node| track.contains(node))
            .ok_or_else(|| RoutingError::TrackBuild("route does not reach the track".to_string()))?;
        if committed_pos == 0 {
            return Err(RoutingError::TrackBuild(
                "destination already embedded".to_string(),
            ));
        }
        let committed = route[committed_pos];
        let frontier = route[committed_pos - 1];

        let Some((med, rejoin, kind)) = self.pick_alternate(track, route, frontier, committed)
        else {
            // Nothing to pair the hop with
            let edge = Edge::new(committed, frontier);
            return Ok(TrackArc {
                kind: ArcKind::Direct,
                committed,
                frontier,
                rejoin: committed,
                alt_path: vec![committed, frontier],
                edges: vec![(edge, track.allocate_bit())],
            });
        };

        let mut edges = Vec::with_capacity(med.len() * 2 + 1);
        let mut alt_path = vec![rejoin];
        alt_path.extend(med.iter().rev());

        // rejoin -> med[k-1] -> ... -> med[0]
        let mut alt_bits = Vec::with_capacity(med.len());
        for hop in alt_path.windows(2) {
            let bit = track.allocate_bit();
            alt_bits.push(bit);
            edges.push((Edge::new(hop[0], hop[1]), bit));
        }

        edges.push((Edge::new(committed, frontier), track.allocate_bit()));

        // med[0] -> med[1] -> ... -> med[k-1], each hop sharing the bit of
        // its reverse on the alternate chain
        if frontier != track.destination() {
            let k = med.len();
            for j in 1..k {
                edges.push((Edge::new(med[j - 1], med[j]), alt_bits[k - j]));
            }
        }

        Ok(TrackArc {
            kind,
            committed,
            frontier,
            rejoin,
            alt_path,
            edges,
        })
    }

    /// Choose the alternate path for one segment
    ///
    /// Returns the new nodes on the path (frontier first), the track node it
    /// rejoins at, and the arc kind. Paths rejoining off the default route
    /// win over the shortest alternate.
    fn pick_alternate(
        &self,
        track: &Track,
        route: &[Eui64],
        frontier: Eui64,
        committed: Eui64,
    ) -> Option<(Vec<Eui64>, Eui64, ArcKind)> {
        let mut shortest = None;

        let alternates = SimplePaths::new(&self.adjacency, frontier, committed)
            .skip(1)
            .take(self.max_alternate_paths);
        for path in alternates {
            let Some(rejoin_pos) = path.iter().position(|node| track.contains(node)) else {
                continue;
            };
            if rejoin_pos == 0 {
                continue;
            }
            let rejoin = path[rejoin_pos];
            let med = path[..rejoin_pos].to_vec();

            if !route.contains(&rejoin) {
                return Some((med, rejoin, ArcKind::Sibling));
            }
            if shortest.is_none() {
                shortest = Some((med, rejoin, ArcKind::Alternate));
            }
        }

        shortest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;
    use crate::topology::NeighborReport;
    use std::collections::{BTreeMap, BTreeSet};
    use tschmesh_protocol::TrackId;

    fn build_ladder() -> (Track, Vec<TrackArc>) {
        let topology = ladder_topology();
        let builder = TrackBuilder::new(&topology, DEFAULT_MAX_ALTERNATE_PATHS);
        let mut track = Track::new(TrackId::from_u8(1), ladder_route()).unwrap();
        let arcs = builder.build(&mut track).unwrap();
        (track, arcs)
    }

    #[test]
    fn test_ladder_bit_assignment() {
        let (mut track, arcs) = build_ladder();
        assert_eq!(arcs.len(), 4);
        assert_eq!(track.bit_len(), 11);
        assert_eq!(track.edge_count(), 14);

        let expected: BTreeMap<Edge, usize> = ladder_bit_assignment().into_iter().collect();
        let actual: BTreeMap<Edge, usize> = track.edges().map(|(e, b)| (*e, *b)).collect();
        assert_eq!(actual, expected);

        let map = track.finalize().unwrap();
        assert_eq!(map.bit_len(), 11);
    }

    #[test]
    fn test_ladder_arc_kinds() {
        let (_, arcs) = build_ladder();
        // First segment can only rejoin at the root, which is on the route
        assert_eq!(arcs[0].kind, ArcKind::Alternate);
        assert_eq!(arcs[0].alt_path, vec![ed9(), f02(), f4a()]);
        assert!(arcs[1..].iter().all(|arc| arc.kind == ArcKind::Sibling));
        assert_eq!(arcs[3].frontier, ec3());
        assert_eq!(arcs[3].rejoin, eec());
    }

    #[test]
    fn test_every_edge_is_a_topology_link() {
        let topology = ladder_topology();
        let (track, _) = build_ladder();
        for (edge, _) in track.edges() {
            assert!(topology.adjacent(&edge.tx, &edge.rx), "{} not a link", edge);
        }
    }

    #[test]
    fn test_default_route_embedded() {
        let (track, _) = build_ladder();
        let route_edges = track.route_edges().unwrap();
        assert_eq!(route_edges.len(), 4);
        assert!(route_edges.contains(&Edge::new(ed9(), f4a())));
        assert!(route_edges.contains(&Edge::new(ef6(), ec3())));
    }

    #[test]
    fn test_shared_bits_pair_reverse_edges() {
        let (track, _) = build_ladder();
        let mut by_bit: BTreeMap<usize, BTreeSet<Edge>> = BTreeMap::new();
        for (edge, bit) in track.edges() {
            by_bit.entry(*bit).or_default().insert(*edge);
        }
        for edges in by_bit.values().filter(|edges| edges.len() > 1) {
            assert_eq!(edges.len(), 2);
            let first = *edges.iter().next().unwrap();
            assert!(edges.contains(&first.reversed()));
        }
    }

    #[test]
    fn test_bypass_without_alternate_is_direct() {
        // Chain r - a - d, no redundancy available
        let mut topology = TopologyGraph::new();
        topology.apply_report(&NeighborReport::new(node(2), vec![(0, node(1))], vec![]));
        topology.apply_report(&NeighborReport::new(node(3), vec![(0, node(2))], vec![]));

        let builder = TrackBuilder::new(&topology, DEFAULT_MAX_ALTERNATE_PATHS);
        let mut track = Track::new(TrackId::from_u8(1), vec![node(3), node(2), node(1)]).unwrap();
        let arcs = builder.build(&mut track).unwrap();

        assert_eq!(arcs.len(), 2);
        assert!(arcs.iter().all(|arc| arc.kind == ArcKind::Direct));
        assert_eq!(track.bit_len(), 2);
        assert_eq!(track.edge_count(), 2);
    }

    #[test]
    fn test_route_must_follow_links() {
        let topology = ladder_topology();
        let builder = TrackBuilder::new(&topology, DEFAULT_MAX_ALTERNATE_PATHS);
        // EC3 and ED8 are not neighbors
        let mut track = Track::new(TrackId::from_u8(1), vec![ec3(), ed8(), f4a(), ed9()]).unwrap();
        assert!(matches!(
            builder.build(&mut track),
            Err(RoutingError::NoRoute(dst)) if dst == ec3()
        ));
        assert_eq!(track.edge_count(), 0);
    }

    #[test]
    fn test_build_is_deterministic() {
        let (first, _) = build_ladder();
        let (second, _) = build_ladder();
        let a: Vec<_> = first.edges().collect();
        let b: Vec<_> = second.edges().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_long_ladder_terminates_with_siblings() {
        // Rails 1 and 2, rung i joins (1, i) and (2, i); root 0, destination 200
        let rungs = 12u8;
        let rail = |side: u8, rung: u8| node(side * 100 + rung);
        let (root, destination) = (node(0), node(200));

        let mut topology = TopologyGraph::new();
        for rung in 1..=rungs {
            for (side, other) in [(1, 2), (2, 1)] {
                let upper = if rung == 1 { root } else { rail(side, rung - 1) };
                topology.apply_report(&NeighborReport::new(
                    rail(side, rung),
                    vec![(0, upper), (1, rail(other, rung))],
                    vec![],
                ));
            }
        }
        topology.apply_report(&NeighborReport::new(
            destination,
            vec![(0, rail(1, rungs)), (1, rail(2, rungs))],
            vec![],
        ));

        let mut route = vec![destination];
        route.extend((1..=rungs).rev().map(|rung| rail(1, rung)));
        route.push(root);

        let builder = TrackBuilder::new(&topology, DEFAULT_MAX_ALTERNATE_PATHS);
        let mut track = Track::new(TrackId::from_u8(1), route.clone()).unwrap();
        let arcs = builder.build(&mut track).unwrap();

        assert!(arcs.len() < route.len());
        assert!(track.contains(&destination));
        assert!(track.route_edges().is_some());
        // Past the first rung the other rail is always available to rejoin
        assert!(arcs[1..].iter().all(|arc| arc.kind == ArcKind::Sibling));
    }

    #[test]
    fn test_active_track_not_rebuilt() {
        let (mut track, _) = build_ladder();
        track.finalize().unwrap();
        let topology = ladder_topology();
        let builder = TrackBuilder::new(&topology, DEFAULT_MAX_ALTERNATE_PATHS);
        assert!(matches!(
            builder.build(&mut track),
            Err(RoutingError::TrackBuild(_))
        ));
    }
}
