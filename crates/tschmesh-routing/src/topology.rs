//! Live mesh topology
//!
//! Motes periodically report their ranked RPL parents and their children.
//! Each report replaces the reporting mote's outgoing links as a whole;
//! path searches run against owned snapshots so they never observe a
//! half-applied report.

use crate::link_state::ReliabilityReport;
use crate::paths::{self, Adjacency};
use crate::route::RouteProvider;
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tokio::sync::RwLock;
use tracing::{debug, info};
use tschmesh_protocol::{Edge, Eui64};

/// Parent preference marking a neighbor entry without a usable route
pub const NO_ROUTE_PREFERENCE: u8 = 0xFF;

/// Preference given to child links whose child never ranked us as a parent
pub const UNRANKED_PREFERENCE: u8 = 0xFE;

/// One neighbor report from a mote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborReport {
    pub node: Eui64,
    /// `(preference, parent)` pairs; lower preference is better
    pub parents: Vec<(u8, Eui64)>,
    pub children: Vec<Eui64>,
}

impl NeighborReport {
    pub fn new(node: Eui64, parents: Vec<(u8, Eui64)>, children: Vec<Eui64>) -> Self {
        NeighborReport {
            node,
            parents,
            children,
        }
    }
}

fn is_no_route(preference: u8, neighbor: &Eui64) -> bool {
    preference == NO_ROUTE_PREFERENCE || neighbor.is_unspecified()
}

/// Read-only view of the mesh graph
#[derive(Debug, Clone, Default)]
pub struct TopologyGraph {
    /// tx -> rx -> preference
    links: BTreeMap<Eui64, BTreeMap<Eui64, u8>>,
    /// Ranked parents per node, best first
    parents: BTreeMap<Eui64, Vec<(u8, Eui64)>>,
    /// Delivery reliability learned from track feedback
    reliability: BTreeMap<Edge, f64>,
}

impl TopologyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every outgoing link of `report.node`
    ///
    /// Returns the number of links installed.
    pub fn apply_report(&mut self, report: &NeighborReport) -> usize {
        let mut parents: Vec<(u8, Eui64)> = report
            .parents
            .iter()
            .filter(|(preference, parent)| !is_no_route(*preference, parent) && *parent != report.node)
            .copied()
            .collect();
        parents.sort();
        let mut ranked = HashSet::new();
        parents.retain(|(_, parent)| ranked.insert(*parent));

        let mut outgoing: BTreeMap<Eui64, u8> = parents.iter().map(|(p, n)| (*n, *p)).collect();
        for child in &report.children {
            if child.is_unspecified() || *child == report.node || outgoing.contains_key(child) {
                continue;
            }
            // A child ranks us in its own report; reuse that rank for the downlink
            let preference = self
                .parents
                .get(child)
                .and_then(|ranked| ranked.iter().find(|(_, p)| *p == report.node))
                .map(|(p, _)| *p)
                .unwrap_or(UNRANKED_PREFERENCE);
            outgoing.insert(*child, preference);
        }

        let installed = outgoing.len();
        if outgoing.is_empty() {
            self.links.remove(&report.node);
        } else {
            self.links.insert(report.node, outgoing);
        }
        if parents.is_empty() {
            self.parents.remove(&report.node);
        } else {
            self.parents.insert(report.node, parents);
        }
        installed
    }

    /// Record learned link reliabilities
    pub fn apply_reliability(&mut self, report: &ReliabilityReport) {
        for (edge, ratio) in &report.reliability {
            self.reliability.insert(*edge, ratio.clamp(0.0, 1.0));
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes().len()
    }

    pub fn edge_count(&self) -> usize {
        self.links.values().map(BTreeMap::len).sum()
    }

    /// Every node that appears on either end of a link
    pub fn nodes(&self) -> BTreeSet<Eui64> {
        self.links
            .iter()
            .flat_map(|(tx, rxs)| std::iter::once(*tx).chain(rxs.keys().copied()))
            .collect()
    }

    pub fn contains_node(&self, node: &Eui64) -> bool {
        self.links.contains_key(node) || self.links.values().any(|rxs| rxs.contains_key(node))
    }

    pub fn has_edge(&self, edge: &Edge) -> bool {
        self.preference(edge).is_some()
    }

    /// Whether the two motes can hear each other in either direction
    pub fn adjacent(&self, a: &Eui64, b: &Eui64) -> bool {
        self.has_edge(&Edge::new(*a, *b)) || self.has_edge(&Edge::new(*b, *a))
    }

    pub fn preference(&self, edge: &Edge) -> Option<u8> {
        self.links.get(&edge.tx).and_then(|rxs| rxs.get(&edge.rx)).copied()
    }

    /// Learned reliability; links never measured count as fully reliable
    pub fn reliability(&self, edge: &Edge) -> f64 {
        self.reliability.get(edge).copied().unwrap_or(1.0)
    }

    pub fn edges(&self) -> impl Iterator<Item = (Edge, u8)> + '_ {
        self.links
            .iter()
            .flat_map(|(tx, rxs)| rxs.iter().map(move |(rx, p)| (Edge::new(*tx, *rx), *p)))
    }

    /// Ranked parents of `node`, best first
    pub fn parents(&self, node: &Eui64) -> &[(u8, Eui64)] {
        self.parents.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn preferred_parent(&self, node: &Eui64) -> Option<Eui64> {
        self.parents(node).first().map(|(_, parent)| *parent)
    }

    /// Follow preferred parents from `destination` up to a parentless node
    ///
    /// The returned route is ordered destination first. `None` when the
    /// destination is unknown or the parent chain loops.
    pub fn preferred_parent_route(&self, destination: &Eui64) -> Option<Vec<Eui64>> {
        if !self.contains_node(destination) {
            return None;
        }
        let mut route = vec![*destination];
        let mut seen: HashSet<Eui64> = HashSet::from([*destination]);
        let mut node = *destination;
        while let Some(parent) = self.preferred_parent(&node) {
            if !seen.insert(parent) {
                return None;
            }
            route.push(parent);
            node = parent;
        }
        Some(route)
    }

    /// Undirected adjacency for path search
    ///
    /// Neighbors are ordered by best preference, then by learned reliability
    /// (most reliable first), then by address.
    pub fn undirected_adjacency(&self) -> Adjacency {
        let mut weights: BTreeMap<Eui64, BTreeMap<Eui64, (u8, f64)>> = BTreeMap::new();
        for (edge, preference) in self.edges() {
            let reliability = self.reliability(&edge);
            for (a, b) in [(edge.tx, edge.rx), (edge.rx, edge.tx)] {
                let weight = weights
                    .entry(a)
                    .or_default()
                    .entry(b)
                    .or_insert((preference, reliability));
                weight.0 = weight.0.min(preference);
                weight.1 = weight.1.min(reliability);
            }
        }

        weights
            .into_iter()
            .map(|(node, neighbors)| {
                let mut ranked: Vec<(Eui64, (u8, f64))> = neighbors.into_iter().collect();
                ranked.sort_by(|(a, (pa, ra)), (b, (pb, rb))| {
                    pa.cmp(pb)
                        .then_with(|| rb.partial_cmp(ra).unwrap_or(Ordering::Equal))
                        .then_with(|| a.cmp(b))
                });
                (node, ranked.into_iter().map(|(n, _)| n).collect())
            })
            .collect()
    }

    /// Shortest undirected path between two motes
    pub fn shortest_path(&self, from: Eui64, to: Eui64) -> Option<Vec<Eui64>> {
        paths::shortest_path(
            &self.undirected_adjacency(),
            from,
            to,
            &HashSet::new(),
            &HashSet::new(),
        )
    }
}

/// Shared topology store
#[derive(Debug, Default)]
pub struct TopologyStore {
    graph: RwLock<TopologyGraph>,
}

impl TopologyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace `report.node`'s outgoing links; last write per node wins
    pub async fn update_neighbors(&self, report: NeighborReport) -> usize {
        let installed = {
            let mut graph = self.graph.write().await;
            graph.apply_report(&report)
        };
        debug!(
            "Topology update from {}: {} links ({} parents reported)",
            report.node,
            installed,
            report.parents.len()
        );
        installed
    }

    /// Owned copy of the current graph
    pub async fn snapshot(&self) -> TopologyGraph {
        self.graph.read().await.clone()
    }

    /// Fold a reliability estimate into link ranking
    pub async fn apply_reliability(&self, report: &ReliabilityReport) {
        let mut graph = self.graph.write().await;
        graph.apply_reliability(report);
        info!(
            "Applied reliability window {} ({} links)",
            report.window,
            report.reliability.len()
        );
    }
}

#[async_trait]
impl RouteProvider for TopologyStore {
    async fn source_route(&self, destination: Eui64) -> Option<Vec<Eui64>> {
        self.graph.read().await.preferred_parent_route(&destination)
    }
}
