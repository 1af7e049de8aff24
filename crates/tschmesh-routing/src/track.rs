//! Track graphs and their arcs
//!
//! A track is a directed subgraph rooted at the DAG root that embeds one
//! destination's default route with redundancy. It grows one arc at a time
//! while building and is frozen once finalized.

use crate::error::{Result, RoutingError};
use crate::paths::Adjacency;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tschmesh_protocol::{BitIndexMap, Edge, Eui64, TrackId};

/// Track lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Building,
    Active,
}

/// How an arc reconnects to the committed part of the track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArcKind {
    /// Alternate path rejoining at a node off the default route
    Sibling,
    /// Alternate path rejoining on the default route
    Alternate,
    /// No alternate path exists; single unprotected edge
    Direct,
}

/// Redundancy unit added by one builder step
#[derive(Debug, Clone, PartialEq)]
pub struct TrackArc {
    pub kind: ArcKind,
    /// Route node already on the track when the arc was built
    pub committed: Eui64,
    /// Route node embedded by this arc
    pub frontier: Eui64,
    /// Track node the alternate path leaves from
    pub rejoin: Eui64,
    /// Alternate chain, `rejoin` first and `frontier` last
    pub alt_path: Vec<Eui64>,
    /// Added edges with their bit index, in allocation order
    pub edges: Vec<(Edge, usize)>,
}

impl TrackArc {
    /// Distinct bit indices used by this arc
    pub fn bits(&self) -> BTreeSet<usize> {
        self.edges.iter().map(|(_, bit)| *bit).collect()
    }

    /// One cell request per added edge
    pub fn cell_requests(&self, track_id: TrackId) -> Vec<CellRequest> {
        self.edges
            .iter()
            .map(|(edge, bit_index)| CellRequest {
                track_id,
                tx: edge.tx,
                rx: edge.rx,
                bit_index: *bit_index,
            })
            .collect()
    }
}

/// Per-edge schedule request handed to the cell scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CellRequest {
    pub track_id: TrackId,
    pub tx: Eui64,
    pub rx: Eui64,
    pub bit_index: usize,
}

/// A track under construction or in service
#[derive(Debug, Clone)]
pub struct Track {
    id: TrackId,
    root: Eui64,
    /// Default route, destination first, root last
    route: Vec<Eui64>,
    edges: BTreeMap<Edge, usize>,
    nodes: BTreeSet<Eui64>,
    next_bit: usize,
    arcs: Vec<TrackArc>,
    bit_map: Option<BitIndexMap>,
    state: TrackState,
}

impl Track {
    /// Start a track holding only the route's root (its last node)
    pub fn new(id: TrackId, route: Vec<Eui64>) -> Result<Self> {
        let root = *route
            .last()
            .ok_or_else(|| RoutingError::TrackBuild("empty route".to_string()))?;
        let mut seen = HashSet::new();
        if let Some(repeated) = route.iter().find(|node| !seen.insert(**node)) {
            return Err(RoutingError::TrackBuild(format!(
                "route visits {} twice",
                repeated
            )));
        }

        Ok(Track {
            id,
            root,
            route,
            edges: BTreeMap::new(),
            nodes: BTreeSet::from([root]),
            next_bit: 0,
            arcs: Vec::new(),
            bit_map: None,
            state: TrackState::Building,
        })
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn root(&self) -> Eui64 {
        self.root
    }

    /// Destination whose route this track embeds
    pub fn destination(&self) -> Eui64 {
        self.route[0]
    }

    pub fn route(&self) -> &[Eui64] {
        &self.route
    }

    pub fn state(&self) -> TrackState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == TrackState::Active
    }

    pub fn contains(&self, node: &Eui64) -> bool {
        self.nodes.contains(node)
    }

    pub fn nodes(&self) -> &BTreeSet<Eui64> {
        &self.nodes
    }

    pub fn has_edge(&self, edge: &Edge) -> bool {
        self.edges.contains_key(edge)
    }

    pub fn edges(&self) -> impl Iterator<Item = (&Edge, &usize)> {
        self.edges.iter()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Bits allocated so far; the bitmap length once active
    pub fn bit_len(&self) -> usize {
        self.next_bit
    }

    pub fn arcs(&self) -> &[TrackArc] {
        &self.arcs
    }

    /// Frozen bit assignment, available once the track is active
    pub fn bit_map(&self) -> Option<&BitIndexMap> {
        self.bit_map.as_ref()
    }

    /// Hand out the next unused bit index
    pub(crate) fn allocate_bit(&mut self) -> usize {
        let bit = self.next_bit;
        self.next_bit += 1;
        bit
    }

    /// Add an arc's edges to the graph
    ///
    /// Fails without modifying the track if the track is already active or
    /// the arc would overwrite an existing edge.
    pub fn commit_arc(&mut self, arc: TrackArc) -> Result<()> {
        if self.is_active() {
            return Err(RoutingError::TrackBuild(format!(
                "{} is already active",
                self.id
            )));
        }
        if let Some((edge, _)) = arc.edges.iter().find(|(edge, _)| self.edges.contains_key(edge)) {
            return Err(RoutingError::TrackBuild(format!(
                "edge {} already on {}",
                edge, self.id
            )));
        }
        if let Some((_, bit)) = arc.edges.iter().find(|(_, bit)| *bit >= self.next_bit) {
            return Err(RoutingError::TrackBuild(format!(
                "bit {} was never allocated",
                bit
            )));
        }

        for (edge, bit) in &arc.edges {
            self.edges.insert(*edge, *bit);
            self.nodes.insert(edge.tx);
            self.nodes.insert(edge.rx);
        }
        self.arcs.push(arc);
        Ok(())
    }

    /// Freeze the bit assignment and mark the track active
    pub fn finalize(&mut self) -> Result<&BitIndexMap> {
        let map = BitIndexMap::from_assignments(
            self.next_bit,
            self.edges.iter().map(|(edge, bit)| (*edge, *bit)),
        )?;
        self.state = TrackState::Active;
        Ok(self.bit_map.insert(map))
    }

    /// Directed successor lists over the track edges
    pub fn successors(&self) -> Adjacency {
        let mut adjacency = Adjacency::new();
        for edge in self.edges.keys() {
            adjacency.entry(edge.tx).or_default().push(edge.rx);
        }
        adjacency
    }

    /// Edges of the embedded default route, root to destination
    ///
    /// `None` if some route hop is not a track edge.
    pub fn route_edges(&self) -> Option<BTreeSet<Edge>> {
        let downstream: Vec<Eui64> = self.route.iter().rev().copied().collect();
        let edges = Edge::along(&downstream);
        if edges.iter().all(|edge| self.edges.contains_key(edge)) {
            Some(edges.into_iter().collect())
        } else {
            None
        }
    }
}
