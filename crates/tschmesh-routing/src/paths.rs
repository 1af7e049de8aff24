//! Unweighted path search over mote adjacency
//!
//! Both the topology (undirected) and track graphs (directed) are searched
//! through the same successor-list representation. Successor lists are kept
//! in a fixed order so that ties always break the same way.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use tschmesh_protocol::{Edge, Eui64};

/// Ordered successor lists, one per node
pub type Adjacency = BTreeMap<Eui64, Vec<Eui64>>;

/// Breadth-first shortest path from `from` to `to`
///
/// Nodes in `blocked_nodes` and edges in `blocked_edges` are not traversed.
/// Returns the node sequence including both endpoints.
pub fn shortest_path(
    adjacency: &Adjacency,
    from: Eui64,
    to: Eui64,
    blocked_nodes: &HashSet<Eui64>,
    blocked_edges: &HashSet<Edge>,
) -> Option<Vec<Eui64>> {
    if from == to {
        return Some(vec![from]);
    }

    let mut previous: HashMap<Eui64, Eui64> = HashMap::new();
    let mut queue = VecDeque::from([from]);
    previous.insert(from, from);

    while let Some(node) = queue.pop_front() {
        let Some(successors) = adjacency.get(&node) else {
            continue;
        };
        for &next in successors {
            if previous.contains_key(&next)
                || blocked_nodes.contains(&next)
                || blocked_edges.contains(&Edge::new(node, next))
            {
                continue;
            }
            previous.insert(next, node);
            if next == to {
                return Some(unwind(&previous, from, to));
            }
            queue.push_back(next);
        }
    }

    None
}

fn unwind(previous: &HashMap<Eui64, Eui64>, from: Eui64, to: Eui64) -> Vec<Eui64> {
    let mut path = vec![to];
    let mut node = to;
    while node != from {
        node = previous[&node];
        path.push(node);
    }
    path.reverse();
    path
}

/// Simple paths between two nodes in order of increasing hop count
///
/// Yen's k-shortest-paths with BFS spur searches. Paths are produced lazily,
/// so callers that stop at the first acceptable path pay only for what they
/// consume. Equal-length candidates come out in lexicographic node order.
pub struct SimplePaths<'a> {
    adjacency: &'a Adjacency,
    source: Eui64,
    target: Eui64,
    accepted: Vec<Vec<Eui64>>,
    candidates: BTreeSet<(usize, Vec<Eui64>)>,
    exhausted: bool,
}

impl<'a> SimplePaths<'a> {
    pub fn new(adjacency: &'a Adjacency, source: Eui64, target: Eui64) -> Self {
        SimplePaths {
            adjacency,
            source,
            target,
            accepted: Vec::new(),
            candidates: BTreeSet::new(),
            exhausted: false,
        }
    }

    fn extend_candidates(&mut self, previous: &[Eui64]) {
        for spur_index in 0..previous.len().saturating_sub(1) {
            let spur = previous[spur_index];
            let root = &previous[..=spur_index];

            let blocked_edges: HashSet<Edge> = self
                .accepted
                .iter()
                .filter(|path| path.len() > spur_index + 1 && path[..=spur_index] == *root)
                .map(|path| Edge::new(path[spur_index], path[spur_index + 1]))
                .collect();
            let blocked_nodes: HashSet<Eui64> = root[..spur_index].iter().copied().collect();

            let Some(spur_path) = shortest_path(
                self.adjacency,
                spur,
                self.target,
                &blocked_nodes,
                &blocked_edges,
            ) else {
                continue;
            };

            let mut candidate = root[..spur_index].to_vec();
            candidate.extend(spur_path);
            if !self.accepted.contains(&candidate) {
                self.candidates.insert((candidate.len(), candidate));
            }
        }
    }
}

impl Iterator for SimplePaths<'_> {
    type Item = Vec<Eui64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }

        let next = match self.accepted.last().cloned() {
            None => shortest_path(
                self.adjacency,
                self.source,
                self.target,
                &HashSet::new(),
                &HashSet::new(),
            ),
            Some(previous) => {
                self.extend_candidates(&previous);
                self.candidates.pop_first().map(|(_, path)| path)
            }
        };

        match next {
            Some(path) => {
                self.accepted.push(path.clone());
                Some(path)
            }
            None => {
                self.exhausted = true;
                None
            }
        }
    }
}
