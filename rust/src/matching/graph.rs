//! Bipartite demand-to-slot graph and two-pass augmenting-path matching.

use crate::log_debug;

/// Quality of a demand-to-slot edge. `Strong` sorts first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EdgeKind {
    /// At least one candidate column is clean.
    Strong,
    /// Only soft-violating candidate columns.
    Weak,
}

/// Adjacency lists from demands to slots. Hard-violating pairs have no edge.
#[derive(Clone, Debug)]
pub struct DemandGraph {
    edges: Vec<Vec<(usize, EdgeKind)>>,
    num_slots: usize,
}

impl DemandGraph {
    pub fn new(num_demands: usize, num_slots: usize) -> Self {
        Self {
            edges: vec![Vec::new(); num_demands],
            num_slots,
        }
    }

    /// Add an edge. Edges are tried in insertion order.
    pub fn add_edge(&mut self, demand: usize, slot: usize, kind: EdgeKind) {
        self.edges[demand].push((slot, kind));
    }

    pub fn edge(&self, demand: usize, slot: usize) -> Option<EdgeKind> {
        self.edges[demand]
            .iter()
            .find(|(s, _)| *s == slot)
            .map(|(_, k)| *k)
    }

    pub fn num_demands(&self) -> usize {
        self.edges.len()
    }

    pub fn num_slots(&self) -> usize {
        self.num_slots
    }
}

/// A matching between demands and slots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Matching {
    pub demand_to_slot: Vec<Option<usize>>,
    pub slot_to_demand: Vec<Option<usize>>,
    /// Whether each demand's current match uses a weak edge
    pub weak: Vec<bool>,
}

impl Matching {
    fn empty(num_demands: usize, num_slots: usize) -> Self {
        Self {
            demand_to_slot: vec![None; num_demands],
            slot_to_demand: vec![None; num_slots],
            weak: vec![false; num_demands],
        }
    }

    pub fn size(&self) -> usize {
        self.demand_to_slot.iter().filter(|s| s.is_some()).count()
    }
}

struct Augmenter<'g> {
    graph: &'g DemandGraph,
    matching: Matching,
    visited: Vec<bool>,
    /// Slots matched in the strong pass; never rerouted afterwards
    locked: Vec<bool>,
}

impl Augmenter<'_> {
    /// Try to match `demand`, rerouting already matched demands if needed.
    ///
    /// `allow_weak` applies to `demand` itself; a rerouted demand may use a
    /// weak edge only if it already sits on one. Locked slots are skipped.
    fn augment(&mut self, demand: usize, allow_weak: bool) -> bool {
        for idx in 0..self.graph.edges[demand].len() {
            let (slot, kind) = self.graph.edges[demand][idx];
            if kind == EdgeKind::Weak && !allow_weak {
                continue;
            }
            if self.visited[slot] || self.locked[slot] {
                continue;
            }
            self.visited[slot] = true;

            let free = match self.matching.slot_to_demand[slot] {
                None => true,
                Some(other) => {
                    let other_weak = self.matching.weak[other];
                    self.augment(other, other_weak)
                }
            };
            if free {
                self.matching.demand_to_slot[demand] = Some(slot);
                self.matching.slot_to_demand[slot] = Some(demand);
                self.matching.weak[demand] = kind == EdgeKind::Weak;
                return true;
            }
        }
        false
    }
}

/// Maximum matching on strong edges, then extend it with weak edges.
///
/// `order` is the sequence in which demands are offered a slot.
pub fn two_pass_matching(graph: &DemandGraph, order: &[usize], verbosity: u8) -> Matching {
    let mut aug = Augmenter {
        graph,
        matching: Matching::empty(graph.num_demands(), graph.num_slots()),
        visited: vec![false; graph.num_slots()],
        locked: vec![false; graph.num_slots()],
    };

    for &demand in order {
        aug.visited.iter_mut().for_each(|v| *v = false);
        let ok = aug.augment(demand, false);
        log_debug!(verbosity, "pass 1: demand {} matched={}", demand, ok);
    }

    // Pass 2 only adds weak matches; pass-1 placements stay where they are.
    aug.locked = aug
        .matching
        .slot_to_demand
        .iter()
        .map(Option::is_some)
        .collect();

    for &demand in order {
        if aug.matching.demand_to_slot[demand].is_some() {
            continue;
        }
        aug.visited.iter_mut().for_each(|v| *v = false);
        let ok = aug.augment(demand, true);
        log_debug!(verbosity, "pass 2: demand {} matched={}", demand, ok);
    }

    aug.matching
}
