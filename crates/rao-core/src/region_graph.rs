//! Region adjacency graph.
//!
//! Regions are nodes and shared boundaries are undirected edges. The
//! locality filter asks whether two regions are within `n` boundaries of
//! each other, which is a unit-weight shortest-path query.

use crate::RegionId;
use petgraph::algo::dijkstra;
use petgraph::graph::{NodeIndex, UnGraph};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct RegionGraph {
    graph: UnGraph<RegionId, ()>,
    index: HashMap<RegionId, NodeIndex>,
}

impl RegionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_boundaries<'a>(boundaries: impl IntoIterator<Item = &'a (RegionId, RegionId)>) -> Self {
        let mut graph = Self::new();
        for (a, b) in boundaries {
            graph.add_boundary(a.clone(), b.clone());
        }
        graph
    }

    fn node(&mut self, region: RegionId) -> NodeIndex {
        if let Some(idx) = self.index.get(&region) {
            return *idx;
        }
        let idx = self.graph.add_node(region.clone());
        self.index.insert(region, idx);
        idx
    }

    pub fn add_boundary(&mut self, a: RegionId, b: RegionId) {
        let a = self.node(a);
        let b = self.node(b);
        if self.graph.find_edge(a, b).is_none() {
            self.graph.add_edge(a, b, ());
        }
    }

    pub fn region_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of boundaries crossed on the shortest path, if connected.
    pub fn boundary_distance(&self, a: &RegionId, b: &RegionId) -> Option<usize> {
        if a == b {
            return Some(0);
        }
        let (start, goal) = (*self.index.get(a)?, *self.index.get(b)?);
        dijkstra(&self.graph, start, Some(goal), |_| 1usize)
            .get(&goal)
            .copied()
    }

    /// True when `a` and `b` are at most `max_boundaries` boundaries apart.
    pub fn are_neighbors(&self, a: &RegionId, b: &RegionId, max_boundaries: usize) -> bool {
        self.boundary_distance(a, b)
            .is_some_and(|distance| distance <= max_boundaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> RegionGraph {
        let boundaries = vec![
            (RegionId::new("FR"), RegionId::new("BE")),
            (RegionId::new("BE"), RegionId::new("NL")),
            (RegionId::new("NL"), RegionId::new("DE")),
        ];
        RegionGraph::from_boundaries(&boundaries)
    }

    #[test]
    fn test_boundary_distance() {
        let graph = chain();
        assert_eq!(graph.region_count(), 4);
        assert_eq!(
            graph.boundary_distance(&"FR".into(), &"NL".into()),
            Some(2)
        );
    }

    #[test]
    fn test_are_neighbors() {
        let graph = chain();
        assert!(graph.are_neighbors(&"FR".into(), &"BE".into(), 1));
        assert!(!graph.are_neighbors(&"FR".into(), &"DE".into(), 2));
        assert!(graph.are_neighbors(&"FR".into(), &"DE".into(), 3));
    }

    #[test]
    fn test_unknown_region_is_only_its_own_neighbor() {
        let graph = chain();
        assert!(graph.are_neighbors(&"ES".into(), &"ES".into(), 0));
        assert!(!graph.are_neighbors(&"ES".into(), &"FR".into(), 10));
    }
}
