// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Section call graph
//!
//! Builds an inter-section call graph from the `CALLF`/`JUMPF` targets found
//! by the linear scan and checks that every section is reachable from the
//! container entry (section 0).

use std::collections::{BTreeSet, HashSet};

use petgraph::{
    graph::{DiGraph, NodeIndex},
    visit::Bfs,
};

/// Call graph over the code sections of one container.
pub(crate) struct SectionCallGraph {
    graph: DiGraph<usize, ()>,
    nodes: Vec<NodeIndex>,
}

impl SectionCallGraph {
    /// Build the graph from the per-section call targets, in section order.
    ///
    /// Targets outside the section list are ignored.
    pub(crate) fn new(calls: &[BTreeSet<usize>]) -> Self {
        let mut graph = DiGraph::with_capacity(calls.len(), 0);
        let nodes: Vec<NodeIndex> = (0..calls.len())
            .map(|section| graph.add_node(section))
            .collect();

        for (caller, callees) in calls.iter().enumerate() {
            for &callee in callees {
                if let Some(&target) = nodes.get(callee) {
                    graph.update_edge(nodes[caller], target, ());
                }
            }
        }

        Self { graph, nodes }
    }

    /// Returns the sections not reachable from section 0, in ascending order.
    pub(crate) fn unreachable_sections(&self) -> Vec<usize> {
        let Some(&entry) = self.nodes.first() else {
            return Vec::new();
        };

        let mut reachable = HashSet::new();
        let mut bfs = Bfs::new(&self.graph, entry);
        while let Some(node) = bfs.next(&self.graph) {
            reachable.insert(node);
        }

        self.nodes
            .iter()
            .filter(|&&node| !reachable.contains(&node))
            .map(|&node| self.graph[node])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::SectionCallGraph;

    fn calls(edges: &[&[usize]]) -> Vec<BTreeSet<usize>> {
        edges
            .iter()
            .map(|callees| callees.iter().copied().collect())
            .collect()
    }

    #[test]
    fn test_single_section() {
        let graph = SectionCallGraph::new(&calls(&[&[]]));
        assert!(graph.unreachable_sections().is_empty());
    }

    #[test]
    fn test_empty_graph() {
        let graph = SectionCallGraph::new(&[]);
        assert!(graph.unreachable_sections().is_empty());
    }

    #[test]
    fn test_chain_is_reachable() {
        // 0 -> 1 -> 2
        let graph = SectionCallGraph::new(&calls(&[&[1], &[2], &[]]));
        assert!(graph.unreachable_sections().is_empty());
    }

    #[test]
    fn test_uncalled_section() {
        // 0 -> 2, nobody calls 1 or 3
        let graph = SectionCallGraph::new(&calls(&[&[2], &[3], &[], &[]]));
        assert_eq!(graph.unreachable_sections(), vec![1, 3]);
    }

    #[test]
    fn test_cycle_not_rooted_at_entry() {
        // 1 <-> 2 call each other but 0 calls neither
        let graph = SectionCallGraph::new(&calls(&[&[], &[2], &[1]]));
        assert_eq!(graph.unreachable_sections(), vec![1, 2]);
    }

    #[test]
    fn test_recursion_is_allowed() {
        // 0 -> 1 -> 0, 1 -> 1
        let graph = SectionCallGraph::new(&calls(&[&[1], &[0, 1]]));
        assert!(graph.unreachable_sections().is_empty());
    }

    #[test]
    fn test_out_of_range_target_ignored() {
        let graph = SectionCallGraph::new(&calls(&[&[999]]));
        assert!(graph.unreachable_sections().is_empty());
    }
}
