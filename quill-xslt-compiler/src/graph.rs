//! Directed graphs over analysis nodes.
//!
//! The flow analyzer uses one traversal for two jobs: spreading a flag to
//! everything that can reach a node that has it, and finding cycles among
//! attribute sets, keys and global variables.

use std::hash::Hash;

use ahash::{HashMap, HashMapExt, HashSet, HashSetExt};
use quill_xslt_ast::XslFlags;

/// Somewhere to keep the flags of graph nodes. The traversal uses
/// [`XslFlags::STOP`] as its visited marker.
pub(crate) trait FlagStore<N> {
    fn get(&self, node: &N) -> XslFlags;
    fn set(&mut self, node: &N, flags: XslFlags);
}

#[derive(Debug, Clone)]
pub(crate) struct Graph<N> {
    edges: HashMap<N, Vec<N>>,
    nodes: Vec<N>,
}

impl<N: Clone + Eq + Hash> Default for Graph<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    InProgress,
    Done,
}

impl<N: Clone + Eq + Hash> Graph<N> {
    pub(crate) fn new() -> Self {
        Graph {
            edges: HashMap::new(),
            nodes: Vec::new(),
        }
    }

    fn add_node(&mut self, node: &N) {
        if !self.edges.contains_key(node) {
            self.edges.insert(node.clone(), Vec::new());
            self.nodes.push(node.clone());
        }
    }

    pub(crate) fn add_edge(&mut self, from: N, to: N) {
        self.add_node(&from);
        self.add_node(&to);
        if let Some(targets) = self.edges.get_mut(&from) {
            if !targets.contains(&to) {
                targets.push(to);
            }
        }
    }

    pub(crate) fn successors(&self, node: &N) -> &[N] {
        self.edges.get(node).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Every node with an edge, in the order they were first seen.
    pub(crate) fn nodes(&self) -> &[N] {
        &self.nodes
    }

    pub(crate) fn reversed(&self) -> Graph<N> {
        let mut reversed = Graph::new();
        for node in &self.nodes {
            reversed.add_node(node);
            for target in self.successors(node) {
                reversed.add_edge(target.clone(), node.clone());
            }
        }
        reversed
    }

    /// The edges of both graphs.
    pub(crate) fn merged(&self, other: &Graph<N>) -> Graph<N> {
        let mut merged = self.clone();
        for node in &other.nodes {
            merged.add_node(node);
            for target in other.successors(node) {
                merged.add_edge(node.clone(), target.clone());
            }
        }
        merged
    }

    /// Visit every node reachable from `start`, `start` included, marking
    /// each with [`XslFlags::STOP`]. Nodes already marked are not visited
    /// again, so the marks must be cleared between independent searches.
    pub(crate) fn depth_first<S: FlagStore<N>>(
        &self,
        start: &N,
        store: &mut S,
        visit: &mut impl FnMut(&N, &mut S),
    ) {
        let mut stack = vec![start.clone()];
        while let Some(node) = stack.pop() {
            let flags = store.get(&node);
            if flags.contains(XslFlags::STOP) {
                continue;
            }
            store.set(&node, flags | XslFlags::STOP);
            visit(&node, store);
            for target in self.successors(&node).iter().rev() {
                stack.push(target.clone());
            }
        }
    }

    pub(crate) fn clear_marks<S: FlagStore<N>>(&self, store: &mut S) {
        for node in &self.nodes {
            let flags = store.get(node);
            store.set(node, flags - XslFlags::STOP);
        }
    }

    /// Give `flag` to every node from which a node that already has it can
    /// be reached. Returns how many nodes gained the flag.
    pub(crate) fn propagate_backwards<S: FlagStore<N>>(
        &self,
        store: &mut S,
        flag: XslFlags,
    ) -> usize {
        self.reversed().propagate(store, flag)
    }

    /// Give `flag` to every node reachable from a node that has it.
    pub(crate) fn propagate<S: FlagStore<N>>(&self, store: &mut S, flag: XslFlags) -> usize {
        let sources: Vec<N> = self
            .nodes
            .iter()
            .filter(|node| store.get(node).contains(flag))
            .cloned()
            .collect();
        let mut gained = 0;
        for source in &sources {
            self.depth_first(source, store, &mut |node, store| {
                let flags = store.get(node);
                if !flags.contains(flag) {
                    gained += 1;
                    store.set(node, flags | flag);
                }
            });
        }
        self.clear_marks(store);
        gained
    }

    /// Find cycles with a three state search. Each back edge found is
    /// reported once, by the node it leads back to; the search never
    /// enters a node twice, whatever the length of the cycle.
    pub(crate) fn cycles(&self) -> Vec<N> {
        let mut states: HashMap<N, VisitState> = HashMap::new();
        let mut found = Vec::new();
        for root in &self.nodes {
            if states.contains_key(root) {
                continue;
            }
            states.insert(root.clone(), VisitState::InProgress);
            let mut stack: Vec<(N, usize)> = vec![(root.clone(), 0)];
            while let Some((node, index)) = stack.pop() {
                let targets = self.successors(&node);
                if index >= targets.len() {
                    states.insert(node, VisitState::Done);
                    continue;
                }
                let target = targets[index].clone();
                stack.push((node, index + 1));
                match states.get(&target) {
                    None => {
                        states.insert(target.clone(), VisitState::InProgress);
                        stack.push((target, 0));
                    }
                    Some(VisitState::InProgress) => found.push(target),
                    Some(VisitState::Done) => {}
                }
            }
        }
        found
    }

    /// The nodes in an order where every node comes after the nodes it has
    /// edges to, as far as cycles allow.
    pub(crate) fn post_order(&self) -> Vec<N> {
        let mut seen: HashSet<N> = HashSet::new();
        let mut order = Vec::new();
        for root in &self.nodes {
            if !seen.insert(root.clone()) {
                continue;
            }
            let mut stack: Vec<(N, usize)> = vec![(root.clone(), 0)];
            while let Some((node, index)) = stack.pop() {
                let targets = self.successors(&node);
                if index >= targets.len() {
                    order.push(node);
                    continue;
                }
                let target = targets[index].clone();
                stack.push((node, index + 1));
                if seen.insert(target.clone()) {
                    stack.push((target, 0));
                }
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Flags(HashMap<u32, XslFlags>);

    impl FlagStore<u32> for Flags {
        fn get(&self, node: &u32) -> XslFlags {
            self.0.get(node).copied().unwrap_or_default()
        }

        fn set(&mut self, node: &u32, flags: XslFlags) {
            self.0.insert(*node, flags);
        }
    }

    fn chain(edges: &[(u32, u32)]) -> Graph<u32> {
        let mut graph = Graph::new();
        for (from, to) in edges {
            graph.add_edge(*from, *to);
        }
        graph
    }

    #[test]
    fn test_propagate_backwards_reaches_all_callers() {
        // 1 calls 2 calls 3; 4 calls 3; 5 is unrelated
        let graph = chain(&[(1, 2), (2, 3), (4, 3), (5, 6)]);
        let mut flags = Flags::default();
        flags.set(&3, XslFlags::POSITION);
        let gained = graph.propagate_backwards(&mut flags, XslFlags::POSITION);
        assert_eq!(gained, 3);
        for node in [1, 2, 3, 4] {
            assert!(flags.get(&node).contains(XslFlags::POSITION), "{}", node);
        }
        assert!(!flags.get(&5).contains(XslFlags::POSITION));
        // marks are cleared after every pass
        assert!(graph.nodes().iter().all(|n| !flags.get(n).contains(XslFlags::STOP)));
    }

    #[test]
    fn test_propagate_terminates_on_cycles() {
        let graph = chain(&[(1, 2), (2, 1), (2, 3)]);
        let mut flags = Flags::default();
        flags.set(&1, XslFlags::SIDE_EFFECTS);
        graph.propagate(&mut flags, XslFlags::SIDE_EFFECTS);
        assert!(flags.get(&3).contains(XslFlags::SIDE_EFFECTS));
    }

    #[test]
    fn test_cycles_reported_once() {
        assert_eq!(chain(&[(1, 1)]).cycles(), vec![1]);
        assert_eq!(chain(&[(1, 2), (2, 1)]).cycles(), vec![1]);
        assert_eq!(
            chain(&[(1, 2), (2, 3), (3, 4), (4, 5), (5, 1)]).cycles(),
            vec![1]
        );
        assert!(chain(&[(1, 2), (1, 3), (2, 3)]).cycles().is_empty());
    }

    #[test]
    fn test_post_order() {
        let graph = chain(&[(1, 2), (2, 3), (1, 3)]);
        assert_eq!(graph.post_order(), vec![3, 2, 1]);
    }
}
