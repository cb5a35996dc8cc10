use crate::network::{Dir, ElementDir, ElementId, Network};
use std::collections::HashMap;

/// Decides which elements besides switches are nodes of a contracted graph.
pub trait NodeKind {
    fn is_node(&self, net: &Network, element: ElementId) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeDir {
    pub node: NodeId,
    pub dir: Dir,
}

/// Sparse view of the track network: nodes are branching elements plus whatever the
/// `NodeKind` selects. Nodes are created lazily on first lookup.
pub struct TrackGraph<K> {
    kind: K,
    node_of: HashMap<ElementId, Option<NodeId>>,
    elements: Vec<ElementId>,
    visited: Vec<u64>,
    generation: u64,
}

impl<K: NodeKind> TrackGraph<K> {
    pub fn new(kind: K) -> Self {
        TrackGraph {
            kind,
            node_of: HashMap::new(),
            elements: Vec::new(),
            visited: Vec::new(),
            generation: 1,
        }
    }

    pub fn get_node(&mut self, net: &Network, element: ElementId) -> Option<NodeId> {
        if let Some(node) = self.node_of.get(&element) {
            return *node;
        }
        let node = if net.is_branching(element) || self.kind.is_node(net, element) {
            let id = NodeId(self.elements.len());
            self.elements.push(element);
            self.visited.push(0);
            Some(id)
        } else {
            None
        };
        self.node_of.insert(element, node);
        node
    }

    pub fn element(&self, node: NodeId) -> ElementId {
        self.elements[node.0]
    }

    pub fn element_dir(&self, at: NodeDir) -> ElementDir {
        ElementDir::new(self.elements[at.node.0], at.dir)
    }

    pub fn num_nodes(&self) -> usize {
        self.elements.len()
    }

    /// Forgets all visited marks.
    pub fn reset_visited(&mut self) {
        self.generation += 1;
    }

    pub fn is_visited(&self, node: NodeId) -> bool {
        self.visited[node.0] == self.generation
    }

    pub fn mark_visited(&mut self, node: NodeId) {
        self.visited[node.0] = self.generation;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testnet::*;

    struct Nothing;
    impl NodeKind for Nothing {
        fn is_node(&self, _: &Network, _: ElementId) -> bool {
            false
        }
    }

    #[test]
    fn only_switches_are_nodes() {
        let mut m = ModuleBuilder::new("A");
        m.line(&[1, 2, 3], 10.0);
        m.element(4, 10.0);
        m.link(2, 4);
        let net = build(vec![m]);
        let mut g = TrackGraph::new(Nothing);
        assert!(g.get_node(&net, element(&net, "A", 1)).is_none());
        assert!(g.get_node(&net, element(&net, "A", 2)).is_some());
        assert!(g.get_node(&net, element(&net, "A", 3)).is_none());
        assert_eq!(g.get_node(&net, element(&net, "A", 2)), Some(NodeId(0)));
        assert_eq!(g.num_nodes(), 1);
    }

    #[test]
    fn generation_reset() {
        let mut m = ModuleBuilder::new("A");
        m.line(&[1, 2, 3], 10.0);
        m.element(4, 10.0);
        m.link(2, 4);
        let net = build(vec![m]);
        let mut g = TrackGraph::new(Nothing);
        let n = g.get_node(&net, element(&net, "A", 2)).unwrap();
        assert!(!g.is_visited(n));
        g.mark_visited(n);
        assert!(g.is_visited(n));
        g.reset_visited();
        assert!(!g.is_visited(n));
    }
}
