//! Lazy invalidation network of the renderer.
//!
//! Setters mark a node, which also marks every node downstream of it. The
//! renderer drains the dirty set once per frame in dependency order and only
//! recomputes what was marked.

use std::collections::BTreeSet;

/// A lazily configured part of the renderer. Declaration order is a valid
/// topological order of the edges below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Node {
    HdriReader,
    HdriHash,
    HdriTexture,
    HdriLut,
    HdriSh,
    HdriSpecular,
    HdriSkybox,
    ActorsProperties,
    Coloring,
    ColorTransferFunction,
    ColoringMappers,
    PointSpritesMappers,
    VolumePropsMappers,
    ColoringActorsProperties,
    ScalarBarActor,
    Grid,
    MetaData,
    CheatSheet,
    RenderPasses,
}

impl Node {
    pub const ALL: [Node; 19] = [
        Node::HdriReader,
        Node::HdriHash,
        Node::HdriTexture,
        Node::HdriLut,
        Node::HdriSh,
        Node::HdriSpecular,
        Node::HdriSkybox,
        Node::ActorsProperties,
        Node::Coloring,
        Node::ColorTransferFunction,
        Node::ColoringMappers,
        Node::PointSpritesMappers,
        Node::VolumePropsMappers,
        Node::ColoringActorsProperties,
        Node::ScalarBarActor,
        Node::Grid,
        Node::MetaData,
        Node::CheatSheet,
        Node::RenderPasses,
    ];

    /// Nodes that must be recomputed when this one is.
    pub fn downstream(self) -> &'static [Node] {
        match self {
            Node::HdriReader => &[Node::HdriHash, Node::HdriTexture],
            Node::HdriHash => &[Node::HdriTexture, Node::HdriSh, Node::HdriSpecular],
            Node::HdriTexture => &[Node::HdriSkybox, Node::HdriSh, Node::HdriSpecular],
            Node::ActorsProperties => &[Node::ColoringActorsProperties],
            Node::Coloring => &[
                Node::ColorTransferFunction,
                Node::ScalarBarActor,
                Node::CheatSheet,
            ],
            Node::ColorTransferFunction => &[
                Node::ColoringMappers,
                Node::PointSpritesMappers,
                Node::VolumePropsMappers,
                Node::ScalarBarActor,
            ],
            Node::HdriSkybox => &[Node::RenderPasses],
            _ => &[],
        }
    }
}

#[derive(Debug, Clone)]
pub struct DirtyGraph {
    dirty: BTreeSet<Node>,
}

impl Default for DirtyGraph {
    /// Everything starts unconfigured.
    fn default() -> Self {
        Self {
            dirty: Node::ALL.into_iter().collect(),
        }
    }
}

impl DirtyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clean() -> Self {
        Self {
            dirty: BTreeSet::new(),
        }
    }

    /// Marks `node` and its transitive downstream nodes.
    pub fn mark(&mut self, node: Node) {
        let mut stack = vec![node];
        while let Some(node) = stack.pop() {
            if self.dirty.insert(node) {
                stack.extend_from_slice(node.downstream());
            }
        }
    }

    pub fn mark_all(&mut self) {
        self.dirty.extend(Node::ALL);
    }

    pub fn is_dirty(&self, node: Node) -> bool {
        self.dirty.contains(&node)
    }

    pub fn is_clean(&self) -> bool {
        self.dirty.is_empty()
    }

    /// Removes `node` from the dirty set, returning whether it was dirty.
    pub fn take(&mut self, node: Node) -> bool {
        self.dirty.remove(&node)
    }

    /// Empties the dirty set in dependency order.
    pub fn drain(&mut self) -> Vec<Node> {
        std::mem::take(&mut self.dirty).into_iter().collect()
    }

    pub fn dirty_nodes(&self) -> impl Iterator<Item = Node> + '_ {
        self.dirty.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::{DirtyGraph, Node};

    #[test]
    fn declaration_order_is_topological() {
        for node in Node::ALL {
            for &child in node.downstream() {
                assert!(child > node, "{node:?} -> {child:?}");
            }
        }
    }

    #[test]
    fn marking_propagates_downstream_only() {
        let mut graph = DirtyGraph::clean();
        graph.mark(Node::Coloring);
        let marked: Vec<Node> = graph.dirty_nodes().collect();
        assert_eq!(
            marked,
            vec![
                Node::Coloring,
                Node::ColorTransferFunction,
                Node::ColoringMappers,
                Node::PointSpritesMappers,
                Node::VolumePropsMappers,
                Node::ScalarBarActor,
                Node::CheatSheet,
            ]
        );
        assert!(!graph.is_dirty(Node::ActorsProperties));
    }

    #[test]
    fn drain_returns_upstream_first_and_cleans() {
        let mut graph = DirtyGraph::clean();
        graph.mark(Node::HdriSkybox);
        graph.mark(Node::HdriReader);
        let drained = graph.drain();
        assert_eq!(drained.first(), Some(&Node::HdriReader));
        assert_eq!(drained.last(), Some(&Node::RenderPasses));
        assert!(graph.is_clean());
    }

    #[test]
    fn take_clears_a_single_node() {
        let mut graph = DirtyGraph::new();
        assert!(graph.take(Node::Grid));
        assert!(!graph.take(Node::Grid));
        assert!(graph.is_dirty(Node::RenderPasses));
    }
}
