//! Scene-graph nodes and tree operations.

use glam::{Mat4, Quat, Vec3};

use super::{Document, MeshId, NodeId, SkinId};

/// A scene node: TRS local transform, tree links, optional mesh and skin.
///
/// Names are not guaranteed unique. The tree is acyclic; every non-root node
/// has exactly one parent.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub mesh: Option<MeshId>,
    pub skin: Option<SkinId>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) alive: bool,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            mesh: None,
            skin: None,
            parent: None,
            children: Vec::new(),
            alive: true,
        }
    }

    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

impl Document {
    pub fn add_node(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() as u32 - 1)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    pub fn is_alive(&self, id: NodeId) -> bool {
        self.nodes[id.0 as usize].alive
    }

    /// Attach a detached node as a child of the scene root.
    pub fn add_root(&mut self, id: NodeId) {
        debug_assert!(self.node(id).parent.is_none());
        self.roots.push(id);
    }

    /// Attach a detached node under `parent`, at the end of its child list.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) {
        debug_assert!(self.node(child).parent.is_none());
        self.node_mut(child).parent = Some(parent);
        self.node_mut(parent).children.push(child);
    }

    /// Remove a node from its parent (or from the scene root list), leaving
    /// it detached but alive.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.node(id).parent {
            self.node_mut(parent).children.retain(|&c| c != id);
            self.node_mut(id).parent = None;
        } else {
            self.roots.retain(|&r| r != id);
        }
    }

    /// Detach a node and mark it and every descendant dead.
    pub fn release_subtree(&mut self, id: NodeId) {
        self.detach(id);
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            self.node_mut(n).alive = false;
            stack.extend(self.node(n).children.iter().copied());
        }
    }

    /// Reset a node's local transform to identity.
    pub fn set_identity(&mut self, id: NodeId) {
        let node = self.node_mut(id);
        node.translation = Vec3::ZERO;
        node.rotation = Quat::IDENTITY;
        node.scale = Vec3::ONE;
    }

    /// World transform of a node: product of local matrices from the root
    /// down. Iterative parent-chain walk, bounded by tree depth.
    pub fn world_transform(&self, id: NodeId) -> Mat4 {
        let mut matrix = self.node(id).local_matrix();
        let mut current = self.node(id).parent;
        while let Some(p) = current {
            matrix = self.node(p).local_matrix() * matrix;
            current = self.node(p).parent;
        }
        matrix
    }

    /// Ancestors of a node, nearest first (excludes the node itself).
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut current = self.node(id).parent;
        std::iter::from_fn(move || {
            let next = current?;
            current = self.node(next).parent;
            Some(next)
        })
    }

    /// Depth-first pre-order traversal of all live nodes, children in listed
    /// order.
    pub fn traverse_pre_order(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if !self.is_alive(id) {
                continue;
            }
            out.push(id);
            stack.extend(self.node(id).children.iter().rev().copied());
        }
        out
    }

    /// First live node with the given name, in traversal order.
    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.traverse_pre_order()
            .into_iter()
            .find(|&id| self.node(id).name == name)
    }

    pub fn live_node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.alive).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_doc() -> (Document, NodeId, NodeId, NodeId) {
        let mut doc = Document::new();
        let a = doc.add_node(Node::new("a"));
        let b = doc.add_node(Node::new("b"));
        let c = doc.add_node(Node::new("c"));
        doc.add_root(a);
        doc.add_child(a, b);
        doc.add_child(b, c);
        (doc, a, b, c)
    }

    #[test]
    fn test_world_transform_composes_parent_chain() {
        let (mut doc, a, b, c) = chain_doc();
        doc.node_mut(a).translation = Vec3::new(1.0, 0.0, 0.0);
        doc.node_mut(b).translation = Vec3::new(0.0, 2.0, 0.0);
        doc.node_mut(c).translation = Vec3::new(0.0, 0.0, 3.0);

        let world = doc.world_transform(c);
        let origin = world.transform_point3(Vec3::ZERO);
        assert!((origin - Vec3::new(1.0, 2.0, 3.0)).length() < 1e-6);
    }

    #[test]
    fn test_release_subtree_kills_descendants() {
        let (mut doc, a, b, c) = chain_doc();
        doc.release_subtree(b);

        assert!(doc.is_alive(a));
        assert!(!doc.is_alive(b));
        assert!(!doc.is_alive(c));
        assert_eq!(doc.traverse_pre_order(), vec![a]);
        assert_eq!(doc.live_node_count(), 1);
    }

    #[test]
    fn test_detach_and_reattach_as_root() {
        let (mut doc, a, b, _c) = chain_doc();
        doc.detach(b);
        assert!(doc.node(b).parent().is_none());
        assert!(!doc.node(a).children().contains(&b));

        doc.add_root(b);
        assert_eq!(doc.roots, vec![a, b]);
    }

    #[test]
    fn test_ancestors_nearest_first() {
        let (doc, a, b, c) = chain_doc();
        let chain: Vec<_> = doc.ancestors(c).collect();
        assert_eq!(chain, vec![b, a]);
    }

    #[test]
    fn test_pre_order_visits_children_in_listed_order() {
        let mut doc = Document::new();
        let root = doc.add_node(Node::new("root"));
        let x = doc.add_node(Node::new("x"));
        let y = doc.add_node(Node::new("y"));
        let z = doc.add_node(Node::new("z"));
        doc.add_root(root);
        doc.add_child(root, x);
        doc.add_child(root, y);
        doc.add_child(x, z);

        assert_eq!(doc.traverse_pre_order(), vec![root, x, z, y]);
    }
}
