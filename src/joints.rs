//! Joint Index
//!
//! Name -> joint node and name -> list-index maps over a skin's joint
//! sequence. Joint names are expected to be unique within one skin; on a
//! collision the later joint wins, which matches the behavior of the assets
//! this tool consumes, but the collision is surfaced as a validation warning
//! because it usually indicates a malformed rig.

use hashbrown::HashMap;

use crate::document::{Document, NodeId, SkinId};

pub struct JointIndex {
    by_name: HashMap<String, NodeId>,
    order: HashMap<String, usize>,
}

impl JointIndex {
    /// Pure read over the skin's current joint list.
    pub fn build(doc: &Document, skin: SkinId) -> Self {
        let mut by_name = HashMap::new();
        let mut order = HashMap::new();

        for (i, &joint) in doc.skin(skin).joints.iter().enumerate() {
            let name = doc.node(joint).name.clone();
            if by_name.insert(name.clone(), joint).is_some() {
                tracing::warn!("duplicate joint name '{}' in skin, keeping the last", name);
            }
            order.insert(name, i);
        }

        Self { by_name, order }
    }

    pub fn node(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.order.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Node, Skin};

    #[test]
    fn test_index_maps_names_to_nodes_and_indices() {
        let mut doc = Document::new();
        let hips = doc.add_node(Node::new("Hips"));
        let head = doc.add_node(Node::new("Head"));
        doc.add_root(hips);
        doc.add_child(hips, head);

        let mut skin = Skin::new("skin");
        skin.joints = vec![hips, head];
        let skin = doc.add_skin(skin);

        let index = JointIndex::build(&doc, skin);
        assert_eq!(index.len(), 2);
        assert_eq!(index.node("Head"), Some(head));
        assert_eq!(index.index_of("Head"), Some(1));
        assert_eq!(index.index_of("Hips"), Some(0));
        assert!(!index.contains("Tail"));
    }

    #[test]
    fn test_duplicate_name_last_wins() {
        let mut doc = Document::new();
        let first = doc.add_node(Node::new("Bone"));
        let second = doc.add_node(Node::new("Bone"));
        doc.add_root(first);
        doc.add_root(second);

        let mut skin = Skin::new("skin");
        skin.joints = vec![first, second];
        let skin = doc.add_skin(skin);

        let index = JointIndex::build(&doc, skin);
        assert_eq!(index.node("Bone"), Some(second));
        assert_eq!(index.index_of("Bone"), Some(1));
    }
}
