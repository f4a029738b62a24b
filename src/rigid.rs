//! Rigid Skin Assigner
//!
//! Deformable-but-unskinned mesh parts (hair cards, accessories, clothing
//! shells) become rigidly skinned parts: the node's world transform is baked
//! into its geometry exactly once, the node becomes a flat child of the
//! scene root, and every vertex is bound to the single joint found by
//! walking the node's original ancestor chain through the node->joint map.

use glam::Mat4;
use hashbrown::HashSet;

use crate::config::RigConfig;
use crate::document::{Document, MeshId, NodeId, SkinId};
use crate::joints::JointIndex;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RigidStats {
    /// Mesh nodes that received a rigid joint binding.
    pub skinned: usize,
    /// Meshless local-only nodes deleted with their subtrees.
    pub deleted: usize,
}

pub fn assign_rigid_skins(doc: &mut Document, skin: SkinId, config: &RigConfig) -> RigidStats {
    let index = JointIndex::build(doc, skin);
    let order = doc.traverse_pre_order();
    let mut stats = RigidStats::default();
    let mut baked: HashSet<MeshId> = HashSet::new();

    for id in order {
        // A local-only deletion earlier in the walk may have taken this
        // node's whole subtree with it.
        if !doc.is_alive(id) {
            continue;
        }

        let Some(mesh_id) = doc.node(id).mesh else {
            // Dead decorative nodes: no geometry, no animation relevance.
            if doc.node(id).name.ends_with(&config.local_suffix) {
                doc.release_subtree(id);
                stats.deleted += 1;
            }
            continue;
        };

        if doc.node(id).skin.is_some() {
            continue;
        }

        // Lineage and world transform are captured before reparenting; the
        // flat child of root has neither.
        let joint = find_mapped_joint(doc, id, config, &index);
        let world = doc.world_transform(id);

        let mesh_id = ensure_unbaked_mesh(doc, id, mesh_id, &mut baked);
        bake_transform(doc, mesh_id, world);
        doc.set_identity(id);
        doc.detach(id);
        doc.add_root(id);

        match joint {
            Some((joint_index, joint_name)) => {
                bind_to_joint(doc, mesh_id, joint_index);
                doc.node_mut(id).skin = Some(skin);
                stats.skinned += 1;
                tracing::debug!(
                    "rigid-skinned '{}' to joint '{}' ({})",
                    doc.node(id).name,
                    joint_name,
                    joint_index
                );
            }
            None => {
                tracing::warn!(
                    "no ancestor of '{}' maps to a known joint, leaving unskinned",
                    doc.node(id).name
                );
            }
        }
    }

    tracing::info!(
        "rigid skin assignment: {} nodes skinned, {} local nodes deleted",
        stats.skinned,
        stats.deleted
    );
    stats
}

/// Walk the ancestor chain, nearest first, and return the first joint a
/// mapped ancestor name resolves to. The search covers the whole chain, not
/// just the immediate parent.
fn find_mapped_joint(
    doc: &Document,
    id: NodeId,
    config: &RigConfig,
    index: &JointIndex,
) -> Option<(u16, String)> {
    for ancestor in doc.ancestors(id) {
        if let Some(joint_name) = config.node_joints.get(&doc.node(ancestor).name) {
            if let Some(joint_index) = index.index_of(joint_name) {
                return Some((joint_index as u16, joint_name.clone()));
            }
            tracing::warn!(
                "ancestor '{}' maps to joint '{}' which is not in the skin",
                doc.node(ancestor).name,
                joint_name
            );
        }
    }
    None
}

/// A mesh shared by several nodes must not be baked twice; the second node
/// gets its own copy.
fn ensure_unbaked_mesh(
    doc: &mut Document,
    node: NodeId,
    mesh_id: MeshId,
    baked: &mut HashSet<MeshId>,
) -> MeshId {
    let mesh_id = if baked.contains(&mesh_id) {
        let copy = doc.mesh(mesh_id).clone();
        let copy_id = doc.add_mesh(copy);
        doc.node_mut(node).mesh = Some(copy_id);
        copy_id
    } else {
        mesh_id
    };
    baked.insert(mesh_id);
    mesh_id
}

/// Bake a world transform into the mesh geometry: positions through the full
/// matrix, normals through the rotation part (inverse transpose),
/// renormalized.
fn bake_transform(doc: &mut Document, mesh_id: MeshId, world: Mat4) {
    let normal_matrix = world.inverse().transpose();
    let mesh = doc.mesh_mut(mesh_id);

    for primitive in &mut mesh.primitives {
        for position in &mut primitive.positions {
            let p = world.transform_point3((*position).into());
            *position = p.to_array();
        }
        if let Some(normals) = &mut primitive.normals {
            for normal in normals {
                let n = normal_matrix
                    .transform_vector3((*normal).into())
                    .normalize_or_zero();
                *normal = n.to_array();
            }
        }
    }
}

/// Uniform single-influence binding: joints `[k, 0, 0, 0]`, weights
/// `[1, 0, 0, 0]` for every vertex of every primitive.
fn bind_to_joint(doc: &mut Document, mesh_id: MeshId, joint_index: u16) {
    let mesh = doc.mesh_mut(mesh_id);
    for primitive in &mut mesh.primitives {
        let count = primitive.vertex_count();
        primitive.joints = Some(vec![[joint_index, 0, 0, 0]; count]);
        primitive.weights = Some(vec![[1.0, 0.0, 0.0, 0.0]; count]);
    }
}
