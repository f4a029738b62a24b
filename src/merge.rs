//! Primitive merge/join
//!
//! Collapses all packed primitives into a single primitive on a single mesh
//! node, so the whole character renders in one draw call. Runs after atlas
//! packing: every primitive already shares one material and cell-confined
//! UVs.

use hashbrown::HashSet;

use crate::document::{
    Document, MaterialId, Mesh, MeshId, Node, NodeId, Primitive, SkinId,
};

/// Collect (mesh, primitive index) pairs in stable first-seen mesh-node
/// order. This order defines atlas slot assignment and must match between
/// the UV remap and texture composite passes, so it is computed once and
/// never re-sorted.
pub fn collect_primitives(doc: &Document) -> Vec<(MeshId, usize)> {
    let mut seen: HashSet<MeshId> = HashSet::new();
    let mut out = Vec::new();
    for id in doc.traverse_pre_order() {
        if let Some(mesh_id) = doc.node(id).mesh {
            if seen.insert(mesh_id) {
                for prim_idx in 0..doc.mesh(mesh_id).primitives.len() {
                    out.push((mesh_id, prim_idx));
                }
            }
        }
    }
    out
}

/// Concatenate the given primitives into one, rebase indices, and hang the
/// result off a single new root node carrying the skin. Source mesh nodes
/// lose their mesh reference and are released if they have no children.
pub fn merge_primitives(
    doc: &mut Document,
    primitives: &[(MeshId, usize)],
    material: MaterialId,
    skin: Option<SkinId>,
) -> Option<NodeId> {
    if primitives.is_empty() {
        return None;
    }

    let has_normals = primitives
        .iter()
        .any(|&(m, p)| doc.mesh(m).primitives[p].normals.is_some());
    let has_uvs = primitives
        .iter()
        .any(|&(m, p)| doc.mesh(m).primitives[p].uvs.is_some());
    let has_skinning = primitives
        .iter()
        .any(|&(m, p)| doc.mesh(m).primitives[p].joints.is_some());

    let mut merged = Primitive {
        material: Some(material),
        indices: Some(Vec::new()),
        ..Default::default()
    };
    if has_normals {
        merged.normals = Some(Vec::new());
    }
    if has_uvs {
        merged.uvs = Some(Vec::new());
    }
    if has_skinning {
        merged.joints = Some(Vec::new());
        merged.weights = Some(Vec::new());
    }

    for &(mesh_id, prim_idx) in primitives {
        let source = doc.mesh(mesh_id).primitives[prim_idx].clone();
        let base = merged.positions.len() as u32;
        let count = source.vertex_count();

        merged.positions.extend_from_slice(&source.positions);
        if let Some(normals) = &mut merged.normals {
            match source.normals {
                Some(src) => normals.extend_from_slice(&src),
                None => normals.extend(std::iter::repeat([0.0, 1.0, 0.0]).take(count)),
            }
        }
        if let Some(uvs) = &mut merged.uvs {
            match source.uvs {
                Some(src) => uvs.extend_from_slice(&src),
                None => uvs.extend(std::iter::repeat([0.0, 0.0]).take(count)),
            }
        }
        if let Some(joints) = &mut merged.joints {
            let weights = merged.weights.as_mut().unwrap();
            match (source.joints, source.weights) {
                (Some(j), Some(w)) => {
                    joints.extend_from_slice(&j);
                    weights.extend_from_slice(&w);
                }
                _ => {
                    // Unskinned part merged into a skinned mesh rides joint 0.
                    tracing::warn!(
                        "merging unskinned primitive from '{}' bound to joint 0",
                        doc.mesh(mesh_id).name
                    );
                    joints.extend(std::iter::repeat([0u16; 4]).take(count));
                    weights.extend(std::iter::repeat([1.0, 0.0, 0.0, 0.0]).take(count));
                }
            }
        }

        let indices = merged.indices.as_mut().unwrap();
        match source.indices {
            Some(src) => indices.extend(src.iter().map(|&i| i + base)),
            None => indices.extend(base..base + count as u32),
        }
    }

    let vertex_count = merged.positions.len();
    let index_count = merged.indices.as_ref().map_or(0, Vec::len);

    let mut mesh = Mesh::new("merged");
    mesh.primitives.push(merged);
    let mesh_id = doc.add_mesh(mesh);

    // Detach geometry from the source nodes; drop the ones that are now
    // empty leaves.
    let source_meshes: HashSet<MeshId> = primitives.iter().map(|&(m, _)| m).collect();
    for id in doc.traverse_pre_order() {
        let node = doc.node(id);
        if node.mesh.is_some_and(|m| source_meshes.contains(&m)) {
            doc.node_mut(id).mesh = None;
            doc.node_mut(id).skin = None;
            if doc.node(id).children().is_empty() {
                doc.release_subtree(id);
            }
        }
    }

    let mut node = Node::new("merged");
    node.mesh = Some(mesh_id);
    node.skin = skin;
    let node_id = doc.add_node(node);
    doc.add_root(node_id);

    tracing::info!(
        "merged {} primitives into one ({} vertices, {} indices)",
        primitives.len(),
        vertex_count,
        index_count
    );
    Some(node_id)
}
