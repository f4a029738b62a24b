//! Skeleton Splicer
//!
//! Grafts a donor skeleton into the target scene, prunes deny-listed joints,
//! applies the canonical rest pose, and recomputes inverse bind matrices
//! from the joints' final world transforms. Stages must run in that order:
//! recomputing before pruning or posing would bake the wrong bind pose.

use glam::{Mat4, Quat, Vec3};

use crate::config::RigConfig;
use crate::document::{Document, Node, NodeId, SkinId};
use crate::error::RigError;
use crate::joints::JointIndex;

/// Determinant threshold below which a world matrix is treated as
/// non-invertible.
const DEGENERATE_DET: f32 = 1e-8;

/// Full splice sequence: graft, prune, rest pose, recompute.
pub fn splice_skeleton(
    target: &mut Document,
    donor: &mut Document,
    skin: SkinId,
    config: &RigConfig,
) -> Result<NodeId, RigError> {
    let root = graft(target, donor, skin)?;
    tracing::info!(
        "grafted donor skeleton '{}' ({} joints)",
        target.node(root).name,
        target.skin(skin).joint_count()
    );

    prune_joints(target, skin, &config.prune_joints);
    apply_rest_pose(target, skin, config);
    recompute_inverse_bind_matrices(target, skin)?;
    Ok(root)
}

/// Detach the donor scene's single root child, move it under the target
/// scene root, and rebind the skin to it.
///
/// The skin's joint list is repopulated from the grafted subtree in
/// depth-first pre-order; inverse bind matrices are reset to identity and
/// only become meaningful after [`recompute_inverse_bind_matrices`].
pub fn graft(
    target: &mut Document,
    donor: &mut Document,
    skin: SkinId,
) -> Result<NodeId, RigError> {
    let donor_root = donor.roots.first().copied().ok_or(RigError::MissingDonorRoot)?;

    let grafted = copy_subtree(donor, donor_root, target);
    donor.release_subtree(donor_root);
    target.add_root(grafted);

    let joints = subtree_pre_order(target, grafted);
    let skin = target.skin_mut(skin);
    skin.skeleton_root = Some(grafted);
    skin.inverse_bind_matrices = vec![Mat4::IDENTITY; joints.len()];
    skin.joints = joints;

    Ok(grafted)
}

/// Remove each named joint (and its subtree) from the scene and from the
/// skin's joint list, keeping the matrix array index-aligned. Names absent
/// from the skin are skipped; a rig variant may simply not have them.
pub fn prune_joints(doc: &mut Document, skin: SkinId, names: &[String]) {
    let index = JointIndex::build(doc, skin);
    let mut removed = 0usize;

    for name in names {
        match index.node(name) {
            Some(id) if doc.is_alive(id) => {
                doc.release_subtree(id);
                removed += 1;
            }
            _ => {
                tracing::warn!("joint '{}' not found in skin, skipping prune", name);
            }
        }
    }

    // A pruned joint may have carried descendant joints with it; drop every
    // dead entry and its matrix together so the arrays stay parallel.
    let alive: Vec<bool> = doc.skin(skin).joints.iter().map(|&j| doc.is_alive(j)).collect();
    let s = doc.skin_mut(skin);
    let mut keep = alive.iter().copied();
    s.joints.retain(|_| keep.next().unwrap());
    let mut keep = alive.iter().copied();
    s.inverse_bind_matrices.retain(|_| keep.next().unwrap());

    if removed > 0 {
        tracing::info!("pruned {} joint subtrees, {} joints remain", removed, s.joints.len());
    }
}

/// Write the canonical T-pose translation/rotation onto each configured
/// joint. Scale is left untouched.
pub fn apply_rest_pose(doc: &mut Document, skin: SkinId, config: &RigConfig) {
    let index = JointIndex::build(doc, skin);
    for (joint_name, pose) in &config.rest_pose {
        match index.node(joint_name) {
            Some(id) if doc.is_alive(id) => {
                let node = doc.node_mut(id);
                node.translation = Vec3::from(pose.translation);
                node.rotation = Quat::from_array(pose.rotation);
            }
            _ => {
                tracing::warn!("rest pose joint '{}' not found in skin, skipping", joint_name);
            }
        }
    }
}

/// Replace the skin's inverse-bind-matrix buffer with the inverse of every
/// remaining joint's current world transform, in joint-list order.
///
/// Must run after pruning and after any joint-transform edits. A degenerate
/// world matrix (zero scale somewhere in the chain) is a fatal error rather
/// than a source of NaNs.
pub fn recompute_inverse_bind_matrices(doc: &mut Document, skin: SkinId) -> Result<(), RigError> {
    let joints = doc.skin(skin).joints.clone();
    let mut matrices = Vec::with_capacity(joints.len());

    for &joint in &joints {
        let world = doc.world_transform(joint);
        if world.determinant().abs() < DEGENERATE_DET {
            return Err(RigError::DegenerateTransform {
                joint: doc.node(joint).name.clone(),
            });
        }
        matrices.push(world.inverse());
    }

    doc.skin_mut(skin).inverse_bind_matrices = matrices;
    Ok(())
}

fn copy_subtree(src: &Document, src_id: NodeId, dst: &mut Document) -> NodeId {
    let node = src.node(src_id);
    let mut copy = Node::new(node.name.clone());
    copy.translation = node.translation;
    copy.rotation = node.rotation;
    copy.scale = node.scale;
    let dst_id = dst.add_node(copy);

    let children: Vec<NodeId> = src.node(src_id).children().to_vec();
    for child in children {
        let c = copy_subtree(src, child, dst);
        dst.add_child(dst_id, c);
    }
    dst_id
}

fn subtree_pre_order(doc: &Document, root: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        out.push(id);
        stack.extend(doc.node(id).children().iter().rev().copied());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Skin;
    use hashbrown::HashMap;

    fn test_config(prune: &[&str]) -> RigConfig {
        RigConfig {
            root_bone: "Root".to_string(),
            translation_scale: 1.0,
            prune_joints: prune.iter().map(|s| s.to_string()).collect(),
            node_joints: HashMap::new(),
            rest_pose: HashMap::new(),
            local_suffix: "_Local".to_string(),
            cell_size: 64,
        }
    }

    /// Donor: Root -> Spine -> {Head, Tail -> TailTip}
    fn donor_doc() -> Document {
        let mut donor = Document::new();
        let root = donor.add_node(Node::new("Root"));
        let spine = donor.add_node(Node::new("Spine"));
        let head = donor.add_node(Node::new("Head"));
        let tail = donor.add_node(Node::new("Tail"));
        let tip = donor.add_node(Node::new("TailTip"));
        donor.add_root(root);
        donor.add_child(root, spine);
        donor.add_child(spine, head);
        donor.add_child(spine, tail);
        donor.add_child(tail, tip);

        donor.node_mut(spine).translation = Vec3::new(0.0, 1.0, 0.0);
        donor.node_mut(head).translation = Vec3::new(0.0, 0.5, 0.0);
        donor
    }

    fn target_with_skin() -> (Document, SkinId) {
        let mut doc = Document::new();
        let skin = doc.add_skin(Skin::new("body"));
        (doc, skin)
    }

    #[test]
    fn test_graft_moves_donor_root_and_rebinds_joints() {
        let (mut target, skin) = target_with_skin();
        let mut donor = donor_doc();

        let root = graft(&mut target, &mut donor, skin).unwrap();

        assert_eq!(target.roots, vec![root]);
        assert_eq!(target.node(root).name, "Root");
        assert!(donor.roots.is_empty());

        let s = target.skin(skin);
        assert_eq!(s.skeleton_root, Some(root));
        assert_eq!(s.joint_count(), 5);
        assert_eq!(s.inverse_bind_matrices.len(), 5);

        let names: Vec<_> = s.joints.iter().map(|&j| target.node(j).name.as_str()).collect();
        assert_eq!(names, vec!["Root", "Spine", "Head", "Tail", "TailTip"]);
    }

    #[test]
    fn test_graft_empty_donor_fails() {
        let (mut target, skin) = target_with_skin();
        let mut donor = Document::new();
        assert!(matches!(
            graft(&mut target, &mut donor, skin),
            Err(RigError::MissingDonorRoot)
        ));
    }

    #[test]
    fn test_prune_removes_joint_matrix_and_descendants() {
        let (mut target, skin) = target_with_skin();
        let mut donor = donor_doc();
        graft(&mut target, &mut donor, skin).unwrap();

        prune_joints(&mut target, skin, &["Tail".to_string()]);

        let s = target.skin(skin);
        // Tail and TailTip both gone, arrays stay parallel.
        assert_eq!(s.joint_count(), 3);
        assert_eq!(s.inverse_bind_matrices.len(), 3);

        let index = JointIndex::build(&target, skin);
        assert!(!index.contains("Tail"));
        assert!(!index.contains("TailTip"));
        assert!(index.contains("Head"));

        // No pruned joint remains in the scene tree.
        let live: Vec<_> = target
            .traverse_pre_order()
            .into_iter()
            .map(|id| target.node(id).name.clone())
            .collect();
        assert!(!live.contains(&"Tail".to_string()));
        assert!(!live.contains(&"TailTip".to_string()));
    }

    #[test]
    fn test_prune_unknown_name_is_skipped() {
        let (mut target, skin) = target_with_skin();
        let mut donor = donor_doc();
        graft(&mut target, &mut donor, skin).unwrap();

        prune_joints(&mut target, skin, &["NoSuchJoint".to_string()]);
        assert_eq!(target.skin(skin).joint_count(), 5);
    }

    #[test]
    fn test_recompute_inverts_world_transforms() {
        let (mut target, skin) = target_with_skin();
        let mut donor = donor_doc();
        graft(&mut target, &mut donor, skin).unwrap();

        recompute_inverse_bind_matrices(&mut target, skin).unwrap();

        let joints = target.skin(skin).joints.clone();
        for (i, &joint) in joints.iter().enumerate() {
            let world = target.world_transform(joint);
            let product = target.skin(skin).inverse_bind_matrices[i] * world;
            let identity = Mat4::IDENTITY;
            for (a, b) in product
                .to_cols_array()
                .iter()
                .zip(identity.to_cols_array().iter())
            {
                assert!((a - b).abs() < 1e-5, "ibm * world != identity at joint {i}");
            }
        }
    }

    #[test]
    fn test_recompute_degenerate_scale_fails() {
        let (mut target, skin) = target_with_skin();
        let mut donor = donor_doc();
        let root = graft(&mut target, &mut donor, skin).unwrap();

        target.node_mut(root).scale = Vec3::new(0.0, 1.0, 1.0);

        let err = recompute_inverse_bind_matrices(&mut target, skin).unwrap_err();
        assert!(matches!(err, RigError::DegenerateTransform { .. }));
    }

    #[test]
    fn test_splice_twice_is_stable() {
        let (mut target, skin) = target_with_skin();
        let mut donor = donor_doc();
        let config = test_config(&["Tail"]);

        splice_skeleton(&mut target, &mut donor, skin, &config).unwrap();
        let joints_after_first = target.skin(skin).joint_count();

        // Re-running prune + recompute on the already-processed asset must
        // warn for the already-removed name and leave the rest intact.
        prune_joints(&mut target, skin, &config.prune_joints);
        recompute_inverse_bind_matrices(&mut target, skin).unwrap();

        let s = target.skin(skin);
        assert_eq!(s.joint_count(), joints_after_first);
        assert_eq!(s.inverse_bind_matrices.len(), joints_after_first);
    }
}
