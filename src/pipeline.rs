//! Pipeline Driver
//!
//! Sequences the retargeting stages. Strictly sequential: joints must be
//! pruned before the inverse-bind recompute, meshes reparented and baked
//! before skin assignment, and every primitive collected before the atlas
//! layout exists.

use crate::atlas::{pack_atlas, TextureChannel};
use crate::anim_filter::filter_animations;
use crate::config::RigConfig;
use crate::document::{Document, Skin, SkinId};
use crate::error::RigError;
use crate::merge::{collect_primitives, merge_primitives};
use crate::rigid::assign_rigid_skins;
use crate::splice::splice_skeleton;

#[derive(Debug, Clone)]
pub struct RetargetOptions {
    /// Pack textures into atlases and merge all parts into one draw call.
    pub merge: bool,
    /// Atlas channel roles to composite when merging.
    pub channels: Vec<TextureChannel>,
}

impl Default for RetargetOptions {
    fn default() -> Self {
        Self {
            merge: true,
            channels: vec![TextureChannel::BaseColor, TextureChannel::Emissive],
        }
    }
}

/// Summary of what the pipeline did, for the final report.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetargetStats {
    pub joints: usize,
    pub animations: usize,
    pub skinned: usize,
    pub deleted: usize,
    pub merged_primitives: usize,
    pub atlas_grid: Option<u32>,
}

/// Run the full retargeting pipeline over `target`, consuming the donor
/// skeleton out of `donor`.
pub fn retarget(
    target: &mut Document,
    donor: &mut Document,
    config: &RigConfig,
    options: &RetargetOptions,
) -> Result<RetargetStats, RigError> {
    let skin = first_or_new_skin(target);
    let mut stats = RetargetStats::default();

    splice_skeleton(target, donor, skin, config)?;
    stats.joints = target.skin(skin).joint_count();

    filter_animations(target, &config.root_bone, config.translation_scale);
    stats.animations = target.animations.len();

    let rigid = assign_rigid_skins(target, skin, config);
    stats.skinned = rigid.skinned;
    stats.deleted = rigid.deleted;

    if options.merge {
        let primitives = collect_primitives(target);
        if primitives.is_empty() {
            tracing::warn!("no primitives to merge, skipping atlas pass");
        } else {
            let packed = pack_atlas(target, &primitives, &options.channels, config.cell_size);
            merge_primitives(target, &primitives, packed.material, Some(skin));
            stats.merged_primitives = primitives.len();
            stats.atlas_grid = Some(packed.layout.grid_side);
        }
    }

    tracing::info!(
        "retarget complete: {} joints, {} animations, {} rigid-skinned, {} deleted",
        stats.joints,
        stats.animations,
        stats.skinned,
        stats.deleted
    );
    Ok(stats)
}

/// The skin being retargeted: the document's first, or a fresh one for
/// assets that arrive with no skin at all.
fn first_or_new_skin(doc: &mut Document) -> SkinId {
    if doc.skins.is_empty() {
        doc.add_skin(Skin::new("body"))
    } else {
        SkinId(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Node;

    #[test]
    fn test_first_or_new_skin_creates_one() {
        let mut doc = Document::new();
        let skin = first_or_new_skin(&mut doc);
        assert_eq!(doc.skins.len(), 1);
        assert_eq!(skin, SkinId(0));
    }

    #[test]
    fn test_retarget_fails_without_donor() {
        let mut target = Document::new();
        let root = target.add_node(Node::new("Root"));
        target.add_root(root);
        let mut donor = Document::new();

        let config = RigConfig {
            root_bone: "Root".to_string(),
            translation_scale: 1.0,
            prune_joints: Vec::new(),
            node_joints: hashbrown::HashMap::new(),
            rest_pose: hashbrown::HashMap::new(),
            local_suffix: "_Local".to_string(),
            cell_size: 64,
        };
        let err = retarget(
            &mut target,
            &mut donor,
            &config,
            &RetargetOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RigError::MissingDonorRoot));
    }
}
