//! Animation Filter
//!
//! The donor skeleton supplies its own bind-time translation and scale, so
//! only rotation animation transfers. The one exception is the designated
//! root node: its translation carries the character through the world and is
//! kept, rescaled to the new asset's unit scale; its scale channels are
//! dropped outright.

use crate::document::{Document, Keyframes, TargetPath};

/// Filter every animation in the document in place.
///
/// Channels own their samplers, so dropping a channel drops its keyframes
/// with it; animations left with zero channels are removed.
pub fn filter_animations(doc: &mut Document, root_name: &str, translation_scale: f32) {
    if doc.find_node(root_name).is_none() {
        // Reachable on rigs without the designated root: every channel then
        // degrades to the rotation-only rule.
        tracing::warn!(
            "no node named '{}' in scene; all animation falls back to rotation-only",
            root_name
        );
    }

    // Channel targets are ids; resolve the root test once per node.
    let is_root: Vec<bool> = doc
        .nodes
        .iter()
        .map(|n| n.alive && n.name == root_name)
        .collect();

    let mut kept = 0usize;
    let mut dropped = 0usize;

    for animation in &mut doc.animations {
        animation.channels.retain_mut(|channel| {
            let retain = if is_root[channel.target.0 as usize] {
                match channel.path {
                    TargetPath::Scale => false,
                    TargetPath::Translation => {
                        if let Keyframes::Vec3(keys) = &mut channel.sampler.values {
                            for key in keys {
                                key[0] *= translation_scale;
                                key[1] *= translation_scale;
                                key[2] *= translation_scale;
                            }
                        }
                        true
                    }
                    TargetPath::Rotation => true,
                }
            } else {
                channel.path == TargetPath::Rotation
            };

            if retain {
                kept += 1;
            } else {
                dropped += 1;
            }
            retain
        });
    }

    let before = doc.animations.len();
    doc.animations.retain(|a| !a.channels.is_empty());
    let released = before - doc.animations.len();

    tracing::info!(
        "animation filter: kept {} channels, dropped {}, released {} empty animations",
        kept,
        dropped,
        released
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Animation, Channel, Node, NodeId, Sampler};

    fn vec3_channel(target: NodeId, path: TargetPath, keys: Vec<[f32; 3]>) -> Channel {
        let times = (0..keys.len()).map(|i| i as f32).collect();
        Channel {
            target,
            path,
            sampler: Sampler {
                times,
                values: Keyframes::Vec3(keys),
            },
        }
    }

    fn rotation_channel(target: NodeId) -> Channel {
        Channel {
            target,
            path: TargetPath::Rotation,
            sampler: Sampler {
                times: vec![0.0, 1.0],
                values: Keyframes::Quat(vec![[0.0, 0.0, 0.0, 1.0]; 2]),
            },
        }
    }

    fn doc_with_nodes() -> (Document, NodeId, NodeId) {
        let mut doc = Document::new();
        let root = doc.add_node(Node::new("Global"));
        let arm = doc.add_node(Node::new("Arm"));
        doc.add_root(root);
        doc.add_child(root, arm);
        (doc, root, arm)
    }

    #[test]
    fn test_root_translation_rescaled_scale_dropped() {
        let (mut doc, root, _arm) = doc_with_nodes();
        let mut anim = Animation::new("walk");
        anim.channels.push(vec3_channel(
            root,
            TargetPath::Translation,
            vec![[10.0, 0.0, 0.0]],
        ));
        anim.channels
            .push(vec3_channel(root, TargetPath::Scale, vec![[1.0, 1.0, 1.0]]));
        anim.channels.push(rotation_channel(root));
        doc.animations.push(anim);

        filter_animations(&mut doc, "Global", 0.0352);

        let anim = &doc.animations[0];
        assert_eq!(anim.channels.len(), 2);
        assert!(anim.channels.iter().all(|c| c.path != TargetPath::Scale));

        let translation = anim
            .channels
            .iter()
            .find(|c| c.path == TargetPath::Translation)
            .unwrap();
        let Keyframes::Vec3(keys) = &translation.sampler.values else {
            panic!("translation keys must be vec3");
        };
        assert!((keys[0][0] - 0.352).abs() < 1e-6);
        assert_eq!(keys[0][1], 0.0);
    }

    #[test]
    fn test_non_root_keeps_only_rotation() {
        let (mut doc, _root, arm) = doc_with_nodes();
        let mut anim = Animation::new("wave");
        anim.channels.push(vec3_channel(
            arm,
            TargetPath::Translation,
            vec![[1.0, 2.0, 3.0]],
        ));
        anim.channels
            .push(vec3_channel(arm, TargetPath::Scale, vec![[2.0, 2.0, 2.0]]));
        anim.channels.push(rotation_channel(arm));
        doc.animations.push(anim);

        filter_animations(&mut doc, "Global", 0.0352);

        let anim = &doc.animations[0];
        assert_eq!(anim.channels.len(), 1);
        assert_eq!(anim.channels[0].path, TargetPath::Rotation);
    }

    #[test]
    fn test_empty_animation_released() {
        let (mut doc, _root, arm) = doc_with_nodes();
        let mut anim = Animation::new("slide");
        anim.channels.push(vec3_channel(
            arm,
            TargetPath::Translation,
            vec![[1.0, 0.0, 0.0]],
        ));
        doc.animations.push(anim);

        filter_animations(&mut doc, "Global", 1.0);
        assert!(doc.animations.is_empty());
    }

    #[test]
    fn test_missing_root_degrades_to_rotation_only() {
        let (mut doc, root, _arm) = doc_with_nodes();
        let mut anim = Animation::new("walk");
        anim.channels.push(vec3_channel(
            root,
            TargetPath::Translation,
            vec![[10.0, 0.0, 0.0]],
        ));
        anim.channels.push(rotation_channel(root));
        doc.animations.push(anim);

        // No node is named "Hips", so the root special case never triggers.
        filter_animations(&mut doc, "Hips", 0.0352);

        let anim = &doc.animations[0];
        assert_eq!(anim.channels.len(), 1);
        assert_eq!(anim.channels[0].path, TargetPath::Rotation);
    }
}
