//! Rig configuration (TOML)
//!
//! Static, externally loaded description of how a source asset maps onto the
//! donor skeleton: which joints to deny-list, which mesh-ancestor node names
//! bind to which joints, the canonical rest pose written onto the donor rig
//! before the inverse-bind recompute, and the unit-scale factor applied to
//! root translation animation.

use anyhow::{bail, Context, Result};
use hashbrown::HashMap;
use serde::Deserialize;
use std::path::Path;

fn default_local_suffix() -> String {
    "_Local".to_string()
}

fn default_cell_size() -> u32 {
    64
}

/// Canonical rest-pose transform for one joint (T-pose).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RestPose {
    pub translation: [f32; 3],
    /// Quaternion [x, y, z, w]
    pub rotation: [f32; 4],
}

#[derive(Debug, Clone, Deserialize)]
pub struct RigConfig {
    /// Name of the root node whose translation animation is kept (rescaled).
    pub root_bone: String,

    /// Uniform factor applied to the root bone's translation keyframes.
    pub translation_scale: f32,

    /// Joints removed from the donor skeleton after grafting.
    #[serde(default)]
    pub prune_joints: Vec<String>,

    /// Mesh-ancestor node name -> joint name, for rigid skin assignment.
    #[serde(default)]
    pub node_joints: HashMap<String, String>,

    /// Joint name -> canonical T-pose transform.
    #[serde(default)]
    pub rest_pose: HashMap<String, RestPose>,

    /// Meshless nodes with this name suffix are deleted outright.
    #[serde(default = "default_local_suffix")]
    pub local_suffix: String,

    /// Pixel size of one atlas grid cell.
    #[serde(default = "default_cell_size")]
    pub cell_size: u32,
}

impl RigConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read rig config: {:?}", path))?;
        let config: RigConfig = toml::from_str(&text)
            .with_context(|| format!("Failed to parse rig config: {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.root_bone.is_empty() {
            bail!("rig config: root_bone must not be empty");
        }
        if self.translation_scale <= 0.0 || !self.translation_scale.is_finite() {
            bail!(
                "rig config: translation_scale must be a positive number, got {}",
                self.translation_scale
            );
        }
        if self.cell_size == 0 {
            bail!("rig config: cell_size must be non-zero");
        }
        for (node, joint) in &self.node_joints {
            if joint.is_empty() {
                bail!("rig config: node_joints entry '{}' maps to an empty joint name", node);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config: RigConfig = toml::from_str(
            r#"
            root_bone = "Global"
            translation_scale = 0.0352
            "#,
        )
        .unwrap();

        assert_eq!(config.root_bone, "Global");
        assert!(config.prune_joints.is_empty());
        assert_eq!(config.local_suffix, "_Local");
        assert_eq!(config.cell_size, 64);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_full_config() {
        let config: RigConfig = toml::from_str(
            r#"
            root_bone = "Global"
            translation_scale = 0.0352
            prune_joints = ["Tail1", "Tail2"]
            local_suffix = "_loc"
            cell_size = 128

            [node_joints]
            "Hair" = "Head"
            "Skirt" = "Hips"

            [rest_pose.Head]
            translation = [0.0, 1.6, 0.0]
            rotation = [0.0, 0.0, 0.0, 1.0]
            "#,
        )
        .unwrap();

        assert_eq!(config.prune_joints.len(), 2);
        assert_eq!(config.node_joints["Hair"], "Head");
        assert_eq!(config.rest_pose["Head"].translation[1], 1.6);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_scale() {
        let config: RigConfig = toml::from_str(
            r#"
            root_bone = "Global"
            translation_scale = 0.0
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }
}
