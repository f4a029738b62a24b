//! Skins: ordered joint lists with parallel inverse bind matrices.

use glam::Mat4;

use super::NodeId;

/// A skin is an ordered sequence of joint node references plus an
/// index-aligned array of inverse bind matrices.
///
/// Invariant: `joints.len() == inverse_bind_matrices.len()` after every
/// mutation; removing a joint removes its matrix and renumbers the rest.
#[derive(Debug, Clone, Default)]
pub struct Skin {
    pub name: String,
    pub skeleton_root: Option<NodeId>,
    pub joints: Vec<NodeId>,
    pub inverse_bind_matrices: Vec<Mat4>,
}

impl Skin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            skeleton_root: None,
            joints: Vec::new(),
            inverse_bind_matrices: Vec::new(),
        }
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }
}
