//! Animations, channels and samplers.

use super::NodeId;

/// What a channel animates. Decided once at load time and matched
/// exhaustively thereafter; morph-target weights are not modeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetPath {
    Translation,
    Rotation,
    Scale,
}

/// Keyframe values, typed by target path.
#[derive(Debug, Clone)]
pub enum Keyframes {
    /// Translation or scale keys.
    Vec3(Vec<[f32; 3]>),
    /// Rotation keys, quaternion [x, y, z, w].
    Quat(Vec<[f32; 4]>),
}

impl Keyframes {
    pub fn len(&self) -> usize {
        match self {
            Keyframes::Vec3(v) => v.len(),
            Keyframes::Quat(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ordered time -> value keyframe sequence, owned by its channel.
#[derive(Debug, Clone)]
pub struct Sampler {
    pub times: Vec<f32>,
    pub values: Keyframes,
}

#[derive(Debug, Clone)]
pub struct Channel {
    pub target: NodeId,
    pub path: TargetPath,
    pub sampler: Sampler,
}

#[derive(Debug, Clone, Default)]
pub struct Animation {
    pub name: String,
    pub channels: Vec<Channel>,
}

impl Animation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            channels: Vec::new(),
        }
    }

    /// Last keyframe time across all channels.
    pub fn duration(&self) -> f32 {
        self.channels
            .iter()
            .filter_map(|c| c.sampler.times.last().copied())
            .fold(0.0, f32::max)
    }
}
