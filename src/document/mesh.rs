//! Meshes and primitives.

use super::MaterialId;

#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub name: String,
    pub primitives: Vec<Primitive>,
}

impl Mesh {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primitives: Vec::new(),
        }
    }
}

/// One draw batch: per-vertex attribute buffers plus a shared material.
///
/// Joints and weights carry four influence slots per vertex to match the
/// on-disk layout, but rigid assignment only ever uses slot zero.
#[derive(Debug, Clone, Default)]
pub struct Primitive {
    pub positions: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    pub uvs: Option<Vec<[f32; 2]>>,
    pub joints: Option<Vec<[u16; 4]>>,
    pub weights: Option<Vec<[f32; 4]>>,
    pub indices: Option<Vec<u32>>,
    pub material: Option<MaterialId>,
}

impl Primitive {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }
}
