//! Bin-chunk packing for GLB export: buffer views and accessors with 4-byte
//! alignment.

use gltf_json as json;
use gltf_json::validation::Checked::Valid;

/// Accessor index inside the exported document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessorIndex(pub u32);

impl AccessorIndex {
    pub fn as_json_index(&self) -> json::Index<json::Accessor> {
        json::Index::new(self.0)
    }
}

/// Accumulates the single binary buffer of a GLB along with its views and
/// accessors.
#[derive(Default)]
pub struct BinBuffer {
    data: Vec<u8>,
    views: Vec<json::buffer::View>,
    accessors: Vec<json::Accessor>,
}

impl BinBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn views(&self) -> &[json::buffer::View] {
        &self.views
    }

    pub fn accessors(&self) -> &[json::Accessor] {
        &self.accessors
    }

    fn align(&mut self) {
        while self.data.len() % 4 != 0 {
            self.data.push(0);
        }
    }

    fn push_view(
        &mut self,
        offset: usize,
        byte_length: usize,
        target: Option<json::buffer::Target>,
    ) -> u32 {
        self.views.push(json::buffer::View {
            buffer: json::Index::new(0),
            byte_length: (byte_length as u64).into(),
            byte_offset: Some((offset as u64).into()),
            byte_stride: None,
            extensions: Default::default(),
            extras: Default::default(),
            name: None,
            target: target.map(Valid),
        });
        self.views.len() as u32 - 1
    }

    #[allow(clippy::too_many_arguments)]
    fn push_accessor(
        &mut self,
        view: u32,
        count: usize,
        component_type: json::accessor::ComponentType,
        type_: json::accessor::Type,
        min: Option<json::Value>,
        max: Option<json::Value>,
    ) -> AccessorIndex {
        let index = self.accessors.len() as u32;
        self.accessors.push(json::Accessor {
            buffer_view: Some(json::Index::new(view)),
            byte_offset: Some(0u64.into()),
            count: count.into(),
            component_type: Valid(json::accessor::GenericComponentType(component_type)),
            extensions: Default::default(),
            extras: Default::default(),
            type_: Valid(type_),
            min,
            max,
            name: None,
            normalized: false,
            sparse: None,
        });
        AccessorIndex(index)
    }

    /// Positions carry min/max bounds per the glTF spec.
    pub fn push_positions(&mut self, positions: &[[f32; 3]]) -> AccessorIndex {
        let offset = self.data.len();
        for p in positions {
            self.data.extend_from_slice(bytemuck::cast_slice(p));
        }
        let view = self.push_view(
            offset,
            positions.len() * 12,
            Some(json::buffer::Target::ArrayBuffer),
        );

        let (min, max) = bounds(positions);
        let accessor = self.push_accessor(
            view,
            positions.len(),
            json::accessor::ComponentType::F32,
            json::accessor::Type::Vec3,
            Some(json::Value::Array(
                min.into_iter().map(json::Value::from).collect(),
            )),
            Some(json::Value::Array(
                max.into_iter().map(json::Value::from).collect(),
            )),
        );
        self.align();
        accessor
    }

    pub fn push_vec3(&mut self, data: &[[f32; 3]]) -> AccessorIndex {
        let offset = self.data.len();
        for v in data {
            self.data.extend_from_slice(bytemuck::cast_slice(v));
        }
        let view = self.push_view(offset, data.len() * 12, Some(json::buffer::Target::ArrayBuffer));
        let accessor = self.push_accessor(
            view,
            data.len(),
            json::accessor::ComponentType::F32,
            json::accessor::Type::Vec3,
            None,
            None,
        );
        self.align();
        accessor
    }

    pub fn push_vec2(&mut self, data: &[[f32; 2]]) -> AccessorIndex {
        let offset = self.data.len();
        for v in data {
            self.data.extend_from_slice(bytemuck::cast_slice(v));
        }
        let view = self.push_view(offset, data.len() * 8, Some(json::buffer::Target::ArrayBuffer));
        let accessor = self.push_accessor(
            view,
            data.len(),
            json::accessor::ComponentType::F32,
            json::accessor::Type::Vec2,
            None,
            None,
        );
        self.align();
        accessor
    }

    pub fn push_vec4(&mut self, data: &[[f32; 4]]) -> AccessorIndex {
        let offset = self.data.len();
        for v in data {
            self.data.extend_from_slice(bytemuck::cast_slice(v));
        }
        let view = self.push_view(offset, data.len() * 16, Some(json::buffer::Target::ArrayBuffer));
        let accessor = self.push_accessor(
            view,
            data.len(),
            json::accessor::ComponentType::F32,
            json::accessor::Type::Vec4,
            None,
            None,
        );
        self.align();
        accessor
    }

    pub fn push_joints_u16(&mut self, joints: &[[u16; 4]]) -> AccessorIndex {
        let offset = self.data.len();
        for j in joints {
            for c in j {
                self.data.extend_from_slice(&c.to_le_bytes());
            }
        }
        let view = self.push_view(offset, joints.len() * 8, Some(json::buffer::Target::ArrayBuffer));
        let accessor = self.push_accessor(
            view,
            joints.len(),
            json::accessor::ComponentType::U16,
            json::accessor::Type::Vec4,
            None,
            None,
        );
        self.align();
        accessor
    }

    pub fn push_indices_u32(&mut self, indices: &[u32]) -> AccessorIndex {
        let offset = self.data.len();
        for i in indices {
            self.data.extend_from_slice(&i.to_le_bytes());
        }
        let view = self.push_view(
            offset,
            indices.len() * 4,
            Some(json::buffer::Target::ElementArrayBuffer),
        );
        let accessor = self.push_accessor(
            view,
            indices.len(),
            json::accessor::ComponentType::U32,
            json::accessor::Type::Scalar,
            None,
            None,
        );
        self.align();
        accessor
    }

    pub fn push_mat4(&mut self, matrices: &[[f32; 16]]) -> AccessorIndex {
        let offset = self.data.len();
        for m in matrices {
            self.data.extend_from_slice(bytemuck::cast_slice(m));
        }
        let view = self.push_view(offset, matrices.len() * 64, None);
        let accessor = self.push_accessor(
            view,
            matrices.len(),
            json::accessor::ComponentType::F32,
            json::accessor::Type::Mat4,
            None,
            None,
        );
        self.align();
        accessor
    }

    /// Keyframe times carry min/max bounds.
    pub fn push_times(&mut self, times: &[f32]) -> AccessorIndex {
        let offset = self.data.len();
        self.data.extend_from_slice(bytemuck::cast_slice(times));
        let view = self.push_view(offset, times.len() * 4, None);

        let min = times.iter().copied().fold(f32::INFINITY, f32::min) as f64;
        let max = times.iter().copied().fold(f32::NEG_INFINITY, f32::max) as f64;
        let accessor = self.push_accessor(
            view,
            times.len(),
            json::accessor::ComponentType::F32,
            json::accessor::Type::Scalar,
            Some(json::Value::Array(vec![json::Value::from(min)])),
            Some(json::Value::Array(vec![json::Value::from(max)])),
        );
        self.align();
        accessor
    }

    /// Raw byte blob (e.g. an embedded PNG); returns the view index, no
    /// accessor.
    pub fn push_blob(&mut self, bytes: &[u8]) -> u32 {
        let offset = self.data.len();
        self.data.extend_from_slice(bytes);
        let view = self.push_view(offset, bytes.len(), None);
        self.align();
        view
    }
}

fn bounds(positions: &[[f32; 3]]) -> (Vec<f32>, Vec<f32>) {
    let mut min = [f32::MAX; 3];
    let mut max = [f32::MIN; 3];
    for p in positions {
        for i in 0..3 {
            min[i] = min[i].min(p[i]);
            max[i] = max[i].max(p[i]);
        }
    }
    (min.to_vec(), max.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions_accessor_and_alignment() {
        let mut buffer = BinBuffer::new();
        let idx = buffer.push_positions(&[[0.0, 0.0, 0.0], [1.0, 2.0, 3.0]]);
        assert_eq!(idx, AccessorIndex(0));
        assert_eq!(buffer.views().len(), 1);
        assert_eq!(buffer.data().len(), 24);
    }

    #[test]
    fn test_joints_u16_layout() {
        let mut buffer = BinBuffer::new();
        buffer.push_joints_u16(&[[3, 0, 0, 0]]);
        assert_eq!(buffer.data().len(), 8);
        assert_eq!(&buffer.data()[0..2], &3u16.to_le_bytes());
    }

    #[test]
    fn test_blob_is_aligned() {
        let mut buffer = BinBuffer::new();
        let view = buffer.push_blob(&[1, 2, 3]);
        assert_eq!(view, 0);
        assert_eq!(buffer.data().len(), 4);
        assert!(buffer.accessors().is_empty());
    }
}
