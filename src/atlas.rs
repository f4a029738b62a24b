//! Atlas Packer
//!
//! Lays N primitives out on a square grid (side `ceil(sqrt(N))`), confines
//! each primitive's UV space to its own cell, and composites each
//! primitive's source textures into one shared atlas image per channel role.
//! Slot order is the stable first-seen collection order; the same slot index
//! drives both the UV remap and the texture composite, so it is never
//! re-sorted.

use image::{imageops, Rgba, RgbaImage};
use rayon::prelude::*;

use crate::document::{Document, ImageData, ImageId, Material, MaterialId, MeshId};

/// Which texture slot of a material feeds a given atlas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureChannel {
    BaseColor,
    Emissive,
}

impl TextureChannel {
    fn label(self) -> &'static str {
        match self {
            TextureChannel::BaseColor => "base_color",
            TextureChannel::Emissive => "emissive",
        }
    }
}

/// Square grid layout shared by every channel of one atlas set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtlasLayout {
    pub grid_side: u32,
    pub cell_size: u32,
}

impl AtlasLayout {
    pub fn new(primitive_count: usize, cell_size: u32) -> Self {
        let grid_side = (primitive_count as f64).sqrt().ceil() as u32;
        Self {
            grid_side: grid_side.max(1),
            cell_size,
        }
    }

    pub fn atlas_size(&self) -> u32 {
        self.grid_side * self.cell_size
    }

    /// (column, row) of a slot. Row-major, integer division.
    pub fn cell(&self, slot: usize) -> (u32, u32) {
        let slot = slot as u32;
        (slot % self.grid_side, slot / self.grid_side)
    }

    /// Pixel origin of a slot's cell rectangle.
    pub fn cell_origin(&self, slot: usize) -> (u32, u32) {
        let (col, row) = self.cell(slot);
        (col * self.cell_size, row * self.cell_size)
    }
}

/// Remap `[0,1]` UVs into the slot's grid cell:
/// `((u + col) / side, (v + row) / side)`.
pub fn remap_uvs(uvs: &mut [[f32; 2]], slot: usize, grid_side: u32) {
    let side = grid_side as f32;
    let col = (slot as u32 % grid_side) as f32;
    let row = (slot as u32 / grid_side) as f32;
    for uv in uvs {
        uv[0] = (uv[0] + col) / side;
        uv[1] = (uv[1] + row) / side;
    }
}

/// Result of packing: the shared layout, one atlas image per requested
/// channel, and the single material every packed primitive now references.
#[derive(Debug)]
pub struct PackedAtlas {
    pub layout: AtlasLayout,
    pub images: Vec<(TextureChannel, ImageId)>,
    pub material: MaterialId,
}

/// Pack the given primitives' UVs and textures into shared atlases and point
/// every primitive at one new material.
///
/// `primitives` is (mesh, primitive index) in stable collection order.
pub fn pack_atlas(
    doc: &mut Document,
    primitives: &[(MeshId, usize)],
    channels: &[TextureChannel],
    cell_size: u32,
) -> PackedAtlas {
    let layout = AtlasLayout::new(primitives.len(), cell_size);
    tracing::info!(
        "atlas layout: {} primitives on a {}x{} grid, {}px atlas",
        primitives.len(),
        layout.grid_side,
        layout.grid_side,
        layout.atlas_size()
    );

    // UV remap pass. Slot index == collection order.
    for (slot, &(mesh_id, prim_idx)) in primitives.iter().enumerate() {
        let primitive = &mut doc.mesh_mut(mesh_id).primitives[prim_idx];
        if let Some(uvs) = &mut primitive.uvs {
            remap_uvs(uvs, slot, layout.grid_side);
        }
    }

    // Composite pass, one atlas per channel, all sharing the layout.
    let mut atlas_images = Vec::with_capacity(channels.len());
    for &channel in channels {
        let image_id = composite_channel(doc, primitives, channel, layout);
        atlas_images.push((channel, image_id));
    }

    // One material for every packed primitive.
    let mut material = Material::new("atlas");
    for &(channel, image_id) in &atlas_images {
        match channel {
            TextureChannel::BaseColor => material.base_color_texture = Some(image_id),
            TextureChannel::Emissive => {
                material.emissive_texture = Some(image_id);
                material.emissive_factor = [1.0, 1.0, 1.0];
            }
        }
    }
    let material = doc.add_material(material);
    for &(mesh_id, prim_idx) in primitives {
        doc.mesh_mut(mesh_id).primitives[prim_idx].material = Some(material);
    }

    PackedAtlas {
        layout,
        images: atlas_images,
        material,
    }
}

/// Composite one channel: resize each slot's source texture into its cell,
/// neutral-fill slots without one. Cell preparation is per-slot independent
/// and runs in parallel; blits are serial.
fn composite_channel(
    doc: &mut Document,
    primitives: &[(MeshId, usize)],
    channel: TextureChannel,
    layout: AtlasLayout,
) -> ImageId {
    let cell = layout.cell_size;
    let snapshot: &Document = doc;

    let cells: Vec<RgbaImage> = primitives
        .par_iter()
        .enumerate()
        .map(|(slot, &(mesh_id, prim_idx))| {
            let primitive = &snapshot.mesh(mesh_id).primitives[prim_idx];
            let material = primitive.material.map(|m| snapshot.material(m));
            match material.and_then(|m| channel_texture(m, channel)) {
                Some(image_id) => {
                    let source = &snapshot.image(image_id).pixels;
                    imageops::resize(source, cell, cell, imageops::FilterType::Triangle)
                }
                None => {
                    tracing::warn!(
                        "primitive in slot {} has no {} texture, using neutral fill",
                        slot,
                        channel.label()
                    );
                    RgbaImage::from_pixel(cell, cell, neutral_fill(material, channel))
                }
            }
        })
        .collect();

    let mut atlas = RgbaImage::new(layout.atlas_size(), layout.atlas_size());
    for (slot, cell_image) in cells.iter().enumerate() {
        let (x, y) = layout.cell_origin(slot);
        imageops::replace(&mut atlas, cell_image, x as i64, y as i64);
    }

    doc.add_image(ImageData::new(format!("atlas_{}", channel.label()), atlas))
}

fn channel_texture(material: &Material, channel: TextureChannel) -> Option<ImageId> {
    match channel {
        TextureChannel::BaseColor => material.base_color_texture,
        TextureChannel::Emissive => material.emissive_texture,
    }
}

/// Fill color for a slot without a source texture: the material's flat
/// factor color for that channel, so untextured parts keep their look.
fn neutral_fill(material: Option<&Material>, channel: TextureChannel) -> Rgba<u8> {
    let to_u8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    match (material, channel) {
        (Some(m), TextureChannel::BaseColor) => Rgba([
            to_u8(m.base_color_factor[0]),
            to_u8(m.base_color_factor[1]),
            to_u8(m.base_color_factor[2]),
            to_u8(m.base_color_factor[3]),
        ]),
        (Some(m), TextureChannel::Emissive) => Rgba([
            to_u8(m.emissive_factor[0]),
            to_u8(m.emissive_factor[1]),
            to_u8(m.emissive_factor[2]),
            255,
        ]),
        (None, TextureChannel::BaseColor) => Rgba([255, 255, 255, 255]),
        (None, TextureChannel::Emissive) => Rgba([0, 0, 0, 255]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Mesh, Primitive};

    #[test]
    fn test_layout_grid_side() {
        assert_eq!(AtlasLayout::new(1, 64).grid_side, 1);
        assert_eq!(AtlasLayout::new(4, 64).grid_side, 2);
        assert_eq!(AtlasLayout::new(5, 64).grid_side, 3);
        assert_eq!(AtlasLayout::new(9, 64).grid_side, 3);
        assert_eq!(AtlasLayout::new(10, 64).grid_side, 4);
    }

    #[test]
    fn test_layout_cells() {
        let layout = AtlasLayout::new(5, 64);
        assert_eq!(layout.cell(0), (0, 0));
        assert_eq!(layout.cell(3), (0, 1)); // col 0, row 1
        assert_eq!(layout.cell_origin(3), (0, 64));
        assert_eq!(layout.atlas_size(), 192);
    }

    #[test]
    fn test_remap_uv_into_slot_cell() {
        let mut uvs = vec![[0.5, 0.5]];
        remap_uvs(&mut uvs, 3, 3);
        assert!((uvs[0][0] - 0.5 / 3.0).abs() < 1e-5);
        assert!((uvs[0][1] - 1.5 / 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_remap_uv_corners_stay_inside_cell() {
        let mut uvs = vec![[0.0, 0.0], [1.0, 1.0]];
        remap_uvs(&mut uvs, 4, 3); // col 1, row 1
        assert_eq!(uvs[0], [1.0 / 3.0, 1.0 / 3.0]);
        assert_eq!(uvs[1], [2.0 / 3.0, 2.0 / 3.0]);
    }

    fn doc_with_prims(count: usize) -> (Document, Vec<(MeshId, usize)>) {
        let mut doc = Document::new();
        let mut prims = Vec::new();
        for i in 0..count {
            let mut mesh = Mesh::new(format!("part{i}"));
            mesh.primitives.push(Primitive {
                positions: vec![[0.0; 3]; 3],
                uvs: Some(vec![[0.5, 0.5]; 3]),
                ..Default::default()
            });
            let id = doc.add_mesh(mesh);
            prims.push((id, 0));
        }
        (doc, prims)
    }

    #[test]
    fn test_pack_atlas_composites_textured_and_untextured() {
        let (mut doc, prims) = doc_with_prims(2);

        // First primitive: solid red 2x2 base color texture.
        let red = RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255]));
        let red_id = doc.add_image(ImageData::new("red", red));
        let mut material = Material::new("red");
        material.base_color_texture = Some(red_id);
        let red_material = doc.add_material(material);
        doc.mesh_mut(prims[0].0).primitives[0].material = Some(red_material);

        // Second primitive: no texture, green factor.
        let mut material = Material::new("green");
        material.base_color_factor = [0.0, 1.0, 0.0, 1.0];
        let green_material = doc.add_material(material);
        doc.mesh_mut(prims[1].0).primitives[0].material = Some(green_material);

        let packed = pack_atlas(&mut doc, &prims, &[TextureChannel::BaseColor], 4);

        assert_eq!(packed.layout.grid_side, 2);
        assert_eq!(packed.images.len(), 1);
        let atlas = &doc.image(packed.images[0].1).pixels;
        assert_eq!(atlas.width(), 8);
        // Slot 0 cell is red, slot 1 cell is the green neutral fill.
        assert_eq!(atlas.get_pixel(1, 1), &Rgba([255, 0, 0, 255]));
        assert_eq!(atlas.get_pixel(5, 1), &Rgba([0, 255, 0, 255]));

        // Both primitives now share the atlas material.
        assert_eq!(doc.mesh(prims[0].0).primitives[0].material, Some(packed.material));
        assert_eq!(doc.mesh(prims[1].0).primitives[0].material, Some(packed.material));

        // UVs were confined to each slot's cell.
        let uv0 = doc.mesh(prims[0].0).primitives[0].uvs.as_ref().unwrap()[0];
        let uv1 = doc.mesh(prims[1].0).primitives[0].uvs.as_ref().unwrap()[0];
        assert_eq!(uv0, [0.25, 0.25]);
        assert_eq!(uv1, [0.75, 0.25]);
    }

    #[test]
    fn test_channels_share_slot_assignment() {
        let (mut doc, prims) = doc_with_prims(3);
        let packed = pack_atlas(
            &mut doc,
            &prims,
            &[TextureChannel::BaseColor, TextureChannel::Emissive],
            4,
        );
        assert_eq!(packed.images.len(), 2);
        let base = &doc.image(packed.images[0].1).pixels;
        let emissive = &doc.image(packed.images[1].1).pixels;
        assert_eq!(base.dimensions(), emissive.dimensions());
    }
}
