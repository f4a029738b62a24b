//! glTF/GLB -> Document import.

use anyhow::{Context, Result};
use glam::{Mat4, Quat, Vec3};
use image::RgbaImage;
use std::path::Path;

use crate::document::{
    Animation, Channel, Document, ImageData, Keyframes, Material, Mesh, MeshId, Node, NodeId,
    Primitive, Sampler, Skin, SkinId, TargetPath,
};

/// Import a glTF/GLB file into the arena document model.
///
/// Arena ids mirror glTF indices, so cross-references (node -> mesh, skin ->
/// joint, channel -> target) translate directly.
pub fn import_document(input: &Path) -> Result<Document> {
    let (gltf, buffers, images) =
        gltf::import(input).with_context(|| format!("Failed to load glTF: {:?}", input))?;

    let mut doc = Document::new();

    for (i, data) in images.iter().enumerate() {
        let name = format!("image{i}");
        doc.add_image(decode_image(data, name));
    }

    for material in gltf.materials() {
        doc.add_material(import_material(&material));
    }

    for mesh in gltf.meshes() {
        doc.add_mesh(import_mesh(&mesh, &buffers)?);
    }

    // Nodes first (ids = glTF indices), tree wiring second.
    for node in gltf.nodes() {
        let (translation, rotation, scale) = node.transform().decomposed();
        let mut n = Node::new(
            node.name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("node{}", node.index())),
        );
        n.translation = Vec3::from(translation);
        n.rotation = Quat::from_array(rotation);
        n.scale = Vec3::from(scale);
        n.mesh = node.mesh().map(|m| MeshId(m.index() as u32));
        n.skin = node.skin().map(|s| SkinId(s.index() as u32));
        doc.add_node(n);
    }
    for node in gltf.nodes() {
        let parent = NodeId(node.index() as u32);
        for child in node.children() {
            doc.add_child(parent, NodeId(child.index() as u32));
        }
    }
    if let Some(scene) = gltf.default_scene().or_else(|| gltf.scenes().next()) {
        for node in scene.nodes() {
            doc.add_root(NodeId(node.index() as u32));
        }
    }

    for skin in gltf.skins() {
        doc.add_skin(import_skin(&skin, &buffers));
    }

    for animation in gltf.animations() {
        let imported = import_animation(&animation, &buffers);
        if !imported.channels.is_empty() {
            doc.animations.push(imported);
        }
    }

    tracing::info!(
        "imported {:?}: {} nodes, {} meshes, {} skins, {} animations, {} images",
        input,
        doc.live_node_count(),
        doc.meshes.len(),
        doc.skins.len(),
        doc.animations.len(),
        doc.images.len()
    );
    Ok(doc)
}

fn decode_image(data: &gltf::image::Data, name: String) -> ImageData {
    use gltf::image::Format;

    let pixel_count = (data.width * data.height) as usize;
    let rgba: Option<Vec<u8>> = match data.format {
        Format::R8G8B8A8 => Some(data.pixels.clone()),
        Format::R8G8B8 => Some(
            data.pixels
                .chunks_exact(3)
                .flat_map(|p| [p[0], p[1], p[2], 255])
                .collect(),
        ),
        Format::R8 => Some(data.pixels.iter().flat_map(|&g| [g, g, g, 255]).collect()),
        Format::R8G8 => Some(
            data.pixels
                .chunks_exact(2)
                .flat_map(|p| [p[0], p[0], p[0], p[1]])
                .collect(),
        ),
        other => {
            tracing::warn!("unsupported image format {:?} for '{}', using white", other, name);
            None
        }
    };

    let pixels = rgba
        .filter(|p| p.len() == pixel_count * 4)
        .and_then(|p| RgbaImage::from_raw(data.width, data.height, p))
        .unwrap_or_else(|| RgbaImage::from_pixel(1, 1, image::Rgba([255, 255, 255, 255])));

    ImageData::new(name, pixels)
}

fn import_material(material: &gltf::Material) -> Material {
    let pbr = material.pbr_metallic_roughness();
    let mut m = Material::new(
        material
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("material{}", material.index().unwrap_or(0))),
    );
    m.base_color_factor = pbr.base_color_factor();
    m.metallic_factor = pbr.metallic_factor();
    m.roughness_factor = pbr.roughness_factor();
    m.emissive_factor = material.emissive_factor();
    m.base_color_texture = pbr
        .base_color_texture()
        .map(|info| crate::document::ImageId(info.texture().source().index() as u32));
    m.emissive_texture = material
        .emissive_texture()
        .map(|info| crate::document::ImageId(info.texture().source().index() as u32));
    m
}

fn import_mesh(mesh: &gltf::Mesh, buffers: &[gltf::buffer::Data]) -> Result<Mesh> {
    let mut out = Mesh::new(
        mesh.name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("mesh{}", mesh.index())),
    );

    for primitive in mesh.primitives() {
        let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));

        let positions: Vec<[f32; 3]> = reader
            .read_positions()
            .with_context(|| format!("mesh '{}' primitive has no positions", out.name))?
            .collect();

        out.primitives.push(Primitive {
            positions,
            normals: reader.read_normals().map(Iterator::collect),
            uvs: reader.read_tex_coords(0).map(|uv| uv.into_f32().collect()),
            joints: reader.read_joints(0).map(|j| j.into_u16().collect()),
            weights: reader.read_weights(0).map(|w| w.into_f32().collect()),
            indices: reader.read_indices().map(|i| i.into_u32().collect()),
            material: primitive
                .material()
                .index()
                .map(|i| crate::document::MaterialId(i as u32)),
        });
    }
    Ok(out)
}

fn import_skin(skin: &gltf::Skin, buffers: &[gltf::buffer::Data]) -> Skin {
    let mut out = Skin::new(
        skin.name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("skin{}", skin.index())),
    );
    out.skeleton_root = skin.skeleton().map(|n| NodeId(n.index() as u32));
    out.joints = skin.joints().map(|j| NodeId(j.index() as u32)).collect();

    let reader = skin.reader(|buffer| Some(&buffers[buffer.index()]));
    out.inverse_bind_matrices = match reader.read_inverse_bind_matrices() {
        Some(matrices) => matrices.map(|m| Mat4::from_cols_array_2d(&m)).collect(),
        None => vec![Mat4::IDENTITY; out.joints.len()],
    };

    // Keep the joint/matrix arrays parallel even on malformed input.
    if out.inverse_bind_matrices.len() != out.joints.len() {
        tracing::warn!(
            "skin '{}': {} joints but {} inverse bind matrices, padding with identity",
            out.name,
            out.joints.len(),
            out.inverse_bind_matrices.len()
        );
        out.inverse_bind_matrices.resize(out.joints.len(), Mat4::IDENTITY);
    }
    out
}

fn import_animation(animation: &gltf::Animation, buffers: &[gltf::buffer::Data]) -> Animation {
    use gltf::animation::util::ReadOutputs;

    let mut out = Animation::new(
        animation
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("animation{}", animation.index())),
    );

    for channel in animation.channels() {
        let target = NodeId(channel.target().node().index() as u32);
        let reader = channel.reader(|buffer| Some(&buffers[buffer.index()]));

        let Some(times) = reader.read_inputs().map(|t| t.collect::<Vec<f32>>()) else {
            continue;
        };
        let Some(outputs) = reader.read_outputs() else {
            continue;
        };

        let (path, values) = match outputs {
            ReadOutputs::Translations(v) => {
                (TargetPath::Translation, Keyframes::Vec3(v.collect()))
            }
            ReadOutputs::Rotations(v) => {
                (TargetPath::Rotation, Keyframes::Quat(v.into_f32().collect()))
            }
            ReadOutputs::Scales(v) => (TargetPath::Scale, Keyframes::Vec3(v.collect())),
            ReadOutputs::MorphTargetWeights(_) => {
                tracing::warn!(
                    "animation '{}': morph target channel not supported, skipping",
                    out.name
                );
                continue;
            }
        };

        // Cubic-spline outputs carry tangents (3 values per key); this tool
        // only transfers plain keys.
        if values.len() != times.len() {
            tracing::warn!(
                "animation '{}': {} keys for {} timestamps, skipping channel",
                out.name,
                values.len(),
                times.len()
            );
            continue;
        }

        out.channels.push(Channel {
            target,
            path,
            sampler: Sampler { times, values },
        });
    }
    out
}
