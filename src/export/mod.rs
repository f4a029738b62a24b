//! Document -> GLB export.
//!
//! Serializes the live part of the arena document: nodes reachable from the
//! scene root, the meshes/materials/images they reference, every skin, and
//! every surviving animation channel. Dead arena entries are skipped and
//! indices renumbered on the way out.

mod buffer;

pub use buffer::{AccessorIndex, BinBuffer};

use anyhow::{Context, Result};
use glam::{Quat, Vec3};
use gltf_json as json;
use gltf_json::validation::Checked::Valid;
use hashbrown::HashMap;
use std::collections::BTreeMap;
use std::path::Path;

use crate::document::{Document, Keyframes, MeshId, TargetPath};

/// Export the document as a GLB file.
pub fn write_glb(doc: &Document, output: &Path) -> Result<()> {
    let glb = export_glb(doc)?;
    std::fs::write(output, &glb)
        .with_context(|| format!("Failed to write GLB: {:?}", output))?;
    tracing::info!("wrote {:?} ({} bytes)", output, glb.len());
    Ok(())
}

/// Export the document as in-memory GLB bytes.
pub fn export_glb(doc: &Document) -> Result<Vec<u8>> {
    let mut bin = BinBuffer::new();

    // Live scene nodes, renumbered densely.
    let exported_nodes = doc.traverse_pre_order();
    let node_map: HashMap<u32, u32> = exported_nodes
        .iter()
        .enumerate()
        .map(|(json_idx, id)| (id.0, json_idx as u32))
        .collect();

    // Meshes referenced by an exported node, first-seen order.
    let mut mesh_order: Vec<MeshId> = Vec::new();
    let mut mesh_map: HashMap<u32, u32> = HashMap::new();
    for &id in &exported_nodes {
        if let Some(mesh_id) = doc.node(id).mesh {
            if !mesh_map.contains_key(&mesh_id.0) {
                mesh_map.insert(mesh_id.0, mesh_order.len() as u32);
                mesh_order.push(mesh_id);
            }
        }
    }

    // Materials referenced by exported primitives.
    let mut material_order = Vec::new();
    let mut material_map: HashMap<u32, u32> = HashMap::new();
    for &mesh_id in &mesh_order {
        for primitive in &doc.mesh(mesh_id).primitives {
            if let Some(mat) = primitive.material {
                if !material_map.contains_key(&mat.0) {
                    material_map.insert(mat.0, material_order.len() as u32);
                    material_order.push(mat);
                }
            }
        }
    }

    // Images referenced by exported materials. One texture per image.
    let mut image_order = Vec::new();
    let mut image_map: HashMap<u32, u32> = HashMap::new();
    for &mat_id in &material_order {
        let material = doc.material(mat_id);
        for image in [material.base_color_texture, material.emissive_texture]
            .into_iter()
            .flatten()
        {
            if !image_map.contains_key(&image.0) {
                image_map.insert(image.0, image_order.len() as u32);
                image_order.push(image);
            }
        }
    }

    let meshes = export_meshes(doc, &mesh_order, &material_map, &mut bin);
    let (images, textures) = export_images(doc, &image_order, &mut bin)?;
    let materials = export_materials(doc, &material_order, &image_map);
    let skins = export_skins(doc, &node_map, &mut bin);
    let animations = export_animations(doc, &node_map, &mut bin);
    let nodes = export_nodes(doc, &exported_nodes, &node_map, &mesh_map);

    let scene = json::Scene {
        extensions: Default::default(),
        extras: Default::default(),
        name: Some("Scene".to_string()),
        nodes: doc
            .roots
            .iter()
            .filter_map(|r| node_map.get(&r.0))
            .map(|&i| json::Index::new(i))
            .collect(),
    };

    let root = json::Root {
        accessors: bin.accessors().to_vec(),
        animations,
        asset: json::Asset {
            copyright: None,
            extensions: Default::default(),
            extras: Default::default(),
            generator: Some("rig-splice".to_string()),
            min_version: None,
            version: "2.0".to_string(),
        },
        buffers: vec![json::Buffer {
            byte_length: (bin.data().len() as u64).into(),
            extensions: Default::default(),
            extras: Default::default(),
            name: None,
            uri: None,
        }],
        buffer_views: bin.views().to_vec(),
        cameras: Vec::new(),
        extensions: Default::default(),
        extensions_required: Vec::new(),
        extensions_used: Vec::new(),
        extras: Default::default(),
        images,
        materials,
        meshes,
        nodes,
        samplers: Vec::new(),
        scene: Some(json::Index::new(0)),
        scenes: vec![scene],
        skins,
        textures,
    };

    Ok(assemble_glb(&root, bin.data()))
}

fn export_nodes(
    doc: &Document,
    exported: &[crate::document::NodeId],
    node_map: &HashMap<u32, u32>,
    mesh_map: &HashMap<u32, u32>,
) -> Vec<json::Node> {
    exported
        .iter()
        .map(|&id| {
            let node = doc.node(id);
            let children: Vec<json::Index<json::Node>> = node
                .children()
                .iter()
                .filter_map(|c| node_map.get(&c.0))
                .map(|&i| json::Index::new(i))
                .collect();

            json::Node {
                camera: None,
                children: (!children.is_empty()).then_some(children),
                extensions: Default::default(),
                extras: Default::default(),
                matrix: None,
                mesh: node
                    .mesh
                    .and_then(|m| mesh_map.get(&m.0))
                    .map(|&i| json::Index::new(i)),
                name: Some(node.name.clone()),
                rotation: (node.rotation != Quat::IDENTITY)
                    .then(|| json::scene::UnitQuaternion(node.rotation.to_array())),
                scale: (node.scale != Vec3::ONE).then(|| node.scale.to_array()),
                skin: node.skin.map(|s| json::Index::new(s.0)),
                translation: (node.translation != Vec3::ZERO)
                    .then(|| node.translation.to_array()),
                weights: None,
            }
        })
        .collect()
}

fn export_meshes(
    doc: &Document,
    mesh_order: &[MeshId],
    material_map: &HashMap<u32, u32>,
    bin: &mut BinBuffer,
) -> Vec<json::Mesh> {
    mesh_order
        .iter()
        .map(|&mesh_id| {
            let mesh = doc.mesh(mesh_id);
            let primitives = mesh
                .primitives
                .iter()
                .map(|primitive| {
                    let mut attributes = BTreeMap::new();
                    attributes.insert(
                        Valid(json::mesh::Semantic::Positions),
                        bin.push_positions(&primitive.positions).as_json_index(),
                    );
                    if let Some(normals) = &primitive.normals {
                        attributes.insert(
                            Valid(json::mesh::Semantic::Normals),
                            bin.push_vec3(normals).as_json_index(),
                        );
                    }
                    if let Some(uvs) = &primitive.uvs {
                        attributes.insert(
                            Valid(json::mesh::Semantic::TexCoords(0)),
                            bin.push_vec2(uvs).as_json_index(),
                        );
                    }
                    if let Some(joints) = &primitive.joints {
                        attributes.insert(
                            Valid(json::mesh::Semantic::Joints(0)),
                            bin.push_joints_u16(joints).as_json_index(),
                        );
                    }
                    if let Some(weights) = &primitive.weights {
                        attributes.insert(
                            Valid(json::mesh::Semantic::Weights(0)),
                            bin.push_vec4(weights).as_json_index(),
                        );
                    }

                    json::mesh::Primitive {
                        attributes,
                        extensions: Default::default(),
                        extras: Default::default(),
                        indices: primitive
                            .indices
                            .as_ref()
                            .map(|i| bin.push_indices_u32(i).as_json_index()),
                        material: primitive
                            .material
                            .and_then(|m| material_map.get(&m.0))
                            .map(|&i| json::Index::new(i)),
                        mode: Valid(json::mesh::Mode::Triangles),
                        targets: None,
                    }
                })
                .collect();

            json::Mesh {
                extensions: Default::default(),
                extras: Default::default(),
                name: Some(mesh.name.clone()),
                primitives,
                weights: None,
            }
        })
        .collect()
}

fn export_images(
    doc: &Document,
    image_order: &[crate::document::ImageId],
    bin: &mut BinBuffer,
) -> Result<(Vec<json::Image>, Vec<json::Texture>)> {
    let mut images = Vec::with_capacity(image_order.len());
    let mut textures = Vec::with_capacity(image_order.len());

    for (i, &image_id) in image_order.iter().enumerate() {
        let image = doc.image(image_id);
        let mut png = Vec::new();
        image::DynamicImage::ImageRgba8(image.pixels.clone())
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .with_context(|| format!("Failed to encode image '{}' as PNG", image.name))?;
        let view = bin.push_blob(&png);

        images.push(json::Image {
            buffer_view: Some(json::Index::new(view)),
            mime_type: Some(json::image::MimeType("image/png".to_string())),
            name: Some(image.name.clone()),
            uri: None,
            extensions: Default::default(),
            extras: Default::default(),
        });
        textures.push(json::Texture {
            name: None,
            sampler: None,
            source: json::Index::new(i as u32),
            extensions: Default::default(),
            extras: Default::default(),
        });
    }
    Ok((images, textures))
}

fn export_materials(
    doc: &Document,
    material_order: &[crate::document::MaterialId],
    image_map: &HashMap<u32, u32>,
) -> Vec<json::Material> {
    let texture_info = |image: Option<crate::document::ImageId>| {
        image
            .and_then(|i| image_map.get(&i.0))
            .map(|&tex| json::texture::Info {
                index: json::Index::new(tex),
                tex_coord: 0,
                extensions: Default::default(),
                extras: Default::default(),
            })
    };

    material_order
        .iter()
        .map(|&mat_id| {
            let material = doc.material(mat_id);
            json::Material {
                alpha_cutoff: None,
                alpha_mode: Valid(json::material::AlphaMode::Opaque),
                double_sided: false,
                name: Some(material.name.clone()),
                pbr_metallic_roughness: json::material::PbrMetallicRoughness {
                    base_color_factor: json::material::PbrBaseColorFactor(
                        material.base_color_factor,
                    ),
                    base_color_texture: texture_info(material.base_color_texture),
                    metallic_factor: json::material::StrengthFactor(material.metallic_factor),
                    roughness_factor: json::material::StrengthFactor(material.roughness_factor),
                    metallic_roughness_texture: None,
                    extensions: Default::default(),
                    extras: Default::default(),
                },
                normal_texture: None,
                occlusion_texture: None,
                emissive_texture: texture_info(material.emissive_texture),
                emissive_factor: json::material::EmissiveFactor(material.emissive_factor),
                extensions: Default::default(),
                extras: Default::default(),
            }
        })
        .collect()
}

fn export_skins(
    doc: &Document,
    node_map: &HashMap<u32, u32>,
    bin: &mut BinBuffer,
) -> Vec<json::Skin> {
    doc.skins
        .iter()
        .map(|skin| {
            let matrices: Vec<[f32; 16]> = skin
                .inverse_bind_matrices
                .iter()
                .map(|m| m.to_cols_array())
                .collect();
            let ibm = (!matrices.is_empty()).then(|| bin.push_mat4(&matrices));

            json::Skin {
                extensions: Default::default(),
                extras: Default::default(),
                inverse_bind_matrices: ibm.map(|a| a.as_json_index()),
                joints: skin
                    .joints
                    .iter()
                    .filter_map(|j| node_map.get(&j.0))
                    .map(|&i| json::Index::new(i))
                    .collect(),
                name: Some(skin.name.clone()),
                skeleton: skin
                    .skeleton_root
                    .and_then(|r| node_map.get(&r.0))
                    .map(|&i| json::Index::new(i)),
            }
        })
        .collect()
}

fn export_animations(
    doc: &Document,
    node_map: &HashMap<u32, u32>,
    bin: &mut BinBuffer,
) -> Vec<json::Animation> {
    doc.animations
        .iter()
        .filter_map(|animation| {
            let mut samplers = Vec::new();
            let mut channels = Vec::new();

            for channel in &animation.channels {
                let Some(&target) = node_map.get(&channel.target.0) else {
                    tracing::warn!(
                        "animation '{}' targets a released node, dropping channel",
                        animation.name
                    );
                    continue;
                };

                let input = bin.push_times(&channel.sampler.times);
                let output = match &channel.sampler.values {
                    Keyframes::Vec3(keys) => bin.push_vec3(keys),
                    Keyframes::Quat(keys) => bin.push_vec4(keys),
                };

                samplers.push(json::animation::Sampler {
                    input: input.as_json_index(),
                    interpolation: Valid(json::animation::Interpolation::Linear),
                    output: output.as_json_index(),
                    extensions: Default::default(),
                    extras: Default::default(),
                });
                channels.push(json::animation::Channel {
                    sampler: json::Index::new(samplers.len() as u32 - 1),
                    target: json::animation::Target {
                        node: json::Index::new(target),
                        path: Valid(match channel.path {
                            TargetPath::Translation => json::animation::Property::Translation,
                            TargetPath::Rotation => json::animation::Property::Rotation,
                            TargetPath::Scale => json::animation::Property::Scale,
                        }),
                        extensions: Default::default(),
                        extras: Default::default(),
                    },
                    extensions: Default::default(),
                    extras: Default::default(),
                });
            }

            (!channels.is_empty()).then(|| json::Animation {
                channels,
                extensions: Default::default(),
                extras: Default::default(),
                name: Some(animation.name.clone()),
                samplers,
            })
        })
        .collect()
}

/// Assemble the GLB container: 12-byte header, JSON chunk, BIN chunk, both
/// 4-byte aligned.
fn assemble_glb(root: &json::Root, bin: &[u8]) -> Vec<u8> {
    let json_string = json::serialize::to_string(root).expect("glTF JSON serialization failed");
    let json_bytes = json_string.as_bytes();

    let json_padding = (4 - (json_bytes.len() % 4)) % 4;
    let json_chunk = json_bytes.len() + json_padding;
    let bin_padding = (4 - (bin.len() % 4)) % 4;
    let bin_chunk = bin.len() + bin_padding;
    let total = 12 + 8 + json_chunk + 8 + bin_chunk;

    let mut glb = Vec::with_capacity(total);
    glb.extend_from_slice(b"glTF");
    glb.extend_from_slice(&2u32.to_le_bytes());
    glb.extend_from_slice(&(total as u32).to_le_bytes());

    glb.extend_from_slice(&(json_chunk as u32).to_le_bytes());
    glb.extend_from_slice(&0x4E4F_534Au32.to_le_bytes()); // "JSON"
    glb.extend_from_slice(json_bytes);
    glb.extend(std::iter::repeat(0x20).take(json_padding));

    glb.extend_from_slice(&(bin_chunk as u32).to_le_bytes());
    glb.extend_from_slice(&0x004E_4942u32.to_le_bytes()); // "BIN\0"
    glb.extend_from_slice(bin);
    glb.extend(std::iter::repeat(0).take(bin_padding));

    glb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Mesh, Node, Primitive};

    fn simple_doc() -> Document {
        let mut doc = Document::new();
        let mut mesh = Mesh::new("tri");
        mesh.primitives.push(Primitive {
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.5, 1.0, 0.0]],
            indices: Some(vec![0, 1, 2]),
            ..Default::default()
        });
        let mesh_id = doc.add_mesh(mesh);
        let mut node = Node::new("tri");
        node.mesh = Some(mesh_id);
        let node_id = doc.add_node(node);
        doc.add_root(node_id);
        doc
    }

    #[test]
    fn test_glb_header_layout() {
        let doc = simple_doc();
        let glb = export_glb(&doc).unwrap();

        assert_eq!(&glb[0..4], b"glTF");
        assert_eq!(u32::from_le_bytes(glb[4..8].try_into().unwrap()), 2);
        assert_eq!(
            u32::from_le_bytes(glb[8..12].try_into().unwrap()) as usize,
            glb.len()
        );
    }

    #[test]
    fn test_exported_glb_reimports() {
        let doc = simple_doc();
        let glb = export_glb(&doc).unwrap();

        let (reimported, buffers, _images) = gltf::import_slice(&glb).unwrap();
        assert_eq!(reimported.meshes().count(), 1);
        assert_eq!(reimported.nodes().count(), 1);
        assert!(!buffers.is_empty());
    }

    #[test]
    fn test_dead_nodes_are_not_exported() {
        let mut doc = simple_doc();
        let extra = doc.add_node(Node::new("gone"));
        doc.add_root(extra);
        doc.release_subtree(extra);

        let glb = export_glb(&doc).unwrap();
        let (reimported, _, _) = gltf::import_slice(&glb).unwrap();
        assert_eq!(reimported.nodes().count(), 1);
    }
}
