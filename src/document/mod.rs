//! In-memory document model
//!
//! The scene is an arena: nodes, meshes, skins, animations, materials and
//! images live in flat vectors on [`Document`] and refer to each other by
//! stable integer ids. Parent and animation-target relations are id lookups,
//! never owning pointers, so the mutable back-referencing graph (parent and
//! child, skin and joint, channel and target) stays cycle-free by
//! construction. Releasing a node marks its subtree dead; ids stay valid.

mod animation;
mod material;
mod mesh;
mod scene;
mod skin;

pub use animation::{Animation, Channel, Keyframes, Sampler, TargetPath};
pub use material::{ImageData, Material};
pub use mesh::{Mesh, Primitive};
pub use scene::Node;
pub use skin::Skin;

/// Stable handle into the node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SkinId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageId(pub u32);

/// One complete scene document, mutated in place by each pipeline stage.
#[derive(Default)]
pub struct Document {
    pub(crate) nodes: Vec<Node>,
    /// Children of the scene root, in order.
    pub roots: Vec<NodeId>,
    pub meshes: Vec<Mesh>,
    pub skins: Vec<Skin>,
    pub animations: Vec<Animation>,
    pub materials: Vec<Material>,
    pub images: Vec<ImageData>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_mesh(&mut self, mesh: Mesh) -> MeshId {
        self.meshes.push(mesh);
        MeshId(self.meshes.len() as u32 - 1)
    }

    pub fn add_skin(&mut self, skin: Skin) -> SkinId {
        self.skins.push(skin);
        SkinId(self.skins.len() as u32 - 1)
    }

    pub fn add_material(&mut self, material: Material) -> MaterialId {
        self.materials.push(material);
        MaterialId(self.materials.len() as u32 - 1)
    }

    pub fn add_image(&mut self, image: ImageData) -> ImageId {
        self.images.push(image);
        ImageId(self.images.len() as u32 - 1)
    }

    pub fn mesh(&self, id: MeshId) -> &Mesh {
        &self.meshes[id.0 as usize]
    }

    pub fn mesh_mut(&mut self, id: MeshId) -> &mut Mesh {
        &mut self.meshes[id.0 as usize]
    }

    pub fn skin(&self, id: SkinId) -> &Skin {
        &self.skins[id.0 as usize]
    }

    pub fn skin_mut(&mut self, id: SkinId) -> &mut Skin {
        &mut self.skins[id.0 as usize]
    }

    pub fn material(&self, id: MaterialId) -> &Material {
        &self.materials[id.0 as usize]
    }

    pub fn image(&self, id: ImageId) -> &ImageData {
        &self.images[id.0 as usize]
    }
}
