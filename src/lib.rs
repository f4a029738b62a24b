//! rig-splice library
//!
//! Retargets modular character meshes onto a shared animation skeleton:
//! splices a donor skeleton into the character, filters animation channels,
//! rigid-skins loose parts to their nearest mapped joint, and packs all part
//! textures into one atlas behind a single merged draw call.

pub mod anim_filter;
pub mod atlas;
pub mod config;
pub mod document;
pub mod error;
pub mod export;
pub mod import;
pub mod joints;
pub mod merge;
pub mod pipeline;
pub mod rigid;
pub mod splice;

// Re-export the tool-facing surface for use as a library.
pub use config::{RestPose, RigConfig};
pub use document::Document;
pub use error::RigError;
pub use export::{export_glb, write_glb};
pub use import::import_document;
pub use joints::JointIndex;
pub use pipeline::{retarget, RetargetOptions, RetargetStats};
