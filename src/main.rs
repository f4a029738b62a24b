//! rig-splice - character retargeting tool
//!
//! Splices a donor skeleton into a modular character asset, filters its
//! animation channels, rigid-skins loose parts, and packs textures into a
//! single atlas. Reads and writes glTF/GLB.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use rig_splice::atlas::TextureChannel;
use rig_splice::{import_document, retarget, write_glb, RetargetOptions, RigConfig};

#[derive(Parser)]
#[command(name = "rig-splice")]
#[command(about = "Character skeleton retargeting tool")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Retarget a character onto a donor skeleton
    Retarget {
        /// Input character glTF/GLB file
        input: PathBuf,

        /// Donor skeleton glTF/GLB file
        donor: PathBuf,

        /// Path to rig.toml config
        #[arg(short, long, default_value = "rig.toml")]
        config: PathBuf,

        /// Output GLB file (default: <input>.retargeted.glb)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip atlas packing and primitive merging
        #[arg(long)]
        no_merge: bool,

        /// Atlas cell size in pixels (overrides config)
        #[arg(long)]
        cell_size: Option<u32>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print skeleton, animation, and material contents of a file
    Inspect {
        /// Input glTF/GLB file
        input: PathBuf,
    },

    /// Validate a rig config without retargeting
    Check {
        /// Path to rig.toml config
        #[arg(default_value = "rig.toml")]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Retarget {
            input,
            donor,
            config,
            output,
            no_merge,
            cell_size,
            verbose,
        } => {
            let output = output.unwrap_or_else(|| input.with_extension("retargeted.glb"));
            tracing::info!("Retargeting {:?} onto {:?} -> {:?}", input, donor, output);

            let mut rig = RigConfig::load(&config)?;
            if let Some(cell) = cell_size {
                rig.cell_size = cell;
            }
            rig.validate()?;
            if verbose {
                tracing::info!(
                    "config: root_bone='{}', scale={}, {} pruned joints, {} node mappings, cell={}px",
                    rig.root_bone,
                    rig.translation_scale,
                    rig.prune_joints.len(),
                    rig.node_joints.len(),
                    rig.cell_size
                );
            }

            let input_size = std::fs::metadata(&input)
                .map(|m| m.len())
                .unwrap_or_default()
                + std::fs::metadata(&donor)
                    .map(|m| m.len())
                    .unwrap_or_default();

            let mut target = import_document(&input)?;
            let mut donor_doc = import_document(&donor)?;

            let options = RetargetOptions {
                merge: !no_merge,
                channels: vec![TextureChannel::BaseColor, TextureChannel::Emissive],
            };
            let stats = retarget(&mut target, &mut donor_doc, &rig, &options)?;

            write_glb(&target, &output)?;
            if let Some(grid) = stats.atlas_grid {
                tracing::info!(
                    "atlas: {0}x{0} grid, {1} primitives merged",
                    grid,
                    stats.merged_primitives
                );
            }

            let output_size = std::fs::metadata(&output).map(|m| m.len()).unwrap_or_default();
            if input_size > 0 {
                tracing::info!(
                    "{} bytes in -> {} bytes out ({:.1}%)",
                    input_size,
                    output_size,
                    output_size as f64 / input_size as f64 * 100.0
                );
            }
            tracing::info!("Done!");
        }

        Commands::Inspect { input } => {
            let doc = import_document(&input)?;
            inspect(&doc);
        }

        Commands::Check { config } => {
            tracing::info!("Checking rig config {:?}", config);
            RigConfig::load(&config)?;
            tracing::info!("Config is valid!");
        }
    }

    Ok(())
}

fn inspect(doc: &rig_splice::Document) {
    println!("nodes: {}", doc.live_node_count());
    for id in doc.traverse_pre_order() {
        let node = doc.node(id);
        let depth = doc.ancestors(id).count();
        let tags = match (node.mesh.is_some(), node.skin.is_some()) {
            (true, true) => " [mesh, skin]",
            (true, false) => " [mesh]",
            (false, true) => " [skin]",
            (false, false) => "",
        };
        println!("{:indent$}{}{}", "", node.name, tags, indent = depth * 2);
    }

    for skin in &doc.skins {
        println!("skin '{}': {} joints", skin.name, skin.joint_count());
    }
    for animation in &doc.animations {
        println!(
            "animation '{}': {} channels, {:.2}s",
            animation.name,
            animation.channels.len(),
            animation.duration()
        );
    }
    for material in &doc.materials {
        println!(
            "material '{}': base_color={:?} textured={}",
            material.name,
            material.base_color_factor,
            material.base_color_texture.is_some()
        );
    }
    println!("images: {}", doc.images.len());
}
