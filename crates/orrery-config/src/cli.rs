//! Command-line argument parsing for the orrery tools.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::{Config, ShapeFamily};

/// Surface family names accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliFamily {
    Uv,
    Cube,
    Squared,
    Flat,
}

impl From<CliFamily> for ShapeFamily {
    fn from(f: CliFamily) -> Self {
        match f {
            CliFamily::Uv => ShapeFamily::UvSphere,
            CliFamily::Cube => ShapeFamily::NormalizedCube,
            CliFamily::Squared => ShapeFamily::SquaredDistanceCube,
            CliFamily::Flat => ShapeFamily::FlatTile,
        }
    }
}

/// Orrery command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "orrery", about = "Adaptive patched-surface LOD for planetary bodies")]
pub struct CliArgs {
    /// Surface family.
    #[arg(long, value_enum)]
    pub family: Option<CliFamily>,

    /// Body radius in world units.
    #[arg(long)]
    pub radius: Option<f64>,

    /// Maximum quadtree depth.
    #[arg(long)]
    pub max_lod: Option<u8>,

    /// Worker threads for tile generation (0 runs jobs inline).
    #[arg(long)]
    pub worker_threads: Option<usize>,

    /// Frames to simulate.
    #[arg(long, default_value_t = 600)]
    pub frames: u32,

    /// Starting camera altitude above the surface, in radii.
    #[arg(long, default_value_t = 2.0)]
    pub altitude: f64,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(family) = args.family {
            self.shape.family = family.into();
        }
        if let Some(r) = args.radius {
            self.shape.radius = r;
        }
        if let Some(lod) = args.max_lod {
            self.patch.max_lod = lod;
        }
        if let Some(n) = args.worker_threads {
            self.pipeline.worker_threads = Some(n);
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
