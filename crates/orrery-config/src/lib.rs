//! Configuration for patched planetary bodies.
//!
//! Settings persist to disk as RON files, tolerate missing and unknown
//! fields, and can be overridden from the command line via clap.

mod cli;
mod config;
mod error;

pub use cli::{CliArgs, CliFamily};
pub use config::{
    Config, DebugConfig, FilterMode, HeightmapConfig, LodPolicyConfig, MAX_BASE_DENSITY,
    MAX_SUPPORTED_LOD, MIN_BASE_DENSITY, PatchConfig, PipelineConfig, ShapeConfig, ShapeFamily,
};
pub use error::ConfigError;

/// Default per-user configuration directory (`<config dir>/orrery`).
///
/// Falls back to the working directory when the platform has no config dir.
pub fn default_config_dir() -> std::path::PathBuf {
    dirs::config_dir()
        .map(|d| d.join("orrery"))
        .unwrap_or_else(|| std::path::PathBuf::from("."))
}
