//! Configuration structs with sensible defaults and RON persistence.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Smallest accepted per-axis vertex count of a patch mesh.
pub const MIN_BASE_DENSITY: u32 = 8;
/// Largest accepted per-axis vertex count of a patch mesh.
pub const MAX_BASE_DENSITY: u32 = 64;
/// Hard ceiling on quadtree depth.
pub const MAX_SUPPORTED_LOD: u8 = 30;

/// Top-level configuration for a patched body.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Which surface family and at what size.
    pub shape: ShapeConfig,
    /// Quadtree, LOD policy and culling settings.
    pub patch: PatchConfig,
    /// Heightmap tile generation and sampling.
    pub heightmap: HeightmapConfig,
    /// Background data pipeline.
    pub pipeline: PipelineConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// The parametric surface a body is built from.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShapeFamily {
    /// Two hemispheres in spherical coordinates.
    UvSphere,
    /// Cube faces projected by normalization.
    NormalizedCube,
    /// Cube faces projected with the squared-distance (Nowell) mapping.
    #[default]
    SquaredDistanceCube,
    /// A single planar tile.
    FlatTile,
}

/// Shape settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShapeConfig {
    /// Surface family used for every patch of the body.
    pub family: ShapeFamily,
    /// Body radius in world units (for the flat tile: height of the ground plane).
    pub radius: f64,
    /// Edge length of the flat tile in world units.
    pub flat_tile_size: f64,
}

/// Which split/merge policy drives the quadtree.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum LodPolicyConfig {
    /// Split when a mesh cell exceeds `max_vertex_size` pixels on screen.
    VertexSize {
        /// Largest on-screen size of one mesh cell, in pixels.
        max_vertex_size: f64,
    },
    /// Split when the patch outgrows the native tile size of its texture.
    TextureDriven,
}

impl Default for LodPolicyConfig {
    fn default() -> Self {
        Self::VertexSize {
            max_vertex_size: 16.0,
        }
    }
}

/// Quadtree settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PatchConfig {
    /// Per-axis vertex count of a patch mesh (8-64).
    pub base_density: u32,
    /// Hard cap on subdivision depth (0-30).
    pub max_lod: u8,
    /// Split/merge policy.
    pub lod_policy: LodPolicyConfig,
    /// Upper bound on splits applied per frame.
    pub split_budget_per_frame: usize,
    /// Frames after a split during which a merge of the same node is suppressed.
    pub merge_hysteresis_frames: u64,
    /// Derive the far plane from the altitude above the terrain.
    pub far_plane_clamp: bool,
    /// Cull patches that lie entirely below the horizon.
    pub horizon_culling: bool,
    /// Offset the patch origin by its average height along the patch normal.
    pub shift_patch_origin: bool,
    /// Multiplier on the heightmap's maximum height when inflating patch bounds.
    pub max_height_ratio: f64,
}

/// Tile filtering used when sampling heightmaps.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FilterMode {
    /// Closest texel.
    Nearest,
    /// Linear interpolation of the four surrounding texels.
    #[default]
    Bilinear,
    /// Bilinear with a cubic smoothstep applied to the sub-texel position.
    ImprovedBilinear,
    /// Bilinear with a quintic fade applied to the sub-texel position.
    Quintic,
    /// Uniform cubic B-spline over a 4x4 texel footprint.
    BSpline,
}

/// Heightmap settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HeightmapConfig {
    /// Interior texels per tile axis.
    pub size: u32,
    /// Extra texels on each side of the interior.
    pub border: u32,
    /// Deepest lod that receives its own tile; deeper patches reuse an ancestor tile.
    pub max_heightmap_lod: u8,
    /// Sampling filter.
    pub filter: FilterMode,
    /// Scale applied to normalized `[0, 1]` noise heights.
    pub height_scale: f64,
    /// Subtract 0.5 from normalized heights before scaling.
    pub median: bool,
    /// Noise seed.
    pub seed: u64,
    /// Number of fBm octaves.
    pub octaves: u32,
    /// Frequency of the first octave, in cycles per unit radius.
    pub base_frequency: f64,
    /// Frequency multiplier between octaves.
    pub lacunarity: f64,
    /// Amplitude multiplier between octaves.
    pub persistence: f64,
    /// Unreferenced tiles kept around for quick reuse.
    pub max_cached_tiles: usize,
}

/// Data pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Worker thread count. `None` picks `cores - 2`, `Some(0)` runs jobs inline on `pump`.
    pub worker_threads: Option<usize>,
    /// Jobs handed to workers at once; the rest wait in the priority queue.
    pub max_in_flight: usize,
    /// Delay before the single retry of a failed job, in milliseconds.
    pub retry_backoff_ms: u64,
    /// Jobs slower than this are reported as slow tiles.
    pub slow_tile_ms: u64,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "orrery_lod=trace").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for ShapeConfig {
    fn default() -> Self {
        Self {
            family: ShapeFamily::default(),
            radius: 6_371_000.0,
            flat_tile_size: 10_000.0,
        }
    }
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            base_density: 32,
            max_lod: 18,
            lod_policy: LodPolicyConfig::default(),
            split_budget_per_frame: 2,
            merge_hysteresis_frames: 5,
            far_plane_clamp: false,
            horizon_culling: true,
            shift_patch_origin: false,
            max_height_ratio: 1.0,
        }
    }
}

impl Default for HeightmapConfig {
    fn default() -> Self {
        Self {
            size: 256,
            border: 1,
            max_heightmap_lod: 12,
            filter: FilterMode::default(),
            height_scale: 8_000.0,
            median: true,
            seed: 0,
            octaves: 6,
            base_frequency: 2.0,
            lacunarity: 2.0,
            persistence: 0.5,
            max_cached_tiles: 256,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_threads: None,
            max_in_flight: 16,
            retry_backoff_ms: 50,
            slow_tile_ms: 250,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl PatchConfig {
    /// Clamp out-of-range values into their supported ranges.
    ///
    /// Returns `true` if anything was adjusted.
    pub fn validate(&mut self) -> bool {
        let mut adjusted = false;
        let density = self.base_density.clamp(MIN_BASE_DENSITY, MAX_BASE_DENSITY);
        if density != self.base_density {
            log::warn!(
                "base_density {} out of range, clamped to {density}",
                self.base_density
            );
            self.base_density = density;
            adjusted = true;
        }
        if self.max_lod > MAX_SUPPORTED_LOD {
            log::warn!(
                "max_lod {} out of range, clamped to {MAX_SUPPORTED_LOD}",
                self.max_lod
            );
            self.max_lod = MAX_SUPPORTED_LOD;
            adjusted = true;
        }
        if self.split_budget_per_frame == 0 {
            log::warn!("split_budget_per_frame of 0 would freeze the tree, using 1");
            self.split_budget_per_frame = 1;
            adjusted = true;
        }
        adjusted
    }
}

impl HeightmapConfig {
    /// Total texels per tile axis, border included.
    pub fn stride(&self) -> usize {
        (self.size + 2 * self.border) as usize
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Clamp every section into its supported range. Returns `true` if anything changed.
    pub fn validate(&mut self) -> bool {
        let mut adjusted = self.patch.validate();
        if self.heightmap.size < 2 {
            log::warn!("heightmap size {} too small, using 2", self.heightmap.size);
            self.heightmap.size = 2;
            adjusted = true;
        }
        if self.pipeline.max_in_flight == 0 {
            self.pipeline.max_in_flight = 1;
            adjusted = true;
        }
        adjusted
    }

    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let mut config = Self::read_file(&config_path)?;
            config.validate();
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(|source| ConfigError::CreateDir {
            path: config_dir.to_path_buf(),
            source,
        })?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(|source| ConfigError::Serialize {
                path: config_path.clone(),
                source,
            })?;

        std::fs::write(&config_path, serialized).map_err(|source| ConfigError::Write {
            path: config_path.clone(),
            source,
        })?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let new_config = Self::read_file(&config_path)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    fn read_file(config_path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
            path: config_path.to_path_buf(),
            source,
        })?;
        ron::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: config_path.to_path_buf(),
            source,
        })
    }
}
