//! Per-patch data: heightmaps, textures, the caches holding them and the
//! background pipeline that produces them.

mod error;
mod heightmap;
mod noise_source;
mod pipeline;
mod store;
mod texture;
mod tile;

pub use error::{DataJobError, PipelineError};
pub use heightmap::{HeightmapHandle, HeightmapTile, generate_heightmap, height_range, scale_height};
pub use noise_source::{ConstantHeight, FbmNoise, HeightSource};
pub use pipeline::{
    AsyncDataPipeline, Completion, JobKey, JobKind, JobPayload, JobPriority, JobRequest,
    PipelineStats, ProceduralGenerator, SubmitOutcome, TileGenerator,
};
pub use store::{HeightmapStore, TileCache};
pub use texture::{
    DirectoryTextureSource, ProceduralTexture, TextureHandle, TextureSource, TextureStore,
    TextureTile,
};
pub use tile::{TileHandle, TileRequest};
