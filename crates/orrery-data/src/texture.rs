//! Per-patch colour tiles and where they come from.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use glam::DVec3;
use image::RgbaImage;
use orrery_config::HeightmapConfig;
use orrery_surface::{GeometrySurface, PatchId};

use crate::pipeline::{AsyncDataPipeline, JobKind, JobPriority};
use crate::store::TileCache;
use crate::tile::{TileHandle, TileRequest};
use crate::{DataJobError, FbmNoise};

/// Texture handle into a colour tile.
pub type TextureHandle = TileHandle<TextureTile>;

/// RGBA8 pixels for one patch, row-major with `v = 0` on the first row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureTile {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl TextureTile {
    /// Returns `None` unless `rgba` holds exactly `width * height` pixels.
    #[must_use]
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Option<Self> {
        (width > 0 && height > 0 && rgba.len() == width as usize * height as usize * 4).then_some(
            Self {
                width,
                height,
                rgba,
            },
        )
    }

    #[must_use]
    pub fn from_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            rgba: image.into_raw(),
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let x = x.min(self.width.saturating_sub(1)) as usize;
        let y = y.min(self.height.saturating_sub(1)) as usize;
        let i = (y * self.width as usize + x) * 4;
        let mut out = [0; 4];
        if let Some(p) = self.rgba.get(i..i + 4) {
            out.copy_from_slice(p);
        }
        out
    }

    /// Nearest pixel at tile-local `(u, v)`.
    #[must_use]
    pub fn sample(&self, u: f64, v: f64) -> [u8; 4] {
        let x = (u.clamp(0.0, 1.0) * f64::from(self.width)).floor() as u32;
        let y = (v.clamp(0.0, 1.0) * f64::from(self.height)).floor() as u32;
        self.pixel(x, y)
    }
}

impl TileHandle<TextureTile> {
    /// Pixel at patch-local `(u, v)` through this handle's window.
    #[must_use]
    pub fn sample(&self, u: f64, v: f64) -> [u8; 4] {
        let p = self.map_uv(u, v);
        self.tile().sample(p.x, p.y)
    }
}

/// Somewhere texture tiles can be loaded from. Runs on worker threads.
pub trait TextureSource: Send + Sync {
    /// Native width of one tile, in pixels.
    fn tile_size(&self) -> u32;

    /// Deepest level tiles exist for.
    fn max_lod(&self) -> u8;

    /// True if `id`'s children have tiles of their own.
    fn can_split(&self, id: &PatchId) -> bool {
        id.lod < self.max_lod()
    }

    fn load(&self, id: &PatchId) -> Result<TextureTile, DataJobError>;
}

/// Colours a patch from fBm noise with a simple altitude ramp.
pub struct ProceduralTexture<S> {
    surface: S,
    noise: FbmNoise,
    tile_size: u32,
    max_lod: u8,
}

impl<S: GeometrySurface> ProceduralTexture<S> {
    pub fn new(surface: S, config: &HeightmapConfig, tile_size: u32, max_lod: u8) -> Self {
        Self {
            surface,
            noise: FbmNoise::new(config),
            tile_size: tile_size.max(1),
            max_lod,
        }
    }

    fn colour(&self, dir: DVec3) -> [u8; 4] {
        let h = 0.5 + 0.5 * self.noise.fbm(dir);
        let (r, g, b) = if h < 0.45 {
            (30.0, 60.0, 140.0 + 100.0 * h)
        } else if h < 0.5 {
            (200.0, 190.0, 140.0)
        } else if h < 0.75 {
            (50.0 + 60.0 * h, 120.0, 50.0)
        } else {
            let w = 150.0 + 100.0 * h;
            (w, w, w)
        };
        [
            r.clamp(0.0, 255.0) as u8,
            g.clamp(0.0, 255.0) as u8,
            b.clamp(0.0, 255.0) as u8,
            255,
        ]
    }
}

impl<S: GeometrySurface> TextureSource for ProceduralTexture<S> {
    fn tile_size(&self) -> u32 {
        self.tile_size
    }

    fn max_lod(&self) -> u8 {
        self.max_lod
    }

    fn load(&self, id: &PatchId) -> Result<TextureTile, DataJobError> {
        let n = self.tile_size;
        let b = id.patch_box();
        let mut rgba = Vec::with_capacity(n as usize * n as usize * 4);
        for j in 0..n {
            let v = (f64::from(j) + 0.5) / f64::from(n);
            for i in 0..n {
                let u = (f64::from(i) + 0.5) / f64::from(n);
                let (x, y) = b.uv_to_coord(u, v);
                rgba.extend_from_slice(&self.colour(self.surface.surface_normal(id.face, x, y)));
            }
        }
        TextureTile::new(n, n, rgba).ok_or_else(|| DataJobError::DataJobFailure {
            id: *id,
            reason: "texel count mismatch".to_string(),
        })
    }
}

/// PNG tiles laid out as `<root>/<face>/<lod>/<ix>_<iy>.png`.
#[derive(Debug, Clone)]
pub struct DirectoryTextureSource {
    root: PathBuf,
    tile_size: u32,
    max_lod: u8,
}

impl DirectoryTextureSource {
    pub fn new(root: impl Into<PathBuf>, tile_size: u32, max_lod: u8) -> Self {
        Self {
            root: root.into(),
            tile_size,
            max_lod,
        }
    }

    #[must_use]
    pub fn path_for(&self, id: &PatchId) -> PathBuf {
        self.root
            .join(id.face.to_string())
            .join(id.lod.to_string())
            .join(format!("{}_{}.png", id.ix, id.iy))
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl TextureSource for DirectoryTextureSource {
    fn tile_size(&self) -> u32 {
        self.tile_size
    }

    fn max_lod(&self) -> u8 {
        self.max_lod
    }

    fn can_split(&self, id: &PatchId) -> bool {
        id.lod < self.max_lod && id.children().iter().all(|c| self.path_for(c).is_file())
    }

    fn load(&self, id: &PatchId) -> Result<TextureTile, DataJobError> {
        let path = self.path_for(id);
        let image = image::open(&path).map_err(|e| DataJobError::TextureUnavailable {
            id: *id,
            reason: format!("{}: {e}", path.display()),
        })?;
        Ok(TextureTile::from_image(image.to_rgba8()))
    }
}

/// Texture cache in front of an optional source.
///
/// Without a source every request inherits and no patch ever waits on a texture.
pub struct TextureStore {
    source: Option<Arc<dyn TextureSource>>,
    cache: TileCache<TextureTile>,
}

impl TextureStore {
    #[must_use]
    pub fn new(source: Option<Arc<dyn TextureSource>>, max_cached_tiles: usize) -> Self {
        let max_lod = source.as_ref().map_or(0, |s| s.max_lod());
        Self {
            source,
            cache: TileCache::new(JobKind::Texture, max_lod, max_cached_tiles),
        }
    }

    pub fn get_or_create(
        &mut self,
        id: &PatchId,
        pipeline: &mut AsyncDataPipeline,
        distance: f64,
    ) -> TileRequest<TextureTile> {
        if self.source.is_none() {
            return TileRequest::Inherit;
        }
        let (request, _) =
            self.cache
                .acquire(id, pipeline, JobPriority::new(distance, id.lod), Vec::new);
        request
    }

    pub fn insert(&mut self, id: PatchId, tile: TextureTile) -> TextureHandle {
        self.cache.insert(id, tile).0
    }

    pub fn mark_failed(&mut self, id: PatchId) {
        self.cache.mark_failed(id);
    }

    pub fn release(&mut self, id: &PatchId, pipeline: &mut AsyncDataPipeline) {
        if self.source.is_some() {
            self.cache.release(id, pipeline);
        }
    }

    /// Own tile of `id` or the nearest cached ancestor's, if any.
    #[must_use]
    pub fn handle_for(&self, id: &PatchId) -> Option<TextureHandle> {
        self.cache.handle_for(id)
    }

    /// Native tile size of the source, if there is one.
    #[must_use]
    pub fn tile_size(&self) -> Option<u32> {
        self.source.as_ref().map(|s| s.tile_size())
    }

    /// Whether `id` may split as far as texture data is concerned.
    #[must_use]
    pub fn can_split(&self, id: &PatchId) -> bool {
        self.source.as_ref().is_none_or(|s| s.can_split(id))
    }

    #[must_use]
    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    #[must_use]
    pub fn cache(&self) -> &TileCache<TextureTile> {
        &self.cache
    }
}
