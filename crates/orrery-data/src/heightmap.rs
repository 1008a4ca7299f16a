//! Heightmap tiles: a square raster of per-vertex heights with a border,
//! plus the filters used to read between texels.

use orrery_config::{FilterMode, HeightmapConfig};
use orrery_surface::{GeometrySurface, PatchId};

use crate::HeightSource;
use crate::tile::TileHandle;

/// A tile handle into a heightmap.
pub type HeightmapHandle = TileHandle<HeightmapTile>;

/// Heights for one patch, in world units relative to the body radius.
///
/// Interior texel `i` sits at patch-local `u = i / (size - 1)`, so the first
/// and last interior texels lie exactly on the patch edges and adjacent tiles
/// agree there. `border` extra texels surround the interior.
#[derive(Debug, Clone, PartialEq)]
pub struct HeightmapTile {
    size: usize,
    border: usize,
    data: Vec<f32>,
    min_height: f64,
    max_height: f64,
}

impl HeightmapTile {
    /// Constant tile used before any data exists. Its bounds span the full
    /// height range so boxes built from it stay conservative.
    #[must_use]
    pub fn placeholder(config: &HeightmapConfig) -> Self {
        let (lo, hi) = height_range(config);
        let stride = config.stride();
        Self {
            size: config.size as usize,
            border: config.border as usize,
            data: vec![(0.5 * (lo + hi)) as f32; stride * stride],
            min_height: lo,
            max_height: hi,
        }
    }

    /// Wrap raw texels; `data` must hold `(size + 2 * border)²` values.
    #[must_use]
    pub fn from_data(size: usize, border: usize, data: Vec<f32>) -> Self {
        let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
        for &h in &data {
            lo = lo.min(f64::from(h));
            hi = hi.max(f64::from(h));
        }
        if data.is_empty() {
            (lo, hi) = (0.0, 0.0);
        }
        Self {
            size: size.max(2),
            border,
            data,
            min_height: lo,
            max_height: hi,
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn stride(&self) -> usize {
        self.size + 2 * self.border
    }

    #[must_use]
    pub fn min_height(&self) -> f64 {
        self.min_height
    }

    #[must_use]
    pub fn max_height(&self) -> f64 {
        self.max_height
    }

    /// Give the texel buffer back for reuse.
    #[must_use]
    pub fn into_buffer(self) -> Vec<f32> {
        self.data
    }

    /// Texel at signed grid coordinates, clamped to the stored area.
    #[inline]
    fn texel(&self, i: i64, j: i64) -> f64 {
        let max = self.stride() as i64 - 1;
        let i = i.clamp(0, max) as usize;
        let j = j.clamp(0, max) as usize;
        self.data
            .get(j * self.stride() + i)
            .map_or(0.0, |h| f64::from(*h))
    }

    /// Sample at tile-local `(u, v)` with the given filter.
    #[must_use]
    pub fn sample(&self, u: f64, v: f64, filter: FilterMode) -> f64 {
        let span = (self.size - 1) as f64;
        let fx = self.border as f64 + u * span;
        let fy = self.border as f64 + v * span;

        match filter {
            FilterMode::Nearest => self.texel(fx.round() as i64, fy.round() as i64),
            FilterMode::Bilinear => self.bilinear(fx, fy, |t| t),
            FilterMode::ImprovedBilinear => self.bilinear(fx, fy, |t| t * t * (3.0 - 2.0 * t)),
            FilterMode::Quintic => {
                self.bilinear(fx, fy, |t| t * t * t * (t * (t * 6.0 - 15.0) + 10.0))
            }
            FilterMode::BSpline => self.bspline(fx, fy),
        }
    }

    fn bilinear(&self, fx: f64, fy: f64, fade: impl Fn(f64) -> f64) -> f64 {
        let (x0, y0) = (fx.floor(), fy.floor());
        let (tx, ty) = (fade(fx - x0), fade(fy - y0));
        let (i, j) = (x0 as i64, y0 as i64);
        let top = lerp(self.texel(i, j), self.texel(i + 1, j), tx);
        let bottom = lerp(self.texel(i, j + 1), self.texel(i + 1, j + 1), tx);
        lerp(top, bottom, ty)
    }

    fn bspline(&self, fx: f64, fy: f64) -> f64 {
        let (x0, y0) = (fx.floor(), fy.floor());
        let wx = bspline_weights(fx - x0);
        let wy = bspline_weights(fy - y0);
        let (i, j) = (x0 as i64, y0 as i64);
        let mut sum = 0.0;
        for (dj, wyj) in wy.iter().enumerate() {
            for (di, wxi) in wx.iter().enumerate() {
                sum += wxi * wyj * self.texel(i + di as i64 - 1, j + dj as i64 - 1);
            }
        }
        sum
    }
}

impl TileHandle<HeightmapTile> {
    /// Sample at patch-local `(u, v)` through this handle's window.
    #[must_use]
    pub fn sample(&self, u: f64, v: f64, filter: FilterMode) -> f64 {
        let p = self.map_uv(u, v);
        self.tile().sample(p.x, p.y, filter)
    }

    /// Mean of the four corner heights of the window.
    #[must_use]
    pub fn corner_average(&self, filter: FilterMode) -> f64 {
        0.25 * (self.sample(0.0, 0.0, filter)
            + self.sample(1.0, 0.0, filter)
            + self.sample(0.0, 1.0, filter)
            + self.sample(1.0, 1.0, filter))
    }
}

#[inline]
fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Uniform cubic B-spline weights for texels at offsets -1, 0, 1, 2.
fn bspline_weights(t: f64) -> [f64; 4] {
    let t2 = t * t;
    let t3 = t2 * t;
    [
        (1.0 - t).powi(3) / 6.0,
        (3.0 * t3 - 6.0 * t2 + 4.0) / 6.0,
        (-3.0 * t3 + 3.0 * t2 + 3.0 * t + 1.0) / 6.0,
        t3 / 6.0,
    ]
}

/// Range of heights the configured source can produce.
#[must_use]
pub fn height_range(config: &HeightmapConfig) -> (f64, f64) {
    if config.median {
        (-0.5 * config.height_scale, 0.5 * config.height_scale)
    } else {
        (0.0, config.height_scale)
    }
}

/// Scale a normalized `[0, 1]` source value to a height.
#[inline]
#[must_use]
pub fn scale_height(raw: f64, config: &HeightmapConfig) -> f64 {
    let centred = if config.median { raw - 0.5 } else { raw };
    config.height_scale * centred
}

/// Fill a tile for `id` from a height source, reusing `buffer`'s allocation.
pub fn generate_heightmap<S: GeometrySurface + ?Sized>(
    surface: &S,
    source: &dyn HeightSource,
    id: &PatchId,
    config: &HeightmapConfig,
    mut buffer: Vec<f32>,
) -> HeightmapTile {
    let size = config.size.max(2) as usize;
    let border = config.border as usize;
    let stride = size + 2 * border;
    let span = (size - 1) as f64;
    let b = id.patch_box();

    buffer.clear();
    buffer.reserve(stride * stride);
    for j in 0..stride {
        let v = (j as f64 - border as f64) / span;
        for i in 0..stride {
            let u = (i as f64 - border as f64) / span;
            let (x, y) = b.uv_to_coord(u, v);
            let dir = surface.surface_normal(id.face, x, y);
            let h = scale_height(source.sample(id.face, x, y, dir), config);
            buffer.push(h as f32);
        }
    }
    HeightmapTile::from_data(size, border, buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;
    use orrery_surface::{NormalizedCube, Quadrant, ShapeFamily};
    use std::sync::Arc;

    const EPSILON: f64 = 1e-9;

    /// Height equal to face x, for checking interpolation.
    struct Ramp;

    impl HeightSource for Ramp {
        fn sample(&self, _face: u8, x: f64, _y: f64, _dir: DVec3) -> f64 {
            x
        }
    }

    fn ramp_config() -> HeightmapConfig {
        HeightmapConfig {
            size: 9,
            border: 1,
            height_scale: 1.0,
            median: false,
            ..Default::default()
        }
    }

    fn ramp_tile(id: &PatchId) -> HeightmapTile {
        generate_heightmap(&NormalizedCube, &Ramp, id, &ramp_config(), Vec::new())
    }

    #[test]
    fn test_edges_sample_exact_texels() {
        let id = PatchId::root(ShapeFamily::NormalizedCube, 0);
        let tile = ramp_tile(&id);
        assert_eq!(tile.stride(), 11);
        for filter in [FilterMode::Nearest, FilterMode::Bilinear, FilterMode::Quintic] {
            assert!((tile.sample(0.0, 0.5, filter) - 0.0).abs() < 1e-6, "{filter:?}");
            assert!((tile.sample(1.0, 0.5, filter) - 1.0).abs() < 1e-6, "{filter:?}");
        }
    }

    #[test]
    fn test_bilinear_reproduces_linear_ramp() {
        let id = PatchId::root(ShapeFamily::NormalizedCube, 0);
        let tile = ramp_tile(&id);
        for &u in &[0.1, 0.33, 0.5, 0.77] {
            let h = tile.sample(u, 0.4, FilterMode::Bilinear);
            assert!((h - u).abs() < 1e-6, "u={u} gave {h}");
        }
    }

    #[test]
    fn test_bspline_reproduces_linear_ramp_inside() {
        let id = PatchId::root(ShapeFamily::NormalizedCube, 0);
        let tile = ramp_tile(&id);
        // Cubic B-splines reproduce linear data where the 4x4 footprint is valid.
        let h = tile.sample(0.5, 0.5, FilterMode::BSpline);
        assert!((h - 0.5).abs() < 1e-6, "got {h}");
    }

    #[test]
    fn test_bspline_weights_partition_unity() {
        for &t in &[0.0, 0.25, 0.5, 0.99] {
            let w = bspline_weights(t);
            assert!((w.iter().sum::<f64>() - 1.0).abs() < EPSILON);
        }
    }

    #[test]
    fn test_improved_bilinear_stays_in_texel_range() {
        let id = PatchId::root(ShapeFamily::NormalizedCube, 0);
        let tile = ramp_tile(&id);
        let h = tile.sample(0.3, 0.3, FilterMode::ImprovedBilinear);
        assert!((0.25..=0.375).contains(&h), "got {h}");
    }

    #[test]
    fn test_child_window_samples_parent_bit_exact_nearest() {
        let id = PatchId::root(ShapeFamily::NormalizedCube, 1);
        let parent = TileHandle::new(id, Arc::new(ramp_tile(&id)));
        for q in Quadrant::ALL {
            let child = parent.derive_child(q);
            for &(u, v) in &[(0.0, 0.0), (0.13, 0.71), (0.5, 0.5), (1.0, 1.0)] {
                let p = (u * child.scale.x + child.offset.x, v * child.scale.y + child.offset.y);
                assert_eq!(
                    child.sample(u, v, FilterMode::Nearest).to_bits(),
                    parent.sample(p.0, p.1, FilterMode::Nearest).to_bits(),
                    "{q:?} at ({u}, {v})"
                );
            }
        }
    }

    #[test]
    fn test_placeholder_spans_height_range() {
        let config = HeightmapConfig {
            height_scale: 100.0,
            median: true,
            ..Default::default()
        };
        let tile = HeightmapTile::placeholder(&config);
        assert_eq!(tile.min_height(), -50.0);
        assert_eq!(tile.max_height(), 50.0);
        assert_eq!(tile.sample(0.5, 0.5, FilterMode::Bilinear), 0.0);
    }

    #[test]
    fn test_scale_height_median() {
        let mut config = HeightmapConfig {
            height_scale: 10.0,
            median: true,
            ..Default::default()
        };
        assert_eq!(scale_height(0.75, &config), 2.5);
        config.median = false;
        assert_eq!(scale_height(0.75, &config), 7.5);
    }

    #[test]
    fn test_buffer_is_reused() {
        let id = PatchId::root(ShapeFamily::NormalizedCube, 3);
        let buffer = Vec::with_capacity(512);
        let ptr = buffer.as_ptr();
        let tile = generate_heightmap(&NormalizedCube, &Ramp, &id, &ramp_config(), buffer);
        let back = tile.into_buffer();
        assert_eq!(back.len(), 121);
        assert_eq!(back.as_ptr(), ptr, "capacity was enough, no reallocation expected");
    }
}
