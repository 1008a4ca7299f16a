//! Procedural height sources.

use glam::DVec3;
use noise::{NoiseFn, Simplex};
use orrery_config::HeightmapConfig;

/// Referentially transparent height function.
///
/// Returns a normalized height in `[0, 1]` for face coords `(x, y)`; `dir` is
/// the matching point on the unit surface, for sources that sample in 3D.
pub trait HeightSource: Send + Sync {
    fn sample(&self, face: u8, x: f64, y: f64, dir: DVec3) -> f64;
}

/// Constant height everywhere; handy for flat test terrain.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConstantHeight(pub f64);

impl HeightSource for ConstantHeight {
    fn sample(&self, _face: u8, _x: f64, _y: f64, _dir: DVec3) -> f64 {
        self.0.clamp(0.0, 1.0)
    }
}

/// Fractal Brownian motion over 3D simplex noise, evaluated on the unit
/// surface point so cube seams and the UV longitude seam leave no trace.
pub struct FbmNoise {
    noise: Simplex,
    octaves: u32,
    base_frequency: f64,
    lacunarity: f64,
    persistence: f64,
    max_amplitude: f64,
}

impl FbmNoise {
    pub fn new(config: &HeightmapConfig) -> Self {
        let octaves = config.octaves.max(1);
        let mut max_amplitude = 0.0;
        let mut amp = 1.0;
        for _ in 0..octaves {
            max_amplitude += amp;
            amp *= config.persistence;
        }
        Self {
            noise: Simplex::new(config.seed as u32),
            octaves,
            base_frequency: config.base_frequency,
            lacunarity: config.lacunarity,
            persistence: config.persistence,
            max_amplitude,
        }
    }

    /// Raw fBm in `[-1, 1]`.
    #[must_use]
    pub fn fbm(&self, p: DVec3) -> f64 {
        let mut total = 0.0;
        let mut frequency = self.base_frequency;
        let mut amplitude = 1.0;
        for _ in 0..self.octaves {
            let q = p * frequency;
            total += amplitude * self.noise.get([q.x, q.y, q.z]);
            frequency *= self.lacunarity;
            amplitude *= self.persistence;
        }
        if self.max_amplitude > 0.0 {
            total / self.max_amplitude
        } else {
            0.0
        }
    }
}

impl HeightSource for FbmNoise {
    fn sample(&self, _face: u8, _x: f64, _y: f64, dir: DVec3) -> f64 {
        (0.5 + 0.5 * self.fbm(dir)).clamp(0.0, 1.0)
    }
}

impl std::fmt::Debug for FbmNoise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FbmNoise")
            .field("octaves", &self.octaves)
            .field("base_frequency", &self.base_frequency)
            .finish_non_exhaustive()
    }
}
