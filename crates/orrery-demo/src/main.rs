//! Headless demo that flies a camera down onto a patched body.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p orrery-demo` for the default planet.
//! Run with `cargo run -p orrery-demo -- --family uv --frames 300` to pick a family.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use glam::{DQuat, DVec3};
use orrery_config::{CliArgs, Config, LodPolicyConfig, ShapeFamily};
use orrery_data::{FbmNoise, ProceduralTexture, TextureSource};
use orrery_lod::{BodyPose, CameraState, Lens, PatchedShape, PoseProvider, ShapeStats};
use orrery_surface::AnySurface;
use tracing::{info, warn};

/// Viewport height used to derive the pixel size.
const VIEWPORT_HEIGHT: u32 = 1080;
/// Simulated seconds per frame.
const FRAME_TIME: f64 = 1.0 / 60.0;
/// Lowest camera altitude, as a fraction of the start altitude.
const FINAL_ALTITUDE_RATIO: f64 = 1e-4;
const STATS_INTERVAL: u32 = 60;
const TEXTURE_TILE_SIZE: u32 = 64;

/// A body turning about its Z axis at a fixed rate.
struct SpinningPose {
    rate: f64,
}

impl PoseProvider for SpinningPose {
    fn get_pose(&self, time: f64) -> BodyPose {
        BodyPose {
            orientation: DQuat::from_rotation_z(self.rate * time),
            ..BodyPose::IDENTITY
        }
    }
}

/// Where the camera starts (in the body frame) and which way is down.
fn descent_axis(config: &Config) -> (DVec3, DVec3) {
    match config.shape.family {
        ShapeFamily::FlatTile => (DVec3::Z * config.shape.radius, DVec3::Z),
        _ => (DVec3::ZERO, DVec3::new(1.0, 0.3, 0.2).normalize()),
    }
}

/// Scale of the body: its radius, or the tile size for flat tiles.
fn body_scale(config: &Config) -> f64 {
    match config.shape.family {
        ShapeFamily::FlatTile => config.shape.flat_tile_size,
        _ => config.shape.radius,
    }
}

fn build_shape(config: &Config) -> Option<PatchedShape> {
    let heights = Arc::new(FbmNoise::new(&config.heightmap));
    let texture: Option<Arc<dyn TextureSource>> = match config.patch.lod_policy {
        LodPolicyConfig::TextureDriven => Some(Arc::new(ProceduralTexture::new(
            AnySurface::from_config(&config.shape),
            &config.heightmap,
            TEXTURE_TILE_SIZE,
            config.patch.max_lod,
        ))),
        LodPolicyConfig::VertexSize { .. } => None,
    };
    match PatchedShape::from_config(config, heights, texture) {
        Ok(shape) => Some(shape),
        Err(e) => {
            warn!("Failed to build shape: {e}");
            None
        }
    }
}

fn log_stats(stats: &ShapeStats, altitude: f64) {
    info!(
        frame = stats.frame,
        altitude,
        nodes = stats.nodes,
        leaves = stats.leaves,
        shown = stats.shown,
        splits = stats.splits,
        merges = stats.merges,
        pending_jobs = stats.pending_jobs,
        "LOD status"
    );
}

/// Flies the camera from `altitude` radii down toward the surface and back out.
fn demonstrate_descent(config: &Config, frames: u32, altitude: f64) {
    info!("Starting descent demonstration");

    let Some(mut shape) = build_shape(config) else {
        return;
    };
    let pose_provider = SpinningPose { rate: 0.01 };
    let lens = Lens::default();
    let pixel_size = lens.pixel_size_for(VIEWPORT_HEIGHT);
    let (surface_origin, up) = descent_axis(config);
    let scale = body_scale(config);
    let start_altitude = altitude.max(FINAL_ALTITUDE_RATIO) * scale;
    let ground = match config.shape.family {
        ShapeFamily::FlatTile => 0.0,
        _ => config.shape.radius,
    };

    let started = Instant::now();
    let frames = frames.max(1);
    for frame in 0..frames {
        let time = f64::from(frame) * FRAME_TIME;
        let pose = pose_provider.get_pose(time);
        // Down for the first two thirds, back up for the rest.
        let t = f64::from(frame) / f64::from(frames);
        let progress = if t < 2.0 / 3.0 { t * 1.5 } else { (1.0 - t) * 3.0 };
        let h = start_altitude * FINAL_ALTITUDE_RATIO.powf(progress);
        let local = surface_origin + up * (ground + h);
        let world = pose.model().transform_point3(local);
        let target = pose.model().transform_point3(surface_origin);
        let camera = CameraState::looking_at(world, target, lens, pixel_size);

        shape.update(&camera, &pose);
        if frame % STATS_INTERVAL == 0 {
            log_stats(&shape.stats(), h);
        }
        // Give the workers a moment, as a renderer's frame time would.
        thread::sleep(Duration::from_millis(1));
    }

    let stats = shape.stats();
    log_stats(&stats, start_altitude);
    let mut per_lod = vec![0usize; usize::from(shape.config().max_lod) + 1];
    for id in shape.leaf_ids() {
        if let Some(slot) = per_lod.get_mut(usize::from(id.lod)) {
            *slot += 1;
        }
    }
    let deepest = per_lod.iter().rposition(|&n| n > 0).unwrap_or(0);
    info!("Leaves per LOD: {:?}", &per_lod[..=deepest]);

    let pipeline = shape.pipeline_stats();
    info!(
        submitted = pipeline.submitted,
        completed = pipeline.completed,
        failed = pipeline.failed,
        cancelled = pipeline.cancelled,
        "Data pipeline totals"
    );
    info!(
        "Descent demonstration completed: {} frames in {:.2?}",
        frames,
        started.elapsed()
    );
}

/// Samples terrain height and normal along a ring around the body.
fn demonstrate_surface_queries(config: &Config) {
    info!("Starting surface query demonstration");

    let Some(mut shape) = build_shape(config) else {
        return;
    };
    let scale = body_scale(config);
    let lens = Lens::default();
    let camera = CameraState::looking_at(
        DVec3::Z * (config.shape.radius + 3.0 * scale),
        DVec3::ZERO,
        lens,
        lens.pixel_size_for(VIEWPORT_HEIGHT),
    );
    // A few frames so the roots have their heightmaps.
    for _ in 0..10 {
        shape.update(&camera, &BodyPose::IDENTITY);
        thread::sleep(Duration::from_millis(5));
    }

    let planar = config.shape.family == ShapeFamily::FlatTile;
    for i in 0..8 {
        let angle = f64::from(i) * std::f64::consts::TAU / 8.0;
        let probe = if planar {
            DVec3::new(0.4 * scale * angle.cos(), 0.4 * scale * angle.sin(), 0.0)
        } else {
            DVec3::new(angle.cos(), angle.sin(), 0.25)
        };
        match (shape.get_height_at(probe), shape.get_normal_at(probe)) {
            (Some(height), Some(frame)) => info!(
                "  probe {i}: height {:.3}, normal ({:.3}, {:.3}, {:.3})",
                height - config.shape.radius,
                frame.normal.x,
                frame.normal.y,
                frame.normal.z
            ),
            _ => info!("  probe {i}: outside the surface"),
        }
    }

    info!("Surface query demonstration completed successfully");
}

fn main() {
    let args = CliArgs::parse();

    // Resolve config directory
    let config_dir = args.config.clone().unwrap_or_else(|| {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("orrery")
    });

    // Load or create config, then apply CLI overrides
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);
    if config.validate() {
        eprintln!("Some settings were out of range and have been adjusted");
    }

    // Initialize logging with config and debug settings
    let log_dir = config_dir.join("logs");
    orrery_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    info!(
        family = ?config.shape.family,
        radius = config.shape.radius,
        max_lod = config.patch.max_lod,
        "Orrery demo starting"
    );

    demonstrate_surface_queries(&config);
    demonstrate_descent(&config, args.frames, args.altitude);

    info!("Orrery demo finished");
}
