//! The demo state, owning the terrain, the headless backend and the camera.

use std::time::{Duration, Instant};
use std::sync::Arc;

use glam::Vec2;

use tracing::{debug, info, warn};

use terra::camera::CameraView;
use terra::config::ConfigError;
use terra::render::{BlockAtlas, HeadlessBackend, MeshHandle, QuadMesh, TextureHandle};
use terra::{Terrain, TerrainConfig};

use crate::config;


/// Target tick duration. Currently 20 TPS, so 50 ms/tick.
const TICK_DURATION: Duration = Duration::from_millis(50);

/// Number of ticks between two status logs.
const STATUS_INTERVAL: u64 = 100;

/// Size of the simulated viewport, in pixels.
const VIEWPORT: Vec2 = Vec2::new(1280.0, 720.0);

/// Waypoints of the camera, visited in a loop: along the surface, down into the
/// caves, back up.
const PATH: [Vec2; 5] = [
    Vec2::new(0.0, 0.0),
    Vec2::new(8192.0, 0.0),
    Vec2::new(8192.0, -4096.0),
    Vec2::new(-4096.0, -4096.0),
    Vec2::new(-4096.0, 1024.0),
];


/// The demo, ticking the terrain like a game would each frame.
pub struct Demo {
    terrain: Terrain,
    backend: HeadlessBackend,
    atlas: BlockAtlas,
    camera: CameraView,
    /// Index of the waypoint the camera moves toward.
    target: usize,
    speed: f32,
    tick: u64,
}

impl Demo {

    pub fn new() -> Result<Self, ConfigError> {

        let config = TerrainConfig {
            seed: config::seed(),
            view_distance: config::view_distance(),
            ..TerrainConfig::default()
        };

        info!("terrain seed {}, view distance {}", config.seed, config.view_distance);

        let tile_size = Vec2::splat(config.block_size as f32);
        let mut backend = HeadlessBackend::new();
        let mesh = QuadMesh { vertices: MeshHandle(0), indices: MeshHandle(1) };
        let mut terrain = Terrain::new(config, Arc::new(()), mesh, &mut backend)?;

        let camera = CameraView::new(PATH[0], VIEWPORT.x, VIEWPORT.y);
        terrain.init(camera.pos, &mut backend);

        Ok(Self {
            terrain,
            backend,
            atlas: BlockAtlas::from_sheet(TextureHandle(0), tile_size * Vec2::new(30.0, 6.0), tile_size),
            camera,
            target: 1,
            speed: config::speed(),
            tick: 0,
        })

    }

    #[inline]
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Run a single tick and wait for it to approximately last for 50 ms, there is no
    /// sleep if the tick was too long, in such case a warning is logged.
    pub fn tick_padded(&mut self) {

        let start = Instant::now();
        self.tick();
        let elapsed = start.elapsed();

        if config::fast() {
            return;
        }

        if let Some(missing) = TICK_DURATION.checked_sub(elapsed) {
            std::thread::sleep(missing);
        } else {
            warn!("tick too long {:?}, expected {:?}", elapsed, TICK_DURATION);
        }

    }

    /// Move the camera, update the terrain and draw it.
    pub fn tick(&mut self) {

        self.move_camera();

        let loaded = self.terrain.update(&self.camera, &mut self.backend);
        if !loaded.is_empty() {
            debug!("{} chunks pushed", loaded.len());
        }

        self.terrain.render(&self.atlas, &mut self.backend);
        let draws = self.backend.take_draws();

        self.tick += 1;
        if self.tick % STATUS_INTERVAL == 0 {
            let stats = self.terrain.stats();
            info!("tick {}, camera {}, {} chunks, {} draws, {} queued, {} tasks, terrain {:.2} ms, features {:.2} ms",
                self.tick,
                self.camera.pos,
                self.terrain.store().len(),
                draws.len(),
                stats.queued,
                stats.terrain_tasks + stats.feature_tasks,
                stats.terrain_time,
                stats.features_time);
        }

    }

    fn move_camera(&mut self) {
        let target = PATH[self.target];
        let delta = target - self.camera.pos;
        if delta.length() <= self.speed {
            self.camera.pos = target;
            self.target = (self.target + 1) % PATH.len();
        } else {
            self.camera.pos += delta.normalize() * self.speed;
        }
    }

    /// Stop the demo, joining every generation task.
    pub fn stop(&mut self) {
        self.terrain.shutdown(&mut self.backend);
        let stats = self.terrain.stats();
        info!("stopped after {} ticks, {} chunks generated, {} fully loaded, {} failed",
            self.tick, stats.generated_count, stats.loaded_count, stats.failed_count);
    }

}
