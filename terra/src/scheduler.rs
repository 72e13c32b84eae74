//! A thread-based chunk generation scheduler. Each generation stage of each chunk
//! runs on its own short-lived thread, the scheduler is polled from the tick thread
//! and never blocks it, except when shutting down.
//!
//! Chunks to generate are sent to an unbounded queue that is shared with the
//! generation tasks, because a cave worm crossing into a missing chunk creates it and
//! queues it. Only one chunk is taken from the queue on each tick.

use std::any::Any;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use std::fmt;

use crossbeam_channel::{unbounded, Receiver, Sender};

use tracing::{debug, error, instrument, trace, warn};

use crate::chunk::{Chunk, ChunkPos, ChunkStage};
use crate::store::ChunkStore;
use crate::util::FadingAverage;
use crate::worldgen::{ChunkGenerator, GenContext, GenError, TouchedChunks};


/// Factor of new samples in the duration averages.
const AVERAGE_FACTOR: f32 = 0.05;


/// The generation scheduler, dispatching the two generation stages of queued chunks
/// to background tasks and harvesting their results.
pub struct GenScheduler<G: ChunkGenerator> {
    /// The generator shared by all tasks.
    generator: Arc<G>,
    store: Arc<ChunkStore>,
    /// Sender of the generation queue, cloned into post generation tasks.
    queue_sender: Sender<ChunkPos>,
    queue_receiver: Receiver<ChunkPos>,
    /// Tasks of the terrain stage in flight.
    terrain_tasks: Vec<Task<()>>,
    /// Tasks of the post generation stage in flight.
    feature_tasks: Vec<Task<Result<TouchedChunks, GenError>>>,
    /// Number of attempts of each stage before a chunk fails.
    max_attempts: u8,
    /// When closing, no post generation is started and failures are not retried.
    closing: bool,
    stats: Stats,
}

/// A generation task in flight for a chunk.
struct Task<T> {
    chunk: Arc<Chunk>,
    handle: JoinHandle<T>,
    start: Instant,
}

#[derive(Debug, Default)]
struct Stats {
    /// Average duration of the terrain stage, in ms.
    terrain_time: FadingAverage,
    /// Average duration of the post generation stage, in ms.
    features_time: FadingAverage,
    generated_count: u64,
    loaded_count: u64,
    failed_count: u64,
}

/// Snapshot of the scheduler statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenStats {
    /// Number of chunks waiting in the queue.
    pub queued: usize,
    pub terrain_tasks: usize,
    pub feature_tasks: usize,
    /// Average duration of the terrain stage, in ms.
    pub terrain_time: f32,
    /// Average duration of the post generation stage, in ms.
    pub features_time: f32,
    /// Total number of terrain stages completed.
    pub generated_count: u64,
    /// Total number of chunks fully loaded.
    pub loaded_count: u64,
    /// Total number of chunks that permanently failed.
    pub failed_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Terrain,
    Features,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Terrain => "terrain",
            Stage::Features => "post generation",
        })
    }
}

impl<G: ChunkGenerator> GenScheduler<G> {

    pub fn new(generator: Arc<G>, store: Arc<ChunkStore>, max_attempts: u8) -> Self {
        let (queue_sender, queue_receiver) = unbounded();
        Self {
            generator,
            store,
            queue_sender,
            queue_receiver,
            terrain_tasks: Vec::new(),
            feature_tasks: Vec::new(),
            max_attempts: max_attempts.max(1),
            closing: false,
            stats: Stats::default(),
        }
    }

    #[inline]
    pub fn generator(&self) -> &Arc<G> {
        &self.generator
    }

    /// Queue a chunk for generation, it must exist in the store.
    pub fn enqueue(&self, pos: ChunkPos) {
        self.queue_sender.send(pos)
            .expect("queue receiver should not disconnect while the scheduler exists");
    }

    /// Return true if there is no queued chunk and no task in flight.
    pub fn is_idle(&self) -> bool {
        self.queue_receiver.is_empty() && self.terrain_tasks.is_empty() && self.feature_tasks.is_empty()
    }

    /// Return true if the scheduler is shut down.
    #[inline]
    pub fn is_closing(&self) -> bool {
        self.closing
    }

    pub fn stats(&self) -> GenStats {
        GenStats {
            queued: self.queue_receiver.len(),
            terrain_tasks: self.terrain_tasks.len(),
            feature_tasks: self.feature_tasks.len(),
            terrain_time: self.stats.terrain_time.get(),
            features_time: self.stats.features_time.get(),
            generated_count: self.stats.generated_count,
            loaded_count: self.stats.loaded_count,
            failed_count: self.stats.failed_count,
        }
    }

    /// Dispatch the next queued chunk and harvest finished tasks, returning the
    /// position of every fully loaded chunk whose data changed.
    #[instrument(level = "trace", skip_all)]
    pub fn tick(&mut self) -> Vec<ChunkPos> {
        self.dispatch_next();
        self.poll_terrain();
        self.poll_features()
    }

    /// Wait for every task to complete and leave no chunk queued. Queued chunks get
    /// their terrain generated so that waiting post generation tasks can complete,
    /// but no new post generation is started.
    pub fn drain(&mut self) {

        let closing = self.closing;
        self.closing = true;

        loop {

            while self.dispatch_next() {}
            self.poll_terrain();
            self.poll_features();

            if self.is_idle() {
                break;
            }

            thread::sleep(Duration::from_millis(1));

        }

        self.closing = closing;

    }

    /// Shut down the scheduler, every task in flight is joined.
    pub fn shutdown(&mut self) {
        if !self.closing {
            debug!("shutting down generation, {} tasks in flight", self.terrain_tasks.len() + self.feature_tasks.len());
        }
        self.drain();
        self.closing = true;
    }

    /// Take the next queued chunk that still needs generation and dispatch its terrain
    /// generation. Returns false if the queue is empty.
    fn dispatch_next(&mut self) -> bool {
        while let Ok(pos) = self.queue_receiver.try_recv() {

            let Some(chunk) = self.store.get(pos) else {
                debug!("queued chunk {}/{} no longer exists", pos.x, pos.y);
                continue;
            };

            if chunk.stage() != ChunkStage::Empty {
                trace!("queued chunk {}/{} already dispatched", pos.x, pos.y);
                continue;
            }

            self.spawn_terrain(chunk);
            return true;

        }
        false
    }

    fn spawn_terrain(&mut self, chunk: Arc<Chunk>) {

        let pos = chunk.pos();
        chunk.set_stage(ChunkStage::Generating);

        let generator = Arc::clone(&self.generator);
        let task_chunk = Arc::clone(&chunk);

        let res = thread::Builder::new()
            .name(format!("Chunk Terrain {}/{}", pos.x, pos.y))
            .spawn(move || {
                let data = generator.generate(task_chunk.pos());
                task_chunk.publish_generated(data);
            });

        match res {
            Ok(handle) => {
                trace!("dispatch terrain: {}/{}", pos.x, pos.y);
                self.terrain_tasks.push(Task { chunk, handle, start: Instant::now() });
            }
            Err(err) => {
                warn!("failed to spawn terrain task of chunk {}/{}: {err}", pos.x, pos.y);
                self.fail_stage(chunk, Stage::Terrain);
            }
        }

    }

    fn spawn_features(&mut self, chunk: Arc<Chunk>) {

        let pos = chunk.pos();
        chunk.set_stage(ChunkStage::PostGenerating);

        let generator = Arc::clone(&self.generator);
        let store = Arc::clone(&self.store);
        let queue_sender = self.queue_sender.clone();
        let task_chunk = Arc::clone(&chunk);

        let res = thread::Builder::new()
            .name(format!("Chunk Features {}/{}", pos.x, pos.y))
            .spawn(move || {
                let ctx = GenContext::new(&store, &queue_sender);
                generator.post_generate(&task_chunk, &ctx)
            });

        match res {
            Ok(handle) => {
                trace!("dispatch post generation: {}/{}", pos.x, pos.y);
                self.feature_tasks.push(Task { chunk, handle, start: Instant::now() });
            }
            Err(err) => {
                warn!("failed to spawn post generation task of chunk {}/{}: {err}", pos.x, pos.y);
                self.fail_stage(chunk, Stage::Features);
            }
        }

    }

    /// Harvest finished terrain tasks, starting the post generation of each chunk.
    fn poll_terrain(&mut self) {
        for task in take_finished(&mut self.terrain_tasks) {

            let pos = task.chunk.pos();
            let elapsed = task.start.elapsed();

            match task.handle.join() {
                Ok(()) => {
                    self.stats.terrain_time.push(elapsed.as_secs_f32() * 1000.0, AVERAGE_FACTOR);
                    self.stats.generated_count += 1;
                    task.chunk.reset_failures();
                    if !self.closing {
                        self.spawn_features(task.chunk);
                    }
                }
                Err(payload) => {
                    error!("terrain task of chunk {}/{} panicked: {}", pos.x, pos.y, panic_message(&payload));
                    self.fail_stage(task.chunk, Stage::Terrain);
                }
            }

        }
    }

    /// Harvest finished post generation tasks, returning every chunk to push.
    fn poll_features(&mut self) -> Vec<ChunkPos> {

        let mut loaded = Vec::new();

        for task in take_finished(&mut self.feature_tasks) {

            let pos = task.chunk.pos();
            let elapsed = task.start.elapsed();

            match task.handle.join() {
                Ok(Ok(touched)) => {

                    self.stats.features_time.push(elapsed.as_secs_f32() * 1000.0, AVERAGE_FACTOR);
                    self.stats.loaded_count += 1;
                    debug!("chunk {}/{} fully loaded in {elapsed:?}, touched {} chunks", pos.x, pos.y, touched.len());

                    for chunk in touched.into_chunks() {
                        chunk.lock().sort_order();
                        // Neighbors touched by a worm are only loaded once their own
                        // post generation completes.
                        if Arc::ptr_eq(&chunk, &task.chunk) {
                            chunk.set_stage(ChunkStage::FullyLoaded);
                        }
                        if chunk.is_fully_loaded() {
                            loaded.push(chunk.pos());
                        }
                    }

                }
                Ok(Err(err)) => {
                    warn!("post generation of chunk {}/{} failed: {err}", pos.x, pos.y);
                    self.fail_stage(task.chunk, Stage::Features);
                }
                Err(payload) => {
                    error!("post generation task of chunk {}/{} panicked: {}", pos.x, pos.y, panic_message(&payload));
                    self.fail_stage(task.chunk, Stage::Features);
                }
            }

        }

        loaded

    }

    /// Handle a failed stage of a chunk, the stage is retried until the number of
    /// attempts is reached, then the chunk is permanently failed.
    fn fail_stage(&mut self, chunk: Arc<Chunk>, stage: Stage) {

        let pos = chunk.pos();
        let failures = chunk.record_failure();

        if !self.closing && failures < self.max_attempts {
            warn!("retrying {stage} of chunk {}/{} ({failures}/{} failed)", pos.x, pos.y, self.max_attempts);
            match stage {
                Stage::Terrain => {
                    chunk.set_stage(ChunkStage::Empty);
                    self.enqueue(pos);
                }
                Stage::Features => {
                    chunk.set_stage(ChunkStage::Generated);
                    self.spawn_features(chunk);
                }
            }
            return;
        }

        error!("{stage} of chunk {}/{} permanently failed after {failures} attempts", pos.x, pos.y);
        self.stats.failed_count += 1;
        match stage {
            Stage::Terrain => chunk.fail(),
            Stage::Features => chunk.fail_post(),
        }

    }

}

impl<G: ChunkGenerator> Drop for GenScheduler<G> {
    fn drop(&mut self) {
        self.shutdown();
    }
}


/// Remove and return every finished task.
fn take_finished<T>(tasks: &mut Vec<Task<T>>) -> Vec<Task<T>> {
    let mut finished = Vec::new();
    let mut i = 0;
    while i < tasks.len() {
        if tasks[i].handle.is_finished() {
            finished.push(tasks.swap_remove(i));
        } else {
            i += 1;
        }
    }
    finished
}

/// Get a printable message of a panic payload.
fn panic_message(payload: &Box<dyn Any + Send>) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "<unknown>"
    }
}


#[cfg(test)]
mod tests {

    use std::sync::atomic::{AtomicU32, Ordering};

    use glam::IVec2;

    use crate::block::BlockKind;
    use crate::chunk::ChunkData;
    use crate::config::TerrainConfig;
    use crate::util::noise::ConstNoise;
    use crate::worldgen::TerrainGenerator;

    use super::*;

    fn config() -> TerrainConfig {
        TerrainConfig {
            chunk_size: 8,
            block_size: 16,
            ..TerrainConfig::default()
        }
    }

    fn store(config: &TerrainConfig) -> Arc<ChunkStore> {
        Arc::new(ChunkStore::new(config.chunk_size, config.block_size, Arc::new(())))
    }

    /// Tick the scheduler until the condition is met, panicking after a timeout.
    fn tick_until<G: ChunkGenerator>(scheduler: &mut GenScheduler<G>, mut cond: impl FnMut(&[ChunkPos]) -> bool) {
        let start = Instant::now();
        loop {
            let loaded = scheduler.tick();
            if cond(&loaded) {
                return;
            }
            assert!(start.elapsed() < Duration::from_secs(20), "timed out");
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// A generator failing the terrain of a chunk a given number of times.
    struct FaultyGenerator {
        inner: TerrainGenerator<ConstNoise>,
        fail_pos: ChunkPos,
        fail_count: u32,
        failures: AtomicU32,
        fail_post: bool,
    }

    impl FaultyGenerator {
        fn new(fail_pos: ChunkPos, fail_count: u32, fail_post: bool) -> Self {
            Self {
                inner: TerrainGenerator::with_noise(config(), ConstNoise(0.0), ConstNoise(0.0)),
                fail_pos,
                fail_count,
                failures: AtomicU32::new(0),
                fail_post,
            }
        }
    }

    impl ChunkGenerator for FaultyGenerator {

        fn generate(&self, pos: ChunkPos) -> ChunkData {
            if !self.fail_post && pos == self.fail_pos && self.failures.fetch_add(1, Ordering::Relaxed) < self.fail_count {
                panic!("terrain failure");
            }
            self.inner.generate(pos)
        }

        fn post_generate(&self, chunk: &Arc<Chunk>, ctx: &GenContext) -> Result<TouchedChunks, GenError> {
            if self.fail_post && chunk.pos() == self.fail_pos && self.failures.fetch_add(1, Ordering::Relaxed) < self.fail_count {
                return Err(GenError::Shutdown);
            }
            self.inner.post_generate(chunk, ctx)
        }

    }

    #[test]
    fn full_pipeline() {

        let config = TerrainConfig { seed: 42, ..config() };
        let store = store(&config);
        let generator = Arc::new(TerrainGenerator::new(config));
        let mut scheduler = GenScheduler::new(generator, Arc::clone(&store), 3);

        let chunk = store.create(IVec2::new(0, -1)).unwrap();
        scheduler.enqueue(chunk.pos());
        tick_until(&mut scheduler, |_| chunk.is_fully_loaded());

        let data = chunk.lock();
        let sum: u32 = data.counts().iter().sum();
        assert_eq!(sum, 64);
        for pair in data.order().windows(2) {
            assert!(data.blocks()[pair[0] as usize].kind <= data.blocks()[pair[1] as usize].kind);
        }
        drop(data);

        scheduler.shutdown();
        assert!(scheduler.is_idle());
        assert_eq!(scheduler.stats().loaded_count as usize, store.positions().iter()
            .filter(|&&pos| store.get(pos).unwrap().is_fully_loaded())
            .count());

    }

    #[test]
    fn harvest_reports_loaded() {
        let config = config();
        let store = store(&config);
        let generator = Arc::new(TerrainGenerator::with_noise(config, ConstNoise(0.0), ConstNoise(0.0)));
        let mut scheduler = GenScheduler::new(generator, Arc::clone(&store), 3);
        store.create(IVec2::ZERO).unwrap();
        scheduler.enqueue(IVec2::ZERO);
        let mut reported = false;
        tick_until(&mut scheduler, |loaded| {
            reported |= loaded.contains(&IVec2::ZERO);
            reported
        });
        assert_eq!(store.get(IVec2::ZERO).unwrap().stage(), ChunkStage::FullyLoaded);
    }

    #[test]
    fn duplicate_enqueue_dispatched_once() {
        let config = config();
        let store = store(&config);
        let generator = Arc::new(TerrainGenerator::with_noise(config, ConstNoise(0.0), ConstNoise(0.0)));
        let mut scheduler = GenScheduler::new(generator, Arc::clone(&store), 3);
        store.create(IVec2::ZERO).unwrap();
        scheduler.enqueue(IVec2::ZERO);
        scheduler.enqueue(IVec2::ZERO);
        scheduler.enqueue(IVec2::new(9, 9)); // Not in the store.
        scheduler.shutdown();
        assert_eq!(scheduler.stats().generated_count, 1);
        assert_eq!(store.get(IVec2::ZERO).unwrap().stage(), ChunkStage::Generated);
    }

    #[test]
    fn terrain_panic_retried() {
        let store = store(&config());
        let generator = Arc::new(FaultyGenerator::new(IVec2::ZERO, 1, false));
        let mut scheduler = GenScheduler::new(generator, Arc::clone(&store), 3);
        let chunk = store.create(IVec2::ZERO).unwrap();
        scheduler.enqueue(IVec2::ZERO);
        tick_until(&mut scheduler, |_| chunk.is_fully_loaded());
        assert_eq!(scheduler.stats().failed_count, 0);
    }

    #[test]
    fn terrain_panic_fails_permanently() {

        let store = store(&config());
        let generator = Arc::new(FaultyGenerator::new(IVec2::ZERO, u32::MAX, false));
        let mut scheduler = GenScheduler::new(Arc::clone(&generator), Arc::clone(&store), 3);
        let chunk = store.create(IVec2::ZERO).unwrap();
        scheduler.enqueue(IVec2::ZERO);
        tick_until(&mut scheduler, |_| chunk.stage() == ChunkStage::Failed);

        assert_eq!(chunk.failures(), 3);
        assert_eq!(generator.failures.load(Ordering::Relaxed), 3);
        assert_eq!(scheduler.stats().failed_count, 1);
        assert!(chunk.wait_generated().is_err());
        // The tick loop survives.
        scheduler.tick();

    }

    #[test]
    fn post_generation_error_retried() {
        let store = store(&config());
        let generator = Arc::new(FaultyGenerator::new(IVec2::ZERO, 2, true));
        let mut scheduler = GenScheduler::new(generator, Arc::clone(&store), 3);
        let chunk = store.create(IVec2::ZERO).unwrap();
        scheduler.enqueue(IVec2::ZERO);
        tick_until(&mut scheduler, |_| chunk.is_fully_loaded());
        assert_eq!(chunk.failures(), 2);
    }

    /// A generator where every chunk but one reaches into that neighbor during post
    /// generation, as a crossing worm does, the neighbor's post generation fails.
    struct NeighborGenerator {
        inner: FaultyGenerator,
        neighbor: ChunkPos,
    }

    impl ChunkGenerator for NeighborGenerator {

        fn generate(&self, pos: ChunkPos) -> ChunkData {
            self.inner.generate(pos)
        }

        fn post_generate(&self, chunk: &Arc<Chunk>, ctx: &GenContext) -> Result<TouchedChunks, GenError> {
            let mut touched = self.inner.post_generate(chunk, ctx)?;
            if chunk.pos() != self.neighbor {
                touched.insert(&ctx.acquire(self.neighbor)?);
            }
            Ok(touched)
        }

    }

    #[test]
    fn post_generation_failure_stays_local() {

        let neighbor_pos = IVec2::X;
        let store = store(&config());
        let generator = Arc::new(NeighborGenerator {
            inner: FaultyGenerator::new(neighbor_pos, u32::MAX, true),
            neighbor: neighbor_pos,
        });
        let mut scheduler = GenScheduler::new(generator, Arc::clone(&store), 3);

        let neighbor = store.create(neighbor_pos).unwrap();
        scheduler.enqueue(neighbor_pos);
        tick_until(&mut scheduler, |_| neighbor.stage() == ChunkStage::PostFailed);
        assert_eq!(neighbor.lock().count(BlockKind::Grass), 8);
        assert_eq!(scheduler.stats().failed_count, 1);

        let chunk = store.create(IVec2::ZERO).unwrap();
        scheduler.enqueue(IVec2::ZERO);
        tick_until(&mut scheduler, |_| chunk.stage() >= ChunkStage::FullyLoaded);

        assert_eq!(chunk.stage(), ChunkStage::FullyLoaded);
        assert_eq!(neighbor.stage(), ChunkStage::PostFailed);
        assert_eq!(scheduler.stats().failed_count, 1);

    }

    #[test]
    fn worms_crossing_chunks_complete() {

        // Every surface chunk is a worm head and worms go straight up, creating and
        // waiting on many chunks that are only dispatched one per tick.
        let config = config();
        let store = store(&config);
        let generator = Arc::new(TerrainGenerator::with_noise(config, ConstNoise(0.8), ConstNoise(0.0)));
        let mut scheduler = GenScheduler::new(generator, Arc::clone(&store), 3);

        let chunk = store.create(IVec2::ZERO).unwrap();
        scheduler.enqueue(IVec2::ZERO);
        tick_until(&mut scheduler, |_| chunk.is_fully_loaded());

        assert!(chunk.lock().count(BlockKind::Air) > 0);
        assert!(store.len() > 4);
        assert!(store.contains(IVec2::new(0, 5)));

        scheduler.shutdown();
        assert!(scheduler.is_idle());
        for pos in store.positions() {
            let stage = store.get(pos).unwrap().stage();
            assert!(stage.is_generated(), "{pos}: {stage:?}");
        }

    }

    #[test]
    fn drop_joins_tasks() {
        let config = config();
        let store = store(&config);
        let generator = Arc::new(TerrainGenerator::with_noise(config, ConstNoise(0.8), ConstNoise(0.0)));
        let mut scheduler = GenScheduler::new(generator, Arc::clone(&store), 3);
        for x in 0..4 {
            store.create(IVec2::new(x, 0)).unwrap();
            scheduler.enqueue(IVec2::new(x, 0));
        }
        for _ in 0..3 {
            scheduler.tick();
        }
        drop(scheduler);
        for pos in store.positions() {
            assert!(store.get(pos).unwrap().stage().is_generated());
        }
        // Only the store keeps the chunks.
        for chunk in store.clear() {
            assert_eq!(Arc::strong_count(&chunk), 1);
        }
    }

}
