//! Background generation of per-patch heightmaps and textures.
//!
//! The main thread submits jobs into a priority queue (nearest first, then
//! coarsest first). `pump` hands at most `max_in_flight` of them to a pool of
//! named worker threads; `drain` collects finished jobs once per frame. Workers
//! only see the job request and never touch the quadtree or the stores.
//!
//! With `worker_threads = Some(0)` no threads are spawned and `pump` runs the
//! dispatched jobs inline, which keeps frame counts deterministic in tests.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use dashmap::DashMap;
use orrery_config::{HeightmapConfig, PipelineConfig};
use orrery_surface::{GeometrySurface, PatchId};
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::heightmap::{HeightmapTile, generate_heightmap};
use crate::texture::{TextureSource, TextureTile};
use crate::{DataJobError, HeightSource, PipelineError};

/// What a job produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JobKind {
    Heightmap,
    Texture,
}

/// A job is identified by its patch and kind; duplicates coalesce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobKey {
    pub id: PatchId,
    pub kind: JobKind,
}

impl JobKey {
    #[must_use]
    pub fn heightmap(id: PatchId) -> Self {
        Self {
            id,
            kind: JobKind::Heightmap,
        }
    }

    #[must_use]
    pub fn texture(id: PatchId) -> Self {
        Self {
            id,
            kind: JobKind::Texture,
        }
    }
}

/// Scheduling order: ascending distance, ties by ascending lod.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JobPriority {
    pub distance: f64,
    pub lod: u8,
}

impl JobPriority {
    #[must_use]
    pub fn new(distance: f64, lod: u8) -> Self {
        Self { distance, lod }
    }

    fn urgency_cmp(&self, other: &Self) -> CmpOrdering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.lod.cmp(&other.lod))
    }
}

/// Everything a worker needs to run one job.
#[derive(Debug)]
pub struct JobRequest {
    pub key: JobKey,
    pub priority: JobPriority,
    /// 0 for the first try, 1 for the retry.
    pub attempt: u32,
    /// Scratch buffer recycled from an evicted tile, filled by heightmap jobs.
    pub buffer: Vec<f32>,
}

impl JobRequest {
    #[must_use]
    pub fn new(key: JobKey, priority: JobPriority, buffer: Vec<f32>) -> Self {
        Self {
            key,
            priority,
            attempt: 0,
            buffer,
        }
    }
}

/// Data produced by a job.
#[derive(Debug)]
pub enum JobPayload {
    Heightmap(HeightmapTile),
    Texture(TextureTile),
}

/// Turns job requests into tile data. Runs on worker threads.
pub trait TileGenerator: Send + Sync {
    fn generate(&self, request: JobRequest) -> Result<JobPayload, DataJobError>;
}

/// Heightmaps from a procedural source, textures from an optional texture source.
pub struct ProceduralGenerator<S> {
    surface: S,
    heights: Arc<dyn HeightSource>,
    texture: Option<Arc<dyn TextureSource>>,
    config: HeightmapConfig,
}

impl<S: GeometrySurface> ProceduralGenerator<S> {
    pub fn new(
        surface: S,
        heights: Arc<dyn HeightSource>,
        texture: Option<Arc<dyn TextureSource>>,
        config: HeightmapConfig,
    ) -> Self {
        Self {
            surface,
            heights,
            texture,
            config,
        }
    }
}

impl<S: GeometrySurface> TileGenerator for ProceduralGenerator<S> {
    fn generate(&self, request: JobRequest) -> Result<JobPayload, DataJobError> {
        let id = request.key.id;
        match request.key.kind {
            JobKind::Heightmap => Ok(JobPayload::Heightmap(generate_heightmap(
                &self.surface,
                self.heights.as_ref(),
                &id,
                &self.config,
                request.buffer,
            ))),
            JobKind::Texture => match &self.texture {
                Some(source) => source.load(&id).map(JobPayload::Texture),
                None => Err(DataJobError::TextureUnavailable {
                    id,
                    reason: "no texture source".to_string(),
                }),
            },
        }
    }
}

/// A finished job, as seen by the main thread.
#[derive(Debug)]
pub enum Completion {
    Ready {
        key: JobKey,
        payload: JobPayload,
        elapsed: Duration,
    },
    /// Final failure; the patch keeps its fallback data for good.
    Failed { key: JobKey, error: DataJobError },
}

/// Counters for logging and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub submitted: u64,
    pub coalesced: u64,
    pub dispatched: u64,
    pub completed: u64,
    pub failed: u64,
    pub retried: u64,
    pub cancelled: u64,
    pub slow: u64,
}

/// Outcome of [`AsyncDataPipeline::submit`].
#[derive(Debug)]
pub enum SubmitOutcome {
    /// New job queued.
    Queued,
    /// The job already existed; its priority was refreshed. The unused buffer comes back.
    Coalesced(Vec<f32>),
}

struct Dispatched {
    request: JobRequest,
    cancelled: Arc<AtomicBool>,
}

struct WorkerResult {
    key: JobKey,
    priority: JobPriority,
    attempt: u32,
    cancelled: Arc<AtomicBool>,
    outcome: Result<JobPayload, DataJobError>,
    elapsed: Duration,
}

/// Heap entry. Requests live in `queued` tagged with the sequence number of
/// their latest entry; any other entry for the key is stale and skipped.
struct HeapEntry {
    priority: JobPriority,
    seq: u64,
    key: JobKey,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Max-heap: the most urgent entry must compare greatest.
        other
            .priority
            .urgency_cmp(&self.priority)
            .then(other.seq.cmp(&self.seq))
    }
}

enum Executor {
    Inline {
        results: Vec<WorkerResult>,
    },
    Workers {
        task_sender: Option<Sender<Dispatched>>,
        result_receiver: Receiver<WorkerResult>,
        handles: Vec<JoinHandle<()>>,
    },
}

/// Prioritized, cancellable, retrying job queue in front of a worker pool.
pub struct AsyncDataPipeline {
    generator: Arc<dyn TileGenerator>,
    executor: Executor,
    heap: BinaryHeap<HeapEntry>,
    queued: FxHashMap<JobKey, (u64, JobRequest)>,
    active: Arc<DashMap<JobKey, Arc<AtomicBool>>>,
    retries: Vec<(Instant, JobRequest)>,
    in_flight: Arc<AtomicU64>,
    next_seq: u64,
    max_in_flight: usize,
    retry_backoff: Duration,
    slow_tile: Duration,
    stats: PipelineStats,
}

impl AsyncDataPipeline {
    /// Spawn the worker pool described by `config`.
    pub fn new(
        config: &PipelineConfig,
        generator: Arc<dyn TileGenerator>,
    ) -> Result<Self, PipelineError> {
        let threads = match config.worker_threads {
            Some(n) => n,
            None => num_cpus::get().saturating_sub(2).max(1),
        };
        let max_in_flight = config.max_in_flight.max(1);
        let in_flight = Arc::new(AtomicU64::new(0));

        let executor = if threads == 0 {
            Executor::Inline {
                results: Vec::new(),
            }
        } else {
            let (task_tx, task_rx) = bounded::<Dispatched>(max_in_flight);
            let (result_tx, result_rx) = unbounded::<WorkerResult>();
            let mut handles = Vec::with_capacity(threads);
            for index in 0..threads {
                let rx = task_rx.clone();
                let tx = result_tx.clone();
                let generator = Arc::clone(&generator);
                let flight = Arc::clone(&in_flight);
                let handle = std::thread::Builder::new()
                    .name(format!("orrery-data-{index}"))
                    .spawn(move || {
                        while let Ok(job) = rx.recv() {
                            if job.cancelled.load(Ordering::Relaxed) {
                                flight.fetch_sub(1, Ordering::Relaxed);
                                continue;
                            }
                            let result = run_job(generator.as_ref(), job);
                            if !result.cancelled.load(Ordering::Relaxed) {
                                let _ = tx.send(result);
                            }
                            flight.fetch_sub(1, Ordering::Relaxed);
                        }
                    })
                    .map_err(PipelineError::WorkerSpawn)?;
                handles.push(handle);
            }
            debug!(threads, max_in_flight, "data pipeline started");
            Executor::Workers {
                task_sender: Some(task_tx),
                result_receiver: result_rx,
                handles,
            }
        };

        Ok(Self {
            generator,
            executor,
            heap: BinaryHeap::new(),
            queued: FxHashMap::default(),
            active: Arc::new(DashMap::new()),
            retries: Vec::new(),
            in_flight,
            next_seq: 0,
            max_in_flight,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            slow_tile: Duration::from_millis(config.slow_tile_ms),
            stats: PipelineStats::default(),
        })
    }

    /// Queue a job, or refresh the priority of an identical queued job.
    pub fn submit(&mut self, request: JobRequest) -> SubmitOutcome {
        let key = request.key;
        if self.active.contains_key(&key) || self.retries.iter().any(|(_, r)| r.key == key) {
            self.stats.coalesced += 1;
            return SubmitOutcome::Coalesced(request.buffer);
        }
        let seq = self.next_seq;
        if let Some((latest, queued)) = self.queued.get_mut(&key) {
            *latest = seq;
            queued.priority = request.priority;
            self.heap.push(HeapEntry {
                priority: request.priority,
                seq,
                key,
            });
            self.next_seq += 1;
            self.stats.coalesced += 1;
            return SubmitOutcome::Coalesced(request.buffer);
        }
        self.stats.submitted += 1;
        self.enqueue(request);
        SubmitOutcome::Queued
    }

    fn enqueue(&mut self, request: JobRequest) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(HeapEntry {
            priority: request.priority,
            seq,
            key: request.key,
        });
        self.queued.insert(request.key, (seq, request));
    }

    /// Cancel one job wherever it is: queued, waiting for retry, or running.
    pub fn cancel(&mut self, key: &JobKey) {
        self.cancel_where(|k| k == key);
    }

    /// Cancel every job of a patch.
    pub fn cancel_patch(&mut self, id: &PatchId) {
        self.cancel_where(|k| k.id == *id);
    }

    /// Cancel every job of a patch and all of its descendants.
    pub fn cancel_subtree(&mut self, id: &PatchId) {
        self.cancel_where(|k| id.is_ancestor_of(&k.id));
    }

    fn cancel_where(&mut self, matches: impl Fn(&JobKey) -> bool) {
        let before = self.queued.len() + self.retries.len();
        self.queued.retain(|k, _| !matches(k));
        self.retries.retain(|(_, r)| !matches(&r.key));
        let mut cancelled = (before - self.queued.len() - self.retries.len()) as u64;

        let running: Vec<JobKey> = self
            .active
            .iter()
            .filter(|e| matches(e.key()))
            .map(|e| *e.key())
            .collect();
        for key in running {
            if let Some((_, flag)) = self.active.remove(&key) {
                flag.store(true, Ordering::Relaxed);
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            self.stats.cancelled += cancelled;
            debug!(cancelled, "cancelled data jobs");
        }
    }

    /// Move due retries back into the queue and dispatch up to the in-flight limit.
    ///
    /// Inline pipelines execute the dispatched jobs here; results surface on the
    /// next [`drain`](Self::drain).
    pub fn pump(&mut self) {
        let now = Instant::now();
        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.retries)
            .into_iter()
            .partition(|(at, _)| *at <= now);
        self.retries = waiting;
        for (_, request) in due {
            self.enqueue(request);
        }

        let mut dispatched_now = 0usize;
        while self.capacity_left(dispatched_now) {
            let Some(entry) = self.heap.pop() else {
                break;
            };
            let fresh = self
                .queued
                .get(&entry.key)
                .is_some_and(|(latest, _)| *latest == entry.seq);
            if !fresh {
                continue;
            }
            let Some((_, request)) = self.queued.remove(&entry.key) else {
                continue;
            };
            let cancelled = Arc::new(AtomicBool::new(false));
            self.active.insert(request.key, Arc::clone(&cancelled));
            self.stats.dispatched += 1;
            dispatched_now += 1;

            match &mut self.executor {
                Executor::Inline { results } => {
                    results.push(run_job(
                        self.generator.as_ref(),
                        Dispatched { request, cancelled },
                    ));
                }
                Executor::Workers { task_sender, .. } => {
                    let Some(sender) = task_sender else {
                        break;
                    };
                    self.in_flight.fetch_add(1, Ordering::Relaxed);
                    if let Err(e) = sender.try_send(Dispatched { request, cancelled }) {
                        self.in_flight.fetch_sub(1, Ordering::Relaxed);
                        let job = e.into_inner();
                        self.active.remove(&job.request.key);
                        self.stats.dispatched -= 1;
                        self.enqueue(job.request);
                        break;
                    }
                }
            }
        }
    }

    fn capacity_left(&self, dispatched_now: usize) -> bool {
        match self.executor {
            Executor::Inline { .. } => dispatched_now < self.max_in_flight,
            Executor::Workers { .. } => {
                (self.in_flight.load(Ordering::Relaxed) as usize) < self.max_in_flight
            }
        }
    }

    /// Collect finished jobs. Call once per frame, before the quadtree update.
    ///
    /// Retryable failures on the first attempt are rescheduled after an
    /// exponential backoff and do not appear here.
    pub fn drain(&mut self) -> Vec<Completion> {
        let results: Vec<WorkerResult> = match &mut self.executor {
            Executor::Inline { results } => std::mem::take(results),
            Executor::Workers {
                result_receiver, ..
            } => result_receiver.try_iter().collect(),
        };

        let mut out = Vec::with_capacity(results.len());
        for result in results {
            let current = self
                .active
                .get(&result.key)
                .is_some_and(|flag| Arc::ptr_eq(flag.value(), &result.cancelled));
            if !current || result.cancelled.load(Ordering::Relaxed) {
                continue;
            }
            self.active.remove(&result.key);

            if result.elapsed >= self.slow_tile {
                self.stats.slow += 1;
                warn!(
                    patch = %result.key.id,
                    kind = ?result.key.kind,
                    elapsed_ms = result.elapsed.as_millis() as u64,
                    "slow tile"
                );
            }

            match result.outcome {
                Ok(payload) => {
                    self.stats.completed += 1;
                    out.push(Completion::Ready {
                        key: result.key,
                        payload,
                        elapsed: result.elapsed,
                    });
                }
                Err(error) if error.is_retryable() && result.attempt == 0 => {
                    let delay = self.retry_backoff * 2u32.pow(result.attempt);
                    warn!(patch = %result.key.id, %error, ?delay, "data job failed, retrying");
                    self.stats.retried += 1;
                    let mut retry = JobRequest::new(result.key, result.priority, Vec::new());
                    retry.attempt = result.attempt + 1;
                    self.retries.push((Instant::now() + delay, retry));
                }
                Err(error) => {
                    warn!(patch = %result.key.id, %error, "data job failed, keeping fallback");
                    self.stats.failed += 1;
                    out.push(Completion::Failed {
                        key: result.key,
                        error,
                    });
                }
            }
        }
        out
    }

    /// True if the job is queued, waiting for a retry, or running.
    #[must_use]
    pub fn is_pending(&self, key: &JobKey) -> bool {
        self.queued.contains_key(key)
            || self.active.contains_key(key)
            || self.retries.iter().any(|(_, r)| r.key == *key)
    }

    /// Jobs not yet finished, in any state.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.queued.len() + self.active.len() + self.retries.len()
    }

    #[must_use]
    pub fn is_inline(&self) -> bool {
        matches!(self.executor, Executor::Inline { .. })
    }

    #[must_use]
    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Stop the workers: close the task channel and join the threads.
    pub fn shutdown(&mut self) {
        if let Executor::Workers {
            task_sender,
            handles,
            ..
        } = &mut self.executor
        {
            task_sender.take();
            for handle in handles.drain(..) {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for AsyncDataPipeline {
    fn drop(&mut self) {
        for entry in self.active.iter() {
            entry.value().store(true, Ordering::Relaxed);
        }
        self.shutdown();
    }
}

fn run_job(generator: &dyn TileGenerator, job: Dispatched) -> WorkerResult {
    let key = job.request.key;
    let priority = job.request.priority;
    let attempt = job.request.attempt;
    let start = Instant::now();
    let outcome = generator.generate(job.request);
    WorkerResult {
        key,
        priority,
        attempt,
        cancelled: job.cancelled,
        outcome,
        elapsed: start.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orrery_surface::{NormalizedCube, Quadrant, ShapeFamily};
    use std::sync::Mutex;
    use std::sync::atomic::AtomicU32;

    use crate::ConstantHeight;

    fn small_heightmap() -> HeightmapConfig {
        HeightmapConfig {
            size: 5,
            border: 1,
            ..Default::default()
        }
    }

    fn procedural() -> Arc<dyn TileGenerator> {
        Arc::new(ProceduralGenerator::new(
            NormalizedCube,
            Arc::new(ConstantHeight(0.5)),
            None,
            small_heightmap(),
        ))
    }

    fn inline_config(max_in_flight: usize) -> PipelineConfig {
        PipelineConfig {
            worker_threads: Some(0),
            max_in_flight,
            retry_backoff_ms: 0,
            slow_tile_ms: 60_000,
        }
    }

    fn id(face: u8) -> PatchId {
        PatchId::root(ShapeFamily::NormalizedCube, face)
    }

    fn request(id: PatchId, distance: f64) -> JobRequest {
        JobRequest::new(
            JobKey::heightmap(id),
            JobPriority::new(distance, id.lod),
            Vec::new(),
        )
    }

    /// Records the order in which jobs run.
    struct Recorder(Mutex<Vec<PatchId>>);

    impl TileGenerator for Recorder {
        fn generate(&self, request: JobRequest) -> Result<JobPayload, DataJobError> {
            if let Ok(mut order) = self.0.lock() {
                order.push(request.key.id);
            }
            Ok(JobPayload::Heightmap(HeightmapTile::from_data(2, 0, vec![0.0; 4])))
        }
    }

    /// Fails the first `failures` attempts for every job.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    impl TileGenerator for Flaky {
        fn generate(&self, request: JobRequest) -> Result<JobPayload, DataJobError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(DataJobError::DataJobFailure {
                    id: request.key.id,
                    reason: format!("attempt {n}"),
                });
            }
            Ok(JobPayload::Heightmap(HeightmapTile::from_data(2, 0, vec![1.0; 4])))
        }
    }

    #[test]
    fn test_inline_job_completes_on_next_drain() {
        let mut p = AsyncDataPipeline::new(&inline_config(4), procedural()).unwrap();
        assert!(p.is_inline());
        assert!(matches!(p.submit(request(id(0), 1.0)), SubmitOutcome::Queued));
        assert!(p.drain().is_empty(), "nothing runs before pump");
        p.pump();
        let done = p.drain();
        assert_eq!(done.len(), 1);
        match &done[0] {
            Completion::Ready {
                key,
                payload: JobPayload::Heightmap(tile),
                ..
            } => {
                assert_eq!(key.id, id(0));
                assert_eq!(tile.stride(), 7);
            }
            other => panic!("unexpected completion {other:?}"),
        }
        assert_eq!(p.pending_count(), 0);
    }

    #[test]
    fn test_priority_distance_then_lod() {
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let mut p = AsyncDataPipeline::new(&inline_config(8), recorder.clone()).unwrap();
        let coarse = id(1);
        let fine = coarse.child(Quadrant::TopLeft);
        p.submit(request(id(0), 10.0));
        p.submit(request(fine, 2.0));
        p.submit(request(coarse, 2.0));
        p.submit(request(id(2), 0.5));
        p.pump();
        let order = recorder.0.lock().unwrap().clone();
        assert_eq!(order, vec![id(2), coarse, fine, id(0)]);
    }

    #[test]
    fn test_resubmission_coalesces_and_reprioritizes() {
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let mut p = AsyncDataPipeline::new(&inline_config(1), recorder.clone()).unwrap();
        p.submit(request(id(0), 1.0));
        p.submit(request(id(1), 5.0));
        let again = p.submit(request(id(1), 0.1));
        assert!(matches!(again, SubmitOutcome::Coalesced(_)));
        assert_eq!(p.stats().coalesced, 1);
        assert_eq!(p.pending_count(), 2);

        p.pump();
        assert_eq!(recorder.0.lock().unwrap().as_slice(), &[id(1)]);
        p.pump();
        assert_eq!(recorder.0.lock().unwrap().as_slice(), &[id(1), id(0)]);
        assert_eq!(p.drain().len(), 2);
    }

    #[test]
    fn test_max_in_flight_bounds_inline_work() {
        let mut p = AsyncDataPipeline::new(&inline_config(2), procedural()).unwrap();
        for face in 0..5 {
            p.submit(request(id(face), f64::from(face)));
        }
        p.pump();
        assert_eq!(p.drain().len(), 2);
        p.pump();
        p.pump();
        assert_eq!(p.drain().len(), 3);
    }

    #[test]
    fn test_cancel_queued_job() {
        let mut p = AsyncDataPipeline::new(&inline_config(4), procedural()).unwrap();
        p.submit(request(id(0), 1.0));
        p.submit(request(id(1), 1.0));
        p.cancel_patch(&id(0));
        assert!(!p.is_pending(&JobKey::heightmap(id(0))));
        p.pump();
        let done = p.drain();
        assert_eq!(done.len(), 1);
        assert_eq!(p.stats().cancelled, 1);
    }

    #[test]
    fn test_cancel_subtree_after_dispatch() {
        let mut p = AsyncDataPipeline::new(&inline_config(4), procedural()).unwrap();
        let root = id(3);
        for q in Quadrant::ALL {
            p.submit(request(root.child(q), 1.0));
        }
        p.submit(request(id(4), 1.0));
        // Equal distance: the coarser root goes first, then three children fit.
        p.pump();
        p.cancel_subtree(&root);
        let done = p.drain();
        assert_eq!(done.len(), 1, "finished children are discarded once cancelled");
        assert_eq!(p.stats().cancelled, 4);
        assert_eq!(p.pending_count(), 0);
        p.pump();
        assert!(p.drain().is_empty());
    }

    #[test]
    fn test_failure_retried_once_then_succeeds() {
        let flaky = Arc::new(Flaky {
            failures: 1,
            calls: AtomicU32::new(0),
        });
        let mut p = AsyncDataPipeline::new(&inline_config(4), flaky).unwrap();
        p.submit(request(id(0), 1.0));
        p.pump();
        assert!(p.drain().is_empty(), "first failure is retried silently");
        assert_eq!(p.stats().retried, 1);
        p.pump();
        let done = p.drain();
        assert!(matches!(done.as_slice(), [Completion::Ready { .. }]));
    }

    #[test]
    fn test_second_failure_is_final() {
        let flaky = Arc::new(Flaky {
            failures: 10,
            calls: AtomicU32::new(0),
        });
        let mut p = AsyncDataPipeline::new(&inline_config(4), flaky).unwrap();
        p.submit(request(id(0), 1.0));
        p.pump();
        assert!(p.drain().is_empty());
        p.pump();
        let done = p.drain();
        assert!(matches!(
            done.as_slice(),
            [Completion::Failed {
                error: DataJobError::DataJobFailure { .. },
                ..
            }]
        ));
        assert_eq!(p.stats().failed, 1);
        assert_eq!(p.pending_count(), 0);
    }

    #[test]
    fn test_missing_texture_source_is_not_retried() {
        let mut p = AsyncDataPipeline::new(&inline_config(4), procedural()).unwrap();
        p.submit(JobRequest::new(
            JobKey::texture(id(0)),
            JobPriority::new(0.0, 0),
            Vec::new(),
        ));
        p.pump();
        let done = p.drain();
        assert!(matches!(
            done.as_slice(),
            [Completion::Failed {
                error: DataJobError::TextureUnavailable { .. },
                ..
            }]
        ));
        assert_eq!(p.stats().retried, 0);
    }

    #[test]
    fn test_worker_threads_deliver_all_jobs() {
        let config = PipelineConfig {
            worker_threads: Some(2),
            max_in_flight: 4,
            retry_backoff_ms: 0,
            slow_tile_ms: 60_000,
        };
        let mut p = AsyncDataPipeline::new(&config, procedural()).unwrap();
        assert!(!p.is_inline());
        for face in 0..6 {
            p.submit(request(id(face), f64::from(face)));
        }
        let mut received = 0;
        let deadline = Instant::now() + Duration::from_secs(30);
        while received < 6 && Instant::now() < deadline {
            p.pump();
            received += p.drain().len();
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(received, 6, "got {received}/6");
        assert_eq!(p.pending_count(), 0);
    }
}
