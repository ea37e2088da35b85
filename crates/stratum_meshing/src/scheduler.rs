//! # Extraction Scheduler
//!
//! Deduplicated work queue of mesh regions, drained by a fixed pool of
//! worker threads, with a bounded output queue towards the renderer.
//!
//! ## Region state machine
//!
//! ```text
//!            schedule               worker pops
//!   Idle ──────────────► Pending ──────────────► InFlight
//!    ▲                     ▲                        │
//!    │ failure             │ rescheduled while      │ done
//!    │                     │ in flight              ▼
//!    └─────────────────────┴───────────────────  Extracted
//!                        allow_reextraction ──► Idle
//! ```
//!
//! - `schedule` on a Pending or Extracted region is a no-op.
//! - `schedule` on an InFlight region flags it; when the pass completes the
//!   region goes straight back to Pending, so a write made during the pass
//!   is picked up by exactly one more pass.
//! - A region leaves InFlight only after its mesh was pushed to the output
//!   queue (or dropped because it was empty).
//! - Extracted entries stay in the region map until `allow_reextraction` or
//!   `reset`, so the map grows with every region ever meshed. Callers that
//!   stream an unbounded area release regions they unload.
//!
//! ## Sessions
//!
//! `reset` pauses scheduling, drops queued work and undelivered meshes, and
//! starts a new session. Passes still running for the old session finish
//! but their results are discarded. `resume` re-enables scheduling.
//!
//! ## Shutdown
//!
//! `shutdown` cancels the token, which wakes every worker blocked on the
//! pending queue or on a full output queue, then joins the pool.

use std::collections::hash_map::Entry as MapEntry;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use stratum_volume::{Region, VoxelVolume, WorldPos};
use tracing::{debug, error, info, trace, warn};

use crate::cancel::CancellationToken;
use crate::cubic::{QuadRules, SurfaceExtractor};
use crate::error::{ExtractionError, SchedulerError};
use crate::mesh::{ChunkMeshes, ExtractedMeshResult};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Capacity hints and limits for one extraction pass.
///
/// Mesh storage is reserved up front as `factor * width * depth` of the
/// region, which avoids regrowing the vertex buffers on typical terrain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Opaque vertices (and indices) reserved per column of the region.
    pub opaque_vertex_factor: usize,
    /// Water vertices (and indices) reserved per column of the region.
    pub water_vertex_factor: usize,
    /// Highest y that can produce water faces.
    pub water_height: i32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            opaque_vertex_factor: 16,
            water_vertex_factor: 1,
            water_height: 40,
        }
    }
}

impl ExtractionConfig {
    /// Opaque vertex reservation for a region.
    #[must_use]
    pub fn opaque_capacity(&self, region: &Region) -> usize {
        Self::columns(region) * self.opaque_vertex_factor
    }

    /// Water vertex reservation for a region.
    #[must_use]
    pub fn water_capacity(&self, region: &Region) -> usize {
        Self::columns(region) * self.water_vertex_factor
    }

    fn columns(region: &Region) -> usize {
        region.width_in_voxels() as usize * region.depth_in_voxels() as usize
    }
}

/// Largest region dimension the scheduler accepts.
pub const MAX_MESH_DIMENSION: u32 = 4096;

/// Half the logical cores, at least one.
#[must_use]
pub fn default_worker_count() -> usize {
    thread::available_parallelism().map_or(1, |n| (n.get() / 2).max(1))
}

/// Scheduler setup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Worker threads.
    pub workers: usize,
    /// Finished meshes held before workers block.
    pub output_capacity: usize,
    /// Region size (width, height, depth) in voxels.
    pub mesh_size: [u32; 3],
    /// Per-pass settings.
    pub extraction: ExtractionConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: default_worker_count(),
            output_capacity: 256,
            mesh_size: [32, 128, 32],
            extraction: ExtractionConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidConfig` for zero workers, a zero
    /// output capacity, or a region dimension outside
    /// `1..=MAX_MESH_DIMENSION`.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.workers == 0 {
            return Err(SchedulerError::InvalidConfig("at least one worker is required".into()));
        }
        if self.output_capacity == 0 {
            return Err(SchedulerError::InvalidConfig("output capacity must be positive".into()));
        }
        if self.mesh_size.iter().any(|d| !(1..=MAX_MESH_DIMENSION).contains(d)) {
            return Err(SchedulerError::InvalidConfig(format!(
                "mesh size {:?} must be within 1..={MAX_MESH_DIMENSION} on every axis",
                self.mesh_size
            )));
        }
        Ok(())
    }
}

// =============================================================================
// STATE
// =============================================================================

/// Observable state of a region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegionState {
    /// Not tracked.
    Idle,
    /// Queued for a worker.
    Pending,
    /// A worker is extracting it.
    InFlight,
    /// Mesh delivered; not extracted again until re-allowed.
    Extracted,
}

#[derive(Clone, Copy, Debug)]
enum Entry {
    Pending,
    InFlight { reschedule: bool },
    Extracted,
}

#[derive(Clone, Copy, Debug)]
struct Job {
    origin: WorldPos,
    session: u64,
}

struct Envelope {
    session: u64,
    result: ExtractedMeshResult,
}

/// Scheduler counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Regions tracked in any state (pending, in flight or extracted).
    pub tracked: usize,
    /// Jobs waiting in the pending queue.
    pub queued: usize,
    /// Passes currently running.
    pub in_flight: usize,
    /// Meshes waiting in the output queue.
    pub ready: usize,
    /// Successful `schedule` calls.
    pub scheduled: u64,
    /// Extra passes caused by writes during extraction.
    pub rescheduled: u64,
    /// Passes that finished successfully.
    pub completed: u64,
    /// Passes that failed.
    pub failed: u64,
    /// Successful passes whose meshes were empty.
    pub dropped_empty: u64,
}

#[derive(Default)]
struct Counters {
    scheduled: AtomicU64,
    rescheduled: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    dropped_empty: AtomicU64,
}

struct Shared {
    volume: VoxelVolume,
    extractor: Arc<dyn SurfaceExtractor>,
    rules: QuadRules,
    config: SchedulerConfig,
    regions: Mutex<HashMap<WorldPos, Entry>>,
    /// Signalled whenever a pass finishes or the region map is cleared.
    progress: Condvar,
    pending_tx: Sender<Job>,
    pending_rx: Receiver<Job>,
    output_tx: Sender<Envelope>,
    cancel: CancellationToken,
    session: AtomicU64,
    paused: AtomicBool,
    in_flight: AtomicUsize,
    counters: Counters,
}

impl Shared {
    #[inline]
    fn session(&self) -> u64 {
        self.session.load(Ordering::SeqCst)
    }

    fn run_worker(&self, index: usize) {
        let cancelled = self.cancel.receiver().clone();
        debug!(worker = index, "extraction worker started");

        loop {
            let job = select! {
                recv(self.pending_rx) -> job => match job {
                    Ok(job) => job,
                    Err(_) => break,
                },
                recv(cancelled) -> _ => break,
            };
            if self.cancel.is_cancelled() {
                break;
            }
            if !self.begin(job) {
                continue;
            }

            match self.extract(job.origin) {
                Ok(meshes) if meshes.is_empty() => {
                    self.counters.dropped_empty.fetch_add(1, Ordering::Relaxed);
                    self.finish(job, true);
                }
                Ok(meshes) => {
                    let envelope = Envelope {
                        session: job.session,
                        result: ExtractedMeshResult {
                            origin: job.origin,
                            meshes,
                        },
                    };
                    let delivered = self.push(envelope, &cancelled);
                    self.finish(job, delivered);
                    if !delivered {
                        break;
                    }
                }
                Err(e) => {
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(origin = %job.origin, error = %e, "mesh extraction failed");
                    self.finish(job, false);
                }
            }
        }

        debug!(worker = index, "extraction worker stopped");
    }

    /// Pending -> InFlight. False if the job is stale.
    fn begin(&self, job: Job) -> bool {
        let mut regions = self.regions.lock();
        if job.session != self.session() {
            return false;
        }
        match regions.get_mut(&job.origin) {
            Some(entry) if matches!(entry, Entry::Pending) => {
                *entry = Entry::InFlight { reschedule: false };
                self.in_flight.fetch_add(1, Ordering::SeqCst);
                true
            }
            _ => false,
        }
    }

    /// InFlight -> Extracted, Pending (flagged) or Idle (failed).
    fn finish(&self, job: Job, success: bool) {
        let mut regions = self.regions.lock();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if success {
            self.counters.completed.fetch_add(1, Ordering::Relaxed);
        }

        if job.session == self.session() && !self.cancel.is_cancelled() {
            match regions.get(&job.origin).copied() {
                Some(Entry::InFlight { reschedule: true }) => {
                    regions.insert(job.origin, Entry::Pending);
                    if self.pending_tx.send(job).is_ok() {
                        self.counters.rescheduled.fetch_add(1, Ordering::Relaxed);
                        trace!(origin = %job.origin, "region rescheduled after a write");
                    } else {
                        regions.remove(&job.origin);
                    }
                }
                Some(Entry::InFlight { .. }) if success => {
                    regions.insert(job.origin, Entry::Extracted);
                }
                Some(Entry::InFlight { .. }) => {
                    regions.remove(&job.origin);
                }
                _ => {}
            }
        }

        drop(regions);
        self.progress.notify_all();
    }

    fn extract(&self, origin: WorldPos) -> Result<ChunkMeshes, ExtractionError> {
        let region = Region::from_origin(origin, self.config.mesh_size);
        let extraction = &self.config.extraction;
        let opaque = extraction.opaque_capacity(&region);
        let water = extraction.water_capacity(&region);

        let mut meshes = ChunkMeshes::with_capacity(opaque, opaque, water, water);
        // A panicking extractor fails this pass only; the worker keeps going.
        panic::catch_unwind(AssertUnwindSafe(|| {
            self.extractor.extract(&self.volume, region, &self.rules, &mut meshes)
        }))
        .map_err(|payload| ExtractionError::Panicked {
            region,
            message: panic_message(payload.as_ref()),
        })??;
        Ok(meshes)
    }

    /// Blocks while the output queue is full. False if cancelled.
    fn push(&self, envelope: Envelope, cancelled: &Receiver<()>) -> bool {
        if envelope.session != self.session() {
            return true;
        }
        select! {
            send(self.output_tx, envelope) -> sent => sent.is_ok(),
            recv(cancelled) -> _ => false,
        }
    }

    fn drain_queues(&self, output: &Receiver<Envelope>) {
        while self.pending_rx.try_recv().is_ok() {}
        while output.try_recv().is_ok() {}
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}

// =============================================================================
// SCHEDULER
// =============================================================================

/// Deduplicated extraction queue with a worker pool.
pub struct ExtractionScheduler {
    shared: Arc<Shared>,
    output_rx: Receiver<Envelope>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ExtractionScheduler {
    /// Starts the worker pool with the default quad rules.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or a worker thread
    /// cannot be spawned. Workers already started are stopped again.
    pub fn new(
        volume: VoxelVolume,
        extractor: Arc<dyn SurfaceExtractor>,
        config: SchedulerConfig,
    ) -> Result<Self, SchedulerError> {
        let rules = QuadRules::with_water_height(config.extraction.water_height);
        Self::with_rules(volume, extractor, rules, config)
    }

    /// Starts the worker pool with custom quad rules.
    ///
    /// # Errors
    ///
    /// Same as [`ExtractionScheduler::new`].
    pub fn with_rules(
        volume: VoxelVolume,
        extractor: Arc<dyn SurfaceExtractor>,
        rules: QuadRules,
        config: SchedulerConfig,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;

        let (pending_tx, pending_rx) = unbounded();
        let (output_tx, output_rx) = bounded(config.output_capacity);
        let worker_count = config.workers;

        let shared = Arc::new(Shared {
            volume,
            extractor,
            rules,
            config,
            regions: Mutex::new(HashMap::new()),
            progress: Condvar::new(),
            pending_tx,
            pending_rx,
            output_tx,
            cancel: CancellationToken::new(),
            session: AtomicU64::new(0),
            paused: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            counters: Counters::default(),
        });

        let mut workers = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let worker = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("stratum-extract-{index}"))
                .spawn(move || worker.run_worker(index));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    error!(error = %e, "failed to spawn extraction worker");
                    shared.cancel.cancel();
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(SchedulerError::Spawn(e));
                }
            }
        }

        info!(workers = worker_count, "extraction scheduler started");
        Ok(Self {
            shared,
            output_rx,
            workers: Mutex::new(workers),
        })
    }

    /// Configuration the scheduler runs with.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    /// Lower corner of the region containing `pos`.
    #[inline]
    #[must_use]
    pub fn region_origin(&self, pos: WorldPos) -> WorldPos {
        Region::snap(pos, self.shared.config.mesh_size)
    }

    /// The region containing `pos`.
    #[must_use]
    pub fn region_for(&self, pos: WorldPos) -> Region {
        Region::from_origin(self.region_origin(pos), self.shared.config.mesh_size)
    }

    /// Requests extraction of the region containing `pos`.
    ///
    /// Returns true if the region was newly queued. Returns false if it is
    /// already pending, already extracted, in flight (it is then flagged
    /// for one more pass), or the scheduler is paused or shut down.
    pub fn schedule(&self, pos: WorldPos) -> bool {
        let shared = &self.shared;
        if shared.cancel.is_cancelled() || shared.paused.load(Ordering::SeqCst) {
            return false;
        }
        let origin = self.region_origin(pos);

        let mut regions = shared.regions.lock();
        if shared.paused.load(Ordering::SeqCst) {
            return false;
        }
        match regions.entry(origin) {
            MapEntry::Vacant(slot) => {
                let job = Job {
                    origin,
                    session: shared.session(),
                };
                if shared.pending_tx.send(job).is_err() {
                    return false;
                }
                slot.insert(Entry::Pending);
                shared.counters.scheduled.fetch_add(1, Ordering::Relaxed);
                trace!(%pos, %origin, "mesh extraction scheduled");
                true
            }
            MapEntry::Occupied(mut slot) => {
                if let Entry::InFlight { reschedule } = slot.get_mut() {
                    *reschedule = true;
                }
                false
            }
        }
    }

    /// Lets an extracted region be scheduled again.
    ///
    /// Returns true if the region was in the extracted state.
    pub fn allow_reextraction(&self, pos: WorldPos) -> bool {
        let origin = self.region_origin(pos);
        let mut regions = self.shared.regions.lock();
        if matches!(regions.get(&origin), Some(Entry::Extracted)) {
            regions.remove(&origin);
            true
        } else {
            false
        }
    }

    /// State of the region containing `pos`.
    #[must_use]
    pub fn region_state(&self, pos: WorldPos) -> RegionState {
        let origin = self.region_origin(pos);
        match self.shared.regions.lock().get(&origin) {
            None => RegionState::Idle,
            Some(Entry::Pending) => RegionState::Pending,
            Some(Entry::InFlight { .. }) => RegionState::InFlight,
            Some(Entry::Extracted) => RegionState::Extracted,
        }
    }

    /// Takes one finished mesh without blocking.
    #[must_use]
    pub fn pop_extracted(&self) -> Option<ExtractedMeshResult> {
        let session = self.shared.session();
        while let Ok(envelope) = self.output_rx.try_recv() {
            if envelope.session == session {
                return Some(envelope.result);
            }
        }
        None
    }

    /// Waits up to `timeout` for a finished mesh.
    #[must_use]
    pub fn pop_extracted_timeout(&self, timeout: Duration) -> Option<ExtractedMeshResult> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.output_rx.recv_timeout(remaining) {
                Ok(envelope) if envelope.session == self.shared.session() => {
                    return Some(envelope.result)
                }
                Ok(_) => {}
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    /// Takes every finished mesh currently queued.
    #[must_use]
    pub fn drain_extracted(&self) -> Vec<ExtractedMeshResult> {
        std::iter::from_fn(|| self.pop_extracted()).collect()
    }

    /// Blocks until no region is pending or in flight, or `timeout` passes.
    ///
    /// Meshes must be drained concurrently if the output queue can fill up.
    /// Returns true if the scheduler went idle.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let busy = |regions: &HashMap<WorldPos, Entry>| {
            regions.values().any(|e| !matches!(e, Entry::Extracted))
        };

        let mut regions = self.shared.regions.lock();
        while busy(&regions) {
            if self
                .shared
                .progress
                .wait_until(&mut regions, deadline)
                .timed_out()
            {
                return !busy(&regions);
            }
        }
        true
    }

    /// Current counters. Never waits on workers.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        let shared = &self.shared;
        SchedulerStats {
            tracked: shared.regions.lock().len(),
            queued: shared.pending_rx.len(),
            in_flight: shared.in_flight.load(Ordering::SeqCst),
            ready: self.output_rx.len(),
            scheduled: shared.counters.scheduled.load(Ordering::Relaxed),
            rescheduled: shared.counters.rescheduled.load(Ordering::Relaxed),
            completed: shared.counters.completed.load(Ordering::Relaxed),
            failed: shared.counters.failed.load(Ordering::Relaxed),
            dropped_empty: shared.counters.dropped_empty.load(Ordering::Relaxed),
        }
    }

    /// Stops the current session: scheduling is refused, queued work and
    /// undelivered meshes are dropped. Worker threads stay alive.
    pub fn reset(&self) {
        {
            let mut regions = self.shared.regions.lock();
            self.shared.paused.store(true, Ordering::SeqCst);
            self.shared.session.fetch_add(1, Ordering::SeqCst);
            regions.clear();
        }
        self.shared.drain_queues(&self.output_rx);
        self.shared.progress.notify_all();
        info!("extraction session reset");
    }

    /// Starts a new session after [`reset`](Self::reset).
    ///
    /// Returns false if the scheduler is shut down.
    pub fn resume(&self) -> bool {
        if self.shared.cancel.is_cancelled() {
            return false;
        }
        let was_paused = self.shared.paused.swap(false, Ordering::SeqCst);
        if was_paused {
            info!(session = self.shared.session(), "extraction session resumed");
        }
        true
    }

    /// True between `reset` and `resume`, and after shutdown.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::SeqCst) || self.shared.cancel.is_cancelled()
    }

    /// True once `shutdown` was called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Cancels all waits, clears the queues and joins the workers.
    ///
    /// Passes already running finish first. Safe to call more than once.
    pub fn shutdown(&self) {
        let first = self.shared.cancel.cancel();
        self.shared.regions.lock().clear();
        self.shared.progress.notify_all();
        self.shared.drain_queues(&self.output_rx);

        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            if handle.join().is_err() {
                error!("extraction worker panicked");
            }
        }

        self.shared.drain_queues(&self.output_rx);
        self.shared.progress.notify_all();
        if first {
            info!("extraction scheduler shut down");
        }
    }
}

impl Drop for ExtractionScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ExtractionScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionScheduler")
            .field("config", &self.shared.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
