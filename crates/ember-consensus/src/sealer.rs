//! Seal job lifecycle shared by every engine.
//!
//! A [`Sealer`] owns at most one current job. Starting a job supersedes the
//! previous one: its token is cancelled and, because publishing happens
//! under the same lock that installs the new job, nothing it finds can reach
//! a results channel afterwards. The first worker of the current job to
//! return a block publishes it and cancels its siblings. A job whose workers
//! all give up without a block ends as well.
//!
//! State per job: `Sealing -> Found | Superseded | Stopped`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ember_core::error::ConsensusError;
use ember_core::types::Block;

/// What a sealing worker sees of its job.
#[derive(Clone)]
pub struct JobContext {
    /// Fires on supersession, on the caller's stop signal, on a sibling's
    /// success and on close. Poll it at safe points.
    pub cancel: CancellationToken,
    hashes: Arc<AtomicU64>,
}

impl JobContext {
    /// Record `n` seal attempts toward the hashrate.
    pub fn add_hashes(&self, n: u64) {
        self.hashes.fetch_add(n, Ordering::Relaxed);
    }
}

/// One unit of sealing work, run on its own thread.
pub type SealWork = Box<dyn FnOnce(&JobContext) -> Option<Block> + Send>;

struct SealJob {
    id: u64,
    number: u64,
    cancel: CancellationToken,
    hashes: Arc<AtomicU64>,
    /// Workers that have neither published nor given up.
    remaining: usize,
    started: Instant,
    ended: Option<Instant>,
}

impl SealJob {
    fn end(&mut self) {
        self.cancel.cancel();
        self.ended.get_or_insert_with(Instant::now);
    }

    fn hashrate(&self) -> f64 {
        let elapsed = self.ended.unwrap_or_else(Instant::now).duration_since(self.started);
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 { 0.0 } else { self.hashes.load(Ordering::Relaxed) as f64 / secs }
    }
}

#[derive(Default)]
struct SealerState {
    next_id: u64,
    current: Option<SealJob>,
    handles: Vec<JoinHandle<()>>,
    closed: bool,
}

/// Background seal job controller. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct Sealer {
    state: Arc<Mutex<SealerState>>,
}

impl Sealer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a job for the block at `number`, one thread per entry in `work`.
    ///
    /// Returns once the threads are spawned. The job stops when `stop` fires,
    /// when a later job starts, when one worker returns a block, or on
    /// [`close`](Self::close).
    pub fn start_job(
        &self,
        number: u64,
        stop: &CancellationToken,
        results: UnboundedSender<Block>,
        work: Vec<SealWork>,
    ) -> Result<(), ConsensusError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(ConsensusError::EngineClosed);
        }

        if let Some(prev) = state.current.as_mut() {
            if !prev.cancel.is_cancelled() {
                debug!(job = prev.id, number = prev.number, "seal job superseded");
            }
            prev.end();
        }
        reap_finished(&mut state.handles);

        state.next_id += 1;
        let job = SealJob {
            id: state.next_id,
            number,
            cancel: stop.child_token(),
            hashes: Arc::new(AtomicU64::new(0)),
            remaining: work.len(),
            started: Instant::now(),
            ended: None,
        };
        let ctx = JobContext { cancel: job.cancel.clone(), hashes: Arc::clone(&job.hashes) };
        let id = job.id;
        debug!(job = id, number, workers = work.len(), "seal job started");
        state.current = Some(job);

        for (i, task) in work.into_iter().enumerate() {
            let ctx = ctx.clone();
            let results = results.clone();
            let shared = Arc::clone(&self.state);
            let spawned = thread::Builder::new()
                .name(format!("ember-seal-{i}"))
                .spawn(move || {
                    match task(&ctx) {
                        Some(block) => publish(&shared, id, block, &results),
                        None => retire(&shared, id),
                    }
                });
            match spawned {
                Ok(handle) => state.handles.push(handle),
                Err(e) => {
                    if let Some(job) = state.current.as_mut() {
                        job.end();
                    }
                    return Err(ConsensusError::Worker(e.to_string()));
                }
            }
        }
        Ok(())
    }

    /// Hashes per second of the current job, or of the last one if idle.
    pub fn hashrate(&self) -> f64 {
        self.state.lock().current.as_ref().map_or(0.0, SealJob::hashrate)
    }

    /// Whether the current job is still searching.
    pub fn is_sealing(&self) -> bool {
        self.state
            .lock()
            .current
            .as_ref()
            .is_some_and(|job| !job.cancel.is_cancelled())
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Stop the current job and join every sealing thread. Idempotent.
    pub fn close(&self) {
        let handles = {
            let mut state = self.state.lock();
            if !state.closed {
                debug!("sealer closing");
            }
            state.closed = true;
            if let Some(job) = state.current.as_mut() {
                job.end();
            }
            std::mem::take(&mut state.handles)
        };
        // Joined outside the lock: a finishing worker takes it to publish.
        for handle in handles {
            if handle.join().is_err() {
                warn!("seal worker panicked");
            }
        }
    }

    /// Live sealing threads, for shutdown checks.
    pub fn live_workers(&self) -> usize {
        self.state.lock().handles.iter().filter(|h| !h.is_finished()).count()
    }
}

fn publish(state: &Mutex<SealerState>, id: u64, block: Block, results: &UnboundedSender<Block>) {
    let mut state = state.lock();
    let Some(job) = state.current.as_mut() else { return };
    if job.id != id || job.cancel.is_cancelled() {
        debug!(job = id, "dropping seal from stale job");
        return;
    }
    job.end();
    info!(job = id, number = block.number(), hash = %block.hash(), "seal found");
    if results.send(block).is_err() {
        debug!(job = id, "seal result receiver dropped");
    }
}

/// A worker of job `id` returned without a block.
fn retire(state: &Mutex<SealerState>, id: u64) {
    let mut state = state.lock();
    let Some(job) = state.current.as_mut() else { return };
    if job.id != id {
        return;
    }
    job.remaining = job.remaining.saturating_sub(1);
    if job.remaining == 0 && !job.cancel.is_cancelled() {
        debug!(job = id, number = job.number, "every seal worker gave up");
        job.end();
    }
}

fn reap_finished(handles: &mut Vec<JoinHandle<()>>) {
    let (done, live): (Vec<_>, Vec<_>) = std::mem::take(handles).into_iter().partition(|h| h.is_finished());
    *handles = live;
    for handle in done {
        if handle.join().is_err() {
            warn!("seal worker panicked");
        }
    }
}
