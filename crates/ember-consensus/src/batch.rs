//! Concurrent, order-preserving header verification.
//!
//! A fixed pool of worker threads pulls task indices from a shared counter,
//! verifies the header at that index and hands `(index, result)` to a
//! dispatcher thread. The dispatcher parks results in a pre-sized buffer and
//! forwards the longest ready prefix to the caller, so results always come
//! out in input order no matter which worker finishes first.
//!
//! Cancelling stops workers before their next task and stops the dispatcher
//! from forwarding anything further. The result stream closes once every
//! worker has exited, after the last result or after cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc as std_mpsc;
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use ember_core::error::{ConfigError, ConsensusError};
use ember_core::traits::ChainView;
use ember_core::types::Header;

use crate::validator::{self, HeaderRules};

/// Handle to an in-flight batch verification.
///
/// `results` yields exactly one item per input header, in input order,
/// unless `cancel` fires first. Dropping the handle cancels the batch.
pub struct HeaderVerification {
    /// Abandon remaining work. Results not yet forwarded are never delivered.
    pub cancel: CancellationToken,
    pub results: UnboundedReceiver<Result<(), ConsensusError>>,
    dispatcher: Option<JoinHandle<()>>,
    active: Arc<AtomicUsize>,
}

impl HeaderVerification {
    fn closed(cancel: CancellationToken, results: UnboundedReceiver<Result<(), ConsensusError>>) -> Self {
        Self {
            cancel,
            results,
            dispatcher: None,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Signal cancellation. Does not wait for workers.
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    /// Next result, in input order. `None` once the stream is closed.
    pub async fn recv(&mut self) -> Option<Result<(), ConsensusError>> {
        self.results.recv().await
    }

    /// Block until every worker and the dispatcher have exited.
    ///
    /// Returns immediately on repeat calls. Must not be called from inside
    /// an async task that other batch work depends on; it parks the thread.
    pub fn wait(&mut self) {
        if let Some(handle) = self.dispatcher.take() {
            if handle.join().is_err() {
                warn!("batch dispatcher panicked");
            }
        }
    }

    /// Verification workers still running.
    pub fn active_workers(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

impl Drop for HeaderVerification {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct VerificationTask {
    header: Header,
    seal: bool,
}

/// Decrements the live-worker count however the worker exits.
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Verify `headers` concurrently on up to `workers` threads.
///
/// `headers` is expected to be contiguous: the parent of `headers[i]` is
/// `headers[i - 1]`, and the parent of `headers[0]` comes from `chain`. A
/// header whose parent is neither resolves to `UnknownAncestor`. `seals[i]`
/// says whether the seal of `headers[i]` is checked.
///
/// Returns immediately. A length mismatch between `headers` and `seals`
/// yields a single configuration error.
pub fn verify_headers(
    rules: Arc<dyn HeaderRules>,
    chain: Arc<dyn ChainView>,
    headers: Vec<Header>,
    seals: Vec<bool>,
    workers: usize,
) -> HeaderVerification {
    let cancel = CancellationToken::new();
    let (results_tx, results_rx) = mpsc::unbounded_channel();

    if headers.len() != seals.len() {
        let _ = results_tx.send(Err(ConfigError::SealFlagMismatch {
            headers: headers.len(),
            seals: seals.len(),
        }
        .into()));
        return HeaderVerification::closed(cancel, results_rx);
    }
    if headers.is_empty() {
        return HeaderVerification::closed(cancel, results_rx);
    }

    let total = headers.len();
    let workers = workers.clamp(1, total);
    let first = headers.first().map_or(0, |h| h.number);
    debug!(headers = total, workers, first, "batch verification started");

    let tasks: Arc<Vec<VerificationTask>> = Arc::new(
        headers
            .into_iter()
            .zip(seals)
            .map(|(header, seal)| VerificationTask { header, seal })
            .collect(),
    );
    let next = Arc::new(AtomicUsize::new(0));
    let active = Arc::new(AtomicUsize::new(0));
    let (done_tx, done_rx) = std_mpsc::channel::<(usize, Result<(), ConsensusError>)>();

    let mut handles = Vec::with_capacity(workers);
    for id in 0..workers {
        let ctx = WorkerContext {
            rules: Arc::clone(&rules),
            chain: Arc::clone(&chain),
            tasks: Arc::clone(&tasks),
            next: Arc::clone(&next),
            cancel: cancel.clone(),
            done: done_tx.clone(),
        };
        let guard = ActiveGuard::enter(&active);
        match thread::Builder::new()
            .name(format!("ember-verify-{id}"))
            .spawn(move || {
                let _guard = guard;
                ctx.run();
            })
        {
            Ok(handle) => handles.push(handle),
            Err(e) => warn!(error = %e, "failed to spawn verification worker"),
        }
    }
    drop(done_tx);

    if handles.is_empty() {
        let _ = results_tx.send(Err(ConsensusError::Worker("no verification workers".into())));
        return HeaderVerification { cancel, results: results_rx, dispatcher: None, active };
    }

    let dispatch_cancel = cancel.clone();
    let dispatcher = thread::Builder::new()
        .name("ember-verify-dispatch".into())
        .spawn(move || dispatch(total, done_rx, results_tx, dispatch_cancel, handles));

    match dispatcher {
        Ok(handle) => HeaderVerification { cancel, results: results_rx, dispatcher: Some(handle), active },
        Err(e) => {
            // The closure owning the result sender was dropped, so the
            // stream is already closed. Workers see the cancel and exit.
            warn!(error = %e, "failed to spawn verification dispatcher");
            cancel.cancel();
            HeaderVerification { cancel, results: results_rx, dispatcher: None, active }
        }
    }
}

struct WorkerContext {
    rules: Arc<dyn HeaderRules>,
    chain: Arc<dyn ChainView>,
    tasks: Arc<Vec<VerificationTask>>,
    next: Arc<AtomicUsize>,
    cancel: CancellationToken,
    done: std_mpsc::Sender<(usize, Result<(), ConsensusError>)>,
}

impl WorkerContext {
    fn run(self) {
        while !self.cancel.is_cancelled() {
            let index = self.next.fetch_add(1, Ordering::SeqCst);
            let Some(task) = self.tasks.get(index) else { break };
            let result = self.verify(index, task);
            if self.done.send((index, result)).is_err() {
                break;
            }
        }
    }

    fn verify(&self, index: usize, task: &VerificationTask) -> Result<(), ConsensusError> {
        let parent = if index == 0 {
            validator::resolve_parent(&*self.chain, &task.header)?
        } else {
            self.tasks
                .get(index - 1)
                .map(|prev| &prev.header)
                .filter(|prev| prev.hash() == task.header.parent_hash)
                .cloned()
                .ok_or(ConsensusError::UnknownAncestor)?
        };
        validator::verify_header(&*self.rules, &task.header, &parent, task.seal)
    }
}

fn dispatch(
    total: usize,
    done: std_mpsc::Receiver<(usize, Result<(), ConsensusError>)>,
    results: UnboundedSender<Result<(), ConsensusError>>,
    cancel: CancellationToken,
    workers: Vec<JoinHandle<()>>,
) {
    let mut buffer: Vec<Option<Result<(), ConsensusError>>> = (0..total).map(|_| None).collect();
    let mut delivered = 0usize;

    for (index, result) in done.iter() {
        if cancel.is_cancelled() {
            break;
        }
        if let Some(slot) = buffer.get_mut(index) {
            *slot = Some(result);
        }
        while let Some(ready) = buffer.get_mut(delivered).and_then(Option::take) {
            if cancel.is_cancelled() || results.send(ready).is_err() {
                // Nobody is listening any more.
                cancel.cancel();
                break;
            }
            delivered += 1;
        }
        if delivered == total || cancel.is_cancelled() {
            break;
        }
    }

    // Close the stream before joining so consumers are not held up by
    // workers finishing their current header.
    drop(results);
    drop(done);
    for handle in workers {
        if handle.join().is_err() {
            warn!("verification worker panicked");
        }
    }
    if delivered == total {
        debug!(headers = total, "batch verification finished");
    } else {
        debug!(delivered, headers = total, "batch verification cancelled");
    }
}
