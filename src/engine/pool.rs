// src/engine/pool.rs
//
// Fixed-size pool of codec workers.
//
// Each worker is a dedicated OS thread with its own FIFO queue. Dispatch is
// round-robin over the workers. Outstanding requests are bounded by a counting
// semaphore with one permit per worker, so a caller issuing more than N requests
// blocks until a slot frees instead of piling work onto one thread.
//
// The permit travels with the job and is released only after the completion
// callback has run, so a freed slot always means the previous result was absorbed.
// Callers that need to act once a slot is actually theirs reserve it first and
// dispatch into the reservation.
//
// Lifecycle: Loading -> Ready -> ShutDown. Dispatching while Loading fails with
// EngineNotReady; the caller may retry once start() returns.

use crate::config::{EngineConfig, QualityMode};
use crate::engine::common::EngineResult;
use crate::engine::io::Source;
use crate::engine::semaphore::{CountingSemaphore, Permit};
use crate::engine::tasks::{Codec, ConvertTask, JpegCodec};
use crate::error::ConverterError;
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Called on the worker thread with the conversion result.
pub type Completion = Box<dyn FnOnce(EngineResult<Vec<u8>>) + Send + 'static>;

struct Job {
    task: ConvertTask,
    on_complete: Completion,
    permit: Permit,
}

struct Worker {
    queue: Sender<Job>,
    handle: Option<JoinHandle<()>>,
}

enum PoolState {
    Loading,
    Ready(Vec<Worker>),
    ShutDown,
}

pub struct WorkerPool {
    size: usize,
    codec: Arc<dyn Codec>,
    state: RwLock<PoolState>,
    cursor: AtomicUsize,
    slots: Arc<CountingSemaphore>,
}

/// A worker slot held ahead of a dispatch. Dropping it unused frees the slot.
#[must_use = "dropping a reservation frees the slot"]
pub struct Reservation {
    permit: Permit,
}

/// Result handle returned by [`WorkerPool::dispatch`].
pub struct PendingConversion {
    worker: usize,
    rx: Receiver<EngineResult<Vec<u8>>>,
}

impl PendingConversion {
    pub fn worker(&self) -> usize {
        self.worker
    }

    /// Block until the worker reports back.
    pub fn wait(self) -> EngineResult<Vec<u8>> {
        self.rx.recv().map_err(|_| ConverterError::WorkerLost {
            worker: self.worker,
        })?
    }
}

impl WorkerPool {
    /// Create a pool in the Loading state. No threads exist until [`start`](Self::start).
    pub fn new(size: usize, codec: Arc<dyn Codec>) -> Self {
        let size = size.max(1);
        Self {
            size,
            codec,
            state: RwLock::new(PoolState::Loading),
            cursor: AtomicUsize::new(0),
            slots: Arc::new(CountingSemaphore::new(size)),
        }
    }

    /// Pool sized from config, running the PNG -> JPEG codec.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.worker_count(), Arc::new(JpegCodec))
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.state.read(), PoolState::Ready(_))
    }

    /// Dispatches that hold a slot right now.
    pub fn in_flight(&self) -> usize {
        self.slots.permits() - self.slots.available()
    }

    /// Spawn the worker threads. Idempotent while Ready.
    pub fn start(&self) -> EngineResult<()> {
        let mut state = self.state.write();
        match *state {
            PoolState::Ready(_) => return Ok(()),
            PoolState::ShutDown => return Err(ConverterError::EngineShutDown),
            PoolState::Loading => {}
        }

        let mut workers = Vec::with_capacity(self.size);
        for id in 0..self.size {
            let (tx, rx) = mpsc::channel::<Job>();
            let codec = Arc::clone(&self.codec);
            let handle = thread::Builder::new()
                .name(format!("codec-worker-{id}"))
                .spawn(move || worker_loop(id, rx, codec))
                .map_err(|e| {
                    ConverterError::internal_panic(format!("failed to spawn codec worker {id}: {e}"))
                })?;
            workers.push(Worker {
                queue: tx,
                handle: Some(handle),
            });
        }

        tracing::info!(workers = self.size, "converter engine ready");
        *state = PoolState::Ready(workers);
        Ok(())
    }

    /// Block until a worker slot is free and hold it.
    pub fn reserve(&self) -> EngineResult<Reservation> {
        self.check_ready()?;
        // no state lock while waiting: a blocked caller must not hold up shutdown
        Ok(Reservation {
            permit: self.slots.acquire(),
        })
    }

    /// Queue a conversion; `on_complete` runs on the worker thread.
    /// Returns the index of the worker that took the job.
    pub fn dispatch_with(
        &self,
        source: Source,
        mode: QualityMode,
        on_complete: Completion,
    ) -> EngineResult<usize> {
        let reservation = self.reserve()?;
        self.dispatch_reserved(reservation, source, mode, on_complete)
    }

    /// Queue a conversion into a slot reserved with [`reserve`](Self::reserve).
    pub fn dispatch_reserved(
        &self,
        reservation: Reservation,
        source: Source,
        mode: QualityMode,
        on_complete: Completion,
    ) -> EngineResult<usize> {
        let state = self.state.read();
        let workers = match &*state {
            PoolState::Ready(workers) => workers,
            PoolState::Loading => return Err(ConverterError::EngineNotReady),
            PoolState::ShutDown => return Err(ConverterError::EngineShutDown),
        };

        let index = self.next_worker();
        let job = Job {
            task: ConvertTask::new(source, mode),
            on_complete,
            permit: reservation.permit,
        };
        workers[index]
            .queue
            .send(job)
            .map_err(|_| ConverterError::WorkerLost { worker: index })?;
        tracing::trace!(worker = index, mode = mode.as_str(), "dispatched conversion");
        Ok(index)
    }

    /// Queue a conversion and get a handle to wait on.
    pub fn dispatch(&self, source: Source, mode: QualityMode) -> EngineResult<PendingConversion> {
        let (tx, rx) = mpsc::channel::<EngineResult<Vec<u8>>>();
        let worker = self.dispatch_with(
            source,
            mode,
            Box::new(move |result: EngineResult<Vec<u8>>| {
                // receiver may have given up waiting
                let _ = tx.send(result);
            }),
        )?;
        Ok(PendingConversion { worker, rx })
    }

    /// Stop accepting work. Already queued jobs still run to completion.
    pub fn shutdown(&self) {
        let workers = {
            let mut state = self.state.write();
            match std::mem::replace(&mut *state, PoolState::ShutDown) {
                PoolState::Ready(workers) => workers,
                PoolState::Loading | PoolState::ShutDown => return,
            }
        };

        let current = thread::current().id();
        for mut worker in workers {
            // closing the queue lets the thread drain and exit
            drop(worker.queue);
            if let Some(handle) = worker.handle.take() {
                // the last owner can be a completion callback on a worker thread
                if handle.thread().id() != current {
                    let _ = handle.join();
                }
            }
        }
        tracing::info!("converter engine shut down");
    }

    fn check_ready(&self) -> EngineResult<()> {
        match &*self.state.read() {
            PoolState::Ready(_) => Ok(()),
            PoolState::Loading => Err(ConverterError::EngineNotReady),
            PoolState::ShutDown => Err(ConverterError::EngineShutDown),
        }
    }

    fn next_worker(&self) -> usize {
        let size = self.size;
        self.cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| Some((c + 1) % size))
            .unwrap_or(0)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(id: usize, rx: Receiver<Job>, codec: Arc<dyn Codec>) {
    tracing::debug!(worker = id, "codec worker started");
    while let Ok(job) = rx.recv() {
        let Job {
            task,
            on_complete,
            permit,
        } = job;
        let result = task.run(codec.as_ref());
        if catch_unwind(AssertUnwindSafe(move || on_complete(result))).is_err() {
            tracing::warn!(worker = id, "completion callback panicked");
        }
        drop(permit);
    }
    tracing::debug!(worker = id, "codec worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Echoes the payload back, or fails on an empty one.
    struct EchoCodec;

    impl Codec for EchoCodec {
        fn convert(&self, payload: &[u8], quality: u8) -> EngineResult<Vec<u8>> {
            if payload.is_empty() {
                return Err(ConverterError::encode_failed("jpeg", "empty payload"));
            }
            let mut out = payload.to_vec();
            out.push(quality);
            Ok(out)
        }
    }

    /// Records which thread handled each call and how many ran at once.
    struct TrackingCodec {
        threads: Mutex<Vec<String>>,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Codec for TrackingCodec {
        fn convert(&self, payload: &[u8], _quality: u8) -> EngineResult<Vec<u8>> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.threads
                .lock()
                .unwrap()
                .push(thread::current().name().unwrap_or_default().to_string());
            thread::sleep(Duration::from_millis(10));
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(payload.to_vec())
        }
    }

    fn started(size: usize, codec: Arc<dyn Codec>) -> WorkerPool {
        let pool = WorkerPool::new(size, codec);
        pool.start().unwrap();
        pool
    }

    #[test]
    fn dispatch_before_start_is_not_ready() {
        let pool = WorkerPool::new(2, Arc::new(EchoCodec));
        let err = pool
            .dispatch(Source::from_vec(vec![1]), QualityMode::Best)
            .err()
            .unwrap();
        assert!(matches!(err, ConverterError::EngineNotReady));
        assert!(err.is_recoverable());
    }

    #[test]
    fn dispatch_after_shutdown_fails() {
        let pool = started(1, Arc::new(EchoCodec));
        pool.shutdown();
        let err = pool
            .dispatch(Source::from_vec(vec![1]), QualityMode::Best)
            .err()
            .unwrap();
        assert!(matches!(err, ConverterError::EngineShutDown));
        assert!(matches!(pool.start(), Err(ConverterError::EngineShutDown)));
    }

    #[test]
    fn quality_mode_reaches_codec() {
        let pool = started(1, Arc::new(EchoCodec));
        let best = pool
            .dispatch(Source::from_vec(vec![7]), QualityMode::Best)
            .unwrap()
            .wait()
            .unwrap();
        let optimized = pool
            .dispatch(Source::from_vec(vec![7]), QualityMode::Optimized)
            .unwrap()
            .wait()
            .unwrap();
        assert_eq!(best, vec![7, 92]);
        assert_eq!(optimized, vec![7, 75]);
    }

    #[test]
    fn worker_stays_usable_after_failure() {
        let pool = started(1, Arc::new(EchoCodec));
        let err = pool
            .dispatch(Source::from_vec(vec![]), QualityMode::Best)
            .unwrap()
            .wait()
            .unwrap_err();
        assert!(err.to_string().contains("empty payload"));
        let ok = pool
            .dispatch(Source::from_vec(vec![1]), QualityMode::Best)
            .unwrap()
            .wait();
        assert!(ok.is_ok());
    }

    #[test]
    fn round_robin_spreads_dispatches() {
        let pool = started(3, Arc::new(EchoCodec));
        let workers: Vec<usize> = (0..6)
            .map(|_| {
                let pending = pool
                    .dispatch(Source::from_vec(vec![1]), QualityMode::Best)
                    .unwrap();
                let worker = pending.worker();
                pending.wait().unwrap();
                worker
            })
            .collect();
        assert_eq!(workers, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn outstanding_dispatches_are_bounded_by_pool_size() {
        let codec = Arc::new(TrackingCodec {
            threads: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let pool = started(2, codec.clone());
        let pending: Vec<_> = (0..8)
            .map(|i| {
                pool.dispatch(Source::from_vec(vec![i]), QualityMode::Best)
                    .unwrap()
            })
            .collect();
        for (i, p) in pending.into_iter().enumerate() {
            assert_eq!(p.wait().unwrap(), vec![i as u8]);
        }
        assert!(codec.peak.load(Ordering::SeqCst) <= 2);
        let threads = codec.threads.lock().unwrap();
        assert_eq!(threads.len(), 8);
        assert!(threads.iter().all(|t| t.starts_with("codec-worker-")));
        drop(threads);
        // joins the workers, so every permit is back
        pool.shutdown();
        assert_eq!(pool.in_flight(), 0);
    }

    #[test]
    fn reservation_holds_the_slot_until_used() {
        let pool = started(1, Arc::new(EchoCodec));
        let reservation = pool.reserve().unwrap();
        assert_eq!(pool.in_flight(), 1);

        let (tx, rx) = mpsc::channel();
        let waiter = thread::spawn({
            let tx = tx.clone();
            let pool_slots = Arc::clone(&pool.slots);
            move || {
                let permit = pool_slots.acquire();
                tx.send(()).unwrap();
                drop(permit);
            }
        });
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        let (done_tx, done_rx) = mpsc::channel();
        pool.dispatch_reserved(
            reservation,
            Source::from_vec(vec![5]),
            QualityMode::Optimized,
            Box::new(move |result: EngineResult<Vec<u8>>| {
                let _ = done_tx.send(result);
            }),
        )
        .unwrap();
        assert_eq!(done_rx.recv().unwrap().unwrap(), vec![5, 75]);
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        waiter.join().unwrap();
    }

    #[test]
    fn unused_reservation_frees_the_slot() {
        let pool = started(1, Arc::new(EchoCodec));
        drop(pool.reserve().unwrap());
        assert_eq!(pool.in_flight(), 0);
        let pool = WorkerPool::new(1, Arc::new(EchoCodec));
        assert!(matches!(pool.reserve(), Err(ConverterError::EngineNotReady)));
    }

    #[test]
    fn size_is_at_least_one() {
        let pool = WorkerPool::new(0, Arc::new(EchoCodec));
        assert_eq!(pool.size(), 1);
        assert!(!pool.is_ready());
        pool.start().unwrap();
        assert!(pool.is_ready());
        // second start is a no-op
        pool.start().unwrap();
    }
}
