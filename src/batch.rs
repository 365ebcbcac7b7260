// src/batch.rs
//
// Convert-all: walk the registry in order, one conversion in flight at a time.
//
// The walk is by identity, not by index. Each round picks the first item not yet
// visited in the current registry order, so removals and appends during the run
// neither skip nor repeat anything. Cancellation is a flag checked at the loop
// head plus a wake message that ends the wait on the in-flight item early; the
// worker itself is never interrupted and its result is still absorbed.

use crate::error::{ConverterError, Result};
use crate::events::EngineEvent;
use crate::lease::LeaseKind;
use crate::registry::ItemId;
use crate::session::{Absorbed, Converter, DispatchTarget, Wake};
use crate::tracker::{ItemStatus, Progress};
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Every item was visited.
    Completed,
    /// Stopped early by [`Converter::cancel`].
    Cancelled,
    /// Nothing to do: every item already had a successful result.
    AlreadyConverted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchReport {
    pub outcome: BatchOutcome,
    pub dispatched: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Items already converted before this run.
    pub skipped: usize,
    /// Completions that arrived after their item was removed.
    pub discarded: usize,
    pub progress: Progress,
}

impl BatchReport {
    fn new(outcome: BatchOutcome) -> Self {
        Self {
            outcome,
            dispatched: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            discarded: 0,
            progress: Progress::default(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.outcome == BatchOutcome::Cancelled
    }
}

enum Step {
    Continue,
    Cancelled,
}

impl Converter {
    /// Convert every item that lacks a successful result, in registry order.
    ///
    /// Guards, in order: an empty registry is `NoItems`; a registry where every
    /// item already succeeded returns `AlreadyConverted` without dispatching;
    /// another active conversion is `ConversionInProgress`; a pool that is not
    /// started yet is `EngineNotReady`.
    pub fn convert_all(&self) -> Result<BatchReport> {
        let inner = &self.inner;
        {
            let ws = inner.workspace.lock();
            let len = ws.registry.len();
            if len == 0 {
                return Err(ConverterError::NoItems);
            }
            if (0..len).all(|p| ws.tracker.is_success(p)) {
                tracing::info!(items = len, "all items already converted");
                let mut report = BatchReport::new(BatchOutcome::AlreadyConverted);
                report.progress = ws.tracker.progress(len);
                return Ok(report);
            }
        }

        let _lease = inner.lease.try_acquire(LeaseKind::Batch)?;
        if !inner.pool.is_ready() {
            return Err(ConverterError::EngineNotReady);
        }

        let (tx, rx) = mpsc::channel();
        *inner.batch_wake.lock() = Some(tx.clone());

        let started = Instant::now();
        tracing::info!(
            items = self.len(),
            mode = self.quality_mode().as_str(),
            "batch conversion started"
        );

        let mut report = BatchReport::new(BatchOutcome::Completed);
        let run = self.run_batch(&tx, &rx, &mut report);

        {
            // Cancel only sets the flag while the wake sender is installed, so
            // clearing both under this lock cannot leak a flag into the next run.
            let mut wake = inner.batch_wake.lock();
            wake.take();
            inner.cancel_requested.store(false, Ordering::Release);
        }

        let cancelled = matches!(run, Ok(Step::Cancelled));
        if cancelled {
            report.outcome = BatchOutcome::Cancelled;
        }
        let (reset, progress, has_any_success) = {
            let mut ws = inner.workspace.lock();
            // a failed run also must not leave Processing records behind
            let positions = if cancelled || run.is_err() {
                ws.tracker.reset_unfinished()
            } else {
                Vec::new()
            };
            let reset: Vec<(usize, String)> = positions
                .into_iter()
                .filter_map(|p| ws.registry.get(p).map(|item| (p, item.name().to_string())))
                .collect();
            let progress = ws.tracker.progress(ws.registry.len());
            (reset, progress, ws.tracker.has_any_success())
        };
        report.progress = progress;

        for (position, name) in reset {
            inner.emit(EngineEvent::StatusChanged {
                position,
                name,
                status: ItemStatus::Pending,
            });
        }
        inner.emit(EngineEvent::Progress(progress));
        inner.emit(EngineEvent::BatchFinished {
            has_any_success,
            cancelled,
        });

        tracing::info!(
            dispatched = report.dispatched,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            cancelled,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch conversion finished"
        );
        run?;
        Ok(report)
    }

    /// Ask the running batch to stop. Returns false when no batch is running.
    ///
    /// Items without a successful result go back to pending once the batch
    /// loop notices; results already stored are kept.
    pub fn cancel(&self) -> bool {
        let wake = self.inner.batch_wake.lock();
        let Some(tx) = wake.as_ref() else {
            return false;
        };
        self.inner.cancel_requested.store(true, Ordering::Release);
        let _ = tx.send(Wake::Cancelled);
        tracing::info!("batch cancellation requested");
        true
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.inner.cancel_requested.load(Ordering::Acquire)
    }

    fn run_batch(
        &self,
        tx: &Sender<Wake>,
        rx: &Receiver<Wake>,
        report: &mut BatchReport,
    ) -> Result<Step> {
        let inner = &self.inner;
        let mut visited: HashSet<ItemId> = HashSet::new();

        loop {
            if inner.cancel_requested.load(Ordering::Acquire) {
                return Ok(Step::Cancelled);
            }

            let next = {
                let ws = inner.workspace.lock();
                ws.registry
                    .items()
                    .iter()
                    .enumerate()
                    .find(|(_, item)| !visited.contains(&item.id))
                    .map(|(p, item)| {
                        let progress = ws.tracker.progress(ws.registry.len());
                        (item.id.clone(), ws.tracker.is_success(p), progress)
                    })
            };
            let Some((id, already_done, progress)) = next else {
                return Ok(Step::Continue);
            };
            visited.insert(id.clone());

            if already_done {
                tracing::debug!(item = %id, "skipping already converted item");
                report.skipped += 1;
                inner.emit(EngineEvent::Progress(progress));
                continue;
            }

            if self
                .dispatch(DispatchTarget::Identity(&id), tx.clone())?
                .is_none()
            {
                // removed between the pick and the dispatch
                continue;
            }
            report.dispatched += 1;

            match wait_for(rx, &id) {
                Some((absorbed, failed)) => match absorbed {
                    Absorbed::Written { .. } if failed => report.failed += 1,
                    Absorbed::Written { .. } => report.succeeded += 1,
                    Absorbed::Discarded => report.discarded += 1,
                },
                None => return Ok(Step::Cancelled),
            }

            if let Step::Cancelled = pause(rx, inner.config.batch_yield) {
                return Ok(Step::Cancelled);
            }
        }
    }
}

/// Block until `id` completes. `None` means the wait was cancelled.
fn wait_for(rx: &Receiver<Wake>, id: &ItemId) -> Option<(Absorbed, bool)> {
    loop {
        match rx.recv() {
            Ok(Wake::Completed(done)) if &done.id == id => {
                return Some((done.absorbed, done.error.is_some()))
            }
            // late completion of an item this run stopped waiting for
            Ok(Wake::Completed(_)) => continue,
            Ok(Wake::Cancelled) | Err(_) => return None,
        }
    }
}

/// Yield between items, waking early on cancellation.
fn pause(rx: &Receiver<Wake>, duration: std::time::Duration) -> Step {
    let deadline = Instant::now() + duration;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(Wake::Cancelled) => return Step::Cancelled,
            Ok(Wake::Completed(_)) => continue,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                return Step::Continue
            }
        }
    }
}
