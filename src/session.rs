// src/session.rs
//
// The Converter: registry + tracker + worker pool behind one handle.
//
// Registry, tracker, and a generation counter share one mutex so that a
// completion's "resolve identity, then write the record" is a single critical
// section. Completions hold only a Weak reference back to the converter: work
// still queued when the last handle goes away is simply dropped.

use crate::config::{EngineConfig, QualityMode};
use crate::engine::{write_atomic, EngineResult, WorkerPool};
use crate::error::{ConverterError, Result};
use crate::events::{EngineEvent, EventSink, NoopSink};
use crate::lease::{LeaseKind, LeaseSlot};
use crate::registry::{output_name, Candidate, Item, ItemId, Registry, SubmissionReport};
use crate::tracker::{ItemStatus, Progress, ResultRecord, Tracker};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Weak};

pub(crate) struct Workspace {
    pub(crate) registry: Registry,
    pub(crate) tracker: Tracker,
    /// Bumped by clear(); completions from an older generation are dropped.
    pub(crate) generation: u64,
}

/// Where a completion ended up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Absorbed {
    Written { position: usize, status: ItemStatus },
    Discarded,
}

pub(crate) struct Completed {
    pub(crate) id: ItemId,
    pub(crate) absorbed: Absorbed,
    pub(crate) error: Option<ConverterError>,
}

/// Messages that end a wait on an in-flight conversion.
pub(crate) enum Wake {
    Completed(Completed),
    Cancelled,
}

#[derive(Clone, Copy)]
pub(crate) enum DispatchTarget<'a> {
    Position(usize),
    Identity(&'a ItemId),
}

pub(crate) struct Inner {
    pub(crate) config: EngineConfig,
    pub(crate) pool: WorkerPool,
    pub(crate) workspace: Mutex<Workspace>,
    pub(crate) lease: LeaseSlot,
    pub(crate) quality: RwLock<QualityMode>,
    pub(crate) cancel_requested: AtomicBool,
    /// Wake channel of the running batch. Set only while a batch holds the lease.
    pub(crate) batch_wake: Mutex<Option<Sender<Wake>>>,
    pub(crate) sink: Arc<dyn EventSink>,
}

/// A converted file ready to hand out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConvertedFile {
    pub position: usize,
    pub output_name: String,
    pub bytes: Arc<Vec<u8>>,
}

/// Result of [`Converter::convert_single`].
#[derive(Clone, Debug)]
pub enum SingleOutcome {
    Converted { position: usize, output_name: String },
    Failed { position: usize, error: ConverterError },
    /// The item was removed (or everything cleared) while it was converting.
    Discarded,
}

/// Handle to a conversion session. Clones share the same state.
#[derive(Clone)]
pub struct Converter {
    pub(crate) inner: Arc<Inner>,
}

impl Converter {
    /// Build a converter with the PNG -> JPEG codec and start its workers.
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_sink(config, Arc::new(NoopSink))
    }

    pub fn with_sink(config: EngineConfig, sink: Arc<dyn EventSink>) -> Result<Self> {
        let pool = WorkerPool::from_config(&config);
        pool.start()?;
        Ok(Self::from_pool(config, pool, sink))
    }

    /// Assemble from an existing pool, which is left in whatever state it is in.
    /// Conversions fail with `EngineNotReady` until [`start`](Self::start) is called.
    pub fn from_pool(config: EngineConfig, pool: WorkerPool, sink: Arc<dyn EventSink>) -> Self {
        let workspace = Workspace {
            registry: Registry::new(&config),
            tracker: Tracker::new(),
            generation: 0,
        };
        let quality = RwLock::new(config.quality_mode);
        Self {
            inner: Arc::new(Inner {
                config,
                pool,
                workspace: Mutex::new(workspace),
                lease: LeaseSlot::new(),
                quality,
                cancel_requested: AtomicBool::new(false),
                batch_wake: Mutex::new(None),
                sink,
            }),
        }
    }

    pub fn start(&self) -> Result<()> {
        self.inner.pool.start()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.pool.is_ready()
    }

    /// Stop the workers. Already queued conversions still finish.
    pub fn shutdown(&self) {
        self.inner.pool.shutdown();
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn worker_count(&self) -> usize {
        self.inner.pool.size()
    }

    // -------------------------------------------------------------------------
    // Registry
    // -------------------------------------------------------------------------

    pub fn submit(&self, candidate: Candidate) -> Result<usize> {
        let name = candidate.name.clone();
        let (position, progress) = {
            let mut ws = self.inner.workspace.lock();
            let position = ws.registry.submit(candidate)?;
            (position, ws.tracker.progress(ws.registry.len()))
        };
        tracing::debug!(position, name = %name, "item accepted");
        self.inner.emit(EngineEvent::StatusChanged {
            position,
            name,
            status: ItemStatus::Pending,
        });
        self.inner.emit(EngineEvent::Progress(progress));
        Ok(position)
    }

    pub fn submit_all<I>(&self, candidates: I) -> SubmissionReport
    where
        I: IntoIterator<Item = Candidate>,
    {
        let (report, progress) = {
            let mut ws = self.inner.workspace.lock();
            let report = ws.registry.submit_all(candidates);
            (report, ws.tracker.progress(ws.registry.len()))
        };
        for rejection in &report.rejected {
            tracing::debug!(
                item = %rejection.id,
                reason = rejection.reason.as_str(),
                "item rejected"
            );
        }
        for (position, id) in &report.accepted {
            self.inner.emit(EngineEvent::StatusChanged {
                position: *position,
                name: id.name.clone(),
                status: ItemStatus::Pending,
            });
        }
        self.inner.emit(EngineEvent::Progress(progress));
        report
    }

    /// Remove the item at `position`. Later items and their results shift down.
    /// A conversion still running for the removed item is discarded on completion.
    pub fn remove_at(&self, position: usize) -> Result<ItemId> {
        let (removed, progress) = {
            let mut ws = self.inner.workspace.lock();
            let removed = ws.registry.remove_at(position)?;
            ws.tracker.remove_at(position);
            (removed, ws.tracker.progress(ws.registry.len()))
        };
        tracing::debug!(position, item = %removed.id, "item removed");
        self.inner.emit(EngineEvent::Progress(progress));
        Ok(removed.id.clone())
    }

    /// Drop every item and result. Returns how many items were removed.
    pub fn clear(&self) -> usize {
        let removed = {
            let mut ws = self.inner.workspace.lock();
            ws.tracker.clear();
            ws.generation = ws.generation.wrapping_add(1);
            ws.registry.clear()
        };
        tracing::debug!(removed, "registry cleared");
        self.inner.emit(EngineEvent::Progress(Progress::default()));
        removed
    }

    pub fn find(&self, name: &str, size: u64) -> Option<usize> {
        self.inner.workspace.lock().registry.position_of(name, size)
    }

    pub fn item(&self, position: usize) -> Option<Arc<Item>> {
        self.inner.workspace.lock().registry.get(position).cloned()
    }

    /// Snapshot of the registry in order.
    pub fn items(&self) -> Vec<Arc<Item>> {
        self.inner.workspace.lock().registry.items().to_vec()
    }

    pub fn len(&self) -> usize {
        self.inner.workspace.lock().registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn remaining_capacity(&self) -> usize {
        self.inner.workspace.lock().registry.remaining_capacity()
    }

    // -------------------------------------------------------------------------
    // Status
    // -------------------------------------------------------------------------

    pub fn status(&self, position: usize) -> Result<ItemStatus> {
        let ws = self.inner.workspace.lock();
        ws.check_position(position)?;
        Ok(ws.tracker.status(position))
    }

    pub fn record(&self, position: usize) -> Option<ResultRecord> {
        self.inner.workspace.lock().tracker.get(position).cloned()
    }

    /// Status of every item, in registry order.
    pub fn statuses(&self) -> Vec<ItemStatus> {
        let ws = self.inner.workspace.lock();
        (0..ws.registry.len()).map(|p| ws.tracker.status(p)).collect()
    }

    pub fn progress(&self) -> Progress {
        let ws = self.inner.workspace.lock();
        ws.tracker.progress(ws.registry.len())
    }

    pub fn has_any_success(&self) -> bool {
        self.inner.workspace.lock().tracker.has_any_success()
    }

    /// Which kind of conversion currently holds the lease, if any.
    pub fn active_conversion(&self) -> Option<LeaseKind> {
        self.inner.lease.active()
    }

    // -------------------------------------------------------------------------
    // Quality
    // -------------------------------------------------------------------------

    pub fn quality_mode(&self) -> QualityMode {
        *self.inner.quality.read()
    }

    /// Applies to every dispatch issued after this call.
    pub fn set_quality_mode(&self, mode: QualityMode) {
        let previous = std::mem::replace(&mut *self.inner.quality.write(), mode);
        if previous != mode {
            tracing::info!(mode = mode.as_str(), quality = mode.quality(), "quality mode changed");
        }
    }

    // -------------------------------------------------------------------------
    // Single-item conversion
    // -------------------------------------------------------------------------

    /// Convert one item outside the batch loop and wait for it.
    /// Refused while any other conversion holds the lease.
    pub fn convert_single(&self, position: usize) -> Result<SingleOutcome> {
        let _lease = self.inner.lease.try_acquire(LeaseKind::Single)?;
        if !self.inner.pool.is_ready() {
            return Err(ConverterError::EngineNotReady);
        }

        let (tx, rx) = mpsc::channel();
        let Some((_, worker)) = self.dispatch(DispatchTarget::Position(position), tx)? else {
            return Ok(SingleOutcome::Discarded);
        };

        let completed = match rx.recv() {
            Ok(Wake::Completed(completed)) => completed,
            Ok(Wake::Cancelled) => return Ok(SingleOutcome::Discarded),
            Err(_) => return Err(ConverterError::WorkerLost { worker }),
        };
        Ok(match (completed.absorbed, completed.error) {
            (Absorbed::Discarded, _) => SingleOutcome::Discarded,
            (Absorbed::Written { position, .. }, None) => SingleOutcome::Converted {
                position,
                output_name: output_name(&completed.id.name),
            },
            (Absorbed::Written { position, .. }, Some(error)) => {
                SingleOutcome::Failed { position, error }
            }
        })
    }

    // -------------------------------------------------------------------------
    // Download / export
    // -------------------------------------------------------------------------

    pub fn download(&self, position: usize) -> Result<ConvertedFile> {
        let ws = self.inner.workspace.lock();
        ws.check_position(position)?;
        match ws.tracker.get(position) {
            Some(ResultRecord::Success {
                payload,
                output_name,
            }) => Ok(ConvertedFile {
                position,
                output_name: output_name.clone(),
                bytes: Arc::clone(payload),
            }),
            _ => {
                let name = ws
                    .registry
                    .get(position)
                    .map(|item| item.name().to_string())
                    .unwrap_or_default();
                Err(ConverterError::not_converted(name))
            }
        }
    }

    /// Every converted file, in registry order.
    pub fn download_all(&self) -> Vec<ConvertedFile> {
        let ws = self.inner.workspace.lock();
        let len = ws.registry.len();
        ws.tracker
            .successes()
            .filter(|(position, _, _)| *position < len)
            .map(|(position, payload, name)| ConvertedFile {
                position,
                output_name: name.to_string(),
                bytes: Arc::clone(payload),
            })
            .collect()
    }

    /// Write the converted file for `position` into `dir` atomically.
    pub fn export(&self, position: usize, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let file = self.download(position)?;
        export_file(&file, dir.as_ref())
    }

    /// Write every converted file into `dir`. Stops at the first write failure.
    ///
    /// Distinct items can share an output name (`a.png` of two sizes, `x.png`
    /// and `x.PNG`). Later ones get a numbered name, `a (1).jpg`, so no file
    /// written by this call replaces another.
    pub fn export_all(&self, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        let mut taken = HashSet::new();
        let mut written = Vec::new();
        for file in self.download_all() {
            let name = unique_name(export_name(&file)?, &mut taken);
            written.push(write_atomic(&dir.join(name), &file.bytes)?);
        }
        tracing::info!(files = written.len(), dir = %dir.display(), "exported converted files");
        Ok(written)
    }

    // -------------------------------------------------------------------------
    // Dispatch plumbing shared with the batch orchestrator
    // -------------------------------------------------------------------------

    /// Reserve a worker slot, then mark the target Processing and hand it to the
    /// pool. The completion is absorbed on the worker thread and then reported on
    /// `reply`.
    ///
    /// Returns `None` when an identity target is no longer in the registry, or
    /// when a cancel arrived while waiting for the slot.
    pub(crate) fn dispatch(
        &self,
        target: DispatchTarget<'_>,
        reply: Sender<Wake>,
    ) -> Result<Option<(ItemId, usize)>> {
        // fail fast before waiting on a slot
        let found = self.inner.workspace.lock().resolve(target)?;
        if found.is_none() {
            return Ok(None);
        }

        // Slots can all be held by jobs a cancelled run stopped waiting for; the
        // item stays pending until one frees up.
        let reservation = self.inner.pool.reserve()?;
        if self.inner.cancel_requested.load(Ordering::Acquire) {
            tracing::debug!("cancelled while waiting for a worker slot");
            return Ok(None);
        }

        let (item, position, generation) = {
            let mut ws = self.inner.workspace.lock();
            let Some(position) = ws.resolve(target)? else {
                return Ok(None);
            };
            let Some(item) = ws.registry.get(position).cloned() else {
                return Ok(None);
            };
            ws.tracker.set(position, ResultRecord::Processing);
            (item, position, ws.generation)
        };
        self.inner.emit(EngineEvent::StatusChanged {
            position,
            name: item.name().to_string(),
            status: ItemStatus::Processing,
        });

        let mode = self.quality_mode();
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let id = item.id.clone();
        let on_complete = Box::new(move |result: EngineResult<Vec<u8>>| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let error = result.as_ref().err().cloned();
            let absorbed = inner.absorb(&id, generation, result);
            let _ = reply.send(Wake::Completed(Completed {
                id,
                absorbed,
                error,
            }));
        });

        match self
            .inner
            .pool
            .dispatch_reserved(reservation, item.payload.clone(), mode, on_complete)
        {
            Ok(worker) => {
                tracing::debug!(position, item = %item.id, worker, "conversion dispatched");
                Ok(Some((item.id.clone(), worker)))
            }
            Err(err) => {
                self.inner.abandon(&item.id, generation);
                Err(err)
            }
        }
    }
}

impl Workspace {
    fn resolve(&self, target: DispatchTarget<'_>) -> Result<Option<usize>> {
        match target {
            DispatchTarget::Position(position) => {
                self.check_position(position)?;
                Ok(Some(position))
            }
            DispatchTarget::Identity(id) => Ok(self.registry.find(id)),
        }
    }

    fn check_position(&self, position: usize) -> Result<()> {
        if position < self.registry.len() {
            Ok(())
        } else {
            Err(ConverterError::position_out_of_range(
                position,
                self.registry.len(),
            ))
        }
    }
}

impl Inner {
    pub(crate) fn emit(&self, event: EngineEvent) {
        self.sink.emit(event);
    }

    /// Write a completion to wherever its item lives now, or drop it if the
    /// item is gone.
    fn absorb(&self, id: &ItemId, generation: u64, result: EngineResult<Vec<u8>>) -> Absorbed {
        let written = {
            let mut ws = self.workspace.lock();
            let position = if ws.generation == generation {
                ws.registry.find(id)
            } else {
                None
            };
            position.map(|position| {
                let record = match result {
                    Ok(bytes) => ResultRecord::Success {
                        payload: Arc::new(bytes),
                        output_name: output_name(&id.name),
                    },
                    Err(err) => {
                        tracing::warn!(item = %id, error = %err, "conversion failed");
                        ResultRecord::Failed {
                            reason: err.to_string(),
                        }
                    }
                };
                let status = record.status();
                ws.tracker.set(position, record);
                (position, status, ws.tracker.progress(ws.registry.len()))
            })
        };

        match written {
            Some((position, status, progress)) => {
                tracing::debug!(position, item = %id, status = status.as_str(), "completion absorbed");
                self.emit(EngineEvent::StatusChanged {
                    position,
                    name: id.name.clone(),
                    status,
                });
                self.emit(EngineEvent::Progress(progress));
                Absorbed::Written { position, status }
            }
            None => {
                tracing::debug!(item = %id, "item removed during conversion, result discarded");
                Absorbed::Discarded
            }
        }
    }

    /// Undo the Processing mark of a dispatch the pool refused.
    fn abandon(&self, id: &ItemId, generation: u64) {
        let mut ws = self.workspace.lock();
        if ws.generation != generation {
            return;
        }
        if let Some(position) = ws.registry.find(id) {
            if ws.tracker.get(position) == Some(&ResultRecord::Processing) {
                ws.tracker.unset(position);
            }
        }
    }
}

fn export_file(file: &ConvertedFile, dir: &Path) -> Result<PathBuf> {
    write_atomic(&dir.join(export_name(file)?), &file.bytes)
}

/// Last path component of the output name; never lets a name escape `dir`.
fn export_name(file: &ConvertedFile) -> Result<&str> {
    Path::new(&file.output_name)
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            ConverterError::invalid_argument(
                "output_name",
                file.output_name.clone(),
                "converted file has no usable file name",
            )
        })
}

/// `name`, or `stem (n).ext` with the first free `n`. Compared case-insensitively
/// since that is how many filesystems compare them.
fn unique_name(name: &str, taken: &mut HashSet<String>) -> String {
    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 => name.split_at(dot),
        _ => (name, ""),
    };
    let mut candidate = name.to_string();
    let mut n = 1;
    while !taken.insert(candidate.to_lowercase()) {
        candidate = format!("{stem} ({n}){ext}");
        n += 1;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Codec;
    use crate::error::RejectReason;
    use std::sync::mpsc::Receiver;

    /// Returns the payload reversed; fails on payloads starting with `!`.
    struct ReverseCodec;

    impl Codec for ReverseCodec {
        fn convert(&self, payload: &[u8], _quality: u8) -> EngineResult<Vec<u8>> {
            if payload.first() == Some(&b'!') {
                return Err(ConverterError::decode_failed("bang"));
            }
            Ok(payload.iter().rev().copied().collect())
        }
    }

    fn converter() -> (Converter, Receiver<EngineEvent>) {
        let (tx, rx) = mpsc::channel();
        let config = EngineConfig::default().with_workers(2);
        let pool = WorkerPool::new(2, Arc::new(ReverseCodec));
        pool.start().unwrap();
        (Converter::from_pool(config, pool, Arc::new(tx)), rx)
    }

    fn png(name: &str, bytes: &[u8]) -> Candidate {
        Candidate::from_bytes(name, "image/png", bytes.to_vec())
    }

    #[test]
    fn single_conversion_stores_result() {
        let (conv, events) = converter();
        conv.submit(png("a.png", b"abc")).unwrap();
        let outcome = conv.convert_single(0).unwrap();
        assert!(matches!(
            outcome,
            SingleOutcome::Converted { position: 0, ref output_name } if output_name == "a.jpg"
        ));
        assert_eq!(conv.status(0).unwrap(), ItemStatus::Completed);
        let file = conv.download(0).unwrap();
        assert_eq!(file.bytes.as_slice(), b"cba");
        assert_eq!(file.output_name, "a.jpg");

        let statuses: Vec<_> = events
            .try_iter()
            .filter_map(|e| match e {
                EngineEvent::StatusChanged { status, .. } => Some(status),
                _ => None,
            })
            .collect();
        assert_eq!(
            statuses,
            vec![ItemStatus::Pending, ItemStatus::Processing, ItemStatus::Completed]
        );
    }

    #[test]
    fn single_conversion_failure_is_recorded() {
        let (conv, _events) = converter();
        conv.submit(png("bad.png", b"!oops")).unwrap();
        match conv.convert_single(0).unwrap() {
            SingleOutcome::Failed { position, error } => {
                assert_eq!(position, 0);
                assert!(matches!(error, ConverterError::DecodeFailed { .. }));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(conv.status(0).unwrap(), ItemStatus::Failed);
        assert!(matches!(
            conv.download(0),
            Err(ConverterError::NotConverted { .. })
        ));
        // the lease is free again
        assert_eq!(conv.active_conversion(), None);
    }

    #[test]
    fn single_conversion_refused_while_leased() {
        let (conv, _events) = converter();
        conv.submit(png("a.png", b"abc")).unwrap();
        let _held = conv.inner.lease.try_acquire(LeaseKind::Batch).unwrap();
        let err = conv.convert_single(0).unwrap_err();
        assert!(matches!(err, ConverterError::ConversionInProgress { .. }));
        assert_eq!(conv.status(0).unwrap(), ItemStatus::Pending);
    }

    #[test]
    fn not_started_pool_is_transient_error() {
        let pool = WorkerPool::new(1, Arc::new(ReverseCodec));
        let conv = Converter::from_pool(EngineConfig::default(), pool, Arc::new(NoopSink));
        conv.submit(png("a.png", b"abc")).unwrap();
        let err = conv.convert_single(0).unwrap_err();
        assert!(matches!(err, ConverterError::EngineNotReady));
        assert!(err.is_recoverable());
        conv.start().unwrap();
        assert!(matches!(
            conv.convert_single(0).unwrap(),
            SingleOutcome::Converted { .. }
        ));
    }

    #[test]
    fn removal_shifts_results() {
        let (conv, _events) = converter();
        for name in ["a.png", "b.png", "c.png"] {
            conv.submit(png(name, name.as_bytes())).unwrap();
        }
        conv.convert_single(2).unwrap();
        conv.remove_at(0).unwrap();
        assert_eq!(conv.status(1).unwrap(), ItemStatus::Completed);
        assert_eq!(conv.download(1).unwrap().output_name, "c.jpg");
        assert_eq!(conv.status(0).unwrap(), ItemStatus::Pending);
    }

    #[test]
    fn stale_generation_is_discarded() {
        let (conv, _events) = converter();
        conv.submit(png("a.png", b"abc")).unwrap();
        let id = ItemId::new("a.png", 3);
        conv.clear();
        conv.submit(png("a.png", b"abc")).unwrap();
        // a completion dispatched before the clear
        let absorbed = conv.inner.absorb(&id, 0, Ok(vec![1]));
        assert_eq!(absorbed, Absorbed::Discarded);
        assert_eq!(conv.status(0).unwrap(), ItemStatus::Pending);
        let absorbed = conv.inner.absorb(&id, 1, Ok(vec![1]));
        assert_eq!(
            absorbed,
            Absorbed::Written {
                position: 0,
                status: ItemStatus::Completed
            }
        );
    }

    #[test]
    fn submit_all_reports_rejections() {
        let (conv, _events) = converter();
        let report = conv.submit_all(vec![
            png("a.png", b"1"),
            png("a.png", b"1"),
            Candidate::from_bytes("b.webp", "image/webp", vec![1]),
        ]);
        assert_eq!(report.accepted_count(), 1);
        assert_eq!(report.rejected_count(RejectReason::Duplicate), 1);
        assert_eq!(report.rejected_count(RejectReason::Type), 1);
        assert_eq!(conv.len(), 1);
    }

    #[test]
    fn download_all_and_export_in_order() {
        let (conv, _events) = converter();
        for name in ["x.png", "y.png", "z.png"] {
            conv.submit(png(name, name.as_bytes())).unwrap();
        }
        conv.convert_single(2).unwrap();
        conv.convert_single(0).unwrap();
        let names: Vec<_> = conv
            .download_all()
            .into_iter()
            .map(|f| f.output_name)
            .collect();
        assert_eq!(names, vec!["x.jpg", "z.jpg"]);

        let dir = tempfile::tempdir().unwrap();
        let written = conv.export_all(dir.path()).unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(std::fs::read(dir.path().join("z.jpg")).unwrap(), b"gnp.z");
        assert!(matches!(
            conv.export(1, dir.path()),
            Err(ConverterError::NotConverted { .. })
        ));
    }

    #[test]
    fn export_all_keeps_items_with_clashing_names() {
        let (conv, _events) = converter();
        conv.submit(png("a.png", b"AAA")).unwrap();
        conv.submit(png("a.png", b"BBBB")).unwrap();
        conv.submit(png("a.PNG", b"CC")).unwrap();
        conv.submit(png("b.png", b"D")).unwrap();
        for position in 0..4 {
            conv.convert_single(position).unwrap();
        }

        let dir = tempfile::tempdir().unwrap();
        let written = conv.export_all(dir.path()).unwrap();
        let names: Vec<_> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jpg", "a (1).jpg", "a (2).jpg", "b.jpg"]);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 4);
        assert_eq!(std::fs::read(dir.path().join("a.jpg")).unwrap(), b"AAA");
        assert_eq!(std::fs::read(dir.path().join("a (1).jpg")).unwrap(), b"BBBB");
        assert_eq!(std::fs::read(dir.path().join("a (2).jpg")).unwrap(), b"CC");
    }

    #[test]
    fn unique_name_skips_taken_suffixes() {
        let mut taken = HashSet::new();
        assert_eq!(unique_name("a (1).jpg", &mut taken), "a (1).jpg");
        assert_eq!(unique_name("a.jpg", &mut taken), "a.jpg");
        assert_eq!(unique_name("A.JPG", &mut taken), "A (2).JPG");
        assert_eq!(unique_name("noext", &mut taken), "noext");
        assert_eq!(unique_name("noext", &mut taken), "noext (1)");
        assert_eq!(unique_name(".hidden", &mut taken), ".hidden");
        assert_eq!(unique_name(".hidden", &mut taken), ".hidden (1)");
    }

    #[test]
    fn quality_mode_switch_applies() {
        let (conv, _events) = converter();
        assert_eq!(conv.quality_mode(), QualityMode::Best);
        conv.set_quality_mode(QualityMode::Optimized);
        assert_eq!(conv.quality_mode(), QualityMode::Optimized);
    }

    #[test]
    fn out_of_range_positions_are_errors() {
        let (conv, _events) = converter();
        assert!(matches!(
            conv.status(0),
            Err(ConverterError::PositionOutOfRange { .. })
        ));
        assert!(matches!(
            conv.convert_single(0),
            Err(ConverterError::PositionOutOfRange { .. })
        ));
        assert!(conv.remove_at(0).is_err());
    }
}
