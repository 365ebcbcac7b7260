// lib.rs
//
// batch-convert: a batch PNG -> JPEG conversion engine
//
// Design goals:
// - Conversions never run on the caller's control flow
// - Results always land on the right item, whatever was removed meanwhile
// - Cancellation is cooperative and keeps finished work
// - One conversion (batch or single) at a time, enforced by ownership

// Memory allocator optimization - jemalloc for better performance
// Note: jemalloc is not supported on Windows/MSVC, so we exclude it on that platform
#[cfg(all(feature = "jemalloc", not(target_env = "msvc")))]
#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod lease;
pub mod registry;
pub mod session;
pub mod tracker;

pub use batch::{BatchOutcome, BatchReport};
pub use config::{EngineConfig, QualityMode};
pub use engine::{Codec, JpegCodec, Source, WorkerPool};
pub use error::{ConverterError, ErrorCategory, RejectReason, Result};
pub use events::{EngineEvent, EventSink, NoopSink};
pub use lease::LeaseKind;
pub use registry::{output_name, Candidate, Item, ItemId, Rejection, SubmissionReport};
pub use session::{ConvertedFile, Converter, SingleOutcome};
pub use tracker::{ItemStatus, Progress, ResultRecord};

/// Get library version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
