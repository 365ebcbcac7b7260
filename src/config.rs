// src/config.rs
//
// Engine configuration and quality presets.
// These are cheap to create and copy - nothing here touches the worker pool.

use crate::error::ConverterError;
use std::str::FromStr;
use std::time::Duration;

/// Default number of queued items.
pub const DEFAULT_MAX_ITEMS: usize = 20;

/// Default per-item payload cap (50 MiB).
pub const DEFAULT_MAX_ITEM_BYTES: u64 = 50 * 1024 * 1024;

/// The one accepted input format.
pub const ACCEPTED_MIME: &str = "image/png";

/// Extension given to converted files.
pub const OUTPUT_EXTENSION: &str = ".jpg";

/// Upper bound on codec workers, whatever the host reports.
pub const MAX_WORKERS: usize = 6;

/// Minimum number of codec workers
pub const MIN_WORKERS: usize = 1;

/// Pause between batch items so collaborators get a chance to observe progress.
pub const DEFAULT_BATCH_YIELD: Duration = Duration::from_millis(50);

/// Environment override for the worker count (clamped to [MIN_WORKERS, MAX_WORKERS]).
pub const WORKERS_ENV: &str = "BATCH_CONVERT_WORKERS";

/// Named encode-quality preset. Applied uniformly to every dispatch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum QualityMode {
    /// JPEG quality 92
    #[default]
    Best,
    /// JPEG quality 75
    Optimized,
}

impl QualityMode {
    /// Numeric JPEG quality (0-100).
    pub fn quality(self) -> u8 {
        match self {
            QualityMode::Best => 92,
            QualityMode::Optimized => 75,
        }
    }

    /// Quality as a 0.0-1.0 factor.
    pub fn factor(self) -> f32 {
        self.quality() as f32 / 100.0
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QualityMode::Best => "best",
            QualityMode::Optimized => "optimized",
        }
    }
}

impl FromStr for QualityMode {
    type Err = ConverterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "best" => Ok(Self::Best),
            "optimized" | "optimised" => Ok(Self::Optimized),
            other => Err(ConverterError::invalid_argument(
                "quality_mode",
                other.to_string(),
                "expected best or optimized",
            )),
        }
    }
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub max_items: usize,
    pub max_item_bytes: u64,
    pub accepted_mime: &'static str,
    /// None = detect from available parallelism
    pub workers: Option<usize>,
    pub quality_mode: QualityMode,
    pub batch_yield: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_items: DEFAULT_MAX_ITEMS,
            max_item_bytes: DEFAULT_MAX_ITEM_BYTES,
            accepted_mime: ACCEPTED_MIME,
            workers: None,
            quality_mode: QualityMode::Best,
            batch_yield: DEFAULT_BATCH_YIELD,
        }
    }
}

impl EngineConfig {
    /// Defaults, with the worker count taken from `BATCH_CONVERT_WORKERS` when set.
    pub fn from_env() -> Self {
        let workers = std::env::var(WORKERS_ENV)
            .ok()
            .and_then(|raw| raw.trim().parse::<usize>().ok());
        Self {
            workers,
            ..Self::default()
        }
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    pub fn with_max_item_bytes(mut self, max_item_bytes: u64) -> Self {
        self.max_item_bytes = max_item_bytes;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn with_quality_mode(mut self, mode: QualityMode) -> Self {
        self.quality_mode = mode;
        self
    }

    pub fn with_batch_yield(mut self, batch_yield: Duration) -> Self {
        self.batch_yield = batch_yield;
        self
    }

    /// Resolved worker count: explicit setting or detected parallelism, clamped to [1, 6].
    pub fn worker_count(&self) -> usize {
        let requested = self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(MIN_WORKERS)
        });
        requested.clamp(MIN_WORKERS, MAX_WORKERS)
    }
}
