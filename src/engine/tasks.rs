// src/engine/tasks.rs
//
// The codec worker's unit of work: decode PNG -> flatten alpha -> encode JPEG.
// Tasks run on pool threads and never block the orchestrating thread.

use crate::config::QualityMode;
use crate::engine::common::{run_with_panic_policy, EngineResult};
use crate::engine::decoder::decode_input;
use crate::engine::encoder::{encode_jpeg, flatten_onto_white};
use crate::engine::io::Source;
use std::time::Instant;

/// Payload re-encoder run by a codec worker. Implementations must be stateless
/// between calls; one instance is shared by every worker.
pub trait Codec: Send + Sync + 'static {
    fn convert(&self, payload: &[u8], quality: u8) -> EngineResult<Vec<u8>>;
}

/// PNG in, JPEG out. Transparent areas become white.
#[derive(Debug, Default, Clone, Copy)]
pub struct JpegCodec;

impl Codec for JpegCodec {
    fn convert(&self, payload: &[u8], quality: u8) -> EngineResult<Vec<u8>> {
        let img = decode_input(payload)?;
        let rgb = flatten_onto_white(&img);
        encode_jpeg(&rgb, quality)
    }
}

/// One conversion request as seen by a worker.
#[derive(Clone, Debug)]
pub struct ConvertTask {
    pub source: Source,
    pub mode: QualityMode,
}

impl ConvertTask {
    pub fn new(source: Source, mode: QualityMode) -> Self {
        Self { source, mode }
    }

    /// Run the codec under the panic policy so a bad payload cannot take the worker down.
    pub fn run(&self, codec: &dyn Codec) -> EngineResult<Vec<u8>> {
        let started = Instant::now();
        let input_len = self.source.len();
        let quality = self.mode.quality();
        let result =
            run_with_panic_policy("convert", || codec.convert(self.source.as_bytes(), quality));
        match &result {
            Ok(encoded) => tracing::debug!(
                input_len,
                output_len = encoded.len(),
                quality,
                elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
                "converted payload"
            ),
            Err(err) => tracing::debug!(input_len, quality, error = %err, "conversion failed"),
        }
        result
    }
}
