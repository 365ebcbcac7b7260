// src/engine.rs
//
// The conversion engine: a fixed pool of codec workers that turn PNG payloads
// into JPEG off the caller's thread.
//
// This file is a facade over the modules in engine/

// =============================================================================
// SECURITY LIMITS
// =============================================================================

/// Maximum allowed image dimension (width or height).
/// Images larger than 32768x32768 are rejected to prevent decompression bombs.
pub const MAX_DIMENSION: u32 = 32768;

/// Maximum allowed total pixels (width * height).
/// 100 megapixels = 400MB uncompressed RGBA. Beyond this is likely malicious.
pub const MAX_PIXELS: u64 = 100_000_000;

// =============================================================================
// MODULE DECOMPOSITION
// =============================================================================

mod common;
mod decoder;
mod encoder;
mod io;
mod pool;
mod semaphore;
mod tasks;

pub use common::{run_with_panic_policy, EngineResult};
pub use decoder::{check_dimensions, decode_input, decode_png};
pub use encoder::{encode_jpeg, flatten_onto_white};
pub use io::{mime_from_path, write_atomic, Source};
pub use pool::{Completion, PendingConversion, Reservation, WorkerPool};
pub use semaphore::{CountingSemaphore, Permit};
pub use tasks::{Codec, ConvertTask, JpegCodec};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QualityMode;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;
    use std::sync::Arc;

    #[test]
    fn limits_are_consistent() {
        assert!((MAX_DIMENSION as u64) * (MAX_DIMENSION as u64) > MAX_PIXELS);
        assert!(check_dimensions(MAX_DIMENSION, 1).is_ok());
        assert!(check_dimensions(MAX_DIMENSION + 1, 1).is_err());
    }

    #[test]
    fn pool_converts_real_png_end_to_end() {
        let mut png = Vec::new();
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([255, 0, 0, 255])))
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let pool = WorkerPool::new(2, Arc::new(JpegCodec));
        pool.start().unwrap();
        let jpeg = pool
            .dispatch(Source::from_vec(png), QualityMode::Best)
            .unwrap()
            .wait()
            .unwrap();
        assert_eq!(&jpeg[..3], &[0xFF, 0xD8, 0xFF]);
    }
}
