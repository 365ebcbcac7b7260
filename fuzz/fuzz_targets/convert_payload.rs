#![no_main]

use batch_convert::engine::{ConvertTask, JpegCodec, Source};
use batch_convert::QualityMode;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }
    let mode = if data[0] & 1 == 0 {
        QualityMode::Best
    } else {
        QualityMode::Optimized
    };
    let task = ConvertTask::new(Source::from_vec(data.to_vec()), mode);
    // Any panic inside the codec is turned into an error; only a crash is a bug.
    if let Ok(jpeg) = task.run(&JpegCodec) {
        assert!(jpeg.starts_with(&[0xFF, 0xD8]));
    }
});
