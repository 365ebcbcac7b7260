#![no_main]

use arbitrary::Arbitrary;
use batch_convert::registry::{Candidate, Registry};
use batch_convert::tracker::{ResultRecord, Tracker};
use batch_convert::EngineConfig;
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

#[derive(Arbitrary, Debug)]
enum Op {
    Submit { name: u8, size: u8, png: bool },
    Remove { position: u8 },
    Convert { position: u8 },
    Clear,
}

#[derive(Arbitrary, Debug)]
struct Input {
    capacity: u8,
    ops: Vec<Op>,
}

fuzz_target!(|input: Input| {
    let config = EngineConfig::default().with_max_items(usize::from(input.capacity % 24));
    let mut registry = Registry::new(&config);
    let mut tracker = Tracker::new();

    for op in input.ops.into_iter().take(512) {
        match op {
            Op::Submit { name, size, png } => {
                let mime = if png { "image/png" } else { "image/gif" };
                let _ = registry.submit(Candidate::from_bytes(
                    format!("{name}.png"),
                    mime,
                    vec![0; usize::from(size)],
                ));
            }
            Op::Remove { position } => {
                let position = usize::from(position);
                if registry.remove_at(position).is_ok() {
                    tracker.remove_at(position);
                }
            }
            Op::Convert { position } => {
                let position = usize::from(position);
                if let Some(item) = registry.get(position) {
                    // the record carries the identity it was written for
                    tracker.set(
                        position,
                        ResultRecord::Success {
                            payload: Arc::new(item.name().as_bytes().to_vec()),
                            output_name: item.output_name(),
                        },
                    );
                }
            }
            Op::Clear => {
                registry.clear();
                tracker.clear();
            }
        }

        assert!(registry.len() <= registry.max_items());
        for (position, item) in registry.items().iter().enumerate() {
            assert_eq!(registry.find(&item.id), Some(position));
            if let Some(ResultRecord::Success { payload, .. }) = tracker.get(position) {
                assert_eq!(payload.as_slice(), item.name().as_bytes());
            }
        }
        let progress = tracker.progress(registry.len());
        assert!(progress.percent <= 100);
    }
});
