// src/engine/common.rs
//
// Common utilities shared across engine modules.
// Provides the panic policy for codec calls and the engine Result alias.

use crate::error::ConverterError;
use std::panic::{catch_unwind, AssertUnwindSafe};

pub type EngineResult<T> = std::result::Result<T, ConverterError>;

/// Run a codec stage, turning a panic into `InternalPanic` so the calling worker
/// thread survives and stays usable for the next request.
pub fn run_with_panic_policy<T, F>(stage: &'static str, f: F) -> EngineResult<T>
where
    F: FnOnce() -> EngineResult<T>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            tracing::warn!(stage, %detail, "codec panicked");
            Err(ConverterError::internal_panic(format!(
                "{stage} panicked: {detail}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_becomes_internal_error() {
        let result: EngineResult<()> = run_with_panic_policy("test:stage", || panic!("kaboom"));
        let err = result.unwrap_err();
        assert!(matches!(err, ConverterError::InternalPanic { .. }));
        assert!(err.to_string().contains("kaboom"));
        assert!(err.to_string().contains("test:stage"));
    }

    #[test]
    fn ok_and_err_pass_through() {
        assert_eq!(run_with_panic_policy("ok", || Ok(7)).unwrap(), 7);
        let err = run_with_panic_policy::<(), _>("err", || {
            Err(ConverterError::decode_failed("nope"))
        })
        .unwrap_err();
        assert!(matches!(err, ConverterError::DecodeFailed { .. }));
    }
}
