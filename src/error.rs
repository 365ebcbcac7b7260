// src/error.rs
//
// Unified error handling for batch-convert
// Uses thiserror for simple, type-safe error handling
//
// Error Taxonomy:
// - UserError: Rejected submissions and bad requests, recoverable
// - Transient: Engine still loading or busy, retry later
// - CodecError: Decode/encode failures of a single item
// - ResourceLimit: File system and mapping failures
// - InternalBug: Library bugs or a torn-down engine (should not happen)

use std::borrow::Cow;
use thiserror::Error;

/// Error taxonomy used by collaborators to decide how to surface a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCategory {
    /// Invalid input or request, recoverable by user
    UserError,
    /// Engine not ready or busy; the same request may succeed later
    Transient,
    /// Format/encoding issues
    CodecError,
    /// File system / memory mapping limits
    ResourceLimit,
    /// Library bugs (should not happen)
    InternalBug,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::UserError => "UserError",
            ErrorCategory::Transient => "Transient",
            ErrorCategory::CodecError => "CodecError",
            ErrorCategory::ResourceLimit => "ResourceLimit",
            ErrorCategory::InternalBug => "InternalBug",
        }
    }
}

/// Why a candidate was refused by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    Size,
    Type,
    Duplicate,
    Limit,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Size => "size",
            RejectReason::Type => "type",
            RejectReason::Duplicate => "duplicate",
            RejectReason::Limit => "limit",
        }
    }
}

/// batch-convert error types
#[derive(Debug, Error)]
pub enum ConverterError {
    // Validation Errors
    #[error("{name} is too large ({size} bytes, max {max})")]
    Oversize {
        name: Cow<'static, str>,
        size: u64,
        max: u64,
    },

    #[error("{name} is not a supported image type ({mime})")]
    UnsupportedType {
        name: Cow<'static, str>,
        mime: Cow<'static, str>,
    },

    #[error("{name} ({size} bytes) is already in the list")]
    Duplicate { name: Cow<'static, str>, size: u64 },

    #[error("Limit reached: at most {max} files can be queued")]
    LimitReached { max: usize },

    // Request Errors
    #[error("Position {position} is out of range (len {len})")]
    PositionOutOfRange { position: usize, len: usize },

    #[error("{name} has not been converted yet")]
    NotConverted { name: Cow<'static, str> },

    #[error("No files selected")]
    NoItems,

    #[error("Invalid value for {name}: {value}. {reason}")]
    InvalidArgument {
        name: Cow<'static, str>,
        value: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    // Transient Errors
    #[error("Engine loading...")]
    EngineNotReady,

    #[error("A {active} conversion is already in progress")]
    ConversionInProgress { active: Cow<'static, str> },

    // Codec Errors
    #[error("Failed to decode image: {message}")]
    DecodeFailed { message: Cow<'static, str> },

    #[error("Failed to encode as {format}: {message}")]
    EncodeFailed {
        format: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    #[error("Image dimension {dimension} exceeds maximum {max}")]
    DimensionExceedsLimit { dimension: u32, max: u32 },

    #[error("Image pixel count {pixels} exceeds maximum {max}")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    // File I/O Errors
    #[error("Failed to read file '{path}': {source}")]
    FileReadFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to memory-map file '{path}': {source}")]
    MmapFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWriteFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    // Internal Errors
    #[error("Engine has been shut down")]
    EngineShutDown,

    #[error("Codec worker {worker} is gone")]
    WorkerLost { worker: usize },

    #[error("Internal error: {message}")]
    InternalPanic { message: Cow<'static, str> },
}

fn clone_io(source: &std::io::Error) -> std::io::Error {
    std::io::Error::new(source.kind(), source.to_string())
}

impl Clone for ConverterError {
    fn clone(&self) -> Self {
        match self {
            Self::Oversize { name, size, max } => Self::Oversize {
                name: name.clone(),
                size: *size,
                max: *max,
            },
            Self::UnsupportedType { name, mime } => Self::UnsupportedType {
                name: name.clone(),
                mime: mime.clone(),
            },
            Self::Duplicate { name, size } => Self::Duplicate {
                name: name.clone(),
                size: *size,
            },
            Self::LimitReached { max } => Self::LimitReached { max: *max },
            Self::PositionOutOfRange { position, len } => Self::PositionOutOfRange {
                position: *position,
                len: *len,
            },
            Self::NotConverted { name } => Self::NotConverted { name: name.clone() },
            Self::NoItems => Self::NoItems,
            Self::InvalidArgument {
                name,
                value,
                reason,
            } => Self::InvalidArgument {
                name: name.clone(),
                value: value.clone(),
                reason: reason.clone(),
            },
            Self::EngineNotReady => Self::EngineNotReady,
            Self::ConversionInProgress { active } => Self::ConversionInProgress {
                active: active.clone(),
            },
            Self::DecodeFailed { message } => Self::DecodeFailed {
                message: message.clone(),
            },
            Self::EncodeFailed { format, message } => Self::EncodeFailed {
                format: format.clone(),
                message: message.clone(),
            },
            Self::DimensionExceedsLimit { dimension, max } => Self::DimensionExceedsLimit {
                dimension: *dimension,
                max: *max,
            },
            Self::PixelCountExceedsLimit { pixels, max } => Self::PixelCountExceedsLimit {
                pixels: *pixels,
                max: *max,
            },
            Self::FileReadFailed { path, source } => Self::FileReadFailed {
                path: path.clone(),
                source: clone_io(source),
            },
            Self::MmapFailed { path, source } => Self::MmapFailed {
                path: path.clone(),
                source: clone_io(source),
            },
            Self::FileWriteFailed { path, source } => Self::FileWriteFailed {
                path: path.clone(),
                source: clone_io(source),
            },
            Self::EngineShutDown => Self::EngineShutDown,
            Self::WorkerLost { worker } => Self::WorkerLost { worker: *worker },
            Self::InternalPanic { message } => Self::InternalPanic {
                message: message.clone(),
            },
        }
    }
}

// Constructor Helpers
impl ConverterError {
    pub fn oversize(name: impl Into<Cow<'static, str>>, size: u64, max: u64) -> Self {
        Self::Oversize {
            name: name.into(),
            size,
            max,
        }
    }

    pub fn unsupported_type(
        name: impl Into<Cow<'static, str>>,
        mime: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::UnsupportedType {
            name: name.into(),
            mime: mime.into(),
        }
    }

    pub fn duplicate(name: impl Into<Cow<'static, str>>, size: u64) -> Self {
        Self::Duplicate {
            name: name.into(),
            size,
        }
    }

    pub fn limit_reached(max: usize) -> Self {
        Self::LimitReached { max }
    }

    pub fn position_out_of_range(position: usize, len: usize) -> Self {
        Self::PositionOutOfRange { position, len }
    }

    pub fn not_converted(name: impl Into<Cow<'static, str>>) -> Self {
        Self::NotConverted { name: name.into() }
    }

    pub fn invalid_argument(
        name: impl Into<Cow<'static, str>>,
        value: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn conversion_in_progress(active: impl Into<Cow<'static, str>>) -> Self {
        Self::ConversionInProgress {
            active: active.into(),
        }
    }

    pub fn decode_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::DecodeFailed {
            message: message.into(),
        }
    }

    pub fn encode_failed(
        format: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::EncodeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn dimension_exceeds_limit(dimension: u32, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn file_read_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            source,
        }
    }

    pub fn mmap_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::MmapFailed {
            path: path.into(),
            source,
        }
    }

    pub fn file_write_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::FileWriteFailed {
            path: path.into(),
            source,
        }
    }

    pub fn internal_panic(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InternalPanic {
            message: message.into(),
        }
    }

    /// Registry rejection reason, for the four submission validation errors.
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Self::Oversize { .. } => Some(RejectReason::Size),
            Self::UnsupportedType { .. } => Some(RejectReason::Type),
            Self::Duplicate { .. } => Some(RejectReason::Duplicate),
            Self::LimitReached { .. } => Some(RejectReason::Limit),
            _ => None,
        }
    }

    /// Check if this error is recoverable (the user or a retry can fix it)
    ///
    /// Consistent with category():
    /// - UserError, Transient and ResourceLimit are recoverable
    /// - CodecError and InternalBug are not
    pub fn is_recoverable(&self) -> bool {
        match self.category() {
            ErrorCategory::UserError | ErrorCategory::Transient | ErrorCategory::ResourceLimit => {
                true
            }
            ErrorCategory::CodecError | ErrorCategory::InternalBug => false,
        }
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Oversize { .. }
            | Self::UnsupportedType { .. }
            | Self::Duplicate { .. }
            | Self::LimitReached { .. }
            | Self::PositionOutOfRange { .. }
            | Self::NotConverted { .. }
            | Self::NoItems
            | Self::InvalidArgument { .. } => ErrorCategory::UserError,

            Self::EngineNotReady | Self::ConversionInProgress { .. } => ErrorCategory::Transient,

            Self::DecodeFailed { .. }
            | Self::EncodeFailed { .. }
            // Dimension guards fire while decoding a single item, so they fail that
            // item like any other codec error.
            | Self::DimensionExceedsLimit { .. }
            | Self::PixelCountExceedsLimit { .. } => ErrorCategory::CodecError,

            Self::FileReadFailed { .. }
            | Self::MmapFailed { .. }
            | Self::FileWriteFailed { .. } => ErrorCategory::ResourceLimit,

            Self::EngineShutDown | Self::WorkerLost { .. } | Self::InternalPanic { .. } => {
                ErrorCategory::InternalBug
            }
        }
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, ConverterError>;
