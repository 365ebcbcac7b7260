// src/engine/io.rs
//
// I/O operations: payload Source, file mapping, atomic export.

use crate::error::ConverterError;
use memmap2::Mmap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Raw payload of a submitted item. Cloning is cheap (shared buffer).
#[derive(Clone, Debug)]
pub enum Source {
    /// In-memory image data
    Memory(Arc<Vec<u8>>),
    /// Memory-mapped file (zero-copy access)
    Mapped(Arc<Mmap>),
}

impl Source {
    pub fn from_vec(data: Vec<u8>) -> Self {
        Source::Memory(Arc::new(data))
    }

    /// Map a file read-only.
    pub fn map_file(path: &Path) -> Result<Self, ConverterError> {
        let display = path.display().to_string();
        let file = File::open(path).map_err(|e| ConverterError::file_read_failed(display.clone(), e))?;
        // Safety: the file is assumed not to be modified externally while mapped.
        // If it is, decoding may fail or produce garbage; on some platforms the process
        // can receive SIGBUS.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| ConverterError::mmap_failed(display, e))?;
        Ok(Source::Mapped(Arc::new(mmap)))
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Source::Memory(data) => data.as_slice(),
            Source::Mapped(mmap) => mmap.as_ref(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Source::Memory(data) => data.len(),
            Source::Mapped(mmap) => mmap.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Guess a MIME type from a file extension. Unknown extensions map to
/// `application/octet-stream` so the registry rejects them on type.
pub fn mime_from_path(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        _ => "application/octet-stream",
    }
}

/// Write `data` to `target` atomically: temp file in the same directory, fsync, rename.
/// tempfile removes the temp file if any step fails.
pub fn write_atomic(target: &Path, data: &[u8]) -> Result<PathBuf, ConverterError> {
    let dir = target.parent().filter(|p| !p.as_os_str().is_empty()).ok_or_else(|| {
        ConverterError::invalid_argument(
            "path",
            target.display().to_string(),
            "output path must include a parent directory",
        )
    })?;

    let mut temp_file = NamedTempFile::new_in(dir)
        .map_err(|e| ConverterError::file_write_failed(dir.display().to_string(), e))?;
    let temp_path = temp_file.path().to_path_buf();

    temp_file
        .write_all(data)
        .map_err(|e| ConverterError::file_write_failed(temp_path.display().to_string(), e))?;
    temp_file
        .as_file_mut()
        .sync_all()
        .map_err(|e| ConverterError::file_write_failed(temp_path.display().to_string(), e))?;

    temp_file
        .persist(target)
        .map_err(|e| ConverterError::file_write_failed(target.display().to_string(), e.error))?;

    Ok(target.to_path_buf())
}
