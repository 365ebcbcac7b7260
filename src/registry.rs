// src/registry.rs
//
// Ordered collection of submitted items.
//
// Positions are a volatile view: any removal shifts everything above it down by
// one. The stable key is the identity (name, size), kept in an explicit
// identity -> position index that is rebuilt for the shifted tail on every
// mutation.

use crate::config::{EngineConfig, OUTPUT_EXTENSION};
use crate::engine::{mime_from_path, Source};
use crate::error::{ConverterError, RejectReason, Result};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Stable identity of an item.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId {
    pub name: String,
    pub size: u64,
}

impl ItemId {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.name, self.size)
    }
}

/// An accepted submission. Immutable once stored.
#[derive(Debug)]
pub struct Item {
    pub id: ItemId,
    pub mime: String,
    pub payload: Source,
}

impl Item {
    pub fn name(&self) -> &str {
        &self.id.name
    }

    pub fn size(&self) -> u64 {
        self.id.size
    }

    /// File name the converted output is offered under.
    pub fn output_name(&self) -> String {
        output_name(&self.id.name)
    }
}

/// Something a collaborator wants to add. Size is the payload length.
#[derive(Clone, Debug)]
pub struct Candidate {
    pub name: String,
    pub mime: String,
    pub payload: Source,
}

impl Candidate {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, payload: Source) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            payload,
        }
    }

    pub fn from_bytes(name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::new(name, mime, Source::from_vec(bytes))
    }

    /// Memory-map a file. The MIME type is guessed from the extension, so a
    /// non-PNG file is still built and then rejected on type at submission.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                ConverterError::invalid_argument(
                    "path",
                    path.display().to_string(),
                    "path has no file name",
                )
            })?;
        let payload = Source::map_file(path)?;
        Ok(Self::new(name, mime_from_path(path), payload))
    }

    pub fn size(&self) -> u64 {
        self.payload.len() as u64
    }

    pub fn id(&self) -> ItemId {
        ItemId::new(self.name.clone(), self.size())
    }
}

/// Replace the last extension with `.jpg`, or append it when there is none.
/// A dot inside a directory-like component does not count as an extension.
pub fn output_name(name: &str) -> String {
    let stem = match name.rfind('.') {
        Some(dot) if dot + 1 < name.len() && !name[dot + 1..].contains('/') => &name[..dot],
        _ => name,
    };
    format!("{stem}{OUTPUT_EXTENSION}")
}

/// One refused candidate in a [`SubmissionReport`].
#[derive(Clone, Debug)]
pub struct Rejection {
    pub id: ItemId,
    pub reason: RejectReason,
    pub error: ConverterError,
}

/// Outcome of [`Registry::submit_all`].
#[derive(Clone, Debug, Default)]
pub struct SubmissionReport {
    /// Position and identity of each accepted candidate, in submission order.
    pub accepted: Vec<(usize, ItemId)>,
    pub rejected: Vec<Rejection>,
}

impl SubmissionReport {
    pub fn accepted_count(&self) -> usize {
        self.accepted.len()
    }

    pub fn rejected_count(&self, reason: RejectReason) -> usize {
        self.rejected.iter().filter(|r| r.reason == reason).count()
    }

    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

#[derive(Debug)]
pub struct Registry {
    items: Vec<Arc<Item>>,
    index: HashMap<ItemId, usize>,
    max_items: usize,
    max_item_bytes: u64,
    accepted_mime: &'static str,
}

impl Registry {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            items: Vec::with_capacity(config.max_items),
            index: HashMap::with_capacity(config.max_items),
            max_items: config.max_items,
            max_item_bytes: config.max_item_bytes,
            accepted_mime: config.accepted_mime,
        }
    }

    /// Validate and append. Checks run size, type, duplicate, then limit, so a
    /// full registry still reports the more specific reason first.
    pub fn submit(&mut self, candidate: Candidate) -> Result<usize> {
        let size = candidate.size();
        if size > self.max_item_bytes {
            return Err(ConverterError::oversize(
                candidate.name,
                size,
                self.max_item_bytes,
            ));
        }
        if !candidate.mime.eq_ignore_ascii_case(self.accepted_mime) {
            return Err(ConverterError::unsupported_type(
                candidate.name,
                candidate.mime,
            ));
        }
        let id = ItemId::new(candidate.name, size);
        if self.index.contains_key(&id) {
            return Err(ConverterError::duplicate(id.name, id.size));
        }
        if self.items.len() >= self.max_items {
            return Err(ConverterError::limit_reached(self.max_items));
        }

        let position = self.items.len();
        self.index.insert(id.clone(), position);
        self.items.push(Arc::new(Item {
            id,
            mime: candidate.mime,
            payload: candidate.payload,
        }));
        Ok(position)
    }

    /// Submit every candidate in order. A rejection never stops the rest.
    pub fn submit_all<I>(&mut self, candidates: I) -> SubmissionReport
    where
        I: IntoIterator<Item = Candidate>,
    {
        let mut report = SubmissionReport::default();
        for candidate in candidates {
            let id = candidate.id();
            match self.submit(candidate) {
                Ok(position) => report.accepted.push((position, id)),
                Err(error) => {
                    // submit only fails with validation errors
                    let reason = error.reject_reason().unwrap_or(RejectReason::Type);
                    report.rejected.push(Rejection { id, reason, error });
                }
            }
        }
        report
    }

    /// Remove the item at `position`; everything above shifts down by one.
    pub fn remove_at(&mut self, position: usize) -> Result<Arc<Item>> {
        if position >= self.items.len() {
            return Err(ConverterError::position_out_of_range(
                position,
                self.items.len(),
            ));
        }
        let removed = self.items.remove(position);
        self.index.remove(&removed.id);
        for (offset, item) in self.items[position..].iter().enumerate() {
            if let Some(slot) = self.index.get_mut(&item.id) {
                *slot = position + offset;
            }
        }
        Ok(removed)
    }

    /// Drop everything. Returns how many items were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.items.len();
        self.items.clear();
        self.index.clear();
        removed
    }

    /// Current position of an identity.
    pub fn find(&self, id: &ItemId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn position_of(&self, name: &str, size: u64) -> Option<usize> {
        self.find(&ItemId::new(name, size))
    }

    pub fn get(&self, position: usize) -> Option<&Arc<Item>> {
        self.items.get(position)
    }

    pub fn items(&self) -> &[Arc<Item>] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    pub fn remaining_capacity(&self) -> usize {
        self.max_items.saturating_sub(self.items.len())
    }
}
