// src/tracker.rs
//
// Per-position result records. Keys follow the registry: a removal at k drops
// the record at k and shifts every record above it down by one.

use std::collections::BTreeMap;
use std::sync::Arc;

/// Result of the most recent attempt for one item. A missing record means pending.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResultRecord {
    Processing,
    Success {
        payload: Arc<Vec<u8>>,
        output_name: String,
    },
    Failed {
        reason: String,
    },
}

impl ResultRecord {
    pub fn status(&self) -> ItemStatus {
        match self {
            ResultRecord::Processing => ItemStatus::Processing,
            ResultRecord::Success { .. } => ItemStatus::Completed,
            ResultRecord::Failed { .. } => ItemStatus::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResultRecord::Success { .. })
    }
}

/// Item status as collaborators see it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ItemStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Processing => "processing",
            ItemStatus::Completed => "completed",
            ItemStatus::Failed => "failed",
        }
    }
}

/// Aggregate progress over the whole registry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Progress {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub remaining: usize,
    /// Processed share of `total`, rounded to the nearest whole percent.
    pub percent: u8,
}

impl Progress {
    pub fn new(total: usize, completed: usize, failed: usize) -> Self {
        let processed = completed + failed;
        let percent = if total == 0 {
            0
        } else {
            // round half up
            ((200 * processed.min(total) + total) / (2 * total)) as u8
        };
        Self {
            total,
            completed,
            failed,
            remaining: total.saturating_sub(processed),
            percent,
        }
    }

    pub fn processed(&self) -> usize {
        self.completed + self.failed
    }

    pub fn is_finished(&self) -> bool {
        self.remaining == 0
    }
}

#[derive(Debug, Default)]
pub struct Tracker {
    records: BTreeMap<usize, ResultRecord>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record, returning the one it replaced.
    pub fn set(&mut self, position: usize, record: ResultRecord) -> Option<ResultRecord> {
        self.records.insert(position, record)
    }

    pub fn get(&self, position: usize) -> Option<&ResultRecord> {
        self.records.get(&position)
    }

    pub fn status(&self, position: usize) -> ItemStatus {
        self.records
            .get(&position)
            .map_or(ItemStatus::Pending, ResultRecord::status)
    }

    pub fn is_success(&self, position: usize) -> bool {
        self.records.get(&position).is_some_and(ResultRecord::is_success)
    }

    /// Forget the record at `position` without moving any other record.
    pub fn unset(&mut self, position: usize) -> Option<ResultRecord> {
        self.records.remove(&position)
    }

    /// Forget the record at `position` and shift every later record down by one.
    pub fn remove_at(&mut self, position: usize) -> Option<ResultRecord> {
        let tail = self.records.split_off(&position);
        let mut removed = None;
        for (p, record) in tail {
            if p == position {
                removed = Some(record);
            } else {
                self.records.insert(p - 1, record);
            }
        }
        removed
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Drop every record that is not a success. Returns the positions reset.
    pub fn reset_unfinished(&mut self) -> Vec<usize> {
        let reset: Vec<usize> = self
            .records
            .iter()
            .filter(|(_, r)| !r.is_success())
            .map(|(p, _)| *p)
            .collect();
        for p in &reset {
            self.records.remove(p);
        }
        reset
    }

    pub fn completed(&self) -> usize {
        self.records.values().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.records
            .values()
            .filter(|r| matches!(r, ResultRecord::Failed { .. }))
            .count()
    }

    pub fn has_any_success(&self) -> bool {
        self.records.values().any(ResultRecord::is_success)
    }

    pub fn progress(&self, total: usize) -> Progress {
        Progress::new(total, self.completed(), self.failed())
    }

    /// Successful records in position order.
    pub fn successes(&self) -> impl Iterator<Item = (usize, &Arc<Vec<u8>>, &str)> {
        self.records.iter().filter_map(|(p, r)| match r {
            ResultRecord::Success {
                payload,
                output_name,
            } => Some((*p, payload, output_name.as_str())),
            _ => None,
        })
    }
}
