//! Slot resolution: turns a day's slot inventory for a set of managers into
//! free capacity per start timestamp.
//!
//! A free slot occupies `[start, start + slot_length)` regardless of its
//! stored end. It is discarded if that window overlaps any booked interval of
//! the same manager. Touching endpoints do not overlap. Surviving free slots
//! are counted by start timestamp across managers.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};

use crate::model::{AvailableSlot, ManagerId, SlotRecord, format_timestamp};
use crate::store::{SlotStore, StorageError};

pub fn default_slot_length() -> TimeDelta {
    TimeDelta::hours(1)
}

/// A booked `[start, end)` interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookedInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Free slot starts and booked intervals, both keyed by manager.
#[derive(Debug, Default)]
pub struct Partitioned {
    pub free: Vec<(ManagerId, DateTime<Utc>)>,
    pub booked: HashMap<ManagerId, Vec<BookedInterval>>,
}

pub fn partition(records: &[SlotRecord]) -> Partitioned {
    let mut out = Partitioned::default();
    for r in records {
        if r.booked {
            out.booked
                .entry(r.manager_id)
                .or_default()
                .push(BookedInterval { start: r.start, end: r.end });
        } else {
            out.free.push((r.manager_id, r.start));
        }
    }
    out
}

/// Whether a free slot starting at `start` collides with any of `booked`.
pub fn conflicts(start: DateTime<Utc>, slot_length: TimeDelta, booked: &[BookedInterval]) -> bool {
    let end = start + slot_length;
    booked.iter().any(|b| start < b.end && end > b.start)
}

/// Count unconflicted free slots by start timestamp.
pub fn aggregate(parts: &Partitioned, slot_length: TimeDelta) -> BTreeMap<DateTime<Utc>, u32> {
    let mut counts = BTreeMap::new();
    for (manager_id, start) in &parts.free {
        let booked = parts.booked.get(manager_id).map(Vec::as_slice).unwrap_or(&[]);
        if !conflicts(*start, slot_length, booked) {
            *counts.entry(*start).or_insert(0) += 1;
        }
    }
    counts
}

pub fn to_available(counts: BTreeMap<DateTime<Utc>, u32>) -> Vec<AvailableSlot> {
    counts
        .into_iter()
        .map(|(start, available_count)| AvailableSlot {
            start_timestamp: format_timestamp(&start),
            available_count,
        })
        .collect()
}

pub struct SlotResolver {
    store: Arc<dyn SlotStore>,
    slot_length: TimeDelta,
}

impl SlotResolver {
    pub fn new(store: Arc<dyn SlotStore>, slot_length: TimeDelta) -> Self {
        Self { store, slot_length }
    }

    pub fn slot_length(&self) -> TimeDelta {
        self.slot_length
    }

    /// Free capacity on `date` across `managers`, one read for booked and
    /// free slots alike. Ascending by start timestamp.
    pub async fn resolve(
        &self,
        date: NaiveDate,
        managers: &BTreeSet<ManagerId>,
    ) -> Result<Vec<AvailableSlot>, StorageError> {
        if managers.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<ManagerId> = managers.iter().copied().collect();
        let records = self.store.load_slots(&ids, date).await?;
        Ok(self.tally(&records))
    }

    /// The pure half of [`resolve`](Self::resolve).
    pub fn tally(&self, records: &[SlotRecord]) -> Vec<AvailableSlot> {
        to_available(aggregate(&partition(records), self.slot_length))
    }
}
