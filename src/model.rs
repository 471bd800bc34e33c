use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Unix milliseconds, the storage time type.
pub type Ms = i64;

pub type ManagerId = i64;
pub type SlotId = i64;

pub const DAY_MS: Ms = 86_400_000;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// The UTC calendar day `[00:00, 24:00)` of `date`.
    pub fn day(date: NaiveDate) -> Self {
        let start = date.and_time(NaiveTime::MIN).and_utc().timestamp_millis();
        Self::new(start, start + DAY_MS)
    }
}

pub fn to_utc(ms: Ms) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
}

/// `YYYY-MM-DDTHH:mm:ss.sssZ`, always three fractional digits.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The criteria a sales manager must satisfy to be offered for a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Criteria {
    pub products: BTreeSet<String>,
    pub language: String,
    pub rating: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillProfile {
    pub languages: BTreeSet<String>,
    pub products: BTreeSet<String>,
    pub customer_ratings: BTreeSet<String>,
}

impl SkillProfile {
    /// Language and rating by membership, products by superset.
    pub fn satisfies(&self, criteria: &Criteria) -> bool {
        self.languages.contains(&criteria.language)
            && self.customer_ratings.contains(&criteria.rating)
            && criteria.products.is_subset(&self.products)
    }

    pub fn entry_count(&self) -> usize {
        self.languages.len() + self.products.len() + self.customer_ratings.len()
    }

    pub fn entries(&self) -> impl Iterator<Item = &String> {
        self.languages
            .iter()
            .chain(self.products.iter())
            .chain(self.customer_ratings.iter())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: SlotId,
    pub span: Span,
    pub booked: bool,
}

#[derive(Debug, Clone)]
pub struct ManagerState {
    pub id: ManagerId,
    pub name: Option<String>,
    pub profile: SkillProfile,
    /// Slot inventory, sorted by `span.start`.
    pub slots: Vec<Slot>,
}

impl ManagerState {
    pub fn new(id: ManagerId, name: Option<String>, profile: SkillProfile) -> Self {
        Self {
            id,
            name,
            profile,
            slots: Vec::new(),
        }
    }

    /// Insert slot maintaining sort order by span.start.
    pub fn insert_slot(&mut self, slot: Slot) {
        let pos = self
            .slots
            .binary_search_by_key(&slot.span.start, |s| s.span.start)
            .unwrap_or_else(|e| e);
        self.slots.insert(pos, slot);
    }

    pub fn remove_slot(&mut self, id: SlotId) -> Option<Slot> {
        let pos = self.slots.iter().position(|s| s.id == id)?;
        Some(self.slots.remove(pos))
    }

    pub fn slot_mut(&mut self, id: SlotId) -> Option<&mut Slot> {
        self.slots.iter_mut().find(|s| s.id == id)
    }

    /// Slots whose *start* lies inside `window`. A slot that begins before
    /// the window and runs into it is not returned.
    pub fn starting_within(&self, window: &Span) -> impl Iterator<Item = &Slot> {
        let lo = self.slots.partition_point(|s| s.span.start < window.start);
        let hi = self.slots.partition_point(|s| s.span.start < window.end);
        self.slots[lo..hi].iter()
    }
}

/// WAL record format. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ManagerCreated {
        id: ManagerId,
        name: Option<String>,
        profile: SkillProfile,
    },
    ManagerDeleted {
        id: ManagerId,
    },
    SlotAdded {
        id: SlotId,
        manager_id: ManagerId,
        span: Span,
        booked: bool,
    },
    SlotBookingChanged {
        id: SlotId,
        manager_id: ManagerId,
        booked: bool,
    },
    SlotRemoved {
        id: SlotId,
        manager_id: ManagerId,
    },
}

// ── Query result types ───────────────────────────────────────────

/// One row of the slot inventory as the resolver sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRecord {
    pub manager_id: ManagerId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub booked: bool,
}

/// Free capacity at one start timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableSlot {
    #[serde(rename = "start_date")]
    pub start_timestamp: String,
    pub available_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerInfo {
    pub id: ManagerId,
    pub name: Option<String>,
    pub profile: SkillProfile,
    pub slot_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInfo {
    pub id: SlotId,
    pub manager_id: ManagerId,
    pub start: Ms,
    pub end: Ms,
    pub booked: bool,
}
