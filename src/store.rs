//! The read interface the availability pipeline runs against.
//!
//! The matcher and the resolver only ever see a [`SlotStore`]; the in-process
//! [`Engine`] is the production implementation, tests plug in fakes.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::engine::Engine;
use crate::model::{Criteria, ManagerId, SlotRecord};

#[async_trait]
pub trait SlotStore: Send + Sync {
    /// Ids of the sales managers that speak `criteria.language`, carry
    /// `criteria.rating` and cover every product in `criteria.products`.
    async fn match_managers(&self, criteria: &Criteria) -> Result<Vec<ManagerId>, StorageError>;

    /// Booked and free slots of `managers` whose start falls on `date` (UTC).
    async fn load_slots(
        &self,
        managers: &[ManagerId],
        date: NaiveDate,
    ) -> Result<Vec<SlotRecord>, StorageError>;
}

#[async_trait]
impl SlotStore for Engine {
    async fn match_managers(&self, criteria: &Criteria) -> Result<Vec<ManagerId>, StorageError> {
        Ok(self.matching_managers(criteria).await)
    }

    async fn load_slots(
        &self,
        managers: &[ManagerId],
        date: NaiveDate,
    ) -> Result<Vec<SlotRecord>, StorageError> {
        self.slots_on(managers, date)
            .await
            .map_err(|e| StorageError::malformed(StorageOp::LoadSlots, e.to_string()))
    }
}

// ── Errors ────────────────────────────────────────────────────

/// Which read failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOp {
    MatchManagers,
    LoadSlots,
}

impl StorageOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageOp::MatchManagers => "match_managers",
            StorageOp::LoadSlots => "load_slots",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageErrorKind {
    Unavailable(String),
    Timeout(Duration),
    MalformedRow(String),
}

impl StorageErrorKind {
    pub fn label(&self) -> &'static str {
        match self {
            StorageErrorKind::Unavailable(_) => "unavailable",
            StorageErrorKind::Timeout(_) => "timeout",
            StorageErrorKind::MalformedRow(_) => "malformed_row",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageError {
    pub op: StorageOp,
    pub kind: StorageErrorKind,
}

impl StorageError {
    pub fn unavailable(op: StorageOp, reason: impl Into<String>) -> Self {
        Self { op, kind: StorageErrorKind::Unavailable(reason.into()) }
    }

    pub fn timeout(op: StorageOp, after: Duration) -> Self {
        Self { op, kind: StorageErrorKind::Timeout(after) }
    }

    pub fn malformed(op: StorageOp, reason: impl Into<String>) -> Self {
        Self { op, kind: StorageErrorKind::MalformedRow(reason.into()) }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, StorageErrorKind::Timeout(_))
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = self.op.as_str();
        match &self.kind {
            StorageErrorKind::Unavailable(reason) => write!(f, "{op}: storage unavailable: {reason}"),
            StorageErrorKind::Timeout(after) => {
                write!(f, "{op}: read timed out after {}ms", after.as_millis())
            }
            StorageErrorKind::MalformedRow(reason) => write!(f, "{op}: malformed row: {reason}"),
        }
    }
}

impl std::error::Error for StorageError {}
