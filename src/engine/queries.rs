use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::model::*;

use super::{Engine, EngineError, SharedManagerState};

impl Engine {
    fn managers_snapshot(&self) -> Vec<SharedManagerState> {
        // Clone the Arcs out first: DashMap shard locks must not be held across an await.
        self.state.iter().map(|e| e.value().clone()).collect()
    }

    /// Ids of every sales manager whose skill profile satisfies `criteria`.
    pub async fn matching_managers(&self, criteria: &Criteria) -> Vec<ManagerId> {
        let mut matched = Vec::new();
        for shared in self.managers_snapshot() {
            let guard = shared.read().await;
            if guard.profile.satisfies(criteria) {
                matched.push(guard.id);
            }
        }
        matched
    }

    /// Every slot of `managers` whose start falls on `date` (UTC), booked or not.
    /// Unknown ids are skipped: a manager deleted since matching owns no slots.
    pub async fn slots_on(
        &self,
        managers: &[ManagerId],
        date: NaiveDate,
    ) -> Result<Vec<SlotRecord>, EngineError> {
        let day = Span::day(date);
        let ids: BTreeSet<ManagerId> = managers.iter().copied().collect();

        let mut records = Vec::new();
        for id in ids {
            let Some(shared) = self.get_manager(&id) else {
                continue;
            };
            let guard = shared.read().await;
            for slot in guard.starting_within(&day) {
                let (Some(start), Some(end)) = (to_utc(slot.span.start), to_utc(slot.span.end)) else {
                    return Err(EngineError::InvalidSpan(slot.span));
                };
                records.push(SlotRecord {
                    manager_id: id,
                    start,
                    end,
                    booked: slot.booked,
                });
            }
        }
        Ok(records)
    }

    pub async fn list_managers(&self) -> Vec<ManagerInfo> {
        let mut out = Vec::new();
        for shared in self.managers_snapshot() {
            let guard = shared.read().await;
            out.push(ManagerInfo {
                id: guard.id,
                name: guard.name.clone(),
                profile: guard.profile.clone(),
                slot_count: guard.slots.len(),
            });
        }
        out.sort_by_key(|m| m.id);
        out
    }

    pub async fn list_slots(&self, manager_id: ManagerId) -> Result<Vec<SlotInfo>, EngineError> {
        let shared = self
            .get_manager(&manager_id)
            .ok_or(EngineError::ManagerNotFound(manager_id))?;
        let guard = shared.read().await;
        Ok(guard
            .slots
            .iter()
            .map(|s| SlotInfo {
                id: s.id,
                manager_id,
                start: s.span.start,
                end: s.span.end,
                booked: s.booked,
            })
            .collect())
    }
}
