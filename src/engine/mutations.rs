use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError, SlotIdReservation, apply_to_manager};

/// A slot as submitted by the scheduling system: `(id, manager_id, start, end, booked)`.
pub type NewSlot = (SlotId, ManagerId, Ms, Ms, bool);

pub(crate) fn validate_span(start: Ms, end: Ms) -> Result<Span, EngineError> {
    if start >= end {
        return Err(EngineError::InvalidSpan(Span { start, end }));
    }
    if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if end - start > MAX_SLOT_DURATION_MS {
        return Err(EngineError::LimitExceeded("slot too long"));
    }
    Ok(Span::new(start, end))
}

fn validate_profile(name: Option<&str>, profile: &SkillProfile) -> Result<(), EngineError> {
    if name.is_some_and(|n| n.len() > MAX_NAME_LEN) {
        return Err(EngineError::LimitExceeded("sales manager name too long"));
    }
    if profile.entry_count() > MAX_SKILL_ENTRIES {
        return Err(EngineError::LimitExceeded("too many skill entries"));
    }
    if profile.entries().any(|e| e.len() > MAX_SKILL_LEN) {
        return Err(EngineError::LimitExceeded("skill entry too long"));
    }
    Ok(())
}

impl Engine {
    pub async fn create_manager(
        &self,
        id: ManagerId,
        name: Option<String>,
        profile: SkillProfile,
    ) -> Result<(), EngineError> {
        let _gate = self.mutation_gate.read().await;
        if self.state.len() >= MAX_MANAGERS {
            return Err(EngineError::LimitExceeded("too many sales managers"));
        }
        validate_profile(name.as_deref(), &profile)?;
        if self.state.contains_key(&id) {
            return Err(EngineError::ManagerExists(id));
        }

        let event = Event::ManagerCreated {
            id,
            name: name.clone(),
            profile: profile.clone(),
        };
        self.wal_append(&event).await?;
        let ms = ManagerState::new(id, name, profile);
        self.state.insert(id, Arc::new(RwLock::new(ms)));
        Ok(())
    }

    pub async fn delete_manager(&self, id: ManagerId) -> Result<(), EngineError> {
        let _gate = self.mutation_gate.read().await;
        let shared = self
            .get_manager(&id)
            .ok_or(EngineError::ManagerNotFound(id))?;
        // Held across the append so no slot can be added in between.
        let guard = shared.write().await;
        if !guard.slots.is_empty() {
            return Err(EngineError::HasSlots(id));
        }

        let event = Event::ManagerDeleted { id };
        self.wal_append(&event).await?;
        self.state.remove(&id);
        drop(guard);
        Ok(())
    }

    pub async fn add_slot(
        &self,
        id: SlotId,
        manager_id: ManagerId,
        start: Ms,
        end: Ms,
        booked: bool,
    ) -> Result<(), EngineError> {
        let _gate = self.mutation_gate.read().await;
        let span = validate_span(start, end)?;
        let shared = self
            .get_manager(&manager_id)
            .ok_or(EngineError::ManagerNotFound(manager_id))?;
        let mut guard = shared.write().await;
        if guard.slots.len() >= MAX_SLOTS_PER_MANAGER {
            return Err(EngineError::LimitExceeded("too many slots on sales manager"));
        }
        // Slot ids are global, so the manager lock alone does not make the id ours.
        let mut reservation = SlotIdReservation::new(&self.slot_to_manager);
        reservation.claim(id, manager_id)?;

        let event = Event::SlotAdded { id, manager_id, span, booked };
        self.persist_and_apply(&mut guard, &event).await?;
        reservation.commit();
        Ok(())
    }

    /// Add several slots atomically. All-or-nothing: the batch is written to
    /// the WAL as one unit and applied only once that write is synced.
    /// Slots may belong to different managers.
    pub async fn batch_add_slots(&self, slots: Vec<NewSlot>) -> Result<(), EngineError> {
        if slots.is_empty() {
            return Ok(());
        }
        if slots.len() > MAX_BATCH_SIZE {
            return Err(EngineError::LimitExceeded("batch too large"));
        }
        let _gate = self.mutation_gate.read().await;

        let mut seen = HashSet::new();
        for &(id, _, start, end, _) in &slots {
            validate_span(start, end)?;
            if !seen.insert(id) {
                return Err(EngineError::SlotExists(id));
            }
        }

        // Lock managers in id order to avoid deadlock with a concurrent batch.
        let mut manager_ids: Vec<ManagerId> = slots.iter().map(|s| s.1).collect();
        manager_ids.sort_unstable();
        manager_ids.dedup();

        let mut guards = HashMap::with_capacity(manager_ids.len());
        for mid in manager_ids {
            let shared = self
                .get_manager(&mid)
                .ok_or(EngineError::ManagerNotFound(mid))?;
            guards.insert(mid, shared.write_owned().await);
        }

        let mut incoming: HashMap<ManagerId, usize> = HashMap::new();
        for &(_, manager_id, ..) in &slots {
            *incoming.entry(manager_id).or_default() += 1;
        }
        for (manager_id, count) in &incoming {
            if guards[manager_id].slots.len() + count > MAX_SLOTS_PER_MANAGER {
                return Err(EngineError::LimitExceeded("too many slots on sales manager"));
            }
        }

        let mut reservation = SlotIdReservation::new(&self.slot_to_manager);
        for &(id, manager_id, ..) in &slots {
            reservation.claim(id, manager_id)?;
        }

        let events: Vec<Event> = slots
            .into_iter()
            .map(|(id, manager_id, start, end, booked)| Event::SlotAdded {
                id,
                manager_id,
                span: Span::new(start, end),
                booked,
            })
            .collect();
        self.wal_append_all(events.clone()).await?;

        for event in &events {
            let Event::SlotAdded { manager_id, .. } = event else {
                continue;
            };
            if let Some(guard) = guards.get_mut(manager_id) {
                apply_to_manager(guard, event, &self.slot_to_manager);
            }
        }
        reservation.commit();
        Ok(())
    }

    /// Flip a slot between free and booked. Returns the owning manager.
    pub async fn set_slot_booked(&self, id: SlotId, booked: bool) -> Result<ManagerId, EngineError> {
        let _gate = self.mutation_gate.read().await;
        let (manager_id, mut guard) = self.resolve_slot_write(&id).await?;
        let event = Event::SlotBookingChanged { id, manager_id, booked };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(manager_id)
    }

    pub async fn remove_slot(&self, id: SlotId) -> Result<ManagerId, EngineError> {
        let _gate = self.mutation_gate.read().await;
        let (manager_id, mut guard) = self.resolve_slot_write(&id).await?;
        let event = Event::SlotRemoved { id, manager_id };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(manager_id)
    }
}
