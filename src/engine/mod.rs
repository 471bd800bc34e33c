mod error;
mod mutations;
mod queries;
#[cfg(test)]
mod tests;

pub use error::EngineError;
pub use mutations::NewSlot;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{mpsc, oneshot, RwLock};

use crate::model::*;
use crate::wal::Wal;

pub type SharedManagerState = Arc<RwLock<ManagerState>>;

// ── Group-commit WAL channel ─────────────────────────────

/// Events of one `Append` are written and synced together.
pub(super) enum WalCommand {
    Append {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { events, response } => {
                let mut batch = vec![(events, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { events, response }) => {
                            batch.push((events, response));
                        }
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                commit_batch(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

type PendingAppend = (Vec<Event>, oneshot::Sender<io::Result<()>>);

fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (events, _) in batch {
        if let Err(e) = wal.append_all_buffered(events) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even on append error so partially buffered bytes don't leak
    // into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn respond_batch(batch: &mut Vec<PendingAppend>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { events, response } => {
            let mut batch = vec![(events, response)];
            commit_batch(wal, &mut batch);
        }
    }
}

/// Slot ids claimed in the reverse index ahead of the WAL append. Released
/// on drop unless `commit` ran, so a failed or cancelled insert frees them.
pub(super) struct SlotIdReservation<'a> {
    index: &'a DashMap<SlotId, ManagerId>,
    ids: Vec<SlotId>,
}

impl<'a> SlotIdReservation<'a> {
    pub(super) fn new(index: &'a DashMap<SlotId, ManagerId>) -> Self {
        Self { index, ids: Vec::new() }
    }

    /// Claim `id` for `manager_id`. Fails if any slot already holds it.
    pub(super) fn claim(&mut self, id: SlotId, manager_id: ManagerId) -> Result<(), EngineError> {
        match self.index.entry(id) {
            Entry::Occupied(_) => Err(EngineError::SlotExists(id)),
            Entry::Vacant(vacant) => {
                vacant.insert(manager_id);
                self.ids.push(id);
                Ok(())
            }
        }
    }

    pub(super) fn commit(mut self) {
        self.ids.clear();
    }
}

impl Drop for SlotIdReservation<'_> {
    fn drop(&mut self) {
        for id in &self.ids {
            self.index.remove(id);
        }
    }
}

pub struct Engine {
    pub state: DashMap<ManagerId, SharedManagerState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Reverse lookup: slot id → owning manager id
    pub(super) slot_to_manager: DashMap<SlotId, ManagerId>,
    /// Mutations hold this shared; compaction holds it exclusively so no
    /// append can land between the snapshot and the WAL swap.
    pub(super) mutation_gate: RwLock<()>,
}

/// Apply a slot event directly to a ManagerState (caller holds the lock).
fn apply_to_manager(ms: &mut ManagerState, event: &Event, slot_map: &DashMap<SlotId, ManagerId>) {
    match event {
        Event::SlotAdded {
            id,
            manager_id,
            span,
            booked,
        } => {
            ms.insert_slot(Slot {
                id: *id,
                span: *span,
                booked: *booked,
            });
            slot_map.insert(*id, *manager_id);
        }
        Event::SlotBookingChanged { id, booked, .. } => {
            if let Some(slot) = ms.slot_mut(*id) {
                slot.booked = *booked;
            }
        }
        Event::SlotRemoved { id, .. } => {
            ms.remove_slot(*id);
            slot_map.remove(id);
        }
        // ManagerCreated/Deleted are handled at the DashMap level, not here
        Event::ManagerCreated { .. } | Event::ManagerDeleted { .. } => {}
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            wal_tx,
            slot_to_manager: DashMap::new(),
            mutation_gate: RwLock::new(()),
        };

        // We're the sole owner of these Arcs during replay, so try_write always
        // succeeds. Never use blocking_write here: this runs inside the runtime.
        for event in &events {
            match event {
                Event::ManagerCreated { id, name, profile } => {
                    let ms = ManagerState::new(*id, name.clone(), profile.clone());
                    engine.state.insert(*id, Arc::new(RwLock::new(ms)));
                }
                Event::ManagerDeleted { id } => {
                    engine.state.remove(id);
                }
                Event::SlotAdded { manager_id, .. }
                | Event::SlotBookingChanged { manager_id, .. }
                | Event::SlotRemoved { manager_id, .. } => {
                    let Some(shared) = engine.get_manager(manager_id) else {
                        tracing::warn!("replay: slot event for unknown sales manager {manager_id}");
                        continue;
                    };
                    match shared.try_write() {
                        Ok(mut guard) => apply_to_manager(&mut guard, event, &engine.slot_to_manager),
                        Err(_) => {
                            return Err(io::Error::other("replay: manager state unexpectedly locked"));
                        }
                    }
                }
            }
        }

        tracing::debug!(
            "replayed {} events: {} sales managers, {} slots",
            events.len(),
            engine.state.len(),
            engine.slot_to_manager.len()
        );
        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        self.wal_append_all(vec![event.clone()]).await
    }

    /// Write several events as one unit: all are synced or the call fails.
    pub(super) async fn wal_append_all(&self, events: Vec<Event>) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_manager(&self, id: &ManagerId) -> Option<SharedManagerState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    pub fn get_manager_for_slot(&self, slot_id: &SlotId) -> Option<ManagerId> {
        self.slot_to_manager.get(slot_id).map(|e| *e.value())
    }

    /// WAL-append + apply in one call.
    pub(super) async fn persist_and_apply(
        &self,
        ms: &mut ManagerState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_manager(ms, event, &self.slot_to_manager);
        Ok(())
    }

    /// Lookup slot → manager, get manager, acquire write lock.
    pub(super) async fn resolve_slot_write(
        &self,
        slot_id: &SlotId,
    ) -> Result<(ManagerId, tokio::sync::OwnedRwLockWriteGuard<ManagerState>), EngineError> {
        let manager_id = self
            .get_manager_for_slot(slot_id)
            .ok_or(EngineError::SlotNotFound(*slot_id))?;
        let shared = self
            .get_manager(&manager_id)
            .ok_or(EngineError::ManagerNotFound(manager_id))?;
        let guard = shared.write_owned().await;
        // The id may be reserved by an insert whose WAL append then failed.
        if guard.slots.iter().all(|s| s.id != *slot_id) {
            return Err(EngineError::SlotNotFound(*slot_id));
        }
        Ok((manager_id, guard))
    }

    // ── Compaction ───────────────────────────────────────────

    pub async fn appends_since_compact(&self) -> Result<u64, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))
    }

    /// Minimal event list that recreates the current state.
    pub async fn snapshot_events(&self) -> Vec<Event> {
        let managers: Vec<SharedManagerState> =
            self.state.iter().map(|e| e.value().clone()).collect();

        let mut events = Vec::new();
        for shared in managers {
            let guard = shared.read().await;
            events.push(Event::ManagerCreated {
                id: guard.id,
                name: guard.name.clone(),
                profile: guard.profile.clone(),
            });
            events.extend(guard.slots.iter().map(|slot| Event::SlotAdded {
                id: slot.id,
                manager_id: guard.id,
                span: slot.span,
                booked: slot.booked,
            }));
        }
        events
    }

    /// Rewrite the WAL as a snapshot of the current state.
    pub async fn compact(&self) -> Result<usize, EngineError> {
        let _exclusive = self.mutation_gate.write().await;
        let events = self.snapshot_events().await;
        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        Ok(count)
    }
}
