use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::TimeDelta;

use crate::error::CalendarError;
use crate::matcher::Matcher;
use crate::model::AvailableSlot;
use crate::observability::{QueryObserver, TracingObserver};
use crate::query::{Query, QueryRequest};
use crate::resolver::{SlotResolver, default_slot_length};
use crate::store::{SlotStore, StorageError, StorageOp};

/// The availability pipeline: validate, match, short-circuit on no match,
/// resolve. Shared by the HTTP and SQL surfaces.
pub struct CalendarService {
    store: Arc<dyn SlotStore>,
    matcher: Matcher,
    resolver: SlotResolver,
    observer: Arc<dyn QueryObserver>,
    read_timeout: Option<Duration>,
}

impl CalendarService {
    pub fn new(store: Arc<dyn SlotStore>) -> Self {
        Self {
            matcher: Matcher::new(store.clone()),
            resolver: SlotResolver::new(store.clone(), default_slot_length()),
            store,
            observer: Arc::new(TracingObserver),
            read_timeout: None,
        }
    }

    pub fn with_slot_length(mut self, slot_length: TimeDelta) -> Self {
        self.resolver = SlotResolver::new(self.store.clone(), slot_length);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn QueryObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Deadline applied to each storage read. `None` waits indefinitely.
    pub fn with_read_timeout(mut self, read_timeout: Option<Duration>) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub async fn available_slots(
        &self,
        request: QueryRequest,
    ) -> Result<Vec<AvailableSlot>, CalendarError> {
        let query = match Query::parse(request) {
            Ok(query) => query,
            Err(e) => {
                self.observer.rejected(&e);
                return Err(e);
            }
        };
        self.available_slots_for(&query).await
    }

    /// Run an already-validated query.
    pub async fn available_slots_for(
        &self,
        query: &Query,
    ) -> Result<Vec<AvailableSlot>, CalendarError> {
        let started = Instant::now();
        match self.run(query).await {
            Ok(slots) => {
                self.observer.resolved(query, &slots, started.elapsed());
                Ok(slots)
            }
            Err(e) => {
                self.observer.storage_failed(query, &e, started.elapsed());
                Err(CalendarError::Storage(e))
            }
        }
    }

    async fn run(&self, query: &Query) -> Result<Vec<AvailableSlot>, StorageError> {
        let managers = self
            .bounded(StorageOp::MatchManagers, self.matcher.match_managers(&query.criteria))
            .await?;
        self.observer.matched(query, managers.len());
        if managers.is_empty() {
            return Ok(Vec::new());
        }
        self.bounded(StorageOp::LoadSlots, self.resolver.resolve(query.date, &managers))
            .await
    }

    async fn bounded<T>(
        &self,
        op: StorageOp,
        read: impl Future<Output = Result<T, StorageError>>,
    ) -> Result<T, StorageError> {
        match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .map_err(|_| StorageError::timeout(op, limit))?,
            None => read.await,
        }
    }
}
