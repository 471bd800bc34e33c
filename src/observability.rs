use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::BuildError;

use crate::error::CalendarError;
use crate::model::AvailableSlot;
use crate::query::Query;
use crate::sql::Command;
use crate::store::StorageError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: availability queries. Labels: outcome (ok, empty, rejected, storage_error).
pub const QUERIES_TOTAL: &str = "slotfinder_queries_total";

/// Histogram: availability query latency in seconds.
pub const QUERY_DURATION_SECONDS: &str = "slotfinder_query_duration_seconds";

/// Histogram: managers matched per query.
pub const MANAGERS_MATCHED: &str = "slotfinder_managers_matched";

/// Counter: failed storage reads. Labels: op, kind.
pub const STORAGE_ERRORS_TOTAL: &str = "slotfinder_storage_errors_total";

/// Counter: SQL statements executed. Labels: command, status.
pub const SQL_COMMANDS_TOTAL: &str = "slotfinder_sql_commands_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active pgwire connections.
pub const CONNECTIONS_ACTIVE: &str = "slotfinder_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "slotfinder_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "slotfinder_connections_rejected_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "slotfinder_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "slotfinder_wal_flush_batch_size";

/// Counter: completed WAL compactions.
pub const WAL_COMPACTIONS_TOTAL: &str = "slotfinder_wal_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertManager { .. } => "insert_manager",
        Command::DeleteManager { .. } => "delete_manager",
        Command::InsertSlots { .. } => "insert_slots",
        Command::SetSlotBooked { .. } => "set_slot_booked",
        Command::DeleteSlot { .. } => "delete_slot",
        Command::SelectManagers => "select_managers",
        Command::SelectSlots { .. } => "select_slots",
        Command::SelectAvailableSlots { .. } => "select_available_slots",
    }
}

// ── Query observation ───────────────────────────────────────────

/// Receives the outcome of every availability query. The pipeline reports
/// here instead of logging on its own.
pub trait QueryObserver: Send + Sync {
    /// The request failed validation; nothing was read.
    fn rejected(&self, error: &CalendarError);
    fn matched(&self, query: &Query, managers: usize);
    fn resolved(&self, query: &Query, slots: &[AvailableSlot], elapsed: Duration);
    fn storage_failed(&self, query: &Query, error: &StorageError, elapsed: Duration);
}

/// Logs through `tracing` and records the query metrics.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl QueryObserver for TracingObserver {
    fn rejected(&self, error: &CalendarError) {
        tracing::debug!(field = error.field(), "query rejected: {error}");
        metrics::counter!(QUERIES_TOTAL, "outcome" => "rejected").increment(1);
    }

    fn matched(&self, query: &Query, managers: usize) {
        tracing::debug!(
            date = %query.date,
            language = %query.criteria.language,
            rating = %query.criteria.rating,
            products = query.criteria.products.len(),
            managers,
            "managers matched"
        );
        metrics::histogram!(MANAGERS_MATCHED).record(managers as f64);
    }

    fn resolved(&self, query: &Query, slots: &[AvailableSlot], elapsed: Duration) {
        let outcome = if slots.is_empty() { "empty" } else { "ok" };
        tracing::debug!(
            date = %query.date,
            slots = slots.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "availability resolved"
        );
        metrics::counter!(QUERIES_TOTAL, "outcome" => outcome).increment(1);
        metrics::histogram!(QUERY_DURATION_SECONDS).record(elapsed.as_secs_f64());
    }

    fn storage_failed(&self, query: &Query, error: &StorageError, elapsed: Duration) {
        tracing::error!(
            date = %query.date,
            language = %query.criteria.language,
            rating = %query.criteria.rating,
            op = error.op.as_str(),
            kind = error.kind.label(),
            elapsed_ms = elapsed.as_millis() as u64,
            "availability query failed: {error}"
        );
        metrics::counter!(QUERIES_TOTAL, "outcome" => "storage_error").increment(1);
        metrics::counter!(
            STORAGE_ERRORS_TOTAL,
            "op" => error.op.as_str(),
            "kind" => error.kind.label()
        )
        .increment(1);
        metrics::histogram!(QUERY_DURATION_SECONDS).record(elapsed.as_secs_f64());
    }
}
