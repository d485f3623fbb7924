use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: book attempts. Labels: outcome.
pub const BOOKINGS_TOTAL: &str = "parkd_bookings_total";

/// Counter: release attempts. Labels: outcome.
pub const RELEASES_TOTAL: &str = "parkd_releases_total";

/// Histogram: time spent waiting for a slot lock, in seconds.
pub const LOCK_WAIT_SECONDS: &str = "parkd_lock_wait_seconds";

/// Counter: writes applied in memory whose durability could not be confirmed.
pub const UNCONFIRMED_WRITES_TOTAL: &str = "parkd_unconfirmed_writes_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: number of per-slot locks created so far.
pub const SLOT_LOCKS: &str = "parkd_slot_locks";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "parkd_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "parkd_wal_flush_batch_size";

/// Counter: WAL compactions performed.
pub const WAL_COMPACTIONS_TOTAL: &str = "parkd_wal_compactions_total";

/// Install the Prometheus exporter on `port`. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), String> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("failed to install Prometheus metrics exporter: {e}"))?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short outcome label for a booking or release result.
pub fn outcome_label<T>(result: &Result<T, crate::engine::EngineError>) -> &'static str {
    use crate::engine::EngineError;
    match result {
        Ok(_) => "ok",
        Err(EngineError::Validation(_) | EngineError::LimitExceeded(_)) => "invalid",
        Err(EngineError::SlotNotFound(_) | EngineError::BookingNotFound(_)) => "not_found",
        Err(EngineError::Conflict(_)) => "conflict",
        Err(EngineError::AlreadyExists(_)) => "already_exists",
        Err(EngineError::IdCollision(_)) => "id_collision",
        Err(EngineError::Store(_)) => "store_error",
    }
}
