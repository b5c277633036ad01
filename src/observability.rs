use std::net::SocketAddr;

use crate::console::Command;

// ── Request-driven ──────────────────────────────────────────────

/// Counter: console commands executed. Labels: command, status.
pub const COMMANDS_TOTAL: &str = "chairbook_commands_total";

/// Histogram: command latency in seconds. Labels: command.
pub const COMMAND_DURATION_SECONDS: &str = "chairbook_command_duration_seconds";

/// Counter: admission attempts. Labels: outcome (admitted, slot_unavailable, rejected, store_error).
pub const ADMISSIONS_TOTAL: &str = "chairbook_admissions_total";

/// Counter: bookings removed.
pub const CANCELLATIONS_TOTAL: &str = "chairbook_cancellations_total";

/// Counter: pasted configuration lines dropped. Labels: kind (catalog, schedule).
pub const MALFORMED_LINES_TOTAL: &str = "chairbook_malformed_lines_total";

/// Counter: stored rows excluded because their date or slot did not parse. Labels: table.
pub const REJECTED_ROWS_TOTAL: &str = "chairbook_rejected_rows_total";

// ── Resource utilization ────────────────────────────────────────

/// Counter: read-cache lookups served from memory. Labels: table.
pub const CACHE_HITS_TOTAL: &str = "chairbook_cache_hits_total";

/// Counter: read-cache lookups that went to the store. Labels: table.
pub const CACHE_MISSES_TOTAL: &str = "chairbook_cache_misses_total";

/// Histogram: admissions handled per fresh bookings read.
pub const WRITER_BATCH_SIZE: &str = "chairbook_writer_batch_size";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "chairbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "chairbook_wal_flush_batch_size";

/// Counter: WAL compactions performed.
pub const WAL_COMPACTIONS_TOTAL: &str = "chairbook_wal_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
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
        Command::Help => "help",
        Command::Dates => "dates",
        Command::Slots { .. } => "slots",
        Command::Book(_) => "book",
        Command::Cancel { .. } => "cancel",
        Command::Bookings(_) => "bookings",
        Command::Catalog => "catalog",
        Command::Schedule => "schedule",
        Command::ImportCatalog { .. } => "import_catalog",
        Command::ImportSchedule { .. } => "import_schedule",
        Command::Report => "report",
        Command::Check => "check",
        Command::Refresh => "refresh",
        Command::Quit => "quit",
    }
}
