/// Booking form field lengths, in characters.
pub const MAX_CUSTOMER_NAME_LEN: usize = 50;
pub const MAX_CUSTOMER_PHONE_LEN: usize = 15;
pub const MAX_NOTES_LEN: usize = 200;

/// Longest service name accepted by the catalog import.
pub const MAX_SERVICE_NAME_LEN: usize = 100;

/// Lines accepted in one pasted catalog or schedule.
pub const MAX_IMPORT_LINES: usize = 1000;

/// One slot every 15 minutes, around the clock.
pub const MAX_SLOTS_PER_DATE: usize = 96;

/// Upper bound on the per-slot capacity setting.
pub const MAX_PER_SLOT_LIMIT: u32 = 64;

/// Queued writes before callers start waiting on the writer task.
pub const WRITER_QUEUE_DEPTH: usize = 1024;
