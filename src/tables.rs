//! Typed records for the three tables and the parse/validate step at the
//! store boundary. Column names are the exact headers of the shared sheet.

use std::collections::HashSet;

use tracing::warn;

use crate::engine::EngineError;
use crate::model::*;
use crate::observability::REJECTED_ROWS_TOTAL;
use crate::store::Row;

pub const CONFIG_TABLE: &str = "Configuracoes";
pub const SCHEDULE_TABLE: &str = "Horarios_Por_Data";
pub const BOOKINGS_TABLE: &str = "Agendamentos";

pub const COL_SERVICE: &str = "Servicos";
pub const COL_PRICE: &str = "Precos";

pub const COL_SCHEDULE_DATE: &str = "Data";
pub const COL_SCHEDULE_SLOTS: &str = "Horarios";

pub const COL_DATE: &str = "Data";
pub const COL_SLOT: &str = "Hora";
pub const COL_NAME: &str = "Nome";
pub const COL_PHONE: &str = "Telefone";
pub const COL_BOOKED_SERVICE: &str = "Serviço";
pub const COL_BOOKED_PRICE: &str = "Preco";
pub const COL_NOTES: &str = "Observacoes";
pub const COL_CREATED_AT: &str = "Data_Registro";

pub const CONFIG_COLUMNS: [&str; 2] = [COL_SERVICE, COL_PRICE];
pub const SCHEDULE_COLUMNS: [&str; 2] = [COL_SCHEDULE_DATE, COL_SCHEDULE_SLOTS];

/// Header of the bookings table, in append order.
pub const BOOKING_COLUMNS: [&str; 8] = [
    COL_DATE,
    COL_SLOT,
    COL_NAME,
    COL_PHONE,
    COL_BOOKED_SERVICE,
    COL_BOOKED_PRICE,
    COL_NOTES,
    COL_CREATED_AT,
];

/// Parse a stored price. Non-numeric, negative or non-finite cells are `None`.
pub fn parse_price(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|p| p.is_finite() && *p >= 0.0)
}

// ── Catalog ─────────────────────────────────────────────

/// Catalog entries in table order. Rows without a name are skipped silently
/// (the legacy sheet mixes other columns into this table); rows with a name
/// but no usable price are skipped with a warning. First name wins.
pub fn decode_catalog(rows: &[Row]) -> Vec<ServiceCatalogEntry> {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        let Some(name) = row.non_empty(COL_SERVICE) else { continue };
        let Some(price) = row.get(COL_PRICE).and_then(parse_price) else {
            warn!("catalog row {}: service {name:?} has no valid price, skipped", i + 1);
            continue;
        };
        if seen.insert(name.to_string()) {
            entries.push(ServiceCatalogEntry { name: name.to_string(), price });
        }
    }
    entries
}

pub fn encode_catalog(entries: &[ServiceCatalogEntry]) -> Vec<Row> {
    entries
        .iter()
        .map(|e| {
            Row::new()
                .with(COL_SERVICE, e.name.clone())
                .with(COL_PRICE, format_price(e.price))
        })
        .collect()
}

// ── Schedule ────────────────────────────────────────────

/// Split a comma-joined slot cell. `Err` carries the first label that did not parse.
pub fn parse_slot_list(raw: &str) -> Result<Vec<SlotLabel>, String> {
    let mut slots: Vec<SlotLabel> = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let slot = SlotLabel::parse(part).ok_or_else(|| part.to_string())?;
        if !slots.contains(&slot) {
            slots.push(slot);
        }
    }
    Ok(slots)
}

pub fn join_slots(slots: &[SlotLabel]) -> String {
    slots
        .iter()
        .map(SlotLabel::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

/// Parsed schedule table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleSnapshot {
    pub schedule: Vec<DateSlots>,
    pub rejected: Vec<RejectedRow>,
}

/// One entry per date. Rows with an unreadable date are rejected with a
/// `DateParseFailure`; unreadable labels are dropped from their row; a date
/// seen twice keeps its first row.
pub fn decode_schedule_rows(rows: &[Row]) -> ScheduleSnapshot {
    let mut seen = HashSet::new();
    let mut snapshot = ScheduleSnapshot::default();
    for (i, row) in rows.iter().enumerate() {
        let row_id = i + 1;
        if row.is_blank() {
            continue;
        }
        let raw_date = row.get(COL_SCHEDULE_DATE).unwrap_or_default();
        let Some(date) = parse_date(raw_date) else {
            let reason = EngineError::DateParseFailure(raw_date.trim().to_string());
            warn!("schedule row {row_id}: {reason}, skipped");
            metrics::counter!(REJECTED_ROWS_TOTAL, "table" => SCHEDULE_TABLE).increment(1);
            snapshot.rejected.push(RejectedRow { row_id, reason });
            continue;
        };
        if !seen.insert(date) {
            warn!("schedule row {row_id}: duplicate date {}, skipped", format_date(date));
            continue;
        }
        let mut slots = Vec::new();
        for part in row.get(COL_SCHEDULE_SLOTS).unwrap_or_default().split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            match SlotLabel::parse(part) {
                Some(slot) if !slots.contains(&slot) => slots.push(slot),
                Some(_) => {}
                None => warn!("schedule row {row_id}: unreadable slot {part:?} dropped"),
            }
        }
        snapshot.schedule.push(DateSlots { date, slots });
    }
    snapshot
}

pub fn decode_schedule(rows: &[Row]) -> Vec<DateSlots> {
    decode_schedule_rows(rows).schedule
}

pub fn encode_schedule(schedule: &[DateSlots]) -> Vec<Row> {
    schedule
        .iter()
        .map(|d| {
            Row::new()
                .with(COL_SCHEDULE_DATE, format_date(d.date))
                .with(COL_SCHEDULE_SLOTS, join_slots(&d.slots))
        })
        .collect()
}

/// Slots configured for `date`; empty when the date is not scheduled.
pub fn slots_for(schedule: &[DateSlots], date: chrono::NaiveDate) -> Vec<SlotLabel> {
    schedule
        .iter()
        .find(|d| d.date == date)
        .map(|d| d.slots.clone())
        .unwrap_or_default()
}

// ── Bookings ────────────────────────────────────────────

/// A stored booking row that could not take part in date/slot logic.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RejectedRow {
    pub row_id: RowId,
    #[serde(serialize_with = "serialize_display")]
    pub reason: EngineError,
}

fn serialize_display<S: serde::Serializer>(err: &EngineError, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(err)
}

/// Parsed bookings table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookingsSnapshot {
    pub bookings: Vec<StoredBooking>,
    pub rejected: Vec<RejectedRow>,
}

impl BookingsSnapshot {
    pub fn records(&self) -> Vec<Booking> {
        self.bookings.iter().map(|s| s.booking.clone()).collect()
    }
}

fn decode_booking(row: &Row) -> Result<Booking, EngineError> {
    let raw_date = row.get(COL_DATE).unwrap_or_default();
    let date = parse_date(raw_date)
        .ok_or_else(|| EngineError::DateParseFailure(raw_date.trim().to_string()))?;
    let raw_slot = row.get(COL_SLOT).unwrap_or_default();
    let slot = SlotLabel::parse(raw_slot)
        .ok_or_else(|| EngineError::SlotParseFailure(raw_slot.trim().to_string()))?;
    let text = |col: &str| row.get(col).unwrap_or_default().trim().to_string();

    Ok(Booking {
        date,
        slot,
        customer_name: text(COL_NAME),
        customer_phone: text(COL_PHONE),
        service_name: text(COL_BOOKED_SERVICE),
        price: row.get(COL_BOOKED_PRICE).and_then(parse_price),
        notes: text(COL_NOTES),
        created_at: row.get(COL_CREATED_AT).and_then(parse_timestamp),
    })
}

/// Row ids are 1-based positions in `rows`, blank rows included, so they
/// line up with `delete_rows`.
pub fn decode_bookings(rows: &[Row]) -> BookingsSnapshot {
    let mut snapshot = BookingsSnapshot::default();
    for (i, row) in rows.iter().enumerate() {
        let row_id = i + 1;
        if row.is_blank() {
            continue;
        }
        match decode_booking(row) {
            Ok(booking) => snapshot.bookings.push(StoredBooking { row_id, booking }),
            Err(reason) => {
                warn!("bookings row {row_id}: {reason}, excluded from availability");
                metrics::counter!(REJECTED_ROWS_TOTAL, "table" => BOOKINGS_TABLE).increment(1);
                snapshot.rejected.push(RejectedRow { row_id, reason });
            }
        }
    }
    snapshot
}

/// Cell values in [`BOOKING_COLUMNS`] order.
pub fn encode_booking(booking: &Booking) -> Vec<String> {
    vec![
        format_date(booking.date),
        booking.slot.to_string(),
        booking.customer_name.clone(),
        booking.customer_phone.clone(),
        booking.service_name.clone(),
        booking.price.map(format_price).unwrap_or_default(),
        booking.notes.clone(),
        booking.created_at.map(format_timestamp).unwrap_or_default(),
    ]
}
