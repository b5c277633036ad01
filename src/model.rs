use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Wire format of every calendar date written to the store.
pub const DATE_FORMAT: &str = "%d/%m/%Y";

/// Wire format of `Data_Registro`.
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Spreadsheets like to rewrite date cells as ISO dates; accepted on read only.
const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

const SLOT_FORMAT: &str = "%H:%M";

/// 1-based position of a data row within a table (the header is not counted).
pub type RowId = usize;

/// Parse a stored date. `None` means a date parse failure: the caller
/// excludes the row from anything keyed by date.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(raw, ISO_DATE_FORMAT))
        .ok()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT).ok()
}

pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Prices are written with two decimals.
pub fn format_price(price: f64) -> String {
    format!("{price:.2}")
}

/// A bookable time of day, always normalized to `HH:MM`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotLabel(String);

impl SlotLabel {
    /// Accepts `H:MM` and `HH:MM`; anything else (seconds, garbage) is rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        let time = NaiveTime::parse_from_str(raw.trim(), SLOT_FORMAT).ok()?;
        Some(Self(time.format(SLOT_FORMAT).to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SlotLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCatalogEntry {
    pub name: String,
    pub price: f64,
}

/// Slots configured for one date, in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateSlots {
    pub date: NaiveDate,
    pub slots: Vec<SlotLabel>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Booking {
    pub date: NaiveDate,
    pub slot: SlotLabel,
    pub customer_name: String,
    pub customer_phone: String,
    pub service_name: String,
    /// `None` when the stored cell is not numeric. Always set on admission.
    pub price: Option<f64>,
    pub notes: String,
    /// `None` when the stored timestamp is unreadable. Always set on admission.
    pub created_at: Option<NaiveDateTime>,
}

/// A booking together with its position in the bookings table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredBooking {
    pub row_id: RowId,
    pub booking: Booking,
}

/// Customer-supplied part of a booking, price already resolved from the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingPayload {
    pub customer_name: String,
    pub customer_phone: String,
    pub service_name: String,
    pub price: f64,
    pub notes: String,
}

/// What the booking form submits.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingRequest {
    pub date: NaiveDate,
    pub slot: SlotLabel,
    pub customer_name: String,
    pub customer_phone: String,
    pub service_name: String,
    pub notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingFilter {
    pub date: Option<NaiveDate>,
    pub service: Option<String>,
}

impl BookingFilter {
    pub fn matches(&self, booking: &Booking) -> bool {
        self.date.is_none_or(|d| booking.date == d)
            && self
                .service
                .as_deref()
                .is_none_or(|s| booking.service_name == s)
    }
}

/// Availability of one date, keeping "no schedule" apart from "fully booked".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DayAvailability {
    NotConfigured,
    FullyBooked,
    Open(Vec<SlotLabel>),
}

/// The event types. This is the WAL record format of the local store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableEvent {
    TableCreated {
        table: String,
        columns: Vec<String>,
    },
    RowAppended {
        table: String,
        values: Vec<String>,
    },
    RowsDeleted {
        table: String,
        row_ids: Vec<RowId>,
    },
    TableReplaced {
        table: String,
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
    },
}

impl TableEvent {
    pub fn table(&self) -> &str {
        match self {
            TableEvent::TableCreated { table, .. }
            | TableEvent::RowAppended { table, .. }
            | TableEvent::RowsDeleted { table, .. }
            | TableEvent::TableReplaced { table, .. } => table,
        }
    }
}
