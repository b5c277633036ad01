use chrono::{Days, NaiveDate};
use tracing::{info, warn};

use crate::import::{parse_catalog, parse_schedule, ImportReport};
use crate::limits::*;
use crate::model::*;
use crate::tables::*;

use super::{Engine, EngineError, WriteCommand};

/// Services seeded into an empty catalog.
const DEFAULT_SERVICES: [(&str, f64); 5] = [
    ("Corte", 30.0),
    ("Barba", 20.0),
    ("Corte + Barba", 45.0),
    ("Sobrancelha", 10.0),
    ("Pezinho", 5.0),
];

/// Slots seeded for today and the next two days into an empty schedule.
const DEFAULT_SLOTS: [&str; 7] = ["09:00", "10:00", "11:00", "14:00", "15:00", "16:00", "17:00"];
const DEFAULT_SCHEDULE_DAYS: u64 = 3;

fn required(value: &str, field: &'static str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::MissingField(field));
    }
    Ok(())
}

fn limited(value: &str, max: usize, what: &'static str) -> Result<(), EngineError> {
    if value.chars().count() > max {
        return Err(EngineError::LimitExceeded(what));
    }
    Ok(())
}

fn validate_request(request: &BookingRequest) -> Result<(), EngineError> {
    required(&request.customer_name, "customer name")?;
    required(&request.customer_phone, "customer phone")?;
    required(&request.service_name, "service")?;
    limited(&request.customer_name, MAX_CUSTOMER_NAME_LEN, "customer name too long")?;
    limited(&request.customer_phone, MAX_CUSTOMER_PHONE_LEN, "customer phone too long")?;
    limited(&request.notes, MAX_NOTES_LEN, "notes too long")?;
    Ok(())
}

fn trimmed(request: BookingRequest) -> BookingRequest {
    BookingRequest {
        customer_name: request.customer_name.trim().to_string(),
        customer_phone: request.customer_phone.trim().to_string(),
        service_name: request.service_name.trim().to_string(),
        notes: request.notes.trim().to_string(),
        ..request
    }
}

pub(super) fn default_catalog() -> Vec<ServiceCatalogEntry> {
    DEFAULT_SERVICES
        .iter()
        .map(|&(name, price)| ServiceCatalogEntry { name: name.to_string(), price })
        .collect()
}

pub(super) fn default_schedule(today: NaiveDate) -> Vec<DateSlots> {
    let slots: Vec<SlotLabel> = DEFAULT_SLOTS.iter().filter_map(|s| SlotLabel::parse(s)).collect();
    (0..DEFAULT_SCHEDULE_DAYS)
        .filter_map(|n| today.checked_add_days(Days::new(n)))
        .map(|date| DateSlots { date, slots: slots.clone() })
        .collect()
}

impl Engine {
    /// Validate the request, then admit it through the writer queue. The
    /// price is taken from the catalog at admission time.
    pub async fn book(&self, request: BookingRequest) -> Result<Booking, EngineError> {
        let request = trimmed(request);
        validate_request(&request)?;
        self.submit(|response| WriteCommand::Admit { request, response })
            .await
    }

    /// Delete the booking at `row_id`. Returns the removed booking, or `None`
    /// when the row existed but could not be read as one.
    pub async fn cancel(&self, row_id: RowId) -> Result<Option<Booking>, EngineError> {
        if row_id == 0 {
            return Err(EngineError::NotFound(row_id));
        }
        self.submit(|response| WriteCommand::Cancel { row_id, response })
            .await
    }

    pub async fn replace_catalog(&self, entries: Vec<ServiceCatalogEntry>) -> Result<(), EngineError> {
        self.submit(|response| WriteCommand::ReplaceCatalog { entries, response })
            .await
    }

    pub async fn replace_schedule(&self, schedule: Vec<DateSlots>) -> Result<(), EngineError> {
        self.submit(|response| WriteCommand::ReplaceSchedule { schedule, response })
            .await
    }

    /// Parse pasted `Name:Price` lines and replace the catalog with the ones
    /// that parsed. When no line parses the stored catalog is left alone.
    pub async fn import_catalog(
        &self,
        text: &str,
    ) -> Result<ImportReport<ServiceCatalogEntry>, EngineError> {
        let report = parse_catalog(text);
        if report.accepted.is_empty() {
            warn!("catalog import: nothing to save, {} lines skipped", report.skipped.len());
            return Ok(report);
        }
        self.replace_catalog(report.accepted.clone()).await?;
        Ok(report)
    }

    /// Same as [`Engine::import_catalog`] for `DD/MM/YYYY: HH:MM, ...` lines.
    pub async fn import_schedule(&self, text: &str) -> Result<ImportReport<DateSlots>, EngineError> {
        let report = parse_schedule(text);
        if report.accepted.is_empty() {
            warn!("schedule import: nothing to save, {} lines skipped", report.skipped.len());
            return Ok(report);
        }
        self.replace_schedule(report.accepted.clone()).await?;
        Ok(report)
    }

    /// Create missing table headers and seed an empty catalog or schedule
    /// with defaults. Returns true if anything was seeded.
    pub async fn bootstrap(&self, today: NaiveDate) -> Result<bool, EngineError> {
        self.store.create_table(CONFIG_TABLE, &CONFIG_COLUMNS).await?;
        self.store.create_table(SCHEDULE_TABLE, &SCHEDULE_COLUMNS).await?;
        self.store.create_table(BOOKINGS_TABLE, &BOOKING_COLUMNS).await?;

        let mut seeded = false;
        if self.catalog().await?.is_empty() {
            self.replace_catalog(default_catalog()).await?;
            info!("seeded default catalog");
            seeded = true;
        }
        if self.schedule().await?.is_empty() {
            self.replace_schedule(default_schedule(today)).await?;
            info!("seeded default schedule from {}", format_date(today));
            seeded = true;
        }
        Ok(seeded)
    }

    /// Drop every cached table so the next read goes to the store.
    pub fn refresh(&self) {
        self.store.invalidate_all();
    }
}
