use chrono::NaiveDate;

use crate::model::*;
use crate::tables::*;

use super::availability::{available_slots, classify_day};
use super::report::{build_report, check_consistency, ConsistencyReport, Report};
use super::{Engine, EngineError};

impl Engine {
    pub async fn catalog(&self) -> Result<Vec<ServiceCatalogEntry>, EngineError> {
        let rows = self.store.read(CONFIG_TABLE).await?;
        Ok(decode_catalog(&rows))
    }

    /// Schedule in table order.
    pub async fn schedule(&self) -> Result<Vec<DateSlots>, EngineError> {
        let rows = self.store.read(SCHEDULE_TABLE).await?;
        Ok(decode_schedule(&rows))
    }

    /// Every date with a schedule row, ascending.
    pub async fn configured_dates(&self) -> Result<Vec<NaiveDate>, EngineError> {
        let mut dates: Vec<NaiveDate> = self.schedule().await?.iter().map(|d| d.date).collect();
        dates.sort_unstable();
        Ok(dates)
    }

    pub async fn slots_for(&self, date: NaiveDate) -> Result<Vec<SlotLabel>, EngineError> {
        Ok(slots_for(&self.schedule().await?, date))
    }

    pub async fn bookings_snapshot(&self) -> Result<BookingsSnapshot, EngineError> {
        let rows = self.store.read(BOOKINGS_TABLE).await?;
        Ok(decode_bookings(&rows))
    }

    /// Open slots for `date` from cached reads. Good for display; the writer
    /// re-checks against a fresh read before admitting.
    pub async fn available_slots(&self, date: NaiveDate) -> Result<Vec<SlotLabel>, EngineError> {
        let all_slots = self.slots_for(date).await?;
        if all_slots.is_empty() {
            return Ok(Vec::new());
        }
        let bookings = self.bookings_snapshot().await?.records();
        Ok(available_slots(date, &all_slots, &bookings, self.max_per_slot()))
    }

    pub async fn day_availability(&self, date: NaiveDate) -> Result<DayAvailability, EngineError> {
        let all_slots = self.slots_for(date).await?;
        if all_slots.is_empty() {
            return Ok(DayAvailability::NotConfigured);
        }
        let bookings = self.bookings_snapshot().await?.records();
        let open = available_slots(date, &all_slots, &bookings, self.max_per_slot());
        Ok(classify_day(&all_slots, open))
    }

    /// Stored bookings matching `filter`, sorted by date then slot.
    pub async fn bookings(&self, filter: &BookingFilter) -> Result<Vec<StoredBooking>, EngineError> {
        let mut matching: Vec<StoredBooking> = self
            .bookings_snapshot()
            .await?
            .bookings
            .into_iter()
            .filter(|s| filter.matches(&s.booking))
            .collect();
        matching.sort_by(|a, b| {
            (a.booking.date, &a.booking.slot).cmp(&(b.booking.date, &b.booking.slot))
        });
        Ok(matching)
    }

    pub async fn report(&self) -> Result<Report, EngineError> {
        let snapshot = self.bookings_snapshot().await?;
        Ok(build_report(&snapshot.bookings))
    }

    pub async fn consistency(&self) -> Result<ConsistencyReport, EngineError> {
        let rows = self.store.read(BOOKINGS_TABLE).await?;
        let snapshot = decode_bookings(&rows);
        Ok(check_consistency(&rows, &snapshot))
    }
}
