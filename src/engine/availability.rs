use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};

use crate::model::*;

use super::EngineError;

// ── Availability Algorithm ────────────────────────────────────────

/// Bookings per slot on `date`. Bookings on other dates are ignored; dates
/// are compared as calendar dates, never as stored text.
pub fn slot_counts(date: NaiveDate, bookings: &[Booking]) -> HashMap<&SlotLabel, u32> {
    let mut counts = HashMap::new();
    for booking in bookings.iter().filter(|b| b.date == date) {
        *counts.entry(&booking.slot).or_insert(0) += 1;
    }
    counts
}

/// The configured slots of `date` that still have room, in configured order.
///
/// An empty result means either "fully booked" or "nothing configured";
/// callers that care check `all_slots` (or use [`classify_day`]).
pub fn available_slots(
    date: NaiveDate,
    all_slots: &[SlotLabel],
    bookings: &[Booking],
    max_per_slot: u32,
) -> Vec<SlotLabel> {
    let max_per_slot = max_per_slot.max(1);
    let counts = slot_counts(date, bookings);
    all_slots
        .iter()
        .filter(|slot| counts.get(slot).copied().unwrap_or(0) < max_per_slot)
        .cloned()
        .collect()
}

pub fn classify_day(all_slots: &[SlotLabel], open: Vec<SlotLabel>) -> DayAvailability {
    if all_slots.is_empty() {
        DayAvailability::NotConfigured
    } else if open.is_empty() {
        DayAvailability::FullyBooked
    } else {
        DayAvailability::Open(open)
    }
}

/// Re-check `slot` against a freshly read `bookings` and build the record
/// to append. Performs no I/O: the caller owns the write, and must have
/// read `bookings` immediately before calling.
pub fn admit_booking(
    date: NaiveDate,
    slot: &SlotLabel,
    all_slots: &[SlotLabel],
    bookings: &[Booking],
    max_per_slot: u32,
    payload: BookingPayload,
    now: NaiveDateTime,
) -> Result<Booking, EngineError> {
    if !available_slots(date, all_slots, bookings, max_per_slot).contains(slot) {
        return Err(EngineError::SlotUnavailable { date, slot: slot.clone() });
    }
    Ok(Booking {
        date,
        slot: slot.clone(),
        customer_name: payload.customer_name,
        customer_phone: payload.customer_phone,
        service_name: payload.service_name,
        price: Some(payload.price),
        notes: payload.notes,
        created_at: Some(now),
    })
}
