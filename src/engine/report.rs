use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::Serialize;

use crate::model::*;
use crate::store::Row;
use crate::tables::{BookingsSnapshot, RejectedRow, BOOKING_COLUMNS};

/// Revenue summary over the readable bookings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub total_bookings: usize,
    /// Sum of the known prices.
    pub revenue: f64,
    /// Mean of the known prices; `None` when no booking has one.
    pub average_ticket: Option<f64>,
    pub bookings_per_service: BTreeMap<String, usize>,
    pub revenue_per_date: BTreeMap<NaiveDate, f64>,
}

pub fn build_report(bookings: &[StoredBooking]) -> Report {
    let mut bookings_per_service = BTreeMap::new();
    let mut revenue_per_date = BTreeMap::new();
    let mut revenue = 0.0;
    let mut priced = 0usize;

    for StoredBooking { booking, .. } in bookings {
        *bookings_per_service.entry(booking.service_name.clone()).or_insert(0) += 1;
        let Some(price) = booking.price else { continue };
        revenue += price;
        priced += 1;
        *revenue_per_date.entry(booking.date).or_insert(0.0) += price;
    }

    Report {
        total_bookings: bookings.len(),
        revenue,
        average_ticket: (priced > 0).then(|| revenue / priced as f64),
        bookings_per_service,
        revenue_per_date,
    }
}

/// Data-quality findings for the bookings table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConsistencyReport {
    /// Empty cells per column, over non-blank rows. Columns with none are omitted.
    pub missing_fields: BTreeMap<String, usize>,
    /// Rows excluded from availability (unreadable date or slot).
    pub rejected: Vec<RejectedRow>,
    /// Row ids sharing the same date, slot and customer name.
    pub duplicates: Vec<Vec<RowId>>,
}

impl ConsistencyReport {
    pub fn is_clean(&self) -> bool {
        self.missing_fields.is_empty() && self.rejected.is_empty() && self.duplicates.is_empty()
    }
}

pub fn check_consistency(rows: &[Row], snapshot: &BookingsSnapshot) -> ConsistencyReport {
    let mut missing_fields = BTreeMap::new();
    for row in rows.iter().filter(|r| !r.is_blank()) {
        for column in BOOKING_COLUMNS {
            if row.non_empty(column).is_none() {
                *missing_fields.entry(column.to_string()).or_insert(0) += 1;
            }
        }
    }

    let mut groups: HashMap<(NaiveDate, &SlotLabel, String), Vec<RowId>> = HashMap::new();
    for stored in &snapshot.bookings {
        let b = &stored.booking;
        let key = (b.date, &b.slot, b.customer_name.to_lowercase());
        groups.entry(key).or_default().push(stored.row_id);
    }
    let mut duplicates: Vec<Vec<RowId>> = groups.into_values().filter(|ids| ids.len() > 1).collect();
    duplicates.sort();

    ConsistencyReport {
        missing_fields,
        rejected: snapshot.rejected.clone(),
        duplicates,
    }
}
