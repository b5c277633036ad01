use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use super::mutations::{default_catalog, default_schedule};
use super::*;
use crate::limits::*;
use crate::store::{LocalStore, Row, StoreError};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
}

fn slot(label: &str) -> SlotLabel {
    SlotLabel::parse(label).unwrap()
}

fn slots(labels: &[&str]) -> Vec<SlotLabel> {
    labels.iter().map(|l| slot(l)).collect()
}

fn request(date: NaiveDate, at: &str, name: &str) -> BookingRequest {
    BookingRequest {
        date,
        slot: slot(at),
        customer_name: name.into(),
        customer_phone: "11999990000".into(),
        service_name: "Corte".into(),
        notes: String::new(),
    }
}

fn settings(max_per_slot: u32) -> Settings {
    Settings { max_per_slot, ..Settings::default() }
}

/// Engine over an in-memory store, bootstrapped with the defaults and a
/// three-slot schedule on 01/06/2024.
async fn engine_with(max_per_slot: u32) -> (Engine, Arc<LocalStore>) {
    let store = Arc::new(LocalStore::in_memory());
    let engine = Engine::new(store.clone(), &settings(max_per_slot));
    engine.bootstrap(day(10)).await.unwrap();
    engine
        .replace_schedule(vec![DateSlots { date: day(1), slots: slots(&["09:00", "10:00", "11:00"]) }])
        .await
        .unwrap();
    (engine, store)
}

async fn booking_rows(store: &LocalStore) -> Vec<Row> {
    store.read_table(BOOKINGS_TABLE).await.unwrap()
}

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("chairbook_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

/// A store whose every call fails, as when the spreadsheet service is down.
struct UnreachableStore;

#[async_trait]
impl TableStore for UnreachableStore {
    async fn read_table(&self, _table: &str) -> Result<Vec<Row>, StoreError> {
        Err(StoreError::Io("connection refused".into()))
    }
    async fn create_table(&self, _table: &str, _columns: &[&str]) -> Result<(), StoreError> {
        Err(StoreError::Io("connection refused".into()))
    }
    async fn append_row(&self, _table: &str, _values: Vec<String>) -> Result<(), StoreError> {
        Err(StoreError::Io("connection refused".into()))
    }
    async fn delete_rows(&self, _table: &str, _row_ids: &BTreeSet<RowId>) -> Result<(), StoreError> {
        Err(StoreError::Io("connection refused".into()))
    }
    async fn replace_table(&self, _table: &str, _rows: Vec<Row>) -> Result<(), StoreError> {
        Err(StoreError::Io("connection refused".into()))
    }
}

/// Reads the schedule, then stalls before returning it while `stall` is set,
/// so a write can land between the read and the cache fill.
struct StallingScheduleStore {
    inner: Arc<LocalStore>,
    stall: AtomicBool,
}

#[async_trait]
impl TableStore for StallingScheduleStore {
    async fn read_table(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        let rows = self.inner.read_table(table).await?;
        if table == SCHEDULE_TABLE && self.stall.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        Ok(rows)
    }
    async fn create_table(&self, table: &str, columns: &[&str]) -> Result<(), StoreError> {
        self.inner.create_table(table, columns).await
    }
    async fn append_row(&self, table: &str, values: Vec<String>) -> Result<(), StoreError> {
        self.inner.append_row(table, values).await
    }
    async fn delete_rows(&self, table: &str, row_ids: &BTreeSet<RowId>) -> Result<(), StoreError> {
        self.inner.delete_rows(table, row_ids).await
    }
    async fn replace_table(&self, table: &str, rows: Vec<Row>) -> Result<(), StoreError> {
        self.inner.replace_table(table, rows).await
    }
}

// ── Bootstrap ────────────────────────────────────────────

#[tokio::test]
async fn bootstrap_seeds_defaults_once() {
    let store = Arc::new(LocalStore::in_memory());
    let engine = Engine::new(store.clone(), &Settings::default());

    assert!(engine.bootstrap(day(1)).await.unwrap());
    assert_eq!(engine.catalog().await.unwrap(), default_catalog());
    assert_eq!(engine.configured_dates().await.unwrap(), vec![day(1), day(2), day(3)]);
    assert_eq!(engine.slots_for(day(2)).await.unwrap().len(), 7);
    assert!(engine.bookings_snapshot().await.unwrap().bookings.is_empty());

    assert!(!engine.bootstrap(day(5)).await.unwrap());
    assert_eq!(engine.configured_dates().await.unwrap(), vec![day(1), day(2), day(3)]);
    assert_eq!(
        store.table_names(),
        vec![BOOKINGS_TABLE.to_string(), CONFIG_TABLE.to_string(), SCHEDULE_TABLE.to_string()]
    );
}

#[test]
fn default_schedule_covers_three_days() {
    let schedule = default_schedule(day(30));
    let dates: Vec<NaiveDate> = schedule.iter().map(|d| d.date).collect();
    assert_eq!(dates, vec![day(30), NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(), NaiveDate::from_ymd_opt(2024, 7, 2).unwrap()]);
    assert_eq!(join_slots(&schedule[0].slots), "09:00,10:00,11:00,14:00,15:00,16:00,17:00");
}

// ── Availability and admission ───────────────────────────

#[tokio::test]
async fn booking_removes_slot_from_availability() {
    let (engine, store) = engine_with(1).await;
    assert_eq!(engine.available_slots(day(1)).await.unwrap(), slots(&["09:00", "10:00", "11:00"]));

    let booked = engine.book(request(day(1), "10:00", "Ana")).await.unwrap();
    assert_eq!(booked.price, Some(30.0));
    assert!(booked.created_at.is_some());

    assert_eq!(engine.available_slots(day(1)).await.unwrap(), slots(&["09:00", "11:00"]));
    let rows = booking_rows(&store).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("Data"), Some("01/06/2024"));
    assert_eq!(rows[0].get("Hora"), Some("10:00"));
    assert_eq!(rows[0].get("Serviço"), Some("Corte"));
    assert_eq!(rows[0].get("Preco"), Some("30.00"));
}

#[tokio::test]
async fn full_slot_is_refused_without_writing() {
    let (engine, store) = engine_with(1).await;
    engine.book(request(day(1), "09:00", "Ana")).await.unwrap();

    let err = engine.book(request(day(1), "09:00", "Bia")).await.unwrap_err();
    assert_eq!(err, EngineError::SlotUnavailable { date: day(1), slot: slot("09:00") });
    assert_eq!(booking_rows(&store).await.len(), 1);
}

#[tokio::test]
async fn unconfigured_slot_or_date_is_refused() {
    let (engine, store) = engine_with(1).await;
    let err = engine.book(request(day(1), "13:00", "Ana")).await.unwrap_err();
    assert!(matches!(err, EngineError::SlotUnavailable { .. }));
    let err = engine.book(request(day(20), "09:00", "Ana")).await.unwrap_err();
    assert!(matches!(err, EngineError::SlotUnavailable { .. }));
    assert!(booking_rows(&store).await.is_empty());
}

#[tokio::test]
async fn day_availability_keeps_full_apart_from_unconfigured() {
    let (engine, _store) = engine_with(1).await;
    assert_eq!(engine.day_availability(day(20)).await.unwrap(), DayAvailability::NotConfigured);

    for at in ["09:00", "10:00"] {
        engine.book(request(day(1), at, "Ana")).await.unwrap();
    }
    assert_eq!(
        engine.day_availability(day(1)).await.unwrap(),
        DayAvailability::Open(slots(&["11:00"]))
    );
    engine.book(request(day(1), "11:00", "Ana")).await.unwrap();
    assert_eq!(engine.day_availability(day(1)).await.unwrap(), DayAvailability::FullyBooked);
    assert!(engine.available_slots(day(1)).await.unwrap().is_empty());
}

#[tokio::test]
async fn capacity_per_slot_from_settings() {
    let (engine, _store) = engine_with(2).await;
    assert_eq!(engine.max_per_slot(), 2);
    engine.book(request(day(1), "09:00", "Ana")).await.unwrap();
    assert_eq!(engine.available_slots(day(1)).await.unwrap().len(), 3);
    engine.book(request(day(1), "09:00", "Bia")).await.unwrap();
    assert_eq!(engine.available_slots(day(1)).await.unwrap(), slots(&["10:00", "11:00"]));
    assert!(engine.book(request(day(1), "09:00", "Caio")).await.is_err());
}

#[tokio::test]
async fn unknown_service_is_refused() {
    let (engine, store) = engine_with(1).await;
    let mut req = request(day(1), "09:00", "Ana");
    req.service_name = "Luzes".into();
    assert_eq!(engine.book(req).await.unwrap_err(), EngineError::UnknownService("Luzes".into()));
    assert!(booking_rows(&store).await.is_empty());
}

#[tokio::test]
async fn request_fields_are_validated() {
    let (engine, _store) = engine_with(1).await;

    let mut req = request(day(1), "09:00", "  ");
    assert_eq!(engine.book(req.clone()).await.unwrap_err(), EngineError::MissingField("customer name"));

    req.customer_name = "Ana".into();
    req.customer_phone = String::new();
    assert_eq!(engine.book(req.clone()).await.unwrap_err(), EngineError::MissingField("customer phone"));

    req.customer_phone = "1".repeat(MAX_CUSTOMER_PHONE_LEN + 1);
    assert!(matches!(engine.book(req.clone()).await, Err(EngineError::LimitExceeded(_))));

    req.customer_phone = "11999990000".into();
    req.customer_name = "a".repeat(MAX_CUSTOMER_NAME_LEN + 1);
    assert!(matches!(engine.book(req.clone()).await, Err(EngineError::LimitExceeded(_))));

    req.customer_name = "Ana".into();
    req.notes = "n".repeat(MAX_NOTES_LEN + 1);
    assert!(matches!(engine.book(req.clone()).await, Err(EngineError::LimitExceeded(_))));

    req.notes = "  primeira vez  ".into();
    let booked = engine.book(req).await.unwrap();
    assert_eq!(booked.notes, "primeira vez");
}

#[tokio::test]
async fn price_follows_the_catalog_at_admission() {
    let (engine, _store) = engine_with(1).await;
    engine
        .replace_catalog(vec![ServiceCatalogEntry { name: "Corte".into(), price: 35.5 }])
        .await
        .unwrap();
    let booked = engine.book(request(day(1), "09:00", "Ana")).await.unwrap();
    assert_eq!(booked.price, Some(35.5));
}

#[tokio::test]
async fn concurrent_requests_for_last_slot_admit_one() {
    let (engine, store) = engine_with(1).await;
    let engine = Arc::new(engine);

    let mut handles = Vec::new();
    for i in 0..16 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.book(request(day(1), "11:00", &format!("Cliente {i}"))).await
        }));
    }
    let mut admitted = 0;
    let mut refused = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(EngineError::SlotUnavailable { .. }) => refused += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(admitted, 1);
    assert_eq!(refused, 15);
    assert_eq!(booking_rows(&store).await.len(), 1);
}

#[tokio::test]
async fn admission_sees_rows_written_behind_the_cache() {
    let (engine, store) = engine_with(1).await;
    // Prime the cache, then book the slot directly in the store.
    assert_eq!(engine.available_slots(day(1)).await.unwrap().len(), 3);
    let other = Booking {
        date: day(1),
        slot: slot("09:00"),
        customer_name: "Outro".into(),
        customer_phone: "11".into(),
        service_name: "Corte".into(),
        price: Some(30.0),
        notes: String::new(),
        created_at: None,
    };
    store.append_row(BOOKINGS_TABLE, encode_booking(&other)).await.unwrap();

    // The cached view is stale until refreshed...
    assert_eq!(engine.available_slots(day(1)).await.unwrap().len(), 3);
    // ...but admission re-reads the store.
    let err = engine.book(request(day(1), "09:00", "Ana")).await.unwrap_err();
    assert!(matches!(err, EngineError::SlotUnavailable { .. }));

    engine.refresh();
    assert_eq!(engine.available_slots(day(1)).await.unwrap(), slots(&["10:00", "11:00"]));
}

#[tokio::test]
async fn admission_sees_schedule_written_behind_the_cache() {
    let (engine, store) = engine_with(1).await;
    assert_eq!(engine.available_slots(day(1)).await.unwrap().len(), 3);
    let narrowed = DateSlots { date: day(1), slots: slots(&["09:00", "11:00"]) };
    store.replace_table(SCHEDULE_TABLE, encode_schedule(&[narrowed])).await.unwrap();

    let err = engine.book(request(day(1), "10:00", "Ana")).await.unwrap_err();
    assert_eq!(err, EngineError::SlotUnavailable { date: day(1), slot: slot("10:00") });
    assert!(booking_rows(&store).await.is_empty());
}

#[tokio::test]
async fn read_overlapping_a_schedule_change_does_not_cache_old_slots() {
    let inner = Arc::new(LocalStore::in_memory());
    let store = Arc::new(StallingScheduleStore { inner: inner.clone(), stall: AtomicBool::new(false) });
    let engine = Arc::new(Engine::new(store.clone(), &settings(1)));
    engine.bootstrap(day(10)).await.unwrap();
    engine
        .replace_schedule(vec![DateSlots { date: day(1), slots: slots(&["09:00", "10:00"]) }])
        .await
        .unwrap();

    store.stall.store(true, Ordering::SeqCst);
    let reader = engine.clone();
    let slow_read = tokio::spawn(async move { reader.available_slots(day(1)).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    store.stall.store(false, Ordering::SeqCst);
    engine
        .replace_schedule(vec![DateSlots { date: day(1), slots: slots(&["09:00"]) }])
        .await
        .unwrap();

    // The overlapping read answers with what it saw, but must not keep it.
    assert_eq!(slow_read.await.unwrap().unwrap(), slots(&["09:00", "10:00"]));
    assert_eq!(engine.available_slots(day(1)).await.unwrap(), slots(&["09:00"]));
    let err = engine.book(request(day(1), "10:00", "Ana")).await.unwrap_err();
    assert!(matches!(err, EngineError::SlotUnavailable { .. }));
    assert!(booking_rows(&inner).await.is_empty());
}

#[tokio::test]
async fn store_failure_surfaces_as_unavailable() {
    let engine = Engine::new(Arc::new(UnreachableStore), &Settings::default());
    assert!(matches!(engine.bootstrap(day(1)).await, Err(EngineError::StoreUnavailable(_))));
    assert!(matches!(engine.available_slots(day(1)).await, Err(EngineError::StoreUnavailable(_))));
    assert!(matches!(
        engine.book(request(day(1), "09:00", "Ana")).await,
        Err(EngineError::StoreUnavailable(_))
    ));
    assert!(matches!(engine.cancel(1).await, Err(EngineError::StoreUnavailable(_))));
}

// ── Cancellation ─────────────────────────────────────────

#[tokio::test]
async fn cancel_frees_the_slot() {
    let (engine, store) = engine_with(1).await;
    engine.book(request(day(1), "09:00", "Ana")).await.unwrap();
    engine.book(request(day(1), "10:00", "Bia")).await.unwrap();

    let removed = engine.cancel(1).await.unwrap().unwrap();
    assert_eq!(removed.customer_name, "Ana");
    assert_eq!(engine.available_slots(day(1)).await.unwrap(), slots(&["09:00", "11:00"]));

    let rows = booking_rows(&store).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("Nome"), Some("Bia"));
}

#[tokio::test]
async fn cancel_unknown_row_is_not_found() {
    let (engine, _store) = engine_with(1).await;
    engine.book(request(day(1), "09:00", "Ana")).await.unwrap();
    assert_eq!(engine.cancel(0).await.unwrap_err(), EngineError::NotFound(0));
    assert_eq!(engine.cancel(2).await.unwrap_err(), EngineError::NotFound(2));
    assert_eq!(engine.bookings(&BookingFilter::default()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn cancel_removes_unreadable_rows_too() {
    let (engine, store) = engine_with(1).await;
    store
        .append_row(BOOKINGS_TABLE, vec!["ontem".into(), "09:00".into(), "Ana".into()])
        .await
        .unwrap();
    engine.refresh();
    assert_eq!(engine.consistency().await.unwrap().rejected.len(), 1);
    assert_eq!(engine.cancel(1).await.unwrap(), None);
    assert!(booking_rows(&store).await.is_empty());
}

// ── Imports ──────────────────────────────────────────────

#[tokio::test]
async fn catalog_import_commits_the_good_lines() {
    let (engine, _store) = engine_with(1).await;
    let report = engine.import_catalog("Corte:30\nBarba:abc\nFranja:15").await.unwrap();
    assert_eq!(report.accepted.len(), 2);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(
        engine.catalog().await.unwrap(),
        vec![
            ServiceCatalogEntry { name: "Corte".into(), price: 30.0 },
            ServiceCatalogEntry { name: "Franja".into(), price: 15.0 },
        ]
    );

    let mut req = request(day(1), "09:00", "Ana");
    req.service_name = "Barba".into();
    assert_eq!(engine.book(req).await.unwrap_err(), EngineError::UnknownService("Barba".into()));
}

#[tokio::test]
async fn import_with_nothing_valid_keeps_stored_data() {
    let (engine, _store) = engine_with(1).await;
    let report = engine.import_catalog("Barba:abc\n\n").await.unwrap();
    assert!(report.accepted.is_empty());
    assert_eq!(engine.catalog().await.unwrap(), default_catalog());

    let report = engine.import_schedule("amanha: 09:00").await.unwrap();
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(engine.configured_dates().await.unwrap(), vec![day(1)]);
}

#[tokio::test]
async fn schedule_import_replaces_dates() {
    let (engine, _store) = engine_with(1).await;
    let report = engine
        .import_schedule("02/06/2024: 14:00, 9:00\n03/06/2024: 10:00, 25:00\n2024-06-04: 08:30")
        .await
        .unwrap();
    assert_eq!(report.accepted.len(), 2);
    assert_eq!(engine.configured_dates().await.unwrap(), vec![day(2), day(4)]);
    assert_eq!(engine.slots_for(day(2)).await.unwrap(), slots(&["14:00", "09:00"]));
    assert_eq!(engine.day_availability(day(1)).await.unwrap(), DayAvailability::NotConfigured);
}

// ── Back-office queries ──────────────────────────────────

#[tokio::test]
async fn bookings_filtered_and_sorted() {
    let (engine, _store) = engine_with(1).await;
    engine
        .replace_schedule(vec![
            DateSlots { date: day(1), slots: slots(&["09:00", "10:00"]) },
            DateSlots { date: day(2), slots: slots(&["09:00"]) },
        ])
        .await
        .unwrap();
    engine.book(request(day(2), "09:00", "Caio")).await.unwrap();
    engine.book(request(day(1), "10:00", "Bia")).await.unwrap();
    let mut barba = request(day(1), "09:00", "Ana");
    barba.service_name = "Barba".into();
    engine.book(barba).await.unwrap();

    let all = engine.bookings(&BookingFilter::default()).await.unwrap();
    let names: Vec<&str> = all.iter().map(|s| s.booking.customer_name.as_str()).collect();
    assert_eq!(names, ["Ana", "Bia", "Caio"]);
    assert_eq!(all[0].row_id, 3);

    let filter = BookingFilter { date: Some(day(1)), service: Some("Corte".into()) };
    let only = engine.bookings(&filter).await.unwrap();
    assert_eq!(only.len(), 1);
    assert_eq!(only[0].booking.customer_name, "Bia");

    let report = engine.report().await.unwrap();
    assert_eq!(report.total_bookings, 3);
    assert_eq!(report.revenue, 80.0);
    assert!(engine.consistency().await.unwrap().duplicates.is_empty());
}

// ── Durability ───────────────────────────────────────────

#[tokio::test]
async fn bookings_survive_reopen() {
    let path = test_wal_path("survive_reopen.wal");
    {
        let store = Arc::new(LocalStore::open(&path).unwrap());
        let engine = Engine::new(store, &Settings::default());
        engine.bootstrap(day(1)).await.unwrap();
        engine.book(request(day(1), "14:00", "Ana")).await.unwrap();
        engine.book(request(day(2), "09:00", "Bia")).await.unwrap();
        engine.cancel(2).await.unwrap();
    }

    let store = Arc::new(LocalStore::open(&path).unwrap());
    let engine = Engine::new(store, &Settings::default());
    assert!(!engine.bootstrap(day(9)).await.unwrap());
    let bookings = engine.bookings(&BookingFilter::default()).await.unwrap();
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0].booking.slot, slot("14:00"));
    assert!(!engine.available_slots(day(1)).await.unwrap().contains(&slot("14:00")));
}
