mod availability;
mod error;
mod mutations;
mod queries;
mod report;
#[cfg(test)]
mod tests;

pub use availability::{admit_booking, available_slots, classify_day, slot_counts};
pub use error::EngineError;
pub use report::{build_report, check_consistency, ConsistencyReport, Report};

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Local;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::cache::{CachePolicy, CachedStore};
use crate::limits::WRITER_QUEUE_DEPTH;
use crate::model::*;
use crate::observability::{ADMISSIONS_TOTAL, CANCELLATIONS_TOTAL, WRITER_BATCH_SIZE};
use crate::settings::Settings;
use crate::store::TableStore;
use crate::tables::*;

type Reply<T> = oneshot::Sender<Result<T, EngineError>>;

// ── Single-writer queue ──────────────────────────────────

/// Every write goes through one task, so the availability re-check and the
/// append it guards cannot interleave with another write from this process.
pub(super) enum WriteCommand {
    Admit {
        request: BookingRequest,
        response: Reply<Booking>,
    },
    Cancel {
        row_id: RowId,
        response: Reply<Option<Booking>>,
    },
    ReplaceCatalog {
        entries: Vec<ServiceCatalogEntry>,
        response: Reply<()>,
    },
    ReplaceSchedule {
        schedule: Vec<DateSlots>,
        response: Reply<()>,
    },
}

/// What an admission is checked against. All three tables are read fresh
/// once per batch; `bookings` then grows with each admitted booking.
struct AdmissionState {
    catalog: Vec<ServiceCatalogEntry>,
    schedule: Vec<DateSlots>,
    bookings: Vec<Booking>,
}

impl AdmissionState {
    fn payload_for(&self, request: &BookingRequest) -> Result<BookingPayload, EngineError> {
        let entry = self
            .catalog
            .iter()
            .find(|e| e.name == request.service_name)
            .ok_or_else(|| EngineError::UnknownService(request.service_name.clone()))?;
        Ok(BookingPayload {
            customer_name: request.customer_name.clone(),
            customer_phone: request.customer_phone.clone(),
            service_name: entry.name.clone(),
            price: entry.price,
            notes: request.notes.clone(),
        })
    }
}

fn admission_outcome(result: &Result<Booking, EngineError>) -> &'static str {
    match result {
        Ok(_) => "admitted",
        Err(EngineError::SlotUnavailable { .. }) => "slot_unavailable",
        Err(EngineError::StoreUnavailable(_)) => "store_error",
        Err(_) => "rejected",
    }
}

struct Writer {
    store: Arc<CachedStore>,
    max_per_slot: u32,
}

/// 1. Block for the next command.
/// 2. For an admission, drain every admission already queued behind it.
/// 3. One fresh bookings read for the whole batch, then admit in arrival order.
/// 4. A non-admission command found while draining runs after the batch.
async fn writer_loop(writer: Writer, mut rx: mpsc::Receiver<WriteCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WriteCommand::Admit { request, response } = cmd else {
            writer.run(cmd).await;
            continue;
        };

        let mut batch = vec![(request, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WriteCommand::Admit { request, response } => batch.push((request, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }

        writer.admit_batch(batch).await;
        if let Some(cmd) = deferred {
            writer.run(cmd).await;
        }
    }
}

impl Writer {
    async fn admission_state(&self) -> Result<AdmissionState, EngineError> {
        let catalog = decode_catalog(&self.store.read_fresh(CONFIG_TABLE).await?);
        let schedule = decode_schedule(&self.store.read_fresh(SCHEDULE_TABLE).await?);
        let bookings = decode_bookings(&self.store.read_fresh(BOOKINGS_TABLE).await?).records();
        Ok(AdmissionState { catalog, schedule, bookings })
    }

    async fn admit_batch(&self, batch: Vec<(BookingRequest, Reply<Booking>)>) {
        metrics::histogram!(WRITER_BATCH_SIZE).record(batch.len() as f64);

        let mut state = match self.admission_state().await {
            Ok(state) => state,
            Err(e) => {
                warn!("admission batch of {} aborted: {e}", batch.len());
                for (_, tx) in batch {
                    metrics::counter!(ADMISSIONS_TOTAL, "outcome" => "store_error").increment(1);
                    let _ = tx.send(Err(e.clone()));
                }
                return;
            }
        };

        for (request, tx) in batch {
            let result = self.admit_one(&mut state, request).await;
            metrics::counter!(ADMISSIONS_TOTAL, "outcome" => admission_outcome(&result)).increment(1);
            let _ = tx.send(result);
        }
    }

    async fn admit_one(
        &self,
        state: &mut AdmissionState,
        request: BookingRequest,
    ) -> Result<Booking, EngineError> {
        let payload = state.payload_for(&request)?;
        let all_slots = slots_for(&state.schedule, request.date);
        let booking = admit_booking(
            request.date,
            &request.slot,
            &all_slots,
            &state.bookings,
            self.max_per_slot,
            payload,
            Local::now().naive_local(),
        )
        .inspect_err(|e| info!("admission refused: {e}"))?;

        self.store
            .append_row(BOOKINGS_TABLE, encode_booking(&booking))
            .await?;
        info!(
            "booked {} {} for {} ({})",
            format_date(booking.date),
            booking.slot,
            booking.customer_name,
            booking.service_name
        );
        state.bookings.push(booking.clone());
        Ok(booking)
    }

    async fn run(&self, cmd: WriteCommand) {
        match cmd {
            WriteCommand::Cancel { row_id, response } => {
                let _ = response.send(self.cancel(row_id).await);
            }
            WriteCommand::ReplaceCatalog { entries, response } => {
                let result = self.store.replace_table(CONFIG_TABLE, encode_catalog(&entries)).await;
                if result.is_ok() {
                    info!("catalog replaced with {} services", entries.len());
                }
                let _ = response.send(result.map_err(EngineError::from));
            }
            WriteCommand::ReplaceSchedule { schedule, response } => {
                let result = self.store.replace_table(SCHEDULE_TABLE, encode_schedule(&schedule)).await;
                if result.is_ok() {
                    info!("schedule replaced with {} dates", schedule.len());
                }
                let _ = response.send(result.map_err(EngineError::from));
            }
            WriteCommand::Admit { request, response } => {
                self.admit_batch(vec![(request, response)]).await;
            }
        }
    }

    /// Row ids shift after a delete; running here keeps them in step with
    /// the admissions queued around it.
    async fn cancel(&self, row_id: RowId) -> Result<Option<Booking>, EngineError> {
        let rows = self.store.read_fresh(BOOKINGS_TABLE).await?;
        match rows.get(row_id.wrapping_sub(1)) {
            Some(row) if !row.is_blank() => {}
            _ => return Err(EngineError::NotFound(row_id)),
        }
        let removed = decode_bookings(&rows)
            .bookings
            .into_iter()
            .find(|b| b.row_id == row_id)
            .map(|b| b.booking);

        self.store
            .delete_rows(BOOKINGS_TABLE, &BTreeSet::from([row_id]))
            .await?;
        metrics::counter!(CANCELLATIONS_TOTAL).increment(1);
        match &removed {
            Some(b) => info!(
                "cancelled row {row_id}: {} {} for {}",
                format_date(b.date),
                b.slot,
                b.customer_name
            ),
            None => info!("removed unreadable bookings row {row_id}"),
        }
        Ok(removed)
    }
}

// ── Engine ───────────────────────────────────────────────

pub struct Engine {
    pub(super) store: Arc<CachedStore>,
    pub(super) writer_tx: mpsc::Sender<WriteCommand>,
    max_per_slot: u32,
}

impl Engine {
    /// Wrap `store` in the read cache and start the writer task. Needs a tokio runtime.
    pub fn new(store: Arc<dyn TableStore>, settings: &Settings) -> Self {
        let policy = CachePolicy {
            config_ttl: settings.config_ttl,
            bookings_ttl: settings.bookings_ttl,
        };
        let store = Arc::new(CachedStore::new(store, policy));
        let max_per_slot = settings.max_per_slot.max(1);

        let (writer_tx, writer_rx) = mpsc::channel(WRITER_QUEUE_DEPTH);
        let writer = Writer { store: store.clone(), max_per_slot };
        tokio::spawn(writer_loop(writer, writer_rx));

        Self { store, writer_tx, max_per_slot }
    }

    pub fn max_per_slot(&self) -> u32 {
        self.max_per_slot
    }

    /// Hand a command to the writer task and wait for its answer.
    pub(super) async fn submit<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> WriteCommand,
    ) -> Result<T, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.writer_tx
            .send(make(tx))
            .await
            .map_err(|_| EngineError::StoreUnavailable("writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::StoreUnavailable("writer dropped response".into()))?
    }
}
