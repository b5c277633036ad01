use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::RwLock;
use tracing::info;

use crate::model::{RowId, TableEvent};
use crate::wal::{Wal, WalHandle};

/// One table row: column name → cell text, kept in column order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    cells: Vec<(String, String)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: impl Into<String>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: &str, value: impl Into<String>) {
        let value = value.into();
        match self.cells.iter_mut().find(|(c, _)| c == column) {
            Some((_, v)) => *v = value,
            None => self.cells.push((column.to_string(), value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
    }

    /// Trimmed cell, `None` when the column is absent or blank.
    pub fn non_empty(&self, column: &str) -> Option<&str> {
        self.get(column).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(c, _)| c.as_str())
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|(_, v)| v.trim().is_empty())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (k, v) in iter {
            row.insert(&k.into(), v);
        }
        row
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    NoSuchTable(String),
    NoHeader(String),
    NoSuchRow { table: String, row_id: RowId },
    Io(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NoSuchTable(t) => write!(f, "no such table: {t}"),
            StoreError::NoHeader(t) => write!(f, "table {t} has no header row"),
            StoreError::NoSuchRow { table, row_id } => {
                write!(f, "table {table} has no row {row_id}")
            }
            StoreError::Io(e) => write!(f, "store I/O error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

/// Row-oriented access to named tables. This is the whole boundary between
/// the booking engine and wherever the data actually lives.
#[async_trait]
pub trait TableStore: Send + Sync {
    async fn read_table(&self, table: &str) -> Result<Vec<Row>, StoreError>;

    /// Create the table, or add any missing columns to its header. Idempotent.
    async fn create_table(&self, table: &str, columns: &[&str]) -> Result<(), StoreError>;

    /// Append one row; `values` line up with the table's header.
    async fn append_row(&self, table: &str, values: Vec<String>) -> Result<(), StoreError>;

    /// Delete rows by 1-based position. All ids must exist or nothing is deleted.
    async fn delete_rows(&self, table: &str, row_ids: &BTreeSet<RowId>) -> Result<(), StoreError>;

    /// Overwrite the table. With no rows the existing header is kept.
    async fn replace_table(&self, table: &str, rows: Vec<Row>) -> Result<(), StoreError>;
}

// ── In-process tables ───────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn to_rows(&self) -> Vec<Row> {
        self.rows
            .iter()
            .map(|cells| {
                self.columns
                    .iter()
                    .enumerate()
                    .map(|(i, c)| (c.as_str(), cells.get(i).cloned().unwrap_or_default()))
                    .collect()
            })
            .collect()
    }

    /// Reject events that cannot apply. `apply` assumes this passed.
    fn check(&self, event: &TableEvent) -> Result<(), StoreError> {
        match event {
            TableEvent::RowAppended { table, .. } if self.columns.is_empty() => {
                Err(StoreError::NoHeader(table.clone()))
            }
            TableEvent::RowsDeleted { table, row_ids } => {
                match row_ids.iter().find(|&&id| id == 0 || id > self.rows.len()) {
                    Some(&row_id) => Err(StoreError::NoSuchRow { table: table.clone(), row_id }),
                    None => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }

    fn apply(&mut self, event: &TableEvent) {
        match event {
            TableEvent::TableCreated { columns, .. } => {
                self.columns = columns.clone();
            }
            TableEvent::RowAppended { values, .. } => {
                self.rows.push(values.clone());
            }
            TableEvent::RowsDeleted { row_ids, .. } => {
                let mut ids = row_ids.clone();
                ids.sort_unstable_by(|a, b| b.cmp(a));
                ids.dedup();
                for id in ids {
                    if (1..=self.rows.len()).contains(&id) {
                        self.rows.remove(id - 1);
                    }
                }
            }
            TableEvent::TableReplaced { columns, rows, .. } => {
                self.columns = columns.clone();
                self.rows = rows.clone();
            }
        }
    }
}

type SharedTable = Arc<RwLock<Table>>;

/// Tables held in memory, optionally backed by a write-ahead log.
///
/// Every mutation is checked, logged, then applied while holding the table's
/// write lock. Compaction holds `gate` exclusively so no append can land
/// between the snapshot and the log swap.
pub struct LocalStore {
    tables: DashMap<String, SharedTable>,
    wal: Option<WalHandle>,
    gate: RwLock<()>,
}

impl LocalStore {
    pub fn in_memory() -> Self {
        Self {
            tables: DashMap::new(),
            wal: None,
            gate: RwLock::new(()),
        }
    }

    /// Replay the log at `path` and keep appending to it. Needs a tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let events = Wal::replay(path)?;
        let mut tables: HashMap<String, Table> = HashMap::new();
        for event in &events {
            tables.entry(event.table().to_string()).or_default().apply(event);
        }
        info!("replayed {} events into {} tables from {}", events.len(), tables.len(), path.display());

        let wal = WalHandle::spawn(Wal::open(path)?);
        Ok(Self {
            tables: tables
                .into_iter()
                .map(|(name, table)| (name, Arc::new(RwLock::new(table))))
                .collect(),
            wal: Some(wal),
            gate: RwLock::new(()),
        })
    }

    pub fn is_durable(&self) -> bool {
        self.wal.is_some()
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    fn get_table(&self, name: &str) -> Result<SharedTable, StoreError> {
        self.tables
            .get(name)
            .map(|e| e.value().clone())
            .ok_or_else(|| StoreError::NoSuchTable(name.to_string()))
    }

    fn table_or_default(&self, name: &str) -> SharedTable {
        self.tables.entry(name.to_string()).or_default().value().clone()
    }

    /// Check, log, apply. Caller holds the gate (shared) and the table lock.
    async fn commit(&self, table: &mut Table, event: TableEvent) -> Result<(), StoreError> {
        table.check(&event)?;
        if let Some(wal) = &self.wal {
            wal.append(&event).await?;
        }
        table.apply(&event);
        Ok(())
    }

    /// Events that rebuild every table as it is right now.
    pub async fn snapshot(&self) -> Vec<TableEvent> {
        let tables: Vec<(String, SharedTable)> = self
            .tables
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        let mut events = Vec::with_capacity(tables.len());
        for (name, table) in tables {
            let guard = table.read().await;
            events.push(TableEvent::TableReplaced {
                table: name,
                columns: guard.columns.clone(),
                rows: guard.rows.clone(),
            });
        }
        events
    }

    /// Rewrite the log as one snapshot. Returns false for a store without a log.
    pub async fn compact(&self) -> Result<bool, StoreError> {
        let Some(wal) = &self.wal else {
            return Ok(false);
        };
        let _exclusive = self.gate.write().await;
        let events = self.snapshot().await;
        wal.compact(events).await?;
        Ok(true)
    }

    pub async fn appends_since_compact(&self) -> Result<u64, StoreError> {
        match &self.wal {
            Some(wal) => Ok(wal.appends_since_compact().await?),
            None => Ok(0),
        }
    }
}

#[async_trait]
impl TableStore for LocalStore {
    async fn read_table(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        let shared = self.get_table(table)?;
        let guard = shared.read().await;
        Ok(guard.to_rows())
    }

    async fn create_table(&self, table: &str, columns: &[&str]) -> Result<(), StoreError> {
        let _gate = self.gate.read().await;
        let shared = self.table_or_default(table);
        let mut guard = shared.write().await;
        let mut merged = guard.columns.clone();
        for column in columns {
            if !merged.iter().any(|c| c == column) {
                merged.push(column.to_string());
            }
        }
        if merged == guard.columns && !merged.is_empty() {
            return Ok(());
        }
        let event = TableEvent::TableCreated { table: table.to_string(), columns: merged };
        self.commit(&mut guard, event).await
    }

    async fn append_row(&self, table: &str, values: Vec<String>) -> Result<(), StoreError> {
        let _gate = self.gate.read().await;
        let shared = self.get_table(table)?;
        let mut guard = shared.write().await;
        let event = TableEvent::RowAppended { table: table.to_string(), values };
        self.commit(&mut guard, event).await
    }

    async fn delete_rows(&self, table: &str, row_ids: &BTreeSet<RowId>) -> Result<(), StoreError> {
        if row_ids.is_empty() {
            return Ok(());
        }
        let _gate = self.gate.read().await;
        let shared = self.get_table(table)?;
        let mut guard = shared.write().await;
        let event = TableEvent::RowsDeleted {
            table: table.to_string(),
            row_ids: row_ids.iter().copied().collect(),
        };
        self.commit(&mut guard, event).await
    }

    async fn replace_table(&self, table: &str, rows: Vec<Row>) -> Result<(), StoreError> {
        let _gate = self.gate.read().await;
        let shared = self.table_or_default(table);
        let mut guard = shared.write().await;

        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for column in row.columns() {
                if !columns.iter().any(|c| c == column) {
                    columns.push(column.to_string());
                }
            }
        }
        if columns.is_empty() {
            columns = guard.columns.clone();
        }
        let cells = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|c| row.get(c).unwrap_or_default().to_string())
                    .collect()
            })
            .collect();

        let event = TableEvent::TableReplaced { table: table.to_string(), columns, rows: cells };
        self.commit(&mut guard, event).await
    }
}
