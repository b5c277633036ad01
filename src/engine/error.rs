use chrono::NaiveDate;

use crate::model::{format_date, RowId, SlotLabel};
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The store could not be read or written. Nothing is assumed committed.
    StoreUnavailable(String),
    /// The slot is full, or not configured for that date.
    SlotUnavailable { date: NaiveDate, slot: SlotLabel },
    MalformedConfigLine {
        line_no: usize,
        line: String,
        reason: String,
    },
    DateParseFailure(String),
    SlotParseFailure(String),
    UnknownService(String),
    MissingField(&'static str),
    LimitExceeded(&'static str),
    NotFound(RowId),
    InvalidInput(String),
    /// A result could not be rendered as JSON.
    Encoding(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::StoreUnavailable(e) => write!(f, "store unavailable: {e}"),
            EngineError::SlotUnavailable { date, slot } => {
                write!(f, "slot {slot} on {} is not available", format_date(*date))
            }
            EngineError::MalformedConfigLine { line_no, line, reason } => {
                write!(f, "line {line_no} ({line:?}) ignored: {reason}")
            }
            EngineError::DateParseFailure(raw) => write!(f, "unreadable date: {raw:?}"),
            EngineError::SlotParseFailure(raw) => write!(f, "unreadable slot: {raw:?}"),
            EngineError::UnknownService(name) => write!(f, "unknown service: {name}"),
            EngineError::MissingField(field) => write!(f, "missing required field: {field}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::NotFound(row_id) => write!(f, "no booking at row {row_id}"),
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::Encoding(e) => write!(f, "could not encode output: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::StoreUnavailable(e.to_string())
    }
}
