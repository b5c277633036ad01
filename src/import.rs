//! Best-effort parsing of the catalog and schedule text an administrator
//! pastes into the back-office. A bad line is dropped with a warning and the
//! rest still commits.

use std::collections::HashSet;

use tracing::warn;

use crate::engine::EngineError;
use crate::limits::{MAX_IMPORT_LINES, MAX_SERVICE_NAME_LEN, MAX_SLOTS_PER_DATE};
use crate::model::*;
use crate::observability::MALFORMED_LINES_TOTAL;
use crate::tables::{join_slots, parse_price, parse_slot_list};

/// Accepted entries plus every skipped line as a `MalformedConfigLine`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportReport<T> {
    pub accepted: Vec<T>,
    pub skipped: Vec<EngineError>,
}

impl<T> Default for ImportReport<T> {
    fn default() -> Self {
        Self { accepted: Vec::new(), skipped: Vec::new() }
    }
}

impl<T> ImportReport<T> {
    fn skip(&mut self, kind: &'static str, line_no: usize, line: &str, reason: impl Into<String>) {
        let err = EngineError::MalformedConfigLine {
            line_no,
            line: line.to_string(),
            reason: reason.into(),
        };
        warn!("{kind} import: {err}");
        metrics::counter!(MALFORMED_LINES_TOTAL, "kind" => kind).increment(1);
        self.skipped.push(err);
    }
}

/// Non-blank lines with their 1-based line numbers.
fn content_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty())
}

/// `Name:Price` per line, split on the first `:`.
pub fn parse_catalog(text: &str) -> ImportReport<ServiceCatalogEntry> {
    const KIND: &str = "catalog";
    let mut report = ImportReport::default();
    let mut names = HashSet::new();

    for (n, (line_no, line)) in content_lines(text).enumerate() {
        if n >= MAX_IMPORT_LINES {
            report.skip(KIND, line_no, line, "import too long");
            continue;
        }
        let Some((name, price)) = line.split_once(':') else {
            report.skip(KIND, line_no, line, "expected Name:Price");
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            report.skip(KIND, line_no, line, "empty service name");
            continue;
        }
        if name.chars().count() > MAX_SERVICE_NAME_LEN {
            report.skip(KIND, line_no, line, "service name too long");
            continue;
        }
        let Some(price) = parse_price(price) else {
            report.skip(KIND, line_no, line, format!("invalid price {:?}", price.trim()));
            continue;
        };
        if !names.insert(name.to_string()) {
            report.skip(KIND, line_no, line, format!("duplicate service {name:?}"));
            continue;
        }
        report.accepted.push(ServiceCatalogEntry { name: name.to_string(), price });
    }
    report
}

/// `DD/MM/YYYY: HH:MM, HH:MM, ...` per line. The date holds no `:`, so the
/// first `:` separates it from the slot list.
pub fn parse_schedule(text: &str) -> ImportReport<DateSlots> {
    const KIND: &str = "schedule";
    let mut report = ImportReport::default();
    let mut dates = HashSet::new();

    for (n, (line_no, line)) in content_lines(text).enumerate() {
        if n >= MAX_IMPORT_LINES {
            report.skip(KIND, line_no, line, "import too long");
            continue;
        }
        let Some((raw_date, raw_slots)) = line.split_once(':') else {
            report.skip(KIND, line_no, line, "expected DD/MM/YYYY: HH:MM, ...");
            continue;
        };
        let Some(date) = parse_date(raw_date) else {
            report.skip(KIND, line_no, line, format!("invalid date {:?}", raw_date.trim()));
            continue;
        };
        let slots = match parse_slot_list(raw_slots) {
            Ok(slots) => slots,
            Err(bad) => {
                report.skip(KIND, line_no, line, format!("invalid slot {bad:?}"));
                continue;
            }
        };
        if slots.len() > MAX_SLOTS_PER_DATE {
            report.skip(KIND, line_no, line, "too many slots");
            continue;
        }
        if !dates.insert(date) {
            report.skip(KIND, line_no, line, format!("date {} listed twice", format_date(date)));
            continue;
        }
        report.accepted.push(DateSlots { date, slots });
    }
    report
}

/// The catalog in the same text form `parse_catalog` reads.
pub fn render_catalog(entries: &[ServiceCatalogEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("{}:{}", e.name, format_price(e.price)))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_schedule(schedule: &[DateSlots]) -> String {
    schedule
        .iter()
        .map(|d| format!("{}: {}", format_date(d.date), join_slots(&d.slots).replace(',', ", ")))
        .collect::<Vec<_>>()
        .join("\n")
}
