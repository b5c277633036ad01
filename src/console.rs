//! Line-oriented back-office commands: parsing and execution against an [`Engine`].

use std::fmt::Write as _;
use std::time::Instant;

use chrono::NaiveDate;

use crate::engine::{Engine, EngineError};
use crate::import::{render_catalog, render_schedule, ImportReport};
use crate::limits::MAX_IMPORT_LINES;
use crate::model::*;
use crate::observability::{command_label, COMMANDS_TOTAL, COMMAND_DURATION_SECONDS};

pub const HELP: &str = "\
commands:
  dates                                   dates with a schedule
  slots DD/MM/YYYY                        open slots on a date
  book DD/MM/YYYY HH:MM Service|Name|Phone[|Notes]
  cancel ROW                              delete the booking at ROW
  bookings [DD/MM/YYYY] [Service]         list bookings
  catalog | schedule                      show configuration
  import-catalog | import-schedule        paste lines, end with a single '.'
  report | check                          revenue report, data checks (JSON)
  refresh                                 drop cached tables
  quit";

/// Parsed console command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Dates,
    Slots { date: NaiveDate },
    Book(BookingRequest),
    Cancel { row_id: RowId },
    Bookings(BookingFilter),
    Catalog,
    Schedule,
    ImportCatalog { text: String },
    ImportSchedule { text: String },
    Report,
    Check,
    Refresh,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Command, ConsoleError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ConsoleError::Empty);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    match word.to_lowercase().as_str() {
        "help" | "?" => Ok(Command::Help),
        "dates" => Ok(Command::Dates),
        "slots" => Ok(Command::Slots { date: parse_date_arg(rest)? }),
        "book" => parse_book(rest),
        "cancel" => {
            let row_id = rest
                .parse::<RowId>()
                .map_err(|_| ConsoleError::BadNumber(rest.to_string()))?;
            Ok(Command::Cancel { row_id })
        }
        "bookings" => Ok(Command::Bookings(parse_filter(rest))),
        "catalog" => Ok(Command::Catalog),
        "schedule" => Ok(Command::Schedule),
        "import-catalog" => Ok(Command::ImportCatalog { text: String::new() }),
        "import-schedule" => Ok(Command::ImportSchedule { text: String::new() }),
        "report" => Ok(Command::Report),
        "check" => Ok(Command::Check),
        "refresh" => Ok(Command::Refresh),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(ConsoleError::UnknownCommand(other.to_string())),
    }
}

fn parse_date_arg(raw: &str) -> Result<NaiveDate, ConsoleError> {
    if raw.is_empty() {
        return Err(ConsoleError::Usage("expected a date DD/MM/YYYY"));
    }
    parse_date(raw).ok_or_else(|| ConsoleError::BadDate(raw.to_string()))
}

/// `DD/MM/YYYY HH:MM Service|Name|Phone[|Notes]`. Service names may hold spaces.
fn parse_book(rest: &str) -> Result<Command, ConsoleError> {
    const USAGE: &str = "book DD/MM/YYYY HH:MM Service|Name|Phone[|Notes]";
    let mut head = rest.splitn(3, char::is_whitespace);
    let (Some(raw_date), Some(raw_slot), Some(fields)) = (head.next(), head.next(), head.next())
    else {
        return Err(ConsoleError::Usage(USAGE));
    };
    let date = parse_date(raw_date).ok_or_else(|| ConsoleError::BadDate(raw_date.to_string()))?;
    let slot = SlotLabel::parse(raw_slot).ok_or_else(|| ConsoleError::BadSlot(raw_slot.to_string()))?;

    let mut fields = fields.splitn(4, '|').map(str::trim);
    let (Some(service), Some(name), Some(phone)) = (fields.next(), fields.next(), fields.next())
    else {
        return Err(ConsoleError::Usage(USAGE));
    };
    Ok(Command::Book(BookingRequest {
        date,
        slot,
        customer_name: name.to_string(),
        customer_phone: phone.to_string(),
        service_name: service.to_string(),
        notes: fields.next().unwrap_or_default().to_string(),
    }))
}

/// Optional leading date, then an optional service name.
fn parse_filter(rest: &str) -> BookingFilter {
    let (first, tail) = match rest.split_once(char::is_whitespace) {
        Some((first, tail)) => (first, tail.trim()),
        None => (rest, ""),
    };
    let (date, service) = match parse_date(first) {
        Some(date) => (Some(date), tail),
        None => (None, rest),
    };
    BookingFilter {
        date,
        service: (!service.is_empty()).then(|| service.to_string()),
    }
}

// ── Multi-line input ─────────────────────────────────────

/// Turns input lines into commands. An import command opens a block that
/// collects lines until a line holding only `.`.
#[derive(Debug, Default)]
pub struct Console {
    pending: Option<(Command, Vec<String>)>,
}

impl Console {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_collecting(&self) -> bool {
        self.pending.is_some()
    }

    /// Feed one line. `None` while an import block is still open or the line is blank.
    pub fn feed(&mut self, line: &str) -> Option<Result<Command, ConsoleError>> {
        if let Some((_, lines)) = self.pending.as_mut() {
            if line.trim() != "." {
                if lines.len() >= MAX_IMPORT_LINES {
                    self.pending = None;
                    return Some(Err(ConsoleError::Usage("import block too long")));
                }
                lines.push(line.to_string());
                return None;
            }
            let (cmd, lines) = self.pending.take()?;
            let text = lines.join("\n");
            return Some(Ok(match cmd {
                Command::ImportCatalog { .. } => Command::ImportCatalog { text },
                Command::ImportSchedule { .. } => Command::ImportSchedule { text },
                other => other,
            }));
        }

        match parse_command(line) {
            Err(ConsoleError::Empty) => None,
            Ok(cmd @ (Command::ImportCatalog { .. } | Command::ImportSchedule { .. })) => {
                self.pending = Some((cmd, Vec::new()));
                None
            }
            other => Some(other),
        }
    }
}

// ── Execution ────────────────────────────────────────────

/// Run one command and render its result as text.
pub async fn execute(engine: &Engine, cmd: Command) -> Result<String, EngineError> {
    let label = command_label(&cmd);
    let start = Instant::now();
    let result = run(engine, cmd).await;
    let status = if result.is_ok() { "ok" } else { "error" };
    metrics::counter!(COMMANDS_TOTAL, "command" => label, "status" => status).increment(1);
    metrics::histogram!(COMMAND_DURATION_SECONDS, "command" => label)
        .record(start.elapsed().as_secs_f64());
    result
}

async fn run(engine: &Engine, cmd: Command) -> Result<String, EngineError> {
    match cmd {
        Command::Help => Ok(HELP.to_string()),
        Command::Dates => {
            let dates = engine.configured_dates().await?;
            if dates.is_empty() {
                return Ok("no dates configured".to_string());
            }
            Ok(dates.into_iter().map(format_date).collect::<Vec<_>>().join("\n"))
        }
        Command::Slots { date } => Ok(match engine.day_availability(date).await? {
            DayAvailability::NotConfigured => format!("no schedule for {}", format_date(date)),
            DayAvailability::FullyBooked => format!("{} is fully booked", format_date(date)),
            DayAvailability::Open(slots) => format!(
                "open on {}: {}",
                format_date(date),
                slots.iter().map(SlotLabel::as_str).collect::<Vec<_>>().join(", ")
            ),
        }),
        Command::Book(request) => {
            let b = engine.book(request).await?;
            Ok(format!(
                "booked {} {} for {} ({}, {})",
                format_date(b.date),
                b.slot,
                b.customer_name,
                b.service_name,
                b.price.map(format_price).unwrap_or_default()
            ))
        }
        Command::Cancel { row_id } => Ok(match engine.cancel(row_id).await? {
            Some(b) => format!(
                "cancelled {} {} for {}",
                format_date(b.date),
                b.slot,
                b.customer_name
            ),
            None => format!("removed row {row_id}"),
        }),
        Command::Bookings(filter) => {
            let bookings = engine.bookings(&filter).await?;
            if bookings.is_empty() {
                return Ok("no bookings".to_string());
            }
            let mut out = String::new();
            for StoredBooking { row_id, booking: b } in &bookings {
                let _ = writeln!(
                    out,
                    "{row_id:>4}  {} {}  {:<20} {:<15} {:<16} {:>8}  {}",
                    format_date(b.date),
                    b.slot,
                    b.customer_name,
                    b.customer_phone,
                    b.service_name,
                    b.price.map(format_price).unwrap_or_else(|| "?".into()),
                    b.notes
                );
            }
            let _ = write!(out, "{} bookings", bookings.len());
            Ok(out)
        }
        Command::Catalog => Ok(render_catalog(&engine.catalog().await?)),
        Command::Schedule => Ok(render_schedule(&engine.schedule().await?)),
        Command::ImportCatalog { text } => Ok(render_import(&engine.import_catalog(&text).await?)),
        Command::ImportSchedule { text } => {
            Ok(render_import(&engine.import_schedule(&text).await?))
        }
        Command::Report => to_json(&engine.report().await?),
        Command::Check => to_json(&engine.consistency().await?),
        Command::Refresh => {
            engine.refresh();
            Ok("caches cleared".to_string())
        }
        Command::Quit => Ok("bye".to_string()),
    }
}

fn render_import<T>(report: &ImportReport<T>) -> String {
    let mut out = if report.accepted.is_empty() {
        "nothing imported, stored data unchanged".to_string()
    } else {
        format!("imported {} entries", report.accepted.len())
    };
    for skipped in &report.skipped {
        let _ = write!(out, "\n  skipped {skipped}");
    }
    out
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, EngineError> {
    serde_json::to_string_pretty(value).map_err(|e| EngineError::Encoding(e.to_string()))
}

// ── Errors ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleError {
    Empty,
    UnknownCommand(String),
    Usage(&'static str),
    BadDate(String),
    BadSlot(String),
    BadNumber(String),
}

impl std::fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsoleError::Empty => write!(f, "empty command"),
            ConsoleError::UnknownCommand(c) => write!(f, "unknown command: {c} (try help)"),
            ConsoleError::Usage(u) => write!(f, "usage: {u}"),
            ConsoleError::BadDate(d) => write!(f, "unreadable date: {d:?}"),
            ConsoleError::BadSlot(s) => write!(f, "unreadable slot: {s:?}"),
            ConsoleError::BadNumber(n) => write!(f, "expected a row number, got {n:?}"),
        }
    }
}

impl std::error::Error for ConsoleError {}
