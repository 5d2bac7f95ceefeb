//! Period resolution.
//!
//! Maps a reference instant and a tracking cadence to a concrete period
//! window and ordinal. All windows are UTC calendar windows: the instant
//! is normalized to UTC first and the same discipline holds throughout,
//! so two calls with the same inputs produce identical output.
//!
//! Boundaries are inclusive of the last whole second of the window's
//! final day (23:59:59).

use compass_storage::PeriodType;
use time::macros::time;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

/// A concrete period window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodWindow {
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
    pub year: i32,
    /// Month 1-12, quarter 1-4, or 1 for yearly.
    pub ordinal: u8,
}

impl PeriodWindow {
    /// Whether the window contains the given instant (boundaries
    /// inclusive).
    pub fn contains(&self, instant: OffsetDateTime) -> bool {
        self.start <= instant && instant <= self.end
    }

    /// Canonical RFC 3339 form of the window start -- the lookup key for
    /// value period rows.
    pub fn start_key(&self) -> String {
        format_utc(self.start)
    }

    /// Canonical RFC 3339 form of the window end.
    pub fn end_key(&self) -> String {
        format_utc(self.end)
    }
}

/// Resolve the period window containing `instant` for the given cadence.
pub fn resolve_period(instant: OffsetDateTime, period_type: PeriodType) -> PeriodWindow {
    let utc = instant.to_offset(UtcOffset::UTC);
    let year = utc.year();
    let month = utc.month();

    match period_type {
        PeriodType::Monthly => window(year, month, month, month as u8, utc.date()),
        PeriodType::Quarterly => {
            let ordinal = (month as u8 - 1) / 3 + 1;
            let first = month_from_number((ordinal - 1) * 3 + 1, utc.date());
            let last = month_from_number(ordinal * 3, utc.date());
            window(year, first, last, ordinal, utc.date())
        }
        PeriodType::Yearly => window(year, Month::January, Month::December, 1, utc.date()),
    }
}

fn window(year: i32, first: Month, last: Month, ordinal: u8, fallback: Date) -> PeriodWindow {
    let start_date = Date::from_calendar_date(year, first, 1).unwrap_or(fallback);
    let end_day = time::util::days_in_year_month(year, last);
    let end_date = Date::from_calendar_date(year, last, end_day).unwrap_or(fallback);

    PeriodWindow {
        start: PrimitiveDateTime::new(start_date, Time::MIDNIGHT).assume_utc(),
        end: PrimitiveDateTime::new(end_date, time!(23:59:59)).assume_utc(),
        year,
        ordinal,
    }
}

fn month_from_number(n: u8, fallback: Date) -> Month {
    Month::try_from(n).unwrap_or_else(|_| fallback.month())
}

/// Format an instant as `YYYY-MM-DDThh:mm:ssZ`. Manual formatting keeps
/// the canonical key infallible and byte-stable.
fn format_utc(instant: OffsetDateTime) -> String {
    let utc = instant.to_offset(UtcOffset::UTC);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        utc.year(),
        utc.month() as u8,
        utc.day(),
        utc.hour(),
        utc.minute(),
        utc.second()
    )
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
