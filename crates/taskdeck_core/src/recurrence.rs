//! Recurrence next-occurrence calculator.
//!
//! # Responsibility
//! - Compute the next due instant for a recurrence pattern using calendar
//!   arithmetic in the civil zone.
//!
//! # Invariants
//! - One application always moves the instant strictly forward.
//! - Month/year steps use calendar arithmetic: the day-of-month clamps to
//!   the last day of the target month (Jan 31 + 1 month = Feb 28, or Feb 29
//!   in leap years; Feb 29 + 1 year = Feb 28).
//! - Wall-clock time of day is preserved across DST transitions; instants
//!   landing in a spring-forward gap shift forward one hour.

use crate::civil::{civil_to_utc, parse_instant, to_civil};
use crate::model::todo::RecurrencePattern;
use chrono::{DateTime, Days, Months, Utc};

/// Computes the due instant one calendar unit after `due`.
///
/// Returns `None` when the result is unrepresentable (calendar overflow or
/// an unresolvable civil datetime).
pub fn next_occurrence(due: DateTime<Utc>, pattern: RecurrencePattern) -> Option<DateTime<Utc>> {
    let civil = to_civil(due);
    let advanced = match pattern {
        RecurrencePattern::Daily => civil.checked_add_days(Days::new(1))?,
        RecurrencePattern::Weekly => civil.checked_add_days(Days::new(7))?,
        RecurrencePattern::Monthly => civil.checked_add_months(Months::new(1))?,
        RecurrencePattern::Yearly => civil.checked_add_months(Months::new(12))?,
    };
    civil_to_utc(advanced)
}

/// String-input variant: parses an RFC3339 instant and advances it.
///
/// `None` is the failure sentinel for unparseable input.
pub fn next_occurrence_str(due: &str, pattern: RecurrencePattern) -> Option<DateTime<Utc>> {
    next_occurrence(parse_instant(due)?, pattern)
}
