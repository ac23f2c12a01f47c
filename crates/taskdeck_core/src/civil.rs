//! Civil-zone time utilities.
//!
//! # Responsibility
//! - Convert between UTC instants and the fixed civil zone used for all
//!   date-only reasoning.
//! - Provide the epoch-millisecond codec used by the storage layer.
//! - Expose the injectable `Clock` collaborator for "now".
//!
//! # Invariants
//! - Every stored instant is UTC; the civil zone is only entered for
//!   calendar arithmetic and left again before persistence.
//! - Civil datetimes landing in a DST gap resolve by shifting forward one
//!   hour; ambiguous (fold) datetimes resolve to the earlier offset.

use chrono::{DateTime, Days, Duration, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// The fixed civil zone for date-only reasoning.
pub const CIVIL_ZONE: Tz = chrono_tz::Europe::Berlin;

/// Wire format for instants in snapshots: RFC3339 with fixed millisecond
/// precision, so encoded values also sort lexicographically.
const INSTANT_WIRE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Source of "now" injected into services that reason about the current
/// instant. Production callers use [`SystemClock`]; tests pin a
/// [`FixedClock`].
pub trait Clock {
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Wall clock implementation of [`Clock`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic [`Clock`] returning one pinned instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Converts a UTC instant to its civil-zone wall-clock representation.
pub fn to_civil(instant: DateTime<Utc>) -> NaiveDateTime {
    instant.with_timezone(&CIVIL_ZONE).naive_local()
}

/// Resolves a civil wall-clock datetime back to a UTC instant.
///
/// Returns `None` only when the datetime cannot be represented even after
/// the one-hour gap shift (out-of-range arithmetic).
pub fn civil_to_utc(civil: NaiveDateTime) -> Option<DateTime<Utc>> {
    match CIVIL_ZONE.from_local_datetime(&civil) {
        LocalResult::Single(resolved) => Some(resolved.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _latest) => Some(earliest.with_timezone(&Utc)),
        // Spring-forward gap: the wall-clock time does not exist, shift
        // forward one hour and resolve again.
        LocalResult::None => {
            let shifted = civil.checked_add_signed(Duration::hours(1))?;
            match CIVIL_ZONE.from_local_datetime(&shifted) {
                LocalResult::Single(resolved) => Some(resolved.with_timezone(&Utc)),
                LocalResult::Ambiguous(earliest, _latest) => Some(earliest.with_timezone(&Utc)),
                LocalResult::None => None,
            }
        }
    }
}

/// Adds whole civil days to an instant, preserving wall-clock time of day.
pub fn add_civil_days(instant: DateTime<Utc>, days: u64) -> Option<DateTime<Utc>> {
    let civil = to_civil(instant).checked_add_days(Days::new(days))?;
    civil_to_utc(civil)
}

/// Encodes an instant as epoch milliseconds for storage.
pub fn to_epoch_ms(instant: DateTime<Utc>) -> i64 {
    instant.timestamp_millis()
}

/// Decodes stored epoch milliseconds back to an instant.
pub fn from_epoch_ms(epoch_ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(epoch_ms).single()
}

/// Formats an instant in the snapshot wire format.
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.format(INSTANT_WIRE_FORMAT).to_string()
}

/// Parses an RFC3339 instant, tolerating any offset; returns `None` on
/// malformed input.
pub fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}
