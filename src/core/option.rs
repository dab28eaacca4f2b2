//! Option type and expiration timing
//!
//! US equity options stop trading at the 16:00 US/Eastern close on their
//! expiration date; all time-to-expiry arithmetic is measured to that instant.

use chrono::{DateTime, LocalResult, NaiveDate, TimeZone, Utc};
use chrono_tz::US::Eastern;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Seconds in a 365-day year
const SECONDS_PER_YEAR: f64 = 365.0 * 24.0 * 3600.0;

/// Option type (Call or Put)
///
/// Ordering puts calls before puts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    /// Intrinsic value at given spot
    pub fn intrinsic(&self, spot: f64, strike: f64) -> f64 {
        match self {
            OptionType::Call => (spot - strike).max(0.0),
            OptionType::Put => (strike - spot).max(0.0),
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self, OptionType::Call)
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionType::Call => write!(f, "CALL"),
            OptionType::Put => write!(f, "PUT"),
        }
    }
}

/// Market close (16:00 US/Eastern) on the expiration date, in UTC
pub fn expiration_close(expiry: NaiveDate) -> DateTime<Utc> {
    let close = expiry.and_hms_opt(16, 0, 0).unwrap_or_default();
    match Eastern.from_local_datetime(&close) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
        // 16:00 never falls in a DST gap; fall back to EST offset regardless
        LocalResult::None => close.and_utc() + chrono::Duration::hours(5),
    }
}

/// Years from `now` to the expiration close.
///
/// `None` once the close has passed: expired contracts are skipped, never
/// priced with negative time.
pub fn time_to_expiry_years(now: DateTime<Utc>, expiry: NaiveDate) -> Option<f64> {
    let remaining = expiration_close(expiry) - now;
    if remaining < chrono::Duration::zero() {
        return None;
    }
    Some(remaining.num_seconds() as f64 / SECONDS_PER_YEAR)
}

/// Whole calendar days from `now` (US/Eastern date) to expiry, floored at 0
pub fn days_to_expiry(now: DateTime<Utc>, expiry: NaiveDate) -> u32 {
    let today = now.with_timezone(&Eastern).date_naive();
    (expiry - today).num_days().max(0) as u32
}
