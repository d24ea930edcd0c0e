//! Expiration handling.
//!
//! Every mutating operation takes an [`Expiry`], a tri-state expiration:
//!
//! | Variant | Meaning |
//! |---------|---------|
//! | `Never` | Lives until explicitly deleted |
//! | `After` | Relative duration from now |
//! | `At`    | Absolute Unix timestamp (seconds) |
//!
//! Raw second counts decode with the memcached convention: `0` means
//! indefinite, values below 30 days are durations, anything larger is an
//! absolute timestamp. Conversion to a store's native unit happens exactly
//! once, at the backend boundary.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Raw-seconds values at or above this are absolute Unix timestamps, below
/// it relative durations (30 days, the memcached wire convention).
pub const RELATIVE_CUTOFF_SECS: u64 = 2_592_000;

/// Tri-state expiration for stored values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expiry {
    /// Never expires until explicitly deleted.
    Never,
    /// Expires this long after the operation.
    After(Duration),
    /// Expires at an absolute Unix timestamp, in seconds.
    At(u64),
}

impl Expiry {
    /// Decode a raw seconds value (`0` = never, `< 30 days` = relative,
    /// otherwise absolute).
    pub fn from_raw_secs(raw: u64) -> Self {
        if raw == 0 {
            Expiry::Never
        } else if raw < RELATIVE_CUTOFF_SECS {
            Expiry::After(Duration::from_secs(raw))
        } else {
            Expiry::At(raw)
        }
    }

    /// Convert to a relative TTL in whole seconds, or `None` for indefinite.
    ///
    /// An absolute time at or before `now` clamps to one second: the entry
    /// is stored and lapses immediately rather than erroring, since stores
    /// reject zero or negative TTLs.
    pub fn as_ttl_secs(&self, now: u64) -> Option<u64> {
        match self {
            Expiry::Never => None,
            Expiry::After(d) => Some(d.as_secs().max(1)),
            Expiry::At(ts) => Some(ts.saturating_sub(now).max(1)),
        }
    }

    /// Whether this is the indefinite expiration.
    pub fn is_indefinite(&self) -> bool {
        matches!(self, Expiry::Never)
    }
}

/// Current Unix time in whole seconds.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
