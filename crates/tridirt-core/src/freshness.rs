use std::time::Duration;

use chrono::{DateTime, Utc};

/// Whether `interval` has elapsed since `last_synced`.
///
/// A `last_synced` in the future (clock skew) is never due. A zero interval is
/// always due otherwise.
pub fn is_check_due(now: DateTime<Utc>, last_synced: DateTime<Utc>, interval: Duration) -> bool {
    if last_synced > now {
        return false;
    }
    if interval.is_zero() {
        return true;
    }
    match now.signed_duration_since(last_synced).to_std() {
        Ok(elapsed) => elapsed > interval,
        Err(_) => false,
    }
}
