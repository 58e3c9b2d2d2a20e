//! Per-tool "last synchronized" timestamp files.

use std::{fs, io, path::Path};

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use tracing::{debug, warn};

use crate::error::UpdateError;

/// Returned for missing or unreadable state. Earlier than any real remote
/// timestamp, so the first check always finds something newer.
pub const NEVER_SYNCED: DateTime<Utc> = DateTime::<Utc>::MIN_UTC;

const LEGACY_FORMAT: &str = "%m-%d-%Y %H:%M:%S";

pub fn read_timestamp(path: &Path) -> DateTime<Utc> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("No sync state at {}", path.display());
            return NEVER_SYNCED;
        }
        Err(e) => {
            warn!("Failed to read sync state {}: {}", path.display(), e);
            return NEVER_SYNCED;
        }
    };

    match parse_timestamp(&raw) {
        Some(ts) => ts,
        None => {
            if !raw.trim().is_empty() {
                warn!(
                    "Ignoring unparseable sync state {}: {:?}",
                    path.display(),
                    raw.trim()
                );
            }
            NEVER_SYNCED
        }
    }
}

pub fn write_timestamp(path: &Path, ts: DateTime<Utc>) -> Result<(), UpdateError> {
    let payload = format_timestamp(ts);
    tridirt_util::write_atomic(path, payload.as_bytes()).map_err(|source| {
        UpdateError::StateWrite {
            path: path.to_path_buf(),
            source,
        }
    })?;
    debug!("Recorded sync state {} = {}", path.display(), payload);
    Ok(())
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Accepts RFC 3339 and the older `%m-%d-%Y %H:%M:%S` layout (read as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, LEGACY_FORMAT)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}
