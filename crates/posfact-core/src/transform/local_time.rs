use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};
use chrono_tz::Tz;

/// Timezone the date and time keys are reported in.
pub const REPORTING_TIMEZONE: Tz = chrono_tz::America::Argentina::Buenos_Aires;

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"];

/// Parses a timestamp from a raw export. Values without an offset are taken
/// as UTC. Returns `None` for anything unparseable.
pub fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(parsed.and_utc());
        }
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
}

/// `(YYYYMMDD, minutes since midnight)` of `instant` in the reporting
/// timezone.
pub fn local_keys(instant: DateTime<Utc>) -> (i64, i64) {
    let local = instant.with_timezone(&REPORTING_TIMEZONE);
    let date_key =
        i64::from(local.year()) * 10_000 + i64::from(local.month()) * 100 + i64::from(local.day());
    let time_key = i64::from(local.hour()) * 60 + i64::from(local.minute());
    (date_key, time_key)
}
