use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Canonical comparable timestamp used across the pipeline.
pub type Timestamp = DateTime<Utc>;

const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%:z";

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%d/%m/%y %H:%M",
];

/// Parses the date/time spellings found in the raw exports into a UTC timestamp.
///
/// Values without an offset are taken as UTC. Returns `None` when no known format
/// matches; callers decide whether that is worth a warning.
pub fn normalize_timestamp(raw: &str) -> Option<Timestamp> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    let zulu;
    let value = match value.strip_suffix('Z').or_else(|| value.strip_suffix('z')) {
        Some(stripped) => {
            zulu = format!("{stripped}+00:00");
            zulu.as_str()
        }
        None => value,
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Millisecond-precision text form written to every output table.
pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.format(CANONICAL_FORMAT).to_string()
}
