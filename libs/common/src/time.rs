//! Wire formatting for timestamps.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a timestamp the way clients receive it: RFC 3339, UTC, second
/// precision, `Z` suffix (e.g. `2025-01-01T10:00:00Z`).
pub fn wire_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formats_with_zulu_suffix() {
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
        assert_eq!(wire_timestamp(at), "2025-01-01T10:00:00Z");
    }

    #[test]
    fn drops_subsecond_precision() {
        let at = Utc.with_ymd_and_hms(2025, 6, 30, 23, 59, 59).unwrap()
            + chrono::Duration::milliseconds(750);
        assert_eq!(wire_timestamp(at), "2025-06-30T23:59:59Z");
    }
}
