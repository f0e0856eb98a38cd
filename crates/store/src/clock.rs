//! ISO-8601 timestamps as stored in every text time column.

use chrono::{DateTime, SecondsFormat, Utc};

/// Current UTC time, e.g. `2025-06-14T08:30:00.123456+00:00`.
pub fn now_iso() -> String {
    to_iso(Utc::now())
}

pub fn to_iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn offset_is_spelled_out() {
        let ts = Utc.with_ymd_and_hms(2025, 6, 14, 8, 30, 0).unwrap();
        assert_eq!(to_iso(ts), "2025-06-14T08:30:00.000000+00:00");
    }

    #[test]
    fn iso_strings_sort_chronologically() {
        let a = to_iso(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        let b = to_iso(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 1).unwrap());
        assert!(a < b);
        assert!(b.as_str() < crate::OPEN_ENDED_VALID_TO);
    }
}
