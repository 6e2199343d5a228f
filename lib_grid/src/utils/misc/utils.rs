use chrono::{DateTime, Utc};

/// Returns the current UTC time formatted as an RFC 9557 / RFC 3339 string
/// with millisecond precision (e.g. `2026-02-05T08:00:00.000Z`).
pub fn current_datetime_rfc9557() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Milliseconds since the Unix epoch.
///
/// Cells stamp `fetched_at` with this value; `0` is reserved for "never fetched".
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc9557_has_millis_and_zulu() {
        let ts = current_datetime_rfc9557();
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), "2026-02-05T08:00:00.000Z".len());
    }

    #[test]
    fn now_millis_is_positive() {
        assert!(now_millis() > 0);
    }
}
