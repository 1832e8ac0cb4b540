//! Timestamp resolution precedence: clock-skew correction, verbatim
//! client timestamp, offset-from-now, or `now` — in that order. A
//! timestamp that fails to parse is treated as absent, not as an error.

use chrono::{DateTime, Duration, Utc};

/// `now` is the broker-assigned arrival time; `timestamp` is the raw
/// client-supplied string (RFC 3339), `sent_at` the client's reported send
/// time, `offset_ms` a client-reported age in milliseconds.
pub fn resolve_timestamp(
    now: DateTime<Utc>,
    timestamp: Option<&str>,
    sent_at: Option<DateTime<Utc>>,
    offset_ms: Option<i64>,
) -> DateTime<Utc> {
    if let Some(parsed) = timestamp.and_then(|ts| DateTime::parse_from_rfc3339(ts).ok()) {
        let parsed = parsed.with_timezone(&Utc);
        return match sent_at {
            Some(sent_at) => now + (parsed - sent_at),
            None => parsed,
        };
    }

    if let Some(offset_ms) = offset_ms {
        return now - Duration::milliseconds(offset_ms);
    }

    now
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-07-27T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn timestamp_and_sent_at_apply_clock_skew_correction() {
        let resolved = resolve_timestamp(
            now(),
            Some("2026-07-27T11:59:00Z"),
            Some(
                DateTime::parse_from_rfc3339("2026-07-27T11:58:50Z")
                    .unwrap()
                    .with_timezone(&Utc),
            ),
            None,
        );
        // timestamp - sent_at = 10s, so resolved = now + 10s
        assert_eq!(resolved, now() + Duration::seconds(10));
    }

    #[test]
    fn timestamp_alone_is_used_verbatim() {
        let resolved = resolve_timestamp(now(), Some("2026-07-27T11:00:00Z"), None, None);
        assert_eq!(
            resolved,
            DateTime::parse_from_rfc3339("2026-07-27T11:00:00Z")
                .unwrap()
                .with_timezone(&Utc)
        );
    }

    #[test]
    fn offset_subtracts_milliseconds_from_now() {
        let resolved = resolve_timestamp(now(), None, None, Some(5_000));
        assert_eq!(resolved, now() - Duration::seconds(5));
    }

    #[test]
    fn nothing_present_falls_back_to_now() {
        assert_eq!(resolve_timestamp(now(), None, None, None), now());
    }

    #[test]
    fn unparseable_timestamp_falls_through_to_offset() {
        let resolved = resolve_timestamp(now(), Some("not-a-timestamp"), None, Some(1_000));
        assert_eq!(resolved, now() - Duration::seconds(1));
    }
}
