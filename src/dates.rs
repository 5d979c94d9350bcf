use serde_json::Value;
use time::{format_description::well_known::Rfc3339, OffsetDateTime, Time};
use tracing::warn;

/// Normalize a stored instant to a single type. Bookings written by this
/// service store epoch-millisecond numbers, but the collection also carries
/// legacy rows with RFC3339 strings or `{seconds, nanoseconds}` timestamp
/// objects. Unparseable values normalize to `None`, never an error.
pub fn normalize_instant(value: &Value) -> Option<OffsetDateTime> {
    match value {
        Value::Number(n) => {
            let ms = n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.round() as i64))?;
            from_epoch_ms(ms)
        }
        Value::String(s) => match OffsetDateTime::parse(s, &Rfc3339) {
            Ok(dt) => Some(dt),
            Err(_) => {
                warn!(value = %s, "unparseable stored instant");
                None
            }
        },
        Value::Object(map) => {
            let seconds = map
                .get("seconds")
                .or_else(|| map.get("_seconds"))
                .and_then(Value::as_i64)?;
            let nanos = map.get("nanoseconds").and_then(Value::as_i64).unwrap_or(0);
            // Stored garbage must come back as None, not an overflow panic.
            let ms = seconds
                .checked_mul(1000)?
                .checked_add(nanos / 1_000_000)?;
            from_epoch_ms(ms)
        }
        _ => None,
    }
}

pub fn from_epoch_ms(ms: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000).ok()
}

pub fn epoch_ms(dt: OffsetDateTime) -> i64 {
    (dt.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Midnight UTC of the current day; bookings may not start before this.
pub fn start_of_today() -> OffsetDateTime {
    OffsetDateTime::now_utc().replace_time(Time::MIDNIGHT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const INSTANT_MS: i64 = 1_735_689_600_000; // 2025-01-01T00:00:00Z

    #[test]
    fn three_representations_normalize_identically() {
        let from_number = normalize_instant(&json!(INSTANT_MS)).expect("number form");
        let from_string = normalize_instant(&json!("2025-01-01T00:00:00Z")).expect("string form");
        let from_object = normalize_instant(&json!({
            "seconds": INSTANT_MS / 1000,
            "nanoseconds": 0,
        }))
        .expect("object form");

        assert_eq!(from_number, from_string);
        assert_eq!(from_number, from_object);
        assert_eq!(epoch_ms(from_number), INSTANT_MS);
    }

    #[test]
    fn underscore_seconds_variant_is_accepted() {
        let dt = normalize_instant(&json!({
            "_seconds": INSTANT_MS / 1000,
            "nanoseconds": 500_000_000,
        }))
        .expect("underscore form");
        assert_eq!(epoch_ms(dt), INSTANT_MS + 500);
    }

    #[test]
    fn garbage_normalizes_to_none() {
        assert!(normalize_instant(&json!("not a date")).is_none());
        assert!(normalize_instant(&json!(null)).is_none());
        assert!(normalize_instant(&json!([1, 2, 3])).is_none());
        assert!(normalize_instant(&json!({ "nanoseconds": 5 })).is_none());
    }

    #[test]
    fn out_of_range_object_seconds_normalize_to_none() {
        assert!(
            normalize_instant(&json!({ "seconds": i64::MAX, "nanoseconds": 0 })).is_none()
        );
        assert!(
            normalize_instant(&json!({ "seconds": i64::MIN, "nanoseconds": 0 })).is_none()
        );
        // In range for the multiply, out of range for a timestamp.
        assert!(normalize_instant(&json!({ "seconds": i64::MAX / 1000 })).is_none());
    }

    #[test]
    fn epoch_ms_roundtrip() {
        let dt = from_epoch_ms(INSTANT_MS).unwrap();
        assert_eq!(epoch_ms(dt), INSTANT_MS);
    }
}
