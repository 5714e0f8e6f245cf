use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate};
use serde_json::Value;

use crate::error::ReservationError;

/// Cleans a raw seat list into a deduplicated ascending set of positive
/// integers. Accepts a bare scalar or an array; tolerates mixed types the
/// way the public API always has (numeric strings count, everything else is
/// dropped). Fails when nothing valid remains.
pub fn normalize_seats(raw: &Value) -> Result<BTreeSet<u32>, ReservationError> {
    let mut seats = BTreeSet::new();

    match raw {
        Value::Array(items) => {
            for item in items {
                if let Some(n) = seat_from_value(item) {
                    seats.insert(n);
                }
            }
        }
        Value::Null => {}
        other => {
            if let Some(n) = seat_from_value(other) {
                seats.insert(n);
            }
        }
    }

    if seats.is_empty() {
        return Err(ReservationError::validation(
            "seat_numbers must contain at least one positive integer",
        ));
    }

    Ok(seats)
}

fn seat_from_value(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                u32::try_from(i).ok().filter(|s| *s > 0)
            } else if let Some(f) = n.as_f64() {
                // Fractional seat numbers are invalid, not rounded.
                if f.fract() == 0.0 && f > 0.0 && f <= u32::MAX as f64 {
                    Some(f as u32)
                } else {
                    None
                }
            } else {
                None
            }
        }
        Value::String(s) => s.trim().parse::<u32>().ok().filter(|n| *n > 0),
        _ => None,
    }
}

/// Normalizes a travel date to calendar-day granularity. Accepts a plain
/// `YYYY-MM-DD` or an RFC 3339 timestamp whose time-of-day is discarded.
pub fn normalize_travel_date(raw: &str) -> Result<NaiveDate, ReservationError> {
    let trimmed = raw.trim();

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date);
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ts.date_naive());
    }

    Err(ReservationError::validation(format!(
        "invalid travel_date: {raw}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_mixed_input() {
        let raw = json!([3, 3, 1, -2, "x", 2]);
        let seats = normalize_seats(&raw).unwrap();
        assert_eq!(seats.into_iter().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn accepts_scalar_seat() {
        let seats = normalize_seats(&json!(7)).unwrap();
        assert_eq!(seats.into_iter().collect::<Vec<_>>(), vec![7]);
    }

    #[test]
    fn accepts_numeric_strings() {
        let seats = normalize_seats(&json!(["12", 4])).unwrap();
        assert_eq!(seats.into_iter().collect::<Vec<_>>(), vec![4, 12]);
    }

    #[test]
    fn drops_fractional_numbers() {
        let seats = normalize_seats(&json!([2.5, 3.0])).unwrap();
        assert_eq!(seats.into_iter().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn rejects_all_invalid_input() {
        let raw = json!(["x", -1, 0, null, {"seat": 4}]);
        let err = normalize_seats(&raw).unwrap_err();
        assert!(matches!(err, ReservationError::Validation(_)));
    }

    #[test]
    fn rejects_empty_list() {
        let err = normalize_seats(&json!([])).unwrap_err();
        assert!(matches!(err, ReservationError::Validation(_)));
    }

    #[test]
    fn parses_plain_date() {
        let date = normalize_travel_date("2025-03-01").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
    }

    #[test]
    fn discards_time_of_day() {
        let date = normalize_travel_date("2025-03-01T18:45:00+02:00").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
    }

    #[test]
    fn rejects_garbage_date() {
        let err = normalize_travel_date("next tuesday").unwrap_err();
        assert!(matches!(err, ReservationError::Validation(_)));
    }
}
