use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo::Booking;
use crate::dates::normalize_instant;

/// Occupant counts carried on a booking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Occupants {
    pub adults: i32,
    #[serde(default)]
    pub children: i32,
    #[serde(default)]
    pub elders: i32,
}

/// Dates travel on the wire as epoch-millisecond numbers, matching the
/// stored representation for new writes.
#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub room_ids: Vec<Uuid>,
    pub start_date: i64,
    pub end_date: i64,
    pub occupants: Occupants,
    pub total_amount: f64,
}

/// Independently-optional booking patch: new dates, new occupant counts,
/// room substitution.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateBookingRequest {
    pub start_date: Option<i64>,
    pub end_date: Option<i64>,
    pub occupants: Option<Occupants>,
    pub room_ids: Option<Vec<Uuid>>,
    pub total_amount: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct CreatedBookingResponse {
    pub booking_id: Uuid,
}

/// Dates are optional epoch milliseconds. They are validated as a booking
/// window when supplied, though the answer is still the room's occupancy
/// flag (see `check_availability`).
#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub room_id: Uuid,
    pub start_date: Option<i64>,
    pub end_date: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub room_id: Uuid,
    pub available: bool,
}

/// Read projection of a booking. Stored instants are normalized to one
/// instant type; unparseable legacy values surface as `null`.
#[derive(Debug, Serialize)]
pub struct BookingView {
    pub id: Uuid,
    pub user_email: String,
    pub room_ids: Vec<Uuid>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub start_date: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub end_date: Option<OffsetDateTime>,
    pub occupants: serde_json::Value,
    pub total_amount: f64,
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<Booking> for BookingView {
    fn from(b: Booking) -> Self {
        Self {
            id: b.id,
            user_email: b.user_email,
            room_ids: b.room_ids,
            start_date: normalize_instant(&b.start_date),
            end_date: normalize_instant(&b.end_date),
            occupants: b.occupants,
            total_amount: b.total_amount,
            status: b.status,
            created_at: b.created_at,
            updated_at: b.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn booking_with_dates(start: serde_json::Value, end: serde_json::Value) -> Booking {
        Booking {
            id: Uuid::new_v4(),
            user_email: "guest@example.com".into(),
            room_ids: vec![Uuid::new_v4()],
            start_date: start,
            end_date: end,
            occupants: json!({ "adults": 2, "children": 0, "elders": 0 }),
            total_amount: 300.0,
            status: "confirmed".into(),
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    const MS: i64 = 1_735_689_600_000; // 2025-01-01T00:00:00Z

    #[test]
    fn legacy_date_formats_project_to_one_instant() {
        let as_number = BookingView::from(booking_with_dates(json!(MS), json!(MS)));
        let as_string = BookingView::from(booking_with_dates(
            json!("2025-01-01T00:00:00Z"),
            json!("2025-01-01T00:00:00Z"),
        ));
        let as_object = BookingView::from(booking_with_dates(
            json!({ "seconds": MS / 1000, "nanoseconds": 0 }),
            json!({ "_seconds": MS / 1000, "nanoseconds": 0 }),
        ));

        assert_eq!(as_number.start_date, as_string.start_date);
        assert_eq!(as_number.start_date, as_object.start_date);
        assert_eq!(as_number.end_date, as_object.end_date);
        assert!(as_number.start_date.is_some());
    }

    #[test]
    fn unparseable_dates_become_null_not_errors() {
        let view = BookingView::from(booking_with_dates(json!("garbage"), json!(null)));
        assert!(view.start_date.is_none());
        assert!(view.end_date.is_none());

        let json = serde_json::to_value(&view).unwrap();
        assert!(json["start_date"].is_null());
        assert!(json["end_date"].is_null());
    }

    #[test]
    fn occupants_default_children_and_elders() {
        let o: Occupants = serde_json::from_value(json!({ "adults": 2 })).unwrap();
        assert_eq!(
            o,
            Occupants {
                adults: 2,
                children: 0,
                elders: 0
            }
        );
    }
}
