use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    dto::{
        AvailabilityQuery, AvailabilityResponse, BookingView, CreateBookingRequest,
        CreatedBookingResponse, UpdateBookingRequest,
    },
    repo,
};
use crate::auth::extractors::{AdminSession, AuthSession, SessionIdentity};
use crate::error::ApiError;
use crate::rooms;
use crate::sessions::Role;
use crate::state::AppState;

#[instrument(skip(state, session, payload))]
pub async fn create_booking(
    State(state): State<AppState>,
    session: AuthSession,
    Json(payload): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<CreatedBookingResponse>), ApiError> {
    let booking = repo::create_booking(&state.db, &session.email, &payload).await?;
    info!(booking_id = %booking.id, user = %session.email, "booking accepted");
    Ok((
        StatusCode::CREATED,
        Json(CreatedBookingResponse {
            booking_id: booking.id,
        }),
    ))
}

#[instrument(skip(state, session, payload))]
pub async fn update_booking(
    State(state): State<AppState>,
    session: AuthSession,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateBookingRequest>,
) -> Result<Json<BookingView>, ApiError> {
    let booking = repo::update_booking(&state.db, Some(&session.email), id, &payload).await?;
    Ok(Json(booking.into()))
}

#[instrument(skip(state, identity))]
pub async fn cancel_booking(
    State(state): State<AppState>,
    identity: SessionIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingView>, ApiError> {
    // Admins may cancel any booking; users only their own.
    let requester = match identity.role {
        Role::Admin => None,
        Role::User => Some(identity.email.as_str()),
    };
    let booking = repo::cancel_booking(&state.db, requester, id).await?;
    Ok(Json(booking.into()))
}

#[instrument(skip(state, session))]
pub async fn list_my_bookings(
    State(state): State<AppState>,
    session: AuthSession,
) -> Result<Json<Vec<BookingView>>, ApiError> {
    let bookings = repo::list_by_user(&state.db, &session.email).await?;
    Ok(Json(bookings.into_iter().map(Into::into).collect()))
}

#[instrument(skip(state, admin))]
pub async fn list_bookings(
    State(state): State<AppState>,
    admin: AdminSession,
) -> Result<Json<Vec<BookingView>>, ApiError> {
    let bookings = repo::list_all(&state.db).await?;
    Ok(Json(bookings.into_iter().map(Into::into).collect()))
}

/// Callers may send a requested window; it is validated like a booking's,
/// but the flag cannot yet answer per-window questions.
fn validate_availability_window(
    query: &AvailabilityQuery,
    today: time::OffsetDateTime,
) -> Result<(), ApiError> {
    match (query.start_date, query.end_date) {
        (None, None) => Ok(()),
        (Some(start), Some(end)) => repo::validate_window(start, end, today).map(|_| ()),
        _ => Err(ApiError::Validation(
            "start_date and end_date must be supplied together".into(),
        )),
    }
}

/// Read-only occupancy probe. Reflects the boolean flag, not interval
/// availability.
#[instrument(skip(state, _session))]
pub async fn check_availability(
    State(state): State<AppState>,
    _session: AuthSession,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    validate_availability_window(&query, crate::dates::start_of_today())?;
    let room = rooms::repo::find(&state.db, query.room_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Room not found".into()))?;
    Ok(Json(AvailabilityResponse {
        room_id: room.id,
        available: !room.occupied,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use uuid::Uuid;

    const TODAY: time::OffsetDateTime = datetime!(2026-08-01 00:00 UTC);

    fn query(start: Option<i64>, end: Option<i64>) -> AvailabilityQuery {
        AvailabilityQuery {
            room_id: Uuid::new_v4(),
            start_date: start,
            end_date: end,
        }
    }

    #[test]
    fn availability_window_is_optional() {
        assert!(validate_availability_window(&query(None, None), TODAY).is_ok());
    }

    #[test]
    fn availability_window_must_be_complete() {
        let err = validate_availability_window(&query(Some(1_790_000_000_000), None), TODAY)
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn availability_window_is_validated_like_a_booking() {
        let start = 1_790_000_000_000; // well after TODAY
        let end = start + 86_400_000;
        assert!(validate_availability_window(&query(Some(start), Some(end)), TODAY).is_ok());
        // Inverted window is rejected.
        assert!(validate_availability_window(&query(Some(end), Some(start)), TODAY).is_err());
    }
}
