use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::dto::{CreateBookingRequest, Occupants, UpdateBookingRequest};
use crate::dates::{epoch_ms, from_epoch_ms, normalize_instant, start_of_today};
use crate::error::ApiError;
use crate::rooms::repo::Room;
use crate::tx::{is_retryable, MAX_TX_ATTEMPTS};

pub const STATUS_CONFIRMED: &str = "confirmed";
pub const STATUS_CANCELLED: &str = "cancelled";

/// Reservation record. Date columns are JSONB: this service writes
/// epoch-millisecond numbers, legacy rows may carry other shapes (see
/// `dates::normalize_instant`).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Booking {
    pub id: Uuid,
    pub user_email: String,
    pub room_ids: Vec<Uuid>,
    pub start_date: serde_json::Value,
    pub end_date: serde_json::Value,
    pub occupants: serde_json::Value,
    pub total_amount: f64,
    pub status: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

const BOOKING_COLUMNS: &str = "id, user_email, room_ids, start_date, end_date, occupants, \
                               total_amount, status, created_at, updated_at";

// ---- pure decision logic, unit-tested without a database ----

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingWindow {
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

pub fn validate_window(
    start_ms: i64,
    end_ms: i64,
    today: OffsetDateTime,
) -> Result<BookingWindow, ApiError> {
    let start = from_epoch_ms(start_ms)
        .ok_or_else(|| ApiError::Validation("start_date is not a valid instant".into()))?;
    let end = from_epoch_ms(end_ms)
        .ok_or_else(|| ApiError::Validation("end_date is not a valid instant".into()))?;
    if start >= end {
        return Err(ApiError::Validation(
            "start_date must be before end_date".into(),
        ));
    }
    if start < today {
        return Err(ApiError::Validation(
            "start_date must not be in the past".into(),
        ));
    }
    Ok(BookingWindow { start, end })
}

pub fn validate_occupants(occupants: &Occupants) -> Result<(), ApiError> {
    if occupants.adults < 1 {
        return Err(ApiError::Validation("at least one adult is required".into()));
    }
    if occupants.children < 0 || occupants.elders < 0 {
        return Err(ApiError::Validation("occupant counts must not be negative".into()));
    }
    Ok(())
}

/// Eager precondition check for booking creation. No side effects: every
/// failure here happens before the transactional phase begins. Returns the
/// deduplicated, sorted room-id set and the validated window.
pub fn validate_create(
    req: &CreateBookingRequest,
    today: OffsetDateTime,
) -> Result<(Vec<Uuid>, BookingWindow), ApiError> {
    let room_ids = normalize_room_ids(&req.room_ids)?;
    let window = validate_window(req.start_date, req.end_date, today)?;
    validate_occupants(&req.occupants)?;
    if !req.total_amount.is_finite() || req.total_amount <= 0.0 {
        return Err(ApiError::Validation(
            "total_amount must be a positive number".into(),
        ));
    }
    Ok((room_ids, window))
}

/// Sorted, deduplicated, non-empty room-id set. Sorting gives every
/// transaction the same lock order, which keeps concurrent multi-room
/// bookings from deadlocking.
pub fn normalize_room_ids(ids: &[Uuid]) -> Result<Vec<Uuid>, ApiError> {
    if ids.is_empty() {
        return Err(ApiError::Validation("room_ids must not be empty".into()));
    }
    let mut out = ids.to_vec();
    out.sort();
    out.dedup();
    Ok(out)
}

pub fn missing_room_ids(requested: &[Uuid], found: &[Room]) -> Vec<Uuid> {
    requested
        .iter()
        .filter(|id| !found.iter().any(|r| r.id == **id))
        .copied()
        .collect()
}

/// Every occupied room in the read set, except ids this booking already
/// holds. The full list is reported so a multi-room conflict names all
/// conflicting rooms, not just the first.
pub fn occupied_room_ids(rooms: &[Room], held: &[Uuid]) -> Vec<Uuid> {
    rooms
        .iter()
        .filter(|r| r.occupied && !held.contains(&r.id))
        .map(|r| r.id)
        .collect()
}

/// Room substitution as a (released, acquired) pair; rooms present in both
/// sets keep their flag untouched.
pub fn substitution_diff(current: &[Uuid], requested: &[Uuid]) -> (Vec<Uuid>, Vec<Uuid>) {
    let released = current
        .iter()
        .filter(|id| !requested.contains(id))
        .copied()
        .collect();
    let acquired = requested
        .iter()
        .filter(|id| !current.contains(id))
        .copied()
        .collect();
    (released, acquired)
}

// ---- transactional phase ----

/// Lock the given rooms for the rest of the transaction. Ids must already be
/// sorted; `ORDER BY id` keeps the row-lock acquisition order deterministic.
async fn lock_rooms(
    tx: &mut Transaction<'_, Postgres>,
    ids: &[Uuid],
) -> Result<Vec<Room>, ApiError> {
    let rooms = sqlx::query_as::<_, Room>(
        r#"
        SELECT id, name, room_type, capacity, price_per_night, size_sqm,
               amenities, photos, occupied, average_rating, created_at
        FROM rooms
        WHERE id = ANY($1)
        ORDER BY id
        FOR UPDATE
        "#,
    )
    .bind(ids)
    .fetch_all(&mut **tx)
    .await?;
    Ok(rooms)
}

async fn set_occupied(
    tx: &mut Transaction<'_, Postgres>,
    ids: &[Uuid],
    value: bool,
) -> Result<(), ApiError> {
    if ids.is_empty() {
        return Ok(());
    }
    sqlx::query(r#"UPDATE rooms SET occupied = $2 WHERE id = ANY($1)"#)
        .bind(ids)
        .bind(value)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn fetch_booking_for_update(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<Option<Booking>, ApiError> {
    let booking = sqlx::query_as::<_, Booking>(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(booking)
}

/// Create a booking: one atomic unit that reads every requested room,
/// validates availability, writes the booking and flips the occupancy
/// flags. Either all rooms are reserved or none are. Lost races are retried
/// a bounded number of times, then surfaced as `Conflict`.
pub async fn create_booking(
    db: &PgPool,
    user_email: &str,
    req: &CreateBookingRequest,
) -> Result<Booking, ApiError> {
    let (room_ids, window) = validate_create(req, start_of_today())?;

    let mut attempt = 0;
    loop {
        attempt += 1;
        match create_booking_tx(db, user_email, &room_ids, window, req).await {
            Ok(b) => return Ok(b),
            Err(e) if is_retryable(&e) && attempt < MAX_TX_ATTEMPTS => {
                warn!(user_email, attempt, error = %e, "booking create lost a race, retrying");
            }
            Err(e) if is_retryable(&e) => {
                return Err(ApiError::Conflict(
                    "booking conflicted with concurrent requests, please retry".into(),
                ))
            }
            Err(e) => return Err(e),
        }
    }
}

async fn create_booking_tx(
    db: &PgPool,
    user_email: &str,
    room_ids: &[Uuid],
    window: BookingWindow,
    req: &CreateBookingRequest,
) -> Result<Booking, ApiError> {
    let mut tx = db.begin().await?;

    let rooms = lock_rooms(&mut tx, room_ids).await?;

    let missing = missing_room_ids(room_ids, &rooms);
    if !missing.is_empty() {
        return Err(ApiError::NotFound(format!("rooms not found: {:?}", missing)));
    }
    let unavailable = occupied_room_ids(&rooms, &[]);
    if !unavailable.is_empty() {
        return Err(ApiError::RoomUnavailable(unavailable));
    }

    let booking = sqlx::query_as::<_, Booking>(&format!(
        r#"
        INSERT INTO bookings (id, user_email, room_ids, start_date, end_date,
                              occupants, total_amount, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {BOOKING_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(user_email)
    .bind(room_ids)
    .bind(json!(epoch_ms(window.start)))
    .bind(json!(epoch_ms(window.end)))
    .bind(serde_json::to_value(&req.occupants).map_err(anyhow::Error::from)?)
    .bind(req.total_amount)
    .bind(STATUS_CONFIRMED)
    .fetch_one(&mut *tx)
    .await?;

    set_occupied(&mut tx, room_ids, true).await?;

    tx.commit().await?;
    info!(booking_id = %booking.id, user_email, rooms = room_ids.len(), "booking created");
    Ok(booking)
}

/// Update a booking: dates, occupant counts and room substitution are
/// independently optional, all applied in one transaction. Room flags are
/// never left half-applied; a failed substitution leaves the original rooms
/// occupied.
pub async fn update_booking(
    db: &PgPool,
    requester: Option<&str>,
    booking_id: Uuid,
    patch: &UpdateBookingRequest,
) -> Result<Booking, ApiError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match update_booking_tx(db, requester, booking_id, patch).await {
            Ok(b) => return Ok(b),
            Err(e) if is_retryable(&e) && attempt < MAX_TX_ATTEMPTS => {
                warn!(booking_id = %booking_id, attempt, error = %e, "booking update lost a race, retrying");
            }
            Err(e) if is_retryable(&e) => {
                return Err(ApiError::Conflict(
                    "booking conflicted with concurrent requests, please retry".into(),
                ))
            }
            Err(e) => return Err(e),
        }
    }
}

async fn update_booking_tx(
    db: &PgPool,
    requester: Option<&str>,
    booking_id: Uuid,
    patch: &UpdateBookingRequest,
) -> Result<Booking, ApiError> {
    let mut tx = db.begin().await?;

    let booking = fetch_booking_for_update(&mut tx, booking_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Booking not found".into()))?;
    if let Some(email) = requester {
        if booking.user_email != email {
            return Err(ApiError::NotFound("Booking not found".into()));
        }
    }
    if booking.status != STATUS_CONFIRMED {
        return Err(ApiError::Conflict("booking is cancelled".into()));
    }

    // Merge dates. Re-validate with the creation rules whenever either end
    // moves; untouched dates keep their stored representation.
    let dates_changed = patch.start_date.is_some() || patch.end_date.is_some();
    let (stored_start, stored_end) = if dates_changed {
        let start_ms = match patch.start_date {
            Some(ms) => ms,
            None => normalize_instant(&booking.start_date).map(epoch_ms).ok_or_else(|| {
                ApiError::Validation(
                    "existing start_date is unparseable; supply both dates".into(),
                )
            })?,
        };
        let end_ms = match patch.end_date {
            Some(ms) => ms,
            None => normalize_instant(&booking.end_date).map(epoch_ms).ok_or_else(|| {
                ApiError::Validation("existing end_date is unparseable; supply both dates".into())
            })?,
        };
        let window = validate_window(start_ms, end_ms, start_of_today())?;
        (json!(epoch_ms(window.start)), json!(epoch_ms(window.end)))
    } else {
        (booking.start_date.clone(), booking.end_date.clone())
    };

    if let Some(occupants) = &patch.occupants {
        validate_occupants(occupants)?;
    }
    if let Some(total) = patch.total_amount {
        if !total.is_finite() || total <= 0.0 {
            return Err(ApiError::Validation(
                "total_amount must be a positive number".into(),
            ));
        }
    }

    // Room substitution: verify the acquired rooms inside the same
    // transaction that flips the flags.
    let current_ids = normalize_room_ids(&booking.room_ids)?;
    let new_ids = match &patch.room_ids {
        Some(ids) => normalize_room_ids(ids)?,
        None => current_ids.clone(),
    };
    let (released, acquired) = substitution_diff(&current_ids, &new_ids);

    if !released.is_empty() || !acquired.is_empty() {
        let mut lock_set: Vec<Uuid> = current_ids
            .iter()
            .chain(new_ids.iter())
            .copied()
            .collect();
        lock_set.sort();
        lock_set.dedup();

        let rooms = lock_rooms(&mut tx, &lock_set).await?;
        let missing = missing_room_ids(&new_ids, &rooms);
        if !missing.is_empty() {
            return Err(ApiError::NotFound(format!("rooms not found: {:?}", missing)));
        }
        let acquired_rooms: Vec<Room> = rooms
            .into_iter()
            .filter(|r| acquired.contains(&r.id))
            .collect();
        let unavailable = occupied_room_ids(&acquired_rooms, &current_ids);
        if !unavailable.is_empty() {
            return Err(ApiError::RoomUnavailable(unavailable));
        }

        set_occupied(&mut tx, &released, false).await?;
        set_occupied(&mut tx, &acquired, true).await?;
    }

    let updated = sqlx::query_as::<_, Booking>(&format!(
        r#"
        UPDATE bookings
        SET room_ids     = $2,
            start_date   = $3,
            end_date     = $4,
            occupants    = COALESCE($5, occupants),
            total_amount = COALESCE($6, total_amount),
            updated_at   = now()
        WHERE id = $1
        RETURNING {BOOKING_COLUMNS}
        "#
    ))
    .bind(booking_id)
    .bind(&new_ids)
    .bind(&stored_start)
    .bind(&stored_end)
    .bind(
        patch
            .occupants
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(anyhow::Error::from)?,
    )
    .bind(patch.total_amount)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    info!(booking_id = %booking_id, "booking updated");
    Ok(updated)
}

/// Cancel a booking and free its rooms in one transaction. Cancelling an
/// already-cancelled booking is a no-op.
pub async fn cancel_booking(
    db: &PgPool,
    requester: Option<&str>,
    booking_id: Uuid,
) -> Result<Booking, ApiError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match cancel_booking_tx(db, requester, booking_id).await {
            Ok(b) => return Ok(b),
            Err(e) if is_retryable(&e) && attempt < MAX_TX_ATTEMPTS => {
                warn!(booking_id = %booking_id, attempt, error = %e, "booking cancel lost a race, retrying");
            }
            Err(e) if is_retryable(&e) => {
                return Err(ApiError::Conflict(
                    "booking conflicted with concurrent requests, please retry".into(),
                ))
            }
            Err(e) => return Err(e),
        }
    }
}

async fn cancel_booking_tx(
    db: &PgPool,
    requester: Option<&str>,
    booking_id: Uuid,
) -> Result<Booking, ApiError> {
    let mut tx = db.begin().await?;

    let booking = fetch_booking_for_update(&mut tx, booking_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Booking not found".into()))?;
    if let Some(email) = requester {
        if booking.user_email != email {
            return Err(ApiError::NotFound("Booking not found".into()));
        }
    }
    if booking.status == STATUS_CANCELLED {
        tx.commit().await?;
        return Ok(booking);
    }

    let room_ids = normalize_room_ids(&booking.room_ids)?;
    lock_rooms(&mut tx, &room_ids).await?;
    set_occupied(&mut tx, &room_ids, false).await?;

    let cancelled = sqlx::query_as::<_, Booking>(&format!(
        r#"
        UPDATE bookings
        SET status = $2, updated_at = now()
        WHERE id = $1
        RETURNING {BOOKING_COLUMNS}
        "#
    ))
    .bind(booking_id)
    .bind(STATUS_CANCELLED)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    info!(booking_id = %booking_id, "booking cancelled");
    Ok(cancelled)
}

// ---- read-only projections ----

pub async fn list_all(db: &PgPool) -> Result<Vec<Booking>, ApiError> {
    let bookings = sqlx::query_as::<_, Booking>(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings ORDER BY created_at DESC"
    ))
    .fetch_all(db)
    .await?;
    Ok(bookings)
}

pub async fn list_by_user(db: &PgPool, user_email: &str) -> Result<Vec<Booking>, ApiError> {
    let bookings = sqlx::query_as::<_, Booking>(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE user_email = $1 ORDER BY created_at DESC"
    ))
    .bind(user_email)
    .fetch_all(db)
    .await?;
    Ok(bookings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn room(id: Uuid, occupied: bool) -> Room {
        Room {
            id,
            name: "Test".into(),
            room_type: "double".into(),
            capacity: 2,
            price_per_night: 100.0,
            size_sqm: None,
            amenities: vec![],
            photos: vec![],
            occupied,
            average_rating: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    fn ms(dt: OffsetDateTime) -> i64 {
        epoch_ms(dt)
    }

    const TODAY: OffsetDateTime = datetime!(2026-08-01 00:00 UTC);

    fn valid_request(room_ids: Vec<Uuid>) -> CreateBookingRequest {
        CreateBookingRequest {
            room_ids,
            start_date: ms(datetime!(2026-08-10 12:00 UTC)),
            end_date: ms(datetime!(2026-08-12 10:00 UTC)),
            occupants: Occupants {
                adults: 2,
                children: 1,
                elders: 0,
            },
            total_amount: 420.0,
        }
    }

    #[test]
    fn valid_request_passes_preconditions() {
        let (ids, window) = validate_create(&valid_request(vec![Uuid::new_v4()]), TODAY).unwrap();
        assert_eq!(ids.len(), 1);
        assert!(window.start < window.end);
    }

    #[test]
    fn empty_room_set_is_rejected() {
        let err = validate_create(&valid_request(vec![]), TODAY).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn reversed_window_is_rejected() {
        let mut req = valid_request(vec![Uuid::new_v4()]);
        std::mem::swap(&mut req.start_date, &mut req.end_date);
        assert!(matches!(
            validate_create(&req, TODAY),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn past_dated_booking_is_rejected() {
        let mut req = valid_request(vec![Uuid::new_v4()]);
        req.start_date = ms(datetime!(2026-07-20 12:00 UTC));
        assert!(matches!(
            validate_create(&req, TODAY),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn zero_adults_is_rejected() {
        let mut req = valid_request(vec![Uuid::new_v4()]);
        req.occupants.adults = 0;
        assert!(matches!(
            validate_create(&req, TODAY),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn non_positive_total_is_rejected() {
        let mut req = valid_request(vec![Uuid::new_v4()]);
        req.total_amount = 0.0;
        assert!(matches!(
            validate_create(&req, TODAY),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn room_ids_are_deduplicated_and_sorted() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let ids = normalize_room_ids(&[b, a, b]).unwrap();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[test]
    fn every_conflicting_room_is_named() {
        let free = Uuid::new_v4();
        let busy1 = Uuid::new_v4();
        let busy2 = Uuid::new_v4();
        let rooms = vec![room(free, false), room(busy1, true), room(busy2, true)];

        let unavailable = occupied_room_ids(&rooms, &[]);
        assert_eq!(unavailable.len(), 2);
        assert!(unavailable.contains(&busy1));
        assert!(unavailable.contains(&busy2));
        // One busy room poisons the whole request: the decision is made over
        // the full read set, so room `free` is never flipped on its own.
    }

    #[test]
    fn rooms_already_held_do_not_conflict() {
        let held = Uuid::new_v4();
        let rooms = vec![room(held, true)];
        assert!(occupied_room_ids(&rooms, &[held]).is_empty());
    }

    #[test]
    fn missing_rooms_are_detected() {
        let known = Uuid::new_v4();
        let unknown = Uuid::new_v4();
        let rooms = vec![room(known, false)];
        assert_eq!(missing_room_ids(&[known, unknown], &rooms), vec![unknown]);
    }

    #[test]
    fn substitution_diff_releases_and_acquires() {
        let kept = Uuid::new_v4();
        let old = Uuid::new_v4();
        let new = Uuid::new_v4();

        let (released, acquired) = substitution_diff(&[kept, old], &[kept, new]);
        assert_eq!(released, vec![old]);
        assert_eq!(acquired, vec![new]);

        let (released, acquired) = substitution_diff(&[kept], &[kept]);
        assert!(released.is_empty());
        assert!(acquired.is_empty());
    }
}
