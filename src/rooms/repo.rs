use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::dto::{CreateRoomRequest, UpdateRoomRequest};
use crate::error::ApiError;

/// Bookable unit. `occupied` is mutated only by the booking engine;
/// `average_rating` only by the review aggregation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Room {
    pub id: Uuid,
    pub name: String,
    pub room_type: String,
    pub capacity: i32,
    pub price_per_night: f64,
    pub size_sqm: Option<f64>,
    pub amenities: Vec<String>,
    pub photos: Vec<String>,
    pub occupied: bool,
    pub average_rating: Option<f64>,
    pub created_at: OffsetDateTime,
}

const ROOM_COLUMNS: &str = "id, name, room_type, capacity, price_per_night, size_sqm, \
                            amenities, photos, occupied, average_rating, created_at";

pub async fn list(db: &PgPool) -> Result<Vec<Room>, ApiError> {
    let rooms = sqlx::query_as::<_, Room>(&format!(
        "SELECT {ROOM_COLUMNS} FROM rooms ORDER BY created_at ASC"
    ))
    .fetch_all(db)
    .await?;
    Ok(rooms)
}

pub async fn find(db: &PgPool, id: Uuid) -> Result<Option<Room>, ApiError> {
    let room = sqlx::query_as::<_, Room>(&format!(
        "SELECT {ROOM_COLUMNS} FROM rooms WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(room)
}

pub async fn create(db: &PgPool, req: &CreateRoomRequest) -> Result<Room, ApiError> {
    let room = sqlx::query_as::<_, Room>(&format!(
        r#"
        INSERT INTO rooms (id, name, room_type, capacity, price_per_night, size_sqm, amenities)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {ROOM_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(&req.name)
    .bind(&req.room_type)
    .bind(req.capacity)
    .bind(req.price_per_night)
    .bind(req.size_sqm)
    .bind(&req.amenities)
    .fetch_one(db)
    .await?;
    Ok(room)
}

pub async fn update(
    db: &PgPool,
    id: Uuid,
    patch: &UpdateRoomRequest,
) -> Result<Option<Room>, ApiError> {
    let room = sqlx::query_as::<_, Room>(&format!(
        r#"
        UPDATE rooms
        SET name            = COALESCE($2, name),
            room_type       = COALESCE($3, room_type),
            capacity        = COALESCE($4, capacity),
            price_per_night = COALESCE($5, price_per_night),
            size_sqm        = COALESCE($6, size_sqm),
            amenities       = COALESCE($7, amenities)
        WHERE id = $1
        RETURNING {ROOM_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(&patch.name)
    .bind(&patch.room_type)
    .bind(patch.capacity)
    .bind(patch.price_per_night)
    .bind(patch.size_sqm)
    .bind(&patch.amenities)
    .fetch_optional(db)
    .await?;
    Ok(room)
}

/// Delete a room, returning its photo keys so the caller can clean up the
/// object store afterwards.
pub async fn delete(db: &PgPool, id: Uuid) -> Result<Option<Vec<String>>, ApiError> {
    let row: Option<(Vec<String>,)> =
        sqlx::query_as(r#"DELETE FROM rooms WHERE id = $1 RETURNING photos"#)
            .bind(id)
            .fetch_optional(db)
            .await?;
    Ok(row.map(|(photos,)| photos))
}

/// Append uploaded photo keys to a room's photo list.
pub async fn append_photos(db: &PgPool, id: Uuid, keys: &[String]) -> Result<bool, ApiError> {
    let result = sqlx::query(r#"UPDATE rooms SET photos = photos || $2 WHERE id = $1"#)
        .bind(id)
        .bind(keys)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}
