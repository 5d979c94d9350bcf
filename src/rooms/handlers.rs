use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{CreateRoomRequest, CreatedRoomResponse, RoomDetails, UpdateRoomRequest, UploadedPhotosResponse},
    photos::{self, UploadItem},
    repo::{self, Room},
};
use crate::auth::extractors::AdminSession;
use crate::error::ApiError;
use crate::state::AppState;

fn validate_room_fields(name: &str, capacity: i32, price: f64) -> Result<(), ApiError> {
    if name.trim().is_empty() {
        return Err(ApiError::Validation("Room name is required".into()));
    }
    if capacity < 1 {
        return Err(ApiError::Validation("Capacity must be at least 1".into()));
    }
    if !price.is_finite() || price <= 0.0 {
        return Err(ApiError::Validation("Price must be a positive number".into()));
    }
    Ok(())
}

#[instrument(skip(state))]
pub async fn list_rooms(State(state): State<AppState>) -> Result<Json<Vec<Room>>, ApiError> {
    let rooms = repo::list(&state.db).await?;
    Ok(Json(rooms))
}

#[instrument(skip(state))]
pub async fn get_room(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RoomDetails>, ApiError> {
    let room = repo::find(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Room not found".into()))?;

    let photo_urls = photos::presign_all(&state, &room.photos).await?;
    Ok(Json(RoomDetails {
        id: room.id,
        name: room.name,
        room_type: room.room_type,
        capacity: room.capacity,
        price_per_night: room.price_per_night,
        size_sqm: room.size_sqm,
        amenities: room.amenities,
        photo_urls,
        occupied: room.occupied,
        average_rating: room.average_rating,
        created_at: room.created_at,
    }))
}

#[instrument(skip(state, admin, payload))]
pub async fn create_room(
    State(state): State<AppState>,
    admin: AdminSession,
    Json(payload): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<CreatedRoomResponse>), ApiError> {
    validate_room_fields(&payload.name, payload.capacity, payload.price_per_night)?;

    let room = repo::create(&state.db, &payload).await?;
    info!(room_id = %room.id, admin = %admin.email, "room created");
    Ok((
        StatusCode::CREATED,
        Json(CreatedRoomResponse { room_id: room.id }),
    ))
}

#[instrument(skip(state, admin, payload))]
pub async fn update_room(
    State(state): State<AppState>,
    admin: AdminSession,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRoomRequest>,
) -> Result<Json<Room>, ApiError> {
    if let Some(name) = &payload.name {
        if name.trim().is_empty() {
            return Err(ApiError::Validation("Room name cannot be empty".into()));
        }
    }
    if let Some(capacity) = payload.capacity {
        if capacity < 1 {
            return Err(ApiError::Validation("Capacity must be at least 1".into()));
        }
    }
    if let Some(price) = payload.price_per_night {
        if !price.is_finite() || price <= 0.0 {
            return Err(ApiError::Validation("Price must be a positive number".into()));
        }
    }

    let room = repo::update(&state.db, id, &payload)
        .await?
        .ok_or_else(|| ApiError::NotFound("Room not found".into()))?;
    info!(room_id = %room.id, admin = %admin.email, "room updated");
    Ok(Json(room))
}

#[instrument(skip(state, admin))]
pub async fn delete_room(
    State(state): State<AppState>,
    admin: AdminSession,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let photos = repo::delete(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Room not found".into()))?;

    // The record is gone; photo cleanup is best-effort and orphans are
    // tolerated (logged with keys, not rolled back).
    let failures = photos::delete_photos_best_effort(state.storage.as_ref(), &photos).await;
    if failures > 0 {
        warn!(room_id = %id, failures, "room deleted with orphaned photos left in storage");
    }
    info!(room_id = %id, admin = %admin.email, "room deleted");
    Ok(Json(serde_json::json!({ "message": "Room deleted" })))
}

#[instrument(skip(state, admin, mp))]
pub async fn upload_photos(
    State(state): State<AppState>,
    admin: AdminSession,
    Path(id): Path<Uuid>,
    mut mp: Multipart,
) -> Result<Json<UploadedPhotosResponse>, ApiError> {
    if repo::find(&state.db, id).await?.is_none() {
        return Err(ApiError::NotFound("Room not found".into()));
    }

    let mut files: Vec<UploadItem> = Vec::new();
    while let Ok(Some(field)) = mp.next_field().await {
        let name = field.name().map(|s| s.to_string());
        if name.as_deref() == Some("photos") || name.as_deref() == Some("photos[]") {
            let content_type = field
                .content_type()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "application/octet-stream".into());
            let data = field
                .bytes()
                .await
                .map_err(|_| ApiError::Validation("unreadable multipart field".into()))?;
            files.push(UploadItem {
                body: data,
                content_type,
            });
        }
    }
    if files.is_empty() {
        return Err(ApiError::Validation("photos[] is required".into()));
    }

    let photo_keys = photos::upload_room_photos(&state, id, files).await?;
    info!(room_id = %id, admin = %admin.email, count = photo_keys.len(), "room photos uploaded");
    Ok(Json(UploadedPhotosResponse {
        room_id: id,
        photo_keys,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_field_validation() {
        assert!(validate_room_fields("Sea View", 2, 120.0).is_ok());
        assert!(validate_room_fields("", 2, 120.0).is_err());
        assert!(validate_room_fields("Sea View", 0, 120.0).is_err());
        assert!(validate_room_fields("Sea View", 2, 0.0).is_err());
        assert!(validate_room_fields("Sea View", 2, f64::NAN).is_err());
    }
}
