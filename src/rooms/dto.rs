use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub name: String,
    pub room_type: String,
    pub capacity: i32,
    pub price_per_night: f64,
    pub size_sqm: Option<f64>,
    #[serde(default)]
    pub amenities: Vec<String>,
}

/// Partial room update; absent fields keep their current value.
#[derive(Debug, Deserialize)]
pub struct UpdateRoomRequest {
    pub name: Option<String>,
    pub room_type: Option<String>,
    pub capacity: Option<i32>,
    pub price_per_night: Option<f64>,
    pub size_sqm: Option<f64>,
    pub amenities: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct CreatedRoomResponse {
    pub room_id: Uuid,
}

/// Room detail view; photos are presigned download URLs, not raw keys.
#[derive(Debug, Serialize)]
pub struct RoomDetails {
    pub id: Uuid,
    pub name: String,
    pub room_type: String,
    pub capacity: i32,
    pub price_per_night: f64,
    pub size_sqm: Option<f64>,
    pub amenities: Vec<String>,
    pub photo_urls: Vec<String>,
    pub occupied: bool,
    pub average_rating: Option<f64>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct UploadedPhotosResponse {
    pub room_id: Uuid,
    pub photo_keys: Vec<String>,
}
