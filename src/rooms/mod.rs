use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

mod dto;
pub mod handlers;
pub mod photos;
pub mod repo;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/rooms", get(handlers::list_rooms).post(handlers::create_room))
        .route(
            "/rooms/:id",
            get(handlers::get_room)
                .put(handlers::update_room)
                .delete(handlers::delete_room),
        )
        .route("/rooms/:id/photos", post(handlers::upload_photos))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // 20MB
}
