use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

mod dto;
pub mod handlers;
pub mod repo;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/bookings", post(handlers::create_booking).get(handlers::list_bookings))
        .route("/bookings/me", get(handlers::list_my_bookings))
        .route("/bookings/availability", get(handlers::check_availability))
        .route(
            "/bookings/:id",
            axum::routing::put(handlers::update_booking).delete(handlers::cancel_booking),
        )
}
