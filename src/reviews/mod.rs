use crate::state::AppState;
use axum::{routing::get, Router};

pub mod handlers;
pub mod repo;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/rooms/:id/reviews",
        get(handlers::list_reviews).post(handlers::create_review),
    )
}
