use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

mod dto;
pub mod extractors;
pub mod handlers;
mod jwt;
pub mod password;
pub mod repo;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .route("/auth/admin/register", post(handlers::admin_register))
        .route("/auth/admin/login", post(handlers::admin_login))
        .route("/auth/logout", post(handlers::logout))
        .route("/me", get(handlers::get_me))
}
