use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use super::repo::{self, Review};
use crate::auth::extractors::AuthSession;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    pub rating: i32,
    pub comment: String,
}

#[derive(Debug, Serialize)]
pub struct CreatedReviewResponse {
    pub review_id: Uuid,
    pub average_rating: f64,
}

fn validate_review(rating: i32, comment: &str) -> Result<(), ApiError> {
    if !(1..=5).contains(&rating) {
        return Err(ApiError::Validation("Rating must be between 1 and 5".into()));
    }
    if comment.trim().is_empty() {
        return Err(ApiError::Validation("Comment is required".into()));
    }
    Ok(())
}

#[instrument(skip(state, session, payload))]
pub async fn create_review(
    State(state): State<AppState>,
    session: AuthSession,
    Path(room_id): Path<Uuid>,
    Json(payload): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<CreatedReviewResponse>), ApiError> {
    validate_review(payload.rating, &payload.comment)?;

    let (review, average) = repo::create_review(
        &state.db,
        &session.email,
        room_id,
        payload.rating,
        payload.comment.trim(),
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedReviewResponse {
            review_id: review.id,
            average_rating: average,
        }),
    ))
}

#[instrument(skip(state))]
pub async fn list_reviews(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
) -> Result<Json<Vec<Review>>, ApiError> {
    let reviews = repo::list_by_room(&state.db, room_id).await?;
    Ok(Json(reviews))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_bounds_are_enforced() {
        assert!(validate_review(1, "ok").is_ok());
        assert!(validate_review(5, "great").is_ok());
        assert!(validate_review(0, "bad").is_err());
        assert!(validate_review(6, "too good").is_err());
        assert!(validate_review(3, "   ").is_err());
    }
}
