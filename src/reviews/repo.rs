use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;

/// One review per (user, room) pair; the room's average rating is derived
/// from all of its reviews.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Review {
    pub id: Uuid,
    pub user_email: String,
    pub room_id: Uuid,
    pub rating: i32,
    pub comment: String,
    pub created_at: OffsetDateTime,
}

/// A second review from the same user for the same room is rejected as
/// caller error, not replaced or averaged in twice.
pub fn ensure_first_review(existing: Option<Uuid>) -> Result<(), ApiError> {
    match existing {
        Some(_) => Err(ApiError::Validation(
            "You have already reviewed this room".into(),
        )),
        None => Ok(()),
    }
}

/// Derived aggregate; `None` when a room has no reviews yet.
pub fn average_rating(ratings: &[i32]) -> Option<f64> {
    if ratings.is_empty() {
        return None;
    }
    Some(ratings.iter().map(|r| *r as f64).sum::<f64>() / ratings.len() as f64)
}

/// Insert a review and recompute the room's average in one transaction.
/// The duplicate check and the aggregate both observe the same snapshot,
/// and the unique index backs the check against races.
pub async fn create_review(
    db: &PgPool,
    user_email: &str,
    room_id: Uuid,
    rating: i32,
    comment: &str,
) -> Result<(Review, f64), ApiError> {
    let mut tx = db.begin().await?;

    // Lock the room row: concurrent reviews of the same room serialize their
    // aggregate recomputation.
    let room: Option<(Uuid,)> = sqlx::query_as(r#"SELECT id FROM rooms WHERE id = $1 FOR UPDATE"#)
        .bind(room_id)
        .fetch_optional(&mut *tx)
        .await?;
    if room.is_none() {
        return Err(ApiError::NotFound("Room not found".into()));
    }

    let existing: Option<(Uuid,)> = sqlx::query_as(
        r#"SELECT id FROM reviews WHERE user_email = $1 AND room_id = $2"#,
    )
    .bind(user_email)
    .bind(room_id)
    .fetch_optional(&mut *tx)
    .await?;
    ensure_first_review(existing.map(|(id,)| id))?;

    let review = sqlx::query_as::<_, Review>(
        r#"
        INSERT INTO reviews (id, user_email, room_id, rating, comment)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, user_email, room_id, rating, comment, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_email)
    .bind(room_id)
    .bind(rating)
    .bind(comment)
    .fetch_one(&mut *tx)
    .await?;

    let ratings: Vec<(i32,)> =
        sqlx::query_as(r#"SELECT rating FROM reviews WHERE room_id = $1"#)
            .bind(room_id)
            .fetch_all(&mut *tx)
            .await?;
    let ratings: Vec<i32> = ratings.into_iter().map(|(r,)| r).collect();
    let average = average_rating(&ratings).unwrap_or(rating as f64);

    sqlx::query(r#"UPDATE rooms SET average_rating = $2 WHERE id = $1"#)
        .bind(room_id)
        .bind(average)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    info!(room_id = %room_id, user_email, average, "review recorded");
    Ok((review, average))
}

pub async fn list_by_room(db: &PgPool, room_id: Uuid) -> Result<Vec<Review>, ApiError> {
    let reviews = sqlx::query_as::<_, Review>(
        r#"
        SELECT id, user_email, room_id, rating, comment, created_at
        FROM reviews
        WHERE room_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(room_id)
    .fetch_all(db)
    .await?;
    Ok(reviews)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_of_three_and_five_is_four() {
        assert_eq!(average_rating(&[3, 5]), Some(4.0));
    }

    #[test]
    fn average_of_no_reviews_is_none() {
        assert_eq!(average_rating(&[]), None);
    }

    #[test]
    fn average_keeps_fractions() {
        assert_eq!(average_rating(&[5, 4, 4]), Some(13.0 / 3.0));
    }

    #[test]
    fn first_review_passes() {
        assert!(ensure_first_review(None).is_ok());
    }

    #[test]
    fn second_review_from_same_user_is_rejected() {
        let err = ensure_first_review(Some(Uuid::new_v4())).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }
}
