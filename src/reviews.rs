//! Post-delivery reviews.
//!
//! A review is tied to exactly one delivered order and is immutable once
//! written. The owning restaurant's rating is recomputed as the mean over
//! all of its reviews on every insert, a full aggregate rather than an
//! incremental update.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Deserialize;

use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    models::{Order, OrderStatus, Review},
    state::AppState,
};

const MAX_COMMENT_CHARS: usize = 500;

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub order_id: i64,
    pub rating: i64,
    pub comment: Option<String>,
}

impl ReviewRequest {
    fn validate(&self) -> AppResult<()> {
        if self.order_id < 1 {
            return Err(AppError::Validation("order_id must be positive".into()));
        }
        if !(1..=5).contains(&self.rating) {
            return Err(AppError::Validation("rating must be between 1 and 5".into()));
        }
        if let Some(comment) = &self.comment {
            if comment.chars().count() > MAX_COMMENT_CHARS {
                return Err(AppError::Validation(
                    "comment must be at most 500 characters".into(),
                ));
            }
        }
        Ok(())
    }
}

pub async fn review_handler(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(payload): Json<ReviewRequest>,
) -> AppResult<(StatusCode, Json<Review>)> {
    payload.validate()?;

    let mut tx = state.pool.begin().await?;

    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE order_id = ?")
        .bind(payload.order_id)
        .fetch_optional(&mut *tx)
        .await?
        .filter(|o| o.user_id == auth.user_id)
        .ok_or_else(|| AppError::NotFound("Order not found".into()))?;

    if order.order_status != OrderStatus::Delivered {
        return Err(AppError::InvalidState(
            "You can review only after delivery".into(),
        ));
    }

    let existing: Option<i64> = sqlx::query_scalar("SELECT review_id FROM reviews WHERE order_id = ?")
        .bind(order.order_id)
        .fetch_optional(&mut *tx)
        .await?;
    if existing.is_some() {
        return Err(AppError::Conflict("Order already reviewed".into()));
    }

    let result = sqlx::query(
        "INSERT INTO reviews (order_id, user_id, restaurant_id, rating, comment, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(order.order_id)
    .bind(order.user_id)
    .bind(order.restaurant_id)
    .bind(payload.rating)
    .bind(&payload.comment)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;
    let review_id = result.last_insert_rowid();

    // Full-scan mean over the restaurant's reviews, including the new one.
    let average: Option<f64> =
        sqlx::query_scalar("SELECT AVG(rating) FROM reviews WHERE restaurant_id = ?")
            .bind(order.restaurant_id)
            .fetch_one(&mut *tx)
            .await?;
    sqlx::query("UPDATE restaurants SET rating = ? WHERE restaurant_id = ?")
        .bind(average.unwrap_or(0.0))
        .bind(order.restaurant_id)
        .execute(&mut *tx)
        .await?;

    let review = sqlx::query_as::<_, Review>("SELECT * FROM reviews WHERE review_id = ?")
        .bind(review_id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(review)))
}
