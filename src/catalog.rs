use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    error::AppResult,
    models::{Menu, Restaurant},
    state::AppState,
};

pub async fn restaurants_handler(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<Vec<Restaurant>>> {
    let restaurants =
        sqlx::query_as::<_, Restaurant>("SELECT * FROM restaurants ORDER BY rating DESC")
            .fetch_all(&state.pool)
            .await?;

    Ok(Json(restaurants))
}

pub async fn menus_handler(
    State(state): State<Arc<AppState>>,
    Path(restaurant_id): Path<i64>,
) -> AppResult<Json<Vec<Menu>>> {
    let menus = sqlx::query_as::<_, Menu>(
        "SELECT * FROM menus WHERE restaurant_id = ? ORDER BY item_name ASC",
    )
    .bind(restaurant_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(menus))
}
