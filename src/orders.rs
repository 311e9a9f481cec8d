//! # Order Lifecycle
//!
//! Order placement and the pending → confirmed → delivered progression,
//! together with the payment and delivery sub-records each order owns.
//!
//! Placement snapshots menu prices into the order items, claims the
//! lowest-id available driver, and writes order + items + payment +
//! delivery as one transaction; either everything lands or nothing does.
//! Delivery completion is the mirror image and releases the driver inside
//! the same transaction, so a crash can never strand a driver unavailable
//! with no order to show for it.
//!
//! Transitions are one-directional. There is no cancellation, refund or
//! driver-reassignment path; a delivery that is never marked delivered
//! keeps its driver unavailable indefinitely (see DESIGN.md).

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::info;

use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    models::{
        Delivery, Driver, Menu, Order, OrderItem, Payment, PaymentMethod, Restaurant,
    },
    state::AppState,
};

const MAX_QUANTITY_PER_LINE: i64 = 50;
const DELIVERY_ESTIMATE_MINUTES: i64 = 35;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Deserialize)]
pub struct OrderLineRequest {
    pub menu_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    pub restaurant_id: i64,
    pub items: Vec<OrderLineRequest>,
    pub payment_method: String,
    pub address: String,
}

impl PlaceOrderRequest {
    fn validate(&self) -> AppResult<PaymentMethod> {
        if self.restaurant_id < 1 {
            return Err(AppError::Validation("restaurant_id must be positive".into()));
        }
        if self.items.is_empty() {
            return Err(AppError::Validation("items must not be empty".into()));
        }
        for line in &self.items {
            if line.menu_id < 1 {
                return Err(AppError::Validation("menu_id must be positive".into()));
            }
            if !(1..=MAX_QUANTITY_PER_LINE).contains(&line.quantity) {
                return Err(AppError::Validation(
                    "quantity must be between 1 and 50".into(),
                ));
            }
        }
        if self.address.len() < 5 {
            return Err(AppError::Validation(
                "address must be at least 5 characters".into(),
            ));
        }
        PaymentMethod::parse(&self.payment_method).ok_or_else(|| {
            AppError::Validation("payment_method must be one of card, PayPal, cash".into())
        })
    }
}

#[derive(Debug, Serialize)]
pub struct OrderItemDetails {
    #[serde(flatten)]
    pub item: OrderItem,
    pub menu: Menu,
}

#[derive(Debug, Serialize)]
pub struct DeliveryDetails {
    #[serde(flatten)]
    pub delivery: Delivery,
    pub driver: Driver,
}

/// The full order graph returned by order endpoints.
#[derive(Debug, Serialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItemDetails>,
    pub payment: Option<Payment>,
    pub delivery: Option<DeliveryDetails>,
    pub restaurant: Restaurant,
}

/// Loads the order graph, masking foreign orders as missing: a caller can
/// not distinguish an order they do not own from one that does not exist.
pub async fn load_order_details(
    pool: &SqlitePool,
    order_id: i64,
    user_id: i64,
) -> AppResult<OrderDetails> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE order_id = ?")
        .bind(order_id)
        .fetch_optional(pool)
        .await?
        .filter(|o| o.user_id == user_id)
        .ok_or_else(|| AppError::NotFound("Order not found".into()))?;

    let items = sqlx::query_as::<_, OrderItem>(
        "SELECT * FROM order_items WHERE order_id = ? ORDER BY order_item_id",
    )
    .bind(order_id)
    .fetch_all(pool)
    .await?;

    let mut detailed_items = Vec::with_capacity(items.len());
    for item in items {
        let menu = sqlx::query_as::<_, Menu>("SELECT * FROM menus WHERE menu_id = ?")
            .bind(item.menu_id)
            .fetch_one(pool)
            .await?;
        detailed_items.push(OrderItemDetails { item, menu });
    }

    let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE order_id = ?")
        .bind(order_id)
        .fetch_optional(pool)
        .await?;

    let delivery = sqlx::query_as::<_, Delivery>("SELECT * FROM deliveries WHERE order_id = ?")
        .bind(order_id)
        .fetch_optional(pool)
        .await?;
    let delivery = match delivery {
        Some(delivery) => {
            let driver = sqlx::query_as::<_, Driver>("SELECT * FROM drivers WHERE driver_id = ?")
                .bind(delivery.driver_id)
                .fetch_one(pool)
                .await?;
            Some(DeliveryDetails { delivery, driver })
        }
        None => None,
    };

    let restaurant =
        sqlx::query_as::<_, Restaurant>("SELECT * FROM restaurants WHERE restaurant_id = ?")
            .bind(order.restaurant_id)
            .fetch_one(pool)
            .await?;

    Ok(OrderDetails {
        order,
        items: detailed_items,
        payment,
        delivery,
        restaurant,
    })
}

pub async fn place_order_handler(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(payload): Json<PlaceOrderRequest>,
) -> AppResult<(StatusCode, Json<OrderDetails>)> {
    let payment_method = payload.validate()?;

    let mut tx = state.pool.begin().await?;

    let restaurant =
        sqlx::query_as::<_, Restaurant>("SELECT * FROM restaurants WHERE restaurant_id = ?")
            .bind(payload.restaurant_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Restaurant not found".into()))?;

    // Last order wins: the delivery address overwrites the user's stored one.
    sqlx::query("UPDATE users SET address = ? WHERE user_id = ?")
        .bind(&payload.address)
        .bind(auth.user_id)
        .execute(&mut *tx)
        .await?;

    let menu_ids: Vec<i64> = payload.items.iter().map(|line| line.menu_id).collect();
    let mut query: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT * FROM menus WHERE restaurant_id = ");
    query.push_bind(payload.restaurant_id);
    query.push(" AND menu_id IN (");
    let mut separated = query.separated(", ");
    for menu_id in &menu_ids {
        separated.push_bind(*menu_id);
    }
    query.push(")");
    let menus: Vec<Menu> = query.build_query_as().fetch_all(&mut *tx).await?;

    if menus.len() != menu_ids.len() {
        return Err(AppError::Validation(
            "One or more menu items not found for this restaurant".into(),
        ));
    }
    let menu_by_id: HashMap<i64, &Menu> = menus.iter().map(|m| (m.menu_id, m)).collect();

    let mut total = 0.0;
    let mut lines = Vec::with_capacity(payload.items.len());
    for line in &payload.items {
        let menu = menu_by_id[&line.menu_id];
        total += menu.price * line.quantity as f64;
        lines.push((menu.menu_id, line.quantity, menu.price));
    }
    let total = round2(total);

    // Claim and flip the lowest-id available driver in one statement, so a
    // concurrent placement can never grab the same driver.
    let driver_id: Option<i64> = sqlx::query_scalar(
        "UPDATE drivers SET availability_status = 'unavailable'
         WHERE driver_id = (
             SELECT driver_id FROM drivers
             WHERE availability_status = 'available'
             ORDER BY driver_id
             LIMIT 1
         )
         RETURNING driver_id",
    )
    .fetch_optional(&mut *tx)
    .await?;
    let driver_id = driver_id.ok_or_else(|| {
        AppError::ServiceUnavailable("No drivers available right now".into())
    })?;

    let now = Utc::now();
    let result = sqlx::query(
        "INSERT INTO orders (user_id, restaurant_id, order_status, total_amount, created_at)
         VALUES (?, ?, 'pending', ?, ?)",
    )
    .bind(auth.user_id)
    .bind(restaurant.restaurant_id)
    .bind(total)
    .bind(now)
    .execute(&mut *tx)
    .await?;
    let order_id = result.last_insert_rowid();

    for (menu_id, quantity, price) in lines {
        sqlx::query(
            "INSERT INTO order_items (order_id, menu_id, quantity, price) VALUES (?, ?, ?, ?)",
        )
        .bind(order_id)
        .bind(menu_id)
        .bind(quantity)
        .bind(price)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query(
        "INSERT INTO payments (order_id, payment_method, payment_status, transaction_id, amount, paid_at)
         VALUES (?, ?, 'pending', NULL, ?, NULL)",
    )
    .bind(order_id)
    .bind(payment_method)
    .bind(total)
    .execute(&mut *tx)
    .await?;

    let estimated_time = now + Duration::minutes(DELIVERY_ESTIMATE_MINUTES);
    sqlx::query(
        "INSERT INTO deliveries (order_id, driver_id, delivery_status, estimated_time, actual_time)
         VALUES (?, ?, 'assigned', ?, NULL)",
    )
    .bind(order_id)
    .bind(driver_id)
    .bind(estimated_time)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!("Order {order_id} placed by user {} with driver {driver_id}", auth.user_id);

    let details = load_order_details(&state.pool, order_id, auth.user_id).await?;
    Ok((StatusCode::CREATED, Json(details)))
}

pub async fn get_order_handler(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(order_id): Path<i64>,
) -> AppResult<Json<OrderDetails>> {
    let details = load_order_details(&state.pool, order_id, auth.user_id).await?;
    Ok(Json(details))
}

pub async fn pay_handler(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(order_id): Path<i64>,
) -> AppResult<Json<OrderDetails>> {
    let mut tx = state.pool.begin().await?;

    sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE order_id = ?")
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        .filter(|o| o.user_id == auth.user_id)
        .ok_or_else(|| AppError::NotFound("Order not found".into()))?;

    // Only a pending payment takes the transition; a second call finds
    // nothing to update and the stamped transaction id stays as it was.
    let transaction_id = format!("TX-{}", Utc::now().timestamp_millis());
    sqlx::query(
        "UPDATE payments
         SET payment_status = 'paid', transaction_id = ?, paid_at = ?
         WHERE order_id = ? AND payment_status = 'pending'",
    )
    .bind(&transaction_id)
    .bind(Utc::now())
    .bind(order_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE orders SET order_status = 'confirmed' WHERE order_id = ? AND order_status = 'pending'")
        .bind(order_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    let details = load_order_details(&state.pool, order_id, auth.user_id).await?;
    Ok(Json(details))
}

#[derive(Debug, Serialize)]
pub struct MarkDeliveredResponse {
    pub order: Order,
    pub delivery: Delivery,
}

pub async fn mark_delivered_handler(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(order_id): Path<i64>,
) -> AppResult<Json<MarkDeliveredResponse>> {
    let mut tx = state.pool.begin().await?;

    sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE order_id = ?")
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        .filter(|o| o.user_id == auth.user_id)
        .ok_or_else(|| AppError::NotFound("Order not found".into()))?;

    let delivery = sqlx::query_as::<_, Delivery>("SELECT * FROM deliveries WHERE order_id = ?")
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Delivery not found".into()))?;

    // Only an assigned delivery takes the transition. Repeating the call
    // must not release a driver that may since be out on another order.
    let updated = sqlx::query(
        "UPDATE deliveries
         SET delivery_status = 'delivered', actual_time = ?
         WHERE order_id = ? AND delivery_status = 'assigned'",
    )
    .bind(Utc::now())
    .bind(order_id)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() > 0 {
        sqlx::query("UPDATE orders SET order_status = 'delivered' WHERE order_id = ?")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;

        // Completing the delivery frees the driver in the same transaction.
        sqlx::query("UPDATE drivers SET availability_status = 'available' WHERE driver_id = ?")
            .bind(delivery.driver_id)
            .execute(&mut *tx)
            .await?;
    }

    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE order_id = ?")
        .bind(order_id)
        .fetch_one(&mut *tx)
        .await?;
    let delivery = sqlx::query_as::<_, Delivery>("SELECT * FROM deliveries WHERE order_id = ?")
        .bind(order_id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    if updated.rows_affected() > 0 {
        info!("Order {order_id} delivered, driver {} released", delivery.driver_id);
    }

    Ok(Json(MarkDeliveredResponse { order, delivery }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_round_to_cents() {
        assert_eq!(round2(4.50 * 2.0), 9.0);
        assert_eq!(round2(3.333 * 3.0), 10.0);
        assert_eq!(round2(0.1 + 0.2), 0.3);
    }

    #[test]
    fn quantity_bounds_are_enforced() {
        let request = PlaceOrderRequest {
            restaurant_id: 1,
            items: vec![OrderLineRequest {
                menu_id: 1,
                quantity: 51,
            }],
            payment_method: "card".into(),
            address: "Main St 5".into(),
        };
        assert!(request.validate().is_err());

        let request = PlaceOrderRequest {
            restaurant_id: 1,
            items: vec![],
            payment_method: "card".into(),
            address: "Main St 5".into(),
        };
        assert!(request.validate().is_err());

        let request = PlaceOrderRequest {
            restaurant_id: 1,
            items: vec![OrderLineRequest {
                menu_id: 1,
                quantity: 2,
            }],
            payment_method: "bitcoin".into(),
            address: "Main St 5".into(),
        };
        assert!(request.validate().is_err());
    }
}
