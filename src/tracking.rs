//! # Tracking Simulator
//!
//! Synthetic driver position and ETA, with no real location feed behind it.
//!
//! Per order the simulator keeps `(lat, lng, step)` in a process-local map,
//! lazily created on first poll from a fixed seed position. Every poll
//! advances the position along a fixed heading and decrements the ETA down
//! to a floor. Nothing is persisted; a restart forgets all positions.
//!
//! Concurrent polls for the same order are serialized through the map's
//! per-entry guard, so step counts are never lost and each poller observes
//! a strictly larger step than the previous one.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    models::{Delivery, DeliveryStatus, Driver, Order, OrderStatus},
    state::AppState,
};

const SEED_LAT: f64 = 33.5138;
const SEED_LNG: f64 = 36.2765;
const LAT_PER_POLL: f64 = 0.0006;
const LNG_PER_POLL: f64 = 0.0004;
const ETA_START_MINUTES: i64 = 35;
const ETA_FLOOR_MINUTES: i64 = 2;

#[derive(Debug, Clone, Copy)]
pub struct TrackPoint {
    pub lat: f64,
    pub lng: f64,
    pub step: u32,
}

#[derive(Default)]
pub struct Tracker {
    states: DashMap<i64, TrackPoint>,
}

impl Tracker {
    /// Advances the synthetic position for one order and returns the new
    /// point. Holding the entry guard across the read-modify-write makes
    /// the increment atomic per order id.
    pub fn advance(&self, order_id: i64) -> TrackPoint {
        let mut entry = self.states.entry(order_id).or_insert(TrackPoint {
            lat: SEED_LAT,
            lng: SEED_LNG,
            step: 0,
        });

        entry.step += 1;
        entry.lat += LAT_PER_POLL;
        entry.lng += LNG_PER_POLL;

        *entry
    }

    pub fn eta_minutes(step: u32) -> i64 {
        (ETA_START_MINUTES - 2 * step as i64).max(ETA_FLOOR_MINUTES)
    }
}

#[derive(Debug, Serialize)]
pub struct DriverInfo {
    pub driver_id: i64,
    pub name: String,
    pub phone: String,
    pub vehicle_type: String,
}

#[derive(Debug, Serialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Serialize)]
pub struct TrackingResponse {
    pub order_id: i64,
    pub order_status: OrderStatus,
    pub delivery_status: DeliveryStatus,
    pub driver: DriverInfo,
    pub driver_location: Coordinates,
    pub eta_minutes: i64,
    pub estimated_time: DateTime<Utc>,
}

pub async fn tracking_handler(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(order_id): Path<i64>,
) -> AppResult<Json<TrackingResponse>> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE order_id = ?")
        .bind(order_id)
        .fetch_optional(&state.pool)
        .await?
        .filter(|o| o.user_id == auth.user_id)
        .ok_or_else(|| AppError::NotFound("Order not found".into()))?;

    let delivery = sqlx::query_as::<_, Delivery>("SELECT * FROM deliveries WHERE order_id = ?")
        .bind(order_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Delivery not found".into()))?;

    let driver = sqlx::query_as::<_, Driver>("SELECT * FROM drivers WHERE driver_id = ?")
        .bind(delivery.driver_id)
        .fetch_one(&state.pool)
        .await?;

    let point = state.tracker.advance(order_id);

    Ok(Json(TrackingResponse {
        order_id: order.order_id,
        order_status: order.order_status,
        delivery_status: delivery.delivery_status,
        driver: DriverInfo {
            driver_id: driver.driver_id,
            name: driver.name,
            phone: driver.phone,
            vehicle_type: driver.vehicle_type,
        },
        driver_location: Coordinates {
            lat: point.lat,
            lng: point.lng,
        },
        eta_minutes: Tracker::eta_minutes(point.step),
        estimated_time: delivery.estimated_time,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eta_follows_poll_schedule() {
        assert_eq!(Tracker::eta_minutes(1), 33);
        assert_eq!(Tracker::eta_minutes(5), 25);
        assert_eq!(Tracker::eta_minutes(16), 3);
        // Floor holds once the schedule is exhausted.
        assert_eq!(Tracker::eta_minutes(17), 2);
        assert_eq!(Tracker::eta_minutes(20), 2);
        assert_eq!(Tracker::eta_minutes(30), 2);
    }

    #[test]
    fn polls_advance_from_seed_position() {
        let tracker = Tracker::default();

        let first = tracker.advance(7);
        assert_eq!(first.step, 1);
        assert!((first.lat - (SEED_LAT + LAT_PER_POLL)).abs() < 1e-9);
        assert!((first.lng - (SEED_LNG + LNG_PER_POLL)).abs() < 1e-9);

        let second = tracker.advance(7);
        assert_eq!(second.step, 2);
        assert!(second.lat > first.lat);
        assert!(second.lng > first.lng);

        // Orders track independently.
        let other = tracker.advance(8);
        assert_eq!(other.step, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_polls_never_lose_steps() {
        let tracker = Arc::new(Tracker::default());

        let mut handles = Vec::new();
        for _ in 0..32 {
            let tracker = tracker.clone();
            handles.push(tokio::spawn(async move { tracker.advance(1).step }));
        }

        let mut steps = Vec::new();
        for handle in handles {
            steps.push(handle.await.unwrap());
        }
        steps.sort_unstable();

        let expected: Vec<u32> = (1..=32).collect();
        assert_eq!(steps, expected);
    }
}
