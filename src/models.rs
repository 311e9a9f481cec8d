use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Delivered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Assigned,
    Delivered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    #[sqlx(rename = "PayPal")]
    #[serde(rename = "PayPal")]
    PayPal,
    Cash,
}

impl PaymentMethod {
    /// Parses the wire spelling; `PayPal` keeps its mixed case.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "card" => Some(Self::Card),
            "PayPal" => Some(Self::PayPal),
            "cash" => Some(Self::Cash),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DriverAvailability {
    Available,
    Unavailable,
}

/// Full user row. Never serialized to clients, see [`UserPublic`].
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub password_hash: String,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The user fields safe to return from the API.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserPublic {
    pub user_id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Restaurant {
    pub restaurant_id: i64,
    pub name: String,
    pub address: String,
    pub phone: String,
    pub rating: f64,
    pub cuisine_type: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Menu {
    pub menu_id: i64,
    pub restaurant_id: i64,
    pub item_name: String,
    pub description: String,
    pub price: f64,
    pub image_url: String,
    pub availability_status: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Driver {
    pub driver_id: i64,
    pub name: String,
    pub phone: String,
    pub vehicle_type: String,
    pub availability_status: DriverAvailability,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Order {
    pub order_id: i64,
    pub user_id: i64,
    pub restaurant_id: i64,
    pub order_status: OrderStatus,
    pub total_amount: f64,
    pub created_at: DateTime<Utc>,
}

/// Unit price is snapshotted at order time; menu price changes never
/// reach back into existing rows.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OrderItem {
    pub order_item_id: i64,
    pub order_id: i64,
    pub menu_id: i64,
    pub quantity: i64,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Payment {
    pub payment_id: i64,
    pub order_id: i64,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub amount: f64,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Delivery {
    pub delivery_id: i64,
    pub order_id: i64,
    pub driver_id: i64,
    pub delivery_status: DeliveryStatus,
    pub estimated_time: DateTime<Utc>,
    pub actual_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Review {
    pub review_id: i64,
    pub order_id: i64,
    pub user_id: i64,
    pub restaurant_id: i64,
    pub rating: i64,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}
