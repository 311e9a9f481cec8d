//! # SQLite
//!
//! Single-file (or in-memory) relational store behind a `sqlx` pool.
//!
//! The schema is embedded and applied on startup, so a fresh database is
//! usable without any external migration tooling. Every multi-write
//! operation in the app runs inside a transaction; SQLite serializes
//! writers, which is plenty at this scale.
//!
//! An in-memory URL gets a single-connection pool: each SQLite `:memory:`
//! connection is its own database, so pooling more than one would hand
//! requests empty schemas.

use std::str::FromStr;

use chrono::Utc;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use tracing::info;

use crate::error::{AppError, AppResult};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    user_id       INTEGER PRIMARY KEY AUTOINCREMENT,
    name          TEXT NOT NULL,
    email         TEXT NOT NULL UNIQUE,
    phone         TEXT,
    password_hash TEXT NOT NULL,
    address       TEXT,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS restaurants (
    restaurant_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name          TEXT NOT NULL,
    address       TEXT NOT NULL,
    phone         TEXT NOT NULL,
    rating        REAL NOT NULL DEFAULT 0,
    cuisine_type  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS menus (
    menu_id             INTEGER PRIMARY KEY AUTOINCREMENT,
    restaurant_id       INTEGER NOT NULL REFERENCES restaurants(restaurant_id),
    item_name           TEXT NOT NULL,
    description         TEXT NOT NULL,
    price               REAL NOT NULL,
    image_url           TEXT NOT NULL,
    availability_status TEXT NOT NULL DEFAULT 'available'
);

CREATE TABLE IF NOT EXISTS drivers (
    driver_id           INTEGER PRIMARY KEY AUTOINCREMENT,
    name                TEXT NOT NULL,
    phone               TEXT NOT NULL,
    vehicle_type        TEXT NOT NULL,
    availability_status TEXT NOT NULL DEFAULT 'available'
);

CREATE TABLE IF NOT EXISTS orders (
    order_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id       INTEGER NOT NULL REFERENCES users(user_id),
    restaurant_id INTEGER NOT NULL REFERENCES restaurants(restaurant_id),
    order_status  TEXT NOT NULL,
    total_amount  REAL NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS order_items (
    order_item_id INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id      INTEGER NOT NULL REFERENCES orders(order_id),
    menu_id       INTEGER NOT NULL REFERENCES menus(menu_id),
    quantity      INTEGER NOT NULL,
    price         REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS payments (
    payment_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id       INTEGER NOT NULL REFERENCES orders(order_id),
    payment_method TEXT NOT NULL,
    payment_status TEXT NOT NULL,
    transaction_id TEXT,
    amount         REAL NOT NULL,
    paid_at        TEXT
);

CREATE TABLE IF NOT EXISTS deliveries (
    delivery_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id        INTEGER NOT NULL UNIQUE REFERENCES orders(order_id),
    driver_id       INTEGER NOT NULL REFERENCES drivers(driver_id),
    delivery_status TEXT NOT NULL,
    estimated_time  TEXT NOT NULL,
    actual_time     TEXT
);

CREATE TABLE IF NOT EXISTS reviews (
    review_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id      INTEGER NOT NULL UNIQUE REFERENCES orders(order_id),
    user_id       INTEGER NOT NULL REFERENCES users(user_id),
    restaurant_id INTEGER NOT NULL REFERENCES restaurants(restaurant_id),
    rating        INTEGER NOT NULL,
    comment       TEXT,
    created_at    TEXT NOT NULL
);
"#;

pub async fn init_pool(database_url: &str) -> SqlitePool {
    let options = SqliteConnectOptions::from_str(database_url)
        .expect("Invalid DATABASE_URL")
        .create_if_missing(true)
        .foreign_keys(true);

    let in_memory = database_url.contains(":memory:");
    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(5)
    };

    let pool = pool_options
        .connect_with(options)
        .await
        .expect("Failed to open database");

    sqlx::raw_sql(SCHEMA)
        .execute(&pool)
        .await
        .expect("Failed to apply schema");

    pool
}

/// Loads the demo catalog (restaurants, menus, drivers and a demo user)
/// when the database is empty, so a fresh instance is browsable right away.
pub async fn seed_demo(pool: &SqlitePool) -> AppResult<()> {
    let restaurant_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM restaurants")
        .fetch_one(pool)
        .await?;
    if restaurant_count > 0 {
        return Ok(());
    }

    info!("Empty catalog, seeding demo data");

    let password_hash =
        bcrypt::hash("password123", 10).map_err(|e| AppError::Internal(e.to_string()))?;
    sqlx::query(
        "INSERT INTO users (name, email, phone, password_hash, address, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind("Demo User")
    .bind("demo@svu.com")
    .bind("+963999000111")
    .bind(&password_hash)
    .bind("Damascus, Syria")
    .bind(Utc::now())
    .execute(pool)
    .await?;

    let restaurants = [
        ("Damascus Bites", "Al Hamra Street, Damascus", "+96311222333", 4.6, "Syrian"),
        ("Pizza Corner", "Mezzeh Highway, Damascus", "+96311444555", 4.3, "Italian"),
        ("Healthy Bowl", "Abu Rummaneh, Damascus", "+96311666777", 4.1, "Healthy"),
    ];
    for (name, address, phone, rating, cuisine) in restaurants {
        sqlx::query(
            "INSERT INTO restaurants (name, address, phone, rating, cuisine_type)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(name)
        .bind(address)
        .bind(phone)
        .bind(rating)
        .bind(cuisine)
        .execute(pool)
        .await?;
    }

    let menus = [
        (1_i64, "Shawarma Wrap", "Chicken shawarma with garlic sauce and pickles.", 4.50),
        (1, "Falafel Plate", "Crispy falafel with hummus and salad.", 3.75),
        (2, "Margherita Pizza", "Classic pizza with tomato, mozzarella, basil.", 7.90),
        (2, "Pepperoni Pizza", "Pepperoni, cheese, tomato sauce.", 8.90),
        (3, "Chicken Caesar Bowl", "Grilled chicken, romaine, parmesan, light dressing.", 6.20),
    ];
    for (restaurant_id, item_name, description, price) in menus {
        sqlx::query(
            "INSERT INTO menus (restaurant_id, item_name, description, price, image_url, availability_status)
             VALUES (?, ?, ?, ?, ?, 'available')",
        )
        .bind(restaurant_id)
        .bind(item_name)
        .bind(description)
        .bind(price)
        .bind("https://images.unsplash.com/placeholder")
        .execute(pool)
        .await?;
    }

    let drivers = [
        ("Ahmad", "+963933111222", "Motorbike"),
        ("Lina", "+963944333444", "Car"),
    ];
    for (name, phone, vehicle_type) in drivers {
        sqlx::query(
            "INSERT INTO drivers (name, phone, vehicle_type, availability_status)
             VALUES (?, ?, ?, 'available')",
        )
        .bind(name)
        .bind(phone)
        .bind(vehicle_type)
        .execute(pool)
        .await?;
    }

    Ok(())
}
