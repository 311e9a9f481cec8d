use std::{sync::Arc, time::Duration};

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    response::Html,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    auth::{login_handler, register_handler},
    catalog::{menus_handler, restaurants_handler},
    orders::{get_order_handler, mark_delivered_handler, pay_handler, place_order_handler},
    reviews::review_handler,
    state::AppState,
    tracking::tracking_handler,
};

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route("/restaurants", get(restaurants_handler))
        .route("/restaurants/:id/menus", get(menus_handler))
        .route("/orders", post(place_order_handler))
        .route("/orders/:id", get(get_order_handler))
        .route("/orders/:id/pay", post(pay_handler))
        .route("/orders/:id/tracking", get(tracking_handler))
        .route("/orders/:id/mark-delivered", post(mark_delivered_handler))
        .route("/reviews", post(review_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn index_handler() -> Html<&'static str> {
    Html(
        r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <title>Food Delivery API</title>
  </head>
  <body>
    <h2>Food Delivery API</h2>
    <p>This is a REST API server. Try these endpoints:</p>
    <ul>
      <li><a href="/health">/health</a> (server status)</li>
      <li><a href="/restaurants">/restaurants</a> (seeded restaurants)</li>
      <li><code>POST /auth/login</code> (use JSON body)</li>
    </ul>
  </body>
</html>"#,
    )
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    ok: bool,
    service: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        service: "food-delivery-api",
    })
}
