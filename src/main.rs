#[tokio::main]
async fn main() {
    food_delivery::start_server().await;
}
