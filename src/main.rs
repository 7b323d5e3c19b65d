#[tokio::main]
async fn main() -> std::io::Result<()> {
    court_booking::run().await
}
