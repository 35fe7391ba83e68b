#[tokio::main]
async fn main() {
    if let Err(e) = vitalia::run().await {
        eprintln!("vitalia: {e}");
        std::process::exit(1);
    }
}
