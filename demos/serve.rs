use poct1_rs::{init_logger, serve, SyncConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();

    // Listen for meter connections with the default accept-all policy.
    serve(SyncConfig::default(), "0.0.0.0:5050").await?;

    Ok(())
}
