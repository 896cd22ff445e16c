use upcloud_provider::{init_logging, serve, UpCloudProvider};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting UpCloud provider");
    serve(UpCloudProvider::new(env!("CARGO_PKG_VERSION"))).await
}
