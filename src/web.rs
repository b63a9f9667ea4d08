#![cfg(not(tarpaulin_include))]

use project_monitor::app;

/// Main entry point for the dashboard backend
///
/// Starts the HTTP API that serves the canonical project registry and
/// the remote client-storage namespace. The listening port comes from
/// the `PORT` environment variable, defaulting to 3000.
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Success or error object
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(3000);

    app::run(port).await
}
