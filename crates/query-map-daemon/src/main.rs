use anyhow::Result;

use query_map_daemon::{server, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = telemetry::init("query-map-daemon")?;
    server::run().await
}
