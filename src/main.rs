//! Order Stream server - Binary Entry Point

use order_stream::{server, ServerConfig, ServerError};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("order_stream=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ServerConfig::from_env()?;
    info!(
        version = order_stream::VERSION,
        bind = %config.bind_addr,
        ws_path = %config.ws_path,
        "starting"
    );

    server::run(config).await
}
