use anevia_server::api::server;
use anevia_server::config::{self, Config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cfg = Config::from_env();
    tracing::info!(
        version = config::APP_VERSION,
        addr = %cfg.bind_addr,
        "Starting {}",
        config::APP_NAME
    );

    if let Err(e) = server::run(cfg).await {
        tracing::error!(error = %e, "Server failed");
        std::process::exit(1);
    }
}
