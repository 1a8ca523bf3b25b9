use clap::Parser;
use prompt_relay::{logging, start_proxy_server, ServerArgs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    dotenv::dotenv().ok();

    let args = ServerArgs::parse();
    logging::configure_logging()?;

    tracing::info!("Starting prompt relay");
    tracing::info!("  Model: {}", args.model);
    tracing::info!("  Upstream: {}", args.upstream_url);
    tracing::info!("  Listening on: {}", args.bind_addr());

    start_proxy_server(args).await
}
