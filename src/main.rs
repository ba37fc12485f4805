use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tryon_proxy::config::Config;

#[derive(Debug, Parser)]
#[command(name = "tryon-proxy")]
#[command(about = "Virtual try-on proxy for Gemini and HuggingFace backends")]
struct CliArgs {
    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on; overrides PORT.
    #[arg(long)]
    port: Option<u16>,
}

#[actix_web::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tryon_proxy=info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();

    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.port = port;
    }

    info!("Starting tryon-proxy");

    if let Err(e) = tryon_proxy::server::run(config, args.host).await {
        error!("Server failed: {}", e);
        std::process::exit(1);
    }
    Ok(())
}
