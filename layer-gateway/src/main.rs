//! `layer-gateway` HTTP server binary.
//!
//!   cargo run -p layer-gateway -- --port 8000 --data-dir ./data
//!
//! Logging follows `RUST_LOG` when set, e.g. `RUST_LOG=layer_gateway=debug,layer_client=info`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use layer_gateway::{AppState, Config, LayerTelegram, router};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "layer-gateway")]
#[command(about = "HTTP gateway for Telegram user-account login, dialogs and message history")]
#[command(version)]
struct Cli {
    /// Port to listen on
    #[arg(short, long, env = "GATEWAY_PORT", default_value = "8000")]
    port: u16,

    /// Address to bind to
    #[arg(short, long, env = "GATEWAY_BIND", default_value = "0.0.0.0")]
    bind: String,

    /// Directory for session files (overrides the config file)
    #[arg(short, long, env = "GATEWAY_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Config file path (optional)
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, env = "GATEWAY_VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "layer_gateway=debug,layer_client=info,tower_http=debug"
    } else {
        "layer_gateway=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None       => Config::default(),
    };
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    config.validate()?;

    std::fs::create_dir_all(&config.data_dir)?;
    info!("Session files in: {}", config.data_dir.display());
    if config.telegram.api_id.is_some() {
        info!("Default API credentials configured");
    }

    let app = router(AppState::new(Arc::new(LayerTelegram), config));

    let addr: SocketAddr = format!("{}:{}", cli.bind, cli.port).parse()?;
    info!("Starting layer-gateway on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
