use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use essbridge::{cli::Args, logging, shutdown, Bridge, BridgeConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config =
        BridgeConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    logging::init_logging(&config.logging.level, config.logging.format)?;

    info!(
        "Starting essbridge v{}: device {} unit {}, API {}",
        env!("CARGO_PKG_VERSION"),
        config.device_address(),
        config.device.unit_id,
        config.bind_address()
    );

    let token = CancellationToken::new();
    shutdown::cancel_on_signal(token.clone());

    Bridge::new(config).run(token).await?;

    info!("essbridge stopped");
    Ok(())
}
