use anyhow::Result;
use clap::Parser;
use log::{error, info};

use snowdrift::transport::DirectTransportFactory;
use snowdrift::utils::{config, logger};
use snowdrift::Client;

#[derive(Parser)]
#[command(version, about = "Censorship-resistant SOCKS5 relay client")]
struct Opts {
    #[arg(short, long, env = "SNOWDRIFT_CONFIG", default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Opts::parse();
    let config = config::load_config_from_path(&opts.config)?;

    logger::setup_logger(config.log_level)?;

    let factory = Box::new(DirectTransportFactory::new(config.bridge_addr.clone()));
    let client = Client::new(config.client_config(), factory)?;

    if let Err(e) = client.start().await {
        error!("Unable to start service: {:#}", e);
        return Err(e);
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down.");
    client.stop().await;
    Ok(())
}
