use std::error::Error;

use clap::Parser;
use env_logger::Builder;
use log::{debug, error, info, LevelFilter};

use bgpd_sync::cli::{query, Args, Command};
use bgpd_sync::{config, serve};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let (crate_level, other_level) = match args.verbose {
        0 => (LevelFilter::Info, LevelFilter::Warn),
        1 => (LevelFilter::Debug, LevelFilter::Warn),
        2 => (LevelFilter::Trace, LevelFilter::Warn),
        _ => (LevelFilter::Trace, LevelFilter::Trace),
    };
    Builder::new()
        .filter(Some("bgpd_sync"), crate_level)
        .filter(None, other_level)
        .init();

    match &args.cmd {
        Command::Run(options) => {
            info!("Logging at levels {}/{}", crate_level, other_level);
            let overrides = config::Overrides {
                node_name: options.node_name.clone(),
                poll_interval: options.interval,
            };
            let config = config::from_file(&options.config_path, overrides)?;
            debug!(
                "Running as {} with poll intervals {}s/{}s",
                config.node_name, config.poll_interval, config.pool_poll_interval
            );
            if let Err(err) = serve(config).await {
                error!("bgpd-sync stopped: {}", err);
                std::process::exit(1);
            }
        }
        _ => query(&args).await,
    }
    Ok(())
}
