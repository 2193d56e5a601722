use clap::Parser;
use color_eyre::Result;
use fsr_bridge::{
    cli,
    config::Config,
    logging::{self, LogTargets},
    server,
};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[cfg(unix)]
async fn hangup() -> Result<()> {
    signal(SignalKind::hangup())?.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn hangup() -> Result<()> {
    std::future::pending().await
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = cli::Cli::parse();

    if let Some(command) = cli.command {
        cli::handle_command(command);

        return Ok(());
    }

    logging::init(LogTargets::stdout(cli.log_level).with_dir(cli.log_dir));

    let config = if let Some(config_path) = cli.config {
        debug!(?config_path, "Config from path");
        Config::new_from_path(config_path)?
    } else {
        debug!("Default config");
        Config::default()
    };

    let shutdown = CancellationToken::new();
    let mut server = tokio::spawn(server::run_on_port(config, cli.port, shutdown.clone()));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C, quitting")
        }
        _ = hangup() => {
            info!("Told to hang up, quitting")
        }
        result = &mut server => {
            error!(?result, "Server returned");
            logging::shutdown();
            result??;
            return Err(color_eyre::eyre::eyre!("Server stopped unexpectedly"));
        }
    }

    shutdown.cancel();
    server.await??;

    logging::shutdown();

    Ok(())
}
