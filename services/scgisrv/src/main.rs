//! SCGI gateway service (`scgisrv`)

use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use errors::GatewayResult;
use scgisrv::core::bootstrap::{self, Args};
use scgisrv::core::constants::APP_VERSION;
use scgisrv::Gateway;

#[tokio::main]
async fn main() -> ExitCode {
    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // logging may not be up yet
            eprintln!("scgisrv: {e}");
            error!("scgisrv failed: {}", e);
            ExitCode::from(e.exit_code())
        },
    }
}

async fn run(args: Args) -> GatewayResult<()> {
    // Validation mode: validate and exit
    if args.validate {
        bootstrap::initialize_logging(&args, None)?;
        bootstrap::validate_configuration(&args)?;
        info!("Validation completed successfully");
        return Ok(());
    }

    let config = args.load_config()?;
    // also starts compression of rotated log files
    bootstrap::initialize_logging(&args, Some(&config))?;
    // Enable SIGHUP-triggered log reopen
    common::logging::enable_sighup_log_reopen();

    info!("Starting scgisrv {}", APP_VERSION);
    let shutdown_token = CancellationToken::new();
    let gateway = Gateway::start(config, shutdown_token.clone()).await?;
    info!("SCGI server listening on {}", gateway.scgi_addr());

    common::shutdown::cancel_on_shutdown(shutdown_token).await;
    gateway.shutdown().await;
    info!("scgisrv stopped");
    Ok(())
}
