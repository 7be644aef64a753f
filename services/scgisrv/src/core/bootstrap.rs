//! Service bootstrap
//!
//! Command line parsing, logging initialisation and the `--validate` mode.

use std::path::PathBuf;

use clap::Parser;
use tracing::{info, Level};

use crate::core::config::Config;
use crate::error::{Result, ScgiSrvError};
use common::logging::LogConfig;

/// Command-line arguments for scgisrv
#[derive(Parser, Clone, Debug)]
#[command(
    name = "scgisrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "SCGI gateway for ABUS controllers",
    long_about = None
)]
pub struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = "scgisrv.yaml")]
    pub config: PathBuf,

    /// Base directory for relative locations (logs, alc files, tls keys)
    #[arg(long)]
    pub app_dir: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(short = 'l', long)]
    pub log_level: Option<String>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Validation mode - only validate configuration without starting service
    #[arg(long)]
    pub validate: bool,
}

impl Args {
    /// Load the configuration file and apply command line overrides
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(&self.config)?;
        if let Some(app_dir) = &self.app_dir {
            config.locations.app_dir = app_dir.clone();
        }
        Ok(config)
    }
}

fn parse_level(raw: &str) -> Result<Level> {
    match raw.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(ScgiSrvError::config(format!("invalid log level \"{other}\""))),
    }
}

/// Build the logging setup from `debuglog` and the command line
pub fn log_config(args: &Args, config: &Config) -> Result<LogConfig> {
    let debuglog = &config.debuglog;
    let level = match &args.log_level {
        Some(raw) => parse_level(raw)?,
        None if debuglog.enabled => parse_level(&debuglog.level)?,
        None => Level::INFO,
    };

    Ok(LogConfig {
        service_name: "scgisrv".to_string(),
        file_name: "scgi".to_string(),
        log_dir: config.locations.log_dir(),
        level,
        log_to_file: debuglog.enabled && debuglog.log_to_file,
        max_file_size: debuglog.max_file_size_kb * 1000,
        backup_count: debuglog.backup_count,
        ansi: !args.no_color,
    })
}

/// Initialize logging; without a config only the console is used
pub fn initialize_logging(args: &Args, config: Option<&Config>) -> Result<()> {
    let log_config = match config {
        Some(config) => log_config(args, config)?,
        None => LogConfig {
            level: parse_level(args.log_level.as_deref().unwrap_or("info"))?,
            log_to_file: false,
            ansi: !args.no_color,
            ..LogConfig::default()
        },
    };

    common::logging::init_with_config(log_config)
        .map_err(|e| ScgiSrvError::config(format!("Failed to init logging: {}", e)))
}

/// Load and validate the configuration, then report what was found
pub fn validate_configuration(args: &Args) -> Result<()> {
    let config = args.load_config()?;
    let static_plcs = config.static_plcs()?;

    info!("Configuration file {:?} is valid", args.config);
    info!(
        "eth={} can={} push={} relay={} datalogger={} dbase={}",
        config.eth.enabled,
        config.can.enabled,
        config.push.enabled,
        config.relay.enabled,
        config.datalogger.enabled,
        config.dbase.enabled
    );
    for plc in static_plcs {
        info!(
            "Static c{} ip={} port={}",
            plc.nad,
            plc.ip.map_or_else(|| "?".to_string(), |ip| ip.to_string()),
            plc.port.map_or_else(|| "-".to_string(), |p| p.to_string())
        );
    }
    Ok(())
}
