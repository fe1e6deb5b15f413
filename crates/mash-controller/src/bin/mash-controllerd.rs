// SPDX-License-Identifier: Apache-2.0 OR MIT

//! MASH controller daemon: zone CA, device roster, commissioning, and
//! use-case-driven subscriptions (§4.6). No interactive command loop — the
//! CLI surface itself is an external collaborator (§1); this binary just
//! builds a `Config`, constructs the service, and runs it.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use mash_controller::{Config, ControllerService, ControllerEvent, TuningConfig};
use mash_core::ZoneType;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ZoneTypeArg {
    Grid,
    Local,
}

impl From<ZoneTypeArg> for ZoneType {
    fn from(v: ZoneTypeArg) -> Self {
        match v {
            ZoneTypeArg::Grid => ZoneType::Grid,
            ZoneTypeArg::Local => ZoneType::Local,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "mash-controllerd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// This zone's identifier, used as the Zone CA's common name.
    #[arg(long, default_value = "zone-1")]
    zone_name: String,

    /// Whether this zone arbitrates as GRID (higher priority) or LOCAL.
    #[arg(long, value_enum, default_value_t = ZoneTypeArg::Local)]
    zone_type: ZoneTypeArg,

    /// Directory for the roster, cert store, and failsafe persistence.
    #[arg(long, default_value = "./mash-controller-state")]
    state_dir: PathBuf,

    /// Optional TOML file overriding the request timeout default.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Wipe all persisted state before starting.
    #[arg(long, default_value_t = false)]
    reset: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let tuning = match &args.config {
        Some(path) => TuningConfig::from_file(path)?,
        None => TuningConfig::default(),
    };

    let config = Config {
        zone_id: args.zone_name.clone(),
        zone_type: args.zone_type.into(),
        state_dir: args.state_dir,
        reset: args.reset,
        request_timeout: tuning.request_timeout(),
    };

    let service = std::sync::Arc::new(ControllerService::new(
        config,
        std::sync::Arc::new(|event: ControllerEvent| {
            info!(?event, "controller event");
        }),
    )?);
    service.start()?;
    info!(zone = %args.zone_name, "mash-controllerd running");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    service.stop()?;
    Ok(())
}
