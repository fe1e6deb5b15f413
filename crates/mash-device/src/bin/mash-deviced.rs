// SPDX-License-Identifier: Apache-2.0 OR MIT

//! MASH device daemon: the commissioning listener, one mTLS operational
//! listener per joined zone, and the failsafe loop (§4.5, §4.7). No
//! interactive command loop — the CLI surface is an external collaborator
//! (§1); this binary just builds a `Config`, constructs the service, and
//! runs it.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mash_device::{Config, DeviceService, TuningConfig};

#[derive(Parser, Debug)]
#[command(name = "mash-deviced")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Vendor id reported in the DeviceInfo feature.
    #[arg(long, default_value_t = 0xFFFF)]
    vendor_id: u32,

    /// Product id reported in the DeviceInfo feature.
    #[arg(long, default_value_t = 1)]
    product_id: u16,

    /// Address the plaintext commissioning listener binds to.
    #[arg(long, default_value = "0.0.0.0:5540")]
    commission_addr: SocketAddr,

    /// The pairing setup code controllers must present to commission this device.
    #[arg(long)]
    setup_code: String,

    /// Directory for the per-zone cert store and failsafe persistence.
    #[arg(long, default_value = "./mash-device-state")]
    state_dir: PathBuf,

    /// Optional TOML file overriding failsafe tuning defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Wipe all persisted state before starting (forgets every joined zone).
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
        vendor_id: args.vendor_id,
        product_id: args.product_id,
        state_dir: args.state_dir,
        commission_addr: args.commission_addr,
        setup_code: args.setup_code,
        failsafe_secs: tuning.failsafe_secs,
        default_failsafe_limits: tuning.failsafe_limits(),
        reset: args.reset,
    };

    let service = std::sync::Arc::new(DeviceService::new(config)?);
    service.clone().run().await?;
    info!(vendor_id = args.vendor_id, product_id = args.product_id, "mash-deviced running");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    service.save()?;
    Ok(())
}
