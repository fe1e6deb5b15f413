// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `DeviceService`: the device-runtime equivalent of
//! `mash-controller::ControllerService` — owns the model tree, the
//! arbitrator, the per-zone failsafe clocks, and the two listeners, and
//! ticks the failsafe loop in the background.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mash_core::arbitration::{Direction, FailsafeLimits, ZoneArbitrator};
use mash_core::model::Device;
use mash_pki::FileCertStore;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::error::Result;
use crate::listener::{run_commissioning_listener, run_operational_listener};
use crate::tree::{self, DeviceTree};
use crate::zones::ZoneMembership;

pub struct Config {
    pub vendor_id: u32,
    pub product_id: u16,
    pub state_dir: std::path::PathBuf,
    pub commission_addr: SocketAddr,
    pub setup_code: String,
    pub failsafe_secs: u64,
    pub default_failsafe_limits: FailsafeLimits,
    pub reset: bool,
}

const FAILSAFE_TICK: Duration = Duration::from_secs(1);

pub struct DeviceService {
    config: Config,
    tree: DeviceTree,
    zones: Arc<ZoneMembership>,
    cert_store: Arc<FileCertStore>,
}

impl DeviceService {
    pub fn new(config: Config) -> Result<Self> {
        if config.reset && config.state_dir.exists() {
            let _ = std::fs::remove_dir_all(&config.state_dir);
        }
        std::fs::create_dir_all(&config.state_dir)?;
        let cert_store = Arc::new(FileCertStore::open(config.state_dir.join("pki"))?);
        let zones = Arc::new(ZoneMembership::open(
            &config.state_dir,
            config.default_failsafe_limits,
            config.failsafe_secs,
        )?);
        let tree = tree::build(config.vendor_id, config.product_id);

        // Arm a failsafe timer for zones joined in a prior run whose clock
        // didn't survive in `failsafe.json` (e.g. its first run ever).
        for zone_id in cert_store.list_zones()? {
            let zone_type = cert_store.load_zone(&zone_id)?.zone_type;
            zones.join(&zone_id, zone_type, config.failsafe_secs, config.default_failsafe_limits);
        }

        Ok(Self { config, tree, zones, cert_store })
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.tree.device
    }

    pub fn arbitrator(&self) -> &Arc<ZoneArbitrator> {
        &self.tree.arbitrator
    }

    /// Starts the commissioning listener, one operational listener per
    /// already-joined zone, and the failsafe ticker. Returns once every
    /// listener is bound; the listeners themselves run for the lifetime
    /// of the returned background tasks.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let commission_listener = TcpListener::bind(self.config.commission_addr).await?;
        info!(addr = %self.config.commission_addr, "commissioning listener bound");
        tokio::spawn(run_commissioning_listener(
            commission_listener,
            self.config.setup_code.clone(),
            self.tree.device.device_id(),
            Arc::clone(self.device()),
            Arc::clone(&self.cert_store),
            Arc::clone(&self.zones),
            self.config.failsafe_secs,
        ));

        for zone_id in self.cert_store.list_zones()? {
            self.spawn_operational_listener(&zone_id).await?;
        }

        let service = Arc::clone(&self);
        tokio::spawn(async move { service.run_failsafe_ticker().await });

        Ok(())
    }

    async fn spawn_operational_listener(&self, zone_id: &str) -> Result<()> {
        let material = self.cert_store.load_zone(zone_id)?;

        // A device never holds its zone CA's private key, only the CA's
        // cert — `server_config` only ever reads `cert_der`/`subject_key_id`
        // off this struct to authenticate peers, never `key_pair`, so a
        // throwaway key pair fills the field.
        let ca_cert_der = pem::parse(&material.zone_ca_cert_pem)
            .map_err(|e| mash_pki::PkiError::Parse(e.to_string()))?
            .into_contents();
        let ca_subject_key_id = mash_pki::verify::extract_subject_key_id(&ca_cert_der)?
            .ok_or_else(|| mash_pki::PkiError::Parse("zone CA cert carries no SubjectKeyId".to_string()))?;
        let throwaway = mash_pki::OperationalCsr::generate("throwaway")?;
        let zone_ca = Arc::new(mash_pki::ZoneCa {
            zone_id: material.zone_id.clone(),
            zone_type: material.zone_type,
            key_pair: throwaway.key_pair,
            cert_der: ca_cert_der,
            subject_key_id: ca_subject_key_id,
        });

        let own_cert_der = pem::parse(&material.operational_cert_pem)
            .map_err(|e| mash_pki::PkiError::Parse(e.to_string()))?
            .into_contents();

        let listener = TcpListener::bind(("0.0.0.0", 0)).await?;
        let local_addr = listener.local_addr()?;
        info!(zone_id, addr = %local_addr, "operational listener bound");

        tokio::spawn(run_operational_listener(
            listener,
            zone_ca,
            own_cert_der,
            material.operational_key_pem,
            Arc::clone(self.device()),
            Arc::clone(self.arbitrator()),
            Arc::clone(&self.zones),
            material.zone_id,
            material.zone_type,
        ));
        Ok(())
    }

    async fn run_failsafe_ticker(self: Arc<Self>) {
        let mut interval = tokio::time::interval(FAILSAFE_TICK);
        loop {
            interval.tick().await;
            let now = std::time::SystemTime::now();
            for (zone_id, limits) in self.zones.tick() {
                warn!(zone_id = %zone_id, "failsafe tripped, clamping to configured limits");
                if let Some(mw) = limits.consumption_limit_mw {
                    let _ = self.tree.arbitrator.assert_limit(&zone_id, Direction::Consumption, mw, None, now);
                }
                if let Some(mw) = limits.production_limit_mw {
                    let _ = self.tree.arbitrator.assert_limit(&zone_id, Direction::Production, mw, None, now);
                }
                let direction = match (limits.consumption_limit_mw.is_some(), limits.production_limit_mw.is_some()) {
                    (true, false) => Some(Direction::Consumption),
                    (false, true) => Some(Direction::Production),
                    _ => None,
                };
                self.tree.arbitrator.assert_override(&zone_id, "failsafe", direction);
            }
            if let Err(e) = self.zones.save() {
                warn!(error = %e, "failed to persist failsafe snapshots");
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        self.zones.save()
    }
}
