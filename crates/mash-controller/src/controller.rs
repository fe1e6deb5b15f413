// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The controller service (§4.6): owns the zone's CA, the device roster,
//! and one `InteractionClient` per connected device. Discovery and the
//! wire transport itself are external collaborators (§1) — callers feed
//! `ControllerService` discovered `(discriminator, host, port)` tuples and
//! it drives commissioning and operational connections from there.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::net::TcpStream;
use tracing::{info, warn};

use mash_core::ZoneType;
use mash_pki::{ControllerCertStore, DeviceRecord, OperationalCert, OperationalCsr, ZoneCa};
use mash_session::commission::commission_as_controller;
use mash_session::{tls, Backoff, Session};

use crate::error::{ControllerError, Result};
use crate::events::{ControllerEvent, EventSink};
use crate::roster::{ControllerClient, Roster, RosterEntry};
use crate::usecase;

const RECONNECT_INITIAL: Duration = Duration::from_secs(1);
const RECONNECT_MAX: Duration = Duration::from_secs(60);

/// Own identity the controller presents in the zone it governs.
const CONTROLLER_COMMON_NAME: &str = "mash-controller";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControllerState {
    Initializing = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl From<u8> for ControllerState {
    fn from(v: u8) -> Self {
        match v {
            0 => ControllerState::Initializing,
            1 => ControllerState::Running,
            2 => ControllerState::Stopping,
            _ => ControllerState::Stopped,
        }
    }
}

pub struct Config {
    pub zone_id: String,
    pub zone_type: ZoneType,
    pub state_dir: std::path::PathBuf,
    pub reset: bool,
    pub request_timeout: Duration,
}

fn pem_to_der(pem_str: &str) -> Result<Vec<u8>> {
    Ok(pem::parse(pem_str).map_err(|e| mash_pki::PkiError::Parse(e.to_string()))?.into_contents())
}

/// Owns the zone CA, the on-disk cert store, and the live device roster.
pub struct ControllerService {
    config: Config,
    cert_store: ControllerCertStore,
    zone_ca: RwLock<Option<Arc<ZoneCa>>>,
    roster: Arc<Roster>,
    state: AtomicU8,
    events: EventSink,
}

impl ControllerService {
    pub fn new(config: Config, events: EventSink) -> Result<Self> {
        if config.reset && config.state_dir.exists() {
            let _ = std::fs::remove_dir_all(&config.state_dir);
        }
        std::fs::create_dir_all(&config.state_dir)?;
        let cert_store = ControllerCertStore::open(config.state_dir.join("pki"))?;
        let roster = Arc::new(Roster::new(&config.state_dir, config.zone_id.clone()));
        Ok(Self {
            config,
            cert_store,
            zone_ca: RwLock::new(None),
            roster,
            state: AtomicU8::new(ControllerState::Initializing as u8),
            events,
        })
    }

    pub fn state(&self) -> ControllerState {
        self.state.load(Ordering::SeqCst).into()
    }

    fn set_state(&self, state: ControllerState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Loads the zone CA (generating one on first run, self-issuing the
    /// controller's own operational cert alongside it), rebuilds the
    /// roster from disk, and transitions to `Running` (§4.6 "Load-on-start
    /// rebuilds the roster").
    pub fn start(&self) -> Result<()> {
        let ca = match self.cert_store.load_zone_ca_pem() {
            Ok((cert_pem, key_pem)) => {
                Arc::new(ZoneCa::from_pem(&self.config.zone_id, self.config.zone_type, &cert_pem, &key_pem)?)
            }
            Err(_) => {
                let ca = ZoneCa::generate(&self.config.zone_id, self.config.zone_type)?;
                self.cert_store.store_zone_ca(&self.config.zone_id, self.config.zone_type, &ca.cert_pem(), &ca.key_pem())?;
                Arc::new(ca)
            }
        };

        if !self.cert_store.has_own_operational_cert() {
            let csr = OperationalCsr::generate(CONTROLLER_COMMON_NAME)?;
            let cert = OperationalCert::issue(&ca, &csr.der)?;
            self.cert_store.store_own_operational_cert(&cert.cert_pem(), &csr.key_pair.serialize_pem())?;
        }

        *self.zone_ca.write() = Some(ca);
        self.roster.load()?;
        info!(zone_id = %self.config.zone_id, devices = self.roster.device_ids().len(), "controller starting");
        self.set_state(ControllerState::Running);
        Ok(())
    }

    /// Flushes the roster and moves to `Stopped` (§4.6 "flush roster +
    /// zone metadata on stop"). Connections themselves are owned by their
    /// spawned tasks and are not cancelled here.
    pub fn stop(&self) -> Result<()> {
        self.set_state(ControllerState::Stopping);
        self.roster.save()?;
        self.set_state(ControllerState::Stopped);
        Ok(())
    }

    pub fn roster(&self) -> &Arc<Roster> {
        &self.roster
    }

    fn zone_ca(&self) -> Arc<ZoneCa> {
        self.zone_ca.read().clone().expect("start() must run before any commissioning or connect attempt")
    }

    /// Drives the six-step commissioning handshake (§4.5) against a
    /// freshly-discovered, not-yet-commissioned device and admits it to
    /// the roster on success.
    pub async fn commission_device(&self, addr: SocketAddr, setup_code: &str) -> Result<String> {
        let mut tcp = TcpStream::connect(addr)
            .await
            .map_err(|e| mash_session::SessionError::TransportFailure(e.to_string()))?;
        let ca = self.zone_ca();
        let grant = commission_as_controller(&mut tcp, setup_code, &ca).await?;

        let device_id = grant.assigned_device_id.clone();
        let cert_der = pem_to_der(&grant.operational_cert_pem)?;
        let ski_hex = mash_pki::verify::extract_subject_key_id(&cert_der)?
            .map(|ski| mash_pki::ski_hex(&ski))
            .unwrap_or_default();

        self.cert_store.add_device(&DeviceRecord {
            device_id: device_id.clone(),
            subject_key_id_hex: ski_hex.clone(),
            device_type: "unknown".to_string(),
        })?;

        self.roster.insert(RosterEntry {
            device_id: device_id.clone(),
            subject_key_id_hex: ski_hex,
            device_type: "unknown".to_string(),
            host: addr.ip().to_string(),
            port: addr.port(),
            connected: false,
            last_seen: std::time::SystemTime::now(),
            joined_at: std::time::SystemTime::now(),
            operational_cert_pem: grant.operational_cert_pem.clone(),
            use_cases: Vec::new(),
            subscription_ids: Vec::new(),
            client: None,
        });
        self.roster.save()?;
        (self.events)(ControllerEvent::DeviceCommissioned { device_id: device_id.clone() });
        Ok(device_id)
    }

    pub fn decommission_device(&self, device_id: &str) -> Result<()> {
        self.roster.remove(device_id).ok_or_else(|| ControllerError::UnknownDevice(device_id.to_string()))?;
        self.cert_store.remove_device(device_id)?;
        self.roster.save()?;
        (self.events)(ControllerEvent::DeviceDecommissioned { device_id: device_id.to_string() });
        Ok(())
    }

    /// Opens a mutually-TLS-authenticated operational session to an
    /// already-commissioned device, wires up an `InteractionClient`, runs
    /// use-case discovery, and establishes its subscriptions (§4.6, §4.8).
    pub async fn connect_device(&self, device_id: &str, addr: SocketAddr) -> Result<()> {
        let ca = self.zone_ca();
        let (own_cert_pem, own_key_pem) = self.cert_store.load_own_operational_cert()?;
        let own_cert_der = pem_to_der(&own_cert_pem)?;

        let client_config = tls::client_config(&ca, own_cert_der, &own_key_pem)?;
        let session = Session::connect(
            &addr.to_string(),
            &self.config.zone_id,
            Arc::new(client_config),
            self.config.zone_id.clone(),
            self.config.zone_type,
        )
        .await?;

        let (client, read_half, mut notify_rx) = ControllerClient::with_timeout(session, self.config.request_timeout);
        tokio::spawn(Arc::clone(&client).run(read_half));
        self.roster.mark_connected(device_id, Arc::clone(&client))?;
        (self.events)(ControllerEvent::DeviceConnected { device_id: device_id.to_string() });

        let matched = usecase::discover(&client).await;
        let mut use_cases = Vec::new();
        let mut sub_ids = Vec::new();
        if matched.is_empty() {
            for (endpoint_id, spec) in usecase::blind_default_subscriptions() {
                if let Ok(id) = subscribe(&client, endpoint_id, &spec).await {
                    sub_ids.push(id);
                }
            }
        } else {
            for (name, endpoint_id, specs) in matched {
                use_cases.push(name.to_string());
                for spec in specs {
                    if let Ok(id) = subscribe(&client, endpoint_id, &spec).await {
                        sub_ids.push(id);
                    }
                }
            }
        }
        self.roster.set_use_cases(device_id, use_cases);
        self.roster.set_subscriptions(device_id, sub_ids);

        let events = Arc::clone(&self.events);
        let device_id_owned = device_id.to_string();
        tokio::spawn(async move {
            while let Some(n) = notify_rx.recv().await {
                for (attribute_id, value) in n.changes {
                    (events)(ControllerEvent::ValueChanged {
                        device_id: device_id_owned.clone(),
                        endpoint_id: n.endpoint_id,
                        feature_id: n.feature_id,
                        attribute_id,
                        value,
                    });
                }
            }
        });

        Ok(())
    }

    /// Runs a reconnect loop with exponential backoff until the session is
    /// restored or the device is decommissioned out from under it (§7
    /// "transport failures trigger exponential-backoff reconnect").
    pub async fn reconnect_with_backoff(self: &Arc<Self>, device_id: String, addr: SocketAddr) {
        let mut backoff = Backoff::new(RECONNECT_INITIAL, RECONNECT_MAX);
        loop {
            if !self.roster.contains(&device_id) {
                return;
            }
            match self.connect_device(&device_id, addr).await {
                Ok(()) => {
                    (self.events)(ControllerEvent::DeviceReconnected { device_id });
                    return;
                }
                Err(e) => {
                    warn!(device_id = %device_id, error = %e, "reconnect attempt failed");
                    (self.events)(ControllerEvent::ReconnectionFailed { device_id: device_id.clone(), reason: e.to_string() });
                    tokio::time::sleep(backoff.next_delay()).await;
                }
            }
        }
    }
}

async fn subscribe(client: &ControllerClient, endpoint_id: u8, spec: &usecase::SubscriptionSpec) -> Result<u32> {
    let resp = client
        .subscribe(endpoint_id, spec.feature as u8, &spec.attribute_ids, Duration::from_secs(1), Duration::from_secs(60))
        .await?;
    if let mash_core::Value::Map(map) = &resp.payload {
        if let Some(mash_core::Value::U32(id)) = map.get("subscriptionId") {
            return Ok(*id);
        }
    }
    Err(ControllerError::UnknownDevice("subscription response carried no subscriptionId".to_string()))
}
