// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The two listeners a device runs (§4.5): a plaintext commissioning
//! listener (pairing proof + CSR signing) and one mTLS operational
//! listener per joined zone (request dispatch + notification fan-out).

use std::sync::Arc;
use std::time::Duration;

use mash_codec::{framing, Request};
use mash_core::arbitration::ZoneArbitrator;
use mash_core::model::Device;
use mash_core::RequestContext;
use mash_interaction::InteractionServer;
use mash_pki::{FileCertStore, ZoneCa, ZoneMaterial};
use mash_session::commission::commission_as_device;
use mash_session::{tls, Session};
use tokio::io::{split, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

use crate::error::Result;
use crate::zones::ZoneMembership;

/// Subscription poll rate for every device-hosted `InteractionServer`.
const SUBSCRIPTION_TICK: Duration = Duration::from_millis(500);

/// Accepts plaintext commissioning attempts on `listener` until the
/// process is torn down, one connection at a time (§4.5: commissioning is
/// rare and operator-driven, no need for concurrent handshakes). A
/// matching `setup_code` for an offered connection installs the granted
/// zone material into `cert_store` and arms a failsafe timer for it.
pub async fn run_commissioning_listener(
    listener: TcpListener,
    setup_code: String,
    placeholder_id: String,
    device: Arc<Device>,
    cert_store: Arc<FileCertStore>,
    zones: Arc<ZoneMembership>,
    failsafe_secs: u64,
) {
    loop {
        let (mut stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "commissioning listener accept failed");
                continue;
            }
        };
        info!(%peer, "commissioning attempt");
        match handle_commissioning(&mut stream, &setup_code, &placeholder_id, &device, &cert_store, &zones, failsafe_secs).await {
            Ok(zone_id) => info!(%peer, zone_id, "commissioning succeeded"),
            Err(e) => warn!(%peer, error = %e, "commissioning attempt failed"),
        }
        let _ = stream.shutdown().await;
    }
}

async fn handle_commissioning(
    stream: &mut TcpStream,
    setup_code: &str,
    placeholder_id: &str,
    device: &Device,
    cert_store: &FileCertStore,
    zones: &ZoneMembership,
    failsafe_secs: u64,
) -> Result<String> {
    let (grant, csr) = commission_as_device(stream, setup_code, placeholder_id).await?;
    let material = ZoneMaterial {
        zone_id: grant.zone_id.clone(),
        zone_type: grant.zone_type,
        zone_ca_cert_pem: grant.zone_ca_cert_pem,
        operational_cert_pem: grant.operational_cert_pem,
        operational_key_pem: csr.key_pair.serialize_pem(),
    };
    let zone_id = material.zone_id.clone();
    cert_store.store_zone(&material)?;
    zones.join(&zone_id, material.zone_type, failsafe_secs, Default::default());
    if !device.is_commissioned() {
        device.adopt_device_id(grant.assigned_device_id);
    }
    Ok(zone_id)
}

/// Accepts mTLS operational connections for one joined zone and dispatches
/// them against `device`'s shared model tree. One task per joined zone;
/// `zones.on_contact` is fed on every successfully handled request.
pub async fn run_operational_listener(
    listener: TcpListener,
    zone_ca: Arc<ZoneCa>,
    own_cert_der: Vec<u8>,
    own_key_pem: String,
    device: Arc<Device>,
    arbitrator: Arc<ZoneArbitrator>,
    zones: Arc<ZoneMembership>,
    peer_zone_id: String,
    peer_zone_type: mash_core::ZoneType,
) {
    let config = match tls::server_config(&zone_ca, own_cert_der, &own_key_pem) {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            warn!(error = %e, "failed to build operational server config");
            return;
        }
    };
    loop {
        let (tcp, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "operational listener accept failed");
                continue;
            }
        };
        let device = Arc::clone(&device);
        let arbitrator = Arc::clone(&arbitrator);
        let zones = Arc::clone(&zones);
        let config = Arc::clone(&config);
        let peer_zone_id = peer_zone_id.clone();
        tokio::spawn(async move {
            let session = match Session::accept(tcp, config, peer_zone_id.clone(), peer_zone_type).await {
                Ok(s) => s,
                Err(e) => {
                    warn!(%peer_addr, error = %e, "TLS handshake failed");
                    return;
                }
            };
            serve_session(session, device, arbitrator, zones, peer_zone_id, peer_zone_type).await;
        });
    }
}

/// Drives one accepted operational session end to end. A live session is a
/// connected controller for the purposes of §4.7's `controlState` machine,
/// so the arbitrator is notified on accept and on teardown regardless of
/// how the session ends.
async fn serve_session(
    session: Session,
    device: Arc<Device>,
    arbitrator: Arc<ZoneArbitrator>,
    zones: Arc<ZoneMembership>,
    zone_id: String,
    zone_type: mash_core::ZoneType,
) {
    arbitrator.on_controller_connected();

    let (server, mut notify_rx) = InteractionServer::new(device);
    tokio::spawn(Arc::clone(&server).run_subscription_ticker(SUBSCRIPTION_TICK));

    let (mut reader, writer) = split(session);
    let writer = Arc::new(tokio::sync::Mutex::new(writer));

    let forward_writer = Arc::clone(&writer);
    let notify_task = tokio::spawn(async move {
        while let Some(n) = notify_rx.recv().await {
            let mut w = forward_writer.lock().await;
            if framing::write_frame(&mut *w, &n.encode()).await.is_err() {
                break;
            }
        }
    });

    let ctx = RequestContext::new(zone_id.clone(), zone_type);
    loop {
        let frame = match framing::read_frame(&mut reader).await {
            Ok(Some(f)) => f,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "operational frame read failed");
                break;
            }
        };
        let req = match Request::decode(&frame) {
            Ok(req) => req,
            Err(e) => {
                warn!(error = %e, "could not decode request");
                continue;
            }
        };
        zones.on_contact(&zone_id);
        let resp = server.handle_request(&ctx, &req);
        let mut w = writer.lock().await;
        if framing::write_frame(&mut *w, &resp.encode()).await.is_err() {
            break;
        }
    }

    server.cancel_all_subscriptions();
    notify_task.abort();
    arbitrator.on_controller_disconnected();
}
