// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Commissioning handshake (§4.5, §9 open question): the setup-code proof
//! exchange is bound to SPAKE2 (symmetric, both sides hold the same
//! pre-shared setup code) over the unauthenticated transport, confirmed by
//! an HMAC-SHA256 tag derived from the shared key — a standard PAKE
//! confirmation step. The outcome is binary: a confirmation mismatch is a
//! rejected proof, nothing partial.

use std::collections::BTreeMap;

use ring::hmac;
use spake2::{Ed25519Group, Identity, Password, Spake2};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use mash_codec::framing::{read_frame, write_frame};
use mash_codec::wire::{decode_value, encode_value};
use mash_core::{Value, ZoneType};
use mash_pki::{OperationalCert, OperationalCsr, ZoneCa};

use crate::error::{Result, SessionError};

const CONTROLLER_IDENTITY: &[u8] = b"mash-controller";
const DEVICE_IDENTITY: &[u8] = b"mash-device";
const CONFIRM_CONTROLLER: &[u8] = b"mash-confirm-controller";
const CONFIRM_DEVICE: &[u8] = b"mash-confirm-device";

async fn spake2_exchange<S: AsyncReadExt + AsyncWriteExt + Unpin>(
    stream: &mut S,
    setup_code: &[u8],
    my_identity: &'static [u8],
    peer_identity: &'static [u8],
) -> Result<[u8; 32]> {
    let (state, outbound) = Spake2::<Ed25519Group>::start_symmetric(
        &Password::new(setup_code),
        &Identity::new(my_identity),
    );
    write_frame(stream, &outbound)
        .await
        .map_err(|e| SessionError::TransportFailure(e.to_string()))?;
    let inbound = read_frame(stream)
        .await
        .map_err(|e| SessionError::TransportFailure(e.to_string()))?
        .ok_or(SessionError::Timeout)?;
    let key = state
        .finish(&inbound)
        .map_err(|_| SessionError::ProofRejected)?;

    let mut fixed = [0u8; 32];
    let len = fixed.len().min(key.len());
    fixed[..len].copy_from_slice(&key[..len]);

    let _ = peer_identity;
    Ok(fixed)
}

fn confirmation_tag(key: &[u8; 32], label: &[u8]) -> hmac::Tag {
    let hmac_key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hmac::sign(&hmac_key, label)
}

/// Runs the controller side of the pairing proof. Returns the shared
/// session key on success, `ProofRejected` if the device's confirmation
/// tag does not match (wrong setup code).
pub async fn prove_as_controller<S: AsyncReadExt + AsyncWriteExt + Unpin>(
    stream: &mut S,
    setup_code: &str,
) -> Result<[u8; 32]> {
    let key = spake2_exchange(stream, setup_code.as_bytes(), CONTROLLER_IDENTITY, DEVICE_IDENTITY).await?;

    let my_tag = confirmation_tag(&key, CONFIRM_CONTROLLER);
    write_frame(stream, my_tag.as_ref())
        .await
        .map_err(|e| SessionError::TransportFailure(e.to_string()))?;

    let peer_tag = read_frame(stream)
        .await
        .map_err(|e| SessionError::TransportFailure(e.to_string()))?
        .ok_or(SessionError::Timeout)?;
    let expected = confirmation_tag(&key, CONFIRM_DEVICE);
    if peer_tag != expected.as_ref() {
        return Err(SessionError::ProofRejected);
    }
    Ok(key)
}

/// Runs the device side of the pairing proof.
pub async fn prove_as_device<S: AsyncReadExt + AsyncWriteExt + Unpin>(
    stream: &mut S,
    setup_code: &str,
) -> Result<[u8; 32]> {
    let key = spake2_exchange(stream, setup_code.as_bytes(), DEVICE_IDENTITY, CONTROLLER_IDENTITY).await?;

    let peer_tag = read_frame(stream)
        .await
        .map_err(|e| SessionError::TransportFailure(e.to_string()))?
        .ok_or(SessionError::Timeout)?;
    let expected = confirmation_tag(&key, CONFIRM_CONTROLLER);
    if peer_tag != expected.as_ref() {
        return Err(SessionError::ProofRejected);
    }

    let my_tag = confirmation_tag(&key, CONFIRM_DEVICE);
    write_frame(stream, my_tag.as_ref())
        .await
        .map_err(|e| SessionError::TransportFailure(e.to_string()))?;
    Ok(key)
}

/// What the controller hands back to the device after signing its CSR
/// (§4.5 step 4): the new operational cert, the zone CA cert (so the
/// device can verify future peers), and the identity it was assigned.
pub struct CommissioningGrant {
    pub operational_cert_pem: String,
    pub zone_ca_cert_pem: String,
    pub zone_id: String,
    pub zone_type: ZoneType,
    pub assigned_device_id: String,
}

/// Controller-side step 4: signs the device's CSR as the Zone CA.
pub fn issue_grant(ca: &ZoneCa, csr_der: &[u8]) -> Result<CommissioningGrant> {
    let cert = OperationalCert::issue(ca, csr_der)?;
    Ok(CommissioningGrant {
        operational_cert_pem: cert.cert_pem(),
        zone_ca_cert_pem: ca.cert_pem(),
        zone_id: ca.zone_id.clone(),
        zone_type: ca.zone_type,
        assigned_device_id: cert.device_id,
    })
}

/// Device-side step 3: generates the operational keypair + CSR.
/// `placeholder_id` is any provisional CN; the grant's CN is authoritative
/// once the controller signs it.
pub fn generate_csr(placeholder_id: &str) -> Result<OperationalCsr> {
    Ok(OperationalCsr::generate(placeholder_id)?)
}

impl CommissioningGrant {
    fn to_value(&self) -> Value {
        let mut map = BTreeMap::new();
        map.insert("operationalCertPem".to_string(), Value::String(self.operational_cert_pem.clone()));
        map.insert("zoneCaCertPem".to_string(), Value::String(self.zone_ca_cert_pem.clone()));
        map.insert("zoneId".to_string(), Value::String(self.zone_id.clone()));
        map.insert("zoneType".to_string(), Value::String(self.zone_type.label().to_string()));
        map.insert("assignedDeviceId".to_string(), Value::String(self.assigned_device_id.clone()));
        Value::Map(map)
    }

    fn from_value(value: &Value) -> Result<Self> {
        let Value::Map(map) = value else {
            return Err(SessionError::ProtocolViolation("grant payload is not a map".to_string()));
        };
        let field = |key: &str| -> Result<String> {
            match map.get(key) {
                Some(Value::String(s)) => Ok(s.clone()),
                _ => Err(SessionError::ProtocolViolation(format!("grant missing '{key}'"))),
            }
        };
        let zone_type_label = field("zoneType")?;
        let zone_type = ZoneType::from_label(&zone_type_label)
            .ok_or_else(|| SessionError::ProtocolViolation(format!("unknown zone type '{zone_type_label}'")))?;
        Ok(Self {
            operational_cert_pem: field("operationalCertPem")?,
            zone_ca_cert_pem: field("zoneCaCertPem")?,
            zone_id: field("zoneId")?,
            zone_type,
            assigned_device_id: field("assignedDeviceId")?,
        })
    }
}

/// Full controller-side commissioning (§4.5 steps 1-4, end to end): pairing
/// proof, then receiving the device's CSR and signing it as the Zone CA.
pub async fn commission_as_controller<S: AsyncReadExt + AsyncWriteExt + Unpin>(
    stream: &mut S,
    setup_code: &str,
    ca: &ZoneCa,
) -> Result<CommissioningGrant> {
    prove_as_controller(stream, setup_code).await?;

    let csr_der = read_frame(stream)
        .await
        .map_err(|e| SessionError::TransportFailure(e.to_string()))?
        .ok_or(SessionError::Timeout)?;
    let grant = issue_grant(ca, &csr_der)?;

    let mut encoded = Vec::new();
    encode_value(&grant.to_value(), &mut encoded);
    write_frame(stream, &encoded)
        .await
        .map_err(|e| SessionError::TransportFailure(e.to_string()))?;
    Ok(grant)
}

/// Full device-side commissioning (§4.5 steps 1-4, end to end): pairing
/// proof, generating the operational CSR, and receiving the signed grant.
/// Returns the grant plus the operational keypair the CSR was generated
/// with — the device still needs this to install the issued cert.
pub async fn commission_as_device<S: AsyncReadExt + AsyncWriteExt + Unpin>(
    stream: &mut S,
    setup_code: &str,
    placeholder_id: &str,
) -> Result<(CommissioningGrant, OperationalCsr)> {
    prove_as_device(stream, setup_code).await?;

    let csr = generate_csr(placeholder_id)?;
    write_frame(stream, &csr.der)
        .await
        .map_err(|e| SessionError::TransportFailure(e.to_string()))?;

    let frame = read_frame(stream)
        .await
        .map_err(|e| SessionError::TransportFailure(e.to_string()))?
        .ok_or(SessionError::Timeout)?;
    let (value, _) = decode_value(&frame)?;
    let grant = CommissioningGrant::from_value(&value)?;
    Ok((grant, csr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn matching_setup_codes_agree_on_a_session_key() {
        let (mut a, mut b) = duplex(4096);
        let (ra, rb) = tokio::join!(
            prove_as_controller(&mut a, "12345678"),
            prove_as_device(&mut b, "12345678"),
        );
        assert_eq!(ra.unwrap(), rb.unwrap());
    }

    #[tokio::test]
    async fn mismatched_setup_codes_are_rejected() {
        let (mut a, mut b) = duplex(4096);
        let (ra, rb) = tokio::join!(
            prove_as_controller(&mut a, "12345678"),
            prove_as_device(&mut b, "00000000"),
        );
        assert!(ra.is_err() || rb.is_err());
    }
}
