// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Certificate chain and zone-membership verification (§4.4), grounded on
//! the `hdds` security layer's x509-parser + ring validation pattern.

use ring::signature::{self, UnparsedPublicKey};
use ::time::{Duration as TimeDuration, OffsetDateTime};
use x509_parser::extensions::ParsedExtension;
use x509_parser::prelude::*;

use crate::error::{PkiError, Result};
use crate::ski::SKI_LEN;
use crate::zone_ca::ZoneCa;

/// 30 days before expiry a cert is considered due for rotation (§4.4).
pub const RENEWAL_WINDOW: TimeDuration = TimeDuration::days(30);
/// 7-day grace period tolerated after expiry for recovery, never for initial
/// validation (§4.4).
pub const EXPIRY_GRACE_PERIOD: TimeDuration = TimeDuration::days(7);

pub fn extract_subject_key_id(cert_der: &[u8]) -> Result<Option<[u8; SKI_LEN]>> {
    let (_, cert) = X509Certificate::from_der(cert_der).map_err(|e| PkiError::Parse(e.to_string()))?;
    Ok(find_key_id(&cert, true))
}

pub fn extract_authority_key_id(cert_der: &[u8]) -> Result<Option<[u8; SKI_LEN]>> {
    let (_, cert) = X509Certificate::from_der(cert_der).map_err(|e| PkiError::Parse(e.to_string()))?;
    Ok(find_key_id(&cert, false))
}

fn find_key_id(cert: &X509Certificate<'_>, subject: bool) -> Option<[u8; SKI_LEN]> {
    for ext in cert.extensions() {
        match ext.parsed_extension() {
            ParsedExtension::SubjectKeyIdentifier(id) if subject => {
                return to_fixed(id.0);
            }
            ParsedExtension::AuthorityKeyIdentifier(akid) if !subject => {
                if let Some(id) = &akid.key_identifier {
                    return to_fixed(id.0);
                }
            }
            _ => {}
        }
    }
    None
}

fn to_fixed(bytes: &[u8]) -> Option<[u8; SKI_LEN]> {
    if bytes.len() != SKI_LEN {
        return None;
    }
    let mut out = [0u8; SKI_LEN];
    out.copy_from_slice(bytes);
    Some(out)
}

/// Whether `not_after` is within the renewal window of `now`.
pub fn needs_renewal(not_after: OffsetDateTime, now: OffsetDateTime) -> bool {
    not_after - now <= RENEWAL_WINDOW
}

/// `allow_grace` tolerates up to 7 days past expiry, used only for recovery
/// flows — never for initial validation (§4.4).
pub fn is_time_valid(
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
    now: OffsetDateTime,
    allow_grace: bool,
) -> bool {
    if now < not_before {
        return false;
    }
    let deadline = if allow_grace {
        not_after + EXPIRY_GRACE_PERIOD
    } else {
        not_after
    };
    now <= deadline
}

/// Verifies `peer_cert_der` was signed by `ca` (ClientAuth/ServerAuth usages
/// carried, not separately enforced here since the caller selects which
/// side it is verifying) and that its AuthorityKeyId matches `ca`'s
/// SubjectKeyId (zone membership check, §4.4).
pub fn verify_peer_cert(ca: &ZoneCa, peer_cert_der: &[u8], allow_grace: bool) -> Result<()> {
    let (_, peer) =
        X509Certificate::from_der(peer_cert_der).map_err(|e| PkiError::Parse(e.to_string()))?;
    let (_, ca_cert) =
        X509Certificate::from_der(&ca.cert_der).map_err(|e| PkiError::Parse(e.to_string()))?;

    let validity = peer.validity();
    let not_before = OffsetDateTime::from_unix_timestamp(validity.not_before.timestamp())
        .map_err(|e| PkiError::Parse(e.to_string()))?;
    let not_after = OffsetDateTime::from_unix_timestamp(validity.not_after.timestamp())
        .map_err(|e| PkiError::Parse(e.to_string()))?;
    let now = OffsetDateTime::now_utc();
    if !is_time_valid(not_before, not_after, now, allow_grace) {
        return Err(PkiError::Expired);
    }

    let aki = find_key_id(&peer, false).ok_or(PkiError::ChainInvalid)?;
    if aki != ca.subject_key_id {
        return Err(PkiError::ZoneMismatch);
    }

    verify_signature(&ca_cert, &peer)?;
    Ok(())
}

fn verify_signature(issuer: &X509Certificate<'_>, cert: &X509Certificate<'_>) -> Result<()> {
    let issuer_spki = issuer.public_key().raw;
    let public_key = UnparsedPublicKey::new(&signature::ECDSA_P256_SHA256_ASN1, issuer_spki);
    public_key
        .verify(cert.tbs_certificate.as_ref(), cert.signature_value.data.as_ref())
        .map_err(|_| PkiError::ChainInvalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mash_core::ZoneType;

    #[test]
    fn cert_signed_by_ca_verifies_under_that_ca() {
        let ca = ZoneCa::generate("zone-a", ZoneType::Grid).unwrap();
        let csr = crate::operational::OperationalCsr::generate("device-1").unwrap();
        let cert = crate::operational::OperationalCert::issue(&ca, &csr.der).unwrap();
        assert!(verify_peer_cert(&ca, &cert.cert_der, false).is_ok());
    }

    #[test]
    fn cert_signed_by_ca_fails_under_a_different_ca() {
        let ca_x = ZoneCa::generate("zone-x", ZoneType::Grid).unwrap();
        let ca_y = ZoneCa::generate("zone-y", ZoneType::Grid).unwrap();
        let csr = crate::operational::OperationalCsr::generate("device-1").unwrap();
        let cert = crate::operational::OperationalCert::issue(&ca_x, &csr.der).unwrap();
        assert!(matches!(
            verify_peer_cert(&ca_y, &cert.cert_der, false),
            Err(PkiError::ZoneMismatch)
        ));
    }

    #[test]
    fn renewal_window_flags_certs_within_thirty_days_of_expiry() {
        let now = OffsetDateTime::now_utc();
        assert!(needs_renewal(now + TimeDuration::days(10), now));
        assert!(!needs_renewal(now + TimeDuration::days(40), now));
    }
}
