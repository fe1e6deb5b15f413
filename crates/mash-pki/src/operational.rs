// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Operational certificate CSR generation and Zone-CA issuance (§4.4).

use std::time::Duration;

use rcgen::{
    CertificateParams, CertificateSigningRequestParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose, PublicKeyData,
};
use time::OffsetDateTime;

use crate::error::{PkiError, Result};
use crate::keys::generate_p256_keypair;
use crate::ski::{compute_ski, ski_hex, SKI_LEN};
use crate::zone_ca::ZoneCa;

/// 1 year — operational certs are expected to rotate at least this often (§4.4).
const OPERATIONAL_VALIDITY: Duration = Duration::from_secs(365 * 24 * 3600);

pub struct OperationalCsr {
    pub key_pair: KeyPair,
    pub der: Vec<u8>,
}

impl OperationalCsr {
    /// `common_name` is the device id chosen by the commissioner for this
    /// device inside the zone it is joining.
    pub fn generate(common_name: &str) -> Result<Self> {
        let key_pair = generate_p256_keypair()?;
        let mut params = CertificateParams::new(Vec::<String>::new())
            .map_err(|e| PkiError::Generation(e.to_string()))?;
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, common_name);
        params.distinguished_name = dn;
        let csr = params
            .serialize_request(&key_pair)
            .map_err(|e| PkiError::Generation(e.to_string()))?;
        Ok(Self {
            key_pair,
            der: csr.der().as_ref().to_vec(),
        })
    }

    pub fn pem(&self) -> Result<String> {
        Ok(pem::encode(&pem::Pem::new(
            "CERTIFICATE REQUEST",
            self.der.clone(),
        )))
    }
}

pub struct OperationalCert {
    pub device_id: String,
    pub cert_der: Vec<u8>,
    pub subject_key_id: [u8; SKI_LEN],
}

impl OperationalCert {
    pub fn device_id_from_ski(ski: &[u8; SKI_LEN]) -> String {
        ski_hex(ski)
    }

    /// Signs `csr_der` with `ca`, producing a 1-year operational cert whose
    /// AuthorityKeyId is the Zone CA's SubjectKeyId.
    pub fn issue(ca: &ZoneCa, csr_der: &[u8]) -> Result<Self> {
        let mut csr_params = CertificateSigningRequestParams::from_der(&csr_der.into())
            .map_err(|e| PkiError::Parse(e.to_string()))?;
        csr_params.params.is_ca = IsCa::NoCa;
        csr_params.params.key_usages =
            vec![KeyUsagePurpose::DigitalSignature, KeyUsagePurpose::KeyEncipherment];
        csr_params.params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ClientAuth,
            ExtendedKeyUsagePurpose::ServerAuth,
        ];
        let now = OffsetDateTime::now_utc();
        csr_params.params.not_before = now;
        csr_params.params.not_after = now + OPERATIONAL_VALIDITY;

        let public_key_der = csr_params.public_key.der_bytes().to_vec();
        let device_ski = compute_ski(&public_key_der);

        let (issuer_cert, issuer_key) = ca_issuer_cert(ca)?;
        let cert = csr_params
            .signed_by(&issuer_cert, &issuer_key)
            .map_err(|e| PkiError::Generation(e.to_string()))?;

        Ok(Self {
            device_id: ski_hex(&device_ski),
            cert_der: cert.der().to_vec(),
            subject_key_id: device_ski,
        })
    }

    pub fn cert_pem(&self) -> String {
        pem::encode(&pem::Pem::new("CERTIFICATE", self.cert_der.clone()))
    }
}

/// Reconstructs the Zone CA's own `CertificateParams` (CN/OU/validity/SKI
/// method) as a self-signed `Certificate` so `signed_by` can derive the
/// issuer's distinguished name and AuthorityKeyId without re-parsing the
/// CA's DER.
fn ca_issuer_cert(ca: &ZoneCa) -> Result<(rcgen::Certificate, KeyPair)> {
    let mut params = CertificateParams::new(Vec::<String>::new())
        .map_err(|e| PkiError::Generation(e.to_string()))?;
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, ca.zone_id.as_str());
    dn.push(DnType::OrganizationalUnitName, ca.zone_type.label());
    params.distinguished_name = dn;
    params.is_ca = IsCa::Ca(rcgen::BasicConstraints::Constrained(0));
    params.key_identifier_method = rcgen::KeyIdMethod::PreSpecified(ca.subject_key_id.to_vec());
    let key_pair = KeyPair::from_pem(&ca.key_pem()).map_err(|e| PkiError::Parse(e.to_string()))?;
    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| PkiError::Generation(e.to_string()))?;
    Ok((cert, key_pair))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mash_core::ZoneType;

    #[test]
    fn issued_cert_carries_ca_authority_key_id() {
        let ca = ZoneCa::generate("zone-1", ZoneType::Grid).unwrap();
        let csr = OperationalCsr::generate("evse-001").unwrap();
        let cert = OperationalCert::issue(&ca, &csr.der).unwrap();

        let aki = crate::verify::extract_authority_key_id(&cert.cert_der)
            .unwrap()
            .expect("operational cert carries an AuthorityKeyId");
        assert_eq!(aki, ca.subject_key_id);
        assert_eq!(cert.device_id, ski_hex(&cert.subject_key_id));
    }
}
