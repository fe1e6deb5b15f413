// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Zone CA: self-signed root of trust for one zone (§4.4).

use std::time::Duration;

use mash_core::ZoneType;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyIdMethod, KeyPair,
    KeyUsagePurpose,
};
use time::OffsetDateTime;

use crate::error::{PkiError, Result};
use crate::keys::generate_p256_keypair;
use crate::ski::{compute_ski, SKI_LEN};

/// 20 years — chosen to outlast any device's operational life (§4.4).
const ZONE_CA_VALIDITY: Duration = Duration::from_secs(20 * 365 * 24 * 3600);

pub struct ZoneCa {
    pub zone_id: String,
    pub zone_type: ZoneType,
    pub key_pair: KeyPair,
    pub cert_der: Vec<u8>,
    pub subject_key_id: [u8; SKI_LEN],
}

impl ZoneCa {
    pub fn generate(zone_id: &str, zone_type: ZoneType) -> Result<Self> {
        let key_pair = generate_p256_keypair()?;
        let ski = compute_ski(&key_pair.public_key_der());

        let mut params = CertificateParams::new(Vec::<String>::new())
            .map_err(|e| PkiError::Generation(e.to_string()))?;
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, zone_id);
        dn.push(DnType::OrganizationalUnitName, zone_type.label());
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(BasicConstraints::Constrained(0));
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        params.key_identifier_method = KeyIdMethod::PreSpecified(ski.to_vec());
        let now = OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now + ZONE_CA_VALIDITY;

        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| PkiError::Generation(e.to_string()))?;

        Ok(Self {
            zone_id: zone_id.to_string(),
            zone_type,
            key_pair,
            cert_der: cert.der().to_vec(),
            subject_key_id: ski,
        })
    }

    pub fn cert_pem(&self) -> String {
        pem::encode(&pem::Pem::new("CERTIFICATE", self.cert_der.clone()))
    }

    pub fn key_pem(&self) -> String {
        self.key_pair.serialize_pem()
    }

    pub fn subject_key_id_hex(&self) -> String {
        crate::ski::ski_hex(&self.subject_key_id)
    }

    pub fn from_pem(zone_id: &str, zone_type: ZoneType, cert_pem: &str, key_pem: &str) -> Result<Self> {
        let key_pair = KeyPair::from_pem(key_pem).map_err(|e| PkiError::Parse(e.to_string()))?;
        let parsed = pem::parse(cert_pem).map_err(|e| PkiError::Parse(e.to_string()))?;
        let cert_der = parsed.into_contents();
        let ski = crate::verify::extract_subject_key_id(&cert_der)?
            .unwrap_or_else(|| compute_ski(&key_pair.public_key_der()));
        Ok(Self {
            zone_id: zone_id.to_string(),
            zone_type,
            key_pair,
            cert_der,
            subject_key_id: ski,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_signed_ca_is_self_consistent() {
        let ca = ZoneCa::generate("zone-1", ZoneType::Grid).unwrap();
        let aki = crate::verify::extract_authority_key_id(&ca.cert_der)
            .unwrap()
            .expect("CA cert carries an AuthorityKeyId");
        assert_eq!(aki, ca.subject_key_id);
    }

    #[test]
    fn zone_type_label_lands_in_the_ou() {
        let ca = ZoneCa::generate("zone-2", ZoneType::Local).unwrap();
        assert!(!ca.cert_der.is_empty());
        assert_eq!(ca.zone_type, ZoneType::Local);
    }
}
