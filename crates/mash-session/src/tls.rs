// SPDX-License-Identifier: Apache-2.0 OR MIT

//! TLS 1.3, mutual-auth config, grounded on `hdds`'s `transport::tcp::tls`
//! rustls usage but adapted to the async `tokio-rustls` wrapper and to
//! this protocol's extra zone-membership check (§4.5): a peer's chain must
//! verify against the zone's CA *and* carry an AuthorityKeyId equal to that
//! CA's SubjectKeyId.

use std::sync::Arc;

use mash_pki::ZoneCa;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::{DigitallySignedStruct, DistinguishedName, SignatureScheme};

use crate::error::{Result, SessionError};

/// Verifies a peer's operational cert against one zone's CA, enforcing the
/// AuthorityKeyId == ZoneCA.SubjectKeyId zone-membership check in addition
/// to the usual chain/time validation (§4.4).
#[derive(Debug)]
struct ZoneMembershipVerifier {
    zone_ca_cert_der: Vec<u8>,
    zone_ca_subject_key_id: [u8; mash_pki::SKI_LEN],
}

impl ZoneMembershipVerifier {
    fn new(ca: &ZoneCa) -> Self {
        Self {
            zone_ca_cert_der: ca.cert_der.clone(),
            zone_ca_subject_key_id: ca.subject_key_id,
        }
    }

    fn check(&self, end_entity: &CertificateDer<'_>) -> std::result::Result<(), rustls::Error> {
        let aki = mash_pki::verify::extract_authority_key_id(end_entity.as_ref())
            .map_err(|e| rustls::Error::General(e.to_string()))?
            .ok_or_else(|| rustls::Error::General("peer cert carries no AuthorityKeyId".into()))?;
        if aki != self.zone_ca_subject_key_id {
            return Err(rustls::Error::General(
                "peer cert's AuthorityKeyId does not match this zone's CA".into(),
            ));
        }
        verify_signed_by_ca(&self.zone_ca_cert_der, end_entity.as_ref())
            .map_err(|e| rustls::Error::General(e.to_string()))
    }
}

fn verify_signed_by_ca(ca_der: &[u8], cert_der: &[u8]) -> mash_pki::error::Result<()> {
    use x509_parser::prelude::*;
    let (_, ca_cert) = X509Certificate::from_der(ca_der)
        .map_err(|e| mash_pki::PkiError::Parse(e.to_string()))?;
    let (_, cert) = X509Certificate::from_der(cert_der)
        .map_err(|e| mash_pki::PkiError::Parse(e.to_string()))?;
    let public_key = ring::signature::UnparsedPublicKey::new(
        &ring::signature::ECDSA_P256_SHA256_ASN1,
        ca_cert.public_key().raw,
    );
    public_key
        .verify(cert.tbs_certificate.as_ref(), cert.signature_value.data.as_ref())
        .map_err(|_| mash_pki::PkiError::ChainInvalid)
}

impl ServerCertVerifier for ZoneMembershipVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        self.check(end_entity)?;
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &rustls::crypto::ring::default_provider().signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &rustls::crypto::ring::default_provider().signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![SignatureScheme::ECDSA_NISTP256_SHA256]
    }
}

impl ClientCertVerifier for ZoneMembershipVerifier {
    fn offer_client_auth(&self) -> bool {
        true
    }

    fn client_auth_mandatory(&self) -> bool {
        true
    }

    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> std::result::Result<ClientCertVerified, rustls::Error> {
        self.check(end_entity)?;
        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &rustls::crypto::ring::default_provider().signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &rustls::crypto::ring::default_provider().signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![SignatureScheme::ECDSA_NISTP256_SHA256]
    }
}

pub fn client_config(
    zone_ca: &ZoneCa,
    own_cert_der: Vec<u8>,
    own_key_pem: &str,
) -> Result<rustls::ClientConfig> {
    let key = load_private_key(own_key_pem)?;
    let cfg = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(ZoneMembershipVerifier::new(zone_ca)))
        .with_client_auth_cert(vec![CertificateDer::from(own_cert_der)], key)?;
    Ok(cfg)
}

pub fn server_config(
    zone_ca: &ZoneCa,
    own_cert_der: Vec<u8>,
    own_key_pem: &str,
) -> Result<rustls::ServerConfig> {
    let key = load_private_key(own_key_pem)?;
    let cfg = rustls::ServerConfig::builder()
        .with_client_cert_verifier(Arc::new(ZoneMembershipVerifier::new(zone_ca)))
        .with_single_cert(vec![CertificateDer::from(own_cert_der)], key)?;
    Ok(cfg)
}

fn load_private_key(pem: &str) -> Result<PrivateKeyDer<'static>> {
    let mut reader = std::io::Cursor::new(pem.as_bytes());
    rustls_pemfile::private_key(&mut reader)?
        .ok_or_else(|| SessionError::TransportFailure("no private key in PEM".into()))
}
