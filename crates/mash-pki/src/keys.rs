// SPDX-License-Identifier: Apache-2.0 OR MIT

//! P-256 ECDSA key pair generation and PEM (de)serialization (§4.4).

use rcgen::KeyPair;

use crate::error::{PkiError, Result};

pub fn generate_p256_keypair() -> Result<KeyPair> {
    KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256)
        .map_err(|e| PkiError::Generation(e.to_string()))
}

pub fn keypair_from_pem(pem: &str) -> Result<KeyPair> {
    KeyPair::from_pem(pem).map_err(|e| PkiError::Parse(e.to_string()))
}

pub fn keypair_to_pem(key_pair: &KeyPair) -> String {
    key_pair.serialize_pem()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keypair_survives_pem_round_trip() {
        let kp = generate_p256_keypair().unwrap();
        let pem = keypair_to_pem(&kp);
        let kp2 = keypair_from_pem(&pem).unwrap();
        assert_eq!(kp.public_key_der(), kp2.public_key_der());
    }
}
