// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Subject Key Identifier: SHA-1 of the SubjectPublicKeyInfo, per RFC 5280
//! §4.2.1.2 method (1). The operational cert's SKI, hex-encoded, is the
//! device id (§4.4).

use ring::digest;

pub const SKI_LEN: usize = 20;

pub fn compute_ski(subject_public_key_info_der: &[u8]) -> [u8; SKI_LEN] {
    let d = digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, subject_public_key_info_der);
    let mut ski = [0u8; SKI_LEN];
    ski.copy_from_slice(d.as_ref());
    ski
}

pub fn ski_hex(ski: &[u8; SKI_LEN]) -> String {
    ski.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_p256_keypair;

    #[test]
    fn ski_is_deterministic_for_the_same_key() {
        let kp = generate_p256_keypair().unwrap();
        let spki = kp.public_key_der();
        let a = compute_ski(&spki);
        let b = compute_ski(&spki);
        assert_eq!(a, b);
        assert_eq!(ski_hex(&a).len(), SKI_LEN * 2);
    }

    #[test]
    fn ski_differs_across_keys() {
        let a = compute_ski(&generate_p256_keypair().unwrap().public_key_der());
        let b = compute_ski(&generate_p256_keypair().unwrap().public_key_der());
        assert_ne!(a, b);
    }
}
