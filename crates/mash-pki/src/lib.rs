// SPDX-License-Identifier: Apache-2.0 OR MIT

//! # mash-pki
//!
//! Zone CA generation, operational certificate issuance, chain/zone-membership
//! verification, and the on-disk certificate store (§4.4).

pub mod error;
pub mod keys;
pub mod operational;
pub mod ski;
pub mod store;
pub mod verify;
pub mod zone_ca;

pub use error::PkiError;
pub use operational::{OperationalCert, OperationalCsr};
pub use ski::{compute_ski, ski_hex, SKI_LEN};
pub use store::{ControllerCertStore, DeviceRecord, FileCertStore, ZoneMaterial, MAX_ZONES};
pub use verify::{is_time_valid, needs_renewal, verify_peer_cert, EXPIRY_GRACE_PERIOD, RENEWAL_WINDOW};
pub use zone_ca::ZoneCa;
