// SPDX-License-Identifier: Apache-2.0 OR MIT

//! # mash-session
//!
//! Mutual-TLS session setup (§4.5), the commissioning pairing-proof + CSR
//! handshake, and reconnect backoff.

pub mod commission;
pub mod error;
pub mod reconnect;
pub mod session;
pub mod tls;

pub use commission::{generate_csr, issue_grant, prove_as_controller, prove_as_device, CommissioningGrant};
pub use error::SessionError;
pub use reconnect::Backoff;
pub use session::Session;
