// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The device roster (§4.6): one entry per commissioned device, guarded by
//! a read/write lock per §5 ("the controller roster and the certificate
//! stores use a read/write lock"). Persistence covers roster + zone
//! metadata only, never certs (those live in `mash-pki`'s cert store) —
//! write-temp + rename for atomicity, the same pattern
//! `mash-pki::store`'s `write_json_atomic` uses.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use mash_interaction::InteractionClient;
use mash_session::Session;

use crate::error::{ControllerError, Result};

pub const ROSTER_STATE_VERSION: u32 = 1;

pub type ControllerClient = InteractionClient<Session>;

/// Live roster state for one commissioned device. Fields that only make
/// sense while connected (`client`, `subscription_ids`) are `None`/empty
/// whenever `connected` is false.
pub struct RosterEntry {
    pub device_id: String,
    pub subject_key_id_hex: String,
    pub device_type: String,
    pub host: String,
    pub port: u16,
    pub connected: bool,
    pub last_seen: SystemTime,
    pub joined_at: SystemTime,
    pub operational_cert_pem: String,
    pub use_cases: Vec<String>,
    pub subscription_ids: Vec<u32>,
    pub client: Option<Arc<ControllerClient>>,
}

impl RosterEntry {
    fn to_record(&self) -> RosterRecord {
        RosterRecord {
            id: self.device_id.clone(),
            ski: self.subject_key_id_hex.clone(),
            r#type: self.device_type.clone(),
            joined_at: to_rfc3339(self.joined_at),
            last_seen_at: to_rfc3339(self.last_seen),
        }
    }
}

/// One device's persisted shape, per §4.6's
/// `{id, ski, type, joinedAt, lastSeenAt}` contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterRecord {
    pub id: String,
    pub ski: String,
    pub r#type: String,
    #[serde(rename = "joinedAt")]
    pub joined_at: String,
    #[serde(rename = "lastSeenAt")]
    pub last_seen_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterDocument {
    pub version: u32,
    #[serde(rename = "savedAt")]
    pub saved_at: String,
    #[serde(rename = "zoneId")]
    pub zone_id: String,
    pub devices: Vec<RosterRecord>,
}

fn to_rfc3339(t: SystemTime) -> String {
    OffsetDateTime::from(t).format(&Rfc3339).unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

fn from_rfc3339(s: &str) -> SystemTime {
    OffsetDateTime::parse(s, &Rfc3339).map(SystemTime::from).unwrap_or(SystemTime::UNIX_EPOCH)
}

pub struct Roster {
    state_path: PathBuf,
    zone_id: String,
    entries: RwLock<BTreeMap<String, RosterEntry>>,
}

impl Roster {
    pub fn new(state_dir: impl AsRef<Path>, zone_id: impl Into<String>) -> Self {
        Self {
            state_path: state_dir.as_ref().join("roster.json"),
            zone_id: zone_id.into(),
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Rebuilds the roster's static fields from disk (§4.6 "Load-on-start
    /// rebuilds the roster"). Live fields (`connected`, `client`,
    /// subscriptions) start empty — reconnection repopulates them.
    pub fn load(&self) -> Result<()> {
        if !self.state_path.exists() {
            return Ok(());
        }
        let data = fs::read(&self.state_path)?;
        let doc: RosterDocument = serde_json::from_slice(&data)?;
        if doc.version != ROSTER_STATE_VERSION {
            return Err(ControllerError::UnsupportedStateVersion(doc.version));
        }
        let mut entries = self.entries.write();
        for record in doc.devices {
            entries.insert(
                record.id.clone(),
                RosterEntry {
                    device_id: record.id,
                    subject_key_id_hex: record.ski,
                    device_type: record.r#type,
                    host: String::new(),
                    port: 0,
                    connected: false,
                    last_seen: from_rfc3339(&record.last_seen_at),
                    joined_at: from_rfc3339(&record.joined_at),
                    operational_cert_pem: String::new(),
                    use_cases: Vec::new(),
                    subscription_ids: Vec::new(),
                    client: None,
                },
            );
        }
        Ok(())
    }

    /// Flushes roster + zone metadata atomically (write-temp + rename).
    /// Called on stop and on significant transitions (§4.6).
    pub fn save(&self) -> Result<()> {
        let devices: Vec<RosterRecord> = self.entries.read().values().map(RosterEntry::to_record).collect();
        let doc = RosterDocument {
            version: ROSTER_STATE_VERSION,
            saved_at: to_rfc3339(SystemTime::now()),
            zone_id: self.zone_id.clone(),
            devices,
        };
        if let Some(parent) = self.state_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.state_path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&doc)?)?;
        fs::rename(&tmp, &self.state_path)?;
        Ok(())
    }

    pub fn insert(&self, entry: RosterEntry) {
        self.entries.write().insert(entry.device_id.clone(), entry);
    }

    pub fn remove(&self, device_id: &str) -> Option<RosterEntry> {
        self.entries.write().remove(device_id)
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.entries.read().contains_key(device_id)
    }

    pub fn mark_connected(&self, device_id: &str, client: Arc<ControllerClient>) -> Result<()> {
        let mut entries = self.entries.write();
        let entry = entries.get_mut(device_id).ok_or_else(|| ControllerError::UnknownDevice(device_id.to_string()))?;
        entry.connected = true;
        entry.last_seen = SystemTime::now();
        entry.client = Some(client);
        Ok(())
    }

    pub fn mark_disconnected(&self, device_id: &str) -> Result<()> {
        let mut entries = self.entries.write();
        let entry = entries.get_mut(device_id).ok_or_else(|| ControllerError::UnknownDevice(device_id.to_string()))?;
        entry.connected = false;
        entry.client = None;
        entry.subscription_ids.clear();
        Ok(())
    }

    pub fn touch(&self, device_id: &str) {
        if let Some(entry) = self.entries.write().get_mut(device_id) {
            entry.last_seen = SystemTime::now();
        }
    }

    pub fn set_use_cases(&self, device_id: &str, use_cases: Vec<String>) {
        if let Some(entry) = self.entries.write().get_mut(device_id) {
            entry.use_cases = use_cases;
        }
    }

    pub fn set_subscriptions(&self, device_id: &str, ids: Vec<u32>) {
        if let Some(entry) = self.entries.write().get_mut(device_id) {
            entry.subscription_ids = ids;
        }
    }

    pub fn client_for(&self, device_id: &str) -> Result<Arc<ControllerClient>> {
        self.entries
            .read()
            .get(device_id)
            .and_then(|e| e.client.clone())
            .ok_or_else(|| ControllerError::UnknownDevice(device_id.to_string()))
    }

    pub fn device_ids(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn snapshot(&self, device_id: &str) -> Option<RosterSnapshot> {
        self.entries.read().get(device_id).map(RosterSnapshot::from)
    }

    pub fn all_snapshots(&self) -> Vec<RosterSnapshot> {
        self.entries.read().values().map(RosterSnapshot::from).collect()
    }
}

/// A read-only, `Clone`-able view of a roster entry for callers that don't
/// need the live `client` handle.
#[derive(Debug, Clone)]
pub struct RosterSnapshot {
    pub device_id: String,
    pub device_type: String,
    pub connected: bool,
    pub host: String,
    pub port: u16,
    pub use_cases: Vec<String>,
}

impl From<&RosterEntry> for RosterSnapshot {
    fn from(e: &RosterEntry) -> Self {
        Self {
            device_id: e.device_id.clone(),
            device_type: e.device_type.clone(),
            connected: e.connected,
            host: e.host.clone(),
            port: e.port,
            use_cases: e.use_cases.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry(id: &str) -> RosterEntry {
        RosterEntry {
            device_id: id.to_string(),
            subject_key_id_hex: "abcd1234".to_string(),
            device_type: "evse".to_string(),
            host: "10.0.0.5".to_string(),
            port: 4444,
            connected: true,
            last_seen: SystemTime::now(),
            joined_at: SystemTime::now(),
            operational_cert_pem: String::new(),
            use_cases: vec!["EV Charging Session".to_string()],
            subscription_ids: vec![],
            client: None,
        }
    }

    #[test]
    fn save_then_load_round_trips_static_fields() {
        let dir = tempfile::tempdir().unwrap();
        let roster = Roster::new(dir.path(), "zone-a");
        roster.insert(sample_entry("device-1"));
        roster.save().unwrap();

        let reloaded = Roster::new(dir.path(), "zone-a");
        reloaded.load().unwrap();
        let snap = reloaded.snapshot("device-1").unwrap();
        assert_eq!(snap.device_type, "evse");
        assert!(!snap.connected, "connection state is not persisted");
    }

    #[test]
    fn unsupported_version_is_fail_closed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.json");
        std::fs::write(&path, r#"{"version":99,"savedAt":"x","zoneId":"z","devices":[]}"#).unwrap();
        let roster = Roster::new(dir.path(), "zone-a");
        assert!(matches!(roster.load(), Err(ControllerError::UnsupportedStateVersion(99))));
    }
}
